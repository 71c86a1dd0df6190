//! Frequency requests: parsing, queueing and operator input

mod controller;
mod freq;
mod prompt;

pub use controller::{frequency_channel, ControllerClosed, FrequencyReceiver, FrequencySender};
pub use freq::{Frequency, FrequencyParseError};
pub use prompt::run_prompt;
