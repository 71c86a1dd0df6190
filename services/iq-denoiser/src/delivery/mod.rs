//! Streaming denoised samples to the downstream consumer

mod channel;
mod listener;
pub mod wire;

pub use channel::{DeliveryChannel, SendOutcome};
pub use listener::{Acceptor, DeliveryError, TcpAcceptor};
pub use wire::{combine, encode_complex64};
