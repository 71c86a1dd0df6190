//! Interactive frequency entry

use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{info, warn};

use super::{Frequency, FrequencySender};

const PROMPT: &str = "Enter new frequency in MHz (e.g. 145.800): ";

/// Read frequencies line by line and post them to the pipeline.
///
/// Returns the number of requests posted. Stops on end of input, on
/// shutdown, or once the pipeline stops accepting requests.
pub fn run_prompt<R: BufRead, W: Write>(
    mut input: R,
    mut output: W,
    tx: FrequencySender,
    running: &AtomicBool,
) -> usize {
    let mut posted = 0;
    let mut line = String::new();

    while running.load(Ordering::SeqCst) {
        let _ = write!(output, "{}", PROMPT);
        let _ = output.flush();

        line.clear();
        match input.read_line(&mut line) {
            Ok(0) => {
                info!("Operator input closed");
                break;
            }
            Ok(_) => {}
            // The offending line is consumed; carry on with the next one
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                warn!("Invalid input: {}", e);
                continue;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!("Failed to read operator input: {}", e);
                break;
            }
        }

        let entry = line.trim();
        if entry.is_empty() {
            continue;
        }

        match entry.parse::<Frequency>() {
            Ok(freq) => {
                if tx.request(freq).is_err() {
                    break;
                }
                posted += 1;
            }
            Err(e) => warn!("Invalid input: {}", e),
        }
    }

    posted
}
