//! Best-effort delivery to a single consumer
//!
//! A failed send closes the connection and blocks until a new consumer
//! attaches. The failed payload, and anything produced while waiting, is
//! dropped: the stream resumes live, nothing is replayed. A consumer that
//! stops reading stalls the write until it drains or shutdown is requested.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use super::Acceptor;

/// What happened to one payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Written to the consumer
    Delivered,
    /// Dropped; the old consumer is gone and a new one is now attached
    Reconnected,
    /// Dropped; shutdown was requested before the payload got out
    Closed,
}

pub struct DeliveryChannel<A: Acceptor> {
    acceptor: A,
    conn: Option<A::Conn>,
    running: Arc<AtomicBool>,
}

impl<A: Acceptor> DeliveryChannel<A> {
    pub fn new(acceptor: A, running: Arc<AtomicBool>) -> Self {
        Self {
            acceptor,
            conn: None,
            running,
        }
    }

    #[cfg(test)]
    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Drop any current consumer and block until the next one connects.
    /// Returns false if shutdown was requested instead.
    pub fn listen(&mut self) -> bool {
        self.close();
        self.conn = self.acceptor.accept();
        self.conn.is_some()
    }

    /// Send one payload, re-listening if the consumer has gone away.
    pub fn send(&mut self, payload: &[u8]) -> SendOutcome {
        let Some(conn) = self.conn.as_mut() else {
            return if self.listen() {
                SendOutcome::Reconnected
            } else {
                SendOutcome::Closed
            };
        };

        match write_while_running(conn, payload, &self.running) {
            Ok(true) => SendOutcome::Delivered,
            Ok(false) => {
                info!("Shutdown requested while consumer was stalled, abandoning connection");
                self.close();
                SendOutcome::Closed
            }
            Err(e) => {
                debug!("Send of {} bytes failed: {}", payload.len(), e);
                info!("Consumer disconnected ({}). Waiting for reconnect...", e);
                if self.listen() {
                    SendOutcome::Reconnected
                } else {
                    SendOutcome::Closed
                }
            }
        }
    }

    /// Close the current connection, if any.
    pub fn close(&mut self) {
        if self.conn.take().is_some() {
            debug!("Consumer connection closed");
        }
    }
}

/// Write the whole payload, riding out write timeouts while the pipeline
/// is running. Returns `Ok(false)` if shutdown interrupted a stalled write.
fn write_while_running<W: Write + ?Sized>(
    conn: &mut W,
    payload: &[u8],
    running: &AtomicBool,
) -> io::Result<bool> {
    let mut written = 0;
    while written < payload.len() {
        match conn.write(&payload[written..]) {
            Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
            Ok(n) => written += n,
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                if !running.load(Ordering::SeqCst) {
                    return Ok(false);
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    conn.flush()?;
    Ok(true)
}
