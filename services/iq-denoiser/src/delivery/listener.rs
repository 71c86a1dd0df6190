//! Single-consumer TCP acceptor
//!
//! The listening socket is bound at startup. Once a consumer is accepted
//! the listener is released, so nobody else can queue up behind it; when
//! that consumer goes away the port is bound again for the next one.

use std::io::{self, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{info, warn};

/// How often a waiting accept checks for shutdown
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);
/// Delay between attempts to re-bind the port after a disconnect
const REBIND_RETRY: Duration = Duration::from_secs(2);
/// Longest a single write to the consumer blocks before shutdown is checked
pub const CONSUMER_WRITE_TIMEOUT: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("failed to bind consumer listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// Source of consumer connections
pub trait Acceptor {
    type Conn: Write;

    /// Block until one consumer attaches. `None` once shutdown is requested.
    fn accept(&mut self) -> Option<Self::Conn>;
}

/// Accepts consumers on a TCP port bound to all interfaces
pub struct TcpAcceptor {
    addr: SocketAddr,
    listener: Option<TcpListener>,
    running: Arc<AtomicBool>,
}

impl TcpAcceptor {
    /// Bind `0.0.0.0:port`. Failure here is fatal to the caller.
    pub fn bind(port: u16, running: Arc<AtomicBool>) -> Result<Self, DeliveryError> {
        Self::bind_addr(SocketAddr::from(([0, 0, 0, 0], port)), running)
    }

    pub fn bind_addr(addr: SocketAddr, running: Arc<AtomicBool>) -> Result<Self, DeliveryError> {
        let listener = open(addr).map_err(|source| DeliveryError::Bind { addr, source })?;
        // Resolve port 0 so later re-binds reuse the same port
        let addr = listener
            .local_addr()
            .map_err(|source| DeliveryError::Bind { addr, source })?;

        Ok(Self {
            addr,
            listener: Some(listener),
            running,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Re-bind after a disconnect, retrying until it works or shutdown.
    fn rebind(&self) -> Option<TcpListener> {
        loop {
            if !self.is_running() {
                return None;
            }
            match open(self.addr) {
                Ok(listener) => return Some(listener),
                Err(e) => {
                    warn!(
                        "Failed to re-bind {}: {}. Retrying in {}s...",
                        self.addr,
                        e,
                        REBIND_RETRY.as_secs()
                    );
                    let deadline = Instant::now() + REBIND_RETRY;
                    while Instant::now() < deadline && self.is_running() {
                        thread::sleep(ACCEPT_POLL_INTERVAL);
                    }
                }
            }
        }
    }
}

impl Acceptor for TcpAcceptor {
    type Conn = TcpStream;

    fn accept(&mut self) -> Option<TcpStream> {
        let listener = match self.listener.take() {
            Some(listener) => listener,
            None => self.rebind()?,
        };

        info!("Waiting for consumer to connect on port {}...", self.addr.port());

        while self.is_running() {
            match listener.accept() {
                Ok((stream, peer)) => {
                    if let Err(e) = stream
                        .set_nonblocking(false)
                        .and_then(|_| stream.set_write_timeout(Some(CONSUMER_WRITE_TIMEOUT)))
                    {
                        warn!("Dropping consumer {}: {}", peer, e);
                        continue;
                    }
                    let _ = stream.set_nodelay(true);
                    info!("Consumer connected from {}", peer);
                    return Some(stream);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) => {
                    warn!("Accept failed: {}", e);
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
            }
        }
        None
    }
}

fn open(addr: SocketAddr) -> io::Result<TcpListener> {
    let listener = TcpListener::bind(addr)?;
    listener.set_nonblocking(true)?;
    Ok(listener)
}
