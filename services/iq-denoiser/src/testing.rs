//! In-memory capture and consumer fakes shared by the unit tests

use std::collections::VecDeque;
use std::io::{self, Cursor, Read, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::delivery::Acceptor;
use crate::sdr::{CaptureError, CaptureLauncher, CaptureSession};
use crate::tuning::Frequency;

/// Records what a [`ScriptedLauncher`] was asked to do
#[derive(Debug, Clone, Default)]
pub struct LaunchLog {
    launches: Arc<Mutex<Vec<Frequency>>>,
    terminations: Arc<AtomicUsize>,
    live: Arc<AtomicUsize>,
    max_live: Arc<AtomicUsize>,
}

impl LaunchLog {
    pub fn launches(&self) -> Vec<Frequency> {
        self.launches.lock().unwrap().clone()
    }

    pub fn terminations(&self) -> usize {
        self.terminations.load(Ordering::SeqCst)
    }

    /// Highest number of sessions alive at once
    pub fn max_live(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }
}

/// Hands out pre-recorded byte streams, one per launch. Once the script
/// runs out it clears `running` (if attached) and returns empty streams.
pub struct ScriptedLauncher {
    sessions: VecDeque<Vec<u8>>,
    log: LaunchLog,
    running: Option<Arc<AtomicBool>>,
    interrupt: Option<Arc<AtomicBool>>,
}

impl ScriptedLauncher {
    pub fn new(sessions: Vec<Vec<u8>>) -> Self {
        Self {
            sessions: sessions.into(),
            log: LaunchLog::default(),
            running: None,
            interrupt: None,
        }
    }

    pub fn stop_when_exhausted(mut self, running: Arc<AtomicBool>) -> Self {
        self.running = Some(running);
        self
    }

    /// Each session clears `running` as it hits end of stream, the way
    /// rtl_sdr exits when Ctrl-C reaches the whole process group.
    pub fn interrupt_at_end_of_stream(mut self, running: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(running);
        self
    }

    pub fn log(&self) -> LaunchLog {
        self.log.clone()
    }
}

impl CaptureLauncher for ScriptedLauncher {
    type Session = ScriptedSession;

    fn launch(&mut self, frequency: Frequency) -> Result<ScriptedSession, CaptureError> {
        self.log.launches.lock().unwrap().push(frequency);
        let data = match self.sessions.pop_front() {
            Some(data) => data,
            None => {
                if let Some(running) = &self.running {
                    running.store(false, Ordering::SeqCst);
                }
                Vec::new()
            }
        };

        let live = self.log.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.log.max_live.fetch_max(live, Ordering::SeqCst);

        Ok(ScriptedSession {
            data: Cursor::new(data),
            log: self.log.clone(),
            terminated: false,
            interrupt: self.interrupt.clone(),
        })
    }
}

pub struct ScriptedSession {
    data: Cursor<Vec<u8>>,
    log: LaunchLog,
    terminated: bool,
    interrupt: Option<Arc<AtomicBool>>,
}

impl Read for ScriptedSession {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.data.read(buf)?;
        if n == 0 && !buf.is_empty() {
            if let Some(running) = &self.interrupt {
                running.store(false, Ordering::SeqCst);
            }
        }
        Ok(n)
    }
}

impl CaptureSession for ScriptedSession {
    fn terminate(&mut self) -> io::Result<()> {
        if !self.terminated {
            self.terminated = true;
            self.log.live.fetch_sub(1, Ordering::SeqCst);
            self.log.terminations.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Consumer connection backed by a shared buffer
pub struct MemoryConn {
    sink: Arc<Mutex<Vec<u8>>>,
    fail: bool,
    stalls: usize,
    max_write: usize,
}

impl MemoryConn {
    pub fn healthy() -> (Self, Arc<Mutex<Vec<u8>>>) {
        let sink = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                sink: sink.clone(),
                fail: false,
                stalls: 0,
                max_write: usize::MAX,
            },
            sink,
        )
    }

    /// A consumer that has already gone away
    pub fn broken() -> (Self, Arc<Mutex<Vec<u8>>>) {
        let (mut conn, sink) = Self::healthy();
        conn.fail = true;
        (conn, sink)
    }

    /// Times out `stalls` times, then accepts at most 3 bytes per write
    pub fn congested(stalls: usize) -> (Self, Arc<Mutex<Vec<u8>>>) {
        let (mut conn, sink) = Self::healthy();
        conn.stalls = stalls;
        conn.max_write = 3;
        (conn, sink)
    }

    /// A consumer that never reads again
    pub fn stalled() -> (Self, Arc<Mutex<Vec<u8>>>) {
        let (mut conn, sink) = Self::healthy();
        conn.stalls = usize::MAX;
        (conn, sink)
    }
}

impl Write for MemoryConn {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.fail {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "consumer gone"));
        }
        if self.stalls > 0 {
            self.stalls -= 1;
            return Err(io::Error::new(io::ErrorKind::TimedOut, "consumer not reading"));
        }
        let n = buf.len().min(self.max_write);
        self.sink.lock().unwrap().extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Accepts scripted connections in order, then reports shutdown
pub struct MemoryAcceptor {
    conns: VecDeque<MemoryConn>,
    accepts: Arc<AtomicUsize>,
}

impl MemoryAcceptor {
    pub fn new(conns: Vec<MemoryConn>) -> Self {
        Self {
            conns: conns.into(),
            accepts: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn accept_count(&self) -> Arc<AtomicUsize> {
        self.accepts.clone()
    }
}

impl Acceptor for MemoryAcceptor {
    type Conn = MemoryConn;

    fn accept(&mut self) -> Option<MemoryConn> {
        self.accepts.fetch_add(1, Ordering::SeqCst);
        self.conns.pop_front()
    }
}
