//! RTL-SDR capture via rtl_sdr process
//!
//! Spawns `rtl_sdr -f <freq> -s <rate> -` and exposes its stdout as the raw
//! IQ byte stream. At most one capture process is alive at a time: the old
//! one is killed and reaped before a replacement is spawned.

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::framer::{ChunkRead, SampleFramer};
use crate::tuning::Frequency;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to spawn `{path}`: {source}. Make sure rtl_sdr is installed and in PATH")]
    Spawn {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to capture stdout of `{0}`")]
    MissingStdout(String),
    #[error("capture process exited at {0} before producing any samples")]
    ExitedEarly(Frequency),
}

/// Starts capture sessions
pub trait CaptureLauncher {
    type Session: CaptureSession;

    fn launch(&mut self, frequency: Frequency) -> Result<Self::Session, CaptureError>;
}

/// A live capture: a byte stream that can be torn down
pub trait CaptureSession: Read {
    /// Kill the capture and wait for it to exit.
    fn terminate(&mut self) -> io::Result<()>;
}

/// rtl_sdr argument list for one capture
pub fn capture_args(frequency: Frequency, sample_rate: u32) -> Vec<String> {
    vec![
        "-f".to_string(),
        frequency.hz().to_string(),
        "-s".to_string(),
        sample_rate.to_string(),
        // "-" means output to stdout
        "-".to_string(),
    ]
}

/// Launches the external rtl_sdr binary
#[derive(Debug, Clone)]
pub struct RtlSdrLauncher {
    path: PathBuf,
    sample_rate: u32,
}

impl RtlSdrLauncher {
    pub fn new(path: impl AsRef<Path>, sample_rate: u32) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            sample_rate,
        }
    }
}

impl CaptureLauncher for RtlSdrLauncher {
    type Session = RtlSdrSession;

    fn launch(&mut self, frequency: Frequency) -> Result<RtlSdrSession, CaptureError> {
        let path = self.path.to_string_lossy().to_string();

        let mut cmd = Command::new(&self.path);
        cmd.args(capture_args(frequency, self.sample_rate))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        debug!("Executing: {:?}", cmd);

        let mut child = cmd.spawn().map_err(|source| CaptureError::Spawn {
            path: path.clone(),
            source,
        })?;

        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(CaptureError::MissingStdout(path));
            }
        };

        debug!("rtl_sdr running as pid {}", child.id());

        Ok(RtlSdrSession {
            child,
            stdout,
            reaped: false,
        })
    }
}

/// One running rtl_sdr process
#[derive(Debug)]
pub struct RtlSdrSession {
    child: Child,
    stdout: ChildStdout,
    reaped: bool,
}

impl Read for RtlSdrSession {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stdout.read(buf)
    }
}

impl CaptureSession for RtlSdrSession {
    fn terminate(&mut self) -> io::Result<()> {
        if self.reaped {
            return Ok(());
        }
        match self.child.kill() {
            Ok(()) => {}
            // Already exited
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => {}
            Err(e) => return Err(e),
        }
        let status = self.child.wait()?;
        self.reaped = true;
        debug!("rtl_sdr exited: {}", status);
        Ok(())
    }
}

impl Drop for RtlSdrSession {
    fn drop(&mut self) {
        let _ = self.terminate();
    }
}

/// Owns the capture lifecycle: start, restart at a new frequency, stop
pub struct CaptureController<L: CaptureLauncher> {
    launcher: L,
    session: Option<L::Session>,
    frequency: Frequency,
    started_at: DateTime<Utc>,
    session_bytes: u64,
    restart_backoff: Duration,
}

impl<L: CaptureLauncher> CaptureController<L> {
    pub fn new(launcher: L, initial: Frequency, restart_backoff: Duration) -> Self {
        Self {
            launcher,
            session: None,
            frequency: initial,
            started_at: Utc::now(),
            session_bytes: 0,
            restart_backoff,
        }
    }

    /// Frequency of the current (or next) session
    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }

    /// Start capturing at `frequency`, tearing down any live session first.
    pub fn start(&mut self, frequency: Frequency) -> Result<(), CaptureError> {
        self.stop();

        info!("Starting rtl_sdr at {}", frequency);
        let session = self.launcher.launch(frequency)?;

        self.session = Some(session);
        self.frequency = frequency;
        self.started_at = Utc::now();
        self.session_bytes = 0;
        Ok(())
    }

    /// Replace the running capture with one at `frequency`.
    pub fn restart(&mut self, frequency: Frequency) -> Result<(), CaptureError> {
        info!("Changing frequency to {}", frequency);
        self.start(frequency)
    }

    /// Kill and reap the current capture process, if any.
    pub fn stop(&mut self) {
        if let Some(mut session) = self.session.take() {
            let uptime = Utc::now().signed_duration_since(self.started_at);
            if let Err(e) = session.terminate() {
                warn!("Failed to terminate capture process: {}", e);
            }
            info!(
                "Capture at {} stopped after {}s ({} bytes)",
                self.frequency,
                uptime.num_seconds(),
                self.session_bytes
            );
        }
    }

    /// Read the next chunk of the live stream into `framer`.
    pub fn read_chunk<'f>(
        &mut self,
        framer: &'f mut SampleFramer,
    ) -> io::Result<ChunkRead<'f>> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no capture session"))?;

        let read = framer.read_chunk(session)?;
        let received = read.received();
        if received > 0 && self.session_bytes == 0 {
            info!("First IQ data received at {} ({} bytes)", self.frequency, received);
            if let ChunkRead::Full(bytes) = &read {
                debug!("Leading bytes: {}", hex::encode(&bytes[..bytes.len().min(16)]));
            }
        }
        self.session_bytes += received as u64;
        Ok(read)
    }

    /// The capture stream hit end-of-file. A session that produced data is
    /// relaunched at the same frequency; one that never did means the
    /// capture binary cannot run, which is fatal.
    pub fn recover_from_stream_end(&mut self) -> Result<(), CaptureError> {
        if self.session_bytes == 0 {
            self.stop();
            return Err(CaptureError::ExitedEarly(self.frequency));
        }

        warn!("rtl_sdr stdout closed (EOF), relaunching at {}", self.frequency);
        self.stop();
        if !self.restart_backoff.is_zero() {
            thread::sleep(self.restart_backoff);
        }
        self.start(self.frequency)
    }
}

impl<L: CaptureLauncher> Drop for CaptureController<L> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedLauncher;

    fn mhz(s: &str) -> Frequency {
        s.parse().unwrap()
    }

    #[test]
    fn test_capture_args() {
        assert_eq!(
            capture_args(Frequency::from_hz(102_000_000), 250_000),
            vec!["-f", "102000000", "-s", "250000", "-"]
        );
    }

    #[test]
    fn test_missing_binary_is_spawn_error() {
        let mut launcher = RtlSdrLauncher::new("/nonexistent/rtl_sdr", 250_000);
        let err = launcher.launch(mhz("102.0")).unwrap_err();
        assert!(matches!(err, CaptureError::Spawn { .. }), "{err}");
    }

    #[cfg(unix)]
    #[test]
    fn test_spawned_process_streams_stdout() {
        // echo prints its arguments, which is exactly the rtl_sdr argument list
        let mut launcher = RtlSdrLauncher::new("echo", 250_000);
        let mut session = launcher.launch(mhz("102.0")).unwrap();

        let mut out = String::new();
        session.read_to_string(&mut out).unwrap();
        assert_eq!(out, "-f 102000000 -s 250000 -\n");

        session.terminate().unwrap();
        // Idempotent once reaped
        session.terminate().unwrap();
    }

    #[test]
    fn test_restart_tears_down_before_launch() {
        let launcher = ScriptedLauncher::new(vec![vec![1, 2], vec![3, 4]]);
        let log = launcher.log();
        let mut capture = CaptureController::new(launcher, mhz("102.0"), Duration::ZERO);

        capture.start(mhz("102.0")).unwrap();
        capture.restart(mhz("145.8")).unwrap();

        assert_eq!(capture.frequency(), mhz("145.8"));
        assert_eq!(log.launches(), vec![mhz("102.0"), mhz("145.8")]);
        // One terminate per replaced session, each before the next launch
        assert_eq!(log.terminations(), 1);
        assert_eq!(log.max_live(), 1);

        capture.stop();
        assert_eq!(log.terminations(), 2);
        assert!(!capture.is_running());
    }

    #[test]
    fn test_stream_end_relaunches_after_data() {
        let launcher = ScriptedLauncher::new(vec![vec![1, 2, 3, 4], vec![5, 6, 7, 8]]);
        let log = launcher.log();
        let mut capture = CaptureController::new(launcher, mhz("102.0"), Duration::ZERO);
        let mut framer = SampleFramer::new(2);

        capture.start(mhz("102.0")).unwrap();
        assert_eq!(capture.read_chunk(&mut framer).unwrap(), ChunkRead::Full(&[1, 2, 3, 4]));
        assert_eq!(
            capture.read_chunk(&mut framer).unwrap(),
            ChunkRead::Short { received: 0 }
        );

        capture.recover_from_stream_end().unwrap();
        assert_eq!(log.launches(), vec![mhz("102.0"), mhz("102.0")]);
        assert_eq!(capture.read_chunk(&mut framer).unwrap(), ChunkRead::Full(&[5, 6, 7, 8]));
    }

    #[test]
    fn test_stream_end_without_data_is_fatal() {
        let launcher = ScriptedLauncher::new(vec![vec![]]);
        let log = launcher.log();
        let mut capture = CaptureController::new(launcher, mhz("102.0"), Duration::ZERO);
        let mut framer = SampleFramer::new(2);

        capture.start(mhz("102.0")).unwrap();
        assert_eq!(
            capture.read_chunk(&mut framer).unwrap(),
            ChunkRead::Short { received: 0 }
        );

        let err = capture.recover_from_stream_end().unwrap_err();
        assert!(matches!(err, CaptureError::ExitedEarly(f) if f == mhz("102.0")));
        assert_eq!(log.terminations(), 1);
        assert!(!capture.is_running());
    }

    #[test]
    fn test_read_without_session_fails() {
        let launcher = ScriptedLauncher::new(vec![]);
        let mut capture = CaptureController::new(launcher, mhz("102.0"), Duration::ZERO);
        let mut framer = SampleFramer::new(2);

        let err = capture.read_chunk(&mut framer).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }
}
