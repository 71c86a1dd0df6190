//! Pipeline orchestrator - ties capture, framing, denoising and delivery
//!
//! Each iteration: apply the latest frequency request, read one chunk,
//! denoise I and Q, send the complex64 payload. Runs on a single thread;
//! the frequency queue is the only state shared with other threads.

mod stats;

pub use stats::PipelineStats;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::delivery::{combine, encode_complex64, Acceptor, DeliveryChannel, SendOutcome};
use crate::denoise::{DenoiseParams, Denoiser};
use crate::sdr::{
    split_channels, CaptureController, CaptureError, CaptureLauncher, ChunkRead, SampleFramer,
};
use crate::tuning::{Frequency, FrequencyReceiver};

/// Back off after a failed read from the capture stream
const READ_ERROR_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Starting,
    Running,
    ShuttingDown,
}

/// Runtime settings for one pipeline
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub initial_frequency: Frequency,
    pub chunk_size: usize,
    pub denoise: DenoiseParams,
    pub restart_backoff: Duration,
    /// Periodic statistics log; `None` disables it
    pub stats_interval: Option<Duration>,
}

impl From<&Config> for PipelineSettings {
    fn from(config: &Config) -> Self {
        Self {
            initial_frequency: config.center_freq,
            chunk_size: config.chunk_size,
            denoise: config.denoise,
            restart_backoff: config.restart_backoff,
            stats_interval: (config.stats_interval_secs > 0)
                .then(|| Duration::from_secs(config.stats_interval_secs)),
        }
    }
}

pub struct Pipeline<L: CaptureLauncher, A: Acceptor> {
    state: PipelineState,
    capture: CaptureController<L>,
    delivery: DeliveryChannel<A>,
    framer: SampleFramer,
    denoiser: Denoiser,
    frequencies: FrequencyReceiver,
    running: Arc<AtomicBool>,
    stats: PipelineStats,
    payload: Vec<u8>,
    initial_frequency: Frequency,
    stats_interval: Option<Duration>,
}

impl<L: CaptureLauncher, A: Acceptor> Pipeline<L, A> {
    pub fn new(
        settings: PipelineSettings,
        launcher: L,
        acceptor: A,
        frequencies: FrequencyReceiver,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            state: PipelineState::Starting,
            capture: CaptureController::new(
                launcher,
                settings.initial_frequency,
                settings.restart_backoff,
            ),
            delivery: DeliveryChannel::new(acceptor, running.clone()),
            framer: SampleFramer::new(settings.chunk_size),
            denoiser: Denoiser::new(settings.denoise),
            frequencies,
            running,
            stats: PipelineStats::new(),
            payload: Vec::new(),
            initial_frequency: settings.initial_frequency,
            stats_interval: settings.stats_interval,
        }
    }

    /// Run until shutdown is requested or a fatal capture fault occurs.
    /// Capture and consumer are torn down on every exit path.
    pub fn run(mut self) -> Result<PipelineStats, CaptureError> {
        let result = self.run_inner();
        self.shutdown();
        result.map(|()| self.stats.clone())
    }

    fn run_inner(&mut self) -> Result<(), CaptureError> {
        self.capture.start(self.initial_frequency)?;

        if !self.delivery.listen() {
            return Ok(());
        }
        self.enter(PipelineState::Running);

        let mut last_report = Instant::now();
        while self.is_running() {
            self.step()?;

            if let Some(interval) = self.stats_interval {
                if last_report.elapsed() >= interval {
                    info!("[Stats] {}", self.stats);
                    last_report = Instant::now();
                }
            }
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn enter(&mut self, state: PipelineState) {
        if self.state != state {
            debug!("Pipeline {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    /// One iteration of the processing loop
    fn step(&mut self) -> Result<(), CaptureError> {
        // Frequency changes land between chunks, never mid-chunk
        if let Some(freq) = self.frequencies.next_change(self.capture.frequency()) {
            self.capture.restart(freq)?;
            self.stats.frequency_changes += 1;
        }

        let channels = match self.capture.read_chunk(&mut self.framer) {
            Ok(ChunkRead::Full(bytes)) => split_channels(bytes),
            Ok(ChunkRead::Short { received }) => {
                debug!("Short read ({} bytes), discarding", received);
                self.stats.short_reads += 1;
                // rtl_sdr shares our process group and exits on Ctrl-C too
                if !self.is_running() {
                    return Ok(());
                }
                self.capture.recover_from_stream_end()?;
                self.stats.capture_relaunches += 1;
                return Ok(());
            }
            Err(e) => {
                warn!("Error reading from rtl_sdr: {}", e);
                self.stats.read_errors += 1;
                thread::sleep(READ_ERROR_BACKOFF);
                return Ok(());
            }
        };
        self.stats.chunks_processed += 1;

        let i = self.denoiser.denoise(&channels.i);
        let q = self.denoiser.denoise(&channels.q);
        encode_complex64(&combine(&i, &q), &mut self.payload);

        match self.delivery.send(&self.payload) {
            SendOutcome::Delivered => self.stats.record_delivered(self.payload.len()),
            SendOutcome::Reconnected => {
                self.stats.record_dropped();
                self.stats.reconnects += 1;
            }
            SendOutcome::Closed => self.stats.record_dropped(),
        }
        Ok(())
    }

    fn shutdown(&mut self) {
        self.enter(PipelineState::ShuttingDown);
        info!("Shutting down pipeline...");
        self.capture.stop();
        self.delivery.close();
    }
}
