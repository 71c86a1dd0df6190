//! Pipeline counters

use std::fmt;

/// Counters for one pipeline run. Owned by the pipeline thread.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub chunks_processed: u64,
    pub short_reads: u64,
    pub read_errors: u64,
    pub chunks_delivered: u64,
    pub chunks_dropped: u64,
    pub bytes_sent: u64,
    pub frequency_changes: u64,
    pub capture_relaunches: u64,
    pub reconnects: u64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_delivered(&mut self, bytes: usize) {
        self.chunks_delivered += 1;
        self.bytes_sent += bytes as u64;
    }

    pub fn record_dropped(&mut self) {
        self.chunks_dropped += 1;
    }
}

impl fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Chunks: {} (delivered: {}, dropped: {}) | Sent: {} bytes | Short reads: {} | Read errors: {} | Retunes: {} | Relaunches: {} | Reconnects: {}",
            self.chunks_processed,
            self.chunks_delivered,
            self.chunks_dropped,
            self.bytes_sent,
            self.short_reads,
            self.read_errors,
            self.frequency_changes,
            self.capture_relaunches,
            self.reconnects
        )
    }
}
