//! RTL-SDR capture and sample framing
//!
//! 1. Launch rtl_sdr at the current center frequency
//! 2. Read fixed-size chunks of interleaved 8-bit IQ bytes
//! 3. Normalize and split into I and Q channel vectors

pub mod capture;
pub mod framer;

pub use capture::{
    capture_args, CaptureController, CaptureError, CaptureLauncher, CaptureSession,
    RtlSdrLauncher,
};
pub use framer::{split_channels, ChannelPair, ChunkRead, SampleFramer};
