//! Configuration loaded from environment variables

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::denoise::{
    DenoiseParams, DEFAULT_EPSILON, DEFAULT_HISTORY, DEFAULT_LAMBDA, DEFAULT_MAX_ITERATIONS,
};
use crate::tuning::Frequency;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to rtl_sdr executable
    pub rtl_sdr_path: PathBuf,

    /// Initial center frequency
    pub center_freq: Frequency,

    /// Capture sample rate in Hz
    pub sample_rate: u32,

    /// Complex samples per processed chunk
    pub chunk_size: usize,

    /// TCP port the consumer connects to
    pub listen_port: u16,

    /// Denoiser tuning
    pub denoise: DenoiseParams,

    /// Delay before relaunching a capture whose stream ended
    pub restart_backoff: Duration,

    /// Statistics log interval in seconds (0 disables)
    pub stats_interval_secs: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key/value source
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let center_hz: u32 = setting(&lookup, "CENTER_FREQ", 102_000_000, |hz: &u32| *hz > 0);

        Self {
            rtl_sdr_path: lookup("RTL_SDR_PATH")
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("rtl_sdr")),

            center_freq: Frequency::from_hz(center_hz),

            sample_rate: setting(&lookup, "SAMPLE_RATE", 250_000, |r: &u32| *r > 0),

            chunk_size: setting(&lookup, "CHUNK_SIZE", 4096, |n: &usize| *n > 0),

            listen_port: setting(&lookup, "LISTEN_PORT", 9000, |_: &u16| true),

            denoise: DenoiseParams {
                lambda: setting(&lookup, "DENOISE_LAMBDA", DEFAULT_LAMBDA, |l: &f64| {
                    l.is_finite() && *l >= 0.0
                }),
                epsilon: setting(&lookup, "DENOISE_EPSILON", DEFAULT_EPSILON, |e: &f64| {
                    e.is_finite() && *e > 0.0
                }),
                max_iterations: setting(
                    &lookup,
                    "DENOISE_MAX_ITER",
                    DEFAULT_MAX_ITERATIONS,
                    |n: &usize| *n > 0,
                ),
                history: setting(&lookup, "DENOISE_HISTORY", DEFAULT_HISTORY, |n: &usize| *n > 0),
            },

            restart_backoff: Duration::from_millis(setting(
                &lookup,
                "CAPTURE_RESTART_BACKOFF_MS",
                500,
                |_: &u64| true,
            )),

            stats_interval_secs: setting(&lookup, "STATS_INTERVAL_SECS", 10, |_: &u64| true),
        }
    }
}

/// Parse one variable, falling back to `default` when it is unset, malformed
/// or rejected by `valid`.
fn setting<T, F, V>(lookup: &F, key: &str, default: T, valid: V) -> T
where
    T: FromStr + std::fmt::Display,
    F: Fn(&str) -> Option<String>,
    V: Fn(&T) -> bool,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(value) if valid(&value) => value,
        _ => {
            warn!("Ignoring invalid {}={:?}, using {}", key, raw, default);
            default
        }
    }
}
