//! IQ Denoiser - real-time smooth-L1 denoising of RTL-SDR samples
//!
//! Captures raw IQ samples from rtl_sdr, denoises the I and Q channels of
//! every chunk, and streams the result as complex64 to one TCP consumer.
//! The center frequency can be changed live from the terminal.

mod config;
mod delivery;
mod denoise;
mod pipeline;
mod sdr;
#[cfg(test)]
mod testing;
mod tuning;

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use config::Config;
use delivery::TcpAcceptor;
use pipeline::{Pipeline, PipelineSettings};
use sdr::RtlSdrLauncher;
use tuning::{frequency_channel, run_prompt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("===========================================");
    info!("   IQ Denoiser - RTL-SDR to complex64");
    info!("   smooth-L1 / L-BFGS per chunk");
    info!("===========================================");

    let config = Config::from_env();

    info!("Configuration:");
    info!("  rtl_sdr path: {:?}", config.rtl_sdr_path);
    info!("  Center frequency: {}", config.center_freq);
    info!("  Sample rate: {} Hz", config.sample_rate);
    info!("  Chunk size: {} samples", config.chunk_size);
    info!("  Listen port: {}", config.listen_port);
    info!(
        "  Denoiser: lambda={} eps={} max_iter={}",
        config.denoise.lambda, config.denoise.epsilon, config.denoise.max_iterations
    );

    let running = Arc::new(AtomicBool::new(true));

    let acceptor = TcpAcceptor::bind(config.listen_port, running.clone())
        .context("Cannot accept consumers")?;

    let (freq_tx, freq_rx) = frequency_channel();
    let pipeline = Pipeline::new(
        PipelineSettings::from(&config),
        RtlSdrLauncher::new(&config.rtl_sdr_path, config.sample_rate),
        acceptor,
        freq_rx,
        running.clone(),
    );

    // Operator input blocks on stdin, so it gets a plain thread that is
    // abandoned at exit rather than a runtime-managed one
    let prompt_running = running.clone();
    thread::Builder::new()
        .name("freq-prompt".to_string())
        .spawn(move || {
            let stdin = io::stdin();
            run_prompt(stdin.lock(), io::stdout(), freq_tx, &prompt_running)
        })
        .context("Failed to spawn frequency prompt thread")?;

    info!("Press Ctrl+C to stop.");

    let mut worker = tokio::task::spawn_blocking(move || pipeline.run());

    let outcome = tokio::select! {
        res = &mut worker => res,
        _ = signal::ctrl_c() => {
            info!("Interrupt received, exiting...");
            running.store(false, Ordering::SeqCst);
            worker.await
        }
    };
    running.store(false, Ordering::SeqCst);

    // Fatal errors are reported once, by the runtime, on return
    let stats = outcome
        .context("Pipeline thread panicked")?
        .context("Pipeline failed")?;
    info!("Shutdown complete. {}", stats);
    Ok(())
}
