// SPDX-License-Identifier: Apache-2.0 OR MIT
// Burst-load demo: floods the logger from concurrent tasks, then reports the
// overflow counters.
//
// Run with: cargo run --release -- --workers 16 --burst 2000

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use logrelay::{
    log_debug, log_error, log_info, log_trace, log_warn, Level, LoggerConfig,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of concurrent producer tasks
    #[arg(long, default_value_t = 8)]
    workers: usize,

    /// Tight-loop records per worker before the steady phase
    #[arg(long, default_value_t = 2000)]
    burst: usize,

    /// Steady-phase iterations per worker, 10ms apart
    #[arg(long, default_value_t = 100)]
    steady: usize,

    /// Load logger options from a JSON5 config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write info records to this file instead of stdout
    #[arg(long)]
    info_path: Option<PathBuf>,

    /// Write error records to this file instead of stdout
    #[arg(long)]
    error_path: Option<PathBuf>,

    /// Emit JSON lines instead of text
    #[arg(long)]
    json: bool,

    /// Rotate file sinks above this many bytes (0 disables)
    #[arg(long, default_value_t = 0)]
    max_file_size: u64,

    /// MPMC ring capacity as a power-of-two exponent
    #[arg(long, default_value_t = 14)]
    queue_pow2: u32,
}

async fn producer(id: usize, burst: usize, steady: usize) {
    for i in 0..burst {
        log_trace!("burst worker={} tick={}", id, i);
        log_debug!("burst worker={} recv req_id={}", id, 1000 + i);
        log_info!("burst worker={} handled request size={}B", id, 512u64);
        if i % 10 == 0 {
            log_error!("burst worker={} backend fail code={}", id, -104);
        }
    }

    for i in 0..steady {
        log_info!("worker={} handled request size={}B", id, 256u64);
        if i == 2 {
            log_warn!("worker={} slow op >= {} ms", id, 17.4);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    log_info!("worker={} done", id);
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => LoggerConfig::load_from_file(path)?,
        None => LoggerConfig::default(),
    };
    if args.info_path.is_some() {
        config.info_path = args.info_path.clone();
    }
    if args.error_path.is_some() {
        config.error_path = args.error_path.clone();
    }
    if args.json {
        config.json_mode = true;
    }
    if args.max_file_size > 0 {
        config.max_file_size_bytes = args.max_file_size;
    }
    config.queue_capacity_pow2 = args.queue_pow2;
    config.track_metrics = true;

    logrelay::init(config)?;
    log_debug!("starting {} producers", args.workers);

    let handles: Vec<_> = (0..args.workers)
        .map(|id| tokio::spawn(producer(id, args.burst, args.steady)))
        .collect();
    for handle in handles {
        handle.await?;
    }

    let stats = logrelay::stats();
    logrelay::log_fmt(
        Level::Info,
        format_args!(
            "queue refusals={} fallback spills={}",
            stats.overflow_pushes, stats.backpressure_spins
        ),
    );

    logrelay::shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arg_parsing() {
        let args = Args::parse_from(["logrelay", "--workers", "4", "--json"]);
        assert_eq!(args.workers, 4);
        assert!(args.json);
        assert_eq!(args.queue_pow2, 14);
        assert!(args.info_path.is_none());
    }
}
