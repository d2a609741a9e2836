mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::{Duration, Instant};

use cli::Cli;
use specpipe::audio::device::list_input_devices;
use specpipe::config::{self, Config};
use specpipe::Pipeline;

const LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    if cli.list_devices {
        let devices = list_input_devices().context("Failed to list input devices")?;
        println!("Available input devices:");
        for device in &devices {
            let marker = if device.is_default { " (default)" } else { "" };
            println!("  {}{}", device.name, marker);
        }
        return Ok(());
    }

    // Config file first, command-line flags on top
    let mut cfg = match config::find_config_path(cli.config.as_deref()) {
        Some(path) => {
            let cfg = config::load_config(&path)?;
            log::info!("Loaded config from {}", path.display());
            cfg
        }
        None => Config::default(),
    };
    cli.apply_overrides(&mut cfg.audio);

    let mut pipeline = Pipeline::start(cfg.audio).context(
        "Failed to start audio capture. Run with --list-devices to see available sources",
    )?;

    let fps = cli.fps.max(1);
    let frame_period = Duration::from_secs_f64(1.0 / fps as f64);
    let deadline = match cli.duration {
        Some(secs) => Some(Instant::now() + run_duration(secs)?),
        None => None,
    };

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner} {msg}")?);

    let mut next_frame = Instant::now();
    let mut frames = 0u64;
    while deadline.map_or(true, |d| Instant::now() < d) {
        pipeline.update();
        frames += 1;

        let bands = pipeline.bands();
        let peak = pipeline
            .peak_bin()
            .map(|bin| format!("{:>7.1} Hz", pipeline.bin_frequency(bin)))
            .unwrap_or_else(|| "      - Hz".to_string());
        pb.set_message(format!(
            "{} | bass {:.2} mid {:.2} high {:.2} | peak {}",
            spectrum_line(pipeline.magnitudes(), cli.width),
            bands.bass,
            bands.mid,
            bands.high,
            peak
        ));
        pb.tick();

        next_frame += frame_period;
        let now = Instant::now();
        if next_frame > now {
            std::thread::sleep(next_frame - now);
        } else {
            next_frame = now;
        }
    }

    pb.finish_and_clear();
    log::info!(
        "Rendered {} frames from {} captured blocks at {} Hz",
        frames,
        pipeline.blocks_captured(),
        pipeline.config().sample_rate
    );
    pipeline.shutdown();
    Ok(())
}

/// Parse `--duration`, rejecting values a `Duration` cannot hold.
fn run_duration(secs: f32) -> Result<Duration> {
    let duration = Duration::try_from_secs_f32(secs.max(0.0))
        .with_context(|| format!("Invalid --duration {}", secs))?;
    Instant::now()
        .checked_add(duration)
        .with_context(|| format!("--duration {} is too far in the future", secs))?;
    Ok(duration)
}

/// Collapse the spectrum into `width` columns, taking the loudest bin of each column.
fn spectrum_line(magnitudes: &[f32], width: usize) -> String {
    if magnitudes.is_empty() || width == 0 {
        return String::new();
    }
    let columns = width.min(magnitudes.len());
    (0..columns)
        .map(|col| {
            let start = col * magnitudes.len() / columns;
            let end = ((col + 1) * magnitudes.len() / columns).max(start + 1);
            let level = magnitudes[start..end].iter().copied().fold(0.0f32, f32::max);
            let idx = (level * (LEVELS.len() - 1) as f32).round() as usize;
            LEVELS[idx.min(LEVELS.len() - 1)]
        })
        .collect()
}
