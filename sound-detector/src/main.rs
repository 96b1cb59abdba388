/// Sound monitor service binary
///
/// Feeds ADC readings (integers on stdin, or a WAV file reduced to a sensor
/// envelope) through the monitor and prints protocol lines on stdout.

use anyhow::{Context, Result};
use clap::Parser;
use sound_detector::report::{encode_event, encode_stats};
use sound_detector::{AdcSample, MonitorConfig, SoundMonitor, ADC_MAX};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

#[derive(Parser)]
#[command(name = "sound-monitor")]
#[command(about = "Acoustic HELP and anomaly detector", long_about = None)]
struct Cli {
    /// JSON configuration file (defaults apply when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Read a WAV file instead of integer readings on stdin
    #[arg(long)]
    wav: Option<PathBuf>,

    /// Milliseconds between readings
    #[arg(long, default_value_t = 20)]
    interval_ms: u64,

    /// Print statistics lines when the input ends
    #[arg(long)]
    status: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the report stream
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sound_detector=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    if cli.interval_ms == 0 {
        anyhow::bail!("--interval-ms must be greater than 0");
    }

    info!("Starting sound monitor");

    let config = match &cli.config {
        Some(path) => MonitorConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => MonitorConfig::default(),
    };
    let mut monitor = SoundMonitor::new(config).context("Failed to create monitor")?;
    let device = monitor.config().device.clone();

    let (tx, mut rx) = mpsc::channel::<AdcSample>(1024);

    let reader = match cli.wav.clone() {
        Some(path) => {
            let interval_ms = cli.interval_ms;
            tokio::task::spawn_blocking(move || read_wav(&path, interval_ms, tx))
        }
        None => tokio::spawn(read_stdin(tx)),
    };

    info!("Calibrating baseline...");

    let mut index: u64 = 0;
    while let Some(level) = rx.recv().await {
        let uptime_ms = index * cli.interval_ms;
        index += 1;

        match monitor.process_sample(level, uptime_ms) {
            Ok(Some(event)) => {
                for line in encode_event(&event, &device) {
                    println!("{}", line);
                }
            }
            Ok(None) => {}
            Err(e) => error!("Analysis error at reading {}: {}", index, e),
        }
    }

    match reader.await {
        Ok(Ok(())) => debug!("Input exhausted after {} readings", index),
        Ok(Err(e)) => return Err(e),
        Err(e) => return Err(e).context("Reader task panicked"),
    }

    if cli.status {
        for line in encode_stats(&monitor.stats()) {
            println!("{}", line);
        }
    }

    let stats = monitor.stats();
    info!(
        "Sound monitor stopped: {} readings, {} HELP, {} anomalies",
        stats.samples_processed, stats.help_detections, stats.anomalies_detected
    );

    Ok(())
}

/// Read one integer reading per line from stdin
async fn read_stdin(tx: mpsc::Sender<AdcSample>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line.parse::<AdcSample>() {
            Ok(level) => {
                if tx.send(level).await.is_err() {
                    break;
                }
            }
            Err(_) => warn!("Skipping non-numeric reading: {:?}", line),
        }
    }

    Ok(())
}

/// Reduce a WAV file to one envelope reading per interval
///
/// Each reading is the peak absolute amplitude of its block scaled to the
/// 12-bit ADC range, which is what an analog sound-sensor module reports.
fn read_wav(path: &Path, interval_ms: u64, tx: mpsc::Sender<AdcSample>) -> Result<()> {
    let mut reader = hound::WavReader::open(path)
        .with_context(|| format!("Failed to open WAV file {}", path.display()))?;
    let spec = reader.spec();

    info!(
        "Reading {}: {} Hz, {} channels, {} bits",
        path.display(),
        spec.sample_rate,
        spec.channels,
        spec.bits_per_sample
    );

    let frames_per_block = (spec.sample_rate as u64 * interval_ms / 1000).max(1) as usize;
    let block_len = frames_per_block * spec.channels as usize;

    let samples: Box<dyn Iterator<Item = hound::Result<f32>> + '_> = match spec.sample_format {
        hound::SampleFormat::Float => Box::new(reader.samples::<f32>()),
        hound::SampleFormat::Int => {
            let full_scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            Box::new(reader.samples::<i32>().map(move |s| s.map(|s| s as f32 / full_scale)))
        }
    };

    let mut peak = 0.0f32;
    let mut filled = 0;

    for sample in samples {
        let sample = sample.context("Failed to decode WAV samples")?;
        peak = peak.max(sample.abs());
        filled += 1;

        if filled == block_len {
            if !send_envelope(&tx, peak) {
                return Ok(());
            }
            peak = 0.0;
            filled = 0;
        }
    }

    // Trailing partial block
    if filled > 0 {
        send_envelope(&tx, peak);
    }

    Ok(())
}

/// Scale a block peak to the ADC range and send it; false once the monitor is gone
fn send_envelope(tx: &mpsc::Sender<AdcSample>, peak: f32) -> bool {
    let level = (peak.min(1.0) * ADC_MAX as f32).round() as AdcSample;
    tx.blocking_send(level).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, samples: &[i16]) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 1000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &sample in samples {
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_read_wav_block_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.wav");

        // 20 ms blocks at 1 kHz: quiet, half scale, then a 10-sample tail at full scale
        let mut samples = vec![0i16; 20];
        samples.extend([16384i16, -16384].iter().cycle().take(20));
        samples.extend([i16::MIN; 10]);
        write_wav(&path, &samples);

        let (tx, mut rx) = mpsc::channel(16);
        read_wav(&path, 20, tx).unwrap();

        let mut levels = Vec::new();
        while let Ok(level) = rx.try_recv() {
            levels.push(level);
        }
        assert_eq!(levels, vec![0, 2048, ADC_MAX]);
    }

    #[test]
    fn test_read_wav_stops_when_receiver_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("long.wav");
        write_wav(&path, &[1000i16; 2000]);

        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        assert!(read_wav(&path, 20, tx).is_ok());
    }
}
