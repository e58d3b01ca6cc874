// src/bin/stream-cli.rs

use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;

use streamwright::config::{LogFormat, PipelineConfig};
use streamwright::delegate::PipelineDelegate;
use streamwright::error::Error;
use streamwright::logging;
use streamwright::output_ring::OutputSink;
use streamwright::parser::PacketDesc;
use streamwright::pipeline::{AudioPipeline, PumpOutcome, Source};
use streamwright::state::PipelineState;

fn main() -> Result<()> {
    let params = Params::parse();
    logging::init(params.log_format);

    let config = PipelineConfig {
        cache_enabled: params.cache,
        strict_content_type_checking: params.strict_content_type,
        output_sample_rate: params.sample_rate,
        output_num_channels: params.channels,
        log_format: params.log_format,
        ..PipelineConfig::default()
    };

    let (done_tx, done_rx) = mpsc::channel::<usize>();
    let sink = FileDumpSink::create(&params.output, done_tx)
        .with_context(|| format!("failed to open output file: {}", params.output.display()))?;
    let delegate = LoggingDelegate::default();

    let mut pipeline = AudioPipeline::new(config, Box::new(sink), Box::new(delegate));
    let source = open_source(&params.input);
    pipeline.open(source).context("failed to open input")?;

    loop {
        // `FileDumpSink::enqueue` writes synchronously and reports the buffer done over
        // `done_rx` the instant the write returns, so the pipeline's ring never has to wait on a
        // real playback device to free a buffer.
        drain_done_buffers(&done_rx, &mut pipeline);

        match pipeline.pump(Instant::now()) {
            PumpOutcome::Idle => thread::sleep(Duration::from_millis(10)),
            PumpOutcome::Progressed => {}
            PumpOutcome::ReachedTerminalState => break,
        }
    }
    drain_done_buffers(&done_rx, &mut pipeline);

    if pipeline.state() == PipelineState::Failed {
        anyhow::bail!("playback failed: {:?}", pipeline.stats());
    }

    Ok(())
}

fn drain_done_buffers(done_rx: &Receiver<usize>, pipeline: &mut AudioPipeline) {
    while let Ok(index) = done_rx.try_recv() {
        pipeline.on_buffer_done(index);
    }
}

/// `-` reads stdin paths are not supported here (the pipeline owns its own input threading); a
/// bare path is a local file, anything else is treated as an HTTP(S) URL.
fn open_source(input: &str) -> Source {
    if input.starts_with("http://") || input.starts_with("https://") {
        Source::Http(input.to_string())
    } else {
        Source::File(PathBuf::from(input))
    }
}

/// Dumps raw interleaved PCM straight to a file, in enqueue order. No container wrapper: pair
/// with `sox -t raw -r <rate> -e signed -b 16 -c <channels>` (or equivalent) to listen back.
struct FileDumpSink {
    file: File,
    done_tx: Sender<usize>,
}

impl FileDumpSink {
    fn create(path: &std::path::Path, done_tx: Sender<usize>) -> io::Result<Self> {
        Ok(Self {
            file: File::create(path)?,
            done_tx,
        })
    }
}

impl OutputSink for FileDumpSink {
    fn enqueue(
        &mut self,
        index: usize,
        _descs: &[PacketDesc],
        bytes: &[u8],
    ) -> streamwright::error::Result<()> {
        self.file.write_all(bytes).map_err(Error::from)?;
        let _ = self.done_tx.send(index);
        Ok(())
    }

    fn start(&mut self) -> streamwright::error::Result<()> {
        Ok(())
    }

    fn pause(&mut self) -> streamwright::error::Result<()> {
        Ok(())
    }

    fn stop(&mut self, _immediate: bool) -> streamwright::error::Result<()> {
        self.file.flush().map_err(Error::from)
    }
}

/// Logs state transitions and metadata to stderr via `tracing`; everything else is dropped.
#[derive(Default)]
struct LoggingDelegate;

impl PipelineDelegate for LoggingDelegate {
    fn state_changed(&mut self, from: PipelineState, to: PipelineState) {
        tracing::info!(?from, ?to, "state changed");
    }

    fn error(&mut self, error: &Error) {
        tracing::error!(?error, "pipeline error");
    }

    fn meta_data_available(&mut self, meta: &std::collections::BTreeMap<String, String>) {
        for (k, v) in meta {
            tracing::info!(key = %k, value = %v, "metadata");
        }
    }

    fn bitrate_available(&mut self, bits_per_second: u32) {
        tracing::info!(bits_per_second, "bitrate");
    }

    fn received_size(&mut self, bytes_received: u64, total_bytes: u64) {
        tracing::debug!(bytes_received, total_bytes, "received");
    }

    fn buffer_empty(&mut self) {
        tracing::warn!("output buffers ran dry");
    }
}

/// CLI parameters for `stream-cli`.
#[derive(Parser, Debug)]
#[command(name = "stream-cli")]
#[command(about = "Play (or dump) a network/file audio stream")]
struct Params {
    /// Input: a local file path, or an `http(s)://` URL.
    #[arg(short = 'i', long = "input", required = true)]
    pub input: String,

    /// Raw interleaved PCM output path.
    #[arg(short = 'o', long = "output", required = true)]
    pub output: PathBuf,

    /// Destination sample rate.
    #[arg(long = "sample-rate", default_value_t = 44_100)]
    pub sample_rate: u32,

    /// Destination channel count.
    #[arg(long = "channels", default_value_t = 2)]
    pub channels: u16,

    /// Persist downloaded bytes to a local disk cache keyed by URL.
    #[arg(long = "cache", default_value_t = false)]
    pub cache: bool,

    /// Reject responses whose content-type isn't audio/video (or the configured default).
    #[arg(long = "strict-content-type", default_value_t = false)]
    pub strict_content_type: bool,

    /// Log output format.
    #[arg(long = "log-format", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}
