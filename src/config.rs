use std::path::PathBuf;
use std::time::Duration;

/// Library-level configuration for an [`crate::pipeline::AudioPipeline`].
///
/// This is a plain data struct passed by value (or held by shared reference) at pipeline
/// construction; there is no process-wide mutable global. Every component that needs a
/// configuration knob reads from the same value instead of a singleton.
///
/// A CLI (or any other frontend) is responsible for mapping user input into this type so the
/// library remains reusable outside of a CLI context.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Output ring depth. Larger tolerates more producer stalls at the cost of latency.
    pub buffer_count: usize,

    /// Bytes per output ring buffer.
    pub buffer_size: usize,

    /// Packet descriptors per ring buffer before a write forces an early enqueue.
    pub max_packet_descs: usize,

    /// Minimum packets cached ahead of the play cursor before the converter pump runs.
    pub decode_queue_size: usize,

    /// HTTP/file read chunk size per input-stream pass.
    pub http_connection_buffer_size: usize,

    /// Upper bound on `PacketCache::cached_bytes`; the back-pressure knob on the input.
    pub max_prebuffered_bytes: u64,

    /// Bytes required before feeding the converter, for continuous (unbounded) streams.
    pub required_initial_prebuffered_bytes_continuous: u64,

    /// Bytes required before feeding the converter, for non-continuous (length-known) streams.
    pub required_initial_prebuffered_bytes_non_continuous: u64,

    /// Window within which repeated `AllBuffersEmpty` events count as one bounce episode.
    pub bounce_interval: Duration,

    /// Number of bounce episodes within `bounce_interval` before closing with `Bouncing`.
    pub max_bounce_count: u32,

    /// Seconds to reach `Playing` after `open()` before `W1` fails the pipeline.
    pub startup_watchdog_period: Duration,

    /// Destination PCM sample rate.
    pub output_sample_rate: u32,

    /// Destination PCM channel count.
    pub output_num_channels: u16,

    /// Whether the caching `InputStream` overlay is enabled.
    pub cache_enabled: bool,

    /// Directory holding persisted cache entries, one file per URL hash.
    pub cache_directory: PathBuf,

    /// Aggregate disk budget for the cache directory; oldest-first eviction above this.
    pub max_disk_cache_bytes: u64,

    /// `User-Agent` header sent on every HTTP request.
    pub user_agent: String,

    /// Content-type assumed when the server omits one, or when strict checking is disabled.
    pub default_content_type: String,

    /// When true, reject responses whose content-type isn't `audio/*`/`video/*` (and isn't the
    /// default). When false, fall back to `default_content_type` and attempt playback anyway.
    pub strict_content_type_checking: bool,

    /// Permit seeks to be satisfied from the in-memory packet cache without a network round-trip.
    pub seeking_from_cache_enabled: bool,

    /// Selects the `tracing-subscriber` formatter the CLI installs. The library itself never
    /// installs a global subscriber.
    pub log_format: LogFormat,
}

/// Subscriber formatter selection for `logging::init`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum LogFormat {
    Pretty,
    Json,
    Off,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            buffer_count: 8,
            buffer_size: 64 * 1024,
            max_packet_descs: 512,
            decode_queue_size: 8,
            http_connection_buffer_size: 64 * 1024,
            max_prebuffered_bytes: 4 * 1024 * 1024,
            required_initial_prebuffered_bytes_continuous: 64 * 1024,
            required_initial_prebuffered_bytes_non_continuous: 128 * 1024,
            bounce_interval: Duration::from_secs(10),
            max_bounce_count: 3,
            startup_watchdog_period: Duration::from_secs(30),
            output_sample_rate: 44_100,
            output_num_channels: 2,
            cache_enabled: false,
            cache_directory: std::env::temp_dir().join("streamwright-cache"),
            max_disk_cache_bytes: 512 * 1024 * 1024,
            user_agent: concat!("streamwright/", env!("CARGO_PKG_VERSION")).to_string(),
            default_content_type: "audio/mpeg".to_string(),
            strict_content_type_checking: false,
            seeking_from_cache_enabled: true,
            log_format: LogFormat::Off,
        }
    }
}

impl PipelineConfig {
    /// Whether a response's content-type is acceptable given this configuration.
    ///
    /// Mirrors the allowlist shape described in the spec: `audio/*`, `video/*`, or the
    /// configured default are always acceptable; anything else is only acceptable when strict
    /// checking is disabled.
    pub fn accepts_content_type(&self, content_type: Option<&str>) -> bool {
        let ct = match content_type {
            Some(ct) => ct,
            None => return !self.strict_content_type_checking,
        };

        if ct.starts_with("audio/") || ct.starts_with("video/") || ct == self.default_content_type
        {
            return true;
        }

        !self.strict_content_type_checking
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_accepts_audio_and_video() {
        let cfg = PipelineConfig::default();
        assert!(cfg.accepts_content_type(Some("audio/mpeg")));
        assert!(cfg.accepts_content_type(Some("video/mp4")));
    }

    #[test]
    fn strict_checking_rejects_unrelated_content_type() {
        let mut cfg = PipelineConfig::default();
        cfg.strict_content_type_checking = true;
        assert!(!cfg.accepts_content_type(Some("text/html")));
        assert!(cfg.accepts_content_type(Some(cfg.default_content_type.as_str())));
    }

    #[test]
    fn lenient_checking_falls_back_to_default() {
        let cfg = PipelineConfig::default();
        assert!(cfg.accepts_content_type(Some("text/html")));
        assert!(cfg.accepts_content_type(None));
    }

    #[test]
    fn strict_checking_rejects_missing_content_type() {
        let mut cfg = PipelineConfig::default();
        cfg.strict_content_type_checking = true;
        assert!(!cfg.accepts_content_type(None));
    }
}
