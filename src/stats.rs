use std::time::Instant;

/// Accumulated bookkeeping for one `open()` session, used for duration math, delegate
/// reporting, and the bounce detector.
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    pub content_length: u64,
    pub bytes_received: u64,
    pub audio_data_byte_count: u64,
    pub audio_data_packet_count: u64,
    pub metadata_size_bytes: u64,
    pub bit_rate: u32,
    /// Fraction in `[0, 1]` of the last seek, or `0.0` if no seek has occurred.
    pub seek_offset: f32,
    pub bounce_count: u32,
    pub first_buffering_time: Option<Instant>,
}

impl SessionStats {
    /// Estimated session duration in seconds, per spec §4.8's duration algorithm.
    ///
    /// Returns `None` when the bitrate is unknown and packet-based duration can't be computed
    /// either — matching the spec's "seeks and durations return 0" boundary case.
    pub fn duration_seconds(
        &self,
        frames_per_packet: u32,
        sample_rate: u32,
    ) -> Option<f64> {
        if self.audio_data_packet_count > 0 && frames_per_packet > 0 && sample_rate > 0 {
            return Some(
                (self.audio_data_packet_count as f64 * frames_per_packet as f64)
                    / sample_rate as f64,
            );
        }

        let audio_len = if self.audio_data_byte_count > 0 {
            self.audio_data_byte_count
        } else {
            self.content_length
                .saturating_sub(self.metadata_size_bytes)
        };

        if self.bit_rate == 0 {
            return None;
        }

        Some(audio_len as f64 / (self.bit_rate as f64 * 0.125))
    }
}
