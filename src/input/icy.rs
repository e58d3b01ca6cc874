//! `IcyDemux`: splits an HTTP body that advertises `icy-metaint` into audio bytes and
//! periodic metadata frames.

use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IcyState {
    ReadingAudio,
    ReadingMetaSizeByte,
    ReadingMetaBytes,
}

pub struct IcyDemux {
    metaint: u32,
    state: IcyState,
    audio_bytes_since_last_meta: u32,
    meta_remaining: u32,
    meta_buf: Vec<u8>,
}

/// Result of feeding one chunk through the demux.
#[derive(Debug, Default)]
pub struct IcyFeedResult {
    pub audio: Vec<u8>,
    pub metadata: Vec<BTreeMap<String, String>>,
}

impl IcyDemux {
    pub fn new(metaint: u32) -> Self {
        Self {
            metaint,
            state: IcyState::ReadingAudio,
            audio_bytes_since_last_meta: 0,
            meta_remaining: 0,
            meta_buf: Vec::new(),
        }
    }

    /// Feed raw bytes received from the socket; returns demuxed audio bytes (in order) and any
    /// complete metadata frames encountered.
    pub fn feed(&mut self, bytes: &[u8]) -> IcyFeedResult {
        let mut result = IcyFeedResult::default();

        for &b in bytes {
            match self.state {
                IcyState::ReadingAudio => {
                    self.audio_bytes_since_last_meta += 1;
                    if self.audio_bytes_since_last_meta == self.metaint {
                        self.state = IcyState::ReadingMetaSizeByte;
                    } else {
                        result.audio.push(b);
                    }
                }
                IcyState::ReadingMetaSizeByte => {
                    self.meta_remaining = b as u32 * 16;
                    if self.meta_remaining == 0 {
                        self.transition_to_audio();
                    } else {
                        self.meta_buf.clear();
                        self.state = IcyState::ReadingMetaBytes;
                    }
                }
                IcyState::ReadingMetaBytes => {
                    self.meta_buf.push(b);
                    self.meta_remaining -= 1;
                    if self.meta_remaining == 0 {
                        if let Some(map) = parse_metadata(&self.meta_buf) {
                            result.metadata.push(map);
                        }
                        self.transition_to_audio();
                    }
                }
            }
        }

        result
    }

    fn transition_to_audio(&mut self) {
        self.audio_bytes_since_last_meta = 0;
        self.state = IcyState::ReadingAudio;
    }
}

/// Parse `key='value';key='value';...` tokens, trying UTF-8 then falling back to Latin-1.
fn parse_metadata(buf: &[u8]) -> Option<BTreeMap<String, String>> {
    // Trim trailing NUL padding (the declared size is rounded up to a multiple of 16).
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    let buf = &buf[..end];
    if buf.is_empty() {
        return None;
    }

    let text = match std::str::from_utf8(buf) {
        Ok(s) => s.to_string(),
        Err(_) => buf.iter().map(|&b| b as char).collect::<String>(),
    };

    let mut map = BTreeMap::new();
    for token in text.split(';') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        let Some(eq) = token.find('=') else {
            continue;
        };
        let key = token[..eq].trim().to_string();
        let mut value = token[eq + 1..].trim();
        if value.starts_with('\'') && value.ends_with('\'') && value.len() >= 2 {
            value = &value[1..value.len() - 1];
        }
        map.insert(key, value.to_string());
    }

    if map.is_empty() { None } else { Some(map) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata_frame(payload: &str) -> Vec<u8> {
        let mut padded = payload.as_bytes().to_vec();
        let blocks = padded.len().div_ceil(16).max(1);
        padded.resize(blocks * 16, 0);
        let mut out = vec![blocks as u8];
        out.extend_from_slice(&padded);
        out
    }

    #[test]
    fn splits_audio_from_metadata_at_metaint_boundary() {
        let mut demux = IcyDemux::new(4);
        let mut stream = vec![1, 2, 3, 4];
        stream.extend(metadata_frame("StreamTitle='Artist - Song';"));
        stream.extend_from_slice(&[5, 6, 7, 8]);

        let result = demux.feed(&stream);
        assert_eq!(result.audio, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(result.metadata.len(), 1);
        assert_eq!(
            result.metadata[0].get("StreamTitle").unwrap(),
            "Artist - Song"
        );
    }

    #[test]
    fn zero_size_meta_byte_returns_immediately_without_emitting_metadata() {
        let mut demux = IcyDemux::new(2);
        let stream = vec![1, 2, 0, 3, 4];
        let result = demux.feed(&stream);
        assert_eq!(result.audio, vec![1, 2, 3, 4]);
        assert!(result.metadata.is_empty());
    }

    #[test]
    fn no_metadata_byte_ever_leaks_into_audio_output() {
        let mut demux = IcyDemux::new(8192);
        let mut stream = vec![0xAAu8; 8192];
        stream.extend(metadata_frame("StreamTitle='Artist - Song';"));
        stream.extend(vec![0xBBu8; 8192]);

        let result = demux.feed(&stream);
        assert_eq!(result.audio.len(), 8192 * 2);
        assert!(result.audio.iter().all(|&b| b == 0xAA || b == 0xBB));
        assert_eq!(result.metadata.len(), 1);
    }

    #[test]
    fn handles_split_metadata_across_feed_calls() {
        let mut demux = IcyDemux::new(2);
        let frame = metadata_frame("StreamTitle='x';");
        let mut full = vec![1, 2];
        full.extend(frame);
        full.extend_from_slice(&[3, 4]);

        let mid = full.len() / 2;
        let mut r1 = demux.feed(&full[..mid]);
        let r2 = demux.feed(&full[mid..]);
        r1.audio.extend(r2.audio);
        let metadata_count = r1.metadata.len() + r2.metadata.len();

        assert_eq!(r1.audio, vec![1, 2, 3, 4]);
        assert_eq!(metadata_count, 1);
    }
}
