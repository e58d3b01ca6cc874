//! `PacketCache`: a FIFO of parsed source packets tagged by a monotonically increasing
//! identifier, with a tail cursor (where the parser appends) and a play cursor (the next packet
//! handed to the converter). Bounded by a configured byte budget; drives input back-pressure.

use std::collections::VecDeque;

use crate::parser::{PacketDesc, ParsedPacket};

/// One packet as held by the cache, with its assigned identifier.
#[derive(Debug, Clone)]
pub struct CachedPacket {
    pub identifier: u64,
    pub desc: PacketDesc,
    pub data: Vec<u8>,
}

/// Whether the stream this cache serves has a known end (affects eviction aggressiveness: a
/// non-continuous stream retains processed packets longer so in-cache seeking stays possible).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Continuous,
    NonContinuous,
}

/// Effects an `append` or eviction pass had, so the pipeline can react (toggle the input's
/// scheduled flag).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BackPressureSignal {
    pub should_pause_input: bool,
    pub should_resume_input: bool,
}

pub struct PacketCache {
    queue: VecDeque<CachedPacket>,
    /// Index into `queue` of the play cursor (the next packet for the converter). `None` when
    /// the queue is empty.
    play_cursor_index: usize,
    /// Identifiers at or before this index have been handed to the converter ("processed") but
    /// may not yet be evicted.
    next_identifier: u64,
    cached_bytes: u64,
    max_prebuffered_bytes: u64,
    stream_kind: StreamKind,
    over_cap: bool,
}

impl PacketCache {
    pub fn new(max_prebuffered_bytes: u64, stream_kind: StreamKind) -> Self {
        Self {
            queue: VecDeque::new(),
            play_cursor_index: 0,
            next_identifier: 0,
            cached_bytes: 0,
            max_prebuffered_bytes,
            stream_kind,
            over_cap: false,
        }
    }

    pub fn cached_bytes(&self) -> u64 {
        self.cached_bytes
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Number of packets from the play cursor to the tail, inclusive of the play cursor.
    pub fn packets_from_play_cursor(&self) -> usize {
        self.queue.len().saturating_sub(self.play_cursor_index)
    }

    /// Reset identifiers back to zero; used on a fresh `open()` that doesn't preserve the cache
    /// (e.g. a seek that goes out to the network rather than being served from cache).
    pub fn reset(&mut self) {
        self.queue.clear();
        self.play_cursor_index = 0;
        self.next_identifier = 0;
        self.cached_bytes = 0;
        self.over_cap = false;
    }

    /// Append a freshly parsed packet, assigning it the next identifier.
    ///
    /// Returns a back-pressure signal: `should_pause_input` fires the instant the cap is
    /// crossed, mirroring the spec's "cap crossed -> set_scheduled(false) -> immediate eviction
    /// attempt" sequencing (the caller should follow up with `evict_processed_up_to_play_cursor`
    /// and honor whatever signal that returns too).
    pub fn append(&mut self, packet: ParsedPacket) -> (u64, BackPressureSignal) {
        let identifier = self.next_identifier;
        self.next_identifier += 1;
        self.cached_bytes += packet.desc.byte_size as u64;

        self.queue.push_back(CachedPacket {
            identifier,
            desc: packet.desc,
            data: packet.data,
        });

        let mut signal = BackPressureSignal::default();
        if !self.over_cap && self.cached_bytes >= self.max_prebuffered_bytes {
            self.over_cap = true;
            signal.should_pause_input = true;
        }

        (identifier, signal)
    }

    /// Return the packet at the play cursor and advance it. The packet remains stored (not
    /// freed) until an eviction pass runs.
    pub fn next_for_converter(&mut self) -> Option<CachedPacket> {
        let packet = self.queue.get(self.play_cursor_index)?.clone();
        self.play_cursor_index += 1;
        Some(packet)
    }

    /// Free packets strictly older than the play cursor.
    ///
    /// For non-continuous streams, retains everything up to (but not including) the play
    /// cursor's predecessor only once the cap has actually been crossed, so in-cache seeking
    /// stays possible until memory pressure forces the issue; for continuous streams (no
    /// seeking), frees eagerly on every pass.
    pub fn evict_processed_up_to_play_cursor(&mut self) -> BackPressureSignal {
        let should_evict_eagerly =
            self.stream_kind == StreamKind::Continuous || self.over_cap;

        if !should_evict_eagerly {
            return BackPressureSignal::default();
        }

        while self.play_cursor_index > 0 {
            let Some(front) = self.queue.pop_front() else {
                break;
            };
            self.cached_bytes = self.cached_bytes.saturating_sub(front.desc.byte_size as u64);
            self.play_cursor_index -= 1;
        }

        let mut signal = BackPressureSignal::default();
        if self.over_cap && self.cached_bytes < self.max_prebuffered_bytes {
            self.over_cap = false;
            signal.should_resume_input = true;
        }
        signal
    }

    pub fn find_by_identifier(&self, id: u64) -> Option<&CachedPacket> {
        self.queue.iter().find(|p| p.identifier == id)
    }

    /// Move the play cursor directly to a cached packet's identifier (in-cache seek), skipping
    /// the network round-trip. Returns `false` if the identifier isn't currently cached.
    pub fn seek_play_cursor_to(&mut self, id: u64) -> bool {
        match self.queue.iter().position(|p| p.identifier == id) {
            Some(idx) => {
                self.play_cursor_index = idx;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(byte_size: u32) -> ParsedPacket {
        ParsedPacket {
            desc: PacketDesc {
                start_offset: 0,
                byte_size,
                variable_frames: 1152,
            },
            data: vec![0u8; byte_size as usize],
        }
    }

    #[test]
    fn identifiers_increase_monotonically() {
        let mut cache = PacketCache::new(1_000_000, StreamKind::NonContinuous);
        let (id0, _) = cache.append(packet(100));
        let (id1, _) = cache.append(packet(100));
        let (id2, _) = cache.append(packet(100));
        assert_eq!((id0, id1, id2), (0, 1, 2));
    }

    #[test]
    fn cached_bytes_equals_sum_of_live_packets() {
        let mut cache = PacketCache::new(1_000_000, StreamKind::NonContinuous);
        cache.append(packet(100));
        cache.append(packet(200));
        assert_eq!(cache.cached_bytes(), 300);
        cache.next_for_converter();
        cache.evict_processed_up_to_play_cursor();
        // non-continuous + under cap: no eviction happens yet.
        assert_eq!(cache.cached_bytes(), 300);
    }

    #[test]
    fn crossing_cap_signals_pause_and_then_resume_after_eviction() {
        let mut cache = PacketCache::new(150, StreamKind::NonContinuous);
        let (_, sig1) = cache.append(packet(100));
        assert!(!sig1.should_pause_input);
        let (_, sig2) = cache.append(packet(100));
        assert!(sig2.should_pause_input);

        cache.next_for_converter();
        cache.next_for_converter();
        let evict_signal = cache.evict_processed_up_to_play_cursor();
        assert!(evict_signal.should_resume_input);
        assert_eq!(cache.cached_bytes(), 0);
    }

    #[test]
    fn continuous_stream_evicts_eagerly_even_under_cap() {
        let mut cache = PacketCache::new(1_000_000, StreamKind::Continuous);
        cache.append(packet(100));
        cache.next_for_converter();
        cache.evict_processed_up_to_play_cursor();
        assert_eq!(cache.cached_bytes(), 0);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn find_by_identifier_supports_in_cache_seek() {
        let mut cache = PacketCache::new(1_000_000, StreamKind::NonContinuous);
        cache.append(packet(10));
        cache.append(packet(10));
        cache.append(packet(10));
        assert!(cache.find_by_identifier(1).is_some());
        assert!(cache.seek_play_cursor_to(1));
        assert_eq!(cache.next_for_converter().unwrap().identifier, 1);
    }

    #[test]
    fn packets_from_play_cursor_tracks_remaining_queue_depth() {
        let mut cache = PacketCache::new(1_000_000, StreamKind::NonContinuous);
        cache.append(packet(10));
        cache.append(packet(10));
        assert_eq!(cache.packets_from_play_cursor(), 2);
        cache.next_for_converter();
        assert_eq!(cache.packets_from_play_cursor(), 1);
    }
}
