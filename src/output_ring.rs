//! `OutputRing`: a fixed-size ring of equal-sized PCM buffers plus a parallel in-use bitmap.
//! Owns the only direct interaction with the host-provided `OutputSink`.

use crate::error::Result;
use crate::parser::PacketDesc;

/// Host-owned PCM sink. The only component instance not owned by the pipeline.
///
/// Mirrors a small pluggable-backend trait: the pipeline hands it fully-built buffers and is
/// notified asynchronously (via `on_buffer_done`, routed back onto the cooperative loop) when
/// the host has finished playing one.
pub trait OutputSink {
    /// Accept ownership of buffer `index` for playback. `descs` covers the packets that landed
    /// in `bytes`, in order, each `start_offset` relative to the start of `bytes`. The sink must
    /// eventually report it done via whatever mechanism the embedder wires back to
    /// `AudioPipeline::on_buffer_done`.
    fn enqueue(&mut self, index: usize, descs: &[PacketDesc], bytes: &[u8]) -> Result<()>;

    fn start(&mut self) -> Result<()>;
    fn pause(&mut self) -> Result<()>;
    fn stop(&mut self, immediate: bool) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingEvent {
    /// `enqueue` landed on a buffer that was still in use; back-pressure against the converter
    /// until the next `on_buffer_done`.
    Overflow,
    /// All buffers are free and the pipeline has no cached packets left to convert.
    AllBuffersEmpty,
    /// A buffer freed up after the ring had signalled `Overflow`.
    UnderflowCleared,
    None,
}

pub struct OutputRing {
    bufsize: usize,
    max_packet_descs: usize,
    in_use: Vec<bool>,
    fill_index: usize,
    fill_buf: Vec<u8>,
    fill_descs: Vec<PacketDesc>,
    queue_can_accept: bool,
}

impl OutputRing {
    pub fn new(buffer_count: usize, bufsize: usize, max_packet_descs: usize) -> Self {
        Self {
            bufsize,
            max_packet_descs,
            in_use: vec![false; buffer_count],
            fill_index: 0,
            fill_buf: Vec::with_capacity(bufsize),
            fill_descs: Vec::with_capacity(max_packet_descs),
            queue_can_accept: true,
        }
    }

    pub fn buffer_count(&self) -> usize {
        self.in_use.len()
    }

    pub fn buffers_used(&self) -> usize {
        self.in_use.iter().filter(|b| **b).count()
    }

    pub fn queue_can_accept(&self) -> bool {
        self.queue_can_accept
    }

    /// Copy `data` into the fill buffer, enqueuing the current buffer first if it would
    /// overflow `bufsize` or hit `max_packet_descs`. `desc.start_offset` is overwritten with its
    /// position within the fill buffer; only `byte_size`/`variable_frames` are taken as given.
    pub fn write_packet(
        &mut self,
        mut desc: PacketDesc,
        data: &[u8],
        sink: &mut dyn OutputSink,
    ) -> Result<RingEvent> {
        let mut event = RingEvent::None;

        if self.fill_buf.len() + data.len() > self.bufsize
            || self.fill_descs.len() == self.max_packet_descs
        {
            event = self.enqueue(sink)?;
        }

        desc.start_offset = self.fill_buf.len() as u64;
        desc.byte_size = data.len() as u32;
        self.fill_buf.extend_from_slice(data);
        self.fill_descs.push(desc);
        Ok(event)
    }

    /// Force the current fill buffer out to the sink, even if not full (used for end-of-stream
    /// flush).
    pub fn enqueue(&mut self, sink: &mut dyn OutputSink) -> Result<RingEvent> {
        if self.fill_buf.is_empty() {
            return Ok(RingEvent::None);
        }

        sink.enqueue(self.fill_index, &self.fill_descs, &self.fill_buf)?;
        self.in_use[self.fill_index] = true;
        self.fill_buf.clear();
        self.fill_descs.clear();
        self.fill_index = (self.fill_index + 1) % self.in_use.len();

        if self.in_use[self.fill_index] {
            self.queue_can_accept = false;
            return Ok(RingEvent::Overflow);
        }
        Ok(RingEvent::None)
    }

    /// The sink reports buffer `index` has finished playing.
    pub fn on_buffer_done(&mut self, index: usize, packets_remaining_in_cache: bool) -> RingEvent {
        self.in_use[index] = false;

        let was_blocked = !self.queue_can_accept;
        if was_blocked && !self.in_use[self.fill_index] {
            self.queue_can_accept = true;
        }

        if self.buffers_used() == 0 && !packets_remaining_in_cache {
            return RingEvent::AllBuffersEmpty;
        }
        if was_blocked && self.queue_can_accept {
            return RingEvent::UnderflowCleared;
        }
        RingEvent::None
    }

    pub fn start(&mut self, sink: &mut dyn OutputSink) -> Result<()> {
        sink.start()
    }

    pub fn pause(&mut self, sink: &mut dyn OutputSink) -> Result<()> {
        sink.pause()
    }

    pub fn stop(&mut self, sink: &mut dyn OutputSink, immediate: bool) -> Result<()> {
        sink.stop(immediate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct FakeSink {
        enqueued: RefCell<Vec<(usize, usize)>>,
        started: RefCell<bool>,
    }

    impl OutputSink for FakeSink {
        fn enqueue(&mut self, index: usize, _descs: &[PacketDesc], bytes: &[u8]) -> Result<()> {
            self.enqueued.borrow_mut().push((index, bytes.len()));
            Ok(())
        }
        fn start(&mut self) -> Result<()> {
            *self.started.borrow_mut() = true;
            Ok(())
        }
        fn pause(&mut self) -> Result<()> {
            Ok(())
        }
        fn stop(&mut self, _immediate: bool) -> Result<()> {
            Ok(())
        }
    }

    fn desc(byte_size: u32) -> PacketDesc {
        PacketDesc {
            start_offset: 0,
            byte_size,
            variable_frames: 0,
        }
    }

    #[test]
    fn buffers_used_equals_popcount_of_in_use() {
        let mut ring = OutputRing::new(4, 16, 8);
        let mut sink = FakeSink::default();
        assert_eq!(ring.buffers_used(), 0);
        ring.write_packet(desc(16), &[0u8; 16], &mut sink).unwrap();
        ring.write_packet(desc(16), &[0u8; 16], &mut sink).unwrap();
        assert_eq!(ring.buffers_used(), 1);
    }

    #[test]
    fn write_packet_forces_enqueue_when_over_bufsize() {
        let mut ring = OutputRing::new(2, 8, 8);
        let mut sink = FakeSink::default();
        ring.write_packet(desc(4), &[0u8; 4], &mut sink).unwrap();
        ring.write_packet(desc(6), &[0u8; 6], &mut sink).unwrap();
        assert_eq!(sink.enqueued.borrow().len(), 1);
        assert_eq!(sink.enqueued.borrow()[0], (0, 4));
    }

    #[test]
    fn overflow_sets_queue_can_accept_false_until_buffer_freed() {
        let mut ring = OutputRing::new(1, 4, 8);
        let mut sink = FakeSink::default();
        ring.write_packet(desc(4), &[0u8; 4], &mut sink).unwrap();
        let event = ring.enqueue(&mut sink).unwrap();
        assert_eq!(event, RingEvent::None);

        ring.write_packet(desc(4), &[0u8; 4], &mut sink).unwrap();
        let event = ring.enqueue(&mut sink).unwrap();
        assert_eq!(event, RingEvent::Overflow);
        assert!(!ring.queue_can_accept());

        let event = ring.on_buffer_done(0, true);
        assert_eq!(event, RingEvent::UnderflowCleared);
        assert!(ring.queue_can_accept());
    }

    #[test]
    fn all_buffers_empty_fires_when_no_packets_remain() {
        let mut ring = OutputRing::new(2, 16, 8);
        let mut sink = FakeSink::default();
        ring.write_packet(desc(4), &[0u8; 4], &mut sink).unwrap();
        ring.enqueue(&mut sink).unwrap();
        let event = ring.on_buffer_done(0, false);
        assert_eq!(event, RingEvent::AllBuffersEmpty);
    }
}
