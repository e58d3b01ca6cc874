//! `AudioPipeline`: the orchestrator wiring `InputStream` -> `Id3Parser` -> `Parser` ->
//! `PacketCache` -> `Converter` -> `OutputRing` into one cooperative state machine.
//!
//! Container demuxing and decoding are CPU/blocking-bound work symphonia exposes only through a
//! synchronous, pull-based `FormatReader`/`Decoder` pair, so that half of the pipeline runs on a
//! dedicated worker thread fed by a channel-backed `Read` impl that blocks on incoming bytes.
//! Everything else -- polling the `InputStream`, driving the `OutputRing`, the state machine,
//! the watchdogs and the bounce detector -- runs on `pump()`, which never blocks. The worker
//! thread and the input's own background I/O thread are the only places that block; `pump()`
//! only ever does non-blocking channel operations.

use std::io::Read;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;

use crate::config::PipelineConfig;
use crate::converter::{Converter, DestFormat, FillOutcome};
use crate::delegate::PipelineDelegate;
use crate::error::{Error, Result};
use crate::id3::Id3Parser;
use crate::input::caching::CachingInput;
use crate::input::file::FileInput;
use crate::input::http::HttpInput;
use crate::input::{InputEvent, InputStream, StreamPosition};
use crate::output_ring::{OutputRing, OutputSink, RingEvent};
use crate::packet_cache::{BackPressureSignal, PacketCache, StreamKind};
use crate::parser::{PacketDesc, ParsedPacket, Parser};
use crate::state::PipelineState;
use crate::stats::SessionStats;

/// Where to read compressed audio from.
pub enum Source {
    Http(String),
    File(std::path::PathBuf),
}

/// What `pump()` accomplished this call, so a caller driving its own loop can decide whether to
/// keep calling immediately or back off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpOutcome {
    /// Nothing was ready; the caller should wait before calling again.
    Idle,
    /// At least one event was handled.
    Progressed,
    /// `Failed` or `PlaybackCompleted` was reached this call.
    ReachedTerminalState,
}

/// A blocking `Read` backed by a channel of byte chunks, used to hand the worker thread bytes
/// as they arrive from the `InputStream` without the worker ever touching the input directly.
/// Returns `Ok(0)` (true EOF) only once the sending half is dropped.
struct ChannelReader {
    rx: Mutex<Receiver<Vec<u8>>>,
    buf: Vec<u8>,
    pos: usize,
}

impl Read for ChannelReader {
    fn read(&mut self, out: &mut [u8]) -> std::io::Result<usize> {
        loop {
            if self.pos < self.buf.len() {
                let n = (self.buf.len() - self.pos).min(out.len());
                out[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
                self.pos += n;
                return Ok(n);
            }
            match self.rx.lock().unwrap().recv() {
                Ok(chunk) => {
                    self.buf = chunk;
                    self.pos = 0;
                }
                Err(_) => return Ok(0),
            }
        }
    }
}

struct SeekRequest {
    fraction: f32,
}

enum WorkerMsg {
    SourceReady {
        sample_rate: u32,
        frames_per_packet: u32,
    },
    Chunk(Vec<u8>),
    BitRate(u32),
    Backpressure(BackPressureSignal),
    SeekServedFromCache,
    SeekRequiresReopen(u64),
    Eof,
    Error(String),
}

pub struct AudioPipeline {
    config: PipelineConfig,
    state: PipelineState,
    stats: SessionStats,
    id3: Id3Parser,
    ring: OutputRing,
    sink: Box<dyn OutputSink>,
    delegate: Box<dyn PipelineDelegate>,

    input: Option<Box<dyn InputStream>>,
    raw_tx: Option<SyncSender<Vec<u8>>>,
    worker_rx: Option<Receiver<WorkerMsg>>,
    seek_tx: Option<SyncSender<SeekRequest>>,
    worker_handle: Option<thread::JoinHandle<()>>,

    current_url: Option<String>,
    source_frames_per_packet: u32,
    cache_has_packets: bool,
    /// Shared with the worker thread so a total length learned after the worker was already
    /// spawned (the common case for HTTP, where it only arrives once the response connects)
    /// still reaches the seek-estimate math.
    content_length_shared: Arc<AtomicU64>,
    /// Shared with the worker thread: whether `PacketCache` still holds unconverted packets,
    /// read back by [`AudioPipeline::on_buffer_done`] to decide whether an empty ring means a
    /// genuine underrun or just end-of-stream drain.
    cache_has_pending: Arc<AtomicBool>,

    opened_at: Option<Instant>,
    w1_fired: bool,
    bounce_window_start: Option<Instant>,
    bounce_count_in_window: u32,
}

impl AudioPipeline {
    pub fn new(
        config: PipelineConfig,
        sink: Box<dyn OutputSink>,
        delegate: Box<dyn PipelineDelegate>,
    ) -> Self {
        let ring = OutputRing::new(
            config.buffer_count,
            config.buffer_size,
            config.max_packet_descs,
        );
        Self {
            config,
            state: PipelineState::Stopped,
            stats: SessionStats::default(),
            id3: Id3Parser::new(),
            ring,
            sink,
            delegate,
            input: None,
            raw_tx: None,
            worker_rx: None,
            seek_tx: None,
            worker_handle: None,
            current_url: None,
            source_frames_per_packet: 0,
            cache_has_packets: false,
            content_length_shared: Arc::new(AtomicU64::new(0)),
            cache_has_pending: Arc::new(AtomicBool::new(false)),
            opened_at: None,
            w1_fired: false,
            bounce_window_start: None,
            bounce_count_in_window: 0,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn duration_seconds(&self) -> Option<f64> {
        self.stats
            .duration_seconds(self.source_frames_per_packet, self.config.output_sample_rate)
    }

    pub fn prebuffered_fraction(&self) -> f32 {
        if self.config.max_prebuffered_bytes == 0 {
            return 1.0;
        }
        (self.stats.audio_data_byte_count as f32 / self.config.max_prebuffered_bytes as f32).min(1.0)
    }

    /// Open a new source, tearing down any previous session first.
    pub fn open(&mut self, source: Source) -> Result<()> {
        self.close();

        let (url, mut input): (String, Box<dyn InputStream>) = match source {
            Source::File(path) => (
                path.display().to_string(),
                Box::new(FileInput::new(path, self.config.http_connection_buffer_size)),
            ),
            Source::Http(url) => {
                let http = HttpInput::new(
                    url.clone(),
                    self.config.user_agent.clone(),
                    self.config.http_connection_buffer_size,
                );
                let input: Box<dyn InputStream> = if self.config.cache_enabled {
                    Box::new(CachingInput::new(
                        http,
                        self.config.cache_directory.clone(),
                        &url,
                        self.config.max_disk_cache_bytes,
                        self.config.http_connection_buffer_size,
                    ))
                } else {
                    Box::new(http)
                };
                (url, input)
            }
        };

        input.open(None)?;
        self.current_url = Some(url.clone());
        self.id3.reset();
        self.stats = SessionStats::default();
        self.opened_at = None;
        self.w1_fired = false;
        self.bounce_window_start = None;
        self.bounce_count_in_window = 0;
        self.content_length_shared
            .store(input.content_length(), Ordering::Relaxed);

        self.spawn_worker(&url);
        self.input = Some(input);
        self.set_state(PipelineState::Buffering);
        Ok(())
    }

    fn spawn_worker(&mut self, url: &str) {
        let (raw_tx, raw_rx) = mpsc::sync_channel::<Vec<u8>>(4);
        let (worker_tx, worker_rx) = mpsc::sync_channel::<WorkerMsg>(8);
        let (seek_tx, seek_rx) = mpsc::sync_channel::<SeekRequest>(1);

        let hint_extension = extension_hint(url);
        let dest = DestFormat {
            sample_rate: self.config.output_sample_rate,
            channels: self.config.output_num_channels,
        };
        let stream_kind = if self.content_length_shared.load(Ordering::Relaxed) == 0 {
            StreamKind::Continuous
        } else {
            StreamKind::NonContinuous
        };
        let max_prebuffered_bytes = self.config.max_prebuffered_bytes;
        let content_length_shared = Arc::clone(&self.content_length_shared);
        self.cache_has_pending = Arc::new(AtomicBool::new(true));
        let cache_has_pending = Arc::clone(&self.cache_has_pending);

        let handle = thread::spawn(move || {
            run_worker(
                raw_rx,
                seek_rx,
                worker_tx,
                hint_extension,
                dest,
                stream_kind,
                max_prebuffered_bytes,
                content_length_shared,
                cache_has_pending,
            )
        });

        self.raw_tx = Some(raw_tx);
        self.worker_rx = Some(worker_rx);
        self.seek_tx = Some(seek_tx);
        self.worker_handle = Some(handle);
    }

    pub fn pause(&mut self) -> Result<()> {
        if self.state == PipelineState::Playing {
            if let Some(input) = self.input.as_mut() {
                input.set_scheduled(false);
            }
            self.ring.pause(self.sink.as_mut())?;
            self.set_state(PipelineState::Paused);
        }
        Ok(())
    }

    pub fn resume(&mut self) -> Result<()> {
        if self.state == PipelineState::Paused {
            if let Some(input) = self.input.as_mut() {
                input.set_scheduled(true);
            }
            self.ring.start(self.sink.as_mut())?;
            self.set_state(PipelineState::Playing);
        }
        Ok(())
    }

    /// The host reports that buffer `index` (previously handed to `OutputSink::enqueue`) has
    /// finished playing and may be reused.
    pub fn on_buffer_done(&mut self, index: usize) {
        let packets_remaining = self.cache_has_pending.load(Ordering::Relaxed);
        match self.ring.on_buffer_done(index, packets_remaining) {
            RingEvent::AllBuffersEmpty => self.note_underrun(),
            RingEvent::UnderflowCleared => {
                if let Some(input) = self.input.as_mut() {
                    input.set_scheduled(true);
                }
            }
            RingEvent::Overflow | RingEvent::None => {}
        }
    }

    pub fn close(&mut self) {
        self.teardown_session();
        self.set_state(PipelineState::Stopped);
    }

    /// Tear down the input stream, worker thread, and output ring without touching `state` --
    /// shared by `close()` (-> `Stopped`) and `fail()` (-> `Failed`).
    fn teardown_session(&mut self) {
        if let Some(input) = self.input.as_mut() {
            input.close();
        }
        self.input = None;
        self.raw_tx = None;
        self.worker_rx = None;
        self.seek_tx = None;
        self.worker_handle = None;
        let _ = self.ring.stop(self.sink.as_mut(), true);
    }

    /// Request a seek to `fraction` (`[0, 1]`); a no-op unless currently `Playing`, and a no-op
    /// if a seek is already in flight.
    pub fn seek_to_fraction(&mut self, fraction: f32) {
        if self.state != PipelineState::Playing {
            return;
        }
        let Some(tx) = &self.seek_tx else {
            return;
        };
        if tx
            .try_send(SeekRequest {
                fraction: fraction.clamp(0.0, 1.0),
            })
            .is_ok()
        {
            self.set_state(PipelineState::Seeking);
        }
    }

    /// Advance the pipeline by one tick. Never blocks.
    pub fn pump(&mut self, now: Instant) -> PumpOutcome {
        if self.state.is_terminal() {
            return PumpOutcome::ReachedTerminalState;
        }

        if self.opened_at.is_none() && self.input.is_some() {
            self.opened_at = Some(now);
        }

        let mut progressed = false;
        progressed |= self.drain_input_event();
        progressed |= self.drain_worker_message();
        progressed |= self.maybe_start_playback();
        self.check_watchdogs(now);

        if self.state.is_terminal() {
            PumpOutcome::ReachedTerminalState
        } else if progressed {
            PumpOutcome::Progressed
        } else {
            PumpOutcome::Idle
        }
    }

    fn drain_input_event(&mut self) -> bool {
        let Some(input) = self.input.as_mut() else {
            return false;
        };
        let Some(event) = input.poll() else {
            return false;
        };
        self.handle_input_event(event);
        true
    }

    fn handle_input_event(&mut self, event: InputEvent) {
        match event {
            InputEvent::ReadyToRead => {}
            InputEvent::ContentType(ct) => {
                if !self.config.accepts_content_type(ct.as_deref()) {
                    self.fail(Error::open(format!(
                        "rejected content-type: {ct:?}"
                    )));
                }
            }
            InputEvent::BytesAvailable(bytes) => {
                self.stats.bytes_received += bytes.len() as u64;
                if let Some(input) = self.input.as_ref() {
                    self.stats.content_length = input.content_length();
                    self.content_length_shared
                        .store(self.stats.content_length, Ordering::Relaxed);
                }

                if self.id3.want_data() {
                    if let Some(meta) = self.id3.feed(&bytes) {
                        self.stats.metadata_size_bytes += self.id3.tag_size() as u64;
                        self.delegate.meta_data_available(&meta);
                    }
                }

                if let Some(tx) = &self.raw_tx {
                    let _ = tx.send(bytes);
                }

                self.delegate
                    .received_size(self.stats.bytes_received, self.stats.content_length);
            }
            InputEvent::MetaData(map) => self.delegate.meta_data_available(&map),
            InputEvent::MetaDataSize(size) => self.stats.metadata_size_bytes += size,
            InputEvent::End => {
                // Dropping the sender is what lets the worker's `ChannelReader` observe true
                // EOF instead of stalling on `recv()` forever.
                self.raw_tx = None;
            }
            InputEvent::Error(msg) => self.fail(Error::network(msg)),
        }
    }

    fn drain_worker_message(&mut self) -> bool {
        let Some(rx) = self.worker_rx.as_ref() else {
            return false;
        };
        match rx.try_recv() {
            Ok(msg) => {
                self.handle_worker_message(msg);
                true
            }
            Err(TryRecvError::Empty) => false,
            Err(TryRecvError::Disconnected) => false,
        }
    }

    fn handle_worker_message(&mut self, msg: WorkerMsg) {
        match msg {
            WorkerMsg::SourceReady {
                sample_rate: _,
                frames_per_packet,
            } => {
                self.source_frames_per_packet = frames_per_packet;
            }
            WorkerMsg::Chunk(bytes) => {
                self.cache_has_packets = true;
                self.stats.audio_data_byte_count += bytes.len() as u64;
                let samples: Vec<i16> = bytes
                    .chunks_exact(2)
                    .map(|c| i16::from_ne_bytes([c[0], c[1]]))
                    .collect();

                let bytes_per_frame = DestFormat {
                    sample_rate: self.config.output_sample_rate,
                    channels: self.config.output_num_channels,
                }
                .bytes_per_frame();
                let desc = PacketDesc {
                    start_offset: 0,
                    byte_size: bytes.len() as u32,
                    variable_frames: if bytes_per_frame > 0 {
                        (bytes.len() / bytes_per_frame) as u32
                    } else {
                        0
                    },
                };
                self.delegate.samples_available(&samples, &desc);

                match self.ring.write_packet(desc, &bytes, self.sink.as_mut()) {
                    Ok(RingEvent::Overflow) => {}
                    Ok(RingEvent::AllBuffersEmpty) => self.note_underrun(),
                    Ok(_) => {}
                    Err(e) => self.fail(e),
                }
            }
            WorkerMsg::BitRate(bps) => {
                self.stats.bit_rate = bps;
                self.delegate.bitrate_available(bps);
            }
            WorkerMsg::Backpressure(sig) => {
                if let Some(input) = self.input.as_mut() {
                    if sig.should_pause_input {
                        input.set_scheduled(false);
                    } else if sig.should_resume_input {
                        input.set_scheduled(true);
                    }
                }
            }
            WorkerMsg::SeekServedFromCache => {
                self.set_state(PipelineState::Playing);
            }
            WorkerMsg::SeekRequiresReopen(byte_offset) => {
                if let Some(url) = self.current_url.clone() {
                    let total_length = self
                        .input
                        .as_ref()
                        .map(|i| i.content_length())
                        .unwrap_or(0);
                    if let Some(input) = self.input.as_mut() {
                        input.close();
                    }
                    let mut input: Box<dyn InputStream> = Box::new(HttpInput::new(
                        url.clone(),
                        self.config.user_agent.clone(),
                        self.config.http_connection_buffer_size,
                    ));
                    let range = StreamPosition {
                        start: byte_offset,
                        end: total_length,
                    };
                    if input.open(Some(range)).is_ok() {
                        self.spawn_worker(&url);
                        self.input = Some(input);
                    }
                }
            }
            WorkerMsg::Eof => {
                if self.stats.content_length == 0 {
                    self.fail(Error::network(
                        "stream ended unexpectedly (content length unknown)",
                    ));
                    return;
                }
                // Flush whatever's left in the fill buffer; it's short of a full buffer's
                // worth or it would already have been enqueued by `write_packet`.
                let _ = self.ring.enqueue(self.sink.as_mut());
                self.set_state(PipelineState::EndOfFile);
            }
            WorkerMsg::Error(msg) => self.fail(Error::parse(msg)),
        }
    }

    fn maybe_start_playback(&mut self) -> bool {
        if self.state != PipelineState::Buffering {
            return false;
        }

        let required = if self.stats.content_length > 0 {
            self.config.required_initial_prebuffered_bytes_non_continuous
        } else {
            self.config.required_initial_prebuffered_bytes_continuous
        };

        if self.stats.bytes_received >= required && self.cache_has_packets {
            self.set_state(PipelineState::Playing);
            let _ = self.ring.start(self.sink.as_mut());
            return true;
        }
        false
    }

    fn note_underrun(&mut self) {
        if self.state == PipelineState::EndOfFile {
            self.set_state(PipelineState::PlaybackCompleted);
            return;
        }

        self.delegate.buffer_empty();
        let now = Instant::now();
        // W1 re-arms on every `AllBuffersEmpty`: normal playback that later underruns shouldn't
        // be judged against how long ago the session originally opened.
        self.opened_at = Some(now);
        match self.bounce_window_start {
            Some(start) if now.duration_since(start) <= self.config.bounce_interval => {
                self.bounce_count_in_window += 1;
            }
            _ => {
                self.bounce_window_start = Some(now);
                self.bounce_count_in_window = 1;
            }
        }
        self.stats.bounce_count = self.bounce_count_in_window;

        if self.bounce_count_in_window > self.config.max_bounce_count {
            self.fail(Error::bouncing(self.bounce_count_in_window));
        } else {
            self.set_state(PipelineState::Buffering);
        }
    }

    fn check_watchdogs(&mut self, now: Instant) {
        if self.w1_fired {
            return;
        }
        let Some(opened_at) = self.opened_at else {
            return;
        };
        if self.state == PipelineState::Playing || self.state == PipelineState::Paused {
            return;
        }
        if now.duration_since(opened_at) > self.config.startup_watchdog_period {
            self.w1_fired = true;
            self.fail(Error::open("startup watchdog: never reached Playing"));
        }
    }

    fn fail(&mut self, error: Error) {
        self.teardown_session();
        self.set_state(PipelineState::Failed);
        self.delegate.error(&error);
    }

    fn set_state(&mut self, new_state: PipelineState) {
        if new_state == self.state {
            return;
        }
        let old = self.state;
        self.state = new_state;
        self.delegate.state_changed(old, new_state);
    }
}

fn extension_hint(url: &str) -> Option<String> {
    url.rsplit('.')
        .next()
        .filter(|ext| ext.len() <= 4 && !ext.contains('/'))
        .map(|s| s.to_ascii_lowercase())
}

#[allow(clippy::too_many_arguments)]
fn run_worker(
    raw_rx: Receiver<Vec<u8>>,
    seek_rx: Receiver<SeekRequest>,
    tx: SyncSender<WorkerMsg>,
    hint_extension: Option<String>,
    dest: DestFormat,
    stream_kind: StreamKind,
    max_prebuffered_bytes: u64,
    content_length_shared: Arc<AtomicU64>,
    cache_has_pending: Arc<AtomicBool>,
) {
    let reader = ChannelReader {
        rx: Mutex::new(raw_rx),
        buf: Vec::new(),
        pos: 0,
    };

    let mut parser = match Parser::new(reader, hint_extension.as_deref()) {
        Ok(p) => p,
        Err(e) => {
            cache_has_pending.store(false, Ordering::Relaxed);
            let _ = tx.send(WorkerMsg::Error(e.to_string()));
            return;
        }
    };

    let Some(source_format) = parser.source_format().cloned() else {
        cache_has_pending.store(false, Ordering::Relaxed);
        let _ = tx.send(WorkerMsg::Error("unable to determine source format".into()));
        return;
    };

    let _ = tx.send(WorkerMsg::SourceReady {
        sample_rate: source_format.sample_rate,
        frames_per_packet: source_format.frames_per_packet,
    });

    let track = parser.track().clone();
    let mut converter = match Converter::new(&track, &source_format, dest) {
        Ok(c) => c,
        Err(e) => {
            cache_has_pending.store(false, Ordering::Relaxed);
            let _ = tx.send(WorkerMsg::Error(e.to_string()));
            return;
        }
    };

    let mut cache = PacketCache::new(max_prebuffered_bytes, stream_kind);
    let bytes_per_frame = dest.bytes_per_frame();
    let mut decode_buf = vec![0u8; 4096 * bytes_per_frame];

    loop {
        if let Ok(seek) = seek_rx.try_recv() {
            let total_content_length = content_length_shared.load(Ordering::Relaxed);
            handle_seek(&mut parser, &mut cache, total_content_length, seek, &tx);
        }

        let mut pull_err: Option<Error> = None;
        let outcome = converter.fill(&mut decode_buf, || loop {
            if let Some(cached) = cache.next_for_converter() {
                return Some(ParsedPacket {
                    desc: cached.desc,
                    data: cached.data,
                });
            }
            match parser.next_packet() {
                Ok(Some(packet)) => {
                    let (_, sig) = cache.append(packet);
                    if sig.should_pause_input || sig.should_resume_input {
                        let _ = tx.send(WorkerMsg::Backpressure(sig));
                    }
                    if parser.bit_rate() != 0 {
                        let _ = tx.send(WorkerMsg::BitRate(parser.bit_rate()));
                    }
                }
                Ok(None) => return None,
                Err(e) => {
                    pull_err = Some(e);
                    return None;
                }
            }
        });

        if let Some(err) = pull_err {
            cache_has_pending.store(false, Ordering::Relaxed);
            let _ = tx.send(WorkerMsg::Error(err.to_string()));
            return;
        }

        match outcome {
            Ok(FillOutcome::Filled(n)) => {
                if n > 0 {
                    let _ = tx.send(WorkerMsg::Chunk(decode_buf[..n].to_vec()));
                }
            }
            Ok(FillOutcome::Exhausted(n)) => {
                if n > 0 {
                    let _ = tx.send(WorkerMsg::Chunk(decode_buf[..n].to_vec()));
                }
                if let Err(e) = converter.finalize() {
                    cache_has_pending.store(false, Ordering::Relaxed);
                    let _ = tx.send(WorkerMsg::Error(e.to_string()));
                    return;
                }
                if let Ok(FillOutcome::Exhausted(n2)) = converter.fill(&mut decode_buf, || None) {
                    if n2 > 0 {
                        let _ = tx.send(WorkerMsg::Chunk(decode_buf[..n2].to_vec()));
                    }
                }
                cache_has_pending.store(false, Ordering::Relaxed);
                let _ = tx.send(WorkerMsg::Eof);
                return;
            }
            Err(e) => {
                cache_has_pending.store(false, Ordering::Relaxed);
                let _ = tx.send(WorkerMsg::Error(e.to_string()));
                return;
            }
        }

        let sig = cache.evict_processed_up_to_play_cursor();
        if sig.should_pause_input || sig.should_resume_input {
            let _ = tx.send(WorkerMsg::Backpressure(sig));
        }
        cache_has_pending.store(cache.packets_from_play_cursor() > 0, Ordering::Relaxed);
    }
}

/// Resolve a fractional seek against an approximate total-packet estimate (total content length
/// divided by the average observed packet size so far). Cache-hit seeks skip the network
/// round-trip entirely; otherwise the pump loop re-opens the input at the estimated byte offset.
fn handle_seek(
    parser: &mut Parser,
    cache: &mut PacketCache,
    total_content_length: u64,
    seek: SeekRequest,
    tx: &SyncSender<WorkerMsg>,
) {
    let packet_count = parser.audio_data_packet_count();
    if packet_count == 0 || total_content_length == 0 {
        return;
    }
    let avg_bytes_per_packet = parser.audio_data_byte_count() / packet_count;
    if avg_bytes_per_packet == 0 {
        return;
    }
    let total_packets_estimate = total_content_length / avg_bytes_per_packet;
    let target_identifier = (seek.fraction as f64 * total_packets_estimate as f64) as u64;

    if cache.seek_play_cursor_to(target_identifier) {
        let _ = tx.send(WorkerMsg::SeekServedFromCache);
    } else {
        parser.mark_discontinuity();
        let target_byte_offset = parser.seek_to_packet(target_identifier);
        let _ = tx.send(WorkerMsg::SeekRequiresReopen(target_byte_offset));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_hint_reads_trailing_extension() {
        assert_eq!(
            extension_hint("http://example.com/track.mp3"),
            Some("mp3".to_string())
        );
        assert_eq!(extension_hint("http://example.com/stream"), None);
    }

    #[test]
    fn prebuffered_fraction_caps_at_one() {
        let config = PipelineConfig {
            max_prebuffered_bytes: 100,
            ..PipelineConfig::default()
        };
        let mut pipeline = AudioPipeline::new(
            config,
            Box::new(NullSink),
            Box::new(crate::delegate::NullDelegate),
        );
        pipeline.stats.audio_data_byte_count = 200;
        assert_eq!(pipeline.prebuffered_fraction(), 1.0);
    }

    struct NullSink;
    impl OutputSink for NullSink {
        fn enqueue(&mut self, _index: usize, _descs: &[PacketDesc], _bytes: &[u8]) -> Result<()> {
            Ok(())
        }
        fn start(&mut self) -> Result<()> {
            Ok(())
        }
        fn pause(&mut self) -> Result<()> {
            Ok(())
        }
        fn stop(&mut self, _immediate: bool) -> Result<()> {
            Ok(())
        }
    }
}
