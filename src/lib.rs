//! `streamwright` — a network audio streaming engine.
//!
//! This crate provides:
//! - ICY/Shoutcast, plain HTTP, and file input, with optional on-disk response caching
//! - Container demuxing and codec decode to PCM (via Symphonia), with sample-rate conversion
//! - A bounded packet cache and fixed-size output ring buffer, driven by a non-blocking
//!   cooperative `pump()` loop
//! - ID3v2 and ICY inline metadata extraction
//! - Seek, pause/resume, and a pluggable host-provided `OutputSink`
//!
//! The library is designed to be driven by both CLI tools and long-running host applications,
//! with an emphasis on clarity, back-pressure correctness, and a `pump()` loop that never blocks.

pub mod config;
pub mod converter;
pub mod decode;
pub mod delegate;
pub mod demux;
pub mod error;
pub mod id3;
pub mod input;
pub mod output_ring;
pub mod packet_cache;
pub mod parser;
pub mod pipeline;
pub mod state;
pub mod stats;

#[cfg(feature = "visualization")]
pub mod visualization;

// Logging configuration and control.
pub mod logging;
