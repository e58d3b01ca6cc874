//! Codec-to-PCM converter (`Converter` in the component design).
//!
//! Pull model: the pipeline calls [`Converter::fill`] with an output buffer and a callback that
//! hands back the next source packet; the converter decodes and resamples until the buffer is
//! full or the callback is exhausted. Once exhausted, the converter must be re-created (mirrors
//! the symphonia decoder + rubato resampler lifecycle this is built on).

use std::collections::VecDeque;

use rubato::{Resampler, SincFixedIn, WindowFunction};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::Decoder;
use symphonia::core::formats::Track;

use crate::decode::{decode_packet_and_then, make_decoder_for_track};
use crate::error::{Error, Result};
use crate::parser::{ParsedPacket, SourceFormat};

/// Destination PCM format: fixed for a session, 16-bit signed interleaved native-endian, one
/// frame per packet.
#[derive(Debug, Clone, Copy)]
pub struct DestFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl DestFormat {
    pub fn bytes_per_frame(&self) -> usize {
        2 * self.channels as usize
    }
}

/// Whether the last `fill()` call ran the source packet supply dry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillOutcome {
    /// The output buffer was fully written without exhausting the source.
    Filled(usize),
    /// Fewer than a full buffer's worth of frames were produced because the packet supply ran
    /// out; the converter must be re-created before its next use.
    Exhausted(usize),
}

pub struct Converter {
    decoder: Box<dyn Decoder>,
    source: SourceFormat,
    dest: DestFormat,
    sample_buf_f32: Option<SampleBuffer<f32>>,
    resampler: Option<SincFixedIn<f32>>,
    mono_acc: Vec<Vec<f32>>, // per dest channel, pre-resample accumulator
    resample_in: Vec<Vec<f32>>,
    pending: VecDeque<i16>, // interleaved, ready to copy out
    exhausted: bool,
}

impl Converter {
    pub fn new(track: &Track, source: &SourceFormat, dest: DestFormat) -> Result<Self> {
        let decoder = make_decoder_for_track(track).map_err(Error::from)?;

        Ok(Self {
            decoder,
            source: source.clone(),
            dest,
            sample_buf_f32: None,
            resampler: None,
            mono_acc: vec![Vec::new(); dest.channels as usize],
            resample_in: vec![Vec::new(); dest.channels as usize],
            pending: VecDeque::new(),
            exhausted: false,
        })
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Fill `out` with interleaved little/native-endian 16-bit PCM frames, pulling as many
    /// source packets as needed via `next_source_packet`.
    pub fn fill(
        &mut self,
        out: &mut [u8],
        mut next_source_packet: impl FnMut() -> Option<ParsedPacket>,
    ) -> Result<FillOutcome> {
        let frame_bytes = self.dest.bytes_per_frame();
        let capacity_frames = out.len() / frame_bytes;
        let mut written_frames = 0usize;

        while written_frames < capacity_frames {
            if let Some(frame) = self.pop_pending_frame() {
                write_frame(out, written_frames, &frame, self.dest.channels);
                written_frames += 1;
                continue;
            }

            let Some(packet) = next_source_packet() else {
                self.exhausted = true;
                return Ok(FillOutcome::Exhausted(written_frames * frame_bytes));
            };

            self.decode_into_pending(&packet)?;
        }

        Ok(FillOutcome::Filled(written_frames * frame_bytes))
    }

    fn pop_pending_frame(&mut self) -> Option<Vec<i16>> {
        if self.pending.len() < self.dest.channels as usize {
            return None;
        }
        let mut frame = Vec::with_capacity(self.dest.channels as usize);
        for _ in 0..self.dest.channels {
            frame.push(self.pending.pop_front().unwrap());
        }
        Some(frame)
    }

    /// Decode one compressed packet, remapping its channels to the destination layout and
    /// appending the result (resampled if the source rate differs) to `pending`.
    ///
    /// Delegates the actual Symphonia decode call and its recoverable-error handling
    /// (`DecodeError`/`IoError` skip the packet; anything else is fatal) to
    /// [`crate::decode::decode_packet_and_then`].
    fn decode_into_pending(&mut self, packet: &ParsedPacket) -> Result<()> {
        let symphonia_packet = symphonia::core::formats::Packet::new_from_slice(
            0,
            0,
            packet.desc.variable_frames as u64,
            &packet.data,
        );

        let dest = self.dest;
        let sample_buf_f32 = &mut self.sample_buf_f32;
        let mut remapped: Option<(Vec<Vec<f32>>, usize, u32)> = None;

        decode_packet_and_then(&mut self.decoder, &symphonia_packet, |decoded| {
            let spec = *decoded.spec();
            let duration = decoded.capacity() as u64;
            let buf = sample_buf_f32.get_or_insert_with(|| SampleBuffer::<f32>::new(duration, spec));
            buf.copy_interleaved_ref(decoded);

            let interleaved = buf.samples();
            let src_channels = spec.channels.count().max(1);
            let dest_channels = dest.channels as usize;
            let frames = interleaved.len() / src_channels;

            let mut out: Vec<Vec<f32>> = vec![Vec::with_capacity(frames); dest_channels];
            for f in 0..frames {
                let base = f * src_channels;
                for c in 0..dest_channels {
                    let sample = if src_channels == 1 {
                        interleaved[base]
                    } else {
                        interleaved[base + c.min(src_channels - 1)]
                    };
                    out[c].push(sample);
                }
            }
            remapped = Some((out, frames, spec.rate));
            Ok(())
        })
        .map_err(Error::from)?;

        let Some((remapped, frames, src_rate)) = remapped else {
            // DecodeError/IoError on this packet: skip, caller moves on to the next one.
            return Ok(());
        };

        if src_rate == self.dest.sample_rate {
            self.append_f32_as_i16(&remapped, frames);
            return Ok(());
        }

        self.resample_and_append(&remapped, src_rate)
    }

    fn append_f32_as_i16(&mut self, channels: &[Vec<f32>], frames: usize) {
        for f in 0..frames {
            for ch in channels {
                self.pending.push_back(f32_to_i16(ch[f]));
            }
        }
    }

    fn resample_and_append(&mut self, channels: &[Vec<f32>], src_rate: u32) -> Result<()> {
        self.ensure_resampler(src_rate)?;

        for (acc, ch) in self.mono_acc.iter_mut().zip(channels.iter()) {
            acc.extend_from_slice(ch);
        }

        loop {
            let in_max = self.resampler.as_ref().unwrap().input_frames_max();
            if self.mono_acc[0].len() < in_max {
                break;
            }

            for (dst, acc) in self.resample_in.iter_mut().zip(self.mono_acc.iter_mut()) {
                dst.clear();
                dst.extend(acc.drain(..in_max));
            }

            let out = self
                .resampler
                .as_mut()
                .unwrap()
                .process(&self.resample_in, None)
                .map_err(|e| Error::parse(format!("resampler process failed: {e}")))?;

            let out_frames = out.first().map(|c| c.len()).unwrap_or(0);
            for f in 0..out_frames {
                for ch in &out {
                    self.pending.push_back(f32_to_i16(ch[f]));
                }
            }
        }

        Ok(())
    }

    fn ensure_resampler(&mut self, src_rate: u32) -> Result<()> {
        if self.resampler.is_some() {
            return Ok(());
        }

        let in_chunk_src_frames = 2048;
        let rs = SincFixedIn::<f32>::new(
            self.dest.sample_rate as f64 / src_rate as f64,
            2.0,
            rubato::SincInterpolationParameters {
                sinc_len: 256,
                f_cutoff: 0.95,
                interpolation: rubato::SincInterpolationType::Linear,
                oversampling_factor: 256,
                window: WindowFunction::BlackmanHarris2,
            },
            in_chunk_src_frames,
            self.dest.channels as usize,
        )
        .map_err(|e| Error::parse(format!("failed to init resampler: {e}")))?;

        self.resampler = Some(rs);
        Ok(())
    }

    /// Flush any remainder buffered ahead of the resampler at end of stream, padding the final
    /// partial block with zeros the way a block-based resampler requires.
    pub fn finalize(&mut self) -> Result<()> {
        let Some(rs) = self.resampler.as_mut() else {
            return Ok(());
        };
        if self.mono_acc[0].is_empty() {
            return Ok(());
        }

        let in_max = rs.input_frames_max();
        let rem = self.mono_acc[0].len() % in_max;
        if rem != 0 {
            let pad = in_max - rem;
            for acc in &mut self.mono_acc {
                acc.resize(acc.len() + pad, 0.0);
            }
        }

        while !self.mono_acc[0].is_empty() {
            let in_max = self.resampler.as_ref().unwrap().input_frames_max();
            for (dst, acc) in self.resample_in.iter_mut().zip(self.mono_acc.iter_mut()) {
                dst.clear();
                dst.extend(acc.drain(..in_max));
            }
            let out = self
                .resampler
                .as_mut()
                .unwrap()
                .process(&self.resample_in, None)
                .map_err(|e| Error::parse(format!("resampler process failed: {e}")))?;
            let out_frames = out.first().map(|c| c.len()).unwrap_or(0);
            for f in 0..out_frames {
                for ch in &out {
                    self.pending.push_back(f32_to_i16(ch[f]));
                }
            }
        }

        Ok(())
    }
}

fn f32_to_i16(s: f32) -> i16 {
    (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

fn write_frame(out: &mut [u8], frame_index: usize, frame: &[i16], channels: u16) {
    let frame_bytes = 2 * channels as usize;
    let base = frame_index * frame_bytes;
    for (c, sample) in frame.iter().enumerate() {
        let bytes = sample.to_ne_bytes();
        out[base + c * 2] = bytes[0];
        out[base + c * 2 + 1] = bytes[1];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn f32_to_i16_clamps_out_of_range() {
        assert_eq!(f32_to_i16(2.0), i16::MAX);
        assert_eq!(f32_to_i16(-2.0), -i16::MAX);
        assert_eq!(f32_to_i16(0.0), 0);
    }

    #[test]
    fn write_frame_packs_native_endian_stereo() {
        let mut out = vec![0u8; 8];
        write_frame(&mut out, 0, &[1, -1], 2);
        write_frame(&mut out, 1, &[2, -2], 2);
        assert_eq!(&out[0..2], &1i16.to_ne_bytes());
        assert_eq!(&out[2..4], &(-1i16).to_ne_bytes());
        assert_eq!(&out[4..6], &2i16.to_ne_bytes());
        assert_eq!(&out[6..8], &(-2i16).to_ne_bytes());
    }
}
