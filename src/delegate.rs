//! `PipelineDelegate`: host callback surface. Every method has a no-op default so embedders only
//! override what they care about.

use std::collections::BTreeMap;

use crate::error::Error;
use crate::parser::PacketDesc;
use crate::state::PipelineState;

pub trait PipelineDelegate {
    fn state_changed(&mut self, _from: PipelineState, _to: PipelineState) {}

    fn error(&mut self, _error: &Error) {}

    fn meta_data_available(&mut self, _meta: &BTreeMap<String, String>) {}

    /// `samples` is interleaved PCM in the pipeline's configured destination format; `desc`
    /// describes the packet it was decoded from.
    fn samples_available(&mut self, _samples: &[i16], _desc: &PacketDesc) {}

    fn bitrate_available(&mut self, _bits_per_second: u32) {}

    fn received_size(&mut self, _bytes_received: u64, _total_bytes: u64) {}

    /// Every output buffer drained with nothing left in the packet cache to refill it.
    fn buffer_empty(&mut self) {}
}

/// A delegate that ignores every event, for callers that only want to drive `pump()` without
/// observing it (e.g. duration-only probing).
pub struct NullDelegate;

impl PipelineDelegate for NullDelegate {}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingDelegate {
        state_changes: Vec<(PipelineState, PipelineState)>,
        buffer_empty_count: u32,
    }

    impl PipelineDelegate for RecordingDelegate {
        fn state_changed(&mut self, from: PipelineState, to: PipelineState) {
            self.state_changes.push((from, to));
        }

        fn buffer_empty(&mut self) {
            self.buffer_empty_count += 1;
        }
    }

    #[test]
    fn default_methods_compile_to_no_ops_on_null_delegate() {
        let mut delegate = NullDelegate;
        delegate.state_changed(PipelineState::Stopped, PipelineState::Buffering);
        delegate.buffer_empty();
    }

    #[test]
    fn overridden_methods_record_events() {
        let mut delegate = RecordingDelegate {
            state_changes: Vec::new(),
            buffer_empty_count: 0,
        };
        delegate.state_changed(PipelineState::Stopped, PipelineState::Buffering);
        delegate.buffer_empty();
        delegate.buffer_empty();

        assert_eq!(
            delegate.state_changes,
            vec![(PipelineState::Stopped, PipelineState::Buffering)]
        );
        assert_eq!(delegate.buffer_empty_count, 2);
    }
}
