//! Frame sampler
//!
//! Pulls the newest frame from the open track on every tick, reduces it into
//! the reusable luma buffer and hands it to the decode sequencer. Nothing in
//! here propagates an error: a bad frame is logged and counted as a miss.

use serde::Serialize;
use tracing::trace;

use super::sequencer::{DecodeHit, DecodeSequencer};
use crate::camera::{FrameBuffer, VideoTrack};
use crate::utils::LogThrottler;
use crate::warn_throttled;

/// Result of one sampling tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing new to look at (no frame, empty frame or same frame as last tick)
    Idle,
    /// A frame was examined and no code was found
    Miss,
    /// A code was decoded
    Decoded(DecodeHit),
}

/// Sampling counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SamplerStats {
    pub ticks: u64,
    pub frames_sampled: u64,
    pub frames_skipped: u64,
    pub frame_errors: u64,
    pub misses: u64,
    pub hits: u64,
}

/// Per-session frame sampler
pub struct FrameSampler {
    buffer: FrameBuffer,
    last_sequence: Option<u64>,
    stats: SamplerStats,
    throttler: LogThrottler,
}

impl FrameSampler {
    pub fn new() -> Self {
        Self {
            buffer: FrameBuffer::new(),
            last_sequence: None,
            stats: SamplerStats::default(),
            throttler: LogThrottler::with_secs(10),
        }
    }

    /// Sample the current frame of `track` and try to decode it
    pub fn tick(&mut self, track: &dyn VideoTrack, sequencer: &mut DecodeSequencer) -> TickOutcome {
        self.stats.ticks += 1;

        let Some(frame) = track.latest_frame() else {
            self.stats.frames_skipped += 1;
            return TickOutcome::Idle;
        };
        if frame.resolution.is_empty() || frame.is_empty() {
            self.stats.frames_skipped += 1;
            return TickOutcome::Idle;
        }
        if self.last_sequence == Some(frame.sequence) {
            self.stats.frames_skipped += 1;
            return TickOutcome::Idle;
        }
        self.last_sequence = Some(frame.sequence);

        if let Err(e) = self.buffer.fill_from(&frame) {
            self.stats.frame_errors += 1;
            warn_throttled!(
                self.throttler,
                "frame_fill",
                "Dropping {} frame #{}: {}",
                frame.format,
                frame.sequence,
                e
            );
            return TickOutcome::Miss;
        }
        self.throttler.clear("frame_fill");
        self.stats.frames_sampled += 1;

        let Some(image) = self.buffer.image() else {
            return TickOutcome::Idle;
        };
        match sequencer.run(image) {
            Some(hit) => {
                self.stats.hits += 1;
                trace!("Frame #{} decoded via {:?}", frame.sequence, hit.attempt);
                TickOutcome::Decoded(hit)
            }
            None => {
                self.stats.misses += 1;
                TickOutcome::Miss
            }
        }
    }

    /// Forget the last sequence number; used when a new track opens
    pub fn reset(&mut self) {
        self.last_sequence = None;
    }

    pub fn stats(&self) -> &SamplerStats {
        &self.stats
    }

    pub fn buffer(&self) -> &FrameBuffer {
        &self.buffer
    }
}

impl Default for FrameSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::backend::TrackCapabilities;
    use crate::camera::frame::GrayImage;
    use crate::camera::{PixelFormat, Resolution, VideoFrame};
    use crate::config::ScanConfig;
    use crate::error::CameraError;
    use crate::scan::decoder::DecodeError;
    use async_trait::async_trait;

    /// Track that always returns the same frame
    struct StillTrack(Option<VideoFrame>);

    #[async_trait]
    impl VideoTrack for StillTrack {
        fn label(&self) -> &str {
            "still"
        }
        async fn wait_ready(&mut self) -> Result<(), CameraError> {
            Ok(())
        }
        fn latest_frame(&self) -> Option<VideoFrame> {
            self.0.clone()
        }
        fn is_live(&self) -> bool {
            true
        }
        fn capabilities(&self) -> TrackCapabilities {
            TrackCapabilities::default()
        }
        fn set_torch(&mut self, _on: bool) -> Result<(), CameraError> {
            Ok(())
        }
        fn stop(&mut self) {}
    }

    fn sequencer(text: Option<&'static str>) -> DecodeSequencer {
        let decoder = move |_: &GrayImage<'_>| -> Result<Option<String>, DecodeError> {
            Ok(text.map(str::to_string))
        };
        DecodeSequencer::new(Box::new(decoder), &ScanConfig::default())
    }

    #[test]
    fn test_no_frame_is_idle() {
        let mut sampler = FrameSampler::new();
        let outcome = sampler.tick(&StillTrack(None), &mut sequencer(Some("x")));
        assert_eq!(outcome, TickOutcome::Idle);
        assert_eq!(sampler.stats().frames_skipped, 1);
    }

    #[test]
    fn test_zero_dimension_frame_is_idle() {
        let mut sampler = FrameSampler::new();
        let track = StillTrack(Some(VideoFrame::grey(Vec::new(), 0, 0, 1)));
        assert_eq!(
            sampler.tick(&track, &mut sequencer(Some("x"))),
            TickOutcome::Idle
        );
        assert_eq!(sampler.buffer().allocations(), 0);
    }

    #[test]
    fn test_same_frame_is_not_decoded_twice() {
        let mut sampler = FrameSampler::new();
        let mut seq = sequencer(None);
        let track = StillTrack(Some(VideoFrame::grey(vec![0; 32 * 32], 32, 32, 7)));

        assert_eq!(sampler.tick(&track, &mut seq), TickOutcome::Miss);
        assert_eq!(sampler.tick(&track, &mut seq), TickOutcome::Idle);

        sampler.reset();
        assert_eq!(sampler.tick(&track, &mut seq), TickOutcome::Miss);
        assert_eq!(sampler.stats().misses, 2);
    }

    #[test]
    fn test_decoded_frame() {
        let mut sampler = FrameSampler::new();
        let track = StillTrack(Some(VideoFrame::grey(vec![0; 32 * 32], 32, 32, 1)));
        match sampler.tick(&track, &mut sequencer(Some("hello"))) {
            TickOutcome::Decoded(hit) => assert_eq!(hit.text, "hello"),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(sampler.stats().hits, 1);
    }

    #[test]
    fn test_corrupt_frame_is_a_miss() {
        let mut sampler = FrameSampler::new();
        let frame = VideoFrame::from_vec(
            vec![0u8; 16],
            Resolution::new(64, 64),
            PixelFormat::Yuyv,
            128,
            3,
        );
        let outcome = sampler.tick(&StillTrack(Some(frame)), &mut sequencer(Some("x")));
        assert_eq!(outcome, TickOutcome::Miss);
        assert_eq!(sampler.stats().frame_errors, 1);
    }

    #[test]
    fn test_buffer_reused_across_ticks() {
        let mut sampler = FrameSampler::new();
        let mut seq = sequencer(None);
        for sequence in 1..=5 {
            let track = StillTrack(Some(VideoFrame::grey(vec![0; 32 * 32], 32, 32, sequence)));
            sampler.tick(&track, &mut seq);
        }
        assert_eq!(sampler.stats().frames_sampled, 5);
        assert_eq!(sampler.buffer().allocations(), 1);
    }
}
