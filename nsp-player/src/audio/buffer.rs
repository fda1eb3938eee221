//! Per-stream playback cursor
//!
//! Every stream owns its own `FrameCursor`; nothing about the playback
//! position is shared between devices. The cursor is moved into the
//! transport's callback and advanced one chunk at a time.
//!
//! The cursor emits exactly `total_frames` frames. Frames past the end of
//! the buffer are silence (never a loop), and once `total_frames` have been
//! emitted the rest of the chunk is zero-filled and the cursor reports
//! `FillStatus::Finished`.

use crate::audio::SampleBuffer;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Result of filling one transport chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillStatus {
    /// More frames remain
    Streaming,
    /// The requested frame count has been emitted; chunk tail is silence
    Finished,
}

/// Read position into a shared `SampleBuffer`
#[derive(Debug)]
pub struct FrameCursor {
    buffer: SampleBuffer,
    position: usize,
    total_frames: usize,
    /// Mirrors `position` for observers outside the audio callback
    progress: Arc<AtomicUsize>,
}

impl FrameCursor {
    /// Cursor that will emit `total_frames` frames of `buffer`.
    ///
    /// `total_frames` may be shorter than the buffer (truncation) or longer
    /// (silence padding).
    pub fn new(buffer: SampleBuffer, total_frames: usize) -> Self {
        Self {
            buffer,
            position: 0,
            total_frames,
            progress: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared frame counter, updated after every chunk
    pub fn progress(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.progress)
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn total_frames(&self) -> usize {
        self.total_frames
    }

    pub fn remaining(&self) -> usize {
        self.total_frames.saturating_sub(self.position)
    }

    pub fn is_finished(&self) -> bool {
        self.position >= self.total_frames
    }

    /// Fill an interleaved output chunk with `out_channels` channels.
    ///
    /// **REAL-TIME SAFE**: no allocation, no locking.
    pub fn fill(&mut self, out: &mut [f32], out_channels: usize) -> FillStatus {
        if out_channels == 0 {
            return self.status();
        }

        for frame in out.chunks_mut(out_channels) {
            if self.position < self.total_frames {
                for (channel, sample) in frame.iter_mut().enumerate() {
                    *sample = self.buffer.sample_for_output(self.position, channel);
                }
                self.position += 1;
            } else {
                frame.fill(0.0);
            }
        }

        self.progress.store(self.position, Ordering::Release);
        self.status()
    }

    fn status(&self) -> FillStatus {
        if self.is_finished() {
            FillStatus::Finished
        } else {
            FillStatus::Streaming
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(frames: usize) -> SampleBuffer {
        // Mono ramp 1, 2, 3, ... so positions are visible in the output
        let samples = (1..=frames).map(|i| i as f32).collect();
        SampleBuffer::new(samples, 1, 48000).unwrap()
    }

    #[test]
    fn test_fill_advances_through_buffer() {
        let mut cursor = FrameCursor::new(ramp(6), 6);
        let mut chunk = [0.0f32; 4]; // 2 stereo frames

        assert_eq!(cursor.fill(&mut chunk, 2), FillStatus::Streaming);
        assert_eq!(chunk, [1.0, 1.0, 2.0, 2.0]);

        assert_eq!(cursor.fill(&mut chunk, 2), FillStatus::Streaming);
        assert_eq!(chunk, [3.0, 3.0, 4.0, 4.0]);
        assert_eq!(cursor.position(), 4);
        assert_eq!(cursor.remaining(), 2);
    }

    #[test]
    fn test_exhaustion_mid_chunk_zero_fills_tail() {
        let mut cursor = FrameCursor::new(ramp(3), 3);
        let mut chunk = [9.0f32; 4];

        assert_eq!(cursor.fill(&mut chunk, 1), FillStatus::Finished);
        assert_eq!(chunk, [1.0, 2.0, 3.0, 0.0]);
        assert!(cursor.is_finished());
    }

    #[test]
    fn test_fill_after_finish_is_silence() {
        let mut cursor = FrameCursor::new(ramp(2), 2);
        let mut chunk = [0.0f32; 2];
        cursor.fill(&mut chunk, 1);

        let mut next = [5.0f32; 4];
        assert_eq!(cursor.fill(&mut next, 2), FillStatus::Finished);
        assert_eq!(next, [0.0; 4]);
        assert_eq!(cursor.position(), 2);
    }

    #[test]
    fn test_padding_past_buffer_end_never_loops() {
        let mut cursor = FrameCursor::new(ramp(2), 5);
        let mut chunk = [7.0f32; 8];

        assert_eq!(cursor.fill(&mut chunk, 1), FillStatus::Finished);
        assert_eq!(chunk, [1.0, 2.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(cursor.position(), 5);
    }

    #[test]
    fn test_truncation_stops_before_buffer_end() {
        let mut cursor = FrameCursor::new(ramp(10), 3);
        let mut chunk = [0.0f32; 4];

        assert_eq!(cursor.fill(&mut chunk, 1), FillStatus::Finished);
        assert_eq!(chunk, [1.0, 2.0, 3.0, 0.0]);
    }

    #[test]
    fn test_progress_is_shared() {
        let mut cursor = FrameCursor::new(ramp(10), 10);
        let progress = cursor.progress();
        let mut chunk = [0.0f32; 3];

        cursor.fill(&mut chunk, 1);
        assert_eq!(progress.load(Ordering::Acquire), 3);
    }

    #[test]
    fn test_independent_cursors_share_buffer() {
        let buffer = ramp(4);
        let mut a = FrameCursor::new(buffer.clone(), 4);
        let mut b = FrameCursor::new(buffer, 4);
        let mut chunk = [0.0f32; 2];

        a.fill(&mut chunk, 1);
        a.fill(&mut chunk, 1);
        assert_eq!(chunk, [3.0, 4.0]);

        b.fill(&mut chunk, 1);
        assert_eq!(chunk, [1.0, 2.0]);
    }

    #[test]
    fn test_zero_frames_finishes_immediately() {
        let mut cursor = FrameCursor::new(ramp(4), 0);
        let mut chunk = [1.0f32; 2];
        assert_eq!(cursor.fill(&mut chunk, 2), FillStatus::Finished);
        assert_eq!(chunk, [0.0, 0.0]);
    }
}
