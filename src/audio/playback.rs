//! Gapless playback queue for model speech
//!
//! Buffers are scheduled back-to-back against a clock that only advances as
//! the output device pulls samples, so the cursor matches what the listener
//! actually hears.
//!
//! # Timing
//!
//! All bookkeeping is done in whole frames at the queue's sample rate. A
//! buffer of `n` frames scheduled at frame `s` occupies `[s, s + n)`, and the
//! next buffer starts at exactly `s + n`.
//!
//! Thread-safety: This struct is NOT internally synchronized.
//! Wrap in `Arc<Mutex<>>` when shared with the audio callback.

use std::collections::BTreeMap;

use super::codec::PcmBuffer;

/// Identifier of a scheduled buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlaybackHandle(u64);

#[derive(Debug)]
struct ScheduledBuffer {
    start_frame: u64,
    samples: Vec<f32>,
}

impl ScheduledBuffer {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

/// Playback scheduler: a next-start cursor plus the set of live buffers
#[derive(Debug)]
pub struct PlaybackQueue {
    sample_rate: u32,
    /// Frames rendered so far (the clock)
    clock_frames: u64,
    /// Where the next enqueued buffer starts
    next_start_frame: u64,
    live: BTreeMap<PlaybackHandle, ScheduledBuffer>,
    next_handle: u64,
}

impl PlaybackQueue {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            clock_frames: 0,
            next_start_frame: 0,
            live: BTreeMap::new(),
            next_handle: 0,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Current clock time in seconds
    pub fn current_time(&self) -> f64 {
        self.frames_to_secs(self.clock_frames)
    }

    /// Start time the next buffer would get if nothing else changed
    pub fn next_start_time(&self) -> f64 {
        self.frames_to_secs(self.next_start_frame)
    }

    /// Schedule a buffer to start right after everything already queued.
    ///
    /// Multi-channel buffers are down-mixed; a buffer at a different rate
    /// than the queue is resampled first.
    pub fn enqueue(&mut self, buffer: &PcmBuffer) -> PlaybackHandle {
        let mono = buffer.to_mono();
        let samples = if buffer.sample_rate == self.sample_rate {
            mono
        } else {
            super::codec::resample(&mono, buffer.sample_rate, self.sample_rate)
        };
        self.enqueue_samples(samples)
    }

    /// Schedule mono samples already at the queue's rate
    pub fn enqueue_samples(&mut self, samples: Vec<f32>) -> PlaybackHandle {
        self.next_start_frame = self.next_start_frame.max(self.clock_frames);

        let handle = PlaybackHandle(self.next_handle);
        self.next_handle += 1;

        let scheduled = ScheduledBuffer {
            start_frame: self.next_start_frame,
            samples,
        };
        self.next_start_frame = scheduled.end_frame();

        log::debug!(
            "Playback: {:?} scheduled at {:.3}s ({} frames, {} live)",
            handle,
            self.frames_to_secs(scheduled.start_frame),
            scheduled.samples.len(),
            self.live.len() + 1
        );

        self.live.insert(handle, scheduled);
        handle
    }

    /// Stop everything immediately (barge-in).
    ///
    /// Every live buffer is evicted, including the one currently playing,
    /// and the cursor resets so the next buffer starts at "now".
    pub fn interrupt(&mut self) {
        if !self.live.is_empty() {
            log::info!("Playback: interrupted, stopping {} buffers", self.live.len());
        }
        self.live.clear();
        self.next_start_frame = 0;
    }

    /// Start time of a live buffer, in seconds
    pub fn start_time_of(&self, handle: PlaybackHandle) -> Option<f64> {
        self.live
            .get(&handle)
            .map(|b| self.frames_to_secs(b.start_frame))
    }

    pub fn is_live(&self, handle: PlaybackHandle) -> bool {
        self.live.contains_key(&handle)
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// True when nothing is scheduled
    pub fn is_idle(&self) -> bool {
        self.live.is_empty()
    }

    /// Fill `out` with the next mono samples and advance the clock.
    ///
    /// Buffers whose end has passed are removed (natural completion).
    pub fn render(&mut self, out: &mut [f32]) {
        let window_start = self.clock_frames;
        let window_end = window_start + out.len() as u64;

        out.iter_mut().for_each(|s| *s = 0.0);

        for buffer in self.live.values() {
            let start = buffer.start_frame.max(window_start);
            let end = buffer.end_frame().min(window_end);
            for frame in start..end {
                let src = (frame - buffer.start_frame) as usize;
                let dst = (frame - window_start) as usize;
                out[dst] += buffer.samples[src];
            }
        }

        for s in out.iter_mut() {
            *s = s.clamp(-1.0, 1.0);
        }

        self.advance(out.len() as u64);
    }

    /// Advance the clock without producing samples
    pub fn advance(&mut self, frames: u64) {
        self.clock_frames += frames;
        let now = self.clock_frames;
        self.live.retain(|handle, buffer| {
            let keep = buffer.end_frame() > now;
            if !keep {
                log::debug!("Playback: {:?} finished", handle);
            }
            keep
        });
    }

    fn frames_to_secs(&self, frames: u64) -> f64 {
        frames as f64 / self.sample_rate as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(frames: usize) -> PcmBuffer {
        PcmBuffer {
            sample_rate: 24_000,
            channels: vec![vec![0.1; frames]],
        }
    }

    #[test]
    fn test_buffers_play_back_to_back() {
        let mut queue = PlaybackQueue::new(24_000);
        let durations = [2400usize, 1200, 4800, 24];

        let handles: Vec<_> = durations.iter().map(|&d| queue.enqueue(&buffer(d))).collect();

        assert_eq!(queue.start_time_of(handles[0]).unwrap(), 0.0);
        let mut offset_frames = 0usize;
        for (i, handle) in handles.iter().enumerate() {
            let expected = offset_frames as f64 / 24_000.0;
            assert_eq!(queue.start_time_of(*handle).unwrap(), expected);
            offset_frames += durations[i];
        }
        assert_eq!(queue.next_start_time(), offset_frames as f64 / 24_000.0);
    }

    #[test]
    fn test_enqueue_after_idle_starts_now() {
        let mut queue = PlaybackQueue::new(24_000);
        queue.enqueue(&buffer(240));
        queue.advance(24_000);
        assert!(queue.is_idle());

        let handle = queue.enqueue(&buffer(240));
        assert_eq!(queue.start_time_of(handle).unwrap(), 1.0);
    }

    #[test]
    fn test_interrupt_evicts_all_and_resets_cursor() {
        let mut queue = PlaybackQueue::new(24_000);
        let first = queue.enqueue(&buffer(2400));
        let second = queue.enqueue(&buffer(2400));
        let third = queue.enqueue(&buffer(2400));

        // First buffer half played, two still unplayed
        let mut out = vec![0.0; 1200];
        queue.render(&mut out);
        assert_eq!(queue.live_count(), 3);

        queue.interrupt();

        assert!(!queue.is_live(first));
        assert!(!queue.is_live(second));
        assert!(!queue.is_live(third));
        assert_eq!(queue.live_count(), 0);
        assert_eq!(queue.next_start_time(), 0.0);

        // Next buffer starts at the current clock, never before
        let next = queue.enqueue(&buffer(100));
        assert_eq!(queue.start_time_of(next).unwrap(), queue.current_time());
        assert_eq!(queue.current_time(), 0.05);
    }

    #[test]
    fn test_interrupt_silences_output() {
        let mut queue = PlaybackQueue::new(24_000);
        queue.enqueue(&buffer(2400));
        queue.interrupt();

        let mut out = vec![1.0; 100];
        queue.render(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_render_produces_scheduled_samples() {
        let mut queue = PlaybackQueue::new(10);
        queue.enqueue_samples(vec![0.5; 3]);
        queue.enqueue_samples(vec![0.25; 2]);

        let mut out = vec![0.0; 6];
        queue.render(&mut out);

        assert_eq!(out, vec![0.5, 0.5, 0.5, 0.25, 0.25, 0.0]);
        assert!(queue.is_idle());
    }

    #[test]
    fn test_natural_completion_removes_handle() {
        let mut queue = PlaybackQueue::new(10);
        let a = queue.enqueue_samples(vec![0.0; 4]);
        let b = queue.enqueue_samples(vec![0.0; 4]);

        queue.advance(4);
        assert!(!queue.is_live(a));
        assert!(queue.is_live(b));
    }

    #[test]
    fn test_enqueue_resamples_foreign_rate() {
        let mut queue = PlaybackQueue::new(48_000);
        let handle = queue.enqueue(&buffer(2400));
        assert!(queue.is_live(handle));
        assert_eq!(queue.next_start_time(), 0.1);
    }

    #[test]
    fn test_cursor_monotonic_without_interrupt() {
        let mut queue = PlaybackQueue::new(24_000);
        let mut last = queue.next_start_time();
        for frames in [10usize, 0, 500, 1] {
            queue.enqueue(&buffer(frames));
            queue.advance(7);
            assert!(queue.next_start_time() >= last);
            last = queue.next_start_time();
        }
    }
}
