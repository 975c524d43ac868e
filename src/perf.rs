use std::collections::VecDeque;
use std::time::{Duration, Instant};

pub const SAMPLE_WINDOW: usize = 60;

/// Rolling frame-time statistics plus a once-per-second FPS counter.
#[derive(Debug, Clone)]
pub struct PerformanceTracker {
    samples: VecDeque<f32>,
    capacity: usize,
    frames_this_second: u32,
    second_started: Option<Instant>,
    fps: f32,
}

impl Default for PerformanceTracker {
    fn default() -> Self {
        Self::new(SAMPLE_WINDOW)
    }
}

impl PerformanceTracker {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            frames_this_second: 0,
            second_started: None,
            fps: 0.0,
        }
    }

    /// Record one rendered frame that took `frame_ms`, finishing at `now`.
    pub fn record(&mut self, frame_ms: f32, now: Instant) {
        if frame_ms.is_finite() && frame_ms >= 0.0 {
            if self.samples.len() == self.capacity {
                self.samples.pop_front();
            }
            self.samples.push_back(frame_ms);
        }

        self.frames_this_second += 1;
        let started = *self.second_started.get_or_insert(now);
        let elapsed = now.saturating_duration_since(started);
        if elapsed >= Duration::from_secs(1) {
            self.fps = self.frames_this_second as f32 / elapsed.as_secs_f32();
            self.frames_this_second = 0;
            self.second_started = Some(now);
        }
    }

    pub fn fps(&self) -> f32 {
        self.fps
    }

    pub fn average(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f32>() / self.samples.len() as f32
    }

    pub fn min(&self) -> f32 {
        self.samples.iter().copied().reduce(f32::min).unwrap_or(0.0)
    }

    pub fn max(&self) -> f32 {
        self.samples.iter().copied().reduce(f32::max).unwrap_or(0.0)
    }

    pub fn last(&self) -> f32 {
        self.samples.back().copied().unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn reset(&mut self) {
        self.samples.clear();
        self.frames_this_second = 0;
        self.second_started = None;
        self.fps = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_a_bounded_window() {
        let mut perf = PerformanceTracker::new(3);
        let now = Instant::now();
        for ms in [10.0, 20.0, 30.0, 40.0] {
            perf.record(ms, now);
        }
        assert_eq!(perf.len(), 3);
        assert_eq!(perf.min(), 20.0);
        assert_eq!(perf.max(), 40.0);
        assert_eq!(perf.average(), 30.0);
    }

    #[test]
    fn fps_updates_once_per_second() {
        let mut perf = PerformanceTracker::default();
        let start = Instant::now();
        for i in 0..30 {
            perf.record(16.0, start + Duration::from_millis(i * 33));
        }
        assert_eq!(perf.fps(), 0.0);
        perf.record(16.0, start + Duration::from_millis(1000));
        assert!((perf.fps() - 31.0).abs() < 0.5);
    }
}
