/// One averaged measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStatsSample {
    pub fps: f32,
    /// Milliseconds per frame.
    pub frame_ms: f32,
}

/// Averages frame rate over one-second windows.
#[derive(Debug, Default)]
pub struct FrameStats {
    frame_count: u32,
    accumulated: f32,
    latest: Option<FrameStatsSample>,
}

impl FrameStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one frame of `delta` seconds. Returns a sample each time a
    /// full second has accumulated.
    pub fn record(&mut self, delta: f32) -> Option<FrameStatsSample> {
        self.frame_count += 1;
        self.accumulated += delta;

        if self.accumulated < 1.0 {
            return None;
        }

        let fps = self.frame_count as f32 / self.accumulated;
        let sample = FrameStatsSample { fps, frame_ms: 1000.0 / fps };
        self.frame_count = 0;
        self.accumulated = 0.0;
        self.latest = Some(sample);
        Some(sample)
    }

    #[must_use]
    pub fn latest(&self) -> Option<FrameStatsSample> {
        self.latest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_once_per_second() {
        let mut stats = FrameStats::new();
        for _ in 0..59 {
            assert!(stats.record(1.0 / 60.0).is_none());
        }
        let sample = stats.record(1.0 / 60.0 + 1e-4).unwrap();
        assert!((sample.fps - 60.0).abs() < 0.1);
        assert!((sample.frame_ms - 16.67).abs() < 0.1);
        assert!(stats.record(0.01).is_none());
    }
}
