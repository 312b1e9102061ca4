//! Frame Stage Definitions
//!
//! `FrameStage` fixes the order in which a frame is recorded. The
//! orchestrator advances a [`StageTracker`] before each node runs, so a pass
//! recorded out of order is caught at the call site rather than as a
//! corrupted image.
//!
//! | Stage | Reads | Writes |
//! |-------|-------|--------|
//! | `Shadows` | opaque items | every light's shadow map |
//! | `Geometry` | visible opaque items | G-buffer surface attachments, depth |
//! | `Lighting` | G-buffer surface, shadow maps, IBL | bloom |
//! | `Sky` | sky items | bloom |
//! | `PostProcess` | bloom, ZW, normal | back buffer |
//! | `Present` | | swap chain |

#[derive(Debug, Hash, PartialEq, Eq, Clone, Copy, PartialOrd, Ord)]
#[repr(u8)]
pub enum FrameStage {
    /// Between frames.
    Idle = 0,
    /// Depth-only rendering into each light's shadow map.
    Shadows = 1,
    /// G-buffer fill.
    Geometry = 2,
    /// Per-light shading and ambient.
    Lighting = 3,
    /// Sky dome.
    Sky = 4,
    /// Depth of field and chromatic aberration into the back buffer.
    PostProcess = 5,
    /// Submission and present.
    Present = 6,
}

impl FrameStage {
    pub const SEQUENCE: [Self; 7] = [
        Self::Idle,
        Self::Shadows,
        Self::Geometry,
        Self::Lighting,
        Self::Sky,
        Self::PostProcess,
        Self::Present,
    ];

    #[inline]
    #[must_use]
    pub const fn order(self) -> u8 {
        self as u8
    }

    #[inline]
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Shadows => "Shadows",
            Self::Geometry => "Geometry",
            Self::Lighting => "Lighting",
            Self::Sky => "Sky",
            Self::PostProcess => "PostProcess",
            Self::Present => "Present",
        }
    }

    /// The only stage allowed to follow this one.
    #[must_use]
    pub const fn successor(self) -> Self {
        match self {
            Self::Idle => Self::Shadows,
            Self::Shadows => Self::Geometry,
            Self::Geometry => Self::Lighting,
            Self::Lighting => Self::Sky,
            Self::Sky => Self::PostProcess,
            Self::PostProcess => Self::Present,
            Self::Present => Self::Idle,
        }
    }
}

/// Current stage of the frame being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTracker {
    current: FrameStage,
}

impl Default for StageTracker {
    fn default() -> Self {
        Self { current: FrameStage::Idle }
    }
}

impl StageTracker {
    #[must_use]
    pub fn current(&self) -> FrameStage {
        self.current
    }

    /// Moves to `next`, which must be the current stage's successor.
    pub fn advance(&mut self, next: FrameStage) {
        let expected = self.current.successor();
        debug_assert_eq!(next, expected, "stage {} cannot follow {}", next.name(), self.current.name());
        if next != expected {
            log::error!("Stage {} recorded after {} (expected {})", next.name(), self.current.name(), expected.name());
        }
        self.current = next;
    }

    /// Abandons the frame.
    pub fn reset(&mut self) {
        self.current = FrameStage::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_ordering() {
        assert!(FrameStage::Shadows < FrameStage::Geometry);
        assert!(FrameStage::Geometry < FrameStage::Lighting);
        assert!(FrameStage::Lighting < FrameStage::Sky);
        assert!(FrameStage::Sky < FrameStage::PostProcess);
        assert!(FrameStage::PostProcess < FrameStage::Present);
    }

    #[test]
    fn successors_walk_the_sequence() {
        let mut tracker = StageTracker::default();
        for &stage in &FrameStage::SEQUENCE[1..] {
            tracker.advance(stage);
        }
        assert_eq!(tracker.current(), FrameStage::Present);
        tracker.advance(FrameStage::Idle);
        assert_eq!(tracker.current(), FrameStage::Idle);
    }

    #[test]
    #[should_panic(expected = "cannot follow")]
    fn skipping_a_stage_panics() {
        let mut tracker = StageTracker::default();
        tracker.advance(FrameStage::Shadows);
        tracker.advance(FrameStage::Lighting);
    }
}
