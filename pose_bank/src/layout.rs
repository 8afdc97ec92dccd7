/// The three-region partition of a bank's flat frame space.
///
/// Baked sequence frames come first, then the transition arena, then two
/// frames per dynamic slot. Frame indices are handles into this space and
/// only ever invalidated between ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    sequence_frames: u32,
    transition_frames: u32,
    dynamic_slots: u32,
}

/// Which region of the frame space a frame index falls in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameRegion {
    Sequence,
    Transition,
    Dynamic,
}

impl FrameLayout {
    pub fn new(sequence_frames: u32, transition_frames: u32, dynamic_slots: u32) -> Self {
        Self {
            sequence_frames,
            transition_frames,
            dynamic_slots,
        }
    }

    pub fn sequence_frames(&self) -> u32 {
        self.sequence_frames
    }

    pub fn transition_frames(&self) -> u32 {
        self.transition_frames
    }

    pub fn dynamic_slots(&self) -> u32 {
        self.dynamic_slots
    }

    /// The first frame of the transition arena.
    pub fn transition_base(&self) -> u32 {
        self.sequence_frames
    }

    /// The first frame of the dynamic-pose region.
    pub fn dynamic_base(&self) -> u32 {
        self.sequence_frames + self.transition_frames
    }

    /// Total frame count across all three regions.
    pub fn total_frames(&self) -> u32 {
        self.sequence_frames + self.transition_frames + self.dynamic_slots * 2
    }

    /// Classify `frame`. Panics when the index is outside the frame space,
    /// which indicates a stale or corrupted handle.
    pub fn region(&self, frame: u32) -> FrameRegion {
        assert!(
            frame < self.total_frames(),
            "frame index {frame} out of range for {} total frames",
            self.total_frames()
        );
        if frame < self.transition_base() {
            FrameRegion::Sequence
        } else if frame < self.dynamic_base() {
            FrameRegion::Transition
        } else {
            FrameRegion::Dynamic
        }
    }
}
