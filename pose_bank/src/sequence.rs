use crate::Transform;
use crate::error::BakeError;

/// Bake-time input for one animation sequence.
///
/// `poses` holds one bone-local [Transform] per bone per sampled frame,
/// laid out frame-major. `curve_values` holds `curve_count` floats per frame
/// and must be empty when the bank carries no curves.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceData {
    pub name: String,
    pub frames_per_second: f32,
    pub looping: bool,
    pub poses: Vec<Transform>,
    pub curve_values: Vec<f32>,
}

/// A registered sequence after baking.
#[derive(Debug, Clone, PartialEq)]
pub struct Sequence {
    name: String,
    frames_per_second: f32,
    looping: bool,
    frame_count: u32,
    base_frame: u32,
    bone_count: usize,
    curve_count: usize,
    poses: Vec<Transform>,
    curve_values: Vec<f32>,
}

impl Sequence {
    pub(crate) fn new(
        index: usize,
        data: SequenceData,
        base_frame: u32,
        bone_count: usize,
        curve_count: usize,
    ) -> Result<Self, BakeError> {
        if data.poses.is_empty() {
            return Err(BakeError::EmptySequence { index });
        }
        if data.poses.len() % bone_count != 0 {
            return Err(BakeError::PoseCountMismatch {
                index,
                len: data.poses.len(),
                bone_count,
            });
        }
        let frame_count = (data.poses.len() / bone_count) as u32;
        let expected_curves = frame_count as usize * curve_count;
        if data.curve_values.len() != expected_curves {
            return Err(BakeError::CurveCountMismatch {
                index,
                len: data.curve_values.len(),
                expected: expected_curves,
            });
        }

        Ok(Self {
            name: data.name,
            frames_per_second: data.frames_per_second,
            looping: data.looping,
            frame_count,
            base_frame,
            bone_count,
            curve_count,
            poses: data.poses,
            curve_values: data.curve_values,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn frames_per_second(&self) -> f32 {
        self.frames_per_second
    }

    pub fn looping(&self) -> bool {
        self.looping
    }

    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    /// The first frame of this sequence in the bank's flat frame space.
    pub fn base_frame(&self) -> u32 {
        self.base_frame
    }

    /// Convert `seconds` to a fractional local frame based on the sequence
    /// parameters. Looping sequences wrap over the final frame and
    /// non-looping sequences hold the final frame.
    pub fn current_frame(&self, seconds: f32) -> f32 {
        let frame = seconds * self.frames_per_second;
        let final_frame = self.frame_count.saturating_sub(1) as f32;
        if final_frame <= 0.0 {
            0.0
        } else if self.looping {
            frame.rem_euclid(final_frame)
        } else {
            frame.clamp(0.0, final_frame)
        }
    }

    /// Resolve a local frame that may run past the end of the sequence,
    /// wrapping when the sequence loops and holding the final frame
    /// otherwise.
    pub fn resolve_frame(&self, frame: u32, looping: bool) -> u32 {
        if looping {
            frame % self.frame_count
        } else {
            frame.min(self.frame_count - 1)
        }
    }

    /// The bone-local pose sampled for `frame`.
    pub fn pose_at(&self, frame: u32) -> &[Transform] {
        let start = frame as usize * self.bone_count;
        &self.poses[start..start + self.bone_count]
    }

    /// The curve values sampled for `frame`. Empty when the bank carries no
    /// curves.
    pub fn curves_at(&self, frame: u32) -> &[f32] {
        let start = frame as usize * self.curve_count;
        &self.curve_values[start..start + self.curve_count]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sequence(frame_count: u32, looping: bool) -> Sequence {
        Sequence::new(
            0,
            SequenceData {
                name: "walk".to_string(),
                frames_per_second: 30.0,
                looping,
                poses: vec![Transform::IDENTITY; frame_count as usize],
                curve_values: Vec::new(),
            },
            0,
            1,
            0,
        )
        .unwrap()
    }

    #[test]
    fn current_frame_looping_wraps() {
        let seq = sequence(11, true);
        assert_eq!(0.0, seq.current_frame(0.0));
        assert_eq!(7.5, seq.current_frame(0.25));
        // Half a second is frame 15, which wraps over the final frame to 5.
        assert_eq!(5.0, seq.current_frame(0.5));
    }

    #[test]
    fn current_frame_non_looping_holds_final() {
        let seq = sequence(11, false);
        assert_eq!(7.5, seq.current_frame(0.25));
        assert_eq!(10.0, seq.current_frame(10.0));
        assert_eq!(0.0, seq.current_frame(-1.0));
    }

    #[test]
    fn current_frame_single_frame() {
        let seq = sequence(1, true);
        assert_eq!(0.0, seq.current_frame(123.0));
    }

    #[test]
    fn resolve_frame_wrap_and_hold() {
        let seq = sequence(4, true);
        assert_eq!(1, seq.resolve_frame(5, true));
        assert_eq!(3, seq.resolve_frame(5, false));
        assert_eq!(2, seq.resolve_frame(2, true));
    }

    #[test]
    fn rejects_empty_sequence() {
        let result = Sequence::new(
            3,
            SequenceData {
                name: String::new(),
                frames_per_second: 30.0,
                looping: false,
                poses: Vec::new(),
                curve_values: Vec::new(),
            },
            0,
            2,
            0,
        );
        assert_eq!(Err(BakeError::EmptySequence { index: 3 }), result);
    }

    #[test]
    fn rejects_partial_final_frame() {
        let result = Sequence::new(
            0,
            SequenceData {
                name: String::new(),
                frames_per_second: 30.0,
                looping: false,
                poses: vec![Transform::IDENTITY; 5],
                curve_values: Vec::new(),
            },
            0,
            2,
            0,
        );
        assert_eq!(
            Err(BakeError::PoseCountMismatch {
                index: 0,
                len: 5,
                bone_count: 2
            }),
            result
        );
    }

    #[test]
    fn rejects_curve_length_mismatch() {
        let result = Sequence::new(
            0,
            SequenceData {
                name: String::new(),
                frames_per_second: 30.0,
                looping: false,
                poses: vec![Transform::IDENTITY; 4],
                curve_values: vec![0.0; 3],
            },
            0,
            2,
            1,
        );
        assert_eq!(
            Err(BakeError::CurveCountMismatch {
                index: 0,
                len: 3,
                expected: 2
            }),
            result
        );
    }
}
