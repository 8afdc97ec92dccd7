use thiserror::Error;

/// Errors raised while validating bake-time input for a bank.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BakeError {
    #[error("skeleton has no bones")]
    EmptySkeleton,

    #[error("bone {bone} appears before its parent {parent}")]
    UnorderedBones { bone: usize, parent: usize },

    #[error("sequence {index} has no frames")]
    EmptySequence { index: usize },

    #[error("sequence {index} pose count {len} is not a multiple of bone count {bone_count}")]
    PoseCountMismatch {
        index: usize,
        len: usize,
        bone_count: usize,
    },

    #[error("sequence {index} curve value count {len} does not match {expected}")]
    CurveCountMismatch {
        index: usize,
        len: usize,
        expected: usize,
    },
}

/// Recoverable failures from a transition lookup.
///
/// Both variants mean "no transition available this call". The documented
/// fallback is to play the destination sequence without blending.
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum TransitionError {
    #[error("per-tick budget for new transitions is exhausted")]
    RateLimited,

    #[error("transition arena is full even after evicting idle entries")]
    ArenaFull,
}
