//! # pose_bank
//! pose_bank bakes skeletal-animation poses into a flat, frame-indexed bank
//! and serves runtime requests against it: lookup of pre-baked sequence
//! frames, cached on-demand synthesis of blended transitions between two
//! sequence positions, and double-buffered slots for externally driven
//! poses. Everything produced during a tick leaves through one sparse
//! scatter batch for a GPU upload step.
//!
//! Transition generation is deferred to the end of the tick and runs in
//! parallel across records; reading a pending transition frame forces the
//! flush first, so callers never observe unpopulated data.
//!
//! ```
//! use pose_bank::{
//!     BankDesc, BlendCurve, Bone, PoseBank, SequenceData, Skeleton, Transform, TransitionKey,
//! };
//!
//! let skeleton = Skeleton {
//!     bones: vec![Bone {
//!         name: "root".to_string(),
//!         transform: Transform::IDENTITY,
//!         parent_index: None,
//!     }],
//! };
//! let walk = SequenceData {
//!     name: "walk".to_string(),
//!     frames_per_second: 30.0,
//!     looping: true,
//!     poses: vec![Transform::IDENTITY; 8],
//!     curve_values: Vec::new(),
//! };
//! let run = SequenceData {
//!     name: "run".to_string(),
//!     ..walk.clone()
//! };
//! let mut bank = PoseBank::bake(skeleton, vec![walk, run], BankDesc::default()).unwrap();
//!
//! bank.begin_tick();
//! let frame = bank.frame_index(0, 0.1);
//! let blend = bank
//!     .find_or_create_transition(
//!         TransitionKey {
//!             source_sequence: 0,
//!             dest_sequence: 1,
//!             source_frame: 3,
//!             dest_frame: 0,
//!             frame_count: 4,
//!             curve: BlendCurve::SmoothStep,
//!             source_loops: true,
//!             dest_loops: false,
//!         },
//!         false,
//!     )
//!     .unwrap();
//! let batch = bank.end_tick().unwrap();
//! assert!(batch.frame_indices.contains(&frame));
//! assert!(batch.frame_indices.contains(&blend.frame()));
//! ```

pub mod arena;
pub mod bank;
pub mod blend;
pub mod dynamic;
pub mod error;
pub mod layout;
pub mod sequence;
pub mod skeleton;
pub mod transform;
pub mod transition;
pub mod upload;

pub use arena::SpanArena;
pub use bank::{BankDesc, Config, PoseBank};
pub use blend::{BlendCurve, blend_alpha};
pub use dynamic::DynamicSlots;
pub use error::{BakeError, TransitionError};
pub use layout::{FrameLayout, FrameRegion};
pub use sequence::{Sequence, SequenceData};
pub use skeleton::{Bone, Skeleton, skinning_matrices};
pub use transform::Transform;
pub use transition::{Lookup, TransitionKey, TransitionTable};
pub use upload::{ScatterBatch, UploadStage};
