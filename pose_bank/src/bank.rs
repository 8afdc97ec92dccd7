use glam::Mat4;
use log::debug;
use rayon::prelude::*;

use crate::blend::blend_alpha;
use crate::dynamic::DynamicSlots;
use crate::error::{BakeError, TransitionError};
use crate::layout::{FrameLayout, FrameRegion};
use crate::sequence::{Sequence, SequenceData};
use crate::skeleton::{Skeleton, skinning_matrices};
use crate::transform::Transform;
use crate::transition::{DeferredBlend, Lookup, TransitionKey, TransitionTable};
use crate::upload::{ScatterBatch, UploadStage};

/// Per-instance tuning for transition generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// New transitions that may be created in a single tick. Lookups of
    /// existing transitions are not limited.
    pub max_new_transitions_per_tick: u32,
    /// Disable creation of new transitions entirely.
    pub generation_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_new_transitions_per_tick: 8,
            generation_enabled: true,
        }
    }
}

/// Capacity for a bank, fixed at bake time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BankDesc {
    /// Frames reserved for synthesized transitions.
    pub max_transition_frames: u32,
    /// Externally driven pose slots. Each slot owns two frames.
    pub max_dynamic_slots: u32,
    /// Animation curve values carried per frame, zero for none.
    pub curve_count: usize,
    pub config: Config,
}

impl Default for BankDesc {
    fn default() -> Self {
        Self {
            max_transition_frames: 256,
            max_dynamic_slots: 0,
            curve_count: 0,
            config: Config::default(),
        }
    }
}

/// Flat bank of fully resolved skeletal poses.
///
/// Sequence frames are baked once up front. Transitions are synthesized on
/// demand into an arena region and cached by key, and dynamic slots expose
/// double-buffered frames for externally driven poses. Everything written
/// or generated during a tick leaves through one sparse [ScatterBatch] at
/// [PoseBank::end_tick].
#[derive(Debug)]
pub struct PoseBank {
    skeleton: Skeleton,
    inverse_bind: Vec<Mat4>,
    sequences: Vec<Sequence>,
    layout: FrameLayout,
    bone_count: usize,
    curve_count: usize,
    /// `bone_count` skinning matrices per frame, frame-major.
    poses: Vec<Mat4>,
    /// `curve_count` values per frame, frame-major.
    curves: Vec<f32>,
    populated: Vec<bool>,
    transitions: TransitionTable,
    dynamic: DynamicSlots,
    upload: UploadStage,
    /// Frames overwritten through [PoseBank::request_pose_upload] this tick.
    touched: Vec<u32>,
}

impl PoseBank {
    /// Validate the inputs, size the frame space and bake every sequence
    /// frame. The baked region is immutable afterwards and queued for the
    /// first scatter batch.
    pub fn bake(
        skeleton: Skeleton,
        sequences: Vec<SequenceData>,
        desc: BankDesc,
    ) -> Result<Self, BakeError> {
        if skeleton.bones.is_empty() {
            return Err(BakeError::EmptySkeleton);
        }
        for (i, bone) in skeleton.bones.iter().enumerate() {
            if let Some(parent) = bone.parent_index
                && parent >= i
            {
                return Err(BakeError::UnorderedBones {
                    bone: i,
                    parent,
                });
            }
        }

        let bone_count = skeleton.bones.len();
        let curve_count = desc.curve_count;

        let mut baked = Vec::with_capacity(sequences.len());
        let mut base_frame = 0u32;
        for (index, data) in sequences.into_iter().enumerate() {
            let sequence = Sequence::new(index, data, base_frame, bone_count, curve_count)?;
            base_frame += sequence.frame_count();
            baked.push(sequence);
        }

        let layout = FrameLayout::new(base_frame, desc.max_transition_frames, desc.max_dynamic_slots);
        let total = layout.total_frames() as usize;

        let inverse_bind = skeleton.inverse_bind_matrices();
        let mut poses = vec![Mat4::IDENTITY; total * bone_count];
        let mut curves = vec![0.0f32; total * curve_count];
        let mut populated = vec![false; total];

        for sequence in &baked {
            for frame in 0..sequence.frame_count() {
                let global = (sequence.base_frame() + frame) as usize;
                skinning_matrices(
                    &skeleton,
                    sequence.pose_at(frame),
                    &inverse_bind,
                    &mut poses[global * bone_count..(global + 1) * bone_count],
                );
                curves[global * curve_count..(global + 1) * curve_count]
                    .copy_from_slice(sequence.curves_at(frame));
                populated[global] = true;
            }
        }
        debug!(
            "baked {} sequences into {} frames ({} total with transitions and dynamic slots)",
            baked.len(),
            base_frame,
            total
        );

        let transitions = TransitionTable::new(
            layout.transition_base(),
            desc.max_transition_frames,
            desc.config.max_new_transitions_per_tick,
            desc.config.generation_enabled,
        );
        let dynamic = DynamicSlots::new(desc.max_dynamic_slots, layout.dynamic_base());
        let upload = UploadStage::new(bone_count, curve_count);

        // The baked region goes out through the same scatter path as
        // everything else and lands in the first batch.
        let touched = (0..layout.sequence_frames()).collect();

        Ok(Self {
            skeleton,
            inverse_bind,
            sequences: baked,
            layout,
            bone_count,
            curve_count,
            poses,
            curves,
            populated,
            transitions,
            dynamic,
            upload,
            touched,
        })
    }

    pub fn skeleton(&self) -> &Skeleton {
        &self.skeleton
    }

    pub fn sequences(&self) -> &[Sequence] {
        &self.sequences
    }

    pub fn layout(&self) -> FrameLayout {
        self.layout
    }

    /// Diagnostics for the transition cache.
    pub fn transitions(&self) -> &TransitionTable {
        &self.transitions
    }

    /// Frames currently holding valid pose data.
    pub fn populated_frames(&self) -> usize {
        self.populated.iter().filter(|p| **p).count()
    }

    /// The baked frame presenting `sequence` at `seconds`, honoring the
    /// sequence's loop mode.
    pub fn frame_index(&self, sequence: u32, seconds: f32) -> u32 {
        let sequence = &self.sequences[sequence as usize];
        let frame = sequence.current_frame(seconds).round() as u32;
        sequence.base_frame() + frame.min(sequence.frame_count() - 1)
    }

    /// Resolve or create the cached transition for `key`.
    ///
    /// On [Lookup::Created] the frames are undefined until deferred
    /// generation runs; reading them through [PoseBank::pose] forces that
    /// generation early, so no caller can observe unpopulated data. On an
    /// error the caller is expected to cut to the destination sequence
    /// without blending and may retry on a later tick.
    pub fn find_or_create_transition(
        &mut self,
        key: TransitionKey,
        ignore_new: bool,
    ) -> Result<Lookup, TransitionError> {
        assert!(
            (key.source_sequence as usize) < self.sequences.len(),
            "unknown source sequence {}",
            key.source_sequence
        );
        assert!(
            (key.dest_sequence as usize) < self.sequences.len(),
            "unknown destination sequence {}",
            key.dest_sequence
        );
        self.transitions.find_or_create(key, ignore_new)
    }

    /// Add a reference to the transition starting at `frame`.
    pub fn retain_transition(&mut self, frame: u32) {
        self.transitions.retain(frame);
    }

    /// Drop a reference to the transition starting at `frame`. The record
    /// stays cached and revivable until eviction reclaims its span.
    pub fn release_transition(&mut self, frame: u32) {
        self.transitions.release(frame);
    }

    /// Reserve a dynamic pose slot, or `None` when all are taken.
    pub fn alloc_dynamic_slot(&mut self) -> Option<u32> {
        self.dynamic.alloc()
    }

    /// Flip the slot's double buffer and return the frame to write next.
    /// Must be called before each write so in-flight render data survives.
    pub fn flip_dynamic_slot(&mut self, slot: u32) -> u32 {
        self.dynamic.flip(slot)
    }

    pub fn free_dynamic_slot(&mut self, slot: u32) {
        self.dynamic.free(slot);
    }

    /// Overwrite the pose of a transition or dynamic frame, returning the
    /// writable matrix block. The write is queued for this tick's scatter
    /// batch. Baked sequence frames are immutable and rejected.
    pub fn request_pose_upload(&mut self, frame: u32) -> &mut [Mat4] {
        assert!(
            self.layout.region(frame) != FrameRegion::Sequence,
            "baked sequence frame {frame} is immutable"
        );
        self.populated[frame as usize] = true;
        self.touched.push(frame);
        &mut self.poses[frame as usize * self.bone_count..(frame as usize + 1) * self.bone_count]
    }

    /// The skinning matrices of `frame`.
    ///
    /// Reading a transition frame while generations are outstanding flushes
    /// them first. Reading any other unpopulated frame is a programmer
    /// error and panics.
    pub fn pose(&mut self, frame: u32) -> &[Mat4] {
        self.ensure_readable(frame);
        &self.poses[frame as usize * self.bone_count..(frame as usize + 1) * self.bone_count]
    }

    /// The curve values of `frame`, with the same guarantees as
    /// [PoseBank::pose].
    pub fn curve_values(&mut self, frame: u32) -> &[f32] {
        self.ensure_readable(frame);
        &self.curves[frame as usize * self.curve_count..(frame as usize + 1) * self.curve_count]
    }

    /// Start a tick: reset the transition budget and age out records that
    /// stayed unreferenced through the boundary.
    pub fn begin_tick(&mut self) {
        self.transitions.begin_tick();
    }

    /// Finish a tick: run every outstanding transition generation and hand
    /// off the accumulated scatter batch, or `None` when nothing changed.
    pub fn end_tick(&mut self) -> Option<ScatterBatch> {
        self.flush_deferred();

        let touched = std::mem::take(&mut self.touched);
        if !touched.is_empty() {
            let bone_count = self.bone_count;
            let curve_count = self.curve_count;
            let base = self.upload.reserve(touched.len());
            for (i, &frame) in touched.iter().enumerate() {
                self.upload.set_frame_index(base + i, frame);
            }
            let (matrices, curve_values) = self.upload.block_mut(base, touched.len());
            for (i, &frame) in touched.iter().enumerate() {
                let frame = frame as usize;
                matrices[i * bone_count..(i + 1) * bone_count]
                    .copy_from_slice(&self.poses[frame * bone_count..(frame + 1) * bone_count]);
                curve_values[i * curve_count..(i + 1) * curve_count]
                    .copy_from_slice(&self.curves[frame * curve_count..(frame + 1) * curve_count]);
            }
        }

        self.upload.take_batch()
    }

    fn ensure_readable(&mut self, frame: u32) {
        if self.layout.region(frame) == FrameRegion::Transition && self.transitions.has_deferred()
        {
            self.flush_deferred();
        }
        assert!(
            self.populated[frame as usize],
            "read of unpopulated frame {frame}"
        );
    }

    /// Generate every deferred transition into scatter-reserved blocks, in
    /// parallel across records, then publish the results into the pose
    /// buffer.
    fn flush_deferred(&mut self) {
        if !self.transitions.has_deferred() {
            return;
        }

        let blends = self.transitions.deferred_blends();
        let total = self.transitions.deferred_frame_total() as usize;
        let bone_count = self.bone_count;
        let curve_count = self.curve_count;

        let base = self.upload.reserve(total);
        let mut entry = base;
        for blend in &blends {
            for i in 0..blend.key.frame_count {
                self.upload.set_frame_index(entry + i as usize, blend.base_frame + i);
            }
            entry += blend.key.frame_count as usize;
        }

        let (matrices, curve_values) = self.upload.block_mut(base, total);

        // Hand each blend its own disjoint slice of the reserved region.
        let mut matrix_blocks = Vec::with_capacity(blends.len());
        let mut curve_blocks = Vec::with_capacity(blends.len());
        let mut matrices_rest = matrices;
        let mut curves_rest = curve_values;
        for blend in &blends {
            let frames = blend.key.frame_count as usize;
            let (block, rest) = matrices_rest.split_at_mut(frames * bone_count);
            matrix_blocks.push(block);
            matrices_rest = rest;
            let (block, rest) = curves_rest.split_at_mut(frames * curve_count);
            curve_blocks.push(block);
            curves_rest = rest;
        }

        let skeleton = &self.skeleton;
        let inverse_bind = &self.inverse_bind;
        let sequences = &self.sequences;

        // No blend depends on another, so this is a plain parallel map.
        blends
            .par_iter()
            .zip(matrix_blocks)
            .zip(curve_blocks)
            .for_each(|((blend, matrices), curves)| {
                generate_blend(blend, sequences, skeleton, inverse_bind, matrices, curves);
            });

        // Publish into the pose buffer once every task has finished.
        let (matrices, curve_values) = self.upload.block_mut(base, total);
        let mut matrix_offset = 0;
        let mut curve_offset = 0;
        for blend in &blends {
            let frames = blend.key.frame_count as usize;
            let start = blend.base_frame as usize;
            self.poses[start * bone_count..(start + frames) * bone_count]
                .copy_from_slice(&matrices[matrix_offset..matrix_offset + frames * bone_count]);
            self.curves[start * curve_count..(start + frames) * curve_count]
                .copy_from_slice(&curve_values[curve_offset..curve_offset + frames * curve_count]);
            for frame in start..start + frames {
                self.populated[frame] = true;
            }
            matrix_offset += frames * bone_count;
            curve_offset += frames * curve_count;
        }

        self.transitions.clear_deferred();
    }
}

/// Synthesize the in-between frames of one transition into its reserved
/// scatter slices.
fn generate_blend(
    blend: &DeferredBlend,
    sequences: &[Sequence],
    skeleton: &Skeleton,
    inverse_bind: &[Mat4],
    matrices: &mut [Mat4],
    curves: &mut [f32],
) {
    let key = &blend.key;
    let source = &sequences[key.source_sequence as usize];
    let dest = &sequences[key.dest_sequence as usize];
    let bone_count = skeleton.bones.len();
    let curve_count = curves.len() / key.frame_count as usize;

    let mut local = vec![Transform::IDENTITY; bone_count];
    for i in 0..key.frame_count {
        let alpha = blend_alpha(key.curve, i, key.frame_count);
        let source_frame = source.resolve_frame(key.source_frame + i, key.source_loops);
        let dest_frame = dest.resolve_frame(key.dest_frame + i, key.dest_loops);

        for ((out, a), b) in local
            .iter_mut()
            .zip(source.pose_at(source_frame))
            .zip(dest.pose_at(dest_frame))
        {
            *out = a.lerp(*b, alpha);
        }

        let start = i as usize * bone_count;
        skinning_matrices(
            skeleton,
            &local,
            inverse_bind,
            &mut matrices[start..start + bone_count],
        );

        let source_curves = source.curves_at(source_frame);
        let dest_curves = dest.curves_at(dest_frame);
        for c in 0..curve_count {
            curves[i as usize * curve_count + c] =
                source_curves[c] + (dest_curves[c] - source_curves[c]) * alpha;
        }
    }
}
