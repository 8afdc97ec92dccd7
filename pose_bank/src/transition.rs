use std::collections::HashMap;

use log::debug;

use crate::arena::SpanArena;
use crate::blend::BlendCurve;
use crate::error::TransitionError;

/// Fully determines a blended transition between two sequence positions.
///
/// Two keys describe the same transition only when every field matches.
/// The endpoints are not commutative: blending A into B and B into A are
/// different cache entries even when the hashes collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransitionKey {
    pub source_sequence: u32,
    pub dest_sequence: u32,
    /// Local frame of the source sequence the blend starts from.
    pub source_frame: u32,
    /// Local frame of the destination sequence the blend lands on.
    pub dest_frame: u32,
    /// Number of synthesized in-between frames.
    pub frame_count: u32,
    pub curve: BlendCurve,
    pub source_loops: bool,
    pub dest_loops: bool,
}

/// Reference state of a cached transition.
///
/// List membership follows the state: `Active` records are referenced by
/// playback, `Idle` records released this tick and still revivable, and
/// `PendingEviction` records are idle since at least one tick boundary and
/// first in line when the arena runs out of space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefState {
    Active { refs: u32 },
    Idle,
    PendingEviction,
}

#[derive(Debug)]
struct Record {
    key: TransitionKey,
    state: RefState,
    /// Offset of the record's span inside the transition arena.
    offset: u32,
    /// First frame of the record in the bank's flat frame space.
    base_frame: u32,
    /// Set until the record's pose data has been generated.
    deferred: bool,
    /// Position in the index list for the current state.
    list_pos: usize,
}

/// Result of a successful transition lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// An existing record matched; its reference count was incremented.
    Found(u32),
    /// A new record was created and queued for deferred generation.
    /// Its frames are undefined until the end of the tick.
    Created(u32),
}

impl Lookup {
    /// The first frame of the transition in the bank's flat frame space.
    pub fn frame(self) -> u32 {
        match self {
            Lookup::Found(frame) | Lookup::Created(frame) => frame,
        }
    }
}

/// A transition whose pose data still needs to be generated this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DeferredBlend {
    pub key: TransitionKey,
    pub base_frame: u32,
}

/// Deduplicating, reference-counted table of blended transitions.
///
/// Records are kept alive while referenced, parked on an idle list at
/// refcount zero, demoted to the eviction queue at the next tick boundary
/// and only destroyed when the arena needs the space back.
#[derive(Debug)]
pub struct TransitionTable {
    base_frame: u32,
    arena: SpanArena,
    index: HashMap<TransitionKey, usize, ahash::RandomState>,
    by_frame: HashMap<u32, usize, ahash::RandomState>,
    records: Vec<Option<Record>>,
    free_slots: Vec<usize>,
    active: Vec<usize>,
    idle: Vec<usize>,
    pending_eviction: Vec<usize>,
    deferred: Vec<usize>,
    deferred_frames: u32,
    new_this_tick: u32,
    max_new_per_tick: u32,
    generation_enabled: bool,
}

/// Eviction processes the queue front-first in runs of this size before
/// retrying the allocation.
const EVICT_BATCH: usize = 8;

impl TransitionTable {
    /// Create a table managing `arena_frames` frames starting at
    /// `base_frame` in the bank's flat frame space.
    pub fn new(
        base_frame: u32,
        arena_frames: u32,
        max_new_per_tick: u32,
        generation_enabled: bool,
    ) -> Self {
        Self {
            base_frame,
            arena: SpanArena::new(arena_frames),
            index: HashMap::default(),
            by_frame: HashMap::default(),
            records: Vec::new(),
            free_slots: Vec::new(),
            active: Vec::new(),
            idle: Vec::new(),
            pending_eviction: Vec::new(),
            deferred: Vec::new(),
            deferred_frames: 0,
            new_this_tick: 0,
            max_new_per_tick,
            generation_enabled,
        }
    }

    /// Start a new tick: reset the new-transition budget and demote every
    /// record that sat at refcount zero through the tick boundary into the
    /// eviction queue, preserving their idle order.
    pub fn begin_tick(&mut self) {
        self.new_this_tick = 0;
        for slot in std::mem::take(&mut self.idle) {
            let record = self.records[slot].as_mut().expect("idle slot is live");
            record.state = RefState::PendingEviction;
            record.list_pos = self.pending_eviction.len();
            self.pending_eviction.push(slot);
        }
    }

    /// Look up the transition for `key`, creating and queueing it for
    /// deferred generation on a miss.
    ///
    /// `ignore_new` suppresses creation for this call only. Creation also
    /// fails once the per-tick budget is spent or generation is disabled
    /// ([TransitionError::RateLimited]), or when the arena cannot fit the
    /// blend even after evicting every idle record
    /// ([TransitionError::ArenaFull]). Failures never mutate the record
    /// set.
    pub fn find_or_create(
        &mut self,
        key: TransitionKey,
        ignore_new: bool,
    ) -> Result<Lookup, TransitionError> {
        assert!(key.frame_count > 0, "transition with zero frames");

        if let Some(&slot) = self.index.get(&key) {
            self.retain_slot(slot);
            let base_frame = self.records[slot].as_ref().expect("indexed slot").base_frame;
            return Ok(Lookup::Found(base_frame));
        }

        if ignore_new || !self.generation_enabled || self.new_this_tick >= self.max_new_per_tick {
            return Err(TransitionError::RateLimited);
        }

        let offset = loop {
            if let Some(offset) = self.arena.alloc(key.frame_count) {
                break offset;
            }
            if !self.evict_batch() {
                debug!(
                    "transition arena full: {} of {} frames in use, nothing left to evict",
                    self.arena.allocated(),
                    self.arena.len()
                );
                return Err(TransitionError::ArenaFull);
            }
        };

        let base_frame = self.base_frame + offset;
        let slot = self.free_slots.pop().unwrap_or_else(|| {
            self.records.push(None);
            self.records.len() - 1
        });
        self.records[slot] = Some(Record {
            key,
            state: RefState::Active { refs: 1 },
            offset,
            base_frame,
            deferred: true,
            list_pos: self.active.len(),
        });
        self.active.push(slot);
        self.index.insert(key, slot);
        self.by_frame.insert(base_frame, slot);
        self.deferred.push(slot);
        self.deferred_frames += key.frame_count;
        self.new_this_tick += 1;

        Ok(Lookup::Created(base_frame))
    }

    /// Increment the reference count of the transition starting at `frame`,
    /// reviving it from the idle or eviction lists if necessary.
    pub fn retain(&mut self, frame: u32) {
        let slot = self.slot_for(frame);
        self.retain_slot(slot);
    }

    /// Decrement the reference count of the transition starting at `frame`.
    /// At zero the record moves to the idle list, staying alive and
    /// revivable until eviction reclaims it.
    pub fn release(&mut self, frame: u32) {
        let slot = self.slot_for(frame);
        let record = self.records[slot].as_ref().expect("indexed slot");
        match record.state {
            RefState::Active { refs: 1 } => {
                let pos = record.list_pos;
                remove_from(&mut self.active, &mut self.records, pos);
                let record = self.records[slot].as_mut().expect("indexed slot");
                record.state = RefState::Idle;
                record.list_pos = self.idle.len();
                self.idle.push(slot);
            }
            RefState::Active { refs } => {
                self.records[slot].as_mut().expect("indexed slot").state =
                    RefState::Active { refs: refs - 1 };
            }
            RefState::Idle | RefState::PendingEviction => {
                panic!("refcount underflow for transition frame {frame}");
            }
        }
    }

    /// The reference count of the transition starting at `frame`, or zero
    /// for idle records. `None` when no record starts there.
    pub fn ref_count(&self, frame: u32) -> Option<u32> {
        let slot = *self.by_frame.get(&frame)?;
        Some(
            match self.records[slot].as_ref().expect("indexed slot").state {
                RefState::Active { refs } => refs,
                RefState::Idle | RefState::PendingEviction => 0,
            },
        )
    }

    /// Records currently cached, in any state.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn idle_count(&self) -> usize {
        self.idle.len()
    }

    pub fn pending_eviction_count(&self) -> usize {
        self.pending_eviction.len()
    }

    /// Frames reserved in the transition arena.
    pub fn arena_allocated(&self) -> u32 {
        self.arena.allocated()
    }

    pub(crate) fn has_deferred(&self) -> bool {
        !self.deferred.is_empty()
    }

    pub(crate) fn deferred_frame_total(&self) -> u32 {
        self.deferred_frames
    }

    /// The transitions queued for generation, in creation order.
    pub(crate) fn deferred_blends(&self) -> Vec<DeferredBlend> {
        self.deferred
            .iter()
            .map(|&slot| {
                let record = self.records[slot].as_ref().expect("deferred slot is live");
                DeferredBlend {
                    key: record.key,
                    base_frame: record.base_frame,
                }
            })
            .collect()
    }

    /// Mark every deferred record as generated and reset the accumulator.
    pub(crate) fn clear_deferred(&mut self) {
        for slot in self.deferred.drain(..) {
            self.records[slot].as_mut().expect("deferred slot is live").deferred = false;
        }
        self.deferred_frames = 0;
    }

    fn slot_for(&self, frame: u32) -> usize {
        *self
            .by_frame
            .get(&frame)
            .unwrap_or_else(|| panic!("no transition starts at frame {frame}"))
    }

    fn retain_slot(&mut self, slot: usize) {
        let record = self.records[slot].as_ref().expect("indexed slot");
        let pos = record.list_pos;
        match record.state {
            RefState::Active { refs } => {
                self.records[slot].as_mut().expect("indexed slot").state =
                    RefState::Active { refs: refs + 1 };
            }
            RefState::Idle => {
                remove_from(&mut self.idle, &mut self.records, pos);
                self.activate(slot);
            }
            RefState::PendingEviction => {
                remove_from(&mut self.pending_eviction, &mut self.records, pos);
                self.activate(slot);
            }
        }
    }

    fn activate(&mut self, slot: usize) {
        let record = self.records[slot].as_mut().expect("indexed slot");
        record.state = RefState::Active { refs: 1 };
        record.list_pos = self.active.len();
        self.active.push(slot);
    }

    /// Destroy up to [EVICT_BATCH] records from the front of the eviction
    /// queue, freeing their spans. Returns `false` when the queue was
    /// empty.
    fn evict_batch(&mut self) -> bool {
        if self.pending_eviction.is_empty() {
            return false;
        }

        let count = EVICT_BATCH.min(self.pending_eviction.len());
        for slot in self.pending_eviction.drain(..count) {
            let record = self.records[slot].take().expect("evictable slot is live");
            debug_assert!(!record.deferred, "evicting a transition before generation");
            self.index.remove(&record.key);
            self.by_frame.remove(&record.base_frame);
            self.arena.free(record.offset, record.key.frame_count);
            self.free_slots.push(slot);
        }
        debug!("evicted {count} idle transitions");

        // Draining the front shifted every remaining queue entry.
        for (pos, &slot) in self.pending_eviction.iter().enumerate() {
            self.records[slot].as_mut().expect("queued slot is live").list_pos = pos;
        }

        true
    }
}

impl Drop for TransitionTable {
    fn drop(&mut self) {
        // Records do not own their spans through a guard type, so return
        // them before the arena checks for leaks.
        for record in self.records.iter().flatten() {
            self.arena.free(record.offset, record.key.frame_count);
        }
    }
}

fn remove_from(list: &mut Vec<usize>, records: &mut [Option<Record>], pos: usize) {
    list.swap_remove(pos);
    if let Some(&moved) = list.get(pos) {
        records[moved].as_mut().expect("listed slot is live").list_pos = pos;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(source: u32, dest: u32, frame_count: u32) -> TransitionKey {
        TransitionKey {
            source_sequence: source,
            dest_sequence: dest,
            source_frame: 0,
            dest_frame: 0,
            frame_count,
            curve: BlendCurve::Linear,
            source_loops: true,
            dest_loops: true,
        }
    }

    fn table(arena_frames: u32) -> TransitionTable {
        TransitionTable::new(100, arena_frames, 16, true)
    }

    #[test]
    fn identical_keys_share_one_record() {
        let mut table = table(20);
        let created = table.find_or_create(key(0, 1, 4), false).unwrap();
        let found = table.find_or_create(key(0, 1, 4), false).unwrap();

        assert_eq!(Lookup::Created(100), created);
        assert_eq!(Lookup::Found(100), found);
        assert_eq!(Some(2), table.ref_count(100));
        assert_eq!(1, table.len());
    }

    #[test]
    fn swapped_endpoints_are_distinct() {
        let mut table = table(20);
        let ab = table.find_or_create(key(0, 1, 4), false).unwrap();
        let ba = table.find_or_create(key(1, 0, 4), false).unwrap();

        assert!(matches!(ab, Lookup::Created(_)));
        assert!(matches!(ba, Lookup::Created(_)));
        assert_ne!(ab.frame(), ba.frame());
        assert_eq!(2, table.len());
    }

    #[test]
    fn release_parks_record_on_idle_list() {
        let mut table = table(20);
        let frame = table.find_or_create(key(0, 1, 4), false).unwrap().frame();
        table.release(frame);

        assert_eq!(Some(0), table.ref_count(frame));
        assert_eq!(0, table.active_count());
        assert_eq!(1, table.idle_count());

        // The record is still in the table and revivable.
        let found = table.find_or_create(key(0, 1, 4), false).unwrap();
        assert_eq!(Lookup::Found(frame), found);
        assert_eq!(Some(1), table.ref_count(frame));
        assert_eq!(0, table.idle_count());
    }

    #[test]
    fn tick_boundary_demotes_idle_records() {
        let mut table = table(20);
        let frame = table.find_or_create(key(0, 1, 4), false).unwrap().frame();
        table.clear_deferred();
        table.release(frame);
        assert_eq!(1, table.idle_count());

        table.begin_tick();
        assert_eq!(0, table.idle_count());
        assert_eq!(1, table.pending_eviction_count());

        // Still revivable until actually evicted.
        table.retain(frame);
        assert_eq!(Some(1), table.ref_count(frame));
        assert_eq!(0, table.pending_eviction_count());
    }

    #[test]
    fn rate_limit_blocks_new_records_until_next_tick() {
        let mut table = TransitionTable::new(100, 100, 2, true);
        table.find_or_create(key(0, 1, 2), false).unwrap();
        table.find_or_create(key(0, 2, 2), false).unwrap();
        assert_eq!(
            Err(TransitionError::RateLimited),
            table.find_or_create(key(0, 3, 2), false)
        );

        // Existing records still resolve while the budget is spent.
        assert!(matches!(
            table.find_or_create(key(0, 1, 2), false),
            Ok(Lookup::Found(_))
        ));

        table.clear_deferred();
        table.begin_tick();
        assert!(table.find_or_create(key(0, 3, 2), false).is_ok());
    }

    #[test]
    fn ignore_new_suppresses_creation_only() {
        let mut table = table(20);
        assert_eq!(
            Err(TransitionError::RateLimited),
            table.find_or_create(key(0, 1, 4), true)
        );
        assert!(table.is_empty());

        let frame = table.find_or_create(key(0, 1, 4), false).unwrap().frame();
        assert_eq!(
            Ok(Lookup::Found(frame)),
            table.find_or_create(key(0, 1, 4), true)
        );
    }

    #[test]
    fn disabled_generation_rejects_all_new_records() {
        let mut table = TransitionTable::new(100, 100, 16, false);
        assert_eq!(
            Err(TransitionError::RateLimited),
            table.find_or_create(key(0, 1, 2), false)
        );
    }

    #[test]
    fn eviction_spares_referenced_records() {
        let mut table = table(10);
        let live = table.find_or_create(key(0, 1, 6), false).unwrap().frame();
        table.clear_deferred();

        // The only other record is still referenced, so nothing can move.
        assert_eq!(
            Err(TransitionError::ArenaFull),
            table.find_or_create(key(0, 2, 6), false)
        );
        assert_eq!(Some(1), table.ref_count(live));
        assert_eq!(1, table.len());
    }

    #[test]
    fn allocation_pressure_evicts_only_demoted_records() {
        let a_key = key(0, 1, 6);
        let mut table = table(10);
        let a = table.find_or_create(a_key, false).unwrap().frame();
        table.clear_deferred();
        table.release(a);

        // Idle but not yet past a tick boundary: still not evictable.
        assert_eq!(
            Err(TransitionError::ArenaFull),
            table.find_or_create(key(0, 2, 8), false)
        );
        assert_eq!(1, table.len());

        table.begin_tick();
        let b = table.find_or_create(key(0, 2, 8), false).unwrap();
        assert!(matches!(b, Lookup::Created(_)));
        assert_eq!(1, table.len());
        table.clear_deferred();

        // A was destroyed, so its original key misses and is rebuilt as a
        // new record instead of resolving to the old one.
        table.release(b.frame());
        table.begin_tick();
        assert!(matches!(
            table.find_or_create(a_key, false),
            Ok(Lookup::Created(_))
        ));
    }

    #[test]
    fn eviction_reclaims_oldest_demoted_first() {
        let mut table = TransitionTable::new(0, 12, 16, true);
        let a = table.find_or_create(key(0, 1, 4), false).unwrap().frame();
        let b = table.find_or_create(key(0, 2, 4), false).unwrap().frame();
        let c = table.find_or_create(key(0, 3, 4), false).unwrap().frame();
        table.clear_deferred();
        table.release(a);
        table.release(b);
        table.begin_tick();

        // Space for the new blend only appears by evicting a and b; c stays.
        let d = table.find_or_create(key(0, 4, 8), false).unwrap().frame();
        // The reclaimed span starts where the oldest demoted record lived.
        assert_eq!(a, d);
        assert_eq!(None, table.ref_count(b));
        assert_eq!(Some(1), table.ref_count(c));
        assert_eq!(Some(1), table.ref_count(d));
        assert_eq!(2, table.len());
    }

    #[test]
    fn deferred_records_are_tracked_until_cleared() {
        let mut table = table(20);
        table.find_or_create(key(0, 1, 4), false).unwrap();
        table.find_or_create(key(0, 2, 3), false).unwrap();

        assert!(table.has_deferred());
        assert_eq!(7, table.deferred_frame_total());
        let blends = table.deferred_blends();
        assert_eq!(2, blends.len());
        assert_eq!(4, blends[0].key.frame_count);
        assert_eq!(3, blends[1].key.frame_count);

        table.clear_deferred();
        assert!(!table.has_deferred());
        assert_eq!(0, table.deferred_frame_total());
    }

    #[test]
    #[should_panic(expected = "refcount underflow")]
    fn releasing_idle_record_panics() {
        let mut table = table(20);
        let frame = table.find_or_create(key(0, 1, 4), false).unwrap().frame();
        table.clear_deferred();
        table.release(frame);
        table.release(frame);
    }

    #[test]
    #[should_panic(expected = "no transition starts at frame")]
    fn releasing_unknown_frame_panics() {
        let mut table = table(20);
        table.release(100);
    }
}
