//! Element reference & ID resolver (spec §4.1, component C1).
//!
//! An [`ElementRef`] is a 64-bit opaque, generation-tagged handle. Only the
//! [`Resolver`] can unpack it into a concrete `(TableId, element index)`;
//! external code only ever holds the packed value and copies it freely.
//!
//! Grounded on legion's `EntityAllocator`/`BlockAllocator` pattern (a
//! generation-counted slot table with a free list) generalized so that a
//! slot's payload is a movable `(table, index)` location rather than a
//! fixed block-relative index — table rows move between tables and get
//! swap-removed, so the resolver must be able to repoint a slot without
//! reallocating it.

use crate::storage::TableId;

/// Opaque, copyable handle. Two `ElementRef`s are equal iff they name the
/// same slot generation; a stale reference (slot reused since) is never
/// equal to the fresh one even though the slot index matches.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct ElementRef(u64);

impl ElementRef {
    const SLOT_BITS: u32 = 32;

    fn new(slot: u32, generation: u32) -> Self {
        ElementRef(((generation as u64) << Self::SLOT_BITS) | slot as u64)
    }

    fn slot(self) -> u32 {
        (self.0 & 0xFFFF_FFFF) as u32
    }

    fn generation(self) -> u32 {
        (self.0 >> Self::SLOT_BITS) as u32
    }

    /// Raw 64-bit token. Exposed only for callers that need to store the
    /// reference in their own data (e.g. as a table row value) without
    /// importing the resolver.
    pub fn to_bits(self) -> u64 {
        self.0
    }

    pub fn from_bits(bits: u64) -> Self {
        ElementRef(bits)
    }
}

impl Default for ElementRef {
    /// All-zero bits: generation 0 never matches a live slot's generation
    /// (which starts at 1), so a default-constructed reference is
    /// guaranteed stale and safe to store as a row's initial value.
    fn default() -> Self {
        ElementRef(0)
    }
}

impl std::fmt::Debug for ElementRef {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "ElementRef({}#{})", self.slot(), self.generation())
    }
}

/// Resolved `(table, index)` pair, returned by value — the resolver never
/// hands out long-lived pointers into table storage.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct UnpackedRef {
    pub table: TableId,
    pub index: u32,
}

#[derive(Clone)]
struct Slot {
    generation: u32,
    location: Option<UnpackedRef>,
}

/// Owns the global logical-reference -> physical-location mapping.
#[derive(Default)]
pub struct Resolver {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl Resolver {
    pub fn new() -> Self {
        Resolver::default()
    }

    /// Allocates a fresh slot pointing at `location` and returns its
    /// reference. Generation starts at 1 so the default `ElementRef` (all
    /// zero bits) never unpacks to a live element.
    pub fn allocate(&mut self, location: UnpackedRef) -> ElementRef {
        if let Some(slot) = self.free.pop() {
            let s = &mut self.slots[slot as usize];
            s.location = Some(location);
            ElementRef::new(slot, s.generation)
        } else {
            let slot = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 1,
                location: Some(location),
            });
            ElementRef::new(slot, 1)
        }
    }

    /// Repoints an existing, live reference's location — used when a
    /// row moves within its table (swap-remove target) or across tables.
    /// Panics if `r` is not currently live: the caller is expected to
    /// already hold a valid reference for the row being relocated.
    pub fn repoint(&mut self, r: ElementRef, location: UnpackedRef) {
        let slot = &mut self.slots[r.slot() as usize];
        debug_assert_eq!(slot.generation, r.generation(), "repoint on stale reference");
        slot.location = Some(location);
    }

    /// Frees the slot for `r`: increments its generation (so the reference
    /// just unpacked to `None` forever) and releases it for reuse.
    pub fn free(&mut self, r: ElementRef) {
        let index = r.slot() as usize;
        let slot = &mut self.slots[index];
        debug_assert_eq!(slot.generation, r.generation(), "double free of stale reference");
        slot.location = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(r.slot());
    }

    /// Never faults: returns `None` if the generation has moved on.
    pub fn try_unpack(&self, r: ElementRef) -> Option<UnpackedRef> {
        let slot = self.slots.get(r.slot() as usize)?;
        if slot.generation == r.generation() {
            slot.location
        } else {
            None
        }
    }

    /// Contract: caller asserts `r` is currently live. Panics otherwise —
    /// unlike `try_unpack` this is not meant to be used on references whose
    /// liveness is in question.
    pub fn unpack(&self, r: ElementRef) -> UnpackedRef {
        self.try_unpack(r).expect("unpack called on a stale ElementRef")
    }

    pub fn is_alive(&self, r: ElementRef) -> bool {
        self.try_unpack(r).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(table: u32, index: u32) -> UnpackedRef {
        UnpackedRef {
            table: TableId::from_raw(table),
            index,
        }
    }

    #[test]
    fn fresh_reference_unpacks_to_allocated_location() {
        let mut r = Resolver::new();
        let e = r.allocate(loc(0, 3));
        assert_eq!(r.try_unpack(e), Some(loc(0, 3)));
    }

    #[test]
    fn freed_reference_unpacks_to_none_and_does_not_fault() {
        let mut r = Resolver::new();
        let e = r.allocate(loc(0, 0));
        r.free(e);
        assert_eq!(r.try_unpack(e), None);
    }

    #[test]
    fn reused_slot_gets_a_new_generation() {
        let mut r = Resolver::new();
        let first = r.allocate(loc(0, 0));
        r.free(first);
        let second = r.allocate(loc(0, 0));
        assert_ne!(first, second);
        assert_eq!(r.try_unpack(first), None);
        assert_eq!(r.try_unpack(second), Some(loc(0, 0)));
    }

    #[test]
    fn repoint_updates_location_without_changing_identity() {
        let mut r = Resolver::new();
        let e = r.allocate(loc(0, 5));
        r.repoint(e, loc(0, 2));
        assert_eq!(r.try_unpack(e), Some(loc(0, 2)));
    }
}
