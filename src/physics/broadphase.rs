//! Uniform 2-D grid broadphase (spec §4.5, component C5).
//!
//! Not grounded on a single `original_source/` file — the filtered pack's
//! broadphase sources were pruned out — so the cell-stamping algorithm
//! below is built directly from spec §4.5's operation list, in the same
//! style as the rest of this crate's physics modules (plain structs over
//! `Vec`/`SmallVec`, no virtual dispatch). Candidate-cell storage uses
//! `smallvec` since a typical collider only stamps a handful of cells, the
//! same small-buffer-first rationale the teacher applies to its own
//! per-chunk component lists.

use fxhash::FxHashSet;
use smallvec::SmallVec;

use crate::math::Vec2;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec2,
    pub max: Vec2,
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct BroadphaseKey(u32);

impl BroadphaseKey {
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl From<crate::config::BroadphaseConfig> for GridConfig {
    fn from(c: crate::config::BroadphaseConfig) -> Self {
        GridConfig {
            origin: Vec2::new(c.origin_x, c.origin_y),
            cell_size: Vec2::new(c.cell_size_x, c.cell_size_y),
            cell_count_x: c.cell_count_x,
            cell_count_y: c.cell_count_y,
            cell_padding: c.cell_padding,
        }
    }
}

#[derive(Copy, Clone, Debug)]
pub struct GridConfig {
    pub origin: Vec2,
    pub cell_size: Vec2,
    pub cell_count_x: u32,
    pub cell_count_y: u32,
    /// Extra margin added to an AABB before computing its covered cell
    /// range, so a collider moving slowly within a cell does not thrash
    /// in and out of neighboring cells every tick.
    pub cell_padding: f32,
}

impl Default for GridConfig {
    fn default() -> Self {
        GridConfig {
            origin: Vec2::new(0.0, 0.0),
            cell_size: Vec2::new(1.0, 1.0),
            cell_count_x: 64,
            cell_count_y: 64,
            cell_padding: 0.0,
        }
    }
}

type CellRange = (u32, u32, u32, u32);

struct Slot {
    cells: SmallVec<[u32; 8]>,
    live: bool,
}

/// A bounded uniform grid. Colliders whose (padded) AABB falls entirely
/// outside the configured region are culled: they occupy a slot but stamp
/// no cells, so they never contribute a pair.
pub struct BroadphaseGrid {
    config: GridConfig,
    cells: Vec<SmallVec<[BroadphaseKey; 8]>>,
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl BroadphaseGrid {
    pub fn new(config: GridConfig) -> Self {
        let cell_total = (config.cell_count_x as usize) * (config.cell_count_y as usize);
        BroadphaseGrid {
            config,
            cells: vec![SmallVec::new(); cell_total],
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    fn cell_index(&self, x: u32, y: u32) -> usize {
        (y * self.config.cell_count_x + x) as usize
    }

    /// Clamped, inclusive cell range covering `aabb` padded by
    /// `cell_padding`, or `None` if it lies entirely outside the grid.
    fn covered_range(&self, aabb: &Aabb) -> Option<CellRange> {
        let pad = Vec2::new(self.config.cell_padding, self.config.cell_padding);
        let min = aabb.min - pad;
        let max = aabb.max + pad;

        let to_cell = |p: Vec2| -> (f32, f32) {
            (
                (p.x - self.config.origin.x) / self.config.cell_size.x,
                (p.y - self.config.origin.y) / self.config.cell_size.y,
            )
        };
        let (min_x, min_y) = to_cell(min);
        let (max_x, max_y) = to_cell(max);

        if max_x < 0.0 || max_y < 0.0 || min_x >= self.config.cell_count_x as f32 || min_y >= self.config.cell_count_y as f32 {
            return None;
        }

        let clamp = |v: f32, count: u32| -> u32 { v.max(0.0).min((count - 1) as f32) as u32 };
        let x0 = clamp(min_x, self.config.cell_count_x);
        let x1 = clamp(max_x, self.config.cell_count_x);
        let y0 = clamp(min_y, self.config.cell_count_y);
        let y1 = clamp(max_y, self.config.cell_count_y);
        Some((x0, x1, y0, y1))
    }

    fn stamp(&mut self, key: BroadphaseKey, range: CellRange) -> SmallVec<[u32; 8]> {
        let (x0, x1, y0, y1) = range;
        let mut stamped = SmallVec::new();
        for y in y0..=y1 {
            for x in x0..=x1 {
                let idx = self.cell_index(x, y);
                self.cells[idx].push(key);
                stamped.push(idx as u32);
            }
        }
        stamped
    }

    fn unstamp(&mut self, key: BroadphaseKey, cells: &[u32]) {
        for &idx in cells {
            if let Some(pos) = self.cells[idx as usize].iter().position(|k| *k == key) {
                self.cells[idx as usize].swap_remove(pos);
            }
        }
    }

    pub fn insert(&mut self, aabb: Aabb) -> BroadphaseKey {
        let slot_index = self.free.pop().unwrap_or_else(|| {
            self.slots.push(Slot { cells: SmallVec::new(), live: false });
            self.slots.len() as u32 - 1
        });
        let key = BroadphaseKey(slot_index);
        let cells = match self.covered_range(&aabb) {
            Some(range) => self.stamp(key, range),
            None => SmallVec::new(),
        };
        self.slots[slot_index as usize] = Slot { cells, live: true };
        key
    }

    /// Removes `key` from any cells it no longer overlaps and inserts it
    /// into any newly-overlapping cells; cells it already occupied and
    /// still overlaps are left untouched.
    pub fn update(&mut self, key: BroadphaseKey, new_aabb: Aabb) {
        let slot = &self.slots[key.raw() as usize];
        debug_assert!(slot.live, "update on a removed BroadphaseKey");
        let old_cells: Vec<u32> = slot.cells.iter().copied().collect();

        let new_cells: Vec<u32> = match self.covered_range(&new_aabb) {
            Some((x0, x1, y0, y1)) => {
                let mut v = Vec::new();
                for y in y0..=y1 {
                    for x in x0..=x1 {
                        v.push(self.cell_index(x, y) as u32);
                    }
                }
                v
            }
            None => Vec::new(),
        };

        let to_remove: Vec<u32> = old_cells.iter().copied().filter(|c| !new_cells.contains(c)).collect();
        let to_add: Vec<u32> = new_cells.iter().copied().filter(|c| !old_cells.contains(c)).collect();

        self.unstamp(key, &to_remove);
        for idx in &to_add {
            self.cells[*idx as usize].push(key);
        }

        self.slots[key.raw() as usize].cells = new_cells.into_iter().collect();
    }

    pub fn remove(&mut self, key: BroadphaseKey) {
        let cells: Vec<u32> = self.slots[key.raw() as usize].cells.iter().copied().collect();
        self.unstamp(key, &cells);
        self.slots[key.raw() as usize] = Slot { cells: SmallVec::new(), live: false };
        self.free.push(key.raw());
    }

    /// Emits each unordered pair of keys sharing at least one cell exactly
    /// once, keyed on canonical `(min,max)` slot ordering.
    pub fn enumerate_pairs(&self) -> Vec<(BroadphaseKey, BroadphaseKey)> {
        let mut visited: FxHashSet<(u32, u32)> = FxHashSet::default();
        let mut pairs = Vec::new();
        for cell in &self.cells {
            for i in 0..cell.len() {
                for j in (i + 1)..cell.len() {
                    let a = cell[i].raw();
                    let b = cell[j].raw();
                    let canonical = if a < b { (a, b) } else { (b, a) };
                    if visited.insert(canonical) {
                        pairs.push((cell[i], cell[j]));
                    }
                }
            }
        }
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aabb(min: (f32, f32), max: (f32, f32)) -> Aabb {
        Aabb { min: Vec2::new(min.0, min.1), max: Vec2::new(max.0, max.1) }
    }

    #[test]
    fn overlapping_colliders_in_the_same_cell_form_a_pair() {
        let mut grid = BroadphaseGrid::new(GridConfig::default());
        let a = grid.insert(aabb((0.1, 0.1), (0.4, 0.4)));
        let b = grid.insert(aabb((0.2, 0.2), (0.5, 0.5)));
        let pairs = grid.enumerate_pairs();
        assert_eq!(pairs.len(), 1);
        assert!(pairs[0] == (a, b) || pairs[0] == (b, a));
    }

    #[test]
    fn far_apart_colliders_produce_no_pairs() {
        let mut grid = BroadphaseGrid::new(GridConfig::default());
        grid.insert(aabb((0.0, 0.0), (0.1, 0.1)));
        grid.insert(aabb((40.0, 40.0), (40.1, 40.1)));
        assert!(grid.enumerate_pairs().is_empty());
    }

    #[test]
    fn colliders_outside_the_region_are_culled() {
        let mut grid = BroadphaseGrid::new(GridConfig::default());
        let a = grid.insert(aabb((-100.0, -100.0), (-99.0, -99.0)));
        let b = grid.insert(aabb((0.0, 0.0), (0.1, 0.1)));
        let _ = (a, b);
        assert!(grid.enumerate_pairs().is_empty());
    }

    #[test]
    fn update_moves_a_collider_between_cells() {
        let mut grid = BroadphaseGrid::new(GridConfig::default());
        let a = grid.insert(aabb((0.1, 0.1), (0.4, 0.4)));
        let b = grid.insert(aabb((10.1, 10.1), (10.4, 10.4)));
        assert!(grid.enumerate_pairs().is_empty());

        grid.update(b, aabb((0.2, 0.2), (0.5, 0.5)));
        let pairs = grid.enumerate_pairs();
        assert_eq!(pairs.len(), 1);
        assert!(pairs[0] == (a, b) || pairs[0] == (b, a));
    }

    #[test]
    fn remove_drops_a_collider_from_future_pairs() {
        let mut grid = BroadphaseGrid::new(GridConfig::default());
        let a = grid.insert(aabb((0.1, 0.1), (0.4, 0.4)));
        let b = grid.insert(aabb((0.2, 0.2), (0.5, 0.5)));
        grid.remove(a);
        assert!(grid.enumerate_pairs().is_empty());
        let _ = b;
    }
}
