// snap_id_pool.rs — snapshot ID pool (module E): MAX_IDS cells threaded
// through two singly linked lists (free, timed) via arena indices rather
// than raw pointers, per the indexed-arena guidance for intrusive lists.
// Converted from: myq2-common's cvar.rs HashMap-indexed-Vec idiom, applied
// here to an index-linked arena instead of a name-keyed table.

pub const MAX_IDS: usize = 4096;
pub const ID_QUARANTINE_MS: i64 = 5000;

const NONE: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CellState {
    Free,
    InUse,
    Timed,
}

#[derive(Debug, Clone, Copy)]
struct Cell {
    state: CellState,
    next: i32,
    timeout: i64,
}

/// Invariant: every cell belongs to exactly one of {FREE list, TIMED list,
/// INUSE population}; `usage == inUseCount + timedCount`.
pub struct SnapIdPool {
    cells: Vec<Cell>,
    first_free: i32,
    first_timed: i32,
    last_timed: i32,
    in_use_count: usize,
    timed_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapIdPoolError {
    /// The FREE list was empty even after draining expired TIMED heads —
    /// a resource-exhaustion bug per the taxonomy's Logic category.
    Exhausted,
    /// `FreeID` was called on a cell that wasn't INUSE.
    NotInUse,
}

impl SnapIdPool {
    pub fn new() -> Self {
        let mut cells = Vec::with_capacity(MAX_IDS);
        for i in 0..MAX_IDS {
            cells.push(Cell {
                state: CellState::Free,
                next: if i + 1 < MAX_IDS { (i + 1) as i32 } else { NONE },
                timeout: 0,
            });
        }
        Self {
            cells,
            first_free: 0,
            first_timed: NONE,
            last_timed: NONE,
            in_use_count: 0,
            timed_count: 0,
        }
    }

    fn expire_timed_heads(&mut self, now: i64) {
        while self.first_timed != NONE {
            let head = self.first_timed as usize;
            if self.cells[head].timeout >= now {
                break;
            }
            let next = self.cells[head].next;
            self.first_timed = next;
            if next == NONE {
                self.last_timed = NONE;
            }
            self.timed_count -= 1;

            self.cells[head].state = CellState::Free;
            self.cells[head].next = self.first_free;
            self.first_free = head as i32;
        }
    }

    /// Expires timed heads whose quarantine has elapsed, then pops the
    /// FREE list head.
    pub fn new_id(&mut self, now: i64) -> Result<u16, SnapIdPoolError> {
        self.expire_timed_heads(now);

        if self.first_free == NONE {
            return Err(SnapIdPoolError::Exhausted);
        }
        let id = self.first_free as usize;
        self.first_free = self.cells[id].next;
        self.cells[id].state = CellState::InUse;
        self.cells[id].next = NONE;
        self.in_use_count += 1;
        Ok(id as u16)
    }

    /// Moves an INUSE cell into a 5-second quarantine on the TIMED list.
    pub fn free_id(&mut self, id: u16, now: i64) -> Result<(), SnapIdPoolError> {
        let idx = id as usize;
        if idx >= self.cells.len() || self.cells[idx].state != CellState::InUse {
            return Err(SnapIdPoolError::NotInUse);
        }
        self.in_use_count -= 1;
        self.cells[idx].state = CellState::Timed;
        self.cells[idx].next = NONE;
        self.cells[idx].timeout = now + ID_QUARANTINE_MS;

        if self.last_timed == NONE {
            self.first_timed = idx as i32;
        } else {
            self.cells[self.last_timed as usize].next = idx as i32;
        }
        self.last_timed = idx as i32;
        self.timed_count += 1;
        Ok(())
    }

    /// Drains the entire TIMED list straight to FREE, ignoring quarantine —
    /// used on map reload where every id is being abandoned anyway.
    pub fn timeout_all(&mut self) -> usize {
        let mut moved = 0;
        while self.first_timed != NONE {
            let head = self.first_timed as usize;
            self.first_timed = self.cells[head].next;
            self.cells[head].state = CellState::Free;
            self.cells[head].next = self.first_free;
            self.first_free = head as i32;
            moved += 1;
        }
        self.last_timed = NONE;
        self.timed_count = 0;
        moved
    }

    pub fn in_use_count(&self) -> usize {
        self.in_use_count
    }

    pub fn timed_count(&self) -> usize {
        self.timed_count
    }

    pub fn free_count(&self) -> usize {
        MAX_IDS - self.in_use_count - self.timed_count
    }
}

impl Default for SnapIdPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_partition_max_ids() {
        let pool = SnapIdPool::new();
        assert_eq!(pool.free_count() + pool.timed_count() + pool.in_use_count(), MAX_IDS);
        assert_eq!(pool.free_count(), MAX_IDS);
    }

    #[test]
    fn new_id_is_in_use() {
        let mut pool = SnapIdPool::new();
        let id = pool.new_id(0).unwrap();
        assert_eq!(pool.in_use_count(), 1);
        assert!(pool.free_id(id, 0).is_ok());
    }

    #[test]
    fn freed_id_does_not_reappear_before_quarantine() {
        let mut pool = SnapIdPool::new();
        let id = pool.new_id(0).unwrap();
        pool.free_id(id, 0).unwrap();

        let mut reappeared = false;
        let mut now = 1;
        for _ in 0..1000 {
            let got = pool.new_id(now).unwrap();
            if got == id {
                reappeared = true;
            }
            pool.free_id(got, now).unwrap();
            now += 1;
        }
        assert!(!reappeared, "id reappeared before the 5s quarantine elapsed");
    }

    #[test]
    fn freed_id_reappears_after_quarantine() {
        let mut pool = SnapIdPool::new();
        let id = pool.new_id(0).unwrap();
        pool.free_id(id, 0).unwrap();

        // Drain every other cell so only the quarantined id remains.
        let mut allocated = Vec::new();
        loop {
            match pool.new_id(0) {
                Ok(got) => allocated.push(got),
                Err(SnapIdPoolError::Exhausted) => break,
                Err(e) => panic!("unexpected error: {e:?}"),
            }
        }
        assert_eq!(pool.free_count(), 0);

        let got = pool.new_id(ID_QUARANTINE_MS).unwrap();
        assert_eq!(got, id);
    }

    #[test]
    fn free_non_inuse_id_errors() {
        let mut pool = SnapIdPool::new();
        assert_eq!(pool.free_id(0, 0), Err(SnapIdPoolError::NotInUse));
    }

    #[test]
    fn exhausted_pool_errors_instead_of_panicking() {
        let mut pool = SnapIdPool::new();
        for _ in 0..MAX_IDS {
            pool.new_id(0).unwrap();
        }
        assert_eq!(pool.new_id(0), Err(SnapIdPoolError::Exhausted));
    }

    #[test]
    fn timeout_all_drains_timed_to_free() {
        let mut pool = SnapIdPool::new();
        let id = pool.new_id(0).unwrap();
        pool.free_id(id, 0).unwrap();
        assert_eq!(pool.timed_count(), 1);
        let moved = pool.timeout_all();
        assert_eq!(moved, 1);
        assert_eq!(pool.timed_count(), 0);
        assert_eq!(pool.free_count(), MAX_IDS);
    }
}
