// snapshot.rs — snapshot storage (module C) and the delta engine
// (module D).
// Converted from: myq2-common's qcommon.rs struct conventions (plain data
// structs, HashMap-indexed lookup for O(1) access) applied to this
// protocol's per-tick world snapshot instead of Quake's entity_state_t.

use std::collections::HashMap;

use crate::wire::SERVER_TICK_SPEED;

/// One item inside a snapshot: a (type, id) key plus its payload words.
/// Invariant: within a `Snapshot`, (item_type, id) is unique.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapItem {
    pub item_type: u16,
    pub id: u16,
    pub words: Vec<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    items: Vec<SnapItem>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[SnapItem] {
        &self.items
    }

    /// Inserts an item. Returns an error if (type, id) is already present —
    /// callers build a fresh snapshot per tick so this should never fire in
    /// practice; surfaced as `Err` rather than silently overwriting.
    pub fn add_item(&mut self, item_type: u16, id: u16, words: Vec<i32>) -> Result<(), String> {
        if self.find(item_type, id).is_some() {
            return Err(format!("duplicate snapshot item ({item_type}, {id})"));
        }
        self.items.push(SnapItem { item_type, id, words });
        Ok(())
    }

    pub fn find(&self, item_type: u16, id: u16) -> Option<&SnapItem> {
        self.items.iter().find(|it| it.item_type == item_type && it.id == id)
    }

    fn index(&self) -> HashMap<(u16, u16), usize> {
        self.items
            .iter()
            .enumerate()
            .map(|(i, it)| ((it.item_type, it.id), i))
            .collect()
    }
}

/// Per-(type,id) fixed word count. `None` means the size travels with the
/// item in the wire encoding (read from its own header) rather than being
/// known statically.
pub type DeltaSizeTable = HashMap<u16, Option<usize>>;

/// Build the i32 stream the transport hands to `intcompress::compress`.
/// Layout: `num_removed, (type,id)*, num_added_or_changed, (type, id,
/// [size], words...)*`.
pub fn create_delta(from: &Snapshot, to: &Snapshot, sizes: &DeltaSizeTable) -> Vec<i32> {
    let from_index = from.index();
    let to_index = to.index();

    let mut removed = Vec::new();
    for item in &from.items {
        if !to_index.contains_key(&(item.item_type, item.id)) {
            removed.push((item.item_type, item.id));
        }
    }

    let mut changed = Vec::new();
    for item in &to.items {
        let key = (item.item_type, item.id);
        match from_index.get(&key) {
            None => changed.push((item, None)),
            Some(&from_idx) => {
                let old = &from.items[from_idx];
                if old.words != item.words {
                    changed.push((item, Some(old)));
                }
            }
        }
    }

    let mut out = Vec::new();
    out.push(removed.len() as i32);
    for (t, id) in &removed {
        out.push(*t as i32);
        out.push(*id as i32);
    }

    out.push(changed.len() as i32);
    for (item, old) in &changed {
        out.push(item.item_type as i32);
        out.push(item.id as i32);
        let dynamic = sizes.get(&item.item_type).copied().flatten().is_none();
        if dynamic {
            out.push(item.words.len() as i32);
        }
        for (i, &word) in item.words.iter().enumerate() {
            let old_word = old.and_then(|o| o.words.get(i).copied()).unwrap_or(0);
            out.push(word - old_word);
        }
    }

    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyDeltaError {
    Truncated,
    DuplicateItem,
}

/// Inverse of `create_delta`: `apply_delta(from, create_delta(from, to)) ==
/// to`.
pub fn apply_delta(
    from: &Snapshot,
    delta: &[i32],
    sizes: &DeltaSizeTable,
) -> Result<Snapshot, ApplyDeltaError> {
    let mut pos = 0usize;
    let mut next = |pos: &mut usize| -> Result<i32, ApplyDeltaError> {
        let v = *delta.get(*pos).ok_or(ApplyDeltaError::Truncated)?;
        *pos += 1;
        Ok(v)
    };

    let num_removed = next(&mut pos)? as usize;
    let mut removed = std::collections::HashSet::new();
    for _ in 0..num_removed {
        let t = next(&mut pos)? as u16;
        let id = next(&mut pos)? as u16;
        removed.insert((t, id));
    }

    let num_changed = next(&mut pos)? as usize;
    let mut changed = Vec::with_capacity(num_changed);
    for _ in 0..num_changed {
        let item_type = next(&mut pos)? as u16;
        let id = next(&mut pos)? as u16;
        let size = match sizes.get(&item_type).copied().flatten() {
            Some(fixed) => fixed,
            None => next(&mut pos)? as usize,
        };
        let mut words = Vec::with_capacity(size);
        for _ in 0..size {
            words.push(next(&mut pos)?);
        }
        changed.push((item_type, id, words));
    }

    let mut to = Snapshot::new();
    for item in from.items() {
        if removed.contains(&(item.item_type, item.id)) {
            continue;
        }
        if changed.iter().any(|(t, id, _)| *t == item.item_type && *id == item.id) {
            continue; // replaced below with the delta-applied words
        }
        to.add_item(item.item_type, item.id, item.words.clone())
            .map_err(|_| ApplyDeltaError::DuplicateItem)?;
    }

    for (item_type, id, diff_words) in changed {
        let old_words = from.find(item_type, id).map(|it| it.words.as_slice()).unwrap_or(&[]);
        let words: Vec<i32> = diff_words
            .iter()
            .enumerate()
            .map(|(i, &d)| d + old_words.get(i).copied().unwrap_or(0))
            .collect();
        to.add_item(item_type, id, words)
            .map_err(|_| ApplyDeltaError::DuplicateItem)?;
    }

    Ok(to)
}

/// Per-client ring of past snapshots keyed by tick, bounded to
/// `3 * SERVER_TICK_SPEED` entries under steady state (spec §4.C).
#[derive(Default)]
pub struct SnapshotHistory {
    entries: HashMap<i32, (i64, Vec<i32>)>,
}

impl SnapshotHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, tick: i32, wall_time: i64, bytes: Vec<i32>) {
        self.entries.insert(tick, (wall_time, bytes));
    }

    pub fn get(&self, tick: i32) -> Option<(i64, &[i32])> {
        self.entries.get(&tick).map(|(t, b)| (*t, b.as_slice()))
    }

    /// Drops every entry strictly older than `tick`.
    pub fn purge_until(&mut self, tick: i32) {
        self.entries.retain(|&t, _| t >= tick);
    }

    /// Evicts everything more than 3 seconds behind `current_tick`,
    /// matching the bound the data model names.
    pub fn evict_stale(&mut self, current_tick: i32) {
        self.purge_until(current_tick - 3 * SERVER_TICK_SPEED);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizes() -> DeltaSizeTable {
        let mut m = HashMap::new();
        m.insert(1u16, Some(3usize)); // fixed-size item type
        m.insert(2u16, None); // dynamic-size item type
        m
    }

    #[test]
    fn create_delta_of_identical_snapshots_is_empty_shaped() {
        let mut s = Snapshot::new();
        s.add_item(1, 0, vec![1, 2, 3]).unwrap();
        let delta = create_delta(&s, &s, &sizes());
        // num_removed=0, num_changed=0
        assert_eq!(delta, vec![0, 0]);
    }

    #[test]
    fn apply_delta_inverts_create_delta_fixed_size() {
        let mut from = Snapshot::new();
        from.add_item(1, 0, vec![1, 2, 3]).unwrap();
        from.add_item(1, 1, vec![5, 5, 5]).unwrap();

        let mut to = Snapshot::new();
        to.add_item(1, 0, vec![1, 9, 3]).unwrap(); // changed
        to.add_item(1, 2, vec![7, 7, 7]).unwrap(); // new
        // id 1 removed

        let sizes = sizes();
        let delta = create_delta(&from, &to, &sizes);
        let applied = apply_delta(&from, &delta, &sizes).unwrap();
        assert_eq!(applied, to);
    }

    #[test]
    fn apply_delta_inverts_create_delta_dynamic_size() {
        let mut from = Snapshot::new();
        from.add_item(2, 0, vec![1, 2]).unwrap();

        let mut to = Snapshot::new();
        to.add_item(2, 0, vec![1, 2, 3]).unwrap();

        let sizes = sizes();
        let delta = create_delta(&from, &to, &sizes);
        let applied = apply_delta(&from, &delta, &sizes).unwrap();
        assert_eq!(applied, to);
    }

    #[test]
    fn history_purge_until_keeps_only_recent() {
        let mut h = SnapshotHistory::new();
        h.add(10, 100, vec![1]);
        h.add(20, 200, vec![2]);
        h.add(30, 300, vec![3]);
        h.purge_until(20);
        assert!(h.get(10).is_none());
        assert!(h.get(20).is_some());
        assert!(h.get(30).is_some());
    }

    #[test]
    fn history_evict_stale_uses_three_second_window() {
        let mut h = SnapshotHistory::new();
        h.add(0, 0, vec![]);
        h.add(SERVER_TICK_SPEED * 3, 0, vec![]);
        h.evict_stale(SERVER_TICK_SPEED * 6);
        assert!(h.get(0).is_none());
        assert!(h.get(SERVER_TICK_SPEED * 3).is_some());
    }
}
