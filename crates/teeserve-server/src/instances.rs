// instances.rs — multi-instance router (module K): id -> game-instance map,
// smallest-unused-id allocation, and client re-parenting across instances.
// Converted from: myq2-server's game_dll.rs load/unload bookkeeping,
// re-targeted at in-process `Box<dyn GameInstance>` ownership instead of
// `.dll`/`.so` handles (spec §9: trait boundary, not FFI).

use std::collections::BTreeMap;

use teeserve_game::GameInstance;

use crate::client::ClientTable;

pub struct InstanceRecord {
    pub map_name: String,
    pub instance: Box<dyn GameInstance>,
}

/// id-ordered instance table; id 0 is always present (the default
/// instance created at startup) and is never removed by `stop`.
pub struct InstanceTable {
    instances: BTreeMap<u32, InstanceRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceError {
    NotFound,
    IsDefaultInstance,
}

impl InstanceTable {
    pub fn new(default_instance: Box<dyn GameInstance>, default_map: &str) -> Self {
        let mut instances = BTreeMap::new();
        instances.insert(
            0,
            InstanceRecord {
                map_name: default_map.to_string(),
                instance: default_instance,
            },
        );
        Self { instances }
    }

    fn smallest_unused_id(&self) -> u32 {
        let mut id = 1;
        while self.instances.contains_key(&id) {
            id += 1;
        }
        id
    }

    /// Registers a freshly constructed instance under the smallest unused
    /// positive id and calls `on_init`. Returns the new id.
    pub fn start(&mut self, map_name: &str, mut instance: Box<dyn GameInstance>) -> u32 {
        instance.on_init();
        let id = self.smallest_unused_id();
        self.instances.insert(id, InstanceRecord { map_name: map_name.to_string(), instance });
        id
    }

    /// Stops instance `id`, reparenting any client currently bound to it
    /// onto `move_to` (defaulting to the default instance, id 0) via
    /// `ClientSlot::reset_for_map_change`. Refuses to stop id 0.
    ///
    /// Looks the record up by id and removes exactly that entry; an id
    /// that is not present is a no-op rather than an error; id 0 can
    /// never be targeted by this path (its record never existed under a
    /// transient id), which is what rules out the "deletes whichever
    /// record happens to be first" bug this is modeled to avoid.
    pub fn stop(&mut self, id: u32, move_to: u32, clients: &mut ClientTable) -> Result<(), InstanceError> {
        if id == 0 {
            return Err(InstanceError::IsDefaultInstance);
        }
        if self.instances.remove(&id).is_none() {
            return Ok(());
        }
        for slot in &mut clients.slots {
            if slot.instance_id == id {
                slot.reset_for_map_change();
                slot.instance_id = move_to;
            }
        }
        Ok(())
    }

    /// Moves a single client to instance `id` without touching any other
    /// client or the instance table itself.
    pub fn move_player(&self, clients: &mut ClientTable, client_slot: usize, id: u32) -> Result<(), InstanceError> {
        if !self.instances.contains_key(&id) {
            return Err(InstanceError::NotFound);
        }
        let slot = &mut clients.slots[client_slot];
        slot.reset_for_map_change();
        slot.instance_id = id;
        Ok(())
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut InstanceRecord> {
        self.instances.get_mut(&id)
    }

    pub fn get(&self, id: u32) -> Option<&InstanceRecord> {
        self.instances.get(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.instances.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use teeserve_game::demo::DemoGame;

    #[test]
    fn default_instance_is_present_at_id_zero() {
        let table = InstanceTable::new(Box::new(DemoGame::new("dm1")), "dm1");
        assert_eq!(table.len(), 1);
        assert!(table.get(0).is_some());
    }

    #[test]
    fn start_picks_smallest_unused_id() {
        let mut table = InstanceTable::new(Box::new(DemoGame::new("dm1")), "dm1");
        let a = table.start("dm2", Box::new(DemoGame::new("dm2")));
        let b = table.start("dm3", Box::new(DemoGame::new("dm3")));
        assert_eq!(a, 1);
        assert_eq!(b, 2);

        let mut clients = ClientTable::new(4);
        table.stop(a, 0, &mut clients).unwrap();
        let c = table.start("dm4", Box::new(DemoGame::new("dm4")));
        assert_eq!(c, 1, "the freed id should be reused before allocating a new one");
    }

    #[test]
    fn stop_refuses_default_instance() {
        let mut table = InstanceTable::new(Box::new(DemoGame::new("dm1")), "dm1");
        let mut clients = ClientTable::new(4);
        assert_eq!(table.stop(0, 0, &mut clients), Err(InstanceError::IsDefaultInstance));
    }

    #[test]
    fn stop_on_absent_id_is_a_no_op() {
        let mut table = InstanceTable::new(Box::new(DemoGame::new("dm1")), "dm1");
        let mut clients = ClientTable::new(4);
        assert!(table.stop(99, 0, &mut clients).is_ok());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn stop_reparents_clients_to_move_to() {
        let mut table = InstanceTable::new(Box::new(DemoGame::new("dm1")), "dm1");
        let id = table.start("dm2", Box::new(DemoGame::new("dm2")));
        let mut clients = ClientTable::new(4);
        clients.slots[0].instance_id = id;
        clients.slots[0].name = "alice".into();

        table.stop(id, 0, &mut clients).unwrap();
        assert_eq!(clients.slots[0].instance_id, 0);
        assert_eq!(clients.slots[0].name, "alice", "reset_for_map_change preserves the name");
    }

    #[test]
    fn move_player_rejects_unknown_instance() {
        let table = InstanceTable::new(Box::new(DemoGame::new("dm1")), "dm1");
        let mut clients = ClientTable::new(4);
        assert_eq!(table.move_player(&mut clients, 0, 7), Err(InstanceError::NotFound));
    }
}
