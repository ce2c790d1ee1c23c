// ── Derived indices ──
//
// Lookups computed from a snapshot. Always rebuilt from scratch alongside
// the snapshot they describe, never maintained incrementally.

use std::collections::BTreeMap;

use ccpipes_api::{Factory, GroupId, MachineId};

/// Group → owning machine.
pub type GroupParents = BTreeMap<GroupId, MachineId>;

/// Map every group referenced by a machine to that machine.
///
/// A group should belong to at most one machine. If the controller ever
/// reports otherwise, the machine with the greatest ID wins and the conflict
/// is logged.
pub fn group_parents(factory: &Factory) -> GroupParents {
    let mut parents = GroupParents::new();
    for (machine_id, machine) in &factory.machines {
        for group_id in &machine.groups {
            if let Some(previous) = parents.insert(group_id.clone(), machine_id.clone()) {
                if previous != *machine_id {
                    tracing::warn!(
                        group = %group_id,
                        previous = %previous,
                        current = %machine_id,
                        "Group is owned by more than one machine"
                    );
                }
            }
        }
    }
    parents
}
