// ── Entity merge engine ──
//
// Deterministic folding of groups into groups and machines into machines.
// Both operations are pure: they read a snapshot and return the requests the
// controller must execute, in order. Nothing here touches the store; the
// resulting diffs come back through the normal patch stream.

use std::collections::BTreeSet;

use ccpipes_api::{Factory, Group, GroupEdits, GroupId, MachineEdits, MachineId, RequestBody, Slot};
use indexmap::IndexMap;

use crate::error::CoreError;

/// Sort slots into canonical `(slot, periphId)` order.
///
/// Slot order is filter priority on the controller, so every merge must
/// produce the same order regardless of input order.
pub fn sort_slots(slots: &mut [Slot]) {
    slots.sort();
}

/// Fluid and item groups never merge with each other.
pub fn can_combine(source: &Group, target: &Group) -> bool {
    source.is_fluid() == target.is_fluid()
}

/// Fold `sources` into `target`: one `GroupEdit` with the merged, sorted
/// slot list, then one `GroupDel` per merged source.
///
/// Sources of the other fluid kind are dropped silently. Sources missing
/// from the snapshot, repeated, or equal to the target are skipped. The
/// `GroupEdit` is emitted even when no source survives.
pub fn combine_groups(
    sources: &[GroupId],
    target: &GroupId,
    factory: &Factory,
) -> Result<Vec<RequestBody>, CoreError> {
    let target_group = factory
        .group(target)
        .ok_or_else(|| CoreError::GroupNotFound {
            identifier: target.to_string(),
        })?;

    let mut seen = BTreeSet::from([target]);
    let mut merged = Vec::with_capacity(sources.len());
    for id in sources {
        if !seen.insert(id) {
            continue;
        }
        let Some(group) = factory.group(id) else {
            tracing::debug!(group = %id, "Skipping source group missing from snapshot");
            continue;
        };
        if !can_combine(group, target_group) {
            tracing::debug!(group = %id, target = %target, "Skipping group of the other fluid kind");
            continue;
        }
        merged.push((id, group));
    }

    let mut slots = target_group.slots.clone();
    for (_, group) in &merged {
        slots.extend(group.slots.iter().cloned());
    }
    sort_slots(&mut slots);

    let mut requests = Vec::with_capacity(merged.len() + 1);
    requests.push(RequestBody::GroupEdit {
        group_id: target.clone(),
        edits: GroupEdits {
            slots: Some(slots),
            ..GroupEdits::default()
        },
    });
    requests.extend(merged.into_iter().map(|(id, _)| RequestBody::GroupDel {
        group_id: id.clone(),
    }));
    Ok(requests)
}

/// Fold `sources` into `target`.
///
/// Groups are visited target first, then each source in order. Named groups
/// sharing a nickname (and fluid kind) collapse into the first one
/// encountered; unnamed groups pass through. The target's final group list
/// is named item groups, then named fluid groups, then unnamed groups.
///
/// Emits the group merges, then one `MachineEdit`, then one `MachineDel` per
/// source machine.
pub fn combine_machines(
    sources: &[MachineId],
    target: &MachineId,
    factory: &Factory,
) -> Result<Vec<RequestBody>, CoreError> {
    let target_machine = factory
        .machine(target)
        .ok_or_else(|| CoreError::MachineNotFound {
            identifier: target.to_string(),
        })?;

    let mut seen = BTreeSet::from([target]);
    let mut source_machines = Vec::with_capacity(sources.len());
    for id in sources {
        if !seen.insert(id) {
            continue;
        }
        match factory.machine(id) {
            Some(machine) => source_machines.push(machine),
            None => tracing::debug!(machine = %id, "Skipping source machine missing from snapshot"),
        }
    }

    let mut named: IndexMap<&str, Vec<&GroupId>> = IndexMap::new();
    let mut named_fluid: IndexMap<&str, Vec<&GroupId>> = IndexMap::new();
    let mut unnamed: Vec<&GroupId> = Vec::new();
    let mut visited = BTreeSet::new();

    for machine in std::iter::once(target_machine).chain(source_machines.iter().copied()) {
        for group_id in &machine.groups {
            if !visited.insert(group_id) {
                continue;
            }
            let Some(group) = factory.group(group_id) else {
                tracing::warn!(group = %group_id, machine = %machine.id, "Machine references unknown group");
                unnamed.push(group_id);
                continue;
            };
            match group.name() {
                None => unnamed.push(group_id),
                Some(nick) if group.is_fluid() => named_fluid.entry(nick).or_default().push(group_id),
                Some(nick) => named.entry(nick).or_default().push(group_id),
            }
        }
    }

    let mut requests = Vec::new();
    let mut final_groups = Vec::with_capacity(visited.len());

    for bucket in named.values().chain(named_fluid.values()) {
        let Some((first, rest)) = bucket.split_first() else {
            continue;
        };
        if !rest.is_empty() {
            let rest: Vec<GroupId> = rest.iter().map(|id| (*id).clone()).collect();
            requests.extend(combine_groups(&rest, first, factory)?);
        }
        final_groups.push((*first).clone());
    }
    final_groups.extend(unnamed.into_iter().cloned());

    requests.push(RequestBody::MachineEdit {
        machine_id: target.clone(),
        edits: MachineEdits {
            groups: Some(final_groups),
            ..MachineEdits::default()
        },
    });
    requests.extend(source_machines.iter().map(|machine| RequestBody::MachineDel {
        machine_id: machine.id.clone(),
    }));

    Ok(requests)
}
