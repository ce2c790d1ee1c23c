// ── Snapshot comparison ──
//
// Two views of the difference between factory snapshots: a delta in the
// same format the controller emits (so `apply_patches(old, [diff]) == new`),
// and a per-entity change set for observers that update incrementally.

use std::collections::BTreeMap;

use ccpipes_api::{Factory, GroupId, MachineId, Patch, PeriphId, PipeId};
use serde_json::{Map, Value, json};

/// Compute a delta transforming `old` into `new`, or `None` if they're equal.
///
/// Objects are diffed member by member; arrays and scalars that differ are
/// replaced wholesale.
pub fn diff_factories(
    old: &Factory,
    new: &Factory,
) -> Result<Option<Patch>, serde_json::Error> {
    if old == new {
        return Ok(None);
    }
    let old = serde_json::to_value(old)?;
    let new = serde_json::to_value(new)?;
    Ok(diff_values(&old, &new).map(Patch::from))
}

fn diff_values(old: &Value, new: &Value) -> Option<Value> {
    if old == new {
        return None;
    }
    match (old, new) {
        (Value::Object(before), Value::Object(after)) => {
            Some(Value::Object(diff_objects(before, after)))
        }
        _ => Some(json!([old, new])),
    }
}

fn diff_objects(before: &Map<String, Value>, after: &Map<String, Value>) -> Map<String, Value> {
    let mut delta = Map::new();

    for (key, old_val) in before {
        match after.get(key) {
            Some(new_val) => {
                if let Some(member) = diff_values(old_val, new_val) {
                    delta.insert(key.clone(), member);
                }
            }
            None => {
                delta.insert(key.clone(), json!([old_val, 0, 0]));
            }
        }
    }

    for (key, new_val) in after {
        if !before.contains_key(key) {
            delta.insert(key.clone(), json!([new_val]));
        }
    }

    delta
}

// ── Change sets ─────────────────────────────────────────────────────

/// IDs added, deleted, and modified within one keyed collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityChanges<K> {
    pub added: Vec<K>,
    pub deleted: Vec<K>,
    pub modified: Vec<K>,
}

impl<K> Default for EntityChanges<K> {
    fn default() -> Self {
        Self {
            added: Vec::new(),
            deleted: Vec::new(),
            modified: Vec::new(),
        }
    }
}

impl<K: Ord + Clone> EntityChanges<K> {
    fn between<V: PartialEq>(old: &BTreeMap<K, V>, new: &BTreeMap<K, V>) -> Self {
        let mut changes = Self::default();
        for (key, old_val) in old {
            match new.get(key) {
                Some(new_val) if new_val != old_val => changes.modified.push(key.clone()),
                Some(_) => {}
                None => changes.deleted.push(key.clone()),
            }
        }
        changes.added = new
            .keys()
            .filter(|key| !old.contains_key(*key))
            .cloned()
            .collect();
        changes
    }
}

impl<K> EntityChanges<K> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.deleted.is_empty() && self.modified.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.deleted.len() + self.modified.len()
    }
}

/// Everything that differs between two factory snapshots, by entity kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FactoryChanges {
    pub machines: EntityChanges<MachineId>,
    pub groups: EntityChanges<GroupId>,
    pub pipes: EntityChanges<PipeId>,
    pub missing: EntityChanges<PeriphId>,
    pub available: EntityChanges<PeriphId>,
}

impl FactoryChanges {
    pub fn between(old: &Factory, new: &Factory) -> Self {
        Self {
            machines: EntityChanges::between(&old.machines, &new.machines),
            groups: EntityChanges::between(&old.groups, &new.groups),
            pipes: EntityChanges::between(&old.pipes, &new.pipes),
            missing: EntityChanges::between(&old.missing, &new.missing),
            available: EntityChanges::between(&old.available, &new.available),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.machines.is_empty()
            && self.groups.is_empty()
            && self.pipes.is_empty()
            && self.missing.is_empty()
            && self.available.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::patch::apply_patches;
    use ccpipes_api::{Group, Machine, Pipe, PipeMode, Slot};
    use pretty_assertions::assert_eq;

    fn base() -> Factory {
        Factory::default()
            .with_machine(Machine::new("m1", vec!["g1".into(), "g2".into()]))
            .with_group(Group::new("g1", vec![Slot::new("p1", 0), Slot::new("p1", 1)]))
            .with_group(Group::new("g2", vec![Slot::new("p1", 2)]))
            .with_pipe(Pipe::new("pipe1", "g1", "g2"))
    }

    #[test]
    fn equal_factories_have_no_diff() {
        assert_eq!(diff_factories(&base(), &base()).unwrap(), None);
        assert!(FactoryChanges::between(&base(), &base()).is_empty());
    }

    #[test]
    fn diff_round_trips_through_apply() {
        let old = base();
        let mut new = base();
        new.groups.remove(&GroupId::from("g2"));
        if let Some(m1) = new.machines.get_mut(&MachineId::from("m1")) {
            m1.groups = vec!["g1".into()];
            m1.nickname = Some("Smelter".into());
        }
        if let Some(pipe) = new.pipes.get_mut(&PipeId::from("pipe1")) {
            pipe.mode = Some(PipeMode::Spread);
        }
        new.available.insert("chest_9".into(), true);

        let diff = diff_factories(&old, &new).unwrap().unwrap();
        assert_eq!(apply_patches(&old, &[diff]).unwrap(), new);
    }

    #[test]
    fn diff_uses_delete_and_add_markers() {
        let old = base();
        let mut new = base();
        new.pipes.clear();
        new.missing.insert("p1".into(), true);

        let diff = diff_factories(&old, &new).unwrap().unwrap();
        let value = diff.as_value();
        assert_eq!(value["pipes"]["pipe1"][1], json!(0));
        assert_eq!(value["pipes"]["pipe1"][2], json!(0));
        assert_eq!(value["missing"]["p1"], json!([true]));
        assert!(value.get("machines").is_none());
    }

    #[test]
    fn change_set_classifies_entities() {
        let old = base();
        let mut new = base();
        new.groups.remove(&GroupId::from("g2"));
        new.groups
            .insert("g3".into(), Group::new("g3", vec![Slot::new("p2", 0)]));
        if let Some(g1) = new.groups.get_mut(&GroupId::from("g1")) {
            g1.nickname = Some("in".into());
        }

        let changes = FactoryChanges::between(&old, &new);
        assert_eq!(changes.groups.added, vec![GroupId::from("g3")]);
        assert_eq!(changes.groups.deleted, vec![GroupId::from("g2")]);
        assert_eq!(changes.groups.modified, vec![GroupId::from("g1")]);
        assert_eq!(changes.groups.len(), 3);
        assert!(changes.machines.is_empty());
        assert!(changes.pipes.is_empty());
    }

    #[test]
    fn periph_flag_flip_is_a_modification() {
        let old = base();
        let mut new = base();
        new.available.insert("p1".into(), true);
        let mut newer = new.clone();
        newer.available.insert("p1".into(), false);

        assert_eq!(
            FactoryChanges::between(&old, &new).available.added,
            vec![PeriphId::from("p1")]
        );
        assert_eq!(
            FactoryChanges::between(&new, &newer).available.modified,
            vec![PeriphId::from("p1")]
        );
    }
}
