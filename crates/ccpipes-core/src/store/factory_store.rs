// ── Factory snapshot store ──
//
// Holds the current snapshot behind a `watch` channel. Every mutation builds
// a complete new `FactoryState` (snapshot + derived index + revision) inside
// `send_if_modified`, so readers never observe a half-updated state.

use std::sync::Arc;

use ccpipes_api::{Factory, GroupId, MachineId, Patch};
use chrono::{DateTime, Utc};
use tokio::sync::watch;

use super::index::{GroupParents, group_parents};
use crate::error::CoreError;
use crate::patch;
use crate::stream::FactoryStream;

/// One immutable revision of the factory and everything derived from it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FactoryState {
    pub factory: Factory,
    pub group_parents: GroupParents,
    /// Bumped by one on every successful non-empty mutation.
    pub revision: u64,
}

impl FactoryState {
    fn new(factory: Factory, revision: u64) -> Self {
        let group_parents = group_parents(&factory);
        Self {
            factory,
            group_parents,
            revision,
        }
    }

    /// The machine owning `group`, if any.
    pub fn parent_of(&self, group: &GroupId) -> Option<&MachineId> {
        self.group_parents.get(group)
    }
}

/// Reactive container for the locally held factory snapshot.
///
/// `apply_patches` and `replace` are the only mutation paths.
pub struct FactoryStore {
    state: watch::Sender<Arc<FactoryState>>,
    last_updated: watch::Sender<Option<DateTime<Utc>>>,
}

impl FactoryStore {
    pub fn new() -> Self {
        let (state, _) = watch::channel(Arc::new(FactoryState::default()));
        let (last_updated, _) = watch::channel(None);
        Self {
            state,
            last_updated,
        }
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// The current state (cheap `Arc` clone).
    pub fn snapshot(&self) -> Arc<FactoryState> {
        self.state.borrow().clone()
    }

    pub fn revision(&self) -> u64 {
        self.state.borrow().revision
    }

    /// When the snapshot last changed, or `None` if it never has.
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        *self.last_updated.borrow()
    }

    pub fn subscribe(&self) -> FactoryStream {
        FactoryStream::new(self.state.subscribe())
    }

    // ── Mutations ────────────────────────────────────────────────────

    /// Replace the snapshot wholesale (initial load or resync).
    pub fn replace(&self, factory: Factory) -> Arc<FactoryState> {
        self.state.send_modify(|current| {
            *current = Arc::new(FactoryState::new(factory, current.revision + 1));
        });
        self.touch();
        self.snapshot()
    }

    /// Apply `patches` in order on top of the current snapshot.
    ///
    /// All or nothing: if any patch fails the snapshot is left untouched and
    /// subscribers are not notified. An empty list is a no-op.
    pub fn apply_patches(&self, patches: &[Patch]) -> Result<Arc<FactoryState>, CoreError> {
        if patches.is_empty() {
            return Ok(self.snapshot());
        }

        let mut outcome = Ok(());
        self.state.send_if_modified(|current| {
            match patch::apply_patches(&current.factory, patches) {
                Ok(factory) => {
                    *current = Arc::new(FactoryState::new(factory, current.revision + 1));
                    true
                }
                Err(e) => {
                    outcome = Err(e);
                    false
                }
            }
        });
        outcome?;

        self.touch();
        Ok(self.snapshot())
    }

    fn touch(&self) {
        self.last_updated.send_replace(Some(Utc::now()));
    }
}

impl Default for FactoryStore {
    fn default() -> Self {
        Self::new()
    }
}
