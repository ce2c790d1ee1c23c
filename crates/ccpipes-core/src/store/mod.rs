// ── Reactive factory store ──
//
// Single-writer snapshot storage with push-based change notification.

mod factory_store;
mod index;

pub use factory_store::{FactoryState, FactoryStore};
pub use index::{GroupParents, group_parents};
