//! Factory synchronization and editing logic between `ccpipes-api` and
//! editor front ends.
//!
//! - **[`Editor`]**: facade owning the snapshot, the pending-request set, and
//!   the relay channels. It processes inbound messages one at a time and
//!   turns user intents into outbound requests.
//!
//! - **[`FactoryStore`]**: holds the current [`Factory`](ccpipes_api::Factory)
//!   snapshot behind a `tokio::sync::watch` channel. Its only mutation paths
//!   are a wholesale replace and [`apply_patches`].
//!
//! - **[`patch`] / [`diff`]**: jsondiffpatch delta application and the
//!   inverse, snapshot comparison.
//!
//! - **[`combine`]**: the merge engine. Pure functions that turn "merge these
//!   groups/machines" into an ordered list of edit and delete requests.
//!
//! - **[`drop_target`]**: drag-and-drop state machine choosing which node a
//!   dragged machine would merge into.

pub mod combine;
pub mod config;
pub mod correlator;
pub mod diff;
pub mod drop_target;
pub mod editor;
pub mod error;
pub mod patch;
pub mod pipes;
pub mod store;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use combine::{can_combine, combine_groups, combine_machines, sort_slots};
pub use config::EditorConfig;
pub use correlator::{Correlation, PendingRequest, PendingRequests};
pub use diff::{EntityChanges, FactoryChanges, diff_factories};
pub use drop_target::{DragState, DropCandidate, DropTargetResolver, NodeRef, Viewport};
pub use editor::{Editor, EditorEvent, SyncState};
pub use error::{CoreError, PatchError};
pub use patch::{apply_patch, apply_patches};
pub use store::{FactoryState, FactoryStore, GroupParents};
pub use stream::FactoryStream;
