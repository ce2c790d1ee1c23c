// ccpipes-api: Wire protocol and relay transport for the ccpipes factory editor.
//
// The factory schema and message envelopes are shared verbatim with the
// ComputerCraft controller, so the types in this crate are both the wire
// format and the domain model consumed by `ccpipes-core`.

pub mod error;
pub mod message;
pub mod relay;
pub mod types;

pub use error::Error;
pub use message::{
    Confirmation, ConfirmationOutcome, FACTORY_UPDATE_REQUEST_TYPES, MessageType, Patch, Request,
    RequestBody, ServerMessage,
};
pub use relay::{ReconnectConfig, RelayHandle, RelayState};
pub use types::{
    Factory, Group, GroupEdits, GroupId, Machine, MachineEdits, MachineId, PeriphId, PeriphMap,
    Pipe, PipeEdits, PipeId, PipeMode, Point, RequestId, Slot,
};
