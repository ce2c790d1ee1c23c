//! Subcommand handlers: read input, call into `ccpipes-core`, format output.

pub mod apply;
pub mod combine;
pub mod config_cmd;
pub mod connect;
pub mod diff;
pub mod groups;
pub mod util;
