//! Shared helpers for command handlers.

use std::io::Read;
use std::path::Path;

use ccpipes_api::{Factory, Patch};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::CliError;

/// Read and decode a JSON file, or stdin when `path` is `-`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, CliError> {
    let raw = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .map_err(|source| CliError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        buf
    } else {
        std::fs::read_to_string(path).map_err(|source| CliError::Read {
            path: path.to_path_buf(),
            source,
        })?
    };
    serde_json::from_str(&raw).map_err(|source| CliError::Json {
        path: path.to_path_buf(),
        source,
    })
}

pub fn read_factory(path: &Path) -> Result<Factory, CliError> {
    read_json(path)
}

/// A patch file holds either one delta object or an array of them.
pub fn read_patches(path: &Path) -> Result<Vec<Patch>, CliError> {
    match read_json::<Value>(path)? {
        Value::Array(items) => Ok(items.into_iter().map(Patch::from).collect()),
        delta @ Value::Object(_) => Ok(vec![Patch::from(delta)]),
        _ => Err(CliError::Validation {
            field: path.display().to_string(),
            reason: "expected a delta object or an array of deltas".into(),
        }),
    }
}

/// One-line count summary of a factory.
pub fn factory_summary(factory: &Factory) -> String {
    format!(
        "{} machines, {} groups, {} pipes ({} peripherals available, {} missing)",
        factory.machines.len(),
        factory.groups.len(),
        factory.pipes.len(),
        factory.available.len(),
        factory.missing.len(),
    )
}
