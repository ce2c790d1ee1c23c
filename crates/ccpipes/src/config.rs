//! CLI configuration: thin wrapper around `ccpipes_config` shared types.
//!
//! Re-exports the shared types and adds resolution that respects
//! `GlobalOpts` / `ConnectArgs` flag overrides (--profile, --relay, --session).

use ccpipes_api::ReconnectConfig;
use ccpipes_core::EditorConfig;
use url::Url;

use crate::cli::{ConnectArgs, GlobalOpts};
use crate::error::CliError;

// ── Re-exports from shared crate ────────────────────────────────────

pub use ccpipes_config::{Config, Profile, config_path, load_config_or_default, save_config};

// ── CLI-specific helpers ────────────────────────────────────────────

/// Everything needed to open a live relay session.
#[derive(Debug)]
pub struct Connection {
    pub profile: String,
    pub url: Url,
    pub reconnect: ReconnectConfig,
    pub editor: EditorConfig,
}

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Translate the active profile + flags into connection settings.
///
/// Flag overrides take priority over profile values.
pub fn resolve_connection(
    config: &Config,
    global: &GlobalOpts,
    args: &ConnectArgs,
) -> Result<Connection, CliError> {
    let name = active_profile_name(global, config);
    let mut profile = match config.profiles.get(&name) {
        Some(profile) => profile.clone(),
        // A relay on the command line stands in for a missing profile.
        None if args.relay.is_some() => Profile::default(),
        None => {
            return Err(CliError::ProfileNotFound {
                available: config
                    .profiles
                    .keys()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", "),
                name,
            });
        }
    };

    if let Some(ref relay) = args.relay {
        profile.relay.clone_from(relay);
    }
    if args.session.is_some() {
        profile.session.clone_from(&args.session);
    }

    Ok(Connection {
        url: ccpipes_config::relay_url(&profile)?,
        reconnect: ccpipes_config::profile_to_reconnect_config(&profile)?,
        editor: ccpipes_config::profile_to_editor_config(&profile, &config.defaults),
        profile: name,
    })
}
