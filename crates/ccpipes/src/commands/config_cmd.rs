//! Config subcommand handlers.

use serde::Serialize;
use tabled::Tabled;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, Profile};
use crate::error::CliError;
use crate::output;

#[derive(Serialize)]
struct ProfileView<'a> {
    name: &'a str,
    default: bool,
    #[serde(flatten)]
    profile: &'a Profile,
}

#[derive(Tabled)]
struct ProfileRow {
    #[tabled(rename = "")]
    marker: &'static str,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Relay")]
    relay: String,
    #[tabled(rename = "Session")]
    session: String,
}

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            output::print_output(&config::config_path().display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = config::load_config_or_default();
            let out = output::render_single(
                &global.output,
                &cfg,
                |c| toml::to_string_pretty(c).unwrap_or_default(),
                |c| config::active_profile_name(global, c),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Profiles => {
            let cfg = config::load_config_or_default();
            let active = config::active_profile_name(global, &cfg);
            let views: Vec<ProfileView<'_>> = cfg
                .profiles
                .iter()
                .map(|(name, profile)| ProfileView {
                    name,
                    default: *name == active,
                    profile,
                })
                .collect();
            let out = output::render_list(
                &global.output,
                &views,
                |v| ProfileRow {
                    marker: if v.default { "*" } else { "" },
                    name: v.name.to_owned(),
                    relay: v.profile.relay.clone(),
                    session: v.profile.session.clone().unwrap_or_else(|| "-".into()),
                },
                |v| v.name.to_owned(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Set {
            name,
            relay,
            session,
        } => {
            let mut cfg = config::load_config_or_default();
            let profile = cfg.profiles.entry(name.clone()).or_default();
            if let Some(relay) = relay {
                profile.relay = relay;
            }
            if session.is_some() {
                profile.session = session;
            }
            // Reject a bad URL before it reaches the file.
            ccpipes_config::relay_url(profile)?;
            config::save_config(&cfg)?;
            if !global.quiet {
                eprintln!("Profile '{name}' saved to {}", config::config_path().display());
            }
            Ok(())
        }

        ConfigCommand::Use { name } => {
            let mut cfg = config::load_config_or_default();
            if !cfg.profiles.contains_key(&name) {
                return Err(CliError::ProfileNotFound {
                    available: cfg.profiles.keys().cloned().collect::<Vec<_>>().join(", "),
                    name,
                });
            }
            cfg.default_profile = Some(name.clone());
            config::save_config(&cfg)?;
            if !global.quiet {
                eprintln!("Default profile set to '{name}'");
            }
            Ok(())
        }
    }
}
