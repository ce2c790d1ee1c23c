//! Live relay session: join, sync, optionally follow changes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ccpipes_api::{RelayHandle, RelayState};
use ccpipes_core::{Editor, EditorEvent, EntityChanges, FactoryChanges};

use crate::cli::{ConnectArgs, GlobalOpts};
use crate::commands::util;
use crate::config;
use crate::error::CliError;
use crate::output::{self, ChangeKind};

pub async fn handle(args: &ConnectArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = config::load_config_or_default();
    let conn = config::resolve_connection(&cfg, global, args)?;
    info!(profile = %conn.profile, relay = %conn.url, "connecting");

    let cancel = CancellationToken::new();
    let (relay, inbound) =
        RelayHandle::connect(conn.url.as_str(), conn.reconnect, cancel.clone()).map_err(|e| {
            CliError::ConnectionFailed {
                url: conn.url.to_string(),
                source: Box::new(e),
            }
        })?;

    let editor = Editor::new(conn.editor, relay.sender());
    let runner = tokio::spawn({
        let editor = editor.clone();
        async move { editor.run(inbound).await }
    });

    let result = session(&editor, &relay, args, global, conn.url.as_str()).await;

    editor.shutdown();
    relay.shutdown();
    cancel.cancel();
    if let Err(e) = runner.await {
        warn!(error = %e, "editor task ended abnormally");
    }
    result
}

async fn session(
    editor: &Editor,
    relay: &RelayHandle,
    args: &ConnectArgs,
    global: &GlobalOpts,
    url: &str,
) -> Result<(), CliError> {
    let mut events = editor.events();
    let mut relay_state = relay.state();

    // Requests queue until the socket is up, so joining can start right away.
    editor.join_session().await?;

    let seconds = global.timeout;
    tokio::time::timeout(
        Duration::from_secs(seconds),
        wait_for_sync(&mut events, &mut relay_state, url),
    )
    .await
    .map_err(|_| CliError::Timeout {
        seconds,
        waiting_for: "the factory snapshot".into(),
    })??;

    let state = editor.store().snapshot();
    let out = output::render_single(
        &global.output,
        &state.factory,
        |f| format!("Synced (revision {}): {}", state.revision, util::factory_summary(f)),
        util::factory_summary,
    )?;
    output::print_output(&out, global.quiet);

    if args.watch {
        follow(editor, &mut events, &mut relay_state, global, url).await?;
    }
    Ok(())
}

async fn wait_for_sync(
    events: &mut tokio::sync::broadcast::Receiver<Arc<EditorEvent>>,
    relay_state: &mut tokio::sync::watch::Receiver<RelayState>,
    url: &str,
) -> Result<(), CliError> {
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => match &*event {
                    EditorEvent::Synced { .. } => return Ok(()),
                    EditorEvent::RequestRejected { responding_to, error, message, .. } => {
                        return Err(CliError::Rejected {
                            responding_to: responding_to.to_string(),
                            error: error.clone(),
                            message: message.clone(),
                        });
                    }
                    other => debug!(event = ?other, "event while syncing"),
                },
                Err(RecvError::Lagged(n)) => warn!(skipped = n, "event receiver lagged"),
                Err(RecvError::Closed) => return Err(relay_lost(url)),
            },
            changed = relay_state.changed() => {
                if changed.is_err() || *relay_state.borrow() == RelayState::Failed {
                    return Err(relay_lost(url));
                }
            }
        }
    }
}

async fn follow(
    editor: &Editor,
    events: &mut tokio::sync::broadcast::Receiver<Arc<EditorEvent>>,
    relay_state: &mut tokio::sync::watch::Receiver<RelayState>,
    global: &GlobalOpts,
    url: &str,
) -> Result<(), CliError> {
    let color = output::should_color(&global.color);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                return Ok(());
            }
            event = events.recv() => match event {
                Ok(event) => output::print_output(&describe(&event, color), global.quiet),
                Err(RecvError::Lagged(n)) => warn!(skipped = n, "event receiver lagged"),
                Err(RecvError::Closed) => return Ok(()),
            },
            changed = relay_state.changed() => {
                if changed.is_err() {
                    return Err(relay_lost(url));
                }
                let state = *relay_state.borrow();
                match state {
                    RelayState::Failed => return Err(relay_lost(url)),
                    // The relay forgets the session across reconnects.
                    RelayState::Connected { generation } if generation > 1 => {
                        info!(generation, "relay reconnected, rejoining");
                        editor.join_session().await?;
                    }
                    _ => debug!(?state, "relay state changed"),
                }
            }
        }
    }
}

fn relay_lost(url: &str) -> CliError {
    CliError::ConnectionFailed {
        url: url.to_owned(),
        source: "relay connection failed".into(),
    }
}

fn count<K>(changes: &EntityChanges<K>, what: &str, color: bool) -> Option<String> {
    if changes.is_empty() {
        return None;
    }
    let parts: Vec<String> = [
        (ChangeKind::Added, changes.added.len()),
        (ChangeKind::Deleted, changes.deleted.len()),
        (ChangeKind::Modified, changes.modified.len()),
    ]
    .into_iter()
    .filter(|(_, n)| *n > 0)
    .map(|(kind, n)| format!("{n} {}", kind.paint(color)))
    .collect();
    Some(format!("{what}: {}", parts.join(", ")))
}

fn describe_changes(changes: &FactoryChanges, color: bool) -> String {
    let parts: Vec<String> = [
        count(&changes.machines, "machines", color),
        count(&changes.groups, "groups", color),
        count(&changes.pipes, "pipes", color),
        count(&changes.available, "available", color),
        count(&changes.missing, "missing", color),
    ]
    .into_iter()
    .flatten()
    .collect();
    if parts.is_empty() {
        "no entity changes".into()
    } else {
        parts.join("; ")
    }
}

fn describe(event: &EditorEvent, color: bool) -> String {
    match event {
        EditorEvent::Synced { revision } => format!("[r{revision}] synced"),
        EditorEvent::Patched { revision, changes } => {
            format!("[r{revision}] {}", describe_changes(changes, color))
        }
        EditorEvent::ResyncRequired { reason } => format!("resync required: {reason}"),
        EditorEvent::RequestRejected {
            responding_to,
            error,
            message,
            ..
        } => format!("{responding_to} rejected ({error}): {message}"),
        EditorEvent::CorrelationMiss { req_id } => format!("unexpected confirmation {req_id}"),
        EditorEvent::IdleTimeout { message } => format!("relay idle timeout: {message}"),
        EditorEvent::RequestTimedOut { req_id, kind } => {
            format!("{kind} {req_id} was never confirmed")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccpipes_api::{GroupId, MachineId};

    #[test]
    fn patched_event_summarizes_counts() {
        let changes = FactoryChanges {
            machines: EntityChanges {
                added: vec![MachineId::from("m3")],
                deleted: Vec::new(),
                modified: vec![MachineId::from("m1"), MachineId::from("m2")],
            },
            groups: EntityChanges {
                added: Vec::new(),
                deleted: vec![GroupId::from("g2")],
                modified: Vec::new(),
            },
            ..FactoryChanges::default()
        };
        assert_eq!(
            describe(&EditorEvent::Patched { revision: 4, changes }, false),
            "[r4] machines: 1 added, 2 modified; groups: 1 deleted"
        );
    }

    #[test]
    fn empty_patch_is_described() {
        let event = EditorEvent::Patched {
            revision: 2,
            changes: FactoryChanges::default(),
        };
        assert_eq!(describe(&event, false), "[r2] no entity changes");
    }
}
