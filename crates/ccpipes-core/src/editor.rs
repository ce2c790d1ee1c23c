// ── Editor facade ──
//
// Ties the factory store, the pending-request set, and the relay's channels
// together. Inbound messages are handled strictly one at a time; each store
// mutation completes before the next message is looked at.

use std::sync::Arc;

use ccpipes_api::{
    ConfirmationOutcome, GroupId, MachineId, MessageType, Patch, PipeEdits, PipeId, Request,
    RequestBody, RequestId, ServerMessage,
};
use chrono::Utc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::combine;
use crate::config::EditorConfig;
use crate::correlator::{Correlation, PendingRequest, PendingRequests};
use crate::diff::FactoryChanges;
use crate::error::CoreError;
use crate::pipes;
use crate::store::FactoryStore;
use crate::stream::FactoryStream;

const EVENT_CHANNEL_SIZE: usize = 256;

// ── SyncState ────────────────────────────────────────────────────

/// How far the local snapshot can be trusted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SyncState {
    /// No snapshot has been requested yet.
    #[default]
    Unsynced,
    /// A full snapshot is on its way; diffs are ignored until it lands.
    Syncing,
    Synced,
    /// A diff failed to apply. Only a fresh snapshot recovers from this.
    Desynced,
}

// ── Events ───────────────────────────────────────────────────────

/// Notifications broadcast to editor observers.
#[derive(Debug, Clone, PartialEq)]
pub enum EditorEvent {
    /// A full snapshot replaced the local one.
    Synced { revision: u64 },
    /// One or more diffs were applied.
    Patched {
        revision: u64,
        changes: FactoryChanges,
    },
    /// The snapshot diverged from the controller's.
    ResyncRequired { reason: String },
    RequestRejected {
        responding_to: MessageType,
        req_id: Option<RequestId>,
        error: String,
        message: String,
    },
    /// A confirmation named a request that isn't pending.
    CorrelationMiss { req_id: RequestId },
    IdleTimeout { message: String },
    /// A request went unconfirmed for longer than the request timeout.
    RequestTimedOut {
        req_id: RequestId,
        kind: MessageType,
    },
}

// ── Editor ───────────────────────────────────────────────────────

/// The main entry point for editor front ends.
///
/// Cheaply cloneable via `Arc<EditorInner>`. Outbound requests go to the
/// `mpsc` sender handed to [`new()`](Self::new), normally a
/// [`RelayHandle::sender()`](ccpipes_api::RelayHandle::sender); inbound
/// messages are fed through [`run()`](Self::run) or
/// [`handle_message()`](Self::handle_message).
#[derive(Clone)]
pub struct Editor {
    inner: Arc<EditorInner>,
}

struct EditorInner {
    config: EditorConfig,
    store: Arc<FactoryStore>,
    pending: PendingRequests,
    outbound: mpsc::Sender<Request>,
    event_tx: broadcast::Sender<Arc<EditorEvent>>,
    sync_state: watch::Sender<SyncState>,
    cancel: CancellationToken,
}

impl Editor {
    pub fn new(config: EditorConfig, outbound: mpsc::Sender<Request>) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let (sync_state, _) = watch::channel(SyncState::Unsynced);
        Self {
            inner: Arc::new(EditorInner {
                config,
                store: Arc::new(FactoryStore::new()),
                pending: PendingRequests::new(),
                outbound,
                event_tx,
                sync_state,
                cancel: CancellationToken::new(),
            }),
        }
    }

    pub fn config(&self) -> &EditorConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<FactoryStore> {
        &self.inner.store
    }

    pub fn pending(&self) -> &PendingRequests {
        &self.inner.pending
    }

    /// Subscribe to the factory snapshot.
    pub fn subscribe(&self) -> FactoryStream {
        self.inner.store.subscribe()
    }

    /// Subscribe to editor events.
    pub fn events(&self) -> broadcast::Receiver<Arc<EditorEvent>> {
        self.inner.event_tx.subscribe()
    }

    pub fn sync_state(&self) -> SyncState {
        *self.inner.sync_state.borrow()
    }

    pub fn watch_sync_state(&self) -> watch::Receiver<SyncState> {
        self.inner.sync_state.subscribe()
    }

    // ── Outbound ─────────────────────────────────────────────────

    /// Send one request, tracking it until it is confirmed.
    pub async fn submit(&self, body: RequestBody) -> Result<RequestId, CoreError> {
        self.send(Request::new(body)).await
    }

    /// Send several requests as a unit.
    ///
    /// A single request goes out bare; two or more are wrapped in one
    /// `BatchRequest`. Returns the ID of whatever was sent, or `None` when
    /// there was nothing to send.
    pub async fn submit_all(
        &self,
        bodies: Vec<RequestBody>,
    ) -> Result<Option<RequestId>, CoreError> {
        match Request::bundle(bodies) {
            Some(request) => self.send(request).await.map(Some),
            None => Ok(None),
        }
    }

    async fn send(&self, request: Request) -> Result<RequestId, CoreError> {
        let req_id = request.req_id.clone();
        debug!(req_id = %req_id, kind = %request.message_type(), "submitting request");

        // Registered first so a fast confirmation still finds it.
        self.inner.pending.register(&request);
        if self.inner.outbound.send(request).await.is_err() {
            self.inner.pending.resolve(&req_id);
            return Err(CoreError::Disconnected);
        }
        Ok(req_id)
    }

    /// Join the configured relay session, or fetch the factory directly when
    /// no session is configured.
    pub async fn join_session(&self) -> Result<RequestId, CoreError> {
        match &self.inner.config.session_id {
            Some(session_id) => {
                info!(session = %session_id, "joining session");
                self.set_sync_state(SyncState::Syncing);
                self.submit(RequestBody::SessionJoin {
                    session_id: session_id.clone(),
                })
                .await
            }
            None => self.request_factory().await,
        }
    }

    /// Ask for a full snapshot. Diffs are ignored until it arrives.
    pub async fn request_factory(&self) -> Result<RequestId, CoreError> {
        self.set_sync_state(SyncState::Syncing);
        self.submit(RequestBody::FactoryGet {}).await
    }

    /// Merge `sources` into `target` against the current snapshot.
    pub async fn combine_machines(
        &self,
        sources: &[MachineId],
        target: &MachineId,
    ) -> Result<Option<RequestId>, CoreError> {
        let state = self.inner.store.snapshot();
        let requests = combine::combine_machines(sources, target, &state.factory)?;
        self.submit_all(requests).await
    }

    pub async fn combine_groups(
        &self,
        sources: &[GroupId],
        target: &GroupId,
    ) -> Result<Option<RequestId>, CoreError> {
        let state = self.inner.store.snapshot();
        let requests = combine::combine_groups(sources, target, &state.factory)?;
        self.submit_all(requests).await
    }

    pub async fn connect_pipe(&self, from: GroupId, to: GroupId) -> Result<RequestId, CoreError> {
        self.submit(pipes::connect_pipe(from, to)).await
    }

    pub async fn delete_pipes(&self, ids: &[PipeId]) -> Result<Option<RequestId>, CoreError> {
        self.submit_all(pipes::delete_pipes(ids)).await
    }

    pub async fn reconnect_pipe(
        &self,
        id: PipeId,
        from: GroupId,
        to: GroupId,
    ) -> Result<RequestId, CoreError> {
        self.submit(pipes::reconnect_pipe(id, from, to)).await
    }

    pub async fn edit_pipes(
        &self,
        ids: &[PipeId],
        edits: &PipeEdits,
    ) -> Result<Option<RequestId>, CoreError> {
        let state = self.inner.store.snapshot();
        let requests = pipes::edit_pipes(ids, edits, &state.factory)?;
        self.submit_all(requests).await
    }

    // ── Inbound ──────────────────────────────────────────────────

    /// Process one inbound message to completion.
    pub async fn handle_message(&self, message: ServerMessage) -> Result<(), CoreError> {
        match message {
            ServerMessage::ConfirmationResponse(confirmation) => {
                // A miss answers some other editor's request: its diff or
                // snapshot still applies, its ack or rejection is not ours.
                let correlation = self.inner.pending.correlate(&confirmation);
                let matched = matches!(correlation, Correlation::Matched(_));
                let foreign = match correlation {
                    Correlation::Miss(req_id) => {
                        self.emit(EditorEvent::CorrelationMiss { req_id });
                        true
                    }
                    Correlation::Matched(_) | Correlation::Uncorrelated => false,
                };

                let responding_to = confirmation.responding_to;
                let req_id = confirmation.req_id.clone();
                match confirmation.into_outcome() {
                    ConfirmationOutcome::Snapshot(factory) => {
                        let state = self.inner.store.replace(factory);
                        self.set_sync_state(SyncState::Synced);
                        info!(revision = state.revision, "factory synced");
                        self.emit(EditorEvent::Synced {
                            revision: state.revision,
                        });
                        Ok(())
                    }
                    ConfirmationOutcome::Diff(diff) => self.apply_diff(&diff).await,
                    ConfirmationOutcome::Ack => {
                        if matched && responding_to == MessageType::SessionJoin {
                            debug!("session joined, fetching factory");
                            self.request_factory().await?;
                        }
                        Ok(())
                    }
                    ConfirmationOutcome::Rejected { error, message } if foreign => {
                        debug!(
                            responding_to = %responding_to,
                            req_id = ?req_id,
                            error = %error,
                            "ignoring rejection of another editor's request: {message}"
                        );
                        Ok(())
                    }
                    ConfirmationOutcome::Rejected { error, message } => {
                        warn!(
                            responding_to = %responding_to,
                            req_id = ?req_id,
                            error = %error,
                            "request rejected: {message}"
                        );
                        if matched
                            && matches!(
                                responding_to,
                                MessageType::SessionJoin | MessageType::FactoryGet
                            )
                            && self.sync_state() == SyncState::Syncing
                        {
                            self.set_sync_state(SyncState::Unsynced);
                        }
                        self.emit(EditorEvent::RequestRejected {
                            responding_to,
                            req_id: req_id.clone(),
                            error: error.clone(),
                            message: message.clone(),
                        });
                        Err(CoreError::RequestRejected {
                            responding_to,
                            req_id: req_id.map(|id| id.to_string()),
                            error,
                            message,
                        })
                    }
                }
            }
            ServerMessage::CcUpdatedFactory { diff } => self.apply_diff(&diff).await,
            ServerMessage::IdleTimeout { message } => {
                info!("relay idle timeout: {message}");
                self.emit(EditorEvent::IdleTimeout { message });
                Ok(())
            }
        }
    }

    async fn apply_diff(&self, diff: &[Patch]) -> Result<(), CoreError> {
        let state = self.sync_state();
        if state != SyncState::Synced {
            warn!(?state, patches = diff.len(), "dropping diff, snapshot not synced");
            return Ok(());
        }

        let before = self.inner.store.snapshot();
        match self.inner.store.apply_patches(diff) {
            Ok(after) => {
                if after.revision != before.revision {
                    debug!(revision = after.revision, patches = diff.len(), "diff applied");
                    self.emit(EditorEvent::Patched {
                        revision: after.revision,
                        changes: FactoryChanges::between(&before.factory, &after.factory),
                    });
                }
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "snapshot diverged from controller");
                self.set_sync_state(SyncState::Desynced);
                self.emit(EditorEvent::ResyncRequired {
                    reason: e.to_string(),
                });
                if self.inner.config.auto_resync {
                    if let Err(send_err) = self.request_factory().await {
                        warn!(error = %send_err, "resync request failed");
                    }
                }
                Err(e)
            }
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Drain `inbound` until it closes or [`shutdown()`](Self::shutdown) is
    /// called, pruning expired requests along the way.
    ///
    /// Per-message errors are logged and broadcast as events; they don't
    /// stop the loop.
    pub async fn run(&self, mut inbound: mpsc::Receiver<ServerMessage>) {
        let mut prune = tokio::time::interval(self.inner.config.prune_interval);
        prune.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = self.inner.cancel.cancelled() => break,
                message = inbound.recv() => {
                    let Some(message) = message else {
                        debug!("inbound channel closed");
                        break;
                    };
                    if let Err(e) = self.handle_message(message).await {
                        debug!(error = %e, "message handling failed");
                    }
                }
                _ = prune.tick() => {
                    self.prune_expired();
                }
            }
        }
        debug!("editor loop stopped");
    }

    /// Drop requests older than the request timeout.
    pub fn prune_expired(&self) -> Vec<PendingRequest> {
        let pruned = self
            .inner
            .pending
            .prune_older_than(self.inner.config.request_timeout, Utc::now());
        for pending in &pruned {
            self.emit(EditorEvent::RequestTimedOut {
                req_id: pending.req_id.clone(),
                kind: pending.kind,
            });
        }
        pruned
    }

    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    fn set_sync_state(&self, state: SyncState) {
        self.inner.sync_state.send_replace(state);
    }

    fn emit(&self, event: EditorEvent) {
        let _ = self.inner.event_tx.send(Arc::new(event));
    }
}
