// ── Request/response correlation ──
//
// Tracks requests sent to the controller until a confirmation names them.
// Correlation is bookkeeping only: a confirmation's diff is applied whether
// or not it matches anything here.

use std::time::Duration;

use ccpipes_api::{Confirmation, MessageType, Request, RequestBody, RequestId};
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;

/// A request awaiting confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub req_id: RequestId,
    pub kind: MessageType,
    pub issued_at: DateTime<Utc>,
    /// The batch this request was sent inside, if any.
    pub batch: Option<RequestId>,
}

/// Result of matching a confirmation against pending requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Correlation {
    Matched(PendingRequest),
    /// The confirmation names a request we aren't waiting for.
    Miss(RequestId),
    /// The confirmation carries no request ID.
    Uncorrelated,
}

/// Concurrent map of outstanding requests, keyed by request ID.
#[derive(Debug, Default)]
pub struct PendingRequests {
    entries: DashMap<RequestId, PendingRequest>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `request`, and each member if it is a batch.
    pub fn register(&self, request: &Request) {
        self.register_at(request, None, Utc::now());
    }

    fn register_at(&self, request: &Request, batch: Option<&RequestId>, now: DateTime<Utc>) {
        self.entries.insert(
            request.req_id.clone(),
            PendingRequest {
                req_id: request.req_id.clone(),
                kind: request.message_type(),
                issued_at: now,
                batch: batch.cloned(),
            },
        );
        if let RequestBody::Batch { requests } = &request.body {
            for member in requests {
                self.register_at(member, Some(&request.req_id), now);
            }
        }
    }

    /// Stop tracking `req_id`. Resolving a batch also resolves its members.
    pub fn resolve(&self, req_id: &RequestId) -> Option<PendingRequest> {
        let (_, pending) = self.entries.remove(req_id)?;
        if pending.kind == MessageType::BatchRequest {
            self.entries
                .retain(|_, entry| entry.batch.as_ref() != Some(req_id));
        }
        Some(pending)
    }

    /// Match a confirmation to the request it answers.
    pub fn correlate(&self, confirmation: &Confirmation) -> Correlation {
        let Some(req_id) = &confirmation.req_id else {
            return Correlation::Uncorrelated;
        };
        match self.resolve(req_id) {
            Some(pending) => {
                if pending.kind != confirmation.responding_to {
                    tracing::debug!(
                        req_id = %req_id,
                        sent = %pending.kind,
                        responding_to = %confirmation.responding_to,
                        "Confirmation type differs from the request it names"
                    );
                }
                Correlation::Matched(pending)
            }
            None => {
                tracing::debug!(
                    req_id = %req_id,
                    responding_to = %confirmation.responding_to,
                    "Confirmation for unknown request"
                );
                Correlation::Miss(req_id.clone())
            }
        }
    }

    /// Drop requests issued more than `max_age` before `now`, returning them.
    pub fn prune_older_than(&self, max_age: Duration, now: DateTime<Utc>) -> Vec<PendingRequest> {
        let max_age = TimeDelta::from_std(max_age).unwrap_or(TimeDelta::MAX);
        let expired: Vec<RequestId> = self
            .entries
            .iter()
            .filter(|entry| now.signed_duration_since(entry.issued_at) > max_age)
            .map(|entry| entry.key().clone())
            .collect();

        let mut pruned: Vec<PendingRequest> = expired
            .iter()
            .filter_map(|id| self.entries.remove(id).map(|(_, pending)| pending))
            .collect();
        pruned.sort_by(|a, b| a.issued_at.cmp(&b.issued_at).then_with(|| a.req_id.cmp(&b.req_id)));

        for pending in &pruned {
            tracing::warn!(
                req_id = %pending.req_id,
                kind = %pending.kind,
                issued_at = %pending.issued_at,
                "Request never confirmed"
            );
        }
        pruned
    }

    pub fn contains(&self, req_id: &RequestId) -> bool {
        self.entries.contains_key(req_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
