// ── Editor runtime configuration ──
//
// Tuning for an `Editor` session. Never touches disk: `ccpipes-config`
// loads the user's settings and hands a finished `EditorConfig` in.

use std::time::Duration;

/// Configuration for one editor session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorConfig {
    /// Relay session to join. Without one the editor just fetches the factory.
    pub session_id: Option<String>,
    /// How long a request may go unconfirmed before it is dropped from
    /// the pending set.
    pub request_timeout: Duration,
    /// How often the pending set is swept for expired requests.
    pub prune_interval: Duration,
    /// Issue `FactoryGet` automatically after a patch fails to apply.
    pub auto_resync: bool,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            session_id: None,
            request_timeout: Duration::from_secs(30),
            prune_interval: Duration::from_secs(5),
            auto_resync: true,
        }
    }
}

impl EditorConfig {
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}
