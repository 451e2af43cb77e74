//! Handshake session state
//!
//! A [`Session`] tracks one connection attempt from first contact to
//! teardown. Each coordinator owns at most one session at a time; any
//! transport callback naming a different endpoint is stale and must be
//! discarded without touching the live session (accept/reject/send are
//! asynchronous, so callbacks can arrive long after local state has moved
//! on; the endpoint check is the cancellation mechanism).
//!
//! The session is generic over the remote identity payload: the vehicle
//! holds a `Session<DiscovererInfo>`, the companion a
//! `Session<AdvertisingInfo>`. Role policy (who auto-accepts, what gets
//! persisted on success) lives in the coordinators, not here.

use std::time::{Duration, Instant};
use tracing::debug;

/// Progress of a single connection handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No handshake in progress; initial and terminal state
    NotConnected,
    /// Outbound request sent, awaiting the transport handshake
    Requesting,
    /// Handshake callback received, awaiting a local accept/reject decision
    Authenticating,
    /// Locally accepted, awaiting transport confirmation
    AuthAccepted,
    /// Locally rejected, awaiting transport teardown
    AuthRejected,
    /// Session established; command traffic may flow
    Connected,
}

impl ConnectionState {
    /// Check if the session is usable for command traffic
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// Check if a handshake is still in flight (neither settled nor torn down)
    pub fn is_handshaking(&self) -> bool {
        matches!(
            self,
            ConnectionState::Requesting
                | ConnectionState::Authenticating
                | ConnectionState::AuthAccepted
                | ConnectionState::AuthRejected
        )
    }
}

/// One connection attempt, owned exclusively by its coordinator
#[derive(Debug)]
pub struct Session<I> {
    endpoint_id: String,
    state: ConnectionState,
    auth_token: Option<String>,
    remote: I,
    auto_connect: bool,
    started_at: Instant,
}

impl<I> Session<I> {
    /// Create a session for `endpoint_id` in the given initial state
    ///
    /// `auto_connect` marks companion-side attempts made against a
    /// remembered vehicle; those skip the interactive accept step.
    pub fn new(
        endpoint_id: impl Into<String>,
        remote: I,
        state: ConnectionState,
        auto_connect: bool,
    ) -> Self {
        Self {
            endpoint_id: endpoint_id.into(),
            state,
            auth_token: None,
            remote,
            auto_connect,
            started_at: Instant::now(),
        }
    }

    /// Check whether a transport callback refers to this session
    pub fn endpoint_matches(&self, endpoint_id: &str) -> bool {
        self.endpoint_id == endpoint_id
    }

    pub fn endpoint_id(&self) -> &str {
        &self.endpoint_id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn set_state(&mut self, new_state: ConnectionState) {
        if self.state != new_state {
            debug!(
                "session {}: {:?} -> {:?}",
                self.endpoint_id, self.state, new_state
            );
            self.state = new_state;
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    pub fn auth_token(&self) -> Option<&str> {
        self.auth_token.as_deref()
    }

    pub fn set_auth_token(&mut self, token: impl Into<String>) {
        self.auth_token = Some(token.into());
    }

    /// The remote peer's identity as seen during discovery/initiation
    pub fn remote(&self) -> &I {
        &self.remote
    }

    pub fn is_auto_connect(&self) -> bool {
        self.auto_connect
    }

    /// Check whether a still-unsettled handshake has outlived `timeout`
    ///
    /// The transport exposes no cancel API, so a peer that never calls back
    /// would otherwise strand the session forever.
    pub fn handshake_expired(&self, timeout: Duration) -> bool {
        self.state.is_handshaking() && self.started_at.elapsed() >= timeout
    }
}
