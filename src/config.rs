//! Coordinator configuration

use std::time::Duration;

/// Default bound on an unsettled handshake (request sent or accept issued
/// with no result from the transport yet).
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Tuning knobs shared by both coordinators
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// How long a handshake may sit unsettled before `on_tick` clears it
    /// and resumes advertising/discovery
    pub handshake_timeout: Duration,

    /// Whether the companion connects to a remembered vehicle without
    /// asking (initial value; an explicit reject or disconnect suspends it
    /// until the next successful connection)
    pub auto_connect: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: HANDSHAKE_TIMEOUT,
            auto_connect: true,
        }
    }
}
