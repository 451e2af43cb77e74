//! Coordinator event streams
//!
//! Coordinators surface state changes to the UI collaborator as typed
//! events over a `tokio::sync::mpsc` channel. Raw transport errors never
//! cross this boundary; the UI's only recovery responsibility is to call
//! the start operations again.

use crate::companion::VehicleEndpoint;
use crate::identity::{AdvertisingInfo, DiscovererInfo};
use crate::session::ConnectionState;

/// Events emitted by the vehicle coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VehicleEvent {
    /// Advertising was switched on or off
    AdvertisingChanged { advertising: bool },

    /// The companion handshake/session changed state
    SessionStateChanged {
        endpoint_id: String,
        state: ConnectionState,
    },

    /// A first successful connection committed a pairing; both identities
    /// now carry the exchanged token and have been persisted
    PairingCommitted {
        identity: AdvertisingInfo,
        companion: DiscovererInfo,
    },

    /// The trusted-peer record was cleared by a local reset
    PairingCleared,

    /// A command byte was received and answered
    CommandHandled { command: u8, response: u8 },
}

/// Events emitted by the companion coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompanionEvent {
    /// Discovery was switched on or off
    DiscoveryChanged { discovering: bool },

    /// The set of visible vehicle endpoints changed
    EndpointsChanged { endpoints: Vec<VehicleEndpoint> },

    /// The vehicle handshake/session changed state
    SessionStateChanged {
        endpoint_id: String,
        state: ConnectionState,
    },

    /// A first successful connection committed a pairing
    PairingCommitted {
        identity: DiscovererInfo,
        vehicle: AdvertisingInfo,
    },

    /// The trusted-peer record was cleared by a local reset
    PairingCleared,

    /// The vehicle answered a command
    CommandResponse { response: u8 },
}

impl CompanionEvent {
    /// Check if this is an ERROR command response
    pub fn is_error_response(&self) -> bool {
        matches!(
            self,
            CompanionEvent::CommandResponse {
                response: crate::commands::ERROR
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands;

    #[test]
    fn test_error_response_detection() {
        let ok = CompanionEvent::CommandResponse { response: 0x01 };
        let err = CompanionEvent::CommandResponse {
            response: commands::ERROR,
        };
        assert!(!ok.is_error_response());
        assert!(err.is_error_response());
        assert!(!CompanionEvent::PairingCleared.is_error_response());
    }
}
