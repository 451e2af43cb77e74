//! Transport abstraction
//!
//! The radio layer is an external collaborator. Whatever carries the bytes
//! (Bluetooth, Wi-Fi Direct, something else entirely) is wrapped behind the
//! [`Transport`] trait: a small set of fire-and-confirm operations plus a
//! stream of [`TransportEvent`] callbacks that the embedder feeds to its
//! coordinator.
//!
//! Every operation is asynchronous; the returned future resolving is the
//! transport's acknowledgement that the operation was started (or its
//! refusal). Outcomes of the handshake itself (who was found, whether a
//! connection went through, who hung up) arrive later as events, possibly
//! long after the local state has moved on. Coordinators therefore validate
//! the endpoint id of every event against their live session before acting
//! on it.

pub mod mock;

use crate::Result;
use async_trait::async_trait;

pub use mock::{MockTransport, TransportCall};

/// Capability set consumed from the radio layer
#[async_trait]
pub trait Transport: Send + Sync {
    /// Begin broadcasting `local_name` so discoverers can find this peer
    async fn start_advertising(&self, local_name: &str) -> Result<()>;

    /// Stop broadcasting
    async fn stop_advertising(&self);

    /// Begin scanning for advertising peers
    async fn start_discovery(&self) -> Result<()>;

    /// Stop scanning
    async fn stop_discovery(&self);

    /// Ask the peer behind `endpoint_id` to open a connection, introducing
    /// ourselves as `local_name`
    async fn request_connection(&self, local_name: &str, endpoint_id: &str) -> Result<()>;

    /// Accept a handshake previously surfaced via
    /// [`TransportEvent::ConnectionInitiated`]
    async fn accept_connection(&self, endpoint_id: &str) -> Result<()>;

    /// Reject such a handshake
    async fn reject_connection(&self, endpoint_id: &str) -> Result<()>;

    /// Tear down an established connection
    async fn disconnect(&self, endpoint_id: &str);

    /// Send a payload over an established connection
    async fn send(&self, endpoint_id: &str, payload: Vec<u8>) -> Result<()>;

    /// Whether the transport is usable at all (radio up, permissions granted)
    fn is_ready(&self) -> bool;
}

/// Callbacks pushed up from the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A peer advertising under `remote_name` came into range
    EndpointFound {
        endpoint_id: String,
        remote_name: String,
    },

    /// A previously found peer went out of range
    EndpointLost { endpoint_id: String },

    /// A connection handshake has begun; `auth_token` is the transport's
    /// handshake secret, reused by this protocol as the pairing token
    ConnectionInitiated {
        endpoint_id: String,
        remote_name: String,
        auth_token: String,
        is_incoming: bool,
    },

    /// The handshake for `endpoint_id` settled
    ConnectionResult { endpoint_id: String, success: bool },

    /// An established connection ended
    Disconnected { endpoint_id: String },

    /// Bytes arrived over an established connection
    PayloadReceived {
        endpoint_id: String,
        payload: Vec<u8>,
    },
}

impl TransportEvent {
    /// Endpoint this event refers to
    pub fn endpoint_id(&self) -> &str {
        match self {
            TransportEvent::EndpointFound { endpoint_id, .. } => endpoint_id,
            TransportEvent::EndpointLost { endpoint_id } => endpoint_id,
            TransportEvent::ConnectionInitiated { endpoint_id, .. } => endpoint_id,
            TransportEvent::ConnectionResult { endpoint_id, .. } => endpoint_id,
            TransportEvent::Disconnected { endpoint_id } => endpoint_id,
            TransportEvent::PayloadReceived { endpoint_id, .. } => endpoint_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_endpoint_id() {
        let event = TransportEvent::ConnectionResult {
            endpoint_id: "ep-9".to_string(),
            success: true,
        };
        assert_eq!(event.endpoint_id(), "ep-9");

        let event = TransportEvent::PayloadReceived {
            endpoint_id: "ep-3".to_string(),
            payload: vec![0x01],
        };
        assert_eq!(event.endpoint_id(), "ep-3");
    }
}
