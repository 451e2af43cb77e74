//! Mock transport for testing
//!
//! Records every operation the coordinator issues and lets tests script
//! failures per operation. Events are not produced here; tests feed
//! [`TransportEvent`](super::TransportEvent)s to the coordinator directly,
//! which also makes it easy to exercise stale-callback orderings a real
//! transport would only produce under race conditions.

use super::Transport;
use crate::{ProtocolError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// A recorded transport operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    StartAdvertising { local_name: String },
    StopAdvertising,
    StartDiscovery,
    StopDiscovery,
    RequestConnection { local_name: String, endpoint_id: String },
    AcceptConnection { endpoint_id: String },
    RejectConnection { endpoint_id: String },
    Disconnect { endpoint_id: String },
    Send { endpoint_id: String, payload: Vec<u8> },
}

/// Which operations should report failure
#[derive(Debug, Default, Clone)]
pub struct ScriptedFailures {
    pub start_advertising: bool,
    pub start_discovery: bool,
    pub request_connection: bool,
    pub accept_connection: bool,
    pub reject_connection: bool,
    pub send: bool,
}

/// In-memory [`Transport`] double
#[derive(Default)]
pub struct MockTransport {
    calls: Mutex<Vec<TransportCall>>,
    failures: Mutex<ScriptedFailures>,
    not_ready: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the transport as not ready (radio down)
    pub fn set_ready(&self, ready: bool) {
        self.not_ready.store(!ready, Ordering::SeqCst);
    }

    /// Script which operations fail from now on
    pub fn set_failures(&self, failures: ScriptedFailures) {
        *self.failures.lock().unwrap() = failures;
    }

    /// Everything the coordinator asked for, in order
    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Drain the recorded operations
    pub fn take_calls(&self) -> Vec<TransportCall> {
        std::mem::take(&mut self.calls.lock().unwrap())
    }

    /// Payloads sent to `endpoint_id`, in order
    pub fn sent_payloads(&self, endpoint_id: &str) -> Vec<Vec<u8>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|call| match call {
                TransportCall::Send {
                    endpoint_id: id,
                    payload,
                } if id == endpoint_id => Some(payload.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: TransportCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn fail(&self, op: &str) -> ProtocolError {
        ProtocolError::Transport(format!("{op} failed (scripted)"))
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn start_advertising(&self, local_name: &str) -> Result<()> {
        self.record(TransportCall::StartAdvertising {
            local_name: local_name.to_string(),
        });
        if self.failures.lock().unwrap().start_advertising {
            return Err(self.fail("start_advertising"));
        }
        Ok(())
    }

    async fn stop_advertising(&self) {
        self.record(TransportCall::StopAdvertising);
    }

    async fn start_discovery(&self) -> Result<()> {
        self.record(TransportCall::StartDiscovery);
        if self.failures.lock().unwrap().start_discovery {
            return Err(self.fail("start_discovery"));
        }
        Ok(())
    }

    async fn stop_discovery(&self) {
        self.record(TransportCall::StopDiscovery);
    }

    async fn request_connection(&self, local_name: &str, endpoint_id: &str) -> Result<()> {
        self.record(TransportCall::RequestConnection {
            local_name: local_name.to_string(),
            endpoint_id: endpoint_id.to_string(),
        });
        if self.failures.lock().unwrap().request_connection {
            return Err(self.fail("request_connection"));
        }
        Ok(())
    }

    async fn accept_connection(&self, endpoint_id: &str) -> Result<()> {
        self.record(TransportCall::AcceptConnection {
            endpoint_id: endpoint_id.to_string(),
        });
        if self.failures.lock().unwrap().accept_connection {
            return Err(self.fail("accept_connection"));
        }
        Ok(())
    }

    async fn reject_connection(&self, endpoint_id: &str) -> Result<()> {
        self.record(TransportCall::RejectConnection {
            endpoint_id: endpoint_id.to_string(),
        });
        if self.failures.lock().unwrap().reject_connection {
            return Err(self.fail("reject_connection"));
        }
        Ok(())
    }

    async fn disconnect(&self, endpoint_id: &str) {
        self.record(TransportCall::Disconnect {
            endpoint_id: endpoint_id.to_string(),
        });
    }

    async fn send(&self, endpoint_id: &str, payload: Vec<u8>) -> Result<()> {
        self.record(TransportCall::Send {
            endpoint_id: endpoint_id.to_string(),
            payload,
        });
        if self.failures.lock().unwrap().send {
            return Err(self.fail("send"));
        }
        Ok(())
    }

    fn is_ready(&self) -> bool {
        !self.not_ready.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_calls_in_order() {
        let transport = MockTransport::new();
        transport.start_advertising("Robocar:1234-5678:RED").await.unwrap();
        transport.stop_advertising().await;

        assert_eq!(
            transport.calls(),
            vec![
                TransportCall::StartAdvertising {
                    local_name: "Robocar:1234-5678:RED".to_string()
                },
                TransportCall::StopAdvertising,
            ]
        );
    }

    #[tokio::test]
    async fn test_scripted_failure() {
        let transport = MockTransport::new();
        transport.set_failures(ScriptedFailures {
            start_discovery: true,
            ..Default::default()
        });

        assert!(transport.start_discovery().await.is_err());
        // The call is still recorded even when it fails.
        assert_eq!(transport.calls(), vec![TransportCall::StartDiscovery]);
    }

    #[tokio::test]
    async fn test_sent_payloads_filter() {
        let transport = MockTransport::new();
        transport.send("ep-1", vec![0x01]).await.unwrap();
        transport.send("ep-2", vec![0x02]).await.unwrap();
        transport.send("ep-1", vec![0x05]).await.unwrap();

        assert_eq!(transport.sent_payloads("ep-1"), vec![vec![0x01], vec![0x05]]);
    }

    #[test]
    fn test_readiness_flag() {
        let transport = MockTransport::new();
        assert!(transport.is_ready());
        transport.set_ready(false);
        assert!(!transport.is_ready());
    }
}
