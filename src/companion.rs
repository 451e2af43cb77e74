//! Companion discovery coordinator
//!
//! Owns the discovery lifecycle, the set of currently visible vehicle
//! endpoints, and at most one outbound handshake. A vehicle whose
//! advertised identity matches the locally remembered peer is auto-connected
//! without asking; anything else waits for the caller to pick an endpoint
//! and confirm the handshake. After an explicit local reject or disconnect,
//! auto-connect is suspended until the next successful connection so the
//! coordinator does not immediately chase the vehicle the user just walked
//! away from.
//!
//! Same serialization contract as the vehicle side: all mutation goes
//! through the intent methods and
//! [`CompanionCoordinator::handle_transport_event`], one mutual-exclusion
//! domain per instance.

use crate::commands::{self, Command};
use crate::config::CoordinatorConfig;
use crate::events::CompanionEvent;
use crate::identity::{AdvertisingInfo, DiscovererInfo};
use crate::session::{ConnectionState, Session};
use crate::store::PairingStore;
use crate::transport::{Transport, TransportEvent};
use crate::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// A discovered, not-yet-connected vehicle
///
/// Valid only until the endpoint is lost or discovery stops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VehicleEndpoint {
    /// Transport-assigned opaque handle
    pub endpoint_id: String,

    /// The vehicle's advertised identity
    pub info: AdvertisingInfo,

    /// Whether this vehicle is the locally remembered trusted peer
    pub is_remembered: bool,
}

/// Coordinator for the companion role
pub struct CompanionCoordinator<T: Transport> {
    transport: Arc<T>,
    store: PairingStore,
    config: CoordinatorConfig,

    identity: DiscovererInfo,
    remembered_vehicle: Option<AdvertisingInfo>,

    discovering: bool,
    endpoints: HashMap<String, VehicleEndpoint>,
    session: Option<Session<AdvertisingInfo>>,
    auto_connect_enabled: bool,

    event_tx: mpsc::UnboundedSender<CompanionEvent>,
}

impl<T: Transport> CompanionCoordinator<T> {
    /// Create a coordinator, loading the persisted identity and remembered
    /// vehicle, or generating and saving a fresh identity on first run
    ///
    /// Returns the coordinator together with its event stream.
    pub fn new(
        transport: Arc<T>,
        store: PairingStore,
        config: CoordinatorConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<CompanionEvent>)> {
        let identity = match store.load_discoverer_info()? {
            Some(identity) => identity,
            None => {
                let identity = DiscovererInfo::generate();
                info!("generated new companion identity {}", identity.id);
                store.save_discoverer_info(&identity)?;
                identity
            }
        };
        let remembered_vehicle = store.load_advertising_info()?;
        let auto_connect_enabled = config.auto_connect;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let coordinator = Self {
            transport,
            store,
            config,
            identity,
            remembered_vehicle,
            discovering: false,
            endpoints: HashMap::new(),
            session: None,
            auto_connect_enabled,
            event_tx,
        };
        Ok((coordinator, event_rx))
    }

    pub fn identity(&self) -> &DiscovererInfo {
        &self.identity
    }

    pub fn remembered_vehicle(&self) -> Option<&AdvertisingInfo> {
        self.remembered_vehicle.as_ref()
    }

    pub fn is_discovering(&self) -> bool {
        self.discovering
    }

    /// The active handshake/session, if any
    pub fn session(&self) -> Option<&Session<AdvertisingInfo>> {
        self.session.as_ref()
    }

    /// Currently visible vehicle endpoints, ordered by endpoint id
    pub fn endpoints(&self) -> Vec<VehicleEndpoint> {
        let mut endpoints: Vec<_> = self.endpoints.values().cloned().collect();
        endpoints.sort_by(|a, b| a.endpoint_id.cmp(&b.endpoint_id));
        endpoints
    }

    /// Begin scanning for vehicles
    ///
    /// Mirrors the vehicle's advertising lifecycle: the discovering flag is
    /// set before the transport call resolves and reverted on failure.
    pub async fn start_discovery(&mut self) -> Result<()> {
        if self.discovering {
            debug!("already discovering");
            return Ok(());
        }
        if !self.transport.is_ready() {
            debug!("transport not ready; not discovering");
            return Ok(());
        }

        self.set_discovering(true);
        match self.transport.start_discovery().await {
            Ok(()) => {
                info!("discovery started");
                Ok(())
            }
            Err(e) => {
                warn!("failed to start discovery: {}", e);
                self.set_discovering(false);
                Err(e)
            }
        }
    }

    /// Stop scanning and forget every discovered endpoint; idempotent
    pub async fn stop_discovery(&mut self) {
        if self.discovering {
            self.set_discovering(false);
            if self.transport.is_ready() {
                self.transport.stop_discovery().await;
            }
            self.endpoints.clear();
            self.emit_endpoints();
        }
    }

    /// Apply a transport callback
    pub async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::EndpointFound {
                endpoint_id,
                remote_name,
            } => self.on_endpoint_found(&endpoint_id, &remote_name).await,
            TransportEvent::EndpointLost { endpoint_id } => self.on_endpoint_lost(&endpoint_id),
            TransportEvent::ConnectionInitiated {
                endpoint_id,
                auth_token,
                ..
            } => {
                self.on_connection_initiated(&endpoint_id, &auth_token)
                    .await
            }
            TransportEvent::ConnectionResult {
                endpoint_id,
                success,
            } => self.on_connection_result(&endpoint_id, success).await,
            TransportEvent::Disconnected { endpoint_id } => {
                self.on_disconnected(&endpoint_id).await
            }
            TransportEvent::PayloadReceived {
                endpoint_id,
                payload,
            } => self.on_payload_received(&endpoint_id, &payload),
        }
    }

    /// A vehicle came into range
    pub async fn on_endpoint_found(&mut self, endpoint_id: &str, remote_name: &str) {
        let vehicle = match AdvertisingInfo::parse(remote_name) {
            Some(vehicle) => vehicle,
            None => {
                debug!(
                    "ignoring endpoint {} with malformed name {:?}",
                    endpoint_id, remote_name
                );
                return;
            }
        };

        let is_remembered = vehicle.is_paired()
            && self
                .remembered_vehicle
                .as_ref()
                .map(|remembered| remembered.id == vehicle.id)
                .unwrap_or(false);

        info!(
            "found vehicle {} at {} (remembered: {})",
            vehicle.id, endpoint_id, is_remembered
        );
        self.endpoints.insert(
            endpoint_id.to_string(),
            VehicleEndpoint {
                endpoint_id: endpoint_id.to_string(),
                info: vehicle,
                is_remembered,
            },
        );
        self.emit_endpoints();

        if is_remembered && self.auto_connect_enabled && self.session.is_none() {
            info!("auto-connecting to remembered vehicle at {}", endpoint_id);
            if let Err(e) = self.request_connection(endpoint_id).await {
                warn!("auto-connect to {} failed: {}", endpoint_id, e);
            }
        }
    }

    /// A previously found vehicle went out of range
    pub fn on_endpoint_lost(&mut self, endpoint_id: &str) {
        if self.endpoints.remove(endpoint_id).is_some() {
            debug!("lost endpoint {}", endpoint_id);
            self.emit_endpoints();
        }
    }

    /// Begin a handshake with a discovered vehicle
    ///
    /// No-op when a session already exists or the endpoint is unknown.
    /// Attempts against a remembered vehicle skip the interactive accept
    /// step once the transport hands back the auth token.
    pub async fn request_connection(&mut self, endpoint_id: &str) -> Result<()> {
        if self.session.is_some() {
            debug!("a handshake is already in progress; ignoring request");
            return Ok(());
        }
        let endpoint = match self.endpoints.get(endpoint_id) {
            Some(endpoint) => endpoint.clone(),
            None => {
                debug!("request for unknown endpoint {}", endpoint_id);
                return Ok(());
            }
        };

        self.session = Some(Session::new(
            endpoint_id,
            endpoint.info,
            ConnectionState::Requesting,
            endpoint.is_remembered,
        ));
        self.emit_session_state(endpoint_id, ConnectionState::Requesting);

        let name = self.identity.advertising_name();
        match self.transport.request_connection(&name, endpoint_id).await {
            Ok(()) => {
                debug!("connection requested to {}", endpoint_id);
                Ok(())
            }
            Err(e) => {
                warn!("request_connection to {} failed: {}", endpoint_id, e);
                self.clear_session();
                Err(e)
            }
        }
    }

    /// The transport handshake for a requested connection has begun
    pub async fn on_connection_initiated(&mut self, endpoint_id: &str, auth_token: &str) {
        let matches = self
            .session
            .as_ref()
            .map(|s| s.endpoint_matches(endpoint_id))
            .unwrap_or(false);
        if !matches {
            // We did not request this connection.
            info!("unsolicited handshake from {}; rejecting", endpoint_id);
            if let Err(e) = self.transport.reject_connection(endpoint_id).await {
                warn!("reject_connection failed for {}: {}", endpoint_id, e);
            }
            return;
        }

        let auto_connect = {
            let session = self.session.as_mut().expect("session checked above");
            session.set_auth_token(auth_token);
            session.is_auto_connect()
        };

        if auto_connect {
            self.accept_active_session().await;
        } else {
            self.session
                .as_mut()
                .expect("session checked above")
                .set_state(ConnectionState::Authenticating);
            self.emit_session_state(endpoint_id, ConnectionState::Authenticating);
        }
    }

    /// Accept the handshake awaiting a local decision
    ///
    /// Valid only while the session is `Authenticating`.
    pub async fn accept_connection(&mut self) {
        let authenticating = self
            .session
            .as_ref()
            .map(|s| s.state() == ConnectionState::Authenticating)
            .unwrap_or(false);
        if !authenticating {
            debug!("no handshake awaiting acceptance");
            return;
        }
        self.accept_active_session().await;
    }

    /// Reject the handshake awaiting a local decision
    ///
    /// Valid only while the session is `Authenticating`. The transport
    /// reports the outcome through a failed connection result, which clears
    /// the session and suspends auto-connect.
    pub async fn reject_connection(&mut self) {
        let endpoint_id = match &self.session {
            Some(s) if s.state() == ConnectionState::Authenticating => {
                s.endpoint_id().to_string()
            }
            _ => {
                debug!("no handshake awaiting rejection");
                return;
            }
        };

        self.session
            .as_mut()
            .expect("session checked above")
            .set_state(ConnectionState::AuthRejected);
        self.emit_session_state(&endpoint_id, ConnectionState::AuthRejected);

        if let Err(e) = self.transport.reject_connection(&endpoint_id).await {
            // State is intentionally left as-is; on_tick cleans up.
            warn!("reject_connection failed for {}: {}", endpoint_id, e);
        }
    }

    /// The handshake for `endpoint_id` settled
    pub async fn on_connection_result(&mut self, endpoint_id: &str, success: bool) {
        let matches = self
            .session
            .as_ref()
            .map(|s| s.endpoint_matches(endpoint_id))
            .unwrap_or(false);

        if !matches {
            if success {
                warn!(
                    "successful result for endpoint {} we are not tracking; disconnecting",
                    endpoint_id
                );
                self.transport.disconnect(endpoint_id).await;
            } else {
                debug!("discarding stale connection result for {}", endpoint_id);
            }
            return;
        }

        if success {
            let (auth_token, vehicle) = {
                let session = self.session.as_mut().expect("session checked above");
                session.set_state(ConnectionState::Connected);
                (
                    session.auth_token().map(str::to_string),
                    session.remote().clone(),
                )
            };
            self.emit_session_state(endpoint_id, ConnectionState::Connected);
            info!("connected to vehicle {}", vehicle.id);
            self.stop_discovery().await;

            if !self.identity.is_paired() {
                match auth_token {
                    Some(token) => self.commit_pairing(&token, vehicle),
                    None => warn!("no auth token recorded for {}; cannot pair", endpoint_id),
                }
            }
            // A fresh successful connection lifts any earlier suspension.
            self.auto_connect_enabled = true;
        } else {
            let suspend = {
                let session = self.session.as_ref().expect("session checked above");
                session.is_auto_connect() || session.state() == ConnectionState::AuthRejected
            };
            if suspend {
                debug!("suspending auto-connect after rejected handshake");
                self.auto_connect_enabled = false;
            }
            info!("handshake with {} failed", endpoint_id);
            self.clear_session();
            if let Err(e) = self.start_discovery().await {
                warn!("could not resume discovery: {}", e);
            }
        }
    }

    /// An established connection ended
    pub async fn on_disconnected(&mut self, endpoint_id: &str) {
        let matches = self
            .session
            .as_ref()
            .map(|s| s.endpoint_matches(endpoint_id))
            .unwrap_or(false);
        if !matches {
            debug!("discarding stale disconnect for {}", endpoint_id);
            return;
        }

        info!("vehicle at {} disconnected", endpoint_id);
        self.clear_session();
        if let Err(e) = self.start_discovery().await {
            warn!("could not resume discovery: {}", e);
        }
    }

    /// Explicit local teardown
    ///
    /// Suspends auto-connect (so the coordinator does not immediately
    /// reconnect to the vehicle the user just left) and resumes discovery.
    pub async fn disconnect(&mut self) {
        if let Some(session) = &self.session {
            if session.is_connected() {
                if self.transport.is_ready() {
                    self.transport.disconnect(session.endpoint_id()).await;
                }
                self.auto_connect_enabled = false;
            }
        }
        self.clear_session();
        if let Err(e) = self.start_discovery().await {
            warn!("could not resume discovery: {}", e);
        }
    }

    /// Forget the trusted vehicle and drop the own pairing token
    ///
    /// Endpoints that were remembered stop being remembered immediately; a
    /// re-discovered formerly-trusted vehicle no longer auto-connects.
    pub async fn reset(&mut self) -> Result<()> {
        self.disconnect().await;

        self.remembered_vehicle = None;
        self.store.clear_advertising_info()?;

        let identity = self.identity.without_token();
        self.store.save_discoverer_info(&identity)?;
        self.identity = identity;

        let mut changed = false;
        for endpoint in self.endpoints.values_mut() {
            if endpoint.is_remembered {
                endpoint.is_remembered = false;
                changed = true;
            }
        }
        if changed {
            self.emit_endpoints();
        }

        info!("pairing reset; no vehicle is remembered");
        self.emit(CompanionEvent::PairingCleared);
        Ok(())
    }

    /// Send a drive command over the connected session
    ///
    /// Silently dropped (logged) when no session is connected.
    pub async fn send_command(&self, command: Command) -> Result<()> {
        let endpoint_id = match &self.session {
            Some(session) if session.is_connected() => session.endpoint_id().to_string(),
            _ => {
                debug!("not connected; dropping command {:?}", command);
                return Ok(());
            }
        };
        self.transport
            .send(&endpoint_id, commands::encode(command))
            .await
    }

    /// A response payload arrived from the connected vehicle
    pub fn on_payload_received(&mut self, endpoint_id: &str, payload: &[u8]) {
        let connected = self
            .session
            .as_ref()
            .map(|s| s.endpoint_matches(endpoint_id) && s.is_connected())
            .unwrap_or(false);
        if !connected {
            debug!("discarding payload from {}", endpoint_id);
            return;
        }

        if let Some(response) = commands::decode(payload) {
            if response == commands::ERROR {
                debug!("vehicle reported command failure");
            }
            self.emit(CompanionEvent::CommandResponse { response });
        }
    }

    /// Periodic maintenance: clear a handshake the transport never settled
    /// and resume discovery
    pub async fn on_tick(&mut self) {
        let expired = self.session.as_ref().and_then(|s| {
            s.handshake_expired(self.config.handshake_timeout)
                .then(|| s.endpoint_id().to_string())
        });
        if let Some(endpoint_id) = expired {
            warn!("handshake with {} timed out; clearing", endpoint_id);
            self.clear_session();
            if let Err(e) = self.start_discovery().await {
                warn!("could not resume discovery: {}", e);
            }
        }
    }

    async fn accept_active_session(&mut self) {
        let endpoint_id = match &self.session {
            Some(session) => session.endpoint_id().to_string(),
            None => return,
        };

        self.session
            .as_mut()
            .expect("session checked above")
            .set_state(ConnectionState::AuthAccepted);
        self.emit_session_state(&endpoint_id, ConnectionState::AuthAccepted);

        if let Err(e) = self.transport.accept_connection(&endpoint_id).await {
            // State is intentionally left as-is; on_tick cleans up.
            warn!("accept_connection failed for {}: {}", endpoint_id, e);
        }
    }

    fn commit_pairing(&mut self, token: &str, vehicle: AdvertisingInfo) {
        let identity = self.identity.with_token(token);
        let vehicle = vehicle.with_token(token);

        if let Err(e) = self.store.save_discoverer_info(&identity) {
            warn!("failed to persist paired identity: {}", e);
        }
        if let Err(e) = self.store.save_advertising_info(&vehicle) {
            warn!("failed to persist trusted vehicle: {}", e);
        }

        info!("pairing committed with vehicle {}", vehicle.id);
        self.identity = identity.clone();
        self.remembered_vehicle = Some(vehicle.clone());
        self.emit(CompanionEvent::PairingCommitted { identity, vehicle });
    }

    fn clear_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.set_state(ConnectionState::NotConnected);
            let endpoint_id = session.endpoint_id().to_string();
            self.emit_session_state(&endpoint_id, ConnectionState::NotConnected);
        }
    }

    fn set_discovering(&mut self, discovering: bool) {
        if self.discovering != discovering {
            self.discovering = discovering;
            self.emit(CompanionEvent::DiscoveryChanged { discovering });
        }
    }

    fn emit_endpoints(&self) {
        self.emit(CompanionEvent::EndpointsChanged {
            endpoints: self.endpoints(),
        });
    }

    fn emit_session_state(&self, endpoint_id: &str, state: ConnectionState) {
        self.emit(CompanionEvent::SessionStateChanged {
            endpoint_id: endpoint_id.to_string(),
            state,
        });
    }

    fn emit(&self, event: CompanionEvent) {
        let _ = self.event_tx.send(event);
    }
}
