//! Vehicle pairing coordinator
//!
//! Owns the advertising lifecycle and at most one inbound companion
//! handshake. The vehicle auto-accepts any well-formed companion while
//! unpaired; once paired it is pinned to that companion's id and rejects
//! everyone else. The first successful connection commits the pairing:
//! both identities are re-derived with the transport's auth token as the
//! shared secret and persisted, so both sides recognize each other across
//! restarts.
//!
//! All mutation happens through the local intent methods and
//! [`VehicleCoordinator::handle_transport_event`]; the embedder must
//! serialize calls per coordinator instance (a single actor task or mutex
//! suffices). Observers consume the [`VehicleEvent`] stream returned by
//! [`VehicleCoordinator::new`].

use crate::commands::{self, Command, CommandHandler};
use crate::config::CoordinatorConfig;
use crate::events::VehicleEvent;
use crate::identity::{AdvertisingInfo, DiscovererInfo};
use crate::session::{ConnectionState, Session};
use crate::store::PairingStore;
use crate::transport::{Transport, TransportEvent};
use crate::Result;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Coordinator for the vehicle role
pub struct VehicleCoordinator<T: Transport> {
    transport: Arc<T>,
    store: PairingStore,
    config: CoordinatorConfig,

    identity: AdvertisingInfo,
    paired_companion: Option<DiscovererInfo>,

    advertising: bool,
    session: Option<Session<DiscovererInfo>>,
    command_handler: Option<Box<dyn CommandHandler>>,

    event_tx: mpsc::UnboundedSender<VehicleEvent>,
}

impl<T: Transport> VehicleCoordinator<T> {
    /// Create a coordinator, loading the persisted identity and trusted
    /// peer, or generating and saving a fresh identity on first run
    ///
    /// Returns the coordinator together with its event stream.
    pub fn new(
        transport: Arc<T>,
        store: PairingStore,
        config: CoordinatorConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<VehicleEvent>)> {
        let identity = match store.load_advertising_info()? {
            Some(identity) => identity,
            None => {
                let identity = AdvertisingInfo::generate();
                info!("generated new vehicle identity {}", identity.id);
                store.save_advertising_info(&identity)?;
                identity
            }
        };
        let paired_companion = store.load_discoverer_info()?;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let coordinator = Self {
            transport,
            store,
            config,
            identity,
            paired_companion,
            advertising: false,
            session: None,
            command_handler: None,
            event_tx,
        };
        Ok((coordinator, event_rx))
    }

    /// Install the collaborator that executes drive commands
    pub fn set_command_handler(&mut self, handler: Box<dyn CommandHandler>) {
        self.command_handler = Some(handler);
    }

    pub fn identity(&self) -> &AdvertisingInfo {
        &self.identity
    }

    pub fn paired_companion(&self) -> Option<&DiscovererInfo> {
        self.paired_companion.as_ref()
    }

    pub fn is_advertising(&self) -> bool {
        self.advertising
    }

    /// The active handshake/session, if any
    pub fn session(&self) -> Option<&Session<DiscovererInfo>> {
        self.session.as_ref()
    }

    /// Begin advertising the local identity
    ///
    /// No-op when already advertising or when the transport is not ready.
    /// The advertising flag is set before the transport call resolves, so a
    /// second call made while the first is in flight is caught by the
    /// already-advertising check; it is reverted if the transport reports
    /// failure.
    pub async fn start_advertising(&mut self) -> Result<()> {
        if self.advertising {
            debug!("already advertising");
            return Ok(());
        }
        if !self.transport.is_ready() {
            debug!("transport not ready; not advertising");
            return Ok(());
        }

        self.set_advertising(true);
        let name = self.identity.advertising_name();
        match self.transport.start_advertising(&name).await {
            Ok(()) => {
                info!("advertising as {}", name);
                Ok(())
            }
            Err(e) => {
                warn!("failed to start advertising: {}", e);
                self.set_advertising(false);
                Err(e)
            }
        }
    }

    /// Stop advertising; idempotent
    pub async fn stop_advertising(&mut self) {
        if self.advertising {
            self.set_advertising(false);
            // If the transport went away we have already lost advertising.
            if self.transport.is_ready() {
                self.transport.stop_advertising().await;
            }
        }
    }

    /// Swap the local identity, restarting advertising under the new name
    /// if currently advertising
    pub async fn set_identity(&mut self, identity: AdvertisingInfo) -> Result<()> {
        if self.identity == identity {
            return Ok(());
        }
        let was_advertising = self.advertising;
        self.stop_advertising().await;
        self.identity = identity;
        if was_advertising {
            self.start_advertising().await?;
        }
        Ok(())
    }

    /// Apply a transport callback
    pub async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::ConnectionInitiated {
                endpoint_id,
                remote_name,
                auth_token,
                ..
            } => {
                self.on_connection_initiated(&endpoint_id, &remote_name, &auth_token)
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
            } => self.on_payload_received(&endpoint_id, &payload).await,
            TransportEvent::EndpointFound { .. } | TransportEvent::EndpointLost { .. } => {
                debug!("vehicle ignores discovery events");
            }
        }
    }

    /// A companion started a handshake with us
    pub async fn on_connection_initiated(
        &mut self,
        endpoint_id: &str,
        remote_name: &str,
        auth_token: &str,
    ) {
        if self.session.is_some() {
            info!("handshake already in progress; rejecting {}", endpoint_id);
            self.reject_endpoint(endpoint_id).await;
            return;
        }

        let companion = match DiscovererInfo::parse(remote_name) {
            Some(companion) => companion,
            None => {
                info!(
                    "malformed companion name {:?} from {}; rejecting",
                    remote_name, endpoint_id
                );
                self.reject_endpoint(endpoint_id).await;
                return;
            }
        };

        if let Some(pinned) = &self.paired_companion {
            if pinned.id != companion.id {
                info!(
                    "companion {} does not match pinned peer {}; rejecting {}",
                    companion.id, pinned.id, endpoint_id
                );
                self.reject_endpoint(endpoint_id).await;
                return;
            }
        }

        let mut session = Session::new(
            endpoint_id,
            companion,
            ConnectionState::AuthAccepted,
            false,
        );
        session.set_auth_token(auth_token);
        self.session = Some(session);
        self.emit_session_state(endpoint_id, ConnectionState::AuthAccepted);

        if let Err(e) = self.transport.accept_connection(endpoint_id).await {
            // State is intentionally left as-is; on_tick cleans up a
            // handshake the transport never settles.
            warn!("accept_connection failed for {}: {}", endpoint_id, e);
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
            let (auth_token, companion) = {
                let session = self.session.as_mut().expect("session checked above");
                session.set_state(ConnectionState::Connected);
                (
                    session.auth_token().map(str::to_string),
                    session.remote().clone(),
                )
            };
            self.emit_session_state(endpoint_id, ConnectionState::Connected);
            info!("companion {} connected", companion.id);
            self.stop_advertising().await;

            if !self.identity.is_paired() {
                match auth_token {
                    Some(token) => self.commit_pairing(&token, companion),
                    None => warn!("no auth token recorded for {}; cannot pair", endpoint_id),
                }
            }
        } else {
            info!("handshake with {} failed", endpoint_id);
            self.clear_session();
            if let Err(e) = self.start_advertising().await {
                warn!("could not resume advertising: {}", e);
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

        info!("companion at {} disconnected", endpoint_id);
        self.clear_session();
        if let Err(e) = self.start_advertising().await {
            warn!("could not resume advertising: {}", e);
        }
    }

    /// A command payload arrived from the connected companion
    ///
    /// The first byte is decoded and dispatched to the command handler; the
    /// response is the echoed command byte on success, [`commands::ERROR`]
    /// otherwise. Empty payloads carry nothing and are ignored.
    pub async fn on_payload_received(&mut self, endpoint_id: &str, payload: &[u8]) {
        let connected = self
            .session
            .as_ref()
            .map(|s| s.endpoint_matches(endpoint_id) && s.is_connected())
            .unwrap_or(false);
        if !connected {
            debug!("discarding payload from {}", endpoint_id);
            return;
        }

        let byte = match commands::decode(payload) {
            Some(byte) => byte,
            None => {
                debug!("ignoring empty payload from {}", endpoint_id);
                return;
            }
        };

        let response = match Command::from_byte(byte) {
            Some(command) => match self.command_handler.as_mut() {
                Some(handler) => {
                    if handler.handle_command(command) {
                        byte
                    } else {
                        warn!("command {:?} failed to execute", command);
                        commands::ERROR
                    }
                }
                None => {
                    warn!("no command handler installed; rejecting {:?}", command);
                    commands::ERROR
                }
            },
            None => {
                warn!("unknown command byte {:#04x}", byte);
                commands::ERROR
            }
        };

        self.emit(VehicleEvent::CommandHandled {
            command: byte,
            response,
        });
        if let Err(e) = self.transport.send(endpoint_id, vec![response]).await {
            warn!("failed to send command response to {}: {}", endpoint_id, e);
        }
    }

    /// Explicit local teardown of the companion session
    ///
    /// Advertising is not resumed automatically after an explicit
    /// disconnect; the embedder decides when to become discoverable again.
    pub async fn disconnect_companion(&mut self) {
        if let Some(session) = &self.session {
            if session.is_connected() && self.transport.is_ready() {
                self.transport.disconnect(session.endpoint_id()).await;
            }
        }
        self.clear_session();
    }

    /// Forget the trusted companion and drop the own pairing token
    pub async fn reset_pairing(&mut self) -> Result<()> {
        self.disconnect_companion().await;

        self.paired_companion = None;
        self.store.clear_discoverer_info()?;

        let unpaired = self.identity.without_token();
        self.store.save_advertising_info(&unpaired)?;
        self.set_identity(unpaired).await?;

        info!("pairing reset; vehicle is open to any companion again");
        self.emit(VehicleEvent::PairingCleared);
        Ok(())
    }

    /// Periodic maintenance: clear a handshake the transport never settled
    /// and resume advertising
    pub async fn on_tick(&mut self) {
        let expired = self.session.as_ref().and_then(|s| {
            s.handshake_expired(self.config.handshake_timeout)
                .then(|| s.endpoint_id().to_string())
        });
        if let Some(endpoint_id) = expired {
            warn!("handshake with {} timed out; clearing", endpoint_id);
            self.clear_session();
            if let Err(e) = self.start_advertising().await {
                warn!("could not resume advertising: {}", e);
            }
        }
    }

    fn commit_pairing(&mut self, token: &str, companion: DiscovererInfo) {
        let identity = self.identity.with_token(token);
        let companion = companion.with_token(token);

        if let Err(e) = self.store.save_advertising_info(&identity) {
            warn!("failed to persist paired identity: {}", e);
        }
        if let Err(e) = self.store.save_discoverer_info(&companion) {
            warn!("failed to persist trusted companion: {}", e);
        }

        info!("pairing committed with companion {}", companion.id);
        self.identity = identity.clone();
        self.paired_companion = Some(companion.clone());
        self.emit(VehicleEvent::PairingCommitted {
            identity,
            companion,
        });
    }

    async fn reject_endpoint(&self, endpoint_id: &str) {
        if let Err(e) = self.transport.reject_connection(endpoint_id).await {
            warn!("reject_connection failed for {}: {}", endpoint_id, e);
        }
    }

    fn clear_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.set_state(ConnectionState::NotConnected);
            let endpoint_id = session.endpoint_id().to_string();
            self.emit_session_state(&endpoint_id, ConnectionState::NotConnected);
        }
    }

    fn set_advertising(&mut self, advertising: bool) {
        if self.advertising != advertising {
            self.advertising = advertising;
            self.emit(VehicleEvent::AdvertisingChanged { advertising });
        }
    }

    fn emit_session_state(&self, endpoint_id: &str, state: ConnectionState) {
        self.emit(VehicleEvent::SessionStateChanged {
            endpoint_id: endpoint_id.to_string(),
            state,
        });
    }

    fn emit(&self, event: VehicleEvent) {
        // Nobody listening is fine; events are advisory.
        let _ = self.event_tx.send(event);
    }
}
