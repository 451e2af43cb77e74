//! End-to-end pairing scenarios
//!
//! These tests drive a vehicle and a companion coordinator against mock
//! transports, relaying the callbacks each side would receive from the
//! radio layer by hand: the companion's connection request surfaces on the
//! vehicle as `on_connection_initiated`, the transport settles both sides
//! with `on_connection_result`, and so on. The auth token is what a real
//! transport would derive during the handshake and hand to both peers.

use robocar_protocol::transport::{MockTransport, TransportCall};
use robocar_protocol::{
    Command, CommandHandler, CompanionCoordinator, ConnectionState, CoordinatorConfig,
    PairingStore, VehicleCoordinator,
};
use std::sync::Arc;
use tempfile::TempDir;

const AUTH_TOKEN: &str = "ab12c";
const VEHICLE_EP: &str = "vehicle-ep";
const COMPANION_EP: &str = "companion-ep";

struct Rig {
    _vehicle_dir: TempDir,
    _companion_dir: TempDir,
    vehicle_transport: Arc<MockTransport>,
    companion_transport: Arc<MockTransport>,
    vehicle: VehicleCoordinator<MockTransport>,
    companion: CompanionCoordinator<MockTransport>,
}

fn rig() -> Rig {
    let vehicle_dir = TempDir::new().unwrap();
    let companion_dir = TempDir::new().unwrap();

    let vehicle_transport = Arc::new(MockTransport::new());
    let vehicle_store = PairingStore::new(vehicle_dir.path().join("pairing.json")).unwrap();
    let (vehicle, _events) = VehicleCoordinator::new(
        vehicle_transport.clone(),
        vehicle_store,
        CoordinatorConfig::default(),
    )
    .unwrap();

    let companion_transport = Arc::new(MockTransport::new());
    let companion_store = PairingStore::new(companion_dir.path().join("pairing.json")).unwrap();
    let (companion, _events) = CompanionCoordinator::new(
        companion_transport.clone(),
        companion_store,
        CoordinatorConfig::default(),
    )
    .unwrap();

    Rig {
        _vehicle_dir: vehicle_dir,
        _companion_dir: companion_dir,
        vehicle_transport,
        companion_transport,
        vehicle,
        companion,
    }
}

impl Rig {
    /// Run a full discovery + handshake between the two sides, with the
    /// companion confirming interactively when the vehicle is not
    /// remembered.
    async fn pair(&mut self) {
        self.vehicle.start_advertising().await.unwrap();
        self.companion.start_discovery().await.unwrap();

        // Discovery surfaces the vehicle's advertising name.
        let vehicle_name = self.vehicle.identity().advertising_name();
        self.companion
            .on_endpoint_found(VEHICLE_EP, &vehicle_name)
            .await;

        let auto = self
            .companion
            .session()
            .map(|s| s.is_auto_connect())
            .unwrap_or(false);
        if !auto {
            self.companion.request_connection(VEHICLE_EP).await.unwrap();
        }

        // The transport runs the handshake and hands both sides the token.
        let companion_name = self.companion.identity().advertising_name();
        self.vehicle
            .on_connection_initiated(COMPANION_EP, &companion_name, AUTH_TOKEN)
            .await;
        self.companion
            .on_connection_initiated(VEHICLE_EP, AUTH_TOKEN)
            .await;
        if self.companion.session().map(|s| s.state()) == Some(ConnectionState::Authenticating) {
            self.companion.accept_connection().await;
        }

        // Both sides accepted; the transport reports success to each.
        self.vehicle.on_connection_result(COMPANION_EP, true).await;
        self.companion.on_connection_result(VEHICLE_EP, true).await;
    }
}

struct AlwaysOk;

impl CommandHandler for AlwaysOk {
    fn handle_command(&mut self, _command: Command) -> bool {
        true
    }
}

#[tokio::test]
async fn test_first_pairing_commits_on_both_sides() {
    let mut rig = rig();
    let vehicle_id = rig.vehicle.identity().id.clone();
    rig.pair().await;

    // Both sides report CONNECTED.
    assert_eq!(
        rig.vehicle.session().unwrap().state(),
        ConnectionState::Connected
    );
    assert_eq!(
        rig.companion.session().unwrap().state(),
        ConnectionState::Connected
    );

    // Advertising and discovery are stopped.
    assert!(!rig.vehicle.is_advertising());
    assert!(!rig.companion.is_discovering());

    // Both persisted pair tokens equal the exchanged auth token.
    assert_eq!(
        rig.vehicle.identity().pair_token.as_deref(),
        Some(AUTH_TOKEN)
    );
    assert_eq!(
        rig.companion.identity().pair_token.as_deref(),
        Some(AUTH_TOKEN)
    );

    // The companion remembers the vehicle it paired with, and vice versa.
    assert_eq!(rig.companion.remembered_vehicle().unwrap().id, vehicle_id);
    assert_eq!(
        rig.vehicle.paired_companion().unwrap().id,
        rig.companion.identity().id
    );
}

#[tokio::test]
async fn test_scenario_scripted_identity() {
    // A fully scripted run with a known vehicle identity: companion
    // discovers, requests, vehicle auto-accepts while unpaired, transport
    // succeeds on both sides.
    let mut rig = rig();
    use robocar_protocol::{AdvertisingInfo, LedColor};
    let identity = AdvertisingInfo {
        id: "1234-5678".to_string(),
        led_sequence: vec![
            LedColor::Red,
            LedColor::Blue,
            LedColor::Green,
            LedColor::Yellow,
        ],
        pair_token: None,
    };
    rig.vehicle.set_identity(identity).await.unwrap();

    rig.pair().await;

    assert_eq!(
        rig.vehicle.identity().pair_token.as_deref(),
        Some(AUTH_TOKEN)
    );
    assert_eq!(rig.companion.remembered_vehicle().unwrap().id, "1234-5678");
}

#[tokio::test]
async fn test_reconnect_is_pinned_and_automatic() {
    let mut rig = rig();
    rig.pair().await;
    let vehicle_name = rig.vehicle.identity().advertising_name();
    let companion_name = rig.companion.identity().advertising_name();

    // The companion disconnects explicitly; the vehicle's transport reports
    // the disconnect and advertising resumes.
    rig.companion.disconnect().await;
    rig.vehicle.on_disconnected(COMPANION_EP).await;
    assert!(rig.vehicle.session().is_none());
    assert!(rig.vehicle.is_advertising());

    // A second companion with a different id is rejected outright.
    rig.vehicle_transport.take_calls();
    rig.vehicle
        .on_connection_initiated("intruder-ep", "RobocarCompanion:ffffffffffff:ff00f", "qq11q")
        .await;
    assert!(rig.vehicle.session().is_none());
    assert_eq!(
        rig.vehicle_transport.take_calls(),
        vec![TransportCall::RejectConnection {
            endpoint_id: "intruder-ep".to_string()
        }]
    );

    // The original companion reconnects: remembered on its side (but
    // auto-connect is suspended right after the explicit disconnect, so the
    // user re-picks the vehicle), auto-accepted on the vehicle's side.
    rig.companion
        .on_endpoint_found(VEHICLE_EP, &vehicle_name)
        .await;
    assert!(rig.companion.session().is_none());
    rig.companion.request_connection(VEHICLE_EP).await.unwrap();

    rig.vehicle
        .on_connection_initiated(COMPANION_EP, &companion_name, "xy99z")
        .await;
    assert_eq!(
        rig.vehicle.session().unwrap().state(),
        ConnectionState::AuthAccepted
    );
    rig.companion
        .on_connection_initiated(VEHICLE_EP, "xy99z")
        .await;
    rig.vehicle.on_connection_result(COMPANION_EP, true).await;
    rig.companion.on_connection_result(VEHICLE_EP, true).await;

    assert_eq!(
        rig.vehicle.session().unwrap().state(),
        ConnectionState::Connected
    );
    assert_eq!(
        rig.companion.session().unwrap().state(),
        ConnectionState::Connected
    );
    // The identities were already paired, so the original token survives.
    assert_eq!(
        rig.vehicle.identity().pair_token.as_deref(),
        Some(AUTH_TOKEN)
    );
}

#[tokio::test]
async fn test_command_round_trip() {
    let mut rig = rig();
    rig.vehicle.set_command_handler(Box::new(AlwaysOk));
    rig.pair().await;
    rig.vehicle_transport.take_calls();

    // Companion sends FORWARD; relay it to the vehicle.
    rig.companion.send_command(Command::Forward).await.unwrap();
    let sent = rig.companion_transport.sent_payloads(VEHICLE_EP);
    assert_eq!(sent, vec![vec![Command::Forward.as_byte()]]);

    rig.vehicle.on_payload_received(COMPANION_EP, &sent[0]).await;

    // The vehicle echoes the command byte; relay it back.
    let responses = rig.vehicle_transport.sent_payloads(COMPANION_EP);
    assert_eq!(responses, vec![vec![Command::Forward.as_byte()]]);
    rig.companion.on_payload_received(VEHICLE_EP, &responses[0]);
}

#[tokio::test]
async fn test_trust_survives_restart() {
    let vehicle_dir = TempDir::new().unwrap();
    let companion_dir = TempDir::new().unwrap();
    let vehicle_path = vehicle_dir.path().join("pairing.json");
    let companion_path = companion_dir.path().join("pairing.json");

    let vehicle_id;
    {
        let vehicle_transport = Arc::new(MockTransport::new());
        let companion_transport = Arc::new(MockTransport::new());
        let (mut vehicle, _ev) = VehicleCoordinator::new(
            vehicle_transport,
            PairingStore::new(&vehicle_path).unwrap(),
            CoordinatorConfig::default(),
        )
        .unwrap();
        let (mut companion, _ev) = CompanionCoordinator::new(
            companion_transport,
            PairingStore::new(&companion_path).unwrap(),
            CoordinatorConfig::default(),
        )
        .unwrap();
        vehicle_id = vehicle.identity().id.clone();

        let vehicle_name = vehicle.identity().advertising_name();
        companion.on_endpoint_found(VEHICLE_EP, &vehicle_name).await;
        companion.request_connection(VEHICLE_EP).await.unwrap();
        let companion_name = companion.identity().advertising_name();
        vehicle
            .on_connection_initiated(COMPANION_EP, &companion_name, AUTH_TOKEN)
            .await;
        companion.on_connection_initiated(VEHICLE_EP, AUTH_TOKEN).await;
        companion.accept_connection().await;
        vehicle.on_connection_result(COMPANION_EP, true).await;
        companion.on_connection_result(VEHICLE_EP, true).await;
    }

    // Fresh coordinators over the same stores: the trust is still there,
    // and the re-discovered vehicle is remembered and auto-connected.
    let vehicle_transport = Arc::new(MockTransport::new());
    let companion_transport = Arc::new(MockTransport::new());
    let (vehicle, _ev) = VehicleCoordinator::new(
        vehicle_transport,
        PairingStore::new(&vehicle_path).unwrap(),
        CoordinatorConfig::default(),
    )
    .unwrap();
    let (mut companion, _ev) = CompanionCoordinator::new(
        companion_transport,
        PairingStore::new(&companion_path).unwrap(),
        CoordinatorConfig::default(),
    )
    .unwrap();

    assert!(vehicle.identity().is_paired());
    assert_eq!(companion.remembered_vehicle().unwrap().id, vehicle_id);

    companion
        .on_endpoint_found(VEHICLE_EP, &vehicle.identity().advertising_name())
        .await;
    let session = companion.session().expect("auto-connect should fire");
    assert_eq!(session.state(), ConnectionState::Requesting);
    assert!(session.is_auto_connect());
}

#[tokio::test]
async fn test_companion_reset_forgets_the_vehicle() {
    let mut rig = rig();
    rig.pair().await;
    let vehicle_name = rig.vehicle.identity().advertising_name();

    rig.companion.reset().await.unwrap();
    rig.vehicle.on_disconnected(COMPANION_EP).await;

    // The formerly trusted vehicle is neither remembered nor auto-connected.
    rig.companion
        .on_endpoint_found(VEHICLE_EP, &vehicle_name)
        .await;
    let endpoints = rig.companion.endpoints();
    assert_eq!(endpoints.len(), 1);
    assert!(!endpoints[0].is_remembered);
    assert!(rig.companion.session().is_none());
}
