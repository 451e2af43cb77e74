//! Robocar Pairing & Command Protocol
//!
//! This library implements the pairing and connection protocol between a
//! controlled vehicle and its companion controller over a short-range
//! wireless transport. Two peers discover each other, establish mutual
//! trust by exchanging the transport's handshake token, and thereafter
//! reconnect automatically and exclusively to one another. The radio
//! itself, the UI, and the actuator drivers live outside the crate behind
//! the [`Transport`], event-stream, and [`CommandHandler`] seams.
//!
//! ## Roles
//!
//! - [`VehicleCoordinator`]: advertises its identity, auto-accepts one
//!   companion handshake at a time, and pins itself to that companion once
//!   paired.
//! - [`CompanionCoordinator`]: discovers vehicles, tracks the visible
//!   endpoint set, drives one outbound handshake at a time, and
//!   auto-connects to the remembered vehicle.

pub mod commands;
pub mod companion;
pub mod config;
pub mod events;
pub mod identity;
pub mod session;
pub mod store;
pub mod transport;
pub mod vehicle;

mod error;

pub use commands::{Command, CommandHandler};
pub use companion::{CompanionCoordinator, VehicleEndpoint};
pub use config::{CoordinatorConfig, HANDSHAKE_TIMEOUT};
pub use error::{ProtocolError, Result};
pub use events::{CompanionEvent, VehicleEvent};
pub use identity::{AdvertisingInfo, DiscovererInfo, LedColor};
pub use session::{ConnectionState, Session};
pub use store::PairingStore;
pub use transport::{Transport, TransportEvent};
pub use vehicle::VehicleCoordinator;
