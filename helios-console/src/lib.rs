//! Helios Console - operator console for a fleet of solar-inverter collection workers
//!
//! The console never controls a worker directly. It sends start/stop commands
//! that are only acknowledged, then re-reads the registry until what it shows
//! matches what the worker is doing:
//! - `inventory`: the registry's inverter list, replaced wholesale on each fetch
//! - `lifecycle`: start/stop with a busy indicator and reconciliation
//! - `session`: per-inverter detail view with the composite restart
//! - `reconcile`: fixed-delay or poll-until-settled re-reads

pub mod api;
pub mod config;
pub mod error;
pub mod inventory;
pub mod lifecycle;
pub mod models;
pub mod reconcile;
pub mod session;
pub mod state;

pub use api::{FleetApi, HttpFleetApi};
pub use config::ConsoleConfig;
pub use error::{ApiError, ConsoleError};
pub use inventory::{Confirm, FetchOutcome, InventoryStore, RemoveOutcome};
pub use lifecycle::{LifecycleController, LifecycleEvent, OperationHandle, OperationKind};
pub use models::{InverterConfig, InverterId, InverterRecord, InverterStatus};
pub use reconcile::{ReconcileOutcome, ReconcileStrategy, Reconciler};
pub use session::{DetailSession, RestartReport};
