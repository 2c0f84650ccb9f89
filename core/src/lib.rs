//! Ledger state machine for flight-delay insurance.
//!
//! Airlines are admitted by multi-party vote and fund themselves; oracles
//! register against a fee and report flight statuses; passengers buy capped
//! policies and withdraw payouts once a flight finalizes as delayed by the
//! airline. Everything is driven through [`FlightSurety`], which applies each
//! operation atomically and records its notifications in order.

mod airlines;
mod consensus;
mod gate;
mod index_source;
mod insurance;
mod notifications;
mod oracles;
mod snapshot;
mod surety;

pub use airlines::{Admission, Airline, AirlineRegistry, Flight};
pub use consensus::{FlightStatusConsensus, ReportOutcome, StatusRequest};
pub use gate::AccessGate;
pub use index_source::{HashIndexSource, IndexSeed, IndexSource, ScriptedIndexSource};
pub use insurance::{InsuranceLedger, PayoutSink, Policy, TransferError};
pub use notifications::{LogOrderError, Notification, NotificationLog, NotificationRecord};
pub use oracles::{Oracle, OracleRegistry};
pub use snapshot::{LedgerSnapshot, SNAPSHOT_VERSION, SnapshotError};
pub use surety::{FlightSurety, Genesis};
