//! Core domain types for the flight surety ledger.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the application.

mod error;
mod flight;
mod ids;
mod money;
mod params;

pub use error::{EntityKind, SuretyError};
pub use flight::{AirlineState, FlightKey, RequestKey, StatusCode, StatusCodeError};
pub use ids::{Identity, IdentityError, PolicyId, Sequence};
pub use money::{AmountParseError, Wei};
pub use params::{LedgerParams, ParamsError};
