//! Rejection reasons for ledger operations.
//!
//! Every variant means the operation was aborted before any state changed.
//! Callers may correct their input and resubmit.

use thiserror::Error;

use crate::{AirlineState, FlightKey, Identity, RequestKey, Wei};

/// The kind of entity a lookup failed to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Airline,
    Oracle,
    Flight,
    Request,
}

impl EntityKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            EntityKind::Airline => "airline",
            EntityKind::Oracle => "oracle",
            EntityKind::Flight => "flight",
            EntityKind::Request => "status request",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SuretyError {
    #[error("ledger is not operational")]
    NotOperational,
    #[error("{caller} is not authorized for this operation")]
    Unauthorized { caller: Identity },
    #[error("airline {caller} must be funded")]
    CallerNotFunded { caller: Identity },
    #[error("airline {airline} is {actual}, expected {expected}")]
    InvalidState {
        airline: Identity,
        expected: AirlineState,
        actual: AirlineState,
    },
    #[error("wrong fee: expected {expected}, got {actual}")]
    WrongFee { expected: Wei, actual: Wei },
    #[error("amount {amount} exceeds the insurance cap of {cap}")]
    AmountExceedsCap { amount: Wei, cap: Wei },
    #[error("purchase amount must be greater than zero")]
    ZeroAmount,
    #[error("flight code must not be empty")]
    EmptyFlightCode,
    #[error("unknown {}: {id}", .kind.as_str())]
    UnknownEntity { kind: EntityKind, id: String },
    #[error("status request {key} already exists")]
    AlreadyPending { key: RequestKey },
    #[error("{id} is already registered")]
    AlreadyRegistered { id: String },
    #[error("{caller} is not a registered oracle")]
    NotRegistered { caller: Identity },
    #[error("index {index} does not match this request for {caller}")]
    IndexMismatch { caller: Identity, index: u8 },
    #[error("flight {flight} has already been settled")]
    FlightSettled { flight: FlightKey },
    #[error("treasury holds {available}, payout requires {required}")]
    InsufficientFunds { available: Wei, required: Wei },
    #[error("transfer of {amount} to {recipient} failed: {reason}")]
    TransferFailed {
        recipient: Identity,
        amount: Wei,
        reason: String,
    },
}

impl SuretyError {
    pub(crate) fn unknown(kind: EntityKind, id: impl ToString) -> Self {
        SuretyError::UnknownEntity {
            kind,
            id: id.to_string(),
        }
    }

    #[must_use]
    pub fn unknown_airline(id: &Identity) -> Self {
        Self::unknown(EntityKind::Airline, id)
    }

    #[must_use]
    pub fn unknown_flight(key: &FlightKey) -> Self {
        Self::unknown(EntityKind::Flight, key)
    }

    #[must_use]
    pub fn unknown_request(key: &RequestKey) -> Self {
        Self::unknown(EntityKind::Request, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_entity_names_its_kind() {
        let key = FlightKey::new(Identity::new("0xa1").unwrap(), "GOL123");
        let err = SuretyError::unknown_flight(&key);
        assert_eq!(err.to_string(), "unknown flight: 0xa1/GOL123");
    }

    #[test]
    fn invalid_state_reports_both_states() {
        let err = SuretyError::InvalidState {
            airline: Identity::new("0xa2").unwrap(),
            expected: AirlineState::Registered,
            actual: AirlineState::Applied,
        };
        assert_eq!(err.to_string(), "airline 0xa2 is applied, expected registered");
    }
}
