//! Airline admission and the flight registry.
//!
//! Admission moves forward only: `Applied -> Registered -> Funded`. While fewer
//! than `bootstrap_airlines` airlines are admitted, one funded nominator is
//! enough. Past that, a candidate needs votes from at least half of the funded
//! airlines (rounded up).
//!
//! Every method that mutates takes already-validated input; the `check_*`
//! methods run first so a rejected call leaves the registry untouched.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use surety_types::{AirlineState, FlightKey, Identity, StatusCode, SuretyError, Wei};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Airline {
    pub address: Identity,
    pub state: AirlineState,
    pub votes: BTreeSet<Identity>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flight {
    pub key: FlightKey,
    pub status: StatusCode,
    /// Departure timestamp of the request that last finalized this flight.
    pub updated_at: Option<u64>,
}

/// Result of a nomination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The candidate is (now, or already was) admitted.
    Registered,
    /// The vote counted but the quorum is not reached yet.
    Pending { votes: usize, required: usize },
}

/// What a validated nomination will do when applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NominationPlan {
    /// Candidate already admitted, or voter already counted.
    NoOp(Admission),
    Register { votes: usize },
    Vote { votes: usize, required: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AirlineRegistry {
    airlines: BTreeMap<Identity, Airline>,
    flights: BTreeMap<FlightKey, Flight>,
}

impl AirlineRegistry {
    #[must_use]
    pub fn from_records(airlines: Vec<Airline>, flights: Vec<Flight>) -> Self {
        Self {
            airlines: airlines
                .into_iter()
                .map(|a| (a.address.clone(), a))
                .collect(),
            flights: flights.into_iter().map(|f| (f.key.clone(), f)).collect(),
        }
    }

    /// Seeds the bootstrap airline: it applies and is admitted in one step,
    /// since no funded airline exists yet to vote for it.
    pub(crate) fn seed(&mut self, address: Identity) {
        self.airlines.insert(
            address.clone(),
            Airline {
                address,
                state: AirlineState::Registered,
                votes: BTreeSet::new(),
            },
        );
    }

    #[must_use]
    pub fn airline(&self, address: &Identity) -> Option<&Airline> {
        self.airlines.get(address)
    }

    pub fn status(&self, address: &Identity) -> Result<AirlineState, SuretyError> {
        self.airline(address)
            .map(|a| a.state)
            .ok_or_else(|| SuretyError::unknown_airline(address))
    }

    pub fn airlines(&self) -> impl Iterator<Item = &Airline> {
        self.airlines.values()
    }

    #[must_use]
    pub fn admitted_count(&self) -> usize {
        self.airlines
            .values()
            .filter(|a| a.state.is_admitted())
            .count()
    }

    #[must_use]
    pub fn funded_count(&self) -> usize {
        self.airlines
            .values()
            .filter(|a| a.state == AirlineState::Funded)
            .count()
    }

    pub fn require_funded(&self, caller: &Identity) -> Result<(), SuretyError> {
        match self.airline(caller) {
            Some(airline) if airline.state == AirlineState::Funded => Ok(()),
            _ => Err(SuretyError::CallerNotFunded {
                caller: caller.clone(),
            }),
        }
    }

    pub(crate) fn check_nomination(
        &self,
        caller: &Identity,
        candidate: &Identity,
        bootstrap_airlines: usize,
    ) -> Result<NominationPlan, SuretyError> {
        self.require_funded(caller)?;

        let existing = self.airline(candidate);
        if existing.is_some_and(|a| a.state.is_admitted()) {
            return Ok(NominationPlan::NoOp(Admission::Registered));
        }

        let prior_votes = existing.map_or(0, |a| a.votes.len());
        if self.admitted_count() < bootstrap_airlines {
            return Ok(NominationPlan::Register {
                votes: prior_votes + 1,
            });
        }

        let required = self.funded_count().div_ceil(2);
        if existing.is_some_and(|a| a.votes.contains(caller)) {
            return Ok(NominationPlan::NoOp(Admission::Pending {
                votes: prior_votes,
                required,
            }));
        }

        let votes = prior_votes + 1;
        if votes >= required {
            Ok(NominationPlan::Register { votes })
        } else {
            Ok(NominationPlan::Vote { votes, required })
        }
    }

    pub(crate) fn apply_nomination(
        &mut self,
        caller: &Identity,
        candidate: &Identity,
        plan: NominationPlan,
    ) {
        let state = match plan {
            NominationPlan::NoOp(_) => return,
            NominationPlan::Register { .. } => AirlineState::Registered,
            NominationPlan::Vote { .. } => AirlineState::Applied,
        };
        let airline = self
            .airlines
            .entry(candidate.clone())
            .or_insert_with(|| Airline {
                address: candidate.clone(),
                state: AirlineState::Applied,
                votes: BTreeSet::new(),
            });
        airline.votes.insert(caller.clone());
        airline.state = state;
    }

    pub(crate) fn check_funding(
        &self,
        caller: &Identity,
        payment: Wei,
        required_fee: Wei,
    ) -> Result<(), SuretyError> {
        let airline = self
            .airline(caller)
            .ok_or_else(|| SuretyError::unknown_airline(caller))?;
        if airline.state != AirlineState::Registered {
            return Err(SuretyError::InvalidState {
                airline: caller.clone(),
                expected: AirlineState::Registered,
                actual: airline.state,
            });
        }
        if payment != required_fee {
            return Err(SuretyError::WrongFee {
                expected: required_fee,
                actual: payment,
            });
        }
        Ok(())
    }

    pub(crate) fn apply_funding(&mut self, caller: &Identity) {
        if let Some(airline) = self.airlines.get_mut(caller) {
            airline.state = AirlineState::Funded;
        }
    }

    #[must_use]
    pub fn flight(&self, key: &FlightKey) -> Option<&Flight> {
        self.flights.get(key)
    }

    pub fn flights(&self) -> impl Iterator<Item = &Flight> {
        self.flights.values()
    }

    pub fn require_flight(&self, key: &FlightKey) -> Result<&Flight, SuretyError> {
        self.flight(key)
            .ok_or_else(|| SuretyError::unknown_flight(key))
    }

    pub(crate) fn check_flight_registration(
        &self,
        caller: &Identity,
        code: &str,
    ) -> Result<FlightKey, SuretyError> {
        self.require_funded(caller)?;
        let code = code.trim();
        if code.is_empty() {
            return Err(SuretyError::EmptyFlightCode);
        }
        let key = FlightKey::new(caller.clone(), code);
        if self.flights.contains_key(&key) {
            return Err(SuretyError::AlreadyRegistered {
                id: key.to_string(),
            });
        }
        Ok(key)
    }

    pub(crate) fn apply_flight_registration(&mut self, key: FlightKey) {
        self.flights.insert(
            key.clone(),
            Flight {
                key,
                status: StatusCode::Unknown,
                updated_at: None,
            },
        );
    }

    pub(crate) fn record_flight_status(&mut self, key: &FlightKey, status: StatusCode, at: u64) {
        if let Some(flight) = self.flights.get_mut(key) {
            flight.status = status;
            flight.updated_at = Some(at);
        }
    }
}
