//! The ledger facade: every externally invoked operation enters here.
//!
//! # Atomicity
//!
//! Each mutating operation runs in two phases:
//!
//! 1. Guards: the ledger must be operational and the application contract
//!    authorized, then every domain precondition is checked against `&self`
//!    state. Nothing has been written yet, so a rejection leaves no trace.
//! 2. Apply: infallible mutations, followed by one commit that advances the
//!    sequence and appends the operation's notifications.
//!
//! `withdraw` is the only operation with an external effect. It zeroes credits
//! before calling the [`PayoutSink`] and rolls the reservation back if the sink
//! fails.
//!
//! All mutating methods take `&mut self`; sharing a ledger across threads
//! means wrapping it in a single exclusive lock.

use surety_types::{
    AirlineState, FlightKey, Identity, LedgerParams, PolicyId, RequestKey, Sequence, StatusCode,
    SuretyError, Wei,
};

use crate::airlines::{Admission, AirlineRegistry, Flight, NominationPlan};
use crate::consensus::{FlightStatusConsensus, ReportOutcome, StatusRequest};
use crate::gate::AccessGate;
use crate::index_source::{HashIndexSource, IndexSource};
use crate::insurance::{InsuranceLedger, PayoutSink, Policy};
use crate::notifications::{Notification, NotificationLog};
use crate::oracles::OracleRegistry;

/// Identities and salt fixed when a ledger is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Genesis {
    pub owner: Identity,
    pub first_airline: Identity,
    /// Application-layer contract that must be authorized before domain calls succeed.
    pub app_id: Identity,
    /// Mixed into every index derivation.
    pub salt: u64,
}

#[derive(Debug, Clone)]
pub struct FlightSurety<S = HashIndexSource> {
    pub(crate) params: LedgerParams,
    pub(crate) app_id: Identity,
    pub(crate) salt: u64,
    pub(crate) sequence: Sequence,
    pub(crate) gate: AccessGate,
    pub(crate) airlines: AirlineRegistry,
    pub(crate) oracles: OracleRegistry,
    pub(crate) consensus: FlightStatusConsensus,
    pub(crate) insurance: InsuranceLedger,
    pub(crate) log: NotificationLog,
    pub(crate) index_source: S,
}

impl<S: IndexSource> FlightSurety<S> {
    /// Creates an operational ledger owned by `genesis.owner`.
    ///
    /// The first airline applies and is admitted as `Registered` so it can fund
    /// itself. The application contract starts unauthorized.
    #[must_use]
    pub fn bootstrap(params: LedgerParams, genesis: Genesis, index_source: S) -> Self {
        let mut airlines = AirlineRegistry::default();
        airlines.seed(genesis.first_airline.clone());
        tracing::info!(
            owner = %genesis.owner,
            first_airline = %genesis.first_airline,
            app = %genesis.app_id,
            "Ledger bootstrapped"
        );
        Self {
            params,
            app_id: genesis.app_id,
            salt: genesis.salt,
            sequence: Sequence::default(),
            gate: AccessGate::new(genesis.owner),
            airlines,
            oracles: OracleRegistry::default(),
            consensus: FlightStatusConsensus::default(),
            insurance: InsuranceLedger::default(),
            log: NotificationLog::default(),
            index_source,
        }
    }

    fn guard(&self) -> Result<(), SuretyError> {
        self.gate.require_operational()?;
        self.gate.require_authorized(&self.app_id)
    }

    fn commit(&mut self, notifications: Vec<Notification>) -> Sequence {
        self.sequence = self.sequence.next();
        self.log.append(self.sequence, notifications);
        self.sequence
    }

    // ------------------------------------------------------------------
    // Access gate
    // ------------------------------------------------------------------

    #[must_use]
    pub fn is_operational(&self) -> bool {
        self.gate.is_operational()
    }

    pub fn set_operating_status(
        &mut self,
        caller: &Identity,
        operational: bool,
    ) -> Result<(), SuretyError> {
        if self.gate.set_operational(caller, operational)? {
            tracing::info!(operational, "Operating status changed");
            self.commit(vec![Notification::OperationalChanged { operational }]);
        }
        Ok(())
    }

    pub fn authorize_contract(&mut self, caller: &Identity, id: Identity) -> Result<(), SuretyError> {
        if self.gate.authorize(caller, id.clone())? {
            tracing::info!(contract = %id, "Contract authorized");
            self.commit(vec![Notification::ContractAuthorized { id }]);
        }
        Ok(())
    }

    pub fn deauthorize_contract(
        &mut self,
        caller: &Identity,
        id: &Identity,
    ) -> Result<(), SuretyError> {
        if self.gate.deauthorize(caller, id)? {
            tracing::info!(contract = %id, "Contract deauthorized");
            self.commit(vec![Notification::ContractDeauthorized { id: id.clone() }]);
        }
        Ok(())
    }

    #[must_use]
    pub fn is_contract_authorized(&self, id: &Identity) -> bool {
        self.gate.is_authorized(id)
    }

    // ------------------------------------------------------------------
    // Airlines and flights
    // ------------------------------------------------------------------

    /// Nominates `candidate`, or adds `caller`'s vote to an open nomination.
    pub fn register_airline(
        &mut self,
        caller: &Identity,
        candidate: &Identity,
    ) -> Result<Admission, SuretyError> {
        self.guard()?;
        let plan =
            self.airlines
                .check_nomination(caller, candidate, self.params.bootstrap_airlines())?;

        match plan {
            NominationPlan::NoOp(admission) => {
                tracing::debug!(%caller, %candidate, ?admission, "Nomination had no effect");
                Ok(admission)
            }
            NominationPlan::Register { votes } => {
                self.airlines.apply_nomination(caller, candidate, plan);
                tracing::info!(airline = %candidate, votes, "Airline registered");
                self.commit(vec![Notification::AirlineRegistered {
                    airline: candidate.clone(),
                    votes,
                }]);
                Ok(Admission::Registered)
            }
            NominationPlan::Vote { votes, required } => {
                self.airlines.apply_nomination(caller, candidate, plan);
                tracing::debug!(%caller, %candidate, votes, required, "Airline vote recorded");
                self.commit(vec![Notification::AirlineNominated {
                    candidate: candidate.clone(),
                    voter: caller.clone(),
                    votes,
                    required,
                }]);
                Ok(Admission::Pending { votes, required })
            }
        }
    }

    /// Pays the funding fee. `payment` must equal the fee exactly.
    pub fn fund(&mut self, caller: &Identity, payment: Wei) -> Result<(), SuretyError> {
        self.guard()?;
        self.airlines
            .check_funding(caller, payment, self.params.airline_funding_fee())?;

        self.airlines.apply_funding(caller);
        self.insurance.deposit(payment);
        tracing::info!(airline = %caller, %payment, "Airline funded");
        self.commit(vec![Notification::AirlineFunded {
            airline: caller.clone(),
            amount: payment,
        }]);
        Ok(())
    }

    pub fn airline_status(&self, airline: &Identity) -> Result<AirlineState, SuretyError> {
        self.airlines.status(airline)
    }

    pub fn register_flight(
        &mut self,
        caller: &Identity,
        code: &str,
    ) -> Result<FlightKey, SuretyError> {
        self.guard()?;
        let key = self.airlines.check_flight_registration(caller, code)?;

        self.airlines.apply_flight_registration(key.clone());
        tracing::info!(flight = %key, "Flight registered");
        self.commit(vec![Notification::FlightRegistered { flight: key.clone() }]);
        Ok(key)
    }

    #[must_use]
    pub fn flight(&self, key: &FlightKey) -> Option<&Flight> {
        self.airlines.flight(key)
    }

    // ------------------------------------------------------------------
    // Oracles and consensus
    // ------------------------------------------------------------------

    #[must_use]
    pub fn registration_fee(&self) -> Wei {
        self.params.oracle_registration_fee()
    }

    /// Registers `caller` as an oracle and returns its three assigned indices.
    pub fn register_oracle(&mut self, caller: &Identity, payment: Wei) -> Result<[u8; 3], SuretyError> {
        self.guard()?;
        self.oracles
            .check_registration(caller, payment, self.params.oracle_registration_fee())?;

        let indices = self.oracles.apply_registration(
            &mut self.index_source,
            self.sequence,
            self.salt,
            caller,
            self.params.index_space(),
        );
        self.insurance.deposit(payment);
        tracing::info!(oracle = %caller, ?indices, "Oracle registered");
        self.commit(vec![Notification::OracleRegistered {
            oracle: caller.clone(),
            indices,
        }]);
        Ok(indices)
    }

    pub fn oracle_indexes(&self, caller: &Identity) -> Result<[u8; 3], SuretyError> {
        self.oracles.indices_of(caller)
    }

    /// Opens a status request for `flight` departing at `timestamp`.
    ///
    /// Returns the index oracles must hold to answer it.
    pub fn fetch_flight_status(
        &mut self,
        caller: &Identity,
        flight: &FlightKey,
        timestamp: u64,
    ) -> Result<u8, SuretyError> {
        self.guard()?;
        self.airlines.require_flight(flight)?;
        let key = RequestKey::new(flight.clone(), timestamp);
        self.consensus.check_open(&key)?;

        let index = self.oracles.draw_index(
            &mut self.index_source,
            self.sequence,
            self.salt,
            caller,
            self.params.index_space(),
        );
        self.consensus.open(key.clone(), index, caller.clone());
        tracing::info!(request = %key, index, "Flight status requested");
        self.commit(vec![Notification::OracleRequest {
            index,
            request: key,
        }]);
        Ok(index)
    }

    pub fn submit_oracle_response(
        &mut self,
        oracle: &Identity,
        index: u8,
        flight: &FlightKey,
        timestamp: u64,
        status: StatusCode,
    ) -> Result<ReportOutcome, SuretyError> {
        self.guard()?;
        if !self.oracles.require_registered(oracle)?.holds(index) {
            return Err(SuretyError::IndexMismatch {
                caller: oracle.clone(),
                index,
            });
        }
        let key = RequestKey::new(flight.clone(), timestamp);
        let outcome = self.consensus.check_report(
            oracle,
            index,
            &key,
            status,
            self.params.oracle_quorum(),
        )?;

        if outcome == ReportOutcome::Ignored {
            tracing::debug!(%oracle, request = %key, %status, "Oracle report ignored");
            return Ok(outcome);
        }

        self.consensus.apply_report(oracle, &key, status, outcome);
        let mut notifications = vec![Notification::OracleReport {
            oracle: oracle.clone(),
            request: key.clone(),
            status,
        }];

        if let ReportOutcome::Finalized(final_status) = outcome {
            self.airlines
                .record_flight_status(flight, final_status, timestamp);
            notifications.push(Notification::FlightStatusFinalized {
                request: key.clone(),
                status: final_status,
            });
            let credited = self
                .insurance
                .settle(flight, final_status, self.params.payout_percent());
            notifications.extend(credited.into_iter().map(|policy| {
                Notification::InsureeCredited {
                    policy: policy.id,
                    passenger: policy.passenger.clone(),
                    credit: policy.payout_credit,
                }
            }));
            tracing::info!(request = %key, status = %final_status, "Flight status finalized");
        } else {
            tracing::debug!(%oracle, request = %key, %status, "Oracle report recorded");
        }

        self.commit(notifications);
        Ok(outcome)
    }

    #[must_use]
    pub fn request(&self, key: &RequestKey) -> Option<&StatusRequest> {
        self.consensus.request(key)
    }

    // ------------------------------------------------------------------
    // Insurance
    // ------------------------------------------------------------------

    pub fn buy(
        &mut self,
        passenger: &Identity,
        flight: &FlightKey,
        amount: Wei,
    ) -> Result<PolicyId, SuretyError> {
        self.guard()?;
        self.airlines.require_flight(flight)?;
        self.insurance
            .check_purchase(flight, amount, self.params.insurance_cap())?;

        let policy = self
            .insurance
            .apply_purchase(passenger.clone(), flight.clone(), amount);
        tracing::info!(%policy, %passenger, %flight, %amount, "Policy purchased");
        self.commit(vec![Notification::PolicyPurchased {
            policy,
            passenger: passenger.clone(),
            flight: flight.clone(),
            amount,
        }]);
        Ok(policy)
    }

    /// Pays out every outstanding credit of `passenger` through `sink`.
    ///
    /// Returns the amount transferred; zero when there was nothing to pay.
    pub fn withdraw(
        &mut self,
        passenger: &Identity,
        mut sink: impl PayoutSink,
    ) -> Result<Wei, SuretyError> {
        self.guard()?;
        let Some(pending) = self.insurance.reserve_payout(passenger)? else {
            tracing::debug!(%passenger, "Nothing to withdraw");
            return Ok(Wei::ZERO);
        };

        let amount = pending.amount();
        if let Err(err) = sink.transfer(pending.passenger(), amount) {
            self.insurance.restore_payout(pending);
            tracing::warn!(%passenger, %amount, "Payout transfer failed: {err}");
            return Err(SuretyError::TransferFailed {
                recipient: passenger.clone(),
                amount,
                reason: err.to_string(),
            });
        }

        tracing::info!(%passenger, %amount, "Payout withdrawn");
        self.commit(vec![Notification::PayoutWithdrawn {
            passenger: passenger.clone(),
            amount,
        }]);
        Ok(amount)
    }

    pub fn policies_of<'a>(&'a self, passenger: &'a Identity) -> impl Iterator<Item = &'a Policy> {
        self.insurance.policies_of(passenger)
    }

    #[must_use]
    pub fn credit_of(&self, passenger: &Identity) -> Wei {
        self.insurance.credit_of(passenger)
    }

    #[must_use]
    pub fn treasury(&self) -> Wei {
        self.insurance.treasury()
    }
}

impl<S> FlightSurety<S> {
    #[must_use]
    pub fn params(&self) -> &LedgerParams {
        &self.params
    }

    #[must_use]
    pub fn owner(&self) -> &Identity {
        self.gate.owner()
    }

    #[must_use]
    pub fn app_id(&self) -> &Identity {
        &self.app_id
    }

    /// Sequence of the most recently committed operation.
    #[must_use]
    pub fn sequence(&self) -> Sequence {
        self.sequence
    }

    #[must_use]
    pub fn notifications(&self) -> &NotificationLog {
        &self.log
    }

    #[must_use]
    pub fn gate(&self) -> &AccessGate {
        &self.gate
    }

    #[must_use]
    pub fn airlines(&self) -> &AirlineRegistry {
        &self.airlines
    }

    #[must_use]
    pub fn oracles(&self) -> &OracleRegistry {
        &self.oracles
    }

    #[must_use]
    pub fn consensus(&self) -> &FlightStatusConsensus {
        &self.consensus
    }

    #[must_use]
    pub fn insurance(&self) -> &InsuranceLedger {
        &self.insurance
    }
}
