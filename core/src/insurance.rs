//! Passenger policies, settlement, and payout withdrawal.
//!
//! Premiums, airline funding, and oracle fees all accrue to one treasury.
//! Settlement credits policies exactly once per flight. Withdrawal zeroes the
//! credits and debits the treasury before anything leaves the ledger.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use surety_types::{FlightKey, Identity, PolicyId, StatusCode, SuretyError, Wei};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub id: PolicyId,
    pub passenger: Identity,
    pub flight: FlightKey,
    pub amount_paid: Wei,
    pub payout_credit: Wei,
    pub settled: bool,
    pub withdrawn: bool,
}

impl Policy {
    #[must_use]
    pub fn is_withdrawable(&self) -> bool {
        !self.withdrawn && !self.payout_credit.is_zero()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct TransferError(pub String);

/// Moves funds out of the ledger to a recipient.
///
/// The sink is invoked only after the ledger has zeroed the credits being paid,
/// and it cannot reach the ledger while it runs.
pub trait PayoutSink {
    fn transfer(&mut self, recipient: &Identity, amount: Wei) -> Result<(), TransferError>;
}

impl<S: PayoutSink + ?Sized> PayoutSink for &mut S {
    fn transfer(&mut self, recipient: &Identity, amount: Wei) -> Result<(), TransferError> {
        (**self).transfer(recipient, amount)
    }
}

/// Funds reserved for one withdrawal, taken out of the ledger but not yet sent.
#[derive(Debug)]
pub(crate) struct PendingPayout {
    passenger: Identity,
    amount: Wei,
    credits: Vec<(usize, Wei)>,
}

impl PendingPayout {
    pub(crate) fn passenger(&self) -> &Identity {
        &self.passenger
    }

    pub(crate) fn amount(&self) -> Wei {
        self.amount
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsuranceLedger {
    policies: Vec<Policy>,
    settled_flights: BTreeSet<FlightKey>,
    treasury: Wei,
}

impl InsuranceLedger {
    #[must_use]
    pub fn from_records(
        policies: Vec<Policy>,
        settled_flights: Vec<FlightKey>,
        treasury: Wei,
    ) -> Self {
        Self {
            policies,
            settled_flights: settled_flights.into_iter().collect(),
            treasury,
        }
    }

    #[must_use]
    pub fn treasury(&self) -> Wei {
        self.treasury
    }

    #[must_use]
    pub fn policies(&self) -> &[Policy] {
        &self.policies
    }

    pub fn policies_of<'a>(&'a self, passenger: &'a Identity) -> impl Iterator<Item = &'a Policy> {
        self.policies.iter().filter(move |p| &p.passenger == passenger)
    }

    /// Outstanding, not yet withdrawn payout credit for `passenger`.
    #[must_use]
    pub fn credit_of(&self, passenger: &Identity) -> Wei {
        self.policies_of(passenger)
            .filter(|p| p.is_withdrawable())
            .fold(Wei::ZERO, |total, p| total.saturating_add(p.payout_credit))
    }

    #[must_use]
    pub fn is_settled(&self, flight: &FlightKey) -> bool {
        self.settled_flights.contains(flight)
    }

    pub fn settled_flights(&self) -> impl Iterator<Item = &FlightKey> {
        self.settled_flights.iter()
    }

    pub(crate) fn deposit(&mut self, amount: Wei) {
        self.treasury = self.treasury.saturating_add(amount);
    }

    /// The flight itself must already be known to exist.
    pub(crate) fn check_purchase(
        &self,
        flight: &FlightKey,
        amount: Wei,
        cap: Wei,
    ) -> Result<(), SuretyError> {
        if amount.is_zero() {
            return Err(SuretyError::ZeroAmount);
        }
        if amount > cap {
            return Err(SuretyError::AmountExceedsCap { amount, cap });
        }
        if self.is_settled(flight) {
            return Err(SuretyError::FlightSettled {
                flight: flight.clone(),
            });
        }
        Ok(())
    }

    pub(crate) fn apply_purchase(
        &mut self,
        passenger: Identity,
        flight: FlightKey,
        amount: Wei,
    ) -> PolicyId {
        let id = PolicyId::new(self.policies.len() as u64);
        self.policies.push(Policy {
            id,
            passenger,
            flight,
            amount_paid: amount,
            payout_credit: Wei::ZERO,
            settled: false,
            withdrawn: false,
        });
        self.deposit(amount);
        id
    }

    /// Credits every unsettled policy on `flight` and returns the credited ones.
    ///
    /// Only `LATE_AIRLINE` yields a nonzero credit. Policies are marked settled
    /// either way, so a later finalization for the same flight credits nothing.
    pub(crate) fn settle(
        &mut self,
        flight: &FlightKey,
        status: StatusCode,
        payout_percent: u32,
    ) -> Vec<&Policy> {
        self.settled_flights.insert(flight.clone());
        let mut credited = Vec::new();
        for policy in self
            .policies
            .iter_mut()
            .filter(|p| &p.flight == flight && !p.settled)
        {
            policy.settled = true;
            if status.is_airline_fault() {
                policy.payout_credit = policy.amount_paid.saturating_percent(payout_percent);
                credited.push(&*policy);
            }
        }
        credited
    }

    /// Zeroes the passenger's credits and debits the treasury.
    ///
    /// Returns `None` when there is nothing to pay.
    pub(crate) fn reserve_payout(
        &mut self,
        passenger: &Identity,
    ) -> Result<Option<PendingPayout>, SuretyError> {
        let credits: Vec<(usize, Wei)> = self
            .policies
            .iter()
            .enumerate()
            .filter(|(_, p)| &p.passenger == passenger && p.is_withdrawable())
            .map(|(slot, p)| (slot, p.payout_credit))
            .collect();
        let amount = credits
            .iter()
            .fold(Wei::ZERO, |total, (_, credit)| total.saturating_add(*credit));
        if amount.is_zero() {
            return Ok(None);
        }
        let remaining =
            self.treasury
                .checked_sub(amount)
                .ok_or(SuretyError::InsufficientFunds {
                    available: self.treasury,
                    required: amount,
                })?;

        for (slot, _) in &credits {
            let policy = &mut self.policies[*slot];
            policy.payout_credit = Wei::ZERO;
            policy.withdrawn = true;
        }
        self.treasury = remaining;
        Ok(Some(PendingPayout {
            passenger: passenger.clone(),
            amount,
            credits,
        }))
    }

    /// Undoes a reservation whose transfer failed.
    pub(crate) fn restore_payout(&mut self, pending: PendingPayout) {
        for (slot, credit) in pending.credits {
            let policy = &mut self.policies[slot];
            policy.payout_credit = credit;
            policy.withdrawn = false;
        }
        self.treasury = self.treasury.saturating_add(pending.amount);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAP: Wei = Wei::UNIT;

    fn id(raw: &str) -> Identity {
        Identity::new(raw).unwrap()
    }

    fn flight() -> FlightKey {
        FlightKey::new(id("air"), "GOL123")
    }

    fn buy(ledger: &mut InsuranceLedger, passenger: &str, amount: Wei) -> PolicyId {
        ledger.check_purchase(&flight(), amount, CAP).unwrap();
        ledger.apply_purchase(id(passenger), flight(), amount)
    }

    fn half() -> Wei {
        Wei::parse_units("0.5").unwrap()
    }

    #[test]
    fn purchase_bounds() {
        let ledger = InsuranceLedger::default();
        assert_eq!(
            ledger.check_purchase(&flight(), Wei::ZERO, CAP),
            Err(SuretyError::ZeroAmount)
        );
        assert!(ledger.check_purchase(&flight(), Wei::new(1), CAP).is_ok());
        assert!(ledger.check_purchase(&flight(), CAP, CAP).is_ok());
        assert_eq!(
            ledger.check_purchase(&flight(), Wei::new(CAP.as_u128() + 1), CAP),
            Err(SuretyError::AmountExceedsCap {
                amount: Wei::new(CAP.as_u128() + 1),
                cap: CAP
            })
        );
    }

    #[test]
    fn multiple_policies_per_passenger_are_tracked_separately() {
        let mut ledger = InsuranceLedger::default();
        let first = buy(&mut ledger, "p1", half());
        let second = buy(&mut ledger, "p1", CAP);
        assert_ne!(first, second);
        assert_eq!(ledger.policies_of(&id("p1")).count(), 2);
        assert_eq!(ledger.treasury(), Wei::parse_units("1.5").unwrap());
    }

    #[test]
    fn airline_fault_credits_one_and_a_half() {
        let mut ledger = InsuranceLedger::default();
        buy(&mut ledger, "p1", half());
        buy(&mut ledger, "p2", CAP);

        let credited = ledger.settle(&flight(), StatusCode::LateAirline, 150).len();
        assert_eq!(credited, 2);
        assert_eq!(ledger.credit_of(&id("p1")), Wei::parse_units("0.75").unwrap());
        assert_eq!(ledger.credit_of(&id("p2")), Wei::parse_units("1.5").unwrap());
    }

    #[test]
    fn other_statuses_credit_nothing() {
        for status in StatusCode::ALL.into_iter().filter(|s| !s.is_airline_fault()) {
            let mut ledger = InsuranceLedger::default();
            buy(&mut ledger, "p1", half());
            assert!(ledger.settle(&flight(), status, 150).is_empty());
            assert_eq!(ledger.credit_of(&id("p1")), Wei::ZERO);
            assert!(ledger.policies()[0].settled);
        }
    }

    #[test]
    fn settled_flight_refuses_purchases_and_second_settlement() {
        let mut ledger = InsuranceLedger::default();
        buy(&mut ledger, "p1", half());
        ledger.settle(&flight(), StatusCode::OnTime, 150);
        assert_eq!(
            ledger.check_purchase(&flight(), half(), CAP),
            Err(SuretyError::FlightSettled { flight: flight() })
        );
        assert!(
            ledger
                .settle(&flight(), StatusCode::LateAirline, 150)
                .is_empty()
        );
        assert_eq!(ledger.credit_of(&id("p1")), Wei::ZERO);
    }

    #[test]
    fn reserve_zeroes_before_returning_and_restore_undoes() {
        let mut ledger = InsuranceLedger::default();
        buy(&mut ledger, "p1", half());
        ledger.deposit(Wei::units(10));
        ledger.settle(&flight(), StatusCode::LateAirline, 150);
        let before = ledger.clone();

        let pending = ledger.reserve_payout(&id("p1")).unwrap().unwrap();
        assert_eq!(pending.amount(), Wei::parse_units("0.75").unwrap());
        assert_eq!(ledger.credit_of(&id("p1")), Wei::ZERO);
        assert!(ledger.policies()[0].withdrawn);
        assert!(ledger.reserve_payout(&id("p1")).unwrap().is_none());

        ledger.restore_payout(pending);
        assert_eq!(ledger, before);
    }

    #[test]
    fn reserve_fails_when_treasury_is_short() {
        let mut ledger = InsuranceLedger::default();
        buy(&mut ledger, "p1", CAP);
        ledger.settle(&flight(), StatusCode::LateAirline, 150);
        let before = ledger.clone();
        assert_eq!(
            ledger.reserve_payout(&id("p1")).unwrap_err(),
            SuretyError::InsufficientFunds {
                available: CAP,
                required: Wei::parse_units("1.5").unwrap()
            }
        );
        assert_eq!(ledger, before);
    }
}
