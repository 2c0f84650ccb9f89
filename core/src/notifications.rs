//! Append-only notification log consumed by off-ledger collaborators.
//!
//! Off-ledger responders (oracle daemons, dapp views) learn about ledger
//! activity only through this log. Records are stamped with the sequence of the
//! operation that produced them, so reading in order reproduces the order in
//! which operations were applied. A rejected operation appends nothing.

use std::slice;

use serde::{Deserialize, Serialize};
use surety_types::{FlightKey, Identity, PolicyId, RequestKey, Sequence, StatusCode, Wei};
use thiserror::Error;

/// A ledger event.
///
/// This is a closed enum - only the ledger constructs these variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    OperationalChanged {
        operational: bool,
    },
    ContractAuthorized {
        id: Identity,
    },
    ContractDeauthorized {
        id: Identity,
    },
    /// A vote was recorded but the candidate still lacks the quorum.
    AirlineNominated {
        candidate: Identity,
        voter: Identity,
        votes: usize,
        required: usize,
    },
    AirlineRegistered {
        airline: Identity,
        votes: usize,
    },
    AirlineFunded {
        airline: Identity,
        amount: Wei,
    },
    FlightRegistered {
        flight: FlightKey,
    },
    OracleRegistered {
        oracle: Identity,
        indices: [u8; 3],
    },
    /// Oracles holding `index` should answer for `request`.
    OracleRequest {
        index: u8,
        request: RequestKey,
    },
    OracleReport {
        oracle: Identity,
        request: RequestKey,
        status: StatusCode,
    },
    FlightStatusFinalized {
        request: RequestKey,
        status: StatusCode,
    },
    PolicyPurchased {
        policy: PolicyId,
        passenger: Identity,
        flight: FlightKey,
        amount: Wei,
    },
    InsureeCredited {
        policy: PolicyId,
        passenger: Identity,
        credit: Wei,
    },
    PayoutWithdrawn {
        passenger: Identity,
        amount: Wei,
    },
}

impl Notification {
    /// Short, stable name used in logs and CLI output.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::OperationalChanged { .. } => "operational_changed",
            Self::ContractAuthorized { .. } => "contract_authorized",
            Self::ContractDeauthorized { .. } => "contract_deauthorized",
            Self::AirlineNominated { .. } => "airline_nominated",
            Self::AirlineRegistered { .. } => "airline_registered",
            Self::AirlineFunded { .. } => "airline_funded",
            Self::FlightRegistered { .. } => "flight_registered",
            Self::OracleRegistered { .. } => "oracle_registered",
            Self::OracleRequest { .. } => "oracle_request",
            Self::OracleReport { .. } => "oracle_report",
            Self::FlightStatusFinalized { .. } => "flight_status_finalized",
            Self::PolicyPurchased { .. } => "policy_purchased",
            Self::InsureeCredited { .. } => "insuree_credited",
            Self::PayoutWithdrawn { .. } => "payout_withdrawn",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub sequence: Sequence,
    pub notification: Notification,
}

/// A persisted log whose records are not in commit order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("notification record {position} (sequence {sequence}) is out of order")]
pub struct LogOrderError {
    pub position: usize,
    pub sequence: Sequence,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationLog {
    records: Vec<NotificationRecord>,
}

impl NotificationLog {
    /// Rebuilds a log from persisted records.
    ///
    /// Records must be in non-decreasing sequence order, none newer than
    /// `latest` (the sequence of the last committed operation).
    pub fn from_records(
        records: Vec<NotificationRecord>,
        latest: Sequence,
    ) -> Result<Self, LogOrderError> {
        let mut previous = Sequence::default();
        for (position, record) in records.iter().enumerate() {
            if record.sequence < previous || record.sequence > latest {
                return Err(LogOrderError {
                    position,
                    sequence: record.sequence,
                });
            }
            previous = record.sequence;
        }
        Ok(Self { records })
    }

    /// Appends every notification of one committed operation under `sequence`.
    pub(crate) fn append(
        &mut self,
        sequence: Sequence,
        notifications: impl IntoIterator<Item = Notification>,
    ) {
        self.records
            .extend(notifications.into_iter().map(|notification| NotificationRecord {
                sequence,
                notification,
            }));
    }

    #[inline]
    #[must_use]
    pub fn records(&self) -> &[NotificationRecord] {
        &self.records
    }

    /// Records produced by operations after `cursor`.
    #[must_use]
    pub fn since(&self, cursor: Sequence) -> &[NotificationRecord] {
        let start = self.records.partition_point(|r| r.sequence <= cursor);
        &self.records[start..]
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn last(&self) -> Option<&NotificationRecord> {
        self.records.last()
    }

    #[inline]
    pub fn iter(&self) -> slice::Iter<'_, NotificationRecord> {
        self.records.iter()
    }
}

impl<'a> IntoIterator for &'a NotificationLog {
    type Item = &'a NotificationRecord;
    type IntoIter = slice::Iter<'a, NotificationRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toggled(operational: bool) -> Notification {
        Notification::OperationalChanged { operational }
    }

    #[test]
    fn since_returns_records_after_cursor() {
        let mut log = NotificationLog::default();
        log.append(Sequence::new(1), [toggled(false)]);
        log.append(Sequence::new(2), [toggled(true), toggled(false)]);
        log.append(Sequence::new(4), [toggled(true)]);

        assert_eq!(log.since(Sequence::default()).len(), 4);
        assert_eq!(log.since(Sequence::new(1)).len(), 3);
        assert_eq!(log.since(Sequence::new(3)).len(), 1);
        assert!(log.since(Sequence::new(4)).is_empty());
    }

    #[test]
    fn append_nothing_leaves_log_untouched() {
        let mut log = NotificationLog::default();
        log.append(Sequence::new(1), Vec::new());
        assert!(log.is_empty());
        assert!(log.last().is_none());
    }

    fn record(sequence: u64) -> NotificationRecord {
        NotificationRecord {
            sequence: Sequence::new(sequence),
            notification: toggled(true),
        }
    }

    #[test]
    fn from_records_accepts_commit_order() {
        let log = NotificationLog::from_records(
            vec![record(1), record(2), record(2), record(5)],
            Sequence::new(5),
        )
        .unwrap();
        assert_eq!(log.since(Sequence::new(2)).len(), 1);
    }

    #[test]
    fn from_records_rejects_reordered_or_future_records() {
        assert_eq!(
            NotificationLog::from_records(vec![record(1), record(3), record(2)], Sequence::new(3)),
            Err(LogOrderError {
                position: 2,
                sequence: Sequence::new(2)
            })
        );
        assert_eq!(
            NotificationLog::from_records(vec![record(1), record(4)], Sequence::new(3)),
            Err(LogOrderError {
                position: 1,
                sequence: Sequence::new(4)
            })
        );
    }

    #[test]
    fn notifications_serialize_with_kind_tag() {
        let json = serde_json::to_value(toggled(true)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "kind": "operational_changed", "operational": true })
        );
        assert_eq!(toggled(true).name(), "operational_changed");
    }
}
