//! Flight-status requests and oracle report aggregation.
//!
//! A request finalizes at most once, to the first status code that collects
//! `quorum` reports from distinct oracles. Reports that arrive afterwards are
//! accepted and ignored.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use surety_types::{Identity, RequestKey, StatusCode, SuretyError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRequest {
    pub key: RequestKey,
    pub index: u8,
    pub requester: Identity,
    pub responses: BTreeMap<StatusCode, BTreeSet<Identity>>,
    pub final_status: Option<StatusCode>,
}

impl StatusRequest {
    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.final_status.is_some()
    }

    /// Number of distinct oracles that reported `status`.
    #[must_use]
    pub fn reports_for(&self, status: StatusCode) -> usize {
        self.responses.get(&status).map_or(0, BTreeSet::len)
    }
}

/// Effect of one oracle report on its request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    /// Counted; the status now has `reports` distinct oracles behind it.
    Recorded { reports: usize },
    /// This report completed the quorum.
    Finalized(StatusCode),
    /// Duplicate report, or the request was already finalized.
    Ignored,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlightStatusConsensus {
    requests: BTreeMap<RequestKey, StatusRequest>,
}

impl FlightStatusConsensus {
    #[must_use]
    pub fn from_records(requests: Vec<StatusRequest>) -> Self {
        Self {
            requests: requests.into_iter().map(|r| (r.key.clone(), r)).collect(),
        }
    }

    #[must_use]
    pub fn request(&self, key: &RequestKey) -> Option<&StatusRequest> {
        self.requests.get(key)
    }

    pub fn requests(&self) -> impl Iterator<Item = &StatusRequest> {
        self.requests.values()
    }

    pub(crate) fn check_open(&self, key: &RequestKey) -> Result<(), SuretyError> {
        if self.requests.contains_key(key) {
            return Err(SuretyError::AlreadyPending { key: key.clone() });
        }
        Ok(())
    }

    pub(crate) fn open(&mut self, key: RequestKey, index: u8, requester: Identity) {
        self.requests.insert(
            key.clone(),
            StatusRequest {
                key,
                index,
                requester,
                responses: BTreeMap::new(),
                final_status: None,
            },
        );
    }

    /// Validates a report without recording it.
    ///
    /// The caller has already confirmed `oracle` holds `index`.
    pub(crate) fn check_report(
        &self,
        oracle: &Identity,
        index: u8,
        key: &RequestKey,
        status: StatusCode,
        quorum: usize,
    ) -> Result<ReportOutcome, SuretyError> {
        let request = self
            .requests
            .get(key)
            .ok_or_else(|| SuretyError::unknown_request(key))?;
        if request.index != index {
            return Err(SuretyError::IndexMismatch {
                caller: oracle.clone(),
                index,
            });
        }
        if request.is_finalized()
            || request
                .responses
                .get(&status)
                .is_some_and(|oracles| oracles.contains(oracle))
        {
            return Ok(ReportOutcome::Ignored);
        }

        let reports = request.reports_for(status) + 1;
        if reports >= quorum {
            Ok(ReportOutcome::Finalized(status))
        } else {
            Ok(ReportOutcome::Recorded { reports })
        }
    }

    pub(crate) fn apply_report(
        &mut self,
        oracle: &Identity,
        key: &RequestKey,
        status: StatusCode,
        outcome: ReportOutcome,
    ) {
        if outcome == ReportOutcome::Ignored {
            return;
        }
        let Some(request) = self.requests.get_mut(key) else {
            return;
        };
        request
            .responses
            .entry(status)
            .or_default()
            .insert(oracle.clone());
        if let ReportOutcome::Finalized(status) = outcome {
            request.final_status = Some(status);
        }
    }
}
