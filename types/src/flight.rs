//! Flight, airline, and status-code vocabulary.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Identity;

/// Admission state of an airline.
///
/// Transitions only move forward: `Applied -> Registered -> Funded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AirlineState {
    Applied,
    Registered,
    Funded,
}

impl AirlineState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            AirlineState::Applied => "applied",
            AirlineState::Registered => "registered",
            AirlineState::Funded => "funded",
        }
    }

    /// Counts toward the multi-party admission threshold.
    #[must_use]
    pub const fn is_admitted(self) -> bool {
        matches!(self, AirlineState::Registered | AirlineState::Funded)
    }
}

impl fmt::Display for AirlineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown status code {0}")]
pub struct StatusCodeError(pub u8);

/// Real-world outcome of a flight as reported by oracles.
///
/// The numeric values are part of the oracle wire contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum StatusCode {
    #[default]
    Unknown,
    OnTime,
    LateAirline,
    LateWeather,
    LateTechnical,
    LateOther,
}

impl StatusCode {
    pub const ALL: [StatusCode; 6] = [
        StatusCode::Unknown,
        StatusCode::OnTime,
        StatusCode::LateAirline,
        StatusCode::LateWeather,
        StatusCode::LateTechnical,
        StatusCode::LateOther,
    ];

    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            StatusCode::Unknown => 0,
            StatusCode::OnTime => 10,
            StatusCode::LateAirline => 20,
            StatusCode::LateWeather => 30,
            StatusCode::LateTechnical => 40,
            StatusCode::LateOther => 50,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            StatusCode::Unknown => "unknown",
            StatusCode::OnTime => "on_time",
            StatusCode::LateAirline => "late_airline",
            StatusCode::LateWeather => "late_weather",
            StatusCode::LateTechnical => "late_technical",
            StatusCode::LateOther => "late_other",
        }
    }

    /// Only a delay caused by the airline entitles passengers to a payout.
    #[must_use]
    pub const fn is_airline_fault(self) -> bool {
        matches!(self, StatusCode::LateAirline)
    }

    /// Accepts either the numeric code or the snake_case name.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if let Ok(code) = raw.parse::<u8>() {
            return Self::try_from(code).ok();
        }
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(raw))
    }
}

impl TryFrom<u8> for StatusCode {
    type Error = StatusCodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|status| status.code() == value)
            .ok_or(StatusCodeError(value))
    }
}

impl From<StatusCode> for u8 {
    fn from(value: StatusCode) -> Self {
        value.code()
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.as_str(), self.code())
    }
}

/// A registered flight: the operating airline plus its flight code.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FlightKey {
    pub airline: Identity,
    pub code: String,
}

impl FlightKey {
    #[must_use]
    pub fn new(airline: Identity, code: impl Into<String>) -> Self {
        Self {
            airline,
            code: code.into(),
        }
    }
}

impl fmt::Display for FlightKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.airline, self.code)
    }
}

/// Identifies one flight-status request: a flight at a given departure timestamp.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestKey {
    pub flight: FlightKey,
    pub timestamp: u64,
}

impl RequestKey {
    #[must_use]
    pub fn new(flight: FlightKey, timestamp: u64) -> Self {
        Self { flight, timestamp }
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.flight, self.timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_oracle_contract() {
        let codes: Vec<u8> = StatusCode::ALL.iter().map(|s| s.code()).collect();
        assert_eq!(codes, [0, 10, 20, 30, 40, 50]);
    }

    #[test]
    fn status_code_rejects_unlisted_values() {
        assert_eq!(StatusCode::try_from(20), Ok(StatusCode::LateAirline));
        assert_eq!(StatusCode::try_from(15), Err(StatusCodeError(15)));
        assert!(serde_json::from_value::<StatusCode>(serde_json::json!(35)).is_err());
    }

    #[test]
    fn status_code_parse_accepts_names_and_numbers() {
        assert_eq!(StatusCode::parse("10"), Some(StatusCode::OnTime));
        assert_eq!(StatusCode::parse("LATE_AIRLINE"), Some(StatusCode::LateAirline));
        assert_eq!(StatusCode::parse("delayed"), None);
    }

    #[test]
    fn only_late_airline_is_airline_fault() {
        let faults: Vec<StatusCode> = StatusCode::ALL
            .into_iter()
            .filter(|s| s.is_airline_fault())
            .collect();
        assert_eq!(faults, [StatusCode::LateAirline]);
    }

    #[test]
    fn admitted_states() {
        assert!(!AirlineState::Applied.is_admitted());
        assert!(AirlineState::Registered.is_admitted());
        assert!(AirlineState::Funded.is_admitted());
    }
}
