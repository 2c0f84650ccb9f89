//! Ledger snapshots and crash-safe persistence.
//!
//! A snapshot is the whole ledger as plain records, encoded as JSON. Writes go
//! through a temp file in the destination directory followed by a rename, so a
//! reader only ever sees the previous snapshot or the new one.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use surety_types::{FlightKey, Identity, LedgerParams, Sequence, Wei};
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::airlines::{Airline, AirlineRegistry, Flight};
use crate::consensus::{FlightStatusConsensus, StatusRequest};
use crate::gate::AccessGate;
use crate::insurance::{InsuranceLedger, Policy};
use crate::notifications::{LogOrderError, NotificationLog, NotificationRecord};
use crate::oracles::{Oracle, OracleRegistry};
use crate::surety::FlightSurety;

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to access snapshot at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode snapshot: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to decode snapshot at {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("unsupported snapshot version {found} (expected {expected})")]
    Version { found: u32, expected: u32 },
    #[error("snapshot notification log is inconsistent: {0}")]
    Notifications(#[source] LogOrderError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub version: u32,
    pub app_id: Identity,
    pub salt: u64,
    pub sequence: Sequence,
    pub gate: AccessGate,
    pub airlines: Vec<Airline>,
    pub flights: Vec<Flight>,
    pub oracles: Vec<Oracle>,
    pub oracle_nonce: u64,
    pub requests: Vec<StatusRequest>,
    pub policies: Vec<Policy>,
    pub settled_flights: Vec<FlightKey>,
    pub treasury: Wei,
    pub notifications: Vec<NotificationRecord>,
}

impl<S> FlightSurety<S> {
    #[must_use]
    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            version: SNAPSHOT_VERSION,
            app_id: self.app_id.clone(),
            salt: self.salt,
            sequence: self.sequence,
            gate: self.gate.clone(),
            airlines: self.airlines.airlines().cloned().collect(),
            flights: self.airlines.flights().cloned().collect(),
            oracles: self.oracles.oracles().cloned().collect(),
            oracle_nonce: self.oracles.nonce(),
            requests: self.consensus.requests().cloned().collect(),
            policies: self.insurance.policies().to_vec(),
            settled_flights: self.insurance.settled_flights().cloned().collect(),
            treasury: self.insurance.treasury(),
            notifications: self.log.records().to_vec(),
        }
    }

    /// Rebuilds a ledger from a snapshot.
    ///
    /// Parameters are not part of the snapshot; the caller supplies the ones
    /// resolved from configuration.
    pub fn restore(
        params: LedgerParams,
        snapshot: LedgerSnapshot,
        index_source: S,
    ) -> Result<Self, SnapshotError> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::Version {
                found: snapshot.version,
                expected: SNAPSHOT_VERSION,
            });
        }
        let log = NotificationLog::from_records(snapshot.notifications, snapshot.sequence)
            .map_err(SnapshotError::Notifications)?;
        Ok(Self {
            params,
            app_id: snapshot.app_id,
            salt: snapshot.salt,
            sequence: snapshot.sequence,
            gate: snapshot.gate,
            airlines: AirlineRegistry::from_records(snapshot.airlines, snapshot.flights),
            oracles: OracleRegistry::from_records(snapshot.oracles, snapshot.oracle_nonce),
            consensus: FlightStatusConsensus::from_records(snapshot.requests),
            insurance: InsuranceLedger::from_records(
                snapshot.policies,
                snapshot.settled_flights,
                snapshot.treasury,
            ),
            log,
            index_source,
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SnapshotError> {
        let path = path.as_ref();
        let bytes = serde_json::to_vec_pretty(&self.snapshot()).map_err(SnapshotError::Encode)?;
        atomic_write(path, &bytes).map_err(|source| SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), sequence = %self.sequence, "Snapshot saved");
        Ok(())
    }

    /// Loads the ledger at `path`, or `None` if no snapshot exists yet.
    pub fn load(
        path: impl AsRef<Path>,
        params: LedgerParams,
        index_source: S,
    ) -> Result<Option<Self>, SnapshotError> {
        let path = path.as_ref();
        recover_bak_file(path);
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(SnapshotError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        let snapshot: LedgerSnapshot =
            serde_json::from_slice(&bytes).map_err(|source| SnapshotError::Decode {
                path: path.to_path_buf(),
                source,
            })?;
        Self::restore(params, snapshot, index_source).map(Some)
    }
}

/// Restores `path` from `path.bak` when a crash interrupted a replace.
fn recover_bak_file(path: &Path) {
    let backup = path.with_extension("bak");
    if !path.exists() && backup.exists() {
        match fs::rename(&backup, path) {
            Ok(()) => {
                tracing::warn!(
                    path = %path.display(),
                    "Recovered snapshot from .bak left by an interrupted write"
                );
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), "Failed to recover .bak snapshot: {e}");
            }
        }
    }
}

fn atomic_write(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;

    // Rename over an existing file fails on some platforms; fall back to
    // moving the old snapshot aside first.
    if let Err(err) = tmp.persist(path) {
        if !path.exists() {
            return Err(err.error);
        }
        let backup = path.with_extension("bak");
        let _ = fs::remove_file(&backup);
        fs::rename(path, &backup)?;
        if let Err(retry) = err.file.persist(path) {
            let _ = fs::rename(&backup, path);
            return Err(retry.error);
        }
        if let Err(e) = fs::remove_file(&backup) {
            tracing::warn!(path = %backup.display(), "Failed to remove .bak after snapshot write: {e}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index_source::ScriptedIndexSource;
    use crate::surety::Genesis;

    fn id(raw: &str) -> Identity {
        Identity::new(raw).unwrap()
    }

    fn ledger() -> FlightSurety<ScriptedIndexSource> {
        let mut ledger = FlightSurety::bootstrap(
            LedgerParams::default(),
            Genesis {
                owner: id("owner"),
                first_airline: id("air"),
                app_id: id("app"),
                salt: 11,
            },
            ScriptedIndexSource::new([2, 5, 7]),
        );
        ledger.authorize_contract(&id("owner"), id("app")).unwrap();
        ledger.fund(&id("air"), Wei::units(10)).unwrap();
        ledger.register_flight(&id("air"), "GOL123").unwrap();
        ledger.register_oracle(&id("oracle"), Wei::UNIT).unwrap();
        ledger
    }

    #[test]
    fn save_then_load_restores_every_table() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ledger.json");
        let original = ledger();
        original.save(&path).expect("save");

        let loaded = FlightSurety::load(
            &path,
            LedgerParams::default(),
            ScriptedIndexSource::new([0]),
        )
        .expect("load")
        .expect("snapshot exists");
        assert_eq!(loaded.snapshot(), original.snapshot());
        assert_eq!(loaded.oracle_indexes(&id("oracle")), Ok([2, 5, 7]));
    }

    #[test]
    fn missing_snapshot_loads_as_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let loaded = FlightSurety::load(
            dir.path().join("absent.json"),
            LedgerParams::default(),
            ScriptedIndexSource::new([0]),
        )
        .expect("load");
        assert!(loaded.is_none());
    }

    #[test]
    fn overwrite_leaves_no_backup() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ledger.json");
        let mut ledger = ledger();
        ledger.save(&path).expect("first save");
        ledger.buy(&id("p1"), &FlightKey::new(id("air"), "GOL123"), Wei::UNIT).unwrap();
        ledger.save(&path).expect("second save");

        assert!(!path.with_extension("bak").exists());
        let raw = fs::read_to_string(&path).expect("read");
        let snapshot: LedgerSnapshot = serde_json::from_str(&raw).expect("decode");
        assert_eq!(snapshot.policies.len(), 1);
    }

    #[test]
    fn interrupted_write_recovers_backup() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ledger.json");
        ledger().save(&path).expect("save");
        fs::rename(&path, path.with_extension("bak")).expect("simulate crash");

        let loaded = FlightSurety::load(
            &path,
            LedgerParams::default(),
            ScriptedIndexSource::new([0]),
        )
        .expect("load");
        assert!(loaded.is_some());
        assert!(path.exists());
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let mut snapshot = ledger().snapshot();
        snapshot.version = 99;
        let err = FlightSurety::restore(
            LedgerParams::default(),
            snapshot,
            ScriptedIndexSource::new([0]),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            SnapshotError::Version {
                found: 99,
                expected: SNAPSHOT_VERSION
            }
        ));
    }

    #[test]
    fn reordered_notifications_are_rejected() {
        let mut snapshot = ledger().snapshot();
        snapshot.notifications.swap(1, 2);
        let err = FlightSurety::restore(
            LedgerParams::default(),
            snapshot,
            ScriptedIndexSource::new([0]),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            SnapshotError::Notifications(LogOrderError { position: 2, .. })
        ));
    }

    #[test]
    fn notifications_past_the_ledger_sequence_are_rejected() {
        let mut snapshot = ledger().snapshot();
        snapshot.sequence = Sequence::new(1);
        assert!(matches!(
            FlightSurety::restore(
                LedgerParams::default(),
                snapshot,
                ScriptedIndexSource::new([0]),
            ),
            Err(SnapshotError::Notifications(_))
        ));
    }

    #[test]
    fn corrupt_snapshot_reports_decode_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ledger.json");
        fs::write(&path, b"{ not json").expect("write");
        let err = FlightSurety::load(
            &path,
            LedgerParams::default(),
            ScriptedIndexSource::new([0]),
        )
        .err()
        .expect("decode error");
        assert!(matches!(err, SnapshotError::Decode { .. }));
    }
}
