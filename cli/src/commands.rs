//! Command definitions and execution.
//!
//! Payouts are held back until the snapshot that debits them is on disk, so a
//! failed save never leaves a credit both paid and still withdrawable.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser, Subcommand};
use surety_core::{
    Admission, FlightSurety, Genesis, HashIndexSource, PayoutSink, ReportOutcome, TransferError,
};
use surety_types::{FlightKey, Identity, LedgerParams, Sequence, StatusCode, Wei};

type Ledger = FlightSurety<HashIndexSource>;

#[derive(Debug, Parser)]
#[command(name = "surety")]
#[command(about = "Drive a flight-delay insurance ledger snapshot on disk")]
#[command(
    after_help = "Amounts are decimal currency units (\"0.5\"). Status is a code (20) or name (LATE_AIRLINE)."
)]
pub(crate) struct Cli {
    /// Ledger snapshot (default ~/.surety/ledger.json)
    #[arg(long, global = true)]
    pub ledger: Option<PathBuf>,
    /// Config file (default ~/.surety/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub(crate) enum Command {
    /// Create a new ledger with its owner and first airline
    Init {
        owner: Identity,
        first_airline: Identity,
        app_id: Identity,
    },
    /// Print whether the ledger accepts state changes
    IsOperational,
    /// Pause or resume the ledger (owner only)
    SetOperational {
        caller: Identity,
        #[arg(action = ArgAction::Set, value_parser = BoolishValueParser::new())]
        operational: bool,
    },
    /// Allow an application contract to call the ledger
    Authorize { caller: Identity, id: Identity },
    /// Revoke an application contract
    Deauthorize { caller: Identity, id: Identity },
    IsAuthorized { id: Identity },
    /// Nominate an airline, or vote for it once the registry is past bootstrap
    RegisterAirline {
        caller: Identity,
        candidate: Identity,
    },
    /// Pay the airline funding fee
    Fund { caller: Identity, amount: Wei },
    AirlineStatus { airline: Identity },
    RegisterFlight { caller: Identity, code: String },
    /// Ask oracles for a flight's status (timestamp defaults to now)
    FetchStatus {
        caller: Identity,
        airline: Identity,
        flight: String,
        timestamp: Option<u64>,
    },
    RegistrationFee,
    /// Register an oracle and print its assigned indexes
    RegisterOracle { caller: Identity, fee: Wei },
    Indexes { caller: Identity },
    /// Submit an oracle report for an open status request
    Submit {
        oracle: Identity,
        index: u8,
        airline: Identity,
        flight: String,
        timestamp: u64,
        #[arg(value_parser = parse_status)]
        status: StatusCode,
    },
    /// Insure a registered flight
    Buy {
        passenger: Identity,
        airline: Identity,
        flight: String,
        amount: Wei,
    },
    /// Pay out a passenger's credited balance
    Withdraw { passenger: Identity },
    /// Print notifications as JSON lines, optionally only those after a sequence
    Events { since: Option<u64> },
}

fn parse_status(raw: &str) -> Result<StatusCode, String> {
    StatusCode::parse(raw).ok_or_else(|| format!("unknown flight status `{raw}`"))
}

impl Command {
    fn is_mutating(&self) -> bool {
        !matches!(
            self,
            Command::IsOperational
                | Command::IsAuthorized { .. }
                | Command::AirlineStatus { .. }
                | Command::RegistrationFee
                | Command::Indexes { .. }
                | Command::Events { .. }
        )
    }
}

/// Collects payouts during an operation and reports them once the ledger that
/// debited them has been saved.
#[derive(Debug, Default)]
struct DeferredPayouts(Vec<(Identity, Wei)>);

impl PayoutSink for DeferredPayouts {
    fn transfer(&mut self, recipient: &Identity, amount: Wei) -> Result<(), TransferError> {
        self.0.push((recipient.clone(), amount));
        Ok(())
    }
}

impl DeferredPayouts {
    fn pay(self, out: &mut impl Write) -> Result<()> {
        for (recipient, amount) in self.0 {
            tracing::info!(%recipient, %amount, "Payout transferred");
            writeln!(out, "transferred {amount} to {recipient}")?;
        }
        Ok(())
    }
}

fn default_ledger_path() -> Result<PathBuf> {
    surety_config::surety_dir()
        .map(|dir| dir.join("ledger.json"))
        .context("could not determine home directory; pass --ledger")
}

fn load_params(config: Option<&Path>) -> Result<LedgerParams> {
    let params = match config {
        Some(path) => surety_config::load(path)?,
        None => surety_config::load_default()?,
    };
    Ok(params)
}

fn load_ledger(path: &Path, params: LedgerParams) -> Result<Ledger> {
    FlightSurety::load(path, params, HashIndexSource)?.with_context(|| {
        format!(
            "no ledger at {}; run `surety init` first",
            path.display()
        )
    })
}

fn now() -> Result<u64> {
    u64::try_from(Utc::now().timestamp()).context("system clock is before 1970")
}

pub(crate) fn run(cli: Cli, out: &mut impl Write) -> Result<()> {
    let params = load_params(cli.config.as_deref())?;
    let path = match cli.ledger {
        Some(path) => path,
        None => default_ledger_path()?,
    };

    let command = match cli.command {
        Command::Init {
            owner,
            first_airline,
            app_id,
        } => return init(&path, params, owner, first_airline, app_id, out),
        command => command,
    };

    let mut ledger = load_ledger(&path, params)?;
    let mutating = command.is_mutating();
    let mut payouts = DeferredPayouts::default();
    execute(&mut ledger, command, &mut payouts, out)?;
    if mutating {
        commit(&ledger, &path, payouts, out)?;
    }
    Ok(())
}

/// Saves the ledger, then releases the payouts it recorded.
fn commit(
    ledger: &Ledger,
    path: &Path,
    payouts: DeferredPayouts,
    out: &mut impl Write,
) -> Result<()> {
    ledger.save(path)?;
    payouts.pay(out)
}

fn init(
    path: &Path,
    params: LedgerParams,
    owner: Identity,
    first_airline: Identity,
    app_id: Identity,
    out: &mut impl Write,
) -> Result<()> {
    if path.exists() {
        bail!("ledger already exists at {}", path.display());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let ledger = Ledger::bootstrap(
        params,
        Genesis {
            owner,
            first_airline,
            app_id,
            salt: rand::random::<u64>(),
        },
        HashIndexSource,
    );
    ledger.save(path)?;
    writeln!(out, "initialized ledger at {}", path.display())?;
    Ok(())
}

fn execute(
    ledger: &mut Ledger,
    command: Command,
    payouts: &mut DeferredPayouts,
    out: &mut impl Write,
) -> Result<()> {
    match command {
        Command::Init { .. } => bail!("ledger is already loaded"),
        Command::IsOperational => writeln!(out, "{}", ledger.is_operational())?,
        Command::SetOperational {
            caller,
            operational,
        } => {
            ledger.set_operating_status(&caller, operational)?;
            writeln!(out, "operational: {operational}")?;
        }
        Command::Authorize { caller, id } => {
            ledger.authorize_contract(&caller, id.clone())?;
            writeln!(out, "authorized {id}")?;
        }
        Command::Deauthorize { caller, id } => {
            ledger.deauthorize_contract(&caller, &id)?;
            writeln!(out, "deauthorized {id}")?;
        }
        Command::IsAuthorized { id } => {
            writeln!(out, "{}", ledger.is_contract_authorized(&id))?;
        }
        Command::RegisterAirline { caller, candidate } => {
            match ledger.register_airline(&caller, &candidate)? {
                Admission::Registered => {
                    writeln!(out, "{candidate} registered")?;
                }
                Admission::Pending { votes, required } => {
                    writeln!(out, "{candidate} pending: {votes}/{required} votes")?;
                }
            }
        }
        Command::Fund { caller, amount } => {
            ledger.fund(&caller, amount)?;
            writeln!(out, "{caller} funded with {amount}")?;
        }
        Command::AirlineStatus { airline } => {
            writeln!(out, "{}", ledger.airline_status(&airline)?)?;
        }
        Command::RegisterFlight { caller, code } => {
            let key = ledger.register_flight(&caller, &code)?;
            writeln!(out, "registered flight {key}")?;
        }
        Command::FetchStatus {
            caller,
            airline,
            flight,
            timestamp,
        } => {
            let flight = FlightKey::new(airline, flight);
            let timestamp = match timestamp {
                Some(ts) => ts,
                None => now()?,
            };
            let index = ledger.fetch_flight_status(&caller, &flight, timestamp)?;
            writeln!(out, "requested {flight}@{timestamp} from oracles at index {index}")?;
        }
        Command::RegistrationFee => writeln!(out, "{}", ledger.registration_fee())?,
        Command::RegisterOracle { caller, fee } => {
            let [a, b, c] = ledger.register_oracle(&caller, fee)?;
            writeln!(out, "{caller} registered with indexes {a} {b} {c}")?;
        }
        Command::Indexes { caller } => {
            let [a, b, c] = ledger.oracle_indexes(&caller)?;
            writeln!(out, "{a} {b} {c}")?;
        }
        Command::Submit {
            oracle,
            index,
            airline,
            flight,
            timestamp,
            status,
        } => {
            let flight = FlightKey::new(airline, flight);
            let outcome =
                ledger.submit_oracle_response(&oracle, index, &flight, timestamp, status)?;
            match outcome {
                ReportOutcome::Recorded { reports } => {
                    writeln!(out, "recorded {status} ({reports} matching reports)")?;
                }
                ReportOutcome::Finalized(final_status) => {
                    writeln!(out, "finalized {flight}@{timestamp} as {final_status}")?;
                }
                ReportOutcome::Ignored => writeln!(out, "ignored")?,
            }
        }
        Command::Buy {
            passenger,
            airline,
            flight,
            amount,
        } => {
            let flight = FlightKey::new(airline, flight);
            let policy = ledger.buy(&passenger, &flight, amount)?;
            writeln!(out, "{policy}: {passenger} insured {flight} for {amount}")?;
        }
        Command::Withdraw { passenger } => {
            let amount = ledger.withdraw(&passenger, &mut *payouts)?;
            if amount.is_zero() {
                writeln!(out, "nothing to withdraw")?;
            }
        }
        Command::Events { since } => {
            let records = match since {
                Some(cursor) => ledger.notifications().since(Sequence::new(cursor)),
                None => ledger.notifications().records(),
            };
            for record in records {
                writeln!(out, "{}", serde_json::to_string(record)?)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::iter;

    use super::*;

    fn parse(raw: &str) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(iter::once("surety").chain(raw.split_whitespace()))
    }

    fn id(raw: &str) -> Identity {
        Identity::new(raw).unwrap()
    }

    struct Workspace {
        _dir: tempfile::TempDir,
        ledger: PathBuf,
        config: PathBuf,
    }

    impl Workspace {
        fn new() -> Self {
            let dir = tempfile::tempdir().expect("tempdir");
            let ledger = dir.path().join("ledger.json");
            let config = dir.path().join("config.toml");
            Self {
                _dir: dir,
                ledger,
                config,
            }
        }

        fn run(&self, command: &str) -> Result<String> {
            let mut args = vec![
                "surety".to_string(),
                "--ledger".to_string(),
                self.ledger.display().to_string(),
                "--config".to_string(),
                self.config.display().to_string(),
            ];
            args.extend(command.split_whitespace().map(str::to_string));
            let mut out = Vec::new();
            run(Cli::try_parse_from(args)?, &mut out)?;
            Ok(String::from_utf8(out).expect("utf8"))
        }

        /// Ledger with one airline-fault delay settled and 1.5 credited to p1.
        fn settled() -> Self {
            let ws = Self::new();
            // A single index means every oracle answers every request.
            fs::write(&ws.config, "[oracles]\nindex_space = 1\n").unwrap();
            ws.run("init owner air0 app").unwrap();
            ws.run("authorize owner app").unwrap();
            ws.run("fund air0 10").unwrap();
            ws.run("register-flight air0 GOL123").unwrap();
            ws.run("buy p1 air0 GOL123 1").unwrap();
            for n in 0..3 {
                ws.run(&format!("register-oracle o{n} 1")).unwrap();
            }
            ws.run("fetch-status p1 air0 GOL123 1700000000").unwrap();
            for n in 0..3 {
                ws.run(&format!("submit o{n} 0 air0 GOL123 1700000000 20"))
                    .unwrap();
            }
            ws
        }
    }

    #[test]
    fn parses_global_flags_anywhere() {
        let cli = parse("fund air0 10 --ledger /tmp/l.json").unwrap();
        assert_eq!(cli.ledger, Some(PathBuf::from("/tmp/l.json")));
        assert_eq!(cli.config, None);
        assert_eq!(
            cli.command,
            Command::Fund {
                caller: id("air0"),
                amount: Wei::units(10)
            }
        );
    }

    #[test]
    fn parses_submit_with_status_name() {
        let cli = parse("submit o1 7 air0 GOL123 1700000000 LATE_AIRLINE").unwrap();
        assert_eq!(
            cli.command,
            Command::Submit {
                oracle: id("o1"),
                index: 7,
                airline: id("air0"),
                flight: "GOL123".to_string(),
                timestamp: 1_700_000_000,
                status: StatusCode::LateAirline,
            }
        );
    }

    #[test]
    fn rejects_bad_arguments() {
        for raw in [
            "",
            "fly away",
            "fund air0",
            "fund air0 ten",
            "indexes o1 extra",
            "submit o1 7 air0 GOL123 1 DELAYED",
            "submit o1 300 air0 GOL123 1 20",
            "set-operational owner maybe",
            "events --ledger",
        ] {
            assert!(parse(raw).is_err(), "accepted {raw:?}");
        }
    }

    #[test]
    fn operational_flag_accepts_boolish_words() {
        assert_eq!(
            parse("set-operational owner off").unwrap().command,
            Command::SetOperational {
                caller: id("owner"),
                operational: false
            }
        );
        assert_eq!(
            parse("set-operational owner true").unwrap().command,
            Command::SetOperational {
                caller: id("owner"),
                operational: true
            }
        );
    }

    #[test]
    fn optional_arguments_default_to_none() {
        assert_eq!(
            parse("events").unwrap().command,
            Command::Events { since: None }
        );
        assert_eq!(
            parse("fetch-status p1 air0 GOL123").unwrap().command,
            Command::FetchStatus {
                caller: id("p1"),
                airline: id("air0"),
                flight: "GOL123".to_string(),
                timestamp: None,
            }
        );
    }

    #[test]
    fn commands_persist_between_runs() {
        let ws = Workspace::new();
        assert!(ws.run("is-operational").is_err());

        ws.run("init owner air0 app").unwrap();
        assert!(ws.run("init owner air0 app").is_err());
        assert_eq!(ws.run("is-operational").unwrap(), "true\n");
        assert_eq!(ws.run("is-authorized app").unwrap(), "false\n");

        ws.run("authorize owner app").unwrap();
        ws.run("fund air0 10").unwrap();
        assert_eq!(ws.run("airline-status air0").unwrap(), "funded\n");
        ws.run("register-flight air0 GOL123").unwrap();
        ws.run("buy p1 air0 GOL123 0.5").unwrap();

        let events = ws.run("events 2").unwrap();
        let kinds: Vec<String> = events
            .lines()
            .map(|line| {
                let value: serde_json::Value = serde_json::from_str(line).unwrap();
                value["notification"]["kind"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(kinds, ["flight_registered", "policy_purchased"]);
    }

    #[test]
    fn failed_command_does_not_touch_the_snapshot() {
        let ws = Workspace::new();
        ws.run("init owner air0 app").unwrap();
        ws.run("authorize owner app").unwrap();
        let before = fs::read_to_string(&ws.ledger).unwrap();

        assert!(ws.run("fund air0 9").is_err());
        assert!(ws.run("set-operational air0 false").is_err());
        assert_eq!(fs::read_to_string(&ws.ledger).unwrap(), before);
    }

    #[test]
    fn oracle_flow_settles_and_pays_out() {
        let ws = Workspace::new();
        // A single index means every oracle answers every request.
        fs::write(&ws.config, "[oracles]\nindex_space = 1\n").unwrap();
        ws.run("init owner air0 app").unwrap();
        ws.run("authorize owner app").unwrap();
        ws.run("fund air0 10").unwrap();
        ws.run("register-flight air0 GOL123").unwrap();
        ws.run("buy p1 air0 GOL123 1").unwrap();
        for n in 0..4 {
            ws.run(&format!("register-oracle o{n} 1")).unwrap();
        }

        assert_eq!(
            ws.run("fetch-status p1 air0 GOL123 1700000000").unwrap(),
            "requested air0/GOL123@1700000000 from oracles at index 0\n"
        );
        ws.run("submit o0 0 air0 GOL123 1700000000 20").unwrap();
        ws.run("submit o1 0 air0 GOL123 1700000000 LATE_AIRLINE").unwrap();
        assert_eq!(
            ws.run("submit o2 0 air0 GOL123 1700000000 20").unwrap(),
            "finalized air0/GOL123@1700000000 as late_airline (20)\n"
        );
        assert_eq!(
            ws.run("submit o3 0 air0 GOL123 1700000000 10").unwrap(),
            "ignored\n"
        );

        assert_eq!(ws.run("withdraw p1").unwrap(), "transferred 1.5 to p1\n");
        assert_eq!(ws.run("withdraw p1").unwrap(), "nothing to withdraw\n");
    }

    #[test]
    fn payout_waits_for_the_debit_to_be_saved() {
        let ws = Workspace::settled();
        let params = load_params(Some(&ws.config)).unwrap();
        let mut ledger = load_ledger(&ws.ledger, params).unwrap();
        let mut payouts = DeferredPayouts::default();
        let mut out = Vec::new();
        execute(
            &mut ledger,
            Command::Withdraw {
                passenger: id("p1"),
            },
            &mut payouts,
            &mut out,
        )
        .unwrap();
        assert!(out.is_empty());

        // The snapshot is a file, so nothing can be written beneath it.
        let unwritable = ws.ledger.join("ledger.json");
        assert!(commit(&ledger, &unwritable, payouts, &mut out).is_err());
        assert!(out.is_empty());

        assert_eq!(ws.run("withdraw p1").unwrap(), "transferred 1.5 to p1\n");
        assert_eq!(ws.run("withdraw p1").unwrap(), "nothing to withdraw\n");
    }

    #[test]
    fn config_file_changes_parameters() {
        let ws = Workspace::new();
        fs::write(&ws.config, "[oracles]\nindex_space = 1\n").unwrap();
        ws.run("init owner air0 app").unwrap();
        ws.run("authorize owner app").unwrap();
        assert_eq!(ws.run("register-oracle o1 1").unwrap(), "o1 registered with indexes 0 0 0\n");
        assert_eq!(ws.run("registration-fee").unwrap(), "1\n");
    }
}
