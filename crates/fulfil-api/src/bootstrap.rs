//! # Start-up Bootstrap
//!
//! Reads process configuration once and assembles [`AppState`].
//!
//! ## Bootstrap Sequence
//!
//! 1. **Server config**: `PORT`, `AUTH_TOKEN`, `CARRIER_MAX_ATTEMPTS`.
//! 2. **Fee schedule**: `FEE_SCHEDULE` path, or the built-in schedule.
//! 3. **Carrier**: `CARRIER_*` variables. Unless `CARRIER_ENABLED=false`,
//!    missing or invalid carrier configuration refuses start-up.
//! 4. **Ledger**: Postgres when a pool is available, in-memory otherwise.
//!
//! Every phase reads variables through a lookup function so tests can run
//! without touching the process environment.

use std::path::Path;
use std::sync::Arc;

use fulfil_carrier::{CarrierClient, CarrierConfig, CarrierError, CarrierGateway, ConfigError};
use fulfil_fees::{FeeError, FeeSchedule};
use fulfil_ledger::{InMemoryLedger, LedgerStore};
use zeroize::Zeroizing;

use crate::db::ledger::PgLedger;
use crate::state::{AppConfig, AppState};

/// Errors during start-up.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    /// Carrier variables are missing or invalid while the carrier is enabled.
    #[error("carrier configuration error: {0}")]
    CarrierConfig(#[from] ConfigError),

    /// The carrier HTTP client could not be built.
    #[error("carrier client error: {0}")]
    CarrierClient(#[from] CarrierError),

    /// The fee schedule file could not be loaded.
    #[error("fee schedule error: {0}")]
    Fees(#[from] FeeError),

    /// A server variable has an invalid value.
    #[error("invalid value for {var}: {value:?}")]
    InvalidValue { var: &'static str, value: String },
}

/// Read server configuration from the process environment.
pub fn config_from_env() -> Result<AppConfig, BootstrapError> {
    config_from_lookup(|var| std::env::var(var).ok())
}

/// Read server configuration through `lookup`.
pub fn config_from_lookup<F>(lookup: F) -> Result<AppConfig, BootstrapError>
where
    F: Fn(&'static str) -> Option<String>,
{
    let defaults = AppConfig::default();
    let port = parse_var(&lookup, "PORT", defaults.port, |p: &u16| *p > 0)?;
    let carrier_max_attempts = parse_var(
        &lookup,
        "CARRIER_MAX_ATTEMPTS",
        defaults.carrier_max_attempts,
        |n: &u32| *n > 0,
    )?;
    let auth_token = lookup("AUTH_TOKEN")
        .filter(|t| !t.is_empty())
        .map(Zeroizing::new);

    Ok(AppConfig {
        port,
        auth_token,
        carrier_max_attempts,
    })
}

fn parse_var<F, T>(
    lookup: &F,
    var: &'static str,
    default: T,
    valid: impl Fn(&T) -> bool,
) -> Result<T, BootstrapError>
where
    F: Fn(&'static str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(v) if valid(&v) => Ok(v),
            _ => Err(BootstrapError::InvalidValue { var, value: raw }),
        },
    }
}

/// Assemble application state from the process environment.
pub fn bootstrap(
    config: AppConfig,
    db_pool: Option<sqlx::PgPool>,
) -> Result<AppState, BootstrapError> {
    bootstrap_from_lookup(|var| std::env::var(var).ok(), config, db_pool)
}

/// Assemble application state, reading variables through `lookup`.
pub fn bootstrap_from_lookup<F>(
    lookup: F,
    config: AppConfig,
    db_pool: Option<sqlx::PgPool>,
) -> Result<AppState, BootstrapError>
where
    F: Fn(&'static str) -> Option<String>,
{
    let fees = load_fee_schedule(&lookup)?;
    let carrier = load_carrier(&lookup)?;
    let ledger: Arc<dyn LedgerStore> = match &db_pool {
        Some(pool) => Arc::new(PgLedger::new(pool.clone())),
        None => Arc::new(InMemoryLedger::new()),
    };

    tracing::info!(
        port = config.port,
        auth = config.auth_token.is_some(),
        carrier = carrier.is_some(),
        persistence = if db_pool.is_some() { "postgres" } else { "memory" },
        live_quote = fees.use_live_quote,
        carrier_max_attempts = config.carrier_max_attempts,
        "fulfilment API configured"
    );

    Ok(AppState::from_parts(
        config,
        ledger,
        Arc::new(fees),
        carrier,
        db_pool,
    ))
}

fn load_fee_schedule<F>(lookup: &F) -> Result<FeeSchedule, BootstrapError>
where
    F: Fn(&'static str) -> Option<String>,
{
    match lookup("FEE_SCHEDULE").filter(|p| !p.trim().is_empty()) {
        Some(path) => {
            let schedule = FeeSchedule::from_path(Path::new(&path))?;
            tracing::info!(path = %path, tiers = schedule.tiers.len(), "fee schedule loaded");
            Ok(schedule)
        }
        None => {
            tracing::info!("FEE_SCHEDULE not set, using built-in fee schedule");
            Ok(FeeSchedule::default())
        }
    }
}

fn load_carrier<F>(lookup: &F) -> Result<Option<Arc<dyn CarrierGateway>>, BootstrapError>
where
    F: Fn(&'static str) -> Option<String>,
{
    let enabled = lookup("CARRIER_ENABLED")
        .map(|v| !v.trim().eq_ignore_ascii_case("false"))
        .unwrap_or(true);
    if !enabled {
        tracing::warn!("CARRIER_ENABLED=false: order, quote and tracking endpoints will return 503");
        return Ok(None);
    }

    let config = CarrierConfig::from_lookup(lookup)?;
    tracing::info!(
        base_url = %config.base_url,
        transport = ?config.signature_transport,
        "carrier client configured"
    );
    let client = CarrierClient::new(config)?;
    Ok(Some(Arc::new(client)))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    fn lookup(vars: &[(&'static str, &str)]) -> impl Fn(&'static str) -> Option<String> {
        let map: HashMap<&'static str, String> =
            vars.iter().map(|(k, v)| (*k, v.to_string())).collect();
        move |var| map.get(var).cloned()
    }

    const CARRIER_VARS: [(&str, &str); 3] = [
        ("CARRIER_BASE_URL", "http://127.0.0.1:9"),
        ("CARRIER_MCH_ID", "AA0001"),
        ("CARRIER_SECRET_KEY", "secret"),
    ];

    #[test]
    fn config_defaults() {
        let config = config_from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.port, 8080);
        assert!(config.auth_token.is_none());
        assert_eq!(config.carrier_max_attempts, 2);
    }

    #[test]
    fn config_reads_variables() {
        let config = config_from_lookup(lookup(&[
            ("PORT", "9090"),
            ("AUTH_TOKEN", "tok"),
            ("CARRIER_MAX_ATTEMPTS", "4"),
        ]))
        .unwrap();
        assert_eq!(config.port, 9090);
        assert_eq!(config.auth_token.as_deref().map(String::as_str), Some("tok"));
        assert_eq!(config.carrier_max_attempts, 4);
    }

    #[test]
    fn zero_attempts_rejected() {
        let err = config_from_lookup(lookup(&[("CARRIER_MAX_ATTEMPTS", "0")])).unwrap_err();
        assert!(matches!(
            err,
            BootstrapError::InvalidValue {
                var: "CARRIER_MAX_ATTEMPTS",
                ..
            }
        ));
    }

    #[test]
    fn missing_carrier_config_fails_fast() {
        let err = bootstrap_from_lookup(lookup(&[]), AppConfig::default(), None).unwrap_err();
        assert!(matches!(
            err,
            BootstrapError::CarrierConfig(ConfigError::MissingVar("CARRIER_BASE_URL"))
        ));
    }

    #[test]
    fn disabled_carrier_starts_without_orchestrator() {
        let state = bootstrap_from_lookup(
            lookup(&[("CARRIER_ENABLED", "false")]),
            AppConfig::default(),
            None,
        )
        .unwrap();
        assert!(state.carrier.is_none());
        assert!(state.orchestrator.is_none());
    }

    #[test]
    fn configured_carrier_builds_orchestrator() {
        let state =
            bootstrap_from_lookup(lookup(&CARRIER_VARS), AppConfig::default(), None).unwrap();
        assert!(state.carrier.is_some());
        assert!(state.orchestrator.is_some());
    }

    #[test]
    fn fee_schedule_loaded_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "tiers:\n  - max_grams: 2000\n    base: 4000\n\
             insurance_surcharge: 1000\ncod_rate_bps: 200\n\
             cod_minimum_fee: 1500\nplatform_fee: 500\n"
        )
        .unwrap();
        let path = file.path().display().to_string();
        let state = bootstrap_from_lookup(
            lookup(&[("CARRIER_ENABLED", "false"), ("FEE_SCHEDULE", path.as_str())]),
            AppConfig::default(),
            None,
        )
        .unwrap();
        assert_eq!(state.fees.tiers.len(), 1);
        assert_eq!(state.fees.platform_fee.minor(), 500);
    }

    #[test]
    fn missing_fee_schedule_file_fails() {
        let err = bootstrap_from_lookup(
            lookup(&[
                ("CARRIER_ENABLED", "false"),
                ("FEE_SCHEDULE", "/nonexistent/fees.yaml"),
            ]),
            AppConfig::default(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, BootstrapError::Fees(FeeError::Io { .. })));
    }
}
