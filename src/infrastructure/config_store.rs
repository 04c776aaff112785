use crate::domain::config::{TransactionConfig, TransactionKind};
use crate::error::{EasyPayError, Result};
use log::{debug, info};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::{Path, PathBuf};

const DATA_DIR_ENV: &str = "EASYPAY_DATA_DIR";
const DEFAULT_DIR_NAME: &str = ".easypay";
const TERMINAL_CONFIG_FILE: &str = "terminal.json";
const OUTCOME_FILE: &str = "outcome.json";
const LOCAL_CONFIG_FILE: &str = "easypay.json";

const DEFAULT_ADDRESS: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 22000;

/// Well-known locations of the host state shared with the supervisor.
#[derive(Debug, Clone)]
pub struct StatePaths {
    root: PathBuf,
}

impl StatePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolves the data directory: `EASYPAY_DATA_DIR` if set, otherwise
    /// `.easypay` under the home directory, falling back to the working
    /// directory.
    pub fn from_env() -> Self {
        if let Some(dir) = std::env::var_os(DATA_DIR_ENV) {
            return Self::new(PathBuf::from(dir));
        }
        let base = std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::new(base.join(DEFAULT_DIR_NAME))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn terminal_config_path(&self) -> PathBuf {
        self.root.join(TERMINAL_CONFIG_FILE)
    }

    pub fn outcome_path(&self) -> PathBuf {
        self.root.join(OUTCOME_FILE)
    }

    pub fn ensure(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)
    }
}

/// Raw configuration as read from one source; every field optional so
/// sources can be layered.
#[derive(Debug, Default, Clone, Deserialize, PartialEq)]
#[serde(default)]
struct RawConfig {
    address: Option<String>,
    port: Option<u16>,
    password: Option<u32>,
    kind: Option<TransactionKind>,
    /// Amount in minor units (cents), as the host store records it.
    amount_minor: Option<i64>,
    receipt_number: Option<u32>,
}

impl RawConfig {
    /// Fills unset fields of `self` from `fallback`.
    fn or(self, fallback: RawConfig) -> RawConfig {
        RawConfig {
            address: self.address.or(fallback.address),
            port: self.port.or(fallback.port),
            password: self.password.or(fallback.password),
            kind: self.kind.or(fallback.kind),
            amount_minor: self.amount_minor.or(fallback.amount_minor),
            receipt_number: self.receipt_number.or(fallback.receipt_number),
        }
    }
}

/// Produces the single `TransactionConfig` for this run.
///
/// Source precedence: host state store first, then the local
/// configuration file, then a command-line amount override on top.
pub struct ConfigResolver {
    host_store_path: PathBuf,
    local_file_path: PathBuf,
    cli_amount: Option<Decimal>,
}

impl ConfigResolver {
    pub fn new(paths: &StatePaths) -> Self {
        Self {
            host_store_path: paths.terminal_config_path(),
            local_file_path: PathBuf::from(LOCAL_CONFIG_FILE),
            cli_amount: None,
        }
    }

    pub fn with_local_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.local_file_path = path.into();
        self
    }

    pub fn with_cli_amount(mut self, amount: Option<Decimal>) -> Self {
        self.cli_amount = amount;
        self
    }

    pub fn resolve(&self) -> Result<TransactionConfig> {
        let host = Self::read_source(&self.host_store_path)?;
        let local = Self::read_source(&self.local_file_path)?;

        if host.is_none() && local.is_none() && self.cli_amount.is_none() {
            return Err(EasyPayError::ConfigurationNotFound(format!(
                "no configuration at {} or {}",
                self.host_store_path.display(),
                self.local_file_path.display()
            )));
        }

        if host.is_some() {
            debug!(
                "using host store configuration from {}",
                self.host_store_path.display()
            );
        }

        let raw = host.unwrap_or_default().or(local.unwrap_or_default());

        let mut amount = match raw.amount_minor {
            Some(minor) => Decimal::from(minor) / Decimal::from(100),
            None => Decimal::ZERO,
        };
        if let Some(cli_amount) = self.cli_amount {
            amount = cli_amount;
        }

        let config = TransactionConfig {
            address: raw.address.unwrap_or_else(|| DEFAULT_ADDRESS.to_string()),
            port: raw.port.unwrap_or(DEFAULT_PORT),
            password: raw.password.unwrap_or(0),
            kind: raw.kind.unwrap_or_default(),
            amount,
            receipt_number: raw.receipt_number.unwrap_or(0),
        };
        config.validate()?;
        info!(
            "configuration resolved: {}:{}, kind {:?}",
            config.address, config.port, config.kind
        );
        Ok(config)
    }

    /// Reads one source. A missing file is not an error; an unreadable or
    /// unparseable file is an invalid configuration.
    fn read_source(path: &Path) -> Result<Option<RawConfig>> {
        if !path.is_file() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path).map_err(|e| {
            EasyPayError::InvalidConfiguration(format!("cannot read {}: {e}", path.display()))
        })?;
        let raw = serde_json::from_str(&content).map_err(|e| {
            EasyPayError::InvalidConfiguration(format!("cannot parse {}: {e}", path.display()))
        })?;
        Ok(Some(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn write_json(path: &Path, content: &str) {
        std::fs::write(path, content).unwrap();
    }

    fn resolver_in(dir: &TempDir) -> ConfigResolver {
        let paths = StatePaths::new(dir.path());
        // Point the local file into the temp dir so tests never pick up a
        // stray easypay.json from the working directory.
        ConfigResolver::new(&paths).with_local_file(dir.path().join(LOCAL_CONFIG_FILE))
    }

    #[test]
    fn test_missing_all_sources_is_not_found() {
        let dir = TempDir::new().unwrap();
        let result = resolver_in(&dir).resolve();
        assert!(matches!(result, Err(EasyPayError::ConfigurationNotFound(_))));
    }

    #[test]
    fn test_host_store_source() {
        let dir = TempDir::new().unwrap();
        write_json(
            &dir.path().join(TERMINAL_CONFIG_FILE),
            r#"{"address": "10.0.0.5", "port": 20007, "kind": "payment", "amount_minor": 1250}"#,
        );

        let config = resolver_in(&dir).resolve().unwrap();
        assert_eq!(config.address, "10.0.0.5");
        assert_eq!(config.port, 20007);
        assert_eq!(config.kind, TransactionKind::Payment);
        assert_eq!(config.amount, dec!(12.50));
    }

    #[test]
    fn test_host_store_takes_precedence_over_local_file() {
        let dir = TempDir::new().unwrap();
        write_json(
            &dir.path().join(TERMINAL_CONFIG_FILE),
            r#"{"address": "10.0.0.5", "amount_minor": 1250}"#,
        );
        write_json(
            &dir.path().join(LOCAL_CONFIG_FILE),
            r#"{"address": "192.168.1.9", "port": 21000, "amount_minor": 9900}"#,
        );

        let config = resolver_in(&dir).resolve().unwrap();
        // Host store wins where set, the local file fills the gaps.
        assert_eq!(config.address, "10.0.0.5");
        assert_eq!(config.port, 21000);
        assert_eq!(config.amount, dec!(12.50));
    }

    #[test]
    fn test_cli_amount_overrides_sources() {
        let dir = TempDir::new().unwrap();
        write_json(
            &dir.path().join(TERMINAL_CONFIG_FILE),
            r#"{"amount_minor": 1250}"#,
        );

        let config = resolver_in(&dir)
            .with_cli_amount(Some(dec!(7.77)))
            .resolve()
            .unwrap();
        assert_eq!(config.amount, dec!(7.77));
    }

    #[test]
    fn test_cli_amount_alone_is_a_source() {
        let dir = TempDir::new().unwrap();
        let config = resolver_in(&dir)
            .with_cli_amount(Some(dec!(5.00)))
            .resolve()
            .unwrap();
        assert_eq!(config.address, DEFAULT_ADDRESS);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.amount, dec!(5.00));
    }

    #[test]
    fn test_unparseable_source_is_invalid() {
        let dir = TempDir::new().unwrap();
        write_json(&dir.path().join(TERMINAL_CONFIG_FILE), "{not json");

        let result = resolver_in(&dir).resolve();
        assert!(matches!(result, Err(EasyPayError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_zero_amount_payment_is_invalid() {
        let dir = TempDir::new().unwrap();
        write_json(
            &dir.path().join(TERMINAL_CONFIG_FILE),
            r#"{"kind": "payment", "amount_minor": 0}"#,
        );

        let result = resolver_in(&dir).resolve();
        assert!(matches!(result, Err(EasyPayError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_reversal_config() {
        let dir = TempDir::new().unwrap();
        write_json(
            &dir.path().join(TERMINAL_CONFIG_FILE),
            r#"{"kind": "reversal", "receipt_number": 417}"#,
        );

        let config = resolver_in(&dir).resolve().unwrap();
        assert_eq!(config.kind, TransactionKind::Reversal);
        assert_eq!(config.receipt_number, 417);
    }

    #[test]
    fn test_reversal_without_receipt_is_invalid() {
        let dir = TempDir::new().unwrap();
        write_json(
            &dir.path().join(TERMINAL_CONFIG_FILE),
            r#"{"kind": "reversal"}"#,
        );

        let result = resolver_in(&dir).resolve();
        assert!(matches!(result, Err(EasyPayError::InvalidConfiguration(_))));
    }
}
