//! Controller configuration: TOML file, then environment overrides.
//!
//! ```toml
//! rpc_url = "http://127.0.0.1:8545"
//! chain_id = 1
//! contract_address = "0x…"
//! operator = "0x…"
//! admins = ["0x432b52a5fafe90f831db31a70381459110f17280"]
//! confirmation_timeout_secs = 300
//! receipt_poll_ms = 2000
//! ```
//!
//! Environment overrides: `PRESALE_RPC_URL`, `PRESALE_CHAIN_ID`,
//! `PRESALE_CONTRACT`, `PRESALE_OPERATOR`, `PRESALE_ADMINS` (comma
//! separated), `PRESALE_CONFIRMATION_TIMEOUT_SECS`,
//! `PRESALE_RECEIPT_POLL_MS`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use alloy_primitives::Address;
use serde::Deserialize;
use thiserror::Error;

use crate::authorization::{AuthorizedSet, CallerIdentity, DEFAULT_ADMIN};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(String),

    #[error("cannot parse config: {0}")]
    Parse(String),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ControlConfig {
    /// JSON-RPC endpoint of the chain node.
    pub rpc_url: String,

    /// Chain the presale contract lives on.
    pub chain_id: u64,

    /// Presale contract address.
    pub contract_address: Option<String>,

    /// Account transactions are sent from. Must be managed by the node.
    pub operator: Option<String>,

    /// Accounts allowed to manage the presale.
    pub admins: Vec<String>,

    /// Upper bound on waiting for a transaction to confirm.
    pub confirmation_timeout_secs: u64,

    /// Receipt polling interval while awaiting confirmation.
    pub receipt_poll_ms: u64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        ControlConfig {
            rpc_url: "http://127.0.0.1:8545".to_string(),
            chain_id: 1,
            contract_address: None,
            operator: None,
            admins: vec![DEFAULT_ADMIN.to_string()],
            confirmation_timeout_secs: 300,
            receipt_poll_ms: 2_000,
        }
    }
}

impl ControlConfig {
    /// Load config from a TOML file. Missing keys take defaults.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let s = fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io(e.to_string()))?;
        toml::from_str(&s).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Applies `PRESALE_*` overrides from the process environment.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary lookup.
    pub fn apply_env_with<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("PRESALE_RPC_URL") {
            self.rpc_url = v;
        }
        if let Some(v) = get("PRESALE_CHAIN_ID") {
            self.chain_id = v
                .trim()
                .parse()
                .map_err(|_| invalid("PRESALE_CHAIN_ID", v.clone()))?;
        }
        if let Some(v) = get("PRESALE_CONTRACT") {
            self.contract_address = Some(v);
        }
        if let Some(v) = get("PRESALE_OPERATOR") {
            self.operator = Some(v);
        }
        if let Some(v) = get("PRESALE_ADMINS") {
            self.admins = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(v) = get("PRESALE_CONFIRMATION_TIMEOUT_SECS") {
            self.confirmation_timeout_secs = v
                .trim()
                .parse()
                .map_err(|_| invalid("PRESALE_CONFIRMATION_TIMEOUT_SECS", v.clone()))?;
        }
        if let Some(v) = get("PRESALE_RECEIPT_POLL_MS") {
            self.receipt_poll_ms = v
                .trim()
                .parse()
                .map_err(|_| invalid("PRESALE_RECEIPT_POLL_MS", v.clone()))?;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rpc_url.trim().is_empty() {
            return Err(invalid("rpc_url", "empty"));
        }
        if self.confirmation_timeout_secs == 0 {
            return Err(invalid("confirmation_timeout_secs", "must be non-zero"));
        }
        if self.receipt_poll_ms == 0 {
            return Err(invalid("receipt_poll_ms", "must be non-zero"));
        }
        self.contract()?;
        self.operator_identity()?;
        let admins = self.authorized_set()?;
        if admins.is_empty() {
            return Err(invalid("admins", "at least one admin is required"));
        }
        Ok(())
    }

    pub fn contract(&self) -> Result<Address, ConfigError> {
        let raw = self
            .contract_address
            .as_deref()
            .ok_or_else(|| invalid("contract_address", "not set"))?;
        CallerIdentity::parse(raw)
            .map(|c| c.address())
            .map_err(|e| invalid("contract_address", e.to_string()))
    }

    pub fn operator_identity(&self) -> Result<Option<CallerIdentity>, ConfigError> {
        self.operator
            .as_deref()
            .map(|raw| CallerIdentity::parse(raw).map_err(|e| invalid("operator", e.to_string())))
            .transpose()
    }

    pub fn authorized_set(&self) -> Result<AuthorizedSet, ConfigError> {
        AuthorizedSet::parse(&self.admins).map_err(|e| invalid("admins", e.to_string()))
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    pub fn receipt_poll_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_ms)
    }
}
