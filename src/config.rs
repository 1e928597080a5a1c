//! Runtime configuration, read from `LEDGER_*` environment variables.

use std::net::SocketAddr;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Listen address for the HTTP surface.
    pub addr: SocketAddr,
    /// Account that collects premiums and pays claims.
    pub pool_account: String,
    /// Smallest premium accepted at issuance.
    pub min_premium: f64,
    /// Coverage limit = premium * multiplier.
    pub coverage_multiplier: f64,
    /// Payout used when a matched policy carries no limit.
    pub default_payout: f64,
    /// Proof stored in issuance blocks.
    pub issue_proof: u64,
    /// Proof stored in payout blocks.
    pub claim_proof: u64,
    /// Default log filter when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            pool_account: "Insurance_Pool".to_string(),
            min_premium: 50.0,
            coverage_multiplier: 10.0,
            default_payout: 1000.0,
            issue_proof: 200,
            claim_proof: 300,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let cfg = Self {
            addr: parse_or(&lookup, "LEDGER_ADDR", defaults.addr)?,
            pool_account: lookup("LEDGER_POOL_ACCOUNT").unwrap_or(defaults.pool_account),
            min_premium: parse_or(&lookup, "LEDGER_MIN_PREMIUM", defaults.min_premium)?,
            coverage_multiplier: parse_or(
                &lookup,
                "LEDGER_COVERAGE_MULTIPLIER",
                defaults.coverage_multiplier,
            )?,
            default_payout: parse_or(&lookup, "LEDGER_DEFAULT_PAYOUT", defaults.default_payout)?,
            issue_proof: parse_or(&lookup, "LEDGER_ISSUE_PROOF", defaults.issue_proof)?,
            claim_proof: parse_or(&lookup, "LEDGER_CLAIM_PROOF", defaults.claim_proof)?,
            log_level: lookup("LEDGER_LOG").unwrap_or(defaults.log_level),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            !self.pool_account.trim().is_empty(),
            "LEDGER_POOL_ACCOUNT must not be empty"
        );
        for (key, value) in [
            ("LEDGER_MIN_PREMIUM", self.min_premium),
            ("LEDGER_COVERAGE_MULTIPLIER", self.coverage_multiplier),
            ("LEDGER_DEFAULT_PAYOUT", self.default_payout),
        ] {
            anyhow::ensure!(
                value.is_finite() && value >= 0.0,
                "{key} must be a non-negative number, got {value}"
            );
        }
        Ok(())
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid {key}: {raw:?}")),
        None => Ok(default),
    }
}
