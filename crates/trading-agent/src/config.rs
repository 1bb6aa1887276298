use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, ensure, Context, Result};
use resource_monitor::MonitorConfig;
use risk_manager::RiskConfig;
use serde::{Deserialize, Serialize};

/// Order in which a sweep visits the configured symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolOrder {
    Fixed,
    /// Start one symbol later on every sweep
    RoundRobin,
}

impl FromStr for SymbolOrder {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" => Ok(SymbolOrder::Fixed),
            "round_robin" | "round-robin" | "roundrobin" => Ok(SymbolOrder::RoundRobin),
            other => bail!("unknown symbol order {:?} (expected fixed or round_robin)", other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    // Sweep
    pub symbols: Vec<String>,
    pub timeframe: String,
    pub symbol_order: SymbolOrder,
    pub analysis_concurrency: usize,
    pub max_sweeps: u64,

    // Risk
    pub account_balance: Option<f64>,
    pub max_risk_per_trade_percent: f64,  // 1%
    pub max_portfolio_risk_percent: f64,  // 5%
    pub min_confidence: f64,              // 0.6

    // Host load
    pub cpu_warning_threshold: f64,
    pub cpu_critical_threshold: f64,
    pub memory_warning_threshold: f64,
    pub memory_critical_threshold: f64,
    pub resource_check_interval_seconds: u64,
    pub base_sleep_seconds: f64,

    // Collaborator timeouts
    pub fetch_timeout_seconds: u64,
    pub execution_timeout_seconds: u64,

    // Local data and paper venue
    pub data_dir: PathBuf,
    pub paper_stop_distance_percent: f64,

    pub metrics_log_interval_sweeps: u64,
}

impl AgentConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; unset keys take their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            symbols: lookup("SYMBOLS")
                .unwrap_or_else(|| "EURUSD,GBPUSD,USDJPY".to_string())
                .split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect(),
            timeframe: lookup("TIMEFRAME")
                .map(|s| s.trim().to_string())
                .unwrap_or_else(|| "M15".to_string()),
            symbol_order: parse_or(&lookup, "SYMBOL_ORDER", "fixed")?,
            analysis_concurrency: parse_or(&lookup, "ANALYSIS_CONCURRENCY", "1")?,
            max_sweeps: parse_or(&lookup, "MAX_SWEEPS", "0")?,

            account_balance: match lookup("ACCOUNT_BALANCE") {
                Some(raw) if !raw.trim().is_empty() => Some(
                    raw.trim()
                        .parse()
                        .with_context(|| format!("Invalid value for ACCOUNT_BALANCE: {:?}", raw))?,
                ),
                _ => None,
            },
            max_risk_per_trade_percent: parse_or(&lookup, "MAX_RISK_PER_TRADE", "1.0")?,
            max_portfolio_risk_percent: parse_or(&lookup, "MAX_PORTFOLIO_RISK", "5.0")?,
            min_confidence: parse_or(&lookup, "MIN_CONFIDENCE", "0.6")?,

            cpu_warning_threshold: parse_or(&lookup, "CPU_WARNING_THRESHOLD", "70")?,
            cpu_critical_threshold: parse_or(&lookup, "CPU_CRITICAL_THRESHOLD", "85")?,
            memory_warning_threshold: parse_or(&lookup, "MEMORY_WARNING_THRESHOLD", "80")?,
            memory_critical_threshold: parse_or(&lookup, "MEMORY_CRITICAL_THRESHOLD", "90")?,
            resource_check_interval_seconds: parse_or(&lookup, "RESOURCE_CHECK_INTERVAL", "30")?,
            base_sleep_seconds: parse_or(&lookup, "BASE_SLEEP", "10")?,

            fetch_timeout_seconds: parse_or(&lookup, "FETCH_TIMEOUT", "10")?,
            execution_timeout_seconds: parse_or(&lookup, "EXECUTION_TIMEOUT", "10")?,

            data_dir: PathBuf::from(lookup("DATA_DIR").unwrap_or_else(|| "data".to_string())),
            paper_stop_distance_percent: parse_or(&lookup, "PAPER_STOP_DISTANCE_PERCENT", "0.5")?,

            metrics_log_interval_sweeps: parse_or(&lookup, "METRICS_LOG_INTERVAL", "10")?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(!self.symbols.is_empty(), "SYMBOLS must name at least one symbol");
        ensure!(!self.timeframe.is_empty(), "TIMEFRAME must not be empty");
        ensure!(self.analysis_concurrency >= 1, "ANALYSIS_CONCURRENCY must be at least 1");

        if let Some(balance) = self.account_balance {
            ensure!(
                balance.is_finite() && balance > 0.0,
                "ACCOUNT_BALANCE must be positive, got {}",
                balance
            );
        }
        ensure!(
            self.max_risk_per_trade_percent > 0.0 && self.max_risk_per_trade_percent <= 100.0,
            "MAX_RISK_PER_TRADE must be in (0, 100], got {}",
            self.max_risk_per_trade_percent
        );
        ensure!(
            self.max_portfolio_risk_percent > 0.0 && self.max_portfolio_risk_percent <= 100.0,
            "MAX_PORTFOLIO_RISK must be in (0, 100], got {}",
            self.max_portfolio_risk_percent
        );
        ensure!(
            (0.0..=1.0).contains(&self.min_confidence),
            "MIN_CONFIDENCE must be in [0, 1], got {}",
            self.min_confidence
        );

        check_thresholds("CPU", self.cpu_warning_threshold, self.cpu_critical_threshold)?;
        check_thresholds("MEMORY", self.memory_warning_threshold, self.memory_critical_threshold)?;

        ensure!(
            self.base_sleep_seconds.is_finite() && self.base_sleep_seconds > 0.0,
            "BASE_SLEEP must be positive, got {}",
            self.base_sleep_seconds
        );
        ensure!(self.fetch_timeout_seconds > 0, "FETCH_TIMEOUT must be positive");
        ensure!(self.execution_timeout_seconds > 0, "EXECUTION_TIMEOUT must be positive");
        ensure!(
            self.paper_stop_distance_percent > 0.0 && self.paper_stop_distance_percent < 100.0,
            "PAPER_STOP_DISTANCE_PERCENT must be in (0, 100), got {}",
            self.paper_stop_distance_percent
        );

        Ok(())
    }

    pub fn risk_config(&self) -> RiskConfig {
        RiskConfig {
            max_risk_per_trade_percent: self.max_risk_per_trade_percent,
            max_portfolio_risk_percent: self.max_portfolio_risk_percent,
            min_confidence: self.min_confidence,
        }
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            cpu_warning_threshold: self.cpu_warning_threshold,
            cpu_critical_threshold: self.cpu_critical_threshold,
            memory_warning_threshold: self.memory_warning_threshold,
            memory_critical_threshold: self.memory_critical_threshold,
            check_interval_secs: self.resource_check_interval_seconds,
            base_sleep_secs: self.base_sleep_seconds,
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_seconds)
    }

    pub fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.execution_timeout_seconds)
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key).unwrap_or_else(|| default.to_string());
    raw.trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid value for {}: {:?} ({})", key, raw, e))
}

fn check_thresholds(name: &str, warning: f64, critical: f64) -> Result<()> {
    ensure!(
        warning > 0.0 && warning < critical && critical <= 100.0,
        "{name} thresholds must satisfy 0 < warning < critical <= 100 (warning={warning}, critical={critical})"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AgentConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AgentConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.symbols, vec!["EURUSD", "GBPUSD", "USDJPY"]);
        assert_eq!(config.timeframe, "M15");
        assert_eq!(config.symbol_order, SymbolOrder::Fixed);
        assert_eq!(config.analysis_concurrency, 1);
        assert!(config.account_balance.is_none());
        assert_eq!(config.max_risk_per_trade_percent, 1.0);
        assert_eq!(config.max_portfolio_risk_percent, 5.0);
        assert_eq!(config.min_confidence, 0.6);
        assert_eq!(config.resource_check_interval_seconds, 30);
        assert_eq!(config.base_sleep_seconds, 10.0);
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.max_sweeps, 0);

        let monitor = config.monitor_config();
        assert_eq!(monitor.cpu_critical_threshold, 85.0);
        assert_eq!(monitor.memory_warning_threshold, 80.0);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = config_from(&[
            ("SYMBOLS", " eurusd, xauusd ,,"),
            ("SYMBOL_ORDER", "round_robin"),
            ("ACCOUNT_BALANCE", "25000"),
            ("ANALYSIS_CONCURRENCY", "4"),
            ("MIN_CONFIDENCE", "0.7"),
        ])
        .unwrap();

        assert_eq!(config.symbols, vec!["EURUSD", "XAUUSD"]);
        assert_eq!(config.symbol_order, SymbolOrder::RoundRobin);
        assert_eq!(config.account_balance, Some(25_000.0));
        assert_eq!(config.analysis_concurrency, 4);
        assert_eq!(config.risk_config().min_confidence, 0.7);
    }

    #[test]
    fn malformed_values_are_reported_by_key() {
        let err = config_from(&[("BASE_SLEEP", "soon")]).unwrap_err();
        assert!(err.to_string().contains("BASE_SLEEP"));

        assert!(config_from(&[("SYMBOL_ORDER", "random")]).is_err());
    }

    #[test]
    fn inconsistent_values_fail_validation() {
        assert!(config_from(&[("SYMBOLS", " , ")]).is_err());
        assert!(config_from(&[("CPU_WARNING_THRESHOLD", "90")]).is_err());
        assert!(config_from(&[("MEMORY_CRITICAL_THRESHOLD", "120")]).is_err());
        assert!(config_from(&[("MIN_CONFIDENCE", "1.5")]).is_err());
        assert!(config_from(&[("ANALYSIS_CONCURRENCY", "0")]).is_err());
        assert!(config_from(&[("ACCOUNT_BALANCE", "-5")]).is_err());
        assert!(config_from(&[("EXECUTION_TIMEOUT", "0")]).is_err());
    }
}
