//! Configuration for Moldkeeper
//!
//! CLI arguments and environment variable handling using clap, plus an
//! optional TOML maintenance policy file for tier definitions and alert
//! thresholds.

use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::schedule::InspectionTier;
use crate::types::KeeperError;

/// Moldkeeper - maintenance state service for injection molds
#[derive(Parser, Debug, Clone)]
#[command(name = "moldkeeper")]
#[command(about = "Shot ledger, inspection scheduling and checklist approval for tooling assets")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Enable development mode (default secrets, in-memory fallback storage)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// MongoDB connection URI. Without it records are kept in memory.
    #[arg(long, env = "MONGODB_URI")]
    pub mongodb_uri: Option<String>,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "moldkeeper")]
    pub mongodb_db: String,

    /// Secret for administrator credentials (required in production)
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// Administrator credential expiry in seconds
    #[arg(long, env = "JWT_EXPIRY_SECONDS", default_value = "3600")]
    pub jwt_expiry_seconds: u64,

    /// Secret for asset session tokens (required in production)
    #[arg(long, env = "SESSION_SECRET")]
    pub session_secret: Option<String>,

    /// Asset session token lifetime in seconds
    #[arg(long, env = "SESSION_TTL_SECONDS", default_value = "1800")]
    pub session_ttl_seconds: u64,

    /// Require an operator credential on POST /session. Off, scanning the
    /// mold code is the only proof of presence.
    #[arg(long, env = "SESSION_REQUIRES_CREDENTIAL", default_value = "false")]
    pub session_requires_credential: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Request timeout in milliseconds
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value = "30000")]
    pub request_timeout_ms: u64,

    /// Largest accepted request body in bytes
    #[arg(long, env = "MAX_BODY_BYTES", default_value = "1048576")]
    pub max_body_bytes: usize,

    /// Upper bound for shot history page size
    #[arg(long, env = "HISTORY_MAX_LIMIT", default_value = "200")]
    pub history_max_limit: usize,

    /// Maintenance policy overrides
    #[command(flatten)]
    pub policy: PolicyArgs,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Maintenance policy overrides. Anything set here wins over the policy file.
#[derive(Parser, Debug, Clone, Default)]
pub struct PolicyArgs {
    /// TOML file with `[[tiers]]` and threshold settings
    #[arg(long, env = "POLICY_FILE")]
    pub policy_file: Option<PathBuf>,

    /// Tier "due" threshold in basis points of the cycle (9000 = 90%)
    #[arg(long, env = "DUE_BPS")]
    pub due_bps: Option<u32>,

    /// Tier "critical" threshold in basis points of the cycle
    #[arg(long, env = "CRITICAL_BPS")]
    pub critical_bps: Option<u32>,

    /// Calendar look-ahead window in days
    #[arg(long, env = "CALENDAR_WINDOW_DAYS")]
    pub calendar_window_days: Option<i64>,

    /// Calendar alerts at or below this many days are high severity
    #[arg(long, env = "CALENDAR_URGENT_DAYS")]
    pub calendar_urgent_days: Option<i64>,

    /// Refuse checklist submission while required items are unchecked
    #[arg(long, env = "REQUIRE_COMPLETE_CHECKLIST")]
    pub require_complete_checklist: Option<bool>,
}

impl Args {
    /// Get effective administrator JWT secret (uses default in dev mode)
    pub fn jwt_secret(&self) -> Result<String, KeeperError> {
        match (&self.jwt_secret, self.dev_mode) {
            (Some(secret), _) => Ok(secret.clone()),
            (None, true) => Ok("dev-only-insecure-admin-secret-0123456789".to_string()),
            (None, false) => Err(KeeperError::Config(
                "JWT_SECRET is required in production mode".into(),
            )),
        }
    }

    /// Get effective session token secret (uses default in dev mode)
    pub fn session_secret(&self) -> Result<String, KeeperError> {
        match (&self.session_secret, self.dev_mode) {
            (Some(secret), _) => Ok(secret.clone()),
            (None, true) => Ok("dev-only-insecure-session-secret-0123456789".to_string()),
            (None, false) => Err(KeeperError::Config(
                "SESSION_SECRET is required in production mode".into(),
            )),
        }
    }

    /// Resolve the maintenance policy: file (or defaults) plus CLI overrides
    pub fn maintenance_policy(&self) -> Result<MaintenancePolicy, KeeperError> {
        let mut policy = match &self.policy.policy_file {
            Some(path) => MaintenancePolicy::from_file(path)?,
            None => MaintenancePolicy::default(),
        };

        if let Some(bps) = self.policy.due_bps {
            policy.due_bps = bps;
        }
        if let Some(bps) = self.policy.critical_bps {
            policy.critical_bps = bps;
        }
        if let Some(days) = self.policy.calendar_window_days {
            policy.calendar_window_days = days;
        }
        if let Some(days) = self.policy.calendar_urgent_days {
            policy.calendar_urgent_days = days;
        }
        if let Some(strict) = self.policy.require_complete_checklist {
            policy.require_complete_checklist = strict;
        }

        policy.validate()?;
        Ok(policy)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode {
            if self.jwt_secret.is_none() {
                return Err("JWT_SECRET is required in production mode".to_string());
            }
            if self.session_secret.is_none() {
                return Err("SESSION_SECRET is required in production mode".to_string());
            }
        }

        if self.jwt_secret.is_some() && self.jwt_secret == self.session_secret {
            return Err("SESSION_SECRET must differ from JWT_SECRET".to_string());
        }

        if self.session_ttl_seconds == 0 {
            return Err("SESSION_TTL_SECONDS must be greater than zero".to_string());
        }

        if self.max_body_bytes == 0 {
            return Err("MAX_BODY_BYTES must be greater than zero".to_string());
        }

        if self.history_max_limit == 0 {
            return Err("HISTORY_MAX_LIMIT must be greater than zero".to_string());
        }

        self.maintenance_policy().map_err(|e| e.to_string())?;

        Ok(())
    }
}

/// Tier definitions and alert thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenancePolicy {
    /// Shot-based maintenance tiers, evaluated independently
    #[serde(default = "default_tiers")]
    pub tiers: Vec<InspectionTier>,

    /// Tier is due at this share of its cycle (basis points)
    #[serde(default = "default_due_bps")]
    pub due_bps: u32,

    /// Tier is critical at this share of its cycle (basis points)
    #[serde(default = "default_critical_bps")]
    pub critical_bps: u32,

    /// Calendar due date look-ahead window in days
    #[serde(default = "default_calendar_window_days")]
    pub calendar_window_days: i64,

    /// Calendar alerts with this many days or fewer left are high severity
    #[serde(default = "default_calendar_urgent_days")]
    pub calendar_urgent_days: i64,

    /// Life-limit warning at this share of the asset's max life (basis points)
    #[serde(default = "default_life_warning_bps")]
    pub life_warning_bps: u32,

    /// Whether checklist submission requires every required item checked
    #[serde(default)]
    pub require_complete_checklist: bool,
}

// Defaults
fn default_due_bps() -> u32 { 9_000 }
fn default_critical_bps() -> u32 { 9_500 }
fn default_calendar_window_days() -> i64 { 3 }
fn default_calendar_urgent_days() -> i64 { 1 }
fn default_life_warning_bps() -> u32 { 9_000 }

fn default_tiers() -> Vec<InspectionTier> {
    vec![
        InspectionTier::new(
            "tier-1",
            "Routine inspection",
            100_000,
            &["Parting line cleaning", "Vent cleaning", "Ejector pin lubrication"],
        ),
        InspectionTier::new(
            "tier-2",
            "Intermediate maintenance",
            500_000,
            &["Cooling channel flush", "Slide wear check", "Guide pin and bushing check"],
        ),
        InspectionTier::new(
            "tier-3",
            "Overhaul",
            1_000_000,
            &["Full disassembly", "Cavity surface inspection", "Hot runner check"],
        ),
    ]
}

impl Default for MaintenancePolicy {
    fn default() -> Self {
        Self {
            tiers: default_tiers(),
            due_bps: default_due_bps(),
            critical_bps: default_critical_bps(),
            calendar_window_days: default_calendar_window_days(),
            calendar_urgent_days: default_calendar_urgent_days(),
            life_warning_bps: default_life_warning_bps(),
            require_complete_checklist: false,
        }
    }
}

impl MaintenancePolicy {
    /// Load a policy from a TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, KeeperError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            KeeperError::Config(format!("Failed to read policy file {}: {}", path.display(), e))
        })?;
        Self::from_toml(&raw)
    }

    /// Parse a policy from TOML text
    pub fn from_toml(raw: &str) -> Result<Self, KeeperError> {
        toml::from_str(raw).map_err(|e| KeeperError::Config(format!("Invalid policy file: {}", e)))
    }

    /// Check internal consistency and order tiers by threshold
    pub fn validate(&mut self) -> Result<(), KeeperError> {
        if self.tiers.is_empty() {
            return Err(KeeperError::Config("At least one inspection tier is required".into()));
        }

        let mut seen = HashSet::new();
        for tier in &self.tiers {
            if tier.shot_threshold == 0 {
                return Err(KeeperError::Config(format!(
                    "Tier {} has a zero shot threshold",
                    tier.id
                )));
            }
            if !seen.insert(tier.id.as_str()) {
                return Err(KeeperError::Config(format!("Duplicate tier id {}", tier.id)));
            }
        }

        if self.due_bps > self.critical_bps || self.critical_bps > 10_000 {
            return Err(KeeperError::Config(
                "Thresholds must satisfy due_bps <= critical_bps <= 10000".into(),
            ));
        }

        if self.calendar_window_days < 0 || self.calendar_urgent_days > self.calendar_window_days {
            return Err(KeeperError::Config(
                "Calendar windows must satisfy 0 <= urgent <= window".into(),
            ));
        }

        self.tiers.sort_by_key(|t| t.shot_threshold);
        Ok(())
    }
}
