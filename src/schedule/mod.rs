//! Inspection scheduling
//!
//! Derives per-tier maintenance state from the current shot total and a
//! calendar due date. Nothing here is stored: every call recomputes from its
//! inputs, so the same total and the same instant always yield the same
//! report.
//!
//! Two independent axes:
//! - **Shot tiers**: `position = total mod threshold`. A tier is due/critical
//!   near the end of each cycle and drops back to `ok` as soon as the total
//!   crosses the next multiple of its threshold.
//! - **Calendar**: the asset's `next_maintenance` date inside a look-ahead
//!   window (overdue dates count as due).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::config::MaintenancePolicy;
use crate::registry::Asset;

/// One basis point = 1/10000 of a cycle
const BPS_SCALE: u128 = 10_000;

/// A maintenance tier defined by a shot-count threshold
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectionTier {
    pub id: String,
    pub name: String,
    #[serde(alias = "shot_threshold")]
    pub shot_threshold: u64,
    /// Checklist item labels that the tier's inspection must cover
    #[serde(default, alias = "required_items")]
    pub required_items: Vec<String>,
}

impl InspectionTier {
    pub fn new(id: &str, name: &str, shot_threshold: u64, required_items: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            shot_threshold,
            required_items: required_items.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Due-ness of a tier within its current cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TierStatus {
    Ok,
    Due,
    Critical,
}

/// Derived cycle position of one tier for one asset
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectionCycleState {
    pub tier_id: String,
    pub tier_name: String,
    pub shot_threshold: u64,
    pub position: u64,
    pub remaining: u64,
    pub percent_complete: f64,
    pub cycles_completed: u64,
    pub status: TierStatus,
    /// Items to inspect when the tier fires; empty while the tier is `ok`
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub required_items: Vec<String>,
}

impl InspectionCycleState {
    pub fn is_due(&self) -> bool {
        self.status != TierStatus::Ok
    }
}

/// Calendar axis of the schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarState {
    pub next_maintenance: Option<NaiveDate>,
    /// Whole days from today to the due date (negative when overdue)
    pub days_remaining: Option<i64>,
    pub due: bool,
}

/// Full schedule evaluation for one asset at one instant
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleReport {
    pub asset_id: String,
    pub current_total: u64,
    pub evaluated_at: DateTime<Utc>,
    pub tiers: Vec<InspectionCycleState>,
    pub calendar: CalendarState,
}

impl ScheduleReport {
    /// Tiers that are due or critical
    pub fn due_tiers(&self) -> impl Iterator<Item = &InspectionCycleState> {
        self.tiers.iter().filter(|t| t.is_due())
    }
}

/// Pull-based scheduler over a fixed tier list
#[derive(Debug, Clone)]
pub struct InspectionScheduler {
    tiers: Vec<InspectionTier>,
    due_bps: u32,
    critical_bps: u32,
    calendar_window_days: i64,
}

impl InspectionScheduler {
    pub fn new(policy: &MaintenancePolicy) -> Self {
        let mut tiers = policy.tiers.clone();
        tiers.sort_by_key(|t| t.shot_threshold);
        Self {
            tiers,
            due_bps: policy.due_bps,
            critical_bps: policy.critical_bps,
            calendar_window_days: policy.calendar_window_days,
        }
    }

    /// Evaluate every tier plus the calendar axis
    pub fn evaluate(&self, asset: &Asset, current_total: u64, now: DateTime<Utc>) -> ScheduleReport {
        let tiers = self
            .tiers
            .iter()
            .map(|tier| self.cycle_state(tier, current_total))
            .collect();

        ScheduleReport {
            asset_id: asset.asset_id.clone(),
            current_total,
            evaluated_at: now,
            tiers,
            calendar: self.calendar_state(asset.next_maintenance, now),
        }
    }

    /// Cycle position of a single tier
    pub fn cycle_state(&self, tier: &InspectionTier, current_total: u64) -> InspectionCycleState {
        let threshold = tier.shot_threshold.max(1);
        let position = current_total % threshold;
        let status = self.status_for(position, threshold);

        InspectionCycleState {
            tier_id: tier.id.clone(),
            tier_name: tier.name.clone(),
            shot_threshold: threshold,
            position,
            remaining: threshold - position,
            percent_complete: position as f64 / threshold as f64,
            cycles_completed: current_total / threshold,
            status,
            required_items: if status == TierStatus::Ok {
                Vec::new()
            } else {
                tier.required_items.clone()
            },
        }
    }

    fn status_for(&self, position: u64, threshold: u64) -> TierStatus {
        // Integer comparison keeps boundaries like 95,000 / 100,000 exact.
        let scaled = position as u128 * BPS_SCALE;
        let threshold = threshold as u128;
        if scaled >= threshold * self.critical_bps as u128 {
            TierStatus::Critical
        } else if scaled >= threshold * self.due_bps as u128 {
            TierStatus::Due
        } else {
            TierStatus::Ok
        }
    }

    /// Calendar due check; `today` is the UTC date of `now`
    pub fn calendar_state(&self, next_maintenance: Option<NaiveDate>, now: DateTime<Utc>) -> CalendarState {
        match next_maintenance {
            Some(date) => {
                let days = (date - now.date_naive()).num_days();
                CalendarState {
                    next_maintenance: Some(date),
                    days_remaining: Some(days),
                    due: days <= self.calendar_window_days,
                }
            }
            None => CalendarState {
                next_maintenance: None,
                days_remaining: None,
                due: false,
            },
        }
    }
}
