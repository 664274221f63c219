//! Maintenance notifications
//!
//! Notifications are derived, never stored: each request recomputes them
//! from the ledger total, the asset's calendar date and its open repairs.
//! Identity is a SHA-256 digest of `(asset_id, kind, reference)`, so the
//! same state always yields the same ids and a resolved condition simply
//! disappears from the next evaluation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::config::MaintenancePolicy;
use crate::db::Store;
use crate::registry::Asset;
use crate::repair::RepairReport;
use crate::schedule::{InspectionScheduler, ScheduleReport, TierStatus};
use crate::types::{KeeperError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationKind {
    TierDue,
    TierCritical,
    CalendarDue,
    UrgentRepair,
    LifeLimit,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TierDue => "tier-due",
            Self::TierCritical => "tier-critical",
            Self::CalendarDue => "calendar-due",
            Self::UrgentRepair => "urgent-repair",
            Self::LifeLimit => "life-limit",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub asset_id: String,
    pub kind: NotificationKind,
    pub severity: Severity,
    pub message: String,
    pub generated_at: DateTime<Utc>,
    /// Tier id, repair id, due date or `life`
    pub reference: String,
}

impl Notification {
    fn new(
        asset_id: &str,
        kind: NotificationKind,
        reference: String,
        severity: Severity,
        message: String,
        generated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: notification_id(asset_id, kind, &reference),
            asset_id: asset_id.to_string(),
            kind,
            severity,
            message,
            generated_at,
            reference,
        }
    }

    fn dedup_key(&self) -> (String, NotificationKind, String) {
        (self.asset_id.clone(), self.kind, self.reference.clone())
    }
}

/// Deterministic id for a dedup key
pub fn notification_id(asset_id: &str, kind: NotificationKind, reference: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(asset_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(kind.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(reference.as_bytes());
    hex::encode(hasher.finalize())
}

/// Turns schedule state and open repairs into ranked alerts
#[derive(Clone)]
pub struct NotificationEngine {
    store: Arc<dyn Store>,
    scheduler: Arc<InspectionScheduler>,
    calendar_urgent_days: i64,
    life_warning_bps: u32,
}

impl NotificationEngine {
    pub fn new(
        store: Arc<dyn Store>,
        scheduler: Arc<InspectionScheduler>,
        policy: &MaintenancePolicy,
    ) -> Self {
        Self {
            store,
            scheduler,
            calendar_urgent_days: policy.calendar_urgent_days,
            life_warning_bps: policy.life_warning_bps,
        }
    }

    /// Current notifications for one asset, highest severity first
    pub async fn for_asset(&self, asset_id: &str, now: DateTime<Utc>) -> Result<Vec<Notification>> {
        let asset = self
            .store
            .get_asset(asset_id)
            .await?
            .ok_or_else(|| KeeperError::NotFound(format!("asset {}", asset_id)))?;
        let total = self
            .store
            .latest_shot(asset_id)
            .await?
            .map(|e| e.total_after)
            .unwrap_or(0);
        let report = self.scheduler.evaluate(&asset, total, now);
        let repairs = self.store.repairs_for_asset(asset_id).await?;

        let notifications = self.generate(&asset, &report, &repairs);
        debug!(asset_id = %asset_id, count = notifications.len(), "Notifications evaluated");
        Ok(notifications)
    }

    /// Pure generation step: collapse duplicate keys, then rank
    pub fn generate(
        &self,
        asset: &Asset,
        report: &ScheduleReport,
        repairs: &[RepairReport],
    ) -> Vec<Notification> {
        let now = report.evaluated_at;
        let asset_id = asset.asset_id.as_str();
        let mut out = Vec::new();

        for tier in report.due_tiers() {
            let (kind, severity) = match tier.status {
                TierStatus::Critical => (NotificationKind::TierCritical, Severity::High),
                _ => (NotificationKind::TierDue, Severity::Medium),
            };
            out.push(Notification::new(
                asset_id,
                kind,
                tier.tier_id.clone(),
                severity,
                format!(
                    "{}: {} shots until {} ({:.1}% of cycle)",
                    asset_id,
                    tier.remaining,
                    tier.tier_name,
                    tier.percent_complete * 100.0
                ),
                now,
            ));
        }

        if let (true, Some(date), Some(days)) = (
            report.calendar.due,
            report.calendar.next_maintenance,
            report.calendar.days_remaining,
        ) {
            let severity = if days <= self.calendar_urgent_days {
                Severity::High
            } else {
                Severity::Medium
            };
            let message = if days < 0 {
                format!("{}: scheduled maintenance overdue since {}", asset_id, date)
            } else {
                format!("{}: scheduled maintenance in {} day(s) on {}", asset_id, days, date)
            };
            out.push(Notification::new(
                asset_id,
                NotificationKind::CalendarDue,
                date.to_string(),
                severity,
                message,
                now,
            ));
        }

        for repair in repairs.iter().filter(|r| r.is_urgent_open()) {
            out.push(Notification::new(
                asset_id,
                NotificationKind::UrgentRepair,
                repair.repair_id.clone(),
                Severity::High,
                format!("{}: urgent repair open: {}", asset_id, repair.title),
                repair.reported_at,
            ));
        }

        if asset.max_life_shots > 0 {
            let used_bps = u128::from(report.current_total) * 10_000 / u128::from(asset.max_life_shots);
            if used_bps >= u128::from(self.life_warning_bps) {
                let severity = if report.current_total >= asset.max_life_shots {
                    Severity::High
                } else {
                    Severity::Medium
                };
                out.push(Notification::new(
                    asset_id,
                    NotificationKind::LifeLimit,
                    "life".to_string(),
                    severity,
                    format!(
                        "{}: {} of {} rated shots used",
                        asset_id, report.current_total, asset.max_life_shots
                    ),
                    now,
                ));
            }
        }

        rank(out)
    }
}

/// Collapse duplicate keys (first wins) and order by severity, recency, key
fn rank(notifications: Vec<Notification>) -> Vec<Notification> {
    let mut unique = BTreeMap::new();
    for n in notifications {
        unique.entry(n.dedup_key()).or_insert(n);
    }

    let mut ranked: Vec<Notification> = unique.into_values().collect();
    ranked.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| b.generated_at.cmp(&a.generated_at))
            .then_with(|| a.dedup_key().cmp(&b.dedup_key()))
    });
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repair::{RepairPriority, RepairStatus};
    use chrono::{NaiveDate, TimeZone};

    fn engine() -> NotificationEngine {
        let policy = MaintenancePolicy::default();
        let store: Arc<dyn Store> = Arc::new(crate::db::MemoryStore::new());
        NotificationEngine::new(store, Arc::new(InspectionScheduler::new(&policy)), &policy)
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()
    }

    fn asset(next: Option<NaiveDate>, max_life: u64) -> Asset {
        Asset {
            asset_id: "M-2024-001".into(),
            part_number: "PN-1".into(),
            cavity_count: 2,
            max_life_shots: max_life,
            next_maintenance: next,
            ..Asset::default()
        }
    }

    fn repair(id: &str, priority: RepairPriority, status: RepairStatus) -> RepairReport {
        RepairReport {
            repair_id: id.into(),
            asset_id: "M-2024-001".into(),
            title: "Cracked insert".into(),
            description: None,
            priority,
            status,
            reported_at: now() - chrono::Duration::hours(3),
            reported_by: "op".into(),
            updated_at: now(),
            version: 1,
        }
    }

    fn notifications(
        asset: &Asset,
        total: u64,
        repairs: &[RepairReport],
    ) -> Vec<Notification> {
        let e = engine();
        let report = e.scheduler.evaluate(asset, total, now());
        e.generate(asset, &report, repairs)
    }

    #[test]
    fn test_quiet_asset_has_no_notifications() {
        assert!(notifications(&asset(None, 0), 10_000, &[]).is_empty());
    }

    #[test]
    fn test_tier_due_then_critical() {
        let a = asset(None, 0);
        let due = notifications(&a, 90_000, &[]);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].kind, NotificationKind::TierDue);
        assert_eq!(due[0].severity, Severity::Medium);
        assert_eq!(due[0].reference, "tier-1");

        let critical = notifications(&a, 95_000, &[]);
        assert_eq!(critical.len(), 1);
        assert_eq!(critical[0].kind, NotificationKind::TierCritical);
        assert_eq!(critical[0].severity, Severity::High);
        assert_ne!(due[0].id, critical[0].id);
    }

    #[test]
    fn test_regeneration_is_idempotent() {
        let a = asset(NaiveDate::from_ymd_opt(2024, 6, 2), 0);
        let repairs = [repair("rep_1", RepairPriority::Urgent, RepairStatus::Reported)];
        let first = notifications(&a, 96_000, &repairs);
        let second = notifications(&a, 96_000, &repairs);
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
        assert_eq!(
            first[0].id,
            notification_id(&first[0].asset_id, first[0].kind, &first[0].reference)
        );
        assert_eq!(first[0].id.len(), 64);
    }

    #[test]
    fn test_ordering_by_severity_then_recency() {
        let a = asset(NaiveDate::from_ymd_opt(2024, 6, 3), 0);
        let repairs = [
            repair("rep_1", RepairPriority::Urgent, RepairStatus::InProgress),
            repair("rep_2", RepairPriority::Normal, RepairStatus::Reported),
            repair("rep_3", RepairPriority::Urgent, RepairStatus::Completed),
        ];
        let list = notifications(&a, 91_000, &repairs);
        let kinds: Vec<_> = list.iter().map(|n| n.kind).collect();
        // calendar has 2 days left: inside the window but not urgent, so it
        // ties with the tier alert and falls back to key order
        assert_eq!(
            kinds,
            vec![
                NotificationKind::UrgentRepair,
                NotificationKind::TierDue,
                NotificationKind::CalendarDue,
            ]
        );
        assert_eq!(list[0].reference, "rep_1");
        assert_eq!(list[2].severity, Severity::Medium);
    }

    #[test]
    fn test_calendar_urgency_and_overdue() {
        let tomorrow = asset(NaiveDate::from_ymd_opt(2024, 6, 2), 0);
        let list = notifications(&tomorrow, 0, &[]);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].severity, Severity::High);

        let overdue = asset(NaiveDate::from_ymd_opt(2024, 5, 20), 0);
        let list = notifications(&overdue, 0, &[]);
        assert_eq!(list[0].kind, NotificationKind::CalendarDue);
        assert!(list[0].message.contains("overdue"));
    }

    #[test]
    fn test_life_limit() {
        let a = asset(None, 1_000_000);
        assert!(notifications(&a, 899_999, &[])
            .iter()
            .all(|n| n.kind != NotificationKind::LifeLimit));

        let warn = notifications(&a, 900_000, &[]);
        let life = warn.iter().find(|n| n.kind == NotificationKind::LifeLimit).unwrap();
        assert_eq!(life.severity, Severity::Medium);

        let spent = notifications(&a, 1_000_000, &[]);
        let life = spent.iter().find(|n| n.kind == NotificationKind::LifeLimit).unwrap();
        assert_eq!(life.severity, Severity::High);
    }

    #[test]
    fn test_duplicate_keys_collapse() {
        let n = Notification::new(
            "M-1",
            NotificationKind::TierDue,
            "tier-1".into(),
            Severity::Medium,
            "a".into(),
            now(),
        );
        let ranked = rank(vec![n.clone(), n.clone()]);
        assert_eq!(ranked.len(), 1);
    }
}
