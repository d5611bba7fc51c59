//! Per-entity outcomes aggregated into device and run reports

use chrono::{DateTime, Utc};
use fleetsync_core::{EntityKind, NaturalKey, RecordId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use uuid::Uuid;

use crate::reconciler::{Action, Reconciled};

/// What happened to one entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum Outcome {
    Created,
    Updated,
    Unchanged,
    Failed { reason: String },
    Skipped { reason: String },
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
            Self::Failed { .. } => "failed",
            Self::Skipped { .. } => "skipped",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::Skipped { .. })
    }
}

impl From<Action> for Outcome {
    fn from(action: Action) -> Self {
        match action {
            Action::Created => Self::Created,
            Action::Updated => Self::Updated,
            Action::Unchanged => Self::Unchanged,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityOutcome {
    pub kind: EntityKind,
    /// Natural key, rendered
    pub key: String,
    #[serde(flatten)]
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub record_id: Option<RecordId>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub duplicates_removed: Vec<RecordId>,
    /// Non-fatal problems, such as duplicates that could not be deleted
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub warnings: Vec<String>,
}

impl EntityOutcome {
    fn new(key: &NaturalKey, outcome: Outcome) -> Self {
        Self::labelled(key.kind, key, outcome)
    }

    fn labelled(kind: EntityKind, key: impl ToString, outcome: Outcome) -> Self {
        Self {
            kind,
            key: key.to_string(),
            outcome,
            record_id: None,
            duplicates_removed: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn reconciled(key: &NaturalKey, reconciled: &Reconciled) -> Self {
        let mut entity = Self::new(key, reconciled.action.into());
        entity.record_id = Some(reconciled.record.id.clone());
        entity.duplicates_removed = reconciled.duplicates_removed.clone();
        entity.warnings = reconciled
            .dedup_failures
            .iter()
            .map(|(id, reason)| format!("duplicate {} not removed: {}", id, reason))
            .collect();
        entity
    }

    pub fn failed(key: &NaturalKey, reason: impl ToString) -> Self {
        Self::new(
            key,
            Outcome::Failed {
                reason: reason.to_string(),
            },
        )
    }

    /// Skipped entities may not have a resolvable key yet (an interface
    /// whose device was never reconciled), so any label is accepted
    pub fn skipped(kind: EntityKind, key: impl ToString, reason: impl ToString) -> Self {
        Self::labelled(
            kind,
            key,
            Outcome::Skipped {
                reason: reason.to_string(),
            },
        )
    }
}

/// Outcome counts for one entity kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindSummary {
    pub created: u32,
    pub updated: u32,
    pub unchanged: u32,
    pub failed: u32,
    pub skipped: u32,
}

impl KindSummary {
    pub fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Created => self.created += 1,
            Outcome::Updated => self.updated += 1,
            Outcome::Unchanged => self.unchanged += 1,
            Outcome::Failed { .. } => self.failed += 1,
            Outcome::Skipped { .. } => self.skipped += 1,
        }
    }

    pub fn merge(&mut self, other: &KindSummary) {
        self.created += other.created;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }

    /// Creates plus updates
    pub fn writes(&self) -> u32 {
        self.created + self.updated
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceSyncStatus {
    /// Every entity reconciled
    Succeeded,
    /// Some entities failed or were skipped
    Partial,
    /// The pipeline aborted
    Failed,
}

impl std::fmt::Display for DeviceSyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Succeeded => "succeeded",
            Self::Partial => "partial",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Everything that happened while syncing one device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceReport {
    pub device: String,
    pub status: DeviceSyncStatus,
    /// Reason the pipeline aborted
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
    /// Major software version the device reported
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub major_version: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub entities: Vec<EntityOutcome>,
}

impl DeviceReport {
    pub fn new(device: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            device: device.into(),
            status: DeviceSyncStatus::Succeeded,
            error: None,
            major_version: None,
            started_at: now,
            finished_at: now,
            entities: Vec::new(),
        }
    }

    /// A device that failed before its pipeline could start
    pub fn failed(device: impl Into<String>, error: impl ToString) -> Self {
        let mut report = Self::new(device);
        report.abort(error);
        report.finish()
    }

    pub fn push(&mut self, entity: EntityOutcome) {
        self.entities.push(entity);
    }

    pub fn abort(&mut self, error: impl ToString) {
        self.error = Some(error.to_string());
    }

    /// Stamp the finish time and settle the status
    pub fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self.status = if self.error.is_some() {
            DeviceSyncStatus::Failed
        } else if self.entities.iter().any(|e| e.outcome.is_failure()) {
            DeviceSyncStatus::Partial
        } else {
            DeviceSyncStatus::Succeeded
        };
        self
    }

    pub fn summary(&self) -> BTreeMap<EntityKind, KindSummary> {
        let mut summary = BTreeMap::new();
        for entity in &self.entities {
            summary
                .entry(entity.kind)
                .or_insert_with(KindSummary::default)
                .record(&entity.outcome);
        }
        summary
    }

    pub fn outcomes(&self, kind: EntityKind) -> impl Iterator<Item = &EntityOutcome> {
        self.entities.iter().filter(move |e| e.kind == kind)
    }
}

/// Result of one sync run across all devices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    pub devices: Vec<DeviceReport>,
    pub totals: BTreeMap<EntityKind, KindSummary>,
}

impl RunReport {
    pub fn new(started_at: DateTime<Utc>, devices: Vec<DeviceReport>, dry_run: bool) -> Self {
        let mut totals: BTreeMap<EntityKind, KindSummary> = BTreeMap::new();
        for device in &devices {
            for (kind, summary) in device.summary() {
                totals.entry(kind).or_default().merge(&summary);
            }
        }
        Self {
            id: Uuid::new_v4(),
            started_at,
            finished_at: Utc::now(),
            dry_run,
            devices,
            totals,
        }
    }

    pub fn count(&self, status: DeviceSyncStatus) -> usize {
        self.devices.iter().filter(|d| d.status == status).count()
    }

    pub fn device(&self, name: &str) -> Option<&DeviceReport> {
        self.devices.iter().find(|d| d.device == name)
    }

    /// Plain-text table: one row per device and entity kind, then failures
    pub fn render_table(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:<24} {:<10} {:<12} {:>7} {:>7} {:>9} {:>6} {:>7}",
            "DEVICE", "STATUS", "KIND", "CREATED", "UPDATED", "UNCHANGED", "FAILED", "SKIPPED"
        );
        for device in &self.devices {
            let summary = device.summary();
            if summary.is_empty() {
                let _ = writeln!(out, "{:<24} {:<10} {:<12}", device.device, device.status, "-");
            }
            for (kind, counts) in summary {
                let _ = writeln!(
                    out,
                    "{:<24} {:<10} {:<12} {:>7} {:>7} {:>9} {:>6} {:>7}",
                    device.device,
                    device.status,
                    kind,
                    counts.created,
                    counts.updated,
                    counts.unchanged,
                    counts.failed,
                    counts.skipped
                );
            }
        }

        let mut problems = Vec::new();
        for device in &self.devices {
            if let Some(error) = &device.error {
                problems.push(format!("{}: {}", device.device, error));
            }
            for entity in &device.entities {
                if let Outcome::Failed { reason } = &entity.outcome {
                    problems.push(format!("{} {}: {}", device.device, entity.key, reason));
                }
                for warning in &entity.warnings {
                    problems.push(format!("{} {}: {}", device.device, entity.key, warning));
                }
            }
        }
        if !problems.is_empty() {
            out.push('\n');
            for problem in problems {
                let _ = writeln!(out, "  ! {}", problem);
            }
        }

        let _ = writeln!(
            out,
            "\n{} devices: {} succeeded, {} partial, {} failed{}",
            self.devices.len(),
            self.count(DeviceSyncStatus::Succeeded),
            self.count(DeviceSyncStatus::Partial),
            self.count(DeviceSyncStatus::Failed),
            if self.dry_run { " (dry run)" } else { "" }
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn device_with(outcomes: Vec<EntityOutcome>) -> DeviceReport {
        let mut report = DeviceReport::new("hq-router1");
        for outcome in outcomes {
            report.push(outcome);
        }
        report.finish()
    }

    #[test]
    fn test_device_status() {
        let site = NaturalKey::site("hq");
        let ok = device_with(vec![EntityOutcome::new(&site, Outcome::Created)]);
        assert_eq!(ok.status, DeviceSyncStatus::Succeeded);

        let partial = device_with(vec![
            EntityOutcome::new(&site, Outcome::Unchanged),
            EntityOutcome::failed(&NaturalKey::device("hq-router1"), "rejected"),
        ]);
        assert_eq!(partial.status, DeviceSyncStatus::Partial);

        let failed = DeviceReport::failed("broken.json", "missing field");
        assert_eq!(failed.status, DeviceSyncStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("missing field"));
    }

    #[test]
    fn test_summary_and_totals() {
        let a = device_with(vec![
            EntityOutcome::new(&NaturalKey::site("hq"), Outcome::Created),
            EntityOutcome::new(&NaturalKey::device("a"), Outcome::Updated),
        ]);
        let b = device_with(vec![
            EntityOutcome::new(&NaturalKey::site("hq"), Outcome::Unchanged),
            EntityOutcome::skipped(EntityKind::Device, NaturalKey::device("b"), "site failed"),
        ]);
        let run = RunReport::new(Utc::now(), vec![a, b], false);

        let site = run.totals[&EntityKind::Site];
        assert_eq!((site.created, site.unchanged), (1, 1));
        let device = run.totals[&EntityKind::Device];
        assert_eq!((device.updated, device.skipped), (1, 1));
        assert_eq!(run.count(DeviceSyncStatus::Partial), 1);
    }

    #[test]
    fn test_outcome_serialization() {
        let entity = EntityOutcome::failed(&NaturalKey::site("hq"), "forbidden");
        let value = serde_json::to_value(&entity).unwrap();
        assert_eq!(
            value,
            json!({
                "kind": "site",
                "key": "site:name=hq",
                "outcome": "failed",
                "reason": "forbidden"
            })
        );
    }

    #[test]
    fn test_render_table_lists_failures() {
        let report = device_with(vec![EntityOutcome::failed(
            &NaturalKey::site("hq"),
            "forbidden",
        )]);
        let run = RunReport::new(Utc::now(), vec![report], true);
        let table = run.render_table();
        assert!(table.contains("hq-router1"));
        assert!(table.contains("site:name=hq: forbidden"));
        assert!(table.contains("(dry run)"));
    }
}
