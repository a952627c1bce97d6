//! Daily snapshots of the whole store.
//!
//! A snapshot is the store's top-level value written verbatim (pretty-printed)
//! to `db-YYYY-MM-DD.json`. Same-day reruns replace that day's file.

use crate::adapter::{atomic_write, DocumentAdapter};
use crate::error::{DocRouteError, Result};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Utc};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// File name of the snapshot taken on `date`.
pub fn snapshot_file_name(date: NaiveDate) -> String {
    format!("db-{}.json", date.format("%Y-%m-%d"))
}

/// When the daily backup fires: a time of day in a fixed-offset zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackupSchedule {
    pub at: NaiveTime,
    pub offset: FixedOffset,
}

impl Default for BackupSchedule {
    fn default() -> Self {
        BackupSchedule {
            at: NaiveTime::from_hms_opt(2, 0, 0).unwrap_or_default(),
            offset: utc_offset(),
        }
    }
}

impl BackupSchedule {
    /// Parse `HH:MM` (or `HH:MM:SS`) and a zone (`UTC`, `Etc/UTC`, `Z` or an offset like `+02:00`).
    pub fn parse(time: &str, zone: &str) -> Result<Self> {
        let at = NaiveTime::parse_from_str(time.trim(), "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(time.trim(), "%H:%M:%S"))
            .map_err(|e| DocRouteError::Config(format!("invalid backup time '{time}': {e}")))?;
        let offset = parse_zone(zone)?;
        Ok(BackupSchedule { at, offset })
    }

    /// The first fire time strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let local = now.with_timezone(&self.offset);
        let mut date = local.date_naive();
        loop {
            let candidate = self
                .offset
                .from_local_datetime(&date.and_time(self.at))
                .single()
                .map(|dt| dt.with_timezone(&Utc));
            if let Some(candidate) = candidate {
                if candidate > now {
                    return candidate;
                }
            }
            date += Duration::days(1);
        }
    }

    /// The calendar date used to name a snapshot taken at `now`.
    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.offset).date_naive()
    }
}

fn utc_offset() -> FixedOffset {
    Utc.fix()
}

fn parse_zone(zone: &str) -> Result<FixedOffset> {
    let zone = zone.trim();
    match zone.to_ascii_uppercase().as_str() {
        "" | "UTC" | "ETC/UTC" | "GMT" | "Z" => return Ok(utc_offset()),
        _ => {}
    }
    FixedOffset::from_str(zone)
        .map_err(|e| DocRouteError::Config(format!("invalid backup time zone '{zone}': {e}")))
}

/// Write one snapshot of `adapter` into `dir`, named by `date`.
/// Creates `dir` if it does not exist. Returns the snapshot path.
pub async fn run_backup(adapter: &dyn DocumentAdapter, dir: &Path, date: NaiveDate) -> Result<PathBuf> {
    if !tokio::fs::try_exists(dir).await.unwrap_or(false) {
        tokio::fs::create_dir_all(dir).await?;
        log::info!("Backup directory created at {}", dir.display());
    }

    let snapshot = Value::Object(adapter.read_all().await?);
    let bytes = serde_json::to_vec_pretty(&snapshot)?;
    let path = dir.join(snapshot_file_name(date));
    atomic_write(&path, bytes).await?;
    Ok(path)
}

/// Periodic backup task. Each tick is its own failure boundary: an error is
/// logged and the next tick runs as scheduled.
pub struct BackupScheduler {
    adapter: Arc<dyn DocumentAdapter>,
    dir: PathBuf,
    schedule: BackupSchedule,
}

impl BackupScheduler {
    pub fn new(adapter: Arc<dyn DocumentAdapter>, dir: impl Into<PathBuf>, schedule: BackupSchedule) -> Self {
        BackupScheduler {
            adapter,
            dir: dir.into(),
            schedule,
        }
    }

    pub fn schedule(&self) -> &BackupSchedule {
        &self.schedule
    }

    /// Take a backup now. Failures are logged and returned as `None`; never retried.
    pub async fn run_once(&self) -> Option<PathBuf> {
        let date = self.schedule.local_date(Utc::now());
        match run_backup(self.adapter.as_ref(), &self.dir, date).await {
            Ok(path) => {
                log::info!("Database backed up successfully to {}", path.display());
                Some(path)
            }
            Err(e) => {
                log::error!("Error writing backup to {}: {e}", self.dir.display());
                None
            }
        }
    }

    /// Spawn the daily loop on the current tokio runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        log::info!(
            "Daily database backup scheduled for {} (UTC{})",
            self.schedule.at.format("%H:%M"),
            self.schedule.offset
        );
        tokio::spawn(async move {
            loop {
                let now = Utc::now();
                let next = self.schedule.next_after(now);
                let wait = (next - now).to_std().unwrap_or_default();
                tokio::time::sleep(wait).await;

                log::info!("Running daily database backup...");
                self.run_once().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::FileStore;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_snapshot_file_name() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(snapshot_file_name(date), "db-2024-03-07.json");
    }

    #[test]
    fn test_next_after_same_day_and_rollover() {
        let schedule = BackupSchedule::default();
        assert_eq!(
            schedule.next_after(utc("2024-03-07T01:30:00Z")),
            utc("2024-03-07T02:00:00Z")
        );
        assert_eq!(
            schedule.next_after(utc("2024-03-07T02:00:00Z")),
            utc("2024-03-08T02:00:00Z")
        );
        assert_eq!(
            schedule.next_after(utc("2024-12-31T23:00:00Z")),
            utc("2025-01-01T02:00:00Z")
        );
    }

    #[test]
    fn test_next_after_with_offset() {
        let schedule = BackupSchedule::parse("02:00", "+02:00").unwrap();
        // 02:00 at +02:00 is 00:00 UTC
        assert_eq!(
            schedule.next_after(utc("2024-03-07T01:00:00Z")),
            utc("2024-03-08T00:00:00Z")
        );
        assert_eq!(
            schedule.local_date(utc("2024-03-07T23:30:00Z")),
            NaiveDate::from_ymd_opt(2024, 3, 8).unwrap()
        );
    }

    #[test]
    fn test_parse_schedule() {
        assert_eq!(
            BackupSchedule::parse("02:00", "Etc/UTC").unwrap(),
            BackupSchedule::default()
        );
        assert!(BackupSchedule::parse("25:00", "UTC").is_err());
        assert!(BackupSchedule::parse("02:00", "Mars/Olympus").is_err());
        let s = BackupSchedule::parse("23:15:30", "-05:30").unwrap();
        assert_eq!(s.offset.local_minus_utc(), -(5 * 3600 + 30 * 60));
    }

    #[tokio::test]
    async fn test_same_day_backups_overwrite() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::create(tmp.path().join("db.json"), Default::default())
            .await
            .unwrap();
        store.write_key("settings", json!({"v": 1})).await.unwrap();

        let dir = tmp.path().join("backups");
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        let first = run_backup(&store, &dir, date).await.unwrap();

        store.write_key("settings", json!({"v": 2})).await.unwrap();
        let second = run_backup(&store, &dir, date).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 1);
        let content: Value = serde_json::from_slice(&std::fs::read(&second).unwrap()).unwrap();
        assert_eq!(content, json!({"settings": {"v": 2}}));
    }

    #[tokio::test]
    async fn test_failed_backup_is_not_fatal() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::create(tmp.path().join("db.json"), Default::default())
            .await
            .unwrap();
        // A regular file where the backup directory should be
        let blocker = tmp.path().join("backups");
        std::fs::write(&blocker, "not a directory").unwrap();

        let scheduler = BackupScheduler::new(Arc::new(store), &blocker, BackupSchedule::default());
        assert!(scheduler.run_once().await.is_none());
        assert!(scheduler.run_once().await.is_none());
    }
}
