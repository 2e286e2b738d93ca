use crate::deleter::{DeleteOutcome, FolderRemover};
use crate::duration::parse_duration;
use crate::error::Result;
use crate::registry::Registry;
use crate::scanner;
use crate::types::Entry;
use chrono::{DateTime, Local};
use log::{debug, info};
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    Missing,
    TimeExpired,
    NoRecentActivity,
    Forced,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Reason::Missing => "folder missing",
            Reason::TimeExpired => "time expired",
            Reason::NoRecentActivity => "no recent activity",
            Reason::Forced => "deleted on request",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Keep,
    Reclaim(Reason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reclaimed {
    pub path: PathBuf,
    pub reason: Reason,
}

/// Result of a batch run. Deferred paths are not errors: they are gone from the
/// registry and will be removed later.
#[derive(Debug, Default)]
pub struct ReclaimReport {
    pub cleaned: Vec<Reclaimed>,
    pub deferred: Vec<PathBuf>,
    pub errors: Vec<String>,
    pub skipped: usize,
    /// Folders from earlier deferred deletions that were removed on this run.
    pub recovered: Vec<PathBuf>,
}

impl ReclaimReport {
    #[must_use]
    pub fn count(&self) -> usize {
        self.cleaned.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cleaned.is_empty() && self.deferred.is_empty() && self.errors.is_empty()
    }
}

/// Decides what to do with one entry given the folder's current state on disk.
#[must_use]
pub fn evaluate(entry: &Entry, now: DateTime<Local>) -> Verdict {
    if let Err(e) = fs::symlink_metadata(&entry.path)
        && e.kind() == ErrorKind::NotFound
    {
        return Verdict::Reclaim(Reason::Missing);
    }

    if entry.is_expired(now) {
        return Verdict::Reclaim(Reason::TimeExpired);
    }

    if is_idle(entry, now) {
        return Verdict::Reclaim(Reason::NoRecentActivity);
    }

    Verdict::Keep
}

/// True when no file in the folder changed within the entry's deadtime.
/// Any failure along the way counts as "not idle".
fn is_idle(entry: &Entry, now: DateTime<Local>) -> bool {
    let deadtime = match parse_duration(&entry.deadtime) {
        Ok(d) => d,
        Err(e) => {
            debug!("skipping idle check for {}: {e}", entry.path.display());
            return false;
        }
    };

    match scanner::last_modified(&entry.path) {
        Ok(last) => now.signed_duration_since(last) >= deadtime,
        Err(e) => {
            debug!("skipping idle check for {}: {e}", entry.path.display());
            false
        }
    }
}

/// Runs every tracked entry through `evaluate` and deletes what is eligible.
///
/// Individual failures are collected in the report and never stop the batch.
pub fn reclaim(
    registry: &mut Registry,
    remover: &dyn FolderRemover,
    now: DateTime<Local>,
) -> ReclaimReport {
    let mut report = ReclaimReport::default();

    let snapshot = registry.entries().to_vec();
    for entry in snapshot {
        let reason = match evaluate(&entry, now) {
            Verdict::Keep => {
                report.skipped += 1;
                continue;
            }
            Verdict::Reclaim(reason) => reason,
        };

        if reason == Reason::Missing {
            match registry.remove(&entry.path) {
                Ok(()) => {
                    debug!("dropped missing folder {}", entry.path.display());
                    report.cleaned.push(Reclaimed {
                        path: entry.path,
                        reason,
                    });
                }
                Err(e) => report.errors.push(format!(
                    "failed to remove missing folder {} from registry: {e}",
                    entry.path.display()
                )),
            }
            continue;
        }

        record_delete(&mut report, remover, &entry.path, reason);

        if let Err(e) = registry.remove(&entry.path) {
            report.errors.push(format!(
                "failed to remove {} from registry: {e}",
                entry.path.display()
            ));
        }
    }

    report
}

/// Deletes every tracked folder without checking eligibility, then empties the
/// registry with a single write. Only that final write can fail the call.
pub fn force_delete_all(registry: &mut Registry, remover: &dyn FolderRemover) -> Result<ReclaimReport> {
    let mut report = ReclaimReport::default();

    for entry in registry.entries() {
        record_delete(&mut report, remover, &entry.path, Reason::Forced);
    }

    registry.clear()?;
    Ok(report)
}

fn record_delete(report: &mut ReclaimReport, remover: &dyn FolderRemover, path: &Path, reason: Reason) {
    match remover.delete(path) {
        DeleteOutcome::Removed => {
            info!("reclaimed {} ({reason})", path.display());
            report.cleaned.push(Reclaimed {
                path: path.to_path_buf(),
                reason,
            });
        }
        DeleteOutcome::Deferred => report.deferred.push(path.to_path_buf()),
        DeleteOutcome::Failed(e) => report
            .errors
            .push(format!("failed to delete {}: {e}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use std::cell::RefCell;
    use std::fs::File;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    /// Deletes for real, except for `locked`, which it reports as deferred.
    #[derive(Default)]
    struct FakeRemover {
        locked: Option<PathBuf>,
        calls: RefCell<Vec<PathBuf>>,
    }

    impl FolderRemover for FakeRemover {
        fn delete(&self, path: &Path) -> DeleteOutcome {
            self.calls.borrow_mut().push(path.to_path_buf());
            if self.locked.as_deref() == Some(path) {
                return DeleteOutcome::Deferred;
            }
            match fs::remove_dir_all(path) {
                Ok(()) => DeleteOutcome::Removed,
                Err(e) => DeleteOutcome::Failed(crate::error::TempiError::io("failed to delete", path, e)),
            }
        }
    }

    fn make_folder(root: &Path, name: &str, file_age: Option<Duration>) -> PathBuf {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        if let Some(age) = file_age {
            let file = File::create(dir.join("work.txt")).unwrap();
            file.set_modified(SystemTime::now() - age).unwrap();
        }
        dir
    }

    fn make_entry(path: &Path, created: DateTime<Local>, deadtime: &str) -> Entry {
        Entry::new(
            path.to_path_buf(),
            created,
            deadtime,
            parse_duration(deadtime).unwrap(),
        )
    }

    fn open_registry(tmp: &TempDir) -> Registry {
        Registry::open(&tmp.path().join("state").join("registry.json")).unwrap()
    }

    #[test]
    fn test_evaluate_missing_folder() {
        let tmp = TempDir::new().unwrap();
        let entry = make_entry(&tmp.path().join("gone"), Local::now(), "4h");
        assert_eq!(evaluate(&entry, Local::now()), Verdict::Reclaim(Reason::Missing));
    }

    #[test]
    fn test_evaluate_expired_wins_over_recent_activity() {
        let tmp = TempDir::new().unwrap();
        let dir = make_folder(tmp.path(), "busy", Some(Duration::from_secs(1)));
        let entry = make_entry(&dir, Local::now() - TimeDelta::hours(2), "1h");

        assert_eq!(
            evaluate(&entry, Local::now()),
            Verdict::Reclaim(Reason::TimeExpired)
        );
    }

    #[test]
    fn test_evaluate_recent_file_keeps_folder() {
        let tmp = TempDir::new().unwrap();
        let dir = make_folder(tmp.path(), "busy", Some(Duration::from_secs(5 * 60)));
        let entry = make_entry(&dir, Local::now() - TimeDelta::minutes(30), "1h");

        assert_eq!(evaluate(&entry, Local::now()), Verdict::Keep);
    }

    #[test]
    fn test_evaluate_stale_files_mark_idle() {
        let tmp = TempDir::new().unwrap();
        let dir = make_folder(tmp.path(), "stale", Some(Duration::from_secs(3 * 3_600)));
        // Still within its lifetime, but nothing has changed for longer than the deadtime
        let mut entry = make_entry(&dir, Local::now() - TimeDelta::minutes(10), "2h");
        entry.expires_at = Local::now() + TimeDelta::hours(10);

        assert_eq!(
            evaluate(&entry, Local::now()),
            Verdict::Reclaim(Reason::NoRecentActivity)
        );
    }

    #[test]
    fn test_evaluate_bad_deadtime_is_not_idle() {
        let tmp = TempDir::new().unwrap();
        let dir = make_folder(tmp.path(), "stale", Some(Duration::from_secs(3 * 3_600)));
        let mut entry = make_entry(&dir, Local::now(), "1h");
        entry.deadtime = "soon".to_string();

        assert_eq!(evaluate(&entry, Local::now()), Verdict::Keep);
    }

    #[test]
    fn test_reclaim_missing_folder_skips_delete() {
        let tmp = TempDir::new().unwrap();
        let mut registry = open_registry(&tmp);
        let gone = tmp.path().join("gone");
        registry.add(make_entry(&gone, Local::now(), "4h")).unwrap();

        let remover = FakeRemover::default();
        let report = reclaim(&mut registry, &remover, Local::now());

        assert!(remover.calls.borrow().is_empty());
        assert!(registry.is_empty());
        assert_eq!(
            report.cleaned,
            vec![Reclaimed {
                path: gone,
                reason: Reason::Missing
            }]
        );
        assert!(report.errors.is_empty());
    }

    #[test]
    fn test_reclaim_after_expiry_empties_registry() {
        let tmp = TempDir::new().unwrap();
        let mut registry = open_registry(&tmp);
        let t0 = Local::now();
        let dir = make_folder(tmp.path(), "tempi_a", Some(Duration::from_secs(0)));
        registry.add(make_entry(&dir, t0, "1h")).unwrap();

        let remover = FakeRemover::default();
        let report = reclaim(&mut registry, &remover, t0 + TimeDelta::hours(2));

        assert_eq!(report.count(), 1);
        assert_eq!(report.cleaned[0].reason, Reason::TimeExpired);
        assert!(!dir.exists());

        let reloaded = Registry::open(registry.path()).unwrap();
        assert!(reloaded.is_empty());
    }

    #[test]
    fn test_reclaim_keeps_active_and_reports_skipped() {
        let tmp = TempDir::new().unwrap();
        let mut registry = open_registry(&tmp);
        let now = Local::now();

        let active = make_folder(tmp.path(), "active", Some(Duration::from_secs(60)));
        let expired = make_folder(tmp.path(), "expired", None);
        registry.add(make_entry(&active, now, "4h")).unwrap();
        registry
            .add(make_entry(&expired, now - TimeDelta::hours(5), "4h"))
            .unwrap();

        let remover = FakeRemover::default();
        let report = reclaim(&mut registry, &remover, now);

        assert_eq!(report.skipped, 1);
        assert_eq!(report.count(), 1);
        assert!(active.exists());
        assert!(!expired.exists());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.entries()[0].path, active);
    }

    #[test]
    fn test_reclaim_deferred_entry_still_leaves_registry() {
        let tmp = TempDir::new().unwrap();
        let mut registry = open_registry(&tmp);
        let now = Local::now();
        let locked = make_folder(tmp.path(), "locked", None);
        registry
            .add(make_entry(&locked, now - TimeDelta::hours(2), "1h"))
            .unwrap();

        let remover = FakeRemover {
            locked: Some(locked.clone()),
            ..FakeRemover::default()
        };
        let report = reclaim(&mut registry, &remover, now);

        assert_eq!(report.count(), 0);
        assert_eq!(report.deferred, vec![locked]);
        assert!(report.errors.is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_force_delete_all_with_one_locked() {
        let tmp = TempDir::new().unwrap();
        let mut registry = open_registry(&tmp);
        let now = Local::now();

        let a = make_folder(tmp.path(), "a", Some(Duration::from_secs(1)));
        let b = make_folder(tmp.path(), "b", None);
        let c = make_folder(tmp.path(), "c", Some(Duration::from_secs(1)));
        for dir in [&a, &b, &c] {
            registry.add(make_entry(dir, now, "4h")).unwrap();
        }

        let remover = FakeRemover {
            locked: Some(b.clone()),
            ..FakeRemover::default()
        };
        let report = force_delete_all(&mut registry, &remover).unwrap();

        assert_eq!(report.count(), 2);
        assert_eq!(report.deferred, vec![b.clone()]);
        assert!(report.errors.is_empty());
        assert!(!a.exists() && !c.exists());
        assert!(b.exists());
        assert!(registry.is_empty());
        assert!(Registry::open(registry.path()).unwrap().is_empty());
        assert_eq!(remover.calls.borrow().len(), 3);
    }

    #[test]
    fn test_force_delete_all_collects_failures() {
        let tmp = TempDir::new().unwrap();
        let mut registry = open_registry(&tmp);
        let plain_file = tmp.path().join("not-a-folder");
        fs::write(&plain_file, "x").unwrap();
        registry.add(make_entry(&plain_file, Local::now(), "4h")).unwrap();

        let report = force_delete_all(&mut registry, &FakeRemover::default()).unwrap();

        assert_eq!(report.count(), 0);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("not-a-folder"));
        assert!(registry.is_empty());
    }
}
