use crate::cleaner::{self, ReclaimReport};
use crate::config::{Config, FOLDER_PREFIX};
use crate::deleter::{FolderRemover, FsRemover};
use crate::duration::{format_duration, parse_duration};
use crate::error::{Result, TempiError};
use crate::registry::Registry;
use crate::scanner;
use crate::system_io;
use crate::types::Entry;
use chrono::{DateTime, Local, TimeDelta};
use log::{debug, info, warn};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Upper bound on `_<n>` suffixes tried when a timestamp name is taken.
const MAX_NAME_ATTEMPTS: u32 = 1_000;

/// One row of `list`.
#[derive(Debug, Clone)]
pub struct Listing {
    pub entry: Entry,
    pub remaining: TimeDelta,
    pub expired: bool,
    pub missing: bool,
    pub size: u64,
}

impl Listing {
    #[must_use]
    pub fn remaining_text(&self) -> String {
        format_duration(self.remaining)
    }
}

/// The remover used outside of tests: signals handle holders, deletes, and
/// queues whatever could not be removed.
#[must_use]
pub fn default_remover(config: &Config) -> FsRemover {
    FsRemover::new(system_io::default_holders(), &config.pending_path)
}

/// Creates a fresh folder under the base directory and starts tracking it.
///
/// If tracking fails the folder is removed again before the error is returned.
pub fn create_folder(config: &Config, deadtime: &str, now: DateTime<Local>) -> Result<Entry> {
    let lifetime = parse_duration(deadtime)?;

    let base = std::path::absolute(&config.base_dir)
        .map_err(|e| TempiError::io("failed to resolve base directory", &config.base_dir, e))?;
    fs::create_dir_all(&base)
        .map_err(|e| TempiError::io("failed to create base directory", &base, e))?;

    let mut registry = Registry::open(&config.registry_path)?;
    let path = make_unique_dir(&base, now, &registry)?;
    let entry = Entry::new(path.clone(), now, deadtime, lifetime);

    if let Err(e) = registry.add(entry.clone()) {
        if let Err(cleanup) = fs::remove_dir_all(&path) {
            warn!("failed to remove {} after error: {cleanup}", path.display());
        }
        return Err(e);
    }

    info!("created {} (deadtime {deadtime})", path.display());
    Ok(entry)
}

/// Names already tracked are skipped even when their folder is gone from disk.
fn make_unique_dir(base: &Path, now: DateTime<Local>, registry: &Registry) -> Result<PathBuf> {
    let stem = format!("{FOLDER_PREFIX}{}", now.format("%Y%m%d_%H%M%S_%3f"));

    for attempt in 0..MAX_NAME_ATTEMPTS {
        let name = if attempt == 0 {
            stem.clone()
        } else {
            format!("{stem}_{attempt}")
        };
        let candidate = base.join(name);
        if registry.contains(&candidate) {
            continue;
        }

        match fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(TempiError::io("failed to create folder", &candidate, e)),
        }
    }

    Err(TempiError::io(
        "failed to find a free folder name in",
        base,
        std::io::Error::from(ErrorKind::AlreadyExists),
    ))
}

pub fn list_folders(config: &Config, now: DateTime<Local>) -> Result<Vec<Listing>> {
    let registry = Registry::open(&config.registry_path)?;

    Ok(registry
        .entries()
        .iter()
        .map(|entry| {
            let missing = !entry.path.exists();
            Listing {
                remaining: entry.time_remaining(now),
                expired: entry.is_expired(now),
                missing,
                size: if missing { 0 } else { scanner::folder_size(&entry.path) },
                entry: entry.clone(),
            }
        })
        .collect())
}

/// Retries queued deletions, then reclaims every eligible folder.
pub fn reclaim_expired(
    config: &Config,
    remover: &dyn FolderRemover,
    now: DateTime<Local>,
) -> Result<ReclaimReport> {
    let mut registry = Registry::open(&config.registry_path)?;
    debug!(
        "{} of {} entries in {} are past expiry",
        registry.expired(now).len(),
        registry.len(),
        registry.path().display()
    );
    let recovered = retry_deferred(remover);

    let mut report = cleaner::reclaim(&mut registry, remover, now);
    absorb_retry(&mut report, recovered);
    Ok(report)
}

/// Deletes every tracked folder regardless of expiry and empties the registry.
pub fn delete_all(config: &Config, remover: &dyn FolderRemover) -> Result<ReclaimReport> {
    let mut registry = Registry::open(&config.registry_path)?;
    if registry.is_empty() {
        debug!("no tracked folders in {}", registry.path().display());
    }
    let recovered = retry_deferred(remover);

    let mut report = cleaner::force_delete_all(&mut registry, remover)?;
    absorb_retry(&mut report, recovered);
    Ok(report)
}

/// `reclaim_expired` for opportunistic use before other commands. Never fails.
pub fn auto_clean(config: &Config, remover: &dyn FolderRemover, now: DateTime<Local>) {
    match reclaim_expired(config, remover, now) {
        Ok(report) => {
            for msg in &report.errors {
                debug!("auto-clean: {msg}");
            }
            if !report.is_empty() {
                debug!(
                    "auto-clean reclaimed {} folder(s), {} deferred",
                    report.count(),
                    report.deferred.len()
                );
            }
        }
        Err(e) => warn!("auto-clean skipped: {e}"),
    }
}

fn retry_deferred(remover: &dyn FolderRemover) -> std::result::Result<Vec<PathBuf>, String> {
    remover
        .retry_deferred()
        .map(|retry| retry.removed)
        .map_err(|e| format!("failed to retry deferred deletions: {e}"))
}

fn absorb_retry(report: &mut ReclaimReport, recovered: std::result::Result<Vec<PathBuf>, String>) {
    match recovered {
        Ok(paths) => report.recovered = paths,
        Err(msg) => report.errors.push(msg),
    }
}
