use crate::error::{Result, TempiError};
use crate::registry::ensure_parent_dir;
use crate::system_io::HandleHolders;
use log::{debug, info, warn};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

/// How long holders get to exit after being signalled.
const HOLDER_GRACE: Duration = Duration::from_millis(100);

#[derive(Debug)]
pub enum DeleteOutcome {
    Removed,
    /// Could not be removed now; queued (and on Windows, scheduled for reboot).
    Deferred,
    Failed(TempiError),
}

pub trait FolderRemover {
    fn delete(&self, path: &Path) -> DeleteOutcome;

    /// Retries earlier deferred deletions. Removers without a queue have nothing to do.
    fn retry_deferred(&self) -> Result<RetryReport> {
        Ok(RetryReport::default())
    }
}

#[derive(Debug, Default)]
pub struct RetryReport {
    pub removed: Vec<PathBuf>,
    pub still_pending: Vec<PathBuf>,
}

/// Deletes folders from disk, falling back to the deferred queue when blocked.
pub struct FsRemover {
    holders: Box<dyn HandleHolders>,
    queue: PendingQueue,
}

impl FsRemover {
    pub fn new(holders: Box<dyn HandleHolders>, pending_path: &Path) -> Self {
        FsRemover {
            holders,
            queue: PendingQueue::new(pending_path),
        }
    }

    fn release_holders(&self, path: &Path) {
        let pids = self.holders.find_holders(path);
        if pids.is_empty() {
            return;
        }

        for pid in &pids {
            match self.holders.terminate(*pid) {
                Ok(()) => debug!("terminated process {pid} holding {}", path.display()),
                Err(e) => debug!("could not terminate process {pid}: {e}"),
            }
        }
        thread::sleep(HOLDER_GRACE);
    }

    fn defer(&self, path: &Path) -> Result<()> {
        if let Err(e) = schedule_on_reboot(path) {
            warn!("failed to schedule {} for deletion on reboot: {e}", path.display());
        }
        self.queue.push(path)
    }
}

impl FolderRemover for FsRemover {
    fn delete(&self, path: &Path) -> DeleteOutcome {
        self.release_holders(path);

        match fs::remove_dir_all(path) {
            Ok(()) => DeleteOutcome::Removed,
            Err(e) if e.kind() == ErrorKind::NotFound => DeleteOutcome::Removed,
            Err(e) => {
                warn!("failed to delete {}: {e}", path.display());
                match self.defer(path) {
                    Ok(()) => {
                        info!("marked {} for deferred deletion", path.display());
                        DeleteOutcome::Deferred
                    }
                    Err(defer_err) => {
                        warn!("deferral of {} failed: {defer_err}", path.display());
                        DeleteOutcome::Failed(TempiError::Locked {
                            path: path.to_path_buf(),
                            source: e,
                        })
                    }
                }
            }
        }
    }

    fn retry_deferred(&self) -> Result<RetryReport> {
        self.queue.retry()
    }
}

/// JSON list of folders whose deletion has to be retried on a later run.
#[derive(Debug, Clone)]
pub struct PendingQueue {
    path: PathBuf,
}

impl PendingQueue {
    pub fn new(path: &Path) -> Self {
        PendingQueue {
            path: path.to_path_buf(),
        }
    }

    pub fn load(&self) -> Result<Vec<PathBuf>> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(TempiError::io("failed to read pending queue", &self.path, e)),
        };

        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        serde_json::from_slice(&data).map_err(|source| TempiError::CorruptQueue {
            path: self.path.clone(),
            source,
        })
    }

    fn save(&self, paths: &[PathBuf]) -> Result<()> {
        let data = serde_json::to_string_pretty(paths)?;
        ensure_parent_dir(&self.path)?;
        fs::write(&self.path, data)
            .map_err(|e| TempiError::io("failed to write pending queue", &self.path, e))
    }

    pub fn push(&self, path: &Path) -> Result<()> {
        let mut paths = self.load()?;
        if !paths.iter().any(|p| p == path) {
            paths.push(path.to_path_buf());
        }
        self.save(&paths)
    }

    /// Drops queued paths that are gone or can now be removed.
    pub fn retry(&self) -> Result<RetryReport> {
        let paths = self.load()?;
        if paths.is_empty() {
            return Ok(RetryReport::default());
        }

        let mut report = RetryReport::default();
        for path in paths {
            if !path.exists() {
                debug!("deferred folder {} is already gone", path.display());
                report.removed.push(path);
                continue;
            }
            match fs::remove_dir_all(&path) {
                Ok(()) => {
                    info!("removed deferred folder {}", path.display());
                    report.removed.push(path);
                }
                Err(e) => {
                    debug!("deferred folder {} still blocked: {e}", path.display());
                    report.still_pending.push(path);
                }
            }
        }

        self.save(&report.still_pending)?;
        Ok(report)
    }
}

/// Marks every remaining file and directory, innermost first, with
/// `MOVEFILE_DELAY_UNTIL_REBOOT` so Windows removes them on the next boot.
#[cfg(windows)]
fn schedule_on_reboot(path: &Path) -> std::io::Result<()> {
    use std::os::windows::ffi::OsStrExt;
    use walkdir::WalkDir;
    use windows_sys::Win32::Storage::FileSystem::{MOVEFILE_DELAY_UNTIL_REBOOT, MoveFileExW};

    for entry in WalkDir::new(path).contents_first(true) {
        let entry = entry.map_err(std::io::Error::other)?;
        let wide: Vec<u16> = entry
            .path()
            .as_os_str()
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();

        let ok = unsafe { MoveFileExW(wide.as_ptr(), std::ptr::null(), MOVEFILE_DELAY_UNTIL_REBOOT) };
        if ok == 0 {
            return Err(std::io::Error::last_os_error());
        }
    }
    Ok(())
}

#[cfg(not(windows))]
fn schedule_on_reboot(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system_io::NoHolders;
    use std::cell::RefCell;
    use std::io;
    use std::rc::Rc;
    use tempfile::TempDir;

    struct RecordingHolders {
        pids: Vec<u32>,
        terminated: Rc<RefCell<Vec<u32>>>,
    }

    impl HandleHolders for RecordingHolders {
        fn find_holders(&self, _path: &Path) -> Vec<u32> {
            self.pids.clone()
        }

        fn terminate(&self, pid: u32) -> io::Result<()> {
            self.terminated.borrow_mut().push(pid);
            if pid == 2 {
                return Err(io::Error::other("no such process"));
            }
            Ok(())
        }
    }

    fn make_folder(root: &Path, name: &str) -> PathBuf {
        let dir = root.join(name);
        fs::create_dir_all(dir.join("nested")).unwrap();
        fs::write(dir.join("nested").join("data.txt"), "x").unwrap();
        dir
    }

    #[test]
    fn test_delete_removes_tree() {
        let tmp = TempDir::new().unwrap();
        let folder = make_folder(tmp.path(), "work");
        let remover = FsRemover::new(Box::new(NoHolders), &tmp.path().join("pending.json"));

        assert!(matches!(remover.delete(&folder), DeleteOutcome::Removed));
        assert!(!folder.exists());
        assert!(!tmp.path().join("pending.json").exists());
    }

    #[test]
    fn test_delete_missing_folder_counts_as_removed() {
        let tmp = TempDir::new().unwrap();
        let remover = FsRemover::new(Box::new(NoHolders), &tmp.path().join("pending.json"));

        assert!(matches!(
            remover.delete(&tmp.path().join("never-existed")),
            DeleteOutcome::Removed
        ));
    }

    #[test]
    fn test_delete_terminates_every_holder_first() {
        let tmp = TempDir::new().unwrap();
        let folder = make_folder(tmp.path(), "work");
        let terminated = Rc::new(RefCell::new(Vec::new()));
        let holders = RecordingHolders {
            pids: vec![1, 2, 3],
            terminated: Rc::clone(&terminated),
        };
        let remover = FsRemover::new(Box::new(holders), &tmp.path().join("pending.json"));

        assert!(matches!(remover.delete(&folder), DeleteOutcome::Removed));
        // A failed termination does not stop the others or the delete
        assert_eq!(*terminated.borrow(), vec![1, 2, 3]);
    }

    #[test]
    fn test_delete_file_path_is_deferred() {
        // remove_dir_all refuses a regular file, which stands in for a blocked delete
        let tmp = TempDir::new().unwrap();
        let not_a_dir = tmp.path().join("plain.txt");
        fs::write(&not_a_dir, "x").unwrap();
        let pending = tmp.path().join("pending.json");
        let remover = FsRemover::new(Box::new(NoHolders), &pending);

        assert!(matches!(remover.delete(&not_a_dir), DeleteOutcome::Deferred));
        assert_eq!(PendingQueue::new(&pending).load().unwrap(), vec![not_a_dir]);
    }

    #[test]
    fn test_delete_fails_when_queue_unwritable() {
        let tmp = TempDir::new().unwrap();
        let not_a_dir = tmp.path().join("plain.txt");
        fs::write(&not_a_dir, "x").unwrap();
        // The queue location is an existing directory, so writing it fails
        let pending = tmp.path().join("pending-dir");
        fs::create_dir(&pending).unwrap();
        let remover = FsRemover::new(Box::new(NoHolders), &pending);

        let outcome = remover.delete(&not_a_dir);
        assert!(matches!(
            outcome,
            DeleteOutcome::Failed(TempiError::Locked { .. })
        ));
    }

    #[test]
    fn test_queue_push_deduplicates() {
        let tmp = TempDir::new().unwrap();
        let queue = PendingQueue::new(&tmp.path().join("state").join("pending.json"));

        queue.push(Path::new("/scratch/a")).unwrap();
        queue.push(Path::new("/scratch/b")).unwrap();
        queue.push(Path::new("/scratch/a")).unwrap();

        assert_eq!(
            queue.load().unwrap(),
            vec![PathBuf::from("/scratch/a"), PathBuf::from("/scratch/b")]
        );
    }

    #[test]
    fn test_queue_retry_drops_resolved_paths() {
        let tmp = TempDir::new().unwrap();
        let queue = PendingQueue::new(&tmp.path().join("pending.json"));

        let removable = make_folder(tmp.path(), "removable");
        let gone = tmp.path().join("gone");
        let blocked = tmp.path().join("blocked.txt");
        fs::write(&blocked, "x").unwrap();

        queue.push(&removable).unwrap();
        queue.push(&gone).unwrap();
        queue.push(&blocked).unwrap();

        let report = queue.retry().unwrap();
        assert_eq!(report.removed, vec![removable.clone(), gone]);
        assert_eq!(report.still_pending, vec![blocked.clone()]);
        assert!(!removable.exists());
        assert_eq!(queue.load().unwrap(), vec![blocked]);
    }

    #[test]
    fn test_queue_retry_empty_is_noop() {
        let tmp = TempDir::new().unwrap();
        let pending = tmp.path().join("pending.json");
        let report = PendingQueue::new(&pending).retry().unwrap();

        assert!(report.removed.is_empty());
        assert!(report.still_pending.is_empty());
        assert!(!pending.exists());
    }

    #[test]
    fn test_queue_corrupt_file_errors() {
        let tmp = TempDir::new().unwrap();
        let pending = tmp.path().join("pending.json");
        fs::write(&pending, "not json").unwrap();

        let err = PendingQueue::new(&pending).load().unwrap_err();
        assert!(matches!(err, TempiError::CorruptQueue { .. }));
        let msg = err.to_string();
        assert!(msg.contains("pending queue"), "{msg}");
        assert!(msg.contains("pending.json"), "{msg}");
    }
}
