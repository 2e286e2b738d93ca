use std::io;
use std::path::Path;

/// Finds and stops processes that keep files open inside a folder.
pub trait HandleHolders {
    fn find_holders(&self, path: &Path) -> Vec<u32>;
    fn terminate(&self, pid: u32) -> io::Result<()>;
}

/// Never reports any holder.
#[cfg_attr(target_os = "linux", allow(dead_code))]
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHolders;

impl HandleHolders for NoHolders {
    fn find_holders(&self, _path: &Path) -> Vec<u32> {
        Vec::new()
    }

    fn terminate(&self, _pid: u32) -> io::Result<()> {
        Ok(())
    }
}

/// Walks `/proc/<pid>/fd` looking for descriptors that point into the folder.
#[cfg(target_os = "linux")]
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcFdHolders;

#[cfg(target_os = "linux")]
impl HandleHolders for ProcFdHolders {
    fn find_holders(&self, path: &Path) -> Vec<u32> {
        use std::fs;

        let target = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let own_pid = std::process::id();

        let Ok(procs) = fs::read_dir("/proc") else {
            return Vec::new();
        };

        let mut holders: Vec<u32> = procs
            .filter_map(std::result::Result::ok)
            .filter_map(|e| e.file_name().to_str()?.parse::<u32>().ok())
            .filter(|pid| *pid != own_pid)
            .filter(|pid| {
                // Processes owned by other users are unreadable; skip them
                let Ok(fds) = fs::read_dir(format!("/proc/{pid}/fd")) else {
                    return false;
                };
                fds.filter_map(std::result::Result::ok)
                    .filter_map(|fd| fs::read_link(fd.path()).ok())
                    .any(|link| link.starts_with(&target))
            })
            .collect();

        holders.sort_unstable();
        holders
    }

    fn terminate(&self, pid: u32) -> io::Result<()> {
        let status = std::process::Command::new("kill")
            .arg("-TERM")
            .arg(pid.to_string())
            .status()?;

        if status.success() {
            Ok(())
        } else {
            Err(io::Error::other(format!(
                "kill -TERM {pid} exited with {status}"
            )))
        }
    }
}

#[cfg(target_os = "linux")]
pub fn default_holders() -> Box<dyn HandleHolders> {
    Box::new(ProcFdHolders)
}

#[cfg(not(target_os = "linux"))]
pub fn default_holders() -> Box<dyn HandleHolders> {
    Box::new(NoHolders)
}
