//! The readiness sentinel file and the `--run-healthcheck` contract.
//!
//! An external prober (a container orchestrator's `exec` probe) invokes this
//! same binary with `--run-healthcheck`; [`run_healthcheck_mode`] answers
//! that without touching any server state, so the check stays cheap and
//! fast-exiting.

use std::path::PathBuf;

const LOCK_FILE_NAME: &str = ".lock";

/// Returns the sentinel path: `<temp-dir>/.lock`.
pub fn path() -> PathBuf {
    std::env::temp_dir().join(LOCK_FILE_NAME)
}

/// Creates the sentinel file, signalling readiness to external probers.
pub fn create() -> std::io::Result<()> {
    std::fs::write(path(), b"")
}

/// Removes the sentinel file. Not-found is not an error: shutdown may run
/// this more than once, and a process that never became ready never
/// created it in the first place.
pub fn remove() {
    if let Err(err) = std::fs::remove_file(path()) {
        if err.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(%err, "failed to remove lock file");
        }
    }
}

/// Returns whether the sentinel file currently exists.
pub fn exists() -> bool {
    path().exists()
}

/// The `--run-healthcheck` CLI entrypoint: exits without starting a runtime.
/// Exit code 0 means the lock file is present; any other code means not
/// ready (or unreadable), matching a standard exec-probe contract.
pub fn run_healthcheck_mode() -> ! {
    if exists() {
        std::process::exit(0);
    }
    eprintln!("healthcheck failed: {} not present", path().display());
    std::process::exit(1);
}
