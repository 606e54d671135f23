//! Single instance lock using a Unix socket.
//!
//! Two controllers driving the same relay pins would fight over them, so the
//! daemon refuses to start while another instance holds the lock. A bound
//! Unix socket is released by the OS when the process dies, so a crash never
//! leaves a lock that blocks the next start.

use crate::error::{Result, ThermaboxError};
use log::debug;
use std::io;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};

const SOCKET_NAME: &str = "thermabox.sock";

/// Held for as long as the process should be the only controller.
pub struct InstanceLock {
    _listener: UnixListener,
    path: PathBuf,
}

impl InstanceLock {
    /// Acquire the lock at the default socket path.
    pub fn acquire() -> Result<Self> {
        let runtime_dir = std::env::var_os("XDG_RUNTIME_DIR").map(PathBuf::from);
        Self::acquire_at(socket_path(runtime_dir.as_deref()))
    }

    /// Acquire the lock at `path`.
    ///
    /// A socket file nobody answers on is left over from a killed process
    /// and is replaced.
    pub fn acquire_at(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if path.exists() {
            if UnixStream::connect(&path).is_ok() {
                return Err(already_running(&path));
            }
            debug!("[Thermabox] Removing stale lock socket {}", path.display());
            let _ = std::fs::remove_file(&path);
        }

        match UnixListener::bind(&path) {
            Ok(listener) => {
                debug!("[Thermabox] Holding instance lock {}", path.display());
                Ok(Self {
                    _listener: listener,
                    path,
                })
            }
            // Lost a race with another instance starting at the same time
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => Err(already_running(&path)),
            Err(e) => Err(ThermaboxError::IoError(e)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Socket path under `runtime_dir`, falling back to `/tmp`.
pub fn socket_path(runtime_dir: Option<&Path>) -> PathBuf {
    runtime_dir
        .unwrap_or_else(|| Path::new("/tmp"))
        .join(SOCKET_NAME)
}

fn already_running(path: &Path) -> ThermaboxError {
    ThermaboxError::AlreadyRunning(path.display().to_string())
}
