use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

use crate::error::BuildError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
    Unix,
    MacOs,
    Windows,
}

impl Os {
    pub fn detect() -> Self {
        if cfg!(target_os = "macos") {
            Os::MacOs
        } else if cfg!(windows) {
            Os::Windows
        } else {
            Os::Unix
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    X86,
    X86_64,
    Aarch64,
}

impl Arch {
    pub fn detect() -> Self {
        if cfg!(target_arch = "aarch64") {
            Arch::Aarch64
        } else if cfg!(target_arch = "x86") {
            Arch::X86
        } else {
            Arch::X86_64
        }
    }
}

/// Resolves the server executable to launch.
///
/// Overrides are keyed by (os, arch); without a matching override the
/// binary name is looked up on `PATH`.
#[derive(Debug, Clone)]
pub struct ExecProvider {
    binary: String,
    overrides: HashMap<(Os, Arch), PathBuf>,
}

impl ExecProvider {
    pub fn new(binary: impl Into<String>) -> Self {
        ExecProvider {
            binary: binary.into(),
            overrides: HashMap::new(),
        }
    }

    /// Provider for the stock `redis-server` binary.
    pub fn redis_server() -> Self {
        Self::new("redis-server")
    }

    pub fn with_override(mut self, os: Os, arch: Arch, path: impl Into<PathBuf>) -> Self {
        self.overrides.insert((os, arch), path.into());
        self
    }

    /// Resolves an absolute path to a launchable binary for the current
    /// platform.
    pub fn get(&self) -> Result<PathBuf, BuildError> {
        let os = Os::detect();
        let arch = Arch::detect();

        let candidate = match self.overrides.get(&(os, arch)) {
            Some(path) => path.clone(),
            None => self
                .search_path()
                .ok_or(BuildError::ExecutableNotFound { os, arch })?,
        };

        if !candidate.is_file() {
            return Err(BuildError::ExecutableNotFound { os, arch });
        }
        ensure_executable(&candidate)?;
        Ok(candidate)
    }

    fn search_path(&self) -> Option<PathBuf> {
        let path_var = env::var_os("PATH")?;
        env::split_paths(&path_var)
            .map(|dir| dir.join(&self.binary))
            .find(|candidate| candidate.is_file())
    }
}

#[cfg(unix)]
fn ensure_executable(path: &Path) -> Result<(), BuildError> {
    use std::os::unix::fs::PermissionsExt;

    let map_err = |e| BuildError::ExecutablePermissions(path.to_path_buf(), e);
    let metadata = std::fs::metadata(path).map_err(map_err)?;
    let mut permissions = metadata.permissions();
    if permissions.mode() & 0o111 == 0 {
        permissions.set_mode(permissions.mode() | 0o755);
        std::fs::set_permissions(path, permissions).map_err(map_err)?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn ensure_executable(_path: &Path) -> Result<(), BuildError> {
    Ok(())
}
