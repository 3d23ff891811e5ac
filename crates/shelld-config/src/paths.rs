//! Per-workspace UDS socket path derivation:
//!
//! `${XDG_RUNTIME_DIR:-tmpdir}/mcp-shell/<sha256hex(cwd)>/<branch>/daemon.sock`

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

pub const DEFAULT_BRANCH: &str = "main";
const NAMESPACE: &str = "mcp-shell";

/// Runtime root: `$XDG_RUNTIME_DIR` if set, else the platform tmpdir.
pub fn runtime_root() -> PathBuf {
    std::env::var_os("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
}

fn hash_cwd(cwd: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(cwd.to_string_lossy().as_bytes());
    hex::encode(hasher.finalize())
}

/// Resolve the branch name: explicit override, else
/// `MCP_SHELL_DAEMON_BRANCH`/`MCP_SHELL_SERVER_BRANCH`, else `"main"`.
pub fn resolve_branch(explicit: Option<&str>) -> String {
    if let Some(b) = explicit {
        return b.to_string();
    }
    std::env::var("MCP_SHELL_DAEMON_BRANCH")
        .or_else(|_| std::env::var("MCP_SHELL_SERVER_BRANCH"))
        .unwrap_or_else(|_| DEFAULT_BRANCH.to_string())
}

/// Derive the per-workspace daemon socket path.
///
/// Honors `MCP_SHELL_DAEMON_SOCKET` / `--socket` as a direct override
/// (passed in as `socket_override`), bypassing derivation entirely.
pub fn daemon_socket_path(
    cwd: &Path,
    branch: Option<&str>,
    socket_override: Option<&Path>,
) -> PathBuf {
    if let Some(path) = socket_override {
        return path.to_path_buf();
    }
    if let Ok(env_override) = std::env::var("MCP_SHELL_DAEMON_SOCKET") {
        if !env_override.is_empty() {
            return PathBuf::from(env_override);
        }
    }
    runtime_root()
        .join(NAMESPACE)
        .join(hash_cwd(cwd))
        .join(resolve_branch(branch))
        .join("daemon.sock")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn socket_path_is_stable_for_same_cwd_and_branch() {
        let cwd = Path::new("/workspace/project");
        let a = daemon_socket_path(cwd, Some("main"), None);
        let b = daemon_socket_path(cwd, Some("main"), None);
        assert_eq!(a, b);
    }

    #[test]
    fn socket_path_differs_by_cwd() {
        let a = daemon_socket_path(Path::new("/workspace/one"), Some("main"), None);
        let b = daemon_socket_path(Path::new("/workspace/two"), Some("main"), None);
        assert_ne!(a, b);
    }

    #[test]
    fn socket_path_differs_by_branch() {
        let cwd = Path::new("/workspace/project");
        let a = daemon_socket_path(cwd, Some("main"), None);
        let b = daemon_socket_path(cwd, Some("feature"), None);
        assert_ne!(a, b);
    }

    #[test]
    fn explicit_override_wins_over_derivation() {
        let cwd = Path::new("/workspace/project");
        let override_path = Path::new("/tmp/custom.sock");
        let path = daemon_socket_path(cwd, Some("main"), Some(override_path));
        assert_eq!(path, override_path);
    }

    #[test]
    #[serial]
    fn default_branch_is_main() {
        // Clear the env vars this test cares about to avoid cross-test interference.
        unsafe {
            std::env::remove_var("MCP_SHELL_DAEMON_BRANCH");
            std::env::remove_var("MCP_SHELL_SERVER_BRANCH");
        }
        assert_eq!(resolve_branch(None), DEFAULT_BRANCH);
    }

    #[test]
    fn ends_with_daemon_sock() {
        let path = daemon_socket_path(Path::new("/x"), Some("main"), None);
        assert_eq!(path.file_name().unwrap(), "daemon.sock");
    }
}
