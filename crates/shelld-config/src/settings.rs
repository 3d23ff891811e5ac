//! Ambient runtime settings.
//!
//! This is deliberately not a config-file/schema/migration system — that
//! layer is treated as an external collaborator. What's here is the minimal
//! set of environment-derived knobs the core subsystems need to start.

use std::net::IpAddr;
use std::path::PathBuf;

use crate::paths;

const DEFAULT_EXECUTOR_HOST: &str = "127.0.0.1";
const DEFAULT_EXECUTOR_PORT: u16 = 4030;
const DEFAULT_OUTPUT_DIR: &str = "/tmp/mcp-shell-outputs";

#[derive(Debug, Clone)]
pub struct Settings {
    pub workspace_cwd: PathBuf,
    pub branch: String,
    pub socket_path: PathBuf,
    pub executor_host: IpAddr,
    pub executor_port: u16,
    pub output_dir: PathBuf,
    pub executor_token: Option<String>,
    pub executor_autostart: bool,
}

impl Settings {
    /// Build settings from the current environment and an optional CLI
    /// override for `--socket`/`--branch`.
    pub fn load(
        workspace_cwd: PathBuf,
        branch_override: Option<&str>,
        socket_override: Option<PathBuf>,
    ) -> anyhow::Result<Self> {
        let branch = paths::resolve_branch(branch_override);
        let socket_path = paths::daemon_socket_path(
            &workspace_cwd,
            Some(branch.as_str()),
            socket_override.as_deref(),
        );

        let executor_host = std::env::var("EXECUTOR_HOST")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(|| DEFAULT_EXECUTOR_HOST.parse().unwrap());
        let executor_port = std::env::var("EXECUTOR_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_EXECUTOR_PORT);
        let output_dir = std::env::var("MCP_SHELL_OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_OUTPUT_DIR));
        let executor_token = std::env::var("EXECUTOR_TOKEN").ok().filter(|s| !s.is_empty());
        let executor_autostart = std::env::var("EXECUTOR_AUTOSTART")
            .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Self {
            workspace_cwd,
            branch,
            socket_path,
            executor_host,
            executor_port,
            output_dir,
            executor_token,
            executor_autostart,
        })
    }

    pub fn executor_url(&self) -> String {
        std::env::var("EXECUTOR_URL")
            .unwrap_or_else(|_| format!("http://{}:{}", self.executor_host, self.executor_port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn defaults_when_env_unset() {
        unsafe {
            std::env::remove_var("EXECUTOR_HOST");
            std::env::remove_var("EXECUTOR_PORT");
            std::env::remove_var("MCP_SHELL_OUTPUT_DIR");
            std::env::remove_var("EXECUTOR_TOKEN");
            std::env::remove_var("EXECUTOR_AUTOSTART");
        }
        let settings = Settings::load(PathBuf::from("/ws"), Some("main"), None).unwrap();
        assert_eq!(settings.executor_port, DEFAULT_EXECUTOR_PORT);
        assert_eq!(settings.output_dir, PathBuf::from(DEFAULT_OUTPUT_DIR));
        assert!(settings.executor_token.is_none());
        assert!(!settings.executor_autostart);
    }

    #[test]
    #[serial]
    fn reads_executor_port_override() {
        unsafe {
            std::env::set_var("EXECUTOR_PORT", "9090");
        }
        let settings = Settings::load(PathBuf::from("/ws"), Some("main"), None).unwrap();
        assert_eq!(settings.executor_port, 9090);
        unsafe {
            std::env::remove_var("EXECUTOR_PORT");
        }
    }

    #[test]
    #[serial]
    fn executor_url_prefers_explicit_override() {
        unsafe {
            std::env::set_var("EXECUTOR_URL", "http://example.invalid:1234");
        }
        let settings = Settings::load(PathBuf::from("/ws"), Some("main"), None).unwrap();
        assert_eq!(settings.executor_url(), "http://example.invalid:1234");
        unsafe {
            std::env::remove_var("EXECUTOR_URL");
        }
    }
}
