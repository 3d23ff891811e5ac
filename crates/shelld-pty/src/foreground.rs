//! Foreground-process detection and the `sendTo` program guard grammar.

use shelld_core::types::ForegroundProcess;

/// Scan `/proc` for the PTY's latest foreground child: entries whose `ppid`
/// is `pty_pid`, picking the one with the greatest process start time.
#[cfg(target_os = "linux")]
pub fn detect_foreground(pty_pid: i32) -> Option<ForegroundProcess> {
    use std::fs;

    let mut best: Option<(u64, ForegroundProcess)> = None;

    let entries = fs::read_dir("/proc").ok()?;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(pid) = name.to_str().and_then(|s| s.parse::<i32>().ok()) else {
            continue;
        };
        let stat_path = entry.path().join("stat");
        let Ok(stat) = fs::read_to_string(&stat_path) else {
            continue;
        };
        let Some((ppid, start_time)) = parse_stat(&stat) else {
            continue;
        };
        if ppid != pty_pid {
            continue;
        }
        if best.as_ref().is_none_or(|(t, _)| start_time > *t) {
            let exe = fs::read_link(entry.path().join("exe"))
                .ok()
                .and_then(|p| p.to_str().map(str::to_string));
            let comm = fs::read_to_string(entry.path().join("comm"))
                .map(|s| s.trim().to_string())
                .unwrap_or_default();
            best = Some((
                start_time,
                ForegroundProcess {
                    pid,
                    name: comm,
                    exe,
                    is_session_leader: is_session_leader(pid),
                },
            ));
        }
    }

    best.map(|(_, p)| p)
}

#[cfg(target_os = "linux")]
fn is_session_leader(pid: i32) -> bool {
    std::fs::read_to_string(format!("/proc/{pid}/stat"))
        .ok()
        .and_then(|stat| parse_sid(&stat))
        .is_some_and(|sid| sid == pid)
}

/// `/proc/<pid>/stat` has the form `pid (comm) state ppid ... session ... starttime ...`.
/// The comm field may contain spaces/parens, so split on the closing paren first.
#[cfg(target_os = "linux")]
fn parse_stat(stat: &str) -> Option<(i32, u64)> {
    let close = stat.rfind(')')?;
    let rest = stat.get(close + 2..)?;
    let fields: Vec<&str> = rest.split_whitespace().collect();
    // fields[0] = state, fields[1] = ppid, ... fields[19] = starttime (22nd overall field).
    let ppid: i32 = fields.get(1)?.parse().ok()?;
    let start_time: u64 = fields.get(19)?.parse().ok()?;
    Some((ppid, start_time))
}

#[cfg(target_os = "linux")]
fn parse_sid(stat: &str) -> Option<i32> {
    let close = stat.rfind(')')?;
    let rest = stat.get(close + 2..)?;
    let fields: Vec<&str> = rest.split_whitespace().collect();
    fields.get(3)?.parse().ok()
}

#[cfg(not(target_os = "linux"))]
pub fn detect_foreground(_pty_pid: i32) -> Option<ForegroundProcess> {
    None
}

/// Evaluate the `sendTo` grammar against the detected foreground process.
/// When foreground cannot be determined, the guard fails closed.
pub fn guard_allows(send_to: &str, foreground: Option<&ForegroundProcess>) -> bool {
    if send_to == "*" {
        return true;
    }
    let Some(fg) = foreground else {
        return false;
    };

    if send_to == "sessionleader:" || send_to == "loginshell:" {
        return fg.is_session_leader;
    }
    if let Some(pid_str) = send_to.strip_prefix("pid:") {
        return pid_str.parse::<i32>().map(|p| p == fg.pid).unwrap_or(false);
    }
    if send_to.starts_with('/') {
        return fg.exe.as_deref() == Some(send_to);
    }
    fg.name == send_to
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proc(pid: i32, name: &str, exe: Option<&str>, leader: bool) -> ForegroundProcess {
        ForegroundProcess {
            pid,
            name: name.to_string(),
            exe: exe.map(str::to_string),
            is_session_leader: leader,
        }
    }

    #[test]
    fn wildcard_always_passes() {
        assert!(guard_allows("*", None));
    }

    #[test]
    fn missing_foreground_fails_closed() {
        assert!(!guard_allows("bash", None));
    }

    #[test]
    fn pid_prefix_matches_exact_pid() {
        let fg = proc(42, "vim", None, false);
        assert!(guard_allows("pid:42", Some(&fg)));
        assert!(!guard_allows("pid:41", Some(&fg)));
    }

    #[test]
    fn absolute_path_matches_exe_link() {
        let fg = proc(1, "vim", Some("/usr/bin/vim"), false);
        assert!(guard_allows("/usr/bin/vim", Some(&fg)));
        assert!(!guard_allows("/usr/bin/emacs", Some(&fg)));
    }

    #[test]
    fn session_leader_keyword_checks_flag() {
        let fg = proc(1, "bash", None, true);
        assert!(guard_allows("sessionleader:", Some(&fg)));
        assert!(guard_allows("loginshell:", Some(&fg)));
    }

    #[test]
    fn short_name_fallback_matches_process_name() {
        let fg = proc(1, "vim", Some("/usr/bin/vim"), false);
        assert!(guard_allows("vim", Some(&fg)));
        assert!(!guard_allows("emacs", Some(&fg)));
    }
}
