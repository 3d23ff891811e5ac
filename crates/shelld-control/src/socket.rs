//! UNIX domain socket lifecycle for the control channel: parent-dir creation,
//! stale-socket cleanup, and restrictive permissions.

#[cfg(not(unix))]
compile_error!("shelld-control requires Unix domain sockets");

use std::path::Path;

use anyhow::{Context, Result};
use tokio::net::UnixListener;

pub async fn bind_listener(socket_path: &Path) -> Result<UnixListener> {
    if let Some(parent) = socket_path.parent() {
        let parent_existed = parent.exists();
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create socket parent: {}", parent.display()))?;
        if !parent_existed {
            set_permissions(parent, 0o700).await?;
        }
    }

    if socket_path.exists() {
        tokio::fs::remove_file(socket_path)
            .await
            .with_context(|| format!("failed to remove stale socket: {}", socket_path.display()))?;
    }

    let listener = UnixListener::bind(socket_path)
        .with_context(|| format!("failed to bind unix socket: {}", socket_path.display()))?;
    set_permissions(socket_path, 0o600).await?;
    Ok(listener)
}

pub async fn cleanup_socket_file(socket_path: &Path) -> Result<()> {
    if socket_path.exists() {
        tokio::fs::remove_file(socket_path)
            .await
            .with_context(|| format!("failed to cleanup socket: {}", socket_path.display()))?;
    }
    Ok(())
}

async fn set_permissions(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .await
        .with_context(|| format!("failed to chmod {mode:o}: {}", path.display()))
}

/// Adopt a systemd-activated listener on fd 3 when `LISTEN_FDS`/`LISTEN_PID`
/// indicate one was passed to this process.
#[cfg(target_os = "linux")]
pub fn bind_systemd_activated_listener() -> Result<Option<UnixListener>> {
    use anyhow::bail;

    let listen_fds = std::env::var("LISTEN_FDS")
        .ok()
        .and_then(|v| v.parse::<i32>().ok())
        .unwrap_or(0);
    if listen_fds <= 0 {
        return Ok(None);
    }

    let listen_pid = std::env::var("LISTEN_PID")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(0);
    if listen_pid != std::process::id() {
        return Ok(None);
    }

    if listen_fds != 1 {
        bail!("expected exactly one LISTEN_FD for shelld, got {listen_fds}");
    }

    const SD_LISTEN_FDS_START: i32 = 3;
    let fd = SD_LISTEN_FDS_START;

    // SAFETY: reading and updating fd flags via fcntl on the inherited systemd socket fd.
    let current_flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if current_flags >= 0 {
        // SAFETY: setting O_NONBLOCK on the inherited fd before handing it to tokio.
        let _ = unsafe { libc::fcntl(fd, libc::F_SETFL, current_flags | libc::O_NONBLOCK) };
    }

    // SAFETY: fd ownership transfers exactly once from systemd to the std listener.
    let std_listener = unsafe {
        use std::os::fd::FromRawFd;
        std::os::unix::net::UnixListener::from_raw_fd(fd)
    };
    std_listener
        .set_nonblocking(true)
        .context("failed to set nonblocking on systemd socket fd")?;

    let listener = UnixListener::from_std(std_listener)
        .context("failed to construct tokio UnixListener from systemd socket")?;
    Ok(Some(listener))
}

#[cfg(not(target_os = "linux"))]
pub fn bind_systemd_activated_listener() -> Result<Option<UnixListener>> {
    Ok(None)
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    #[tokio::test]
    async fn bind_listener_sets_restrictive_permissions() -> anyhow::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir()?;
        let socket_path = dir.path().join("private").join("daemon.sock");
        let _listener = super::bind_listener(&socket_path).await?;

        let socket_mode = std::fs::metadata(&socket_path)?.permissions().mode() & 0o777;
        let parent_mode = std::fs::metadata(socket_path.parent().unwrap())?
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(socket_mode, 0o600);
        assert_eq!(parent_mode, 0o700);
        Ok(())
    }

    #[tokio::test]
    async fn bind_and_roundtrip_then_cleanup() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let socket_path = dir.path().join("daemon.sock");
        let listener = super::bind_listener(&socket_path).await?;

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let (read_half, mut write_half) = stream.into_split();
            let mut reader = BufReader::new(read_half);
            let mut line = String::new();
            reader.read_line(&mut line).await.expect("read line");
            write_half.write_all(b"{\"ok\":true}\n").await.expect("write");
        });

        let mut client = tokio::net::UnixStream::connect(&socket_path).await?;
        client.write_all(b"ping\n").await?;
        let mut response = String::new();
        BufReader::new(client).read_line(&mut response).await?;
        server.await?;
        assert_eq!(response.trim(), "{\"ok\":true}");

        super::cleanup_socket_file(&socket_path).await?;
        assert!(!socket_path.exists());
        Ok(())
    }
}
