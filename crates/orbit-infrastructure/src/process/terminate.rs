use std::process::ExitStatus;
use std::time::Duration;
use tokio::process::Child;

/// Stops `child` and reaps it.
///
/// On Unix the child's process group receives SIGTERM first; if it is still
/// alive after `grace`, the group gets SIGKILL. Killing the whole group also
/// stops grandchildren that would otherwise keep the output pipes open.
pub async fn terminate_child(child: &mut Child, grace: Duration) -> Option<ExitStatus> {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        let group = -(pid as i32);
        // SAFETY: plain syscall; the child has not been reaped yet, so its
        // pid (and process group id) cannot have been reused.
        let sent = unsafe { libc::kill(group, libc::SIGTERM) } == 0;
        if sent {
            if let Ok(Ok(status)) = tokio::time::timeout(grace, child.wait()).await {
                tracing::debug!("[Gateway] Process {} exited after SIGTERM", pid);
                return Some(status);
            }
            tracing::warn!(
                "[Gateway] Process {} ignored SIGTERM for {:?}, sending SIGKILL",
                pid,
                grace
            );
        }
        // SAFETY: see above.
        unsafe {
            libc::kill(group, libc::SIGKILL);
        }
    }

    #[cfg(not(unix))]
    let _ = grace;

    if let Err(e) = child.start_kill() {
        tracing::debug!("[Gateway] start_kill failed (already exited?): {}", e);
    }
    child.wait().await.ok()
}
