//! Daemon lifecycle management (stop, status).

use relay_config_and_utils::Paths;
use relay_ipc::{IpcClient, Method};
use std::time::Duration;

/// Upper bound on a graceful stop: the relay's own shutdown grace plus slack.
const STOP_WAIT: Duration = Duration::from_secs(15);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Stop the daemon.
pub async fn stop_daemon(paths: &Paths) -> Result<(), Box<dyn std::error::Error>> {
    let socket_path = paths.socket_file();
    let pid_path = paths.pid_file();

    if !socket_path.exists() {
        println!("Relay is not running (socket not found)");
        // Clean up stale PID file if it exists
        if pid_path.exists() {
            let _ = std::fs::remove_file(&pid_path);
        }
        return Ok(());
    }

    // Try graceful shutdown first
    let client = IpcClient::new(&socket_path);

    match client.call_method(Method::Shutdown).await {
        Ok(response) => {
            if response.is_success() {
                println!("Relay shutdown initiated");
            } else {
                println!("Shutdown failed: {:?}", response.error);
            }
        }
        Err(e) => {
            println!("Failed to connect to relay: {}", e);
        }
    }

    // The relay lets retrying dispatches reach the buffer before it exits.
    let polls = STOP_WAIT.as_millis() / POLL_INTERVAL.as_millis();
    for _ in 0..polls {
        tokio::time::sleep(POLL_INTERVAL).await;
        if !socket_path.exists() && !pid_path.exists() {
            println!("Relay stopped");
            return Ok(());
        }
    }

    // If still running, try to force kill using PID
    if let Some(pid) = read_pid(paths) {
        println!(
            "Relay did not stop gracefully, sending SIGKILL to PID {}",
            pid
        );
        unsafe {
            libc::kill(pid, libc::SIGKILL);
        }
        // Clean up files
        let _ = std::fs::remove_file(&socket_path);
        let _ = std::fs::remove_file(&pid_path);
        println!("Relay killed");
        return Ok(());
    }

    // Last resort: clean up socket file
    if socket_path.exists() {
        let _ = std::fs::remove_file(&socket_path);
        println!("Cleaned up stale socket file");
    }

    Ok(())
}

/// Check daemon status.
pub async fn check_status(paths: &Paths) -> Result<(), Box<dyn std::error::Error>> {
    let socket_path = paths.socket_file();

    if !socket_path.exists() {
        println!("Relay is not running (socket not found)");
        return Ok(());
    }

    let client = IpcClient::new(&socket_path);

    match client.call_method(Method::Health).await {
        Ok(response) => {
            if response.is_success() {
                if let Some(result) = response.result {
                    let field = |name: &str| {
                        result
                            .get(name)
                            .map(|v| match v.as_str() {
                                Some(s) => s.to_string(),
                                None => v.to_string(),
                            })
                            .unwrap_or_else(|| "unknown".to_string())
                    };

                    println!("Relay is running");
                    println!("  Status:  {}", field("status"));
                    println!("  Version: {}", field("version"));
                    println!("  Pending: {}", field("pending"));
                    println!("  Channel: {}", field("channel"));
                    println!("  Policy:  {}", field("clear_policy"));
                    if let Some(pid) = read_pid(paths) {
                        println!("  PID:     {}", pid);
                    }
                    println!("  Socket:  {}", socket_path.display());
                } else {
                    println!("Relay is running (no details available)");
                }
            } else {
                println!("Relay returned error: {:?}", response.error);
            }
        }
        Err(e) => {
            println!("Failed to connect to relay: {}", e);
            println!("Relay may not be running or socket may be stale");
        }
    }

    Ok(())
}

fn read_pid(paths: &Paths) -> Option<i32> {
    std::fs::read_to_string(paths.pid_file())
        .ok()
        .and_then(|s| s.trim().parse().ok())
}
