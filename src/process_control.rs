#[cfg(target_os = "windows")]
use std::os::windows::process::CommandExt;
use std::{
    io,
    process::{Command, ExitStatus, Stdio},
    time::Duration,
};

use crate::backend_process::ExitSignal;

const FORCE_STOP_WAIT_MIN_MS: u64 = 200;
#[cfg(target_os = "windows")]
const WINDOWS_GRACEFUL_STOP_NONZERO_WAIT_MS: u64 = 350;
#[cfg(target_os = "windows")]
const FORCE_STOP_WAIT_MAX_WINDOWS_MS: u64 = 2_200;
#[cfg(not(target_os = "windows"))]
const FORCE_STOP_WAIT_MAX_NON_WINDOWS_MS: u64 = 1_500;
#[cfg(target_os = "windows")]
pub(crate) const WINDOWS_CREATE_NO_WINDOW: u32 = 0x0800_0000;
#[cfg(target_os = "windows")]
pub(crate) const WINDOWS_CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;

fn run_stop_command<F>(
    pid: u32,
    label: &str,
    program: &str,
    args: &[&str],
    log: F,
) -> io::Result<ExitStatus>
where
    F: Fn(&str) + Copy,
{
    let mut command = Command::new(program);
    command
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .stdin(Stdio::null());
    #[cfg(target_os = "windows")]
    {
        command.creation_flags(WINDOWS_CREATE_NO_WINDOW);
    }
    let status = command.status();

    match &status {
        Ok(exit_status) if exit_status.success() => {}
        Ok(exit_status) => log(&format!(
            "{label} returned non-zero: pid={pid}, status={exit_status:?}"
        )),
        Err(error) => log(&format!(
            "{label} failed to start: pid={pid}, error={error}"
        )),
    }

    status
}

fn compute_followup_wait(timeout: Duration, max_extra_wait: Duration) -> Duration {
    if timeout.is_zero() {
        Duration::ZERO
    } else {
        (timeout / 4)
            .max(Duration::from_millis(FORCE_STOP_WAIT_MIN_MS))
            .min(max_extra_wait)
    }
}

fn resolve_graceful_wait_timeout<F>(
    pid: u32,
    timeout: Duration,
    non_success_wait_cap: Duration,
    graceful_status: &io::Result<ExitStatus>,
    command_label: &str,
    log: F,
) -> Duration
where
    F: Fn(&str) + Copy,
{
    match graceful_status {
        Ok(status) if status.success() => timeout,
        _ => {
            let shortened_wait = timeout.min(non_success_wait_cap);
            if shortened_wait < timeout {
                let outcome = match graceful_status {
                    Ok(status) => format!("status={status:?}"),
                    Err(error) => format!("error={error}"),
                };
                log(&format!(
                    "{command_label} not successful; shorten graceful wait: pid={pid}, {outcome}, requested_wait_ms={}, effective_wait_ms={}",
                    timeout.as_millis(),
                    shortened_wait.as_millis()
                ));
            }
            shortened_wait
        }
    }
}

/// Stops the backend and every process it spawned.
///
/// `pid` must be the leader of its own process group (Unix) or of a new
/// process group (Windows). Exit is observed through `exit_signal`, which the
/// backend's watcher thread fires once it has reaped the leader. Returns
/// whether the exit was confirmed.
#[cfg(target_os = "windows")]
pub fn terminate_process_tree<F>(
    pid: u32,
    exit_signal: &ExitSignal,
    timeout: Duration,
    log: F,
) -> bool
where
    F: Fn(&str) + Copy,
{
    if exit_signal.get().is_some() {
        return true;
    }
    let pid_arg = pid.to_string();

    let graceful_status = run_stop_command(
        pid,
        "taskkill graceful stop",
        "taskkill",
        &["/pid", &pid_arg, "/t"],
        log,
    );

    let graceful_wait_timeout = resolve_graceful_wait_timeout(
        pid,
        timeout,
        Duration::from_millis(WINDOWS_GRACEFUL_STOP_NONZERO_WAIT_MS),
        &graceful_status,
        "taskkill graceful stop",
        log,
    );

    if exit_signal.wait_timeout(graceful_wait_timeout).is_some() {
        return true;
    }

    let force_status = run_stop_command(
        pid,
        "taskkill force stop",
        "taskkill",
        &["/pid", &pid_arg, "/t", "/f"],
        log,
    );

    let followup_wait = compute_followup_wait(
        timeout,
        Duration::from_millis(FORCE_STOP_WAIT_MAX_WINDOWS_MS),
    );
    log(&format!(
        "backend graceful stop timed out, force-kill issued: pid={pid}, graceful={graceful_status:?}, force={force_status:?}, followup_wait_ms={}",
        followup_wait.as_millis(),
    ));
    exit_signal.wait_timeout(followup_wait).is_some()
}

#[cfg(not(target_os = "windows"))]
pub fn terminate_process_tree<F>(
    pid: u32,
    exit_signal: &ExitSignal,
    timeout: Duration,
    log: F,
) -> bool
where
    F: Fn(&str) + Copy,
{
    let group_arg = format!("-{pid}");

    if exit_signal.get().is_some() {
        sweep_process_group(&group_arg);
        return true;
    }

    let graceful_status = run_stop_command(
        pid,
        "kill -TERM",
        "kill",
        &["-TERM", "--", &group_arg],
        log,
    );

    let graceful_wait_timeout =
        resolve_graceful_wait_timeout(pid, timeout, timeout, &graceful_status, "kill -TERM", log);
    if exit_signal.wait_timeout(graceful_wait_timeout).is_some() {
        sweep_process_group(&group_arg);
        return true;
    }

    let force_status = run_stop_command(
        pid,
        "kill -KILL",
        "kill",
        &["-KILL", "--", &group_arg],
        log,
    );

    let followup_wait = compute_followup_wait(
        timeout,
        Duration::from_millis(FORCE_STOP_WAIT_MAX_NON_WINDOWS_MS),
    );
    log(&format!(
        "backend graceful stop timed out, force-kill issued: pid={pid}, graceful={graceful_status:?}, force={force_status:?}, followup_wait_ms={}",
        followup_wait.as_millis(),
    ));

    exit_signal.wait_timeout(followup_wait).is_some()
}

/// Kills whatever is left of a backend tree whose leader already exited on
/// its own. Returns whether any survivor was signalled.
#[cfg(not(target_os = "windows"))]
pub fn kill_orphaned_process_tree<F>(pid: u32, log: F) -> bool
where
    F: Fn(&str),
{
    let swept = sweep_process_group(&format!("-{pid}"));
    if swept {
        log(&format!(
            "backend leader exited with survivors in its group, killed them: pgid={pid}"
        ));
    }
    swept
}

#[cfg(target_os = "windows")]
pub fn kill_orphaned_process_tree<F>(pid: u32, log: F) -> bool
where
    F: Fn(&str),
{
    let pid_arg = pid.to_string();
    match Command::new("taskkill")
        .args(["/pid", &pid_arg, "/t", "/f"])
        .creation_flags(WINDOWS_CREATE_NO_WINDOW)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
    {
        Ok(status) if status.success() => {
            log(&format!("killed leftover backend tree: pid={pid}"));
            true
        }
        Ok(_) => false,
        Err(error) => {
            log(&format!(
                "failed to run taskkill for leftover backend tree: pid={pid}, error={error}"
            ));
            false
        }
    }
}

// Children that ignored SIGTERM keep the group alive after the leader is gone.
// A pgid is not reused while any member of the group exists, so the kill is
// only sent after `kill -0` has seen at least one member.
#[cfg(not(target_os = "windows"))]
fn sweep_process_group(group_arg: &str) -> bool {
    signal_process_group("-0", group_arg) && signal_process_group("-KILL", group_arg)
}

#[cfg(not(target_os = "windows"))]
fn signal_process_group(signal: &str, group_arg: &str) -> bool {
    Command::new("kill")
        .args([signal, "--", group_arg])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

#[cfg(target_os = "linux")]
pub fn is_process_alive(pid: u32) -> bool {
    // Zombies still answer `kill -0`, so read the scheduler state instead.
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => stat
            .rsplit_once(')')
            .and_then(|(_, rest)| rest.split_whitespace().next())
            .map(|state| state != "Z" && state != "X")
            .unwrap_or(false),
        Err(_) => false,
    }
}

#[cfg(all(unix, not(target_os = "linux")))]
pub fn is_process_alive(pid: u32) -> bool {
    Command::new("kill")
        .args(["-0", &pid.to_string()])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

#[cfg(target_os = "windows")]
pub fn is_process_alive(pid: u32) -> bool {
    let mut command = Command::new("tasklist");
    command
        .args(["/FI", &format!("PID eq {pid}"), "/NH", "/FO", "CSV"])
        .stdin(Stdio::null())
        .stderr(Stdio::null());
    command.creation_flags(WINDOWS_CREATE_NO_WINDOW);
    command
        .output()
        .map(|output| {
            String::from_utf8_lossy(&output.stdout).contains(&format!("\"{pid}\""))
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn compute_followup_wait_respects_min_and_cap() {
        assert_eq!(
            compute_followup_wait(Duration::from_millis(0), Duration::from_millis(900)),
            Duration::ZERO
        );
        assert_eq!(
            compute_followup_wait(Duration::from_millis(100), Duration::from_millis(900)),
            Duration::from_millis(200)
        );
        assert_eq!(
            compute_followup_wait(Duration::from_millis(9_000), Duration::from_millis(900)),
            Duration::from_millis(900)
        );
    }

    #[test]
    fn resolve_graceful_wait_timeout_shortens_and_logs_on_failure() {
        let logs = Mutex::new(Vec::new());
        let graceful_status: io::Result<ExitStatus> = Err(io::Error::other("simulated failure"));
        let wait = resolve_graceful_wait_timeout(
            42,
            Duration::from_millis(2_000),
            Duration::from_millis(350),
            &graceful_status,
            "taskkill graceful stop",
            |message| logs.lock().expect("lock logs").push(message.to_string()),
        );

        assert_eq!(wait, Duration::from_millis(350));
        let snapshot = logs.lock().expect("lock logs");
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot[0].contains("shorten graceful wait"));
    }

    #[test]
    fn already_exited_backend_counts_as_terminated() {
        let signal = ExitSignal::default();
        signal.notify(crate::backend_process::ExitSummary {
            code: Some(0),
            success: true,
        });
        let logs = Mutex::new(Vec::new());
        assert!(terminate_process_tree(
            u32::MAX / 2,
            &signal,
            Duration::from_millis(500),
            |message| logs.lock().expect("lock logs").push(message.to_string()),
        ));
        assert!(logs.lock().expect("lock logs").is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn terminate_process_tree_kills_grandchildren() {
        use std::{
            io::{BufRead, BufReader},
            os::unix::process::CommandExt as _,
            sync::Arc,
            thread,
        };

        let mut child = Command::new("sh")
            .args(["-c", "sleep 30 & echo $!; wait"])
            .stdout(Stdio::piped())
            .process_group(0)
            .spawn()
            .expect("spawn shell");
        let pid = child.id();
        let stdout = child.stdout.take().expect("piped stdout");
        let mut first_line = String::new();
        BufReader::new(stdout)
            .read_line(&mut first_line)
            .expect("read grandchild pid");
        let grandchild: u32 = first_line.trim().parse().expect("grandchild pid");
        assert!(is_process_alive(grandchild));

        let signal = Arc::new(ExitSignal::default());
        let watcher_signal = Arc::clone(&signal);
        let watcher = thread::spawn(move || {
            let status = child.wait().expect("wait shell");
            watcher_signal.notify(crate::backend_process::ExitSummary::from_status(status));
        });

        assert!(terminate_process_tree(
            pid,
            &signal,
            Duration::from_millis(2_000),
            |_| {}
        ));
        watcher.join().expect("watcher thread");

        let deadline = std::time::Instant::now() + Duration::from_secs(3);
        while is_process_alive(grandchild) && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(50));
        }
        assert!(!is_process_alive(grandchild));
    }

    #[cfg(unix)]
    #[test]
    fn orphaned_group_members_are_killed_after_the_leader_exits() {
        use std::{
            io::{BufRead, BufReader},
            os::unix::process::CommandExt as _,
            thread,
        };

        let mut child = Command::new("sh")
            .args(["-c", "sleep 30 & echo $!; exit 4"])
            .stdout(Stdio::piped())
            .process_group(0)
            .spawn()
            .expect("spawn shell");
        let pid = child.id();
        let stdout = child.stdout.take().expect("piped stdout");
        let mut first_line = String::new();
        BufReader::new(stdout)
            .read_line(&mut first_line)
            .expect("read grandchild pid");
        let grandchild: u32 = first_line.trim().parse().expect("grandchild pid");
        child.wait().expect("wait shell");
        assert!(is_process_alive(grandchild));

        let logs = Mutex::new(Vec::new());
        let log = |message: &str| logs.lock().expect("lock logs").push(message.to_string());
        assert!(kill_orphaned_process_tree(pid, log));

        let deadline = std::time::Instant::now() + Duration::from_secs(3);
        while is_process_alive(grandchild) && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(50));
        }
        assert!(!is_process_alive(grandchild));
        assert_eq!(logs.lock().expect("lock logs").len(), 1);
    }
}
