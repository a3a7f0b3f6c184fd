// FlowLab: Provisioning and Verifying Emulated Networks
// Copyright (C) 2021  Tibor Schneider
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! Execution of external commands with a bounded timeout

use crate::{CommandOutput, Error, Result};

use log::*;

use std::io::{ErrorKind, Read};
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{channel, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL_MS: u64 = 10;
/// Time to collect the remaining output after the process exited or was killed
const DRAIN_GRACE_MS: u64 = 100;

/// Run a command and wait until it exits, or until the `timeout` is reached. In the latter case,
/// the process is killed and the output captured up to that point is returned, with `timed_out`
/// set. The exit status is not checked, use [`CommandOutput::checked`] for that.
///
/// The command runs in its own process group, and the whole group is killed on timeout. Both
/// output streams are read on separate threads, such that the child never blocks on a full pipe.
/// Descendants which keep the pipes open (like `sudo` or a shell forking into the background)
/// never extend the wait beyond the timeout. Their output is only captured up to that point.
pub fn run_command(argv: &[String], timeout: Duration) -> Result<CommandOutput> {
    let (program, args) = argv.split_first().ok_or(Error::EmptyCommand)?;
    let command = argv.join(" ");
    debug!("$ {}", command);

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .spawn()?;

    let (done_tx, done_rx) = channel();
    let stdout = spawn_reader(child.stdout.take(), done_tx.clone());
    let stderr = spawn_reader(child.stderr.take(), done_tx);

    let start = Instant::now();
    let mut timed_out = false;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status.code();
        }
        if start.elapsed() > timeout {
            warn!("Command `{}` did not finish within {:?}, killing it", command, timeout);
            kill_group(&mut child);
            timed_out = true;
            break None;
        }
        thread::sleep(Duration::from_millis(POLL_INTERVAL_MS));
    };

    // wait for both readers, but never beyond the deadline
    let grace = Instant::now() + Duration::from_millis(DRAIN_GRACE_MS);
    let deadline = if timed_out { grace } else { grace.max(start + timeout) };
    let mut finished = 0;
    while finished < 2 {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match done_rx.recv_timeout(remaining) {
            Ok(()) => finished += 1,
            Err(_) => {
                debug!("Output of `{}` is still held open, not waiting for it", command);
                break;
            }
        }
    }

    Ok(CommandOutput {
        command,
        stdout: take_output(&stdout),
        stderr: take_output(&stderr),
        status,
        timed_out,
        timeout,
    })
}

/// Kill the process group of the child, and reap the child itself.
fn kill_group(child: &mut Child) {
    // the child is the leader of its own group
    let pgid = child.id() as libc::pid_t;
    // SAFETY: kill only sends a signal, and the negated pid addresses exactly the group of the
    // child, which was created at spawn.
    let killed = unsafe { libc::kill(-pgid, libc::SIGKILL) } == 0;
    if !killed {
        // the process might have exited in the meantime
        let _ = child.kill();
    }
    let _ = child.wait();
}

/// Read a pipe on its own thread, appending to a shared buffer. The thread signals `done` on EOF.
fn spawn_reader<R: Read + Send + 'static>(
    pipe: Option<R>,
    done: Sender<()>,
) -> Arc<Mutex<Vec<u8>>> {
    let buffer = Arc::new(Mutex::new(Vec::new()));
    let shared = buffer.clone();
    thread::spawn(move || {
        if let Some(mut pipe) = pipe {
            let mut chunk = [0u8; 4096];
            loop {
                match pipe.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => lock(&shared).extend_from_slice(&chunk[..n]),
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    // a broken pipe only truncates the output
                    Err(_) => break,
                }
            }
        }
        let _ = done.send(());
    });
    buffer
}

fn take_output(buffer: &Arc<Mutex<Vec<u8>>>) -> String {
    String::from_utf8_lossy(&lock(buffer)).into_owned()
}

fn lock(buffer: &Mutex<Vec<u8>>) -> std::sync::MutexGuard<'_, Vec<u8>> {
    buffer.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod test {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn captures_output_and_status() {
        let cmd = argv(&["sh", "-c", "echo hello; echo oops >&2; exit 3"]);
        let out = match run_command(&cmd, Duration::from_secs(10)) {
            Ok(out) => out,
            Err(e) => {
                eprintln!("Cannot spawn a shell! Skipping the test: {}", e);
                return;
            }
        };
        assert_eq!(out.stdout, "hello\n");
        assert_eq!(out.stderr, "oops\n");
        assert_eq!(out.status, Some(3));
        assert!(!out.timed_out);
        assert!(!out.success());
        assert!(matches!(out.checked(), Err(Error::CommandFailed { status: Some(3), .. })));
    }

    #[test]
    fn kills_on_timeout() {
        let out = match run_command(&argv(&["sleep", "5"]), Duration::from_millis(100)) {
            Ok(out) => out,
            Err(e) => {
                eprintln!("Cannot spawn sleep! Skipping the test: {}", e);
                return;
            }
        };
        assert!(out.timed_out);
        assert_eq!(out.status, None);
        assert!(matches!(out.checked(), Err(Error::Timeout { .. })));
    }

    #[test]
    fn kills_the_whole_group() {
        let cmd = argv(&["sh", "-c", "echo started; sleep 4; echo done"]);
        let start = Instant::now();
        let out = match run_command(&cmd, Duration::from_millis(200)) {
            Ok(out) => out,
            Err(e) => {
                eprintln!("Cannot spawn a shell! Skipping the test: {}", e);
                return;
            }
        };
        assert!(start.elapsed() < Duration::from_secs(2));
        assert!(out.timed_out);
        assert_eq!(out.stdout, "started\n");
    }

    #[test]
    fn background_children_do_not_extend_the_wait() {
        // the shell exits, but the background sleep keeps stdout open
        let cmd = argv(&["sh", "-c", "sleep 4 & echo hello"]);
        let start = Instant::now();
        let out = match run_command(&cmd, Duration::from_millis(300)) {
            Ok(out) => out,
            Err(e) => {
                eprintln!("Cannot spawn a shell! Skipping the test: {}", e);
                return;
            }
        };
        assert!(start.elapsed() < Duration::from_secs(2));
        assert!(!out.timed_out);
        assert_eq!(out.status, Some(0));
        assert_eq!(out.stdout, "hello\n");
    }

    #[test]
    fn empty_command() {
        assert!(matches!(run_command(&[], Duration::from_secs(1)), Err(Error::EmptyCommand)));
    }
}
