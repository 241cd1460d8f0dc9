use std::ffi::OsString;
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Result of one external tool invocation.
#[derive(Debug)]
pub enum RunOutcome {
    Completed {
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
    /// The process was killed after exceeding the timeout.
    TimedOut,
    /// The binary does not exist.
    Missing,
}

const WAIT_TICK: Duration = Duration::from_millis(20);

/// Run `binary` with `args`, killing it if it has not exited within `timeout`.
pub fn run(binary: &Path, args: &[OsString], timeout: Duration) -> std::io::Result<RunOutcome> {
    let mut child = match Command::new(binary)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(RunOutcome::Missing),
        Err(e) => return Err(e),
    };

    // Drain both pipes while waiting so a chatty child cannot fill them and stall.
    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let deadline = Instant::now() + timeout;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            // Grandchildren may still hold the pipes; leave the readers detached.
            return Ok(RunOutcome::TimedOut);
        }
        std::thread::sleep(WAIT_TICK);
    };

    Ok(RunOutcome::Completed {
        code: status.code(),
        stdout: collect(stdout),
        stderr: collect(stderr),
    })
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn collect(reader: Option<JoinHandle<Vec<u8>>>) -> String {
    reader
        .and_then(|handle| handle.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}
