//! Start and stop of the server under test.
//!
//! On unix every server is spawned as the leader of its own process group and
//! all signals go to the group, so wrappers such as `uv run` cannot leave
//! their workers behind.

use std::collections::VecDeque;
use std::io::ErrorKind;
use std::net::TcpListener;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, timeout};

use crate::config::ServerSettings;
use crate::exec_utils::command_from_argv;
use crate::framework::FrameworkDescriptor;
use crate::http_probe::ReadinessProbe;
use crate::prelude::*;

const STDERR_TAIL_LINES: usize = 50;
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// A running server. Dropping it without [`Supervisor::stop`] kills it.
#[derive(Debug)]
pub struct ServerProcess {
    name: String,
    pid: Option<u32>,
    child: Child,
    stderr_tail: Option<JoinHandle<Vec<String>>>,
    stopped: bool,
}

impl ServerProcess {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    async fn take_stderr(&mut self) -> String {
        let Some(mut handle) = self.stderr_tail.take() else {
            return String::new();
        };
        match timeout(STDERR_DRAIN_TIMEOUT, &mut handle).await {
            Ok(Ok(lines)) => lines.join("\n"),
            _ => {
                handle.abort();
                String::new()
            }
        }
    }

    fn terminate(&mut self) {
        #[cfg(unix)]
        {
            if let Err(e) = self.signal_group(nix::sys::signal::Signal::SIGTERM) {
                warn!("Failed to send SIGTERM to {} (pid {:?}): {}", self.name, self.pid, e);
            }
        }
        #[cfg(not(unix))]
        {
            let _ = self.child.start_kill();
        }
    }

    fn force_kill(&mut self) {
        self.kill_group();
        let _ = self.child.start_kill();
    }

    /// SIGKILL whatever is left in the process group.
    fn kill_group(&self) {
        #[cfg(unix)]
        {
            match self.signal_group(nix::sys::signal::Signal::SIGKILL) {
                Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
                Err(e) => warn!("Failed to kill process group of {}: {}", self.name, e),
            }
        }
    }

    #[cfg(unix)]
    fn signal_group(&self, signal: nix::sys::signal::Signal) -> nix::Result<()> {
        use nix::sys::signal::killpg;
        use nix::unistd::Pid;

        match self.pid {
            Some(pid) => killpg(Pid::from_raw(pid as i32), signal),
            None => Ok(()),
        }
    }
}

impl Drop for ServerProcess {
    fn drop(&mut self) {
        if !self.stopped {
            warn!("Server {} dropped while running, killing it", self.name);
            self.force_kill();
        }
        if let Some(handle) = self.stderr_tail.take() {
            handle.abort();
        }
    }
}

pub struct Supervisor {
    settings: ServerSettings,
    probe: Box<dyn ReadinessProbe>,
}

impl Supervisor {
    pub fn new(settings: ServerSettings, probe: Box<dyn ReadinessProbe>) -> Self {
        Supervisor { settings, probe }
    }

    /// Launches `framework` and waits until it accepts connections.
    pub async fn start(&self, framework: &FrameworkDescriptor) -> Result<ServerProcess> {
        info!("Starting {} server...", framework.name);
        ensure_port_free(framework.port)?;

        let argv = framework.command();
        let mut cmd = command_from_argv(&argv)?;
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        debug!("Spawning {:?}", argv);
        let mut child = cmd.spawn().map_err(|e| Error::StartupError {
            name: framework.name.clone(),
            reason: format!("failed to spawn {:?}: {}", argv, e),
        })?;
        let pid = child.id();
        let stderr_tail = child
            .stderr
            .take()
            .map(|stderr| collect_stderr(framework.key.clone(), stderr));
        let mut server = ServerProcess {
            name: framework.name.clone(),
            pid,
            child,
            stderr_tail,
            stopped: false,
        };

        let startup_timeout = self.settings.startup_timeout();
        let deadline = Instant::now() + startup_timeout;
        loop {
            if let Some(status) = server.child.try_wait()? {
                server.kill_group();
                server.stopped = true;
                let stderr = server.take_stderr().await;
                error!("Server failed to start: {}", stderr);
                let reason = if stderr.is_empty() {
                    format!("exited with {} during startup", status)
                } else {
                    format!("exited with {} during startup: {}", status, stderr)
                };
                return Err(Error::StartupError {
                    name: framework.name.clone(),
                    reason,
                });
            }

            if self.probe.is_ready(framework.port).await {
                info!(
                    "{} server ready on port {} (pid {:?})",
                    framework.name, framework.port, pid
                );
                return Ok(server);
            }

            if Instant::now() >= deadline {
                error!(
                    "{} server not ready after {:?}, stopping it",
                    framework.name, startup_timeout
                );
                if let Err(e) = self.stop(server).await {
                    warn!("Failed to stop {}: {}", framework.name, e);
                }
                return Err(Error::ServerStartTimeoutError {
                    name: framework.name.clone(),
                    timeout: startup_timeout,
                });
            }

            sleep(self.settings.probe_interval()).await;
        }
    }

    /// Terminates the server: SIGTERM, bounded wait, then SIGKILL and an
    /// unbounded wait. The process is always reaped.
    pub async fn stop(&self, mut server: ServerProcess) -> Result<ExitStatus> {
        info!("Stopping {} server (pid {:?})", server.name, server.pid);
        server.terminate();

        let stop_timeout = self.settings.stop_timeout();
        let status = match timeout(stop_timeout, server.child.wait()).await {
            Ok(status) => status,
            Err(_) => {
                warn!(
                    "{} did not exit within {:?}, killing it",
                    server.name, stop_timeout
                );
                server.force_kill();
                server.child.wait().await
            }
        };
        server.kill_group();
        server.stopped = status.is_ok();

        let status = status?;
        debug!("{} exited with {}", server.name, status);
        Ok(status)
    }
}

fn ensure_port_free(port: u16) -> Result<()> {
    match TcpListener::bind(("127.0.0.1", port)) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AddrInUse => Err(Error::PortInUse(port)),
        Err(e) => Err(Error::System(format!("cannot check port {}: {}", port, e))),
    }
}

fn collect_stderr(key: String, stderr: ChildStderr) -> JoinHandle<Vec<String>> {
    tokio::spawn(async move {
        let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!("[{}] {}", key, line);
            if tail.len() == STDERR_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line);
        }
        Vec::from(tail)
    })
}
