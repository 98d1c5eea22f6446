use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::prelude::*;

/// Runs `cmd` to completion and returns its trimmed stdout.
///
/// The child is killed if it is still running when `timeout` elapses.
pub async fn exec(cmd: &mut Command, timeout: Duration) -> Result<String> {
    let cmd_str = format!("{:?}", cmd);
    debug!("Executing command: {}", cmd_str);

    cmd.stdin(Stdio::null()).kill_on_drop(true);
    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(output) => output?,
        Err(_) => {
            return Err(Error::ExecTimeout {
                cmd: cmd_str,
                timeout,
            });
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    for line in stdout.trim().split('\n') {
        debug!("{}", line);
    }
    let status = output.status;
    debug!("Command completed with status: {}", status);
    if !status.success() {
        for line in String::from_utf8_lossy(&output.stderr).trim().split('\n') {
            error!("{}", line);
        }
        return Err(Error::ExecError {
            cmd: cmd_str,
            status,
        });
    }
    Ok(stdout.trim().to_string())
}

/// Builds a command from an argv-style list, `argv[0]` being the program.
pub fn command_from_argv(argv: &[String]) -> Result<Command> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| Error::System("empty command line".to_string()))?;
    let mut cmd = Command::new(program);
    cmd.args(args);
    Ok(cmd)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_trimmed_stdout() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("echo '  hello  '");
        let out = exec(&mut cmd, Duration::from_secs(5)).await.unwrap();
        assert_eq!(out, "hello");
    }

    #[tokio::test]
    async fn non_zero_exit_is_exec_error() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("echo nope >&2; exit 3");
        let err = exec(&mut cmd, Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, Error::ExecError { .. }), "{err}");
    }

    #[tokio::test]
    async fn slow_command_times_out() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let err = exec(&mut cmd, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ExecTimeout { .. }), "{err}");
    }

    #[test]
    fn empty_argv_is_rejected() {
        assert!(command_from_argv(&[]).is_err());
    }
}
