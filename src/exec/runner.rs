// src/exec/runner.rs

//! Runs one job's process with its output captured to the job's log pair.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::errors::{DispatchError, Result};
use crate::types::{JobId, ResolvedEnvironment};

/// Fire the sender to kill a running job; dropping it does nothing.
pub type CancelToken = oneshot::Receiver<()>;

/// Create a linked cancel sender / token.
pub fn cancel_token() -> (oneshot::Sender<()>, CancelToken) {
    oneshot::channel()
}

/// The stdout/stderr log files of one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogPair {
    pub stdout: PathBuf,
    pub stderr: PathBuf,
}

impl LogPair {
    pub fn for_job(log_dir: &Path, job_id: &JobId) -> Self {
        Self {
            stdout: log_dir.join(format!("{job_id}-stdout.txt")),
            stderr: log_dir.join(format!("{job_id}-stderr.txt")),
        }
    }

    /// Create `log_dir` if needed and open both files, truncating any old
    /// content.
    fn create(&self, log_dir: &Path) -> Result<(File, File)> {
        fs::create_dir_all(log_dir).map_err(|source| DispatchError::LogSetupError {
            path: log_dir.to_path_buf(),
            source,
        })?;

        let open = |path: &Path| {
            File::create(path).map_err(|source| DispatchError::LogSetupError {
                path: path.to_path_buf(),
                source,
            })
        };

        Ok((open(&self.stdout)?, open(&self.stderr)?))
    }
}

/// Run `command` with exactly `env` as its environment.
///
/// Output goes to the job's [`LogPair`] under `log_dir`; a `cmd: [...]`
/// line recording the argv is written to the stdout log before the child
/// starts. A non-zero exit becomes [`DispatchError::ProcessExecutionError`];
/// firing `cancel` kills the child and yields [`DispatchError::Cancelled`].
pub async fn run(
    command: &[String],
    env: &ResolvedEnvironment,
    log_dir: &Path,
    job_id: &JobId,
    cancel: Option<CancelToken>,
) -> Result<ExitStatus> {
    let (program, args) = command.split_first().ok_or_else(|| {
        DispatchError::InvalidCommandTemplate("command vector is empty".to_string())
    })?;

    let logs = LogPair::for_job(log_dir, job_id);
    let (mut stdout_file, stderr_file) = logs.create(log_dir)?;

    writeln!(stdout_file, "cmd: {command:?}")
        .and_then(|_| stdout_file.flush())
        .map_err(|source| DispatchError::LogSetupError {
            path: logs.stdout.clone(),
            source,
        })?;

    info!(
        job_id = %job_id,
        cmd = ?command,
        stdout = %logs.stdout.display(),
        "starting job process"
    );

    let mut child = Command::new(program)
        .args(args)
        .env_clear()
        .envs(env)
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout_file))
        .stderr(Stdio::from(stderr_file))
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| DispatchError::ProcessLaunchError {
            program: program.clone(),
            source,
        })?;

    let waited = match cancel {
        None => child.wait().await,
        Some(mut cancel_rx) => {
            tokio::select! {
                status = child.wait() => status,
                requested = &mut cancel_rx => match requested {
                    Ok(()) => {
                        info!(job_id = %job_id, "cancellation requested; killing job process");
                        if let Err(e) = child.kill().await {
                            warn!(job_id = %job_id, error = %e, "failed to kill job process");
                        }
                        return Err(DispatchError::Cancelled);
                    }
                    Err(_) => {
                        debug!(job_id = %job_id, "cancel sender dropped; waiting for process");
                        child.wait().await
                    }
                }
            }
        }
    };

    let status = waited.map_err(DispatchError::IoError)?;
    let exit_code = exit_code(&status);

    info!(job_id = %job_id, exit_code, success = status.success(), "job process exited");

    if status.success() {
        Ok(status)
    } else {
        Err(DispatchError::ProcessExecutionError { exit_code })
    }
}

/// Exit code of `status`, or the negated signal number if the process was
/// killed by a signal.
fn exit_code(status: &ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }

    -1
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    fn job() -> JobId {
        JobId::new("run-1").unwrap()
    }

    fn env_with_path() -> ResolvedEnvironment {
        let mut env = ResolvedEnvironment::new();
        env.insert("PATH".to_string(), "/usr/bin:/bin".to_string());
        env
    }

    fn argv(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn writes_diagnostic_line_before_child_output() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("nested/logs");

        run(&argv(&["echo", "hello"]), &env_with_path(), &log_dir, &job(), None)
            .await
            .unwrap();

        let logs = LogPair::for_job(&log_dir, &job());
        let stdout = fs::read_to_string(&logs.stdout).unwrap();
        assert_eq!(stdout, "cmd: [\"echo\", \"hello\"]\nhello\n");
        assert_eq!(fs::read_to_string(&logs.stderr).unwrap(), "");
    }

    #[tokio::test]
    async fn child_sees_only_the_resolved_environment() {
        let dir = tempfile::tempdir().unwrap();
        let mut env = env_with_path();
        env.insert("ONLY_THIS".to_string(), "yes".to_string());

        run(&argv(&["env"]), &env, dir.path(), &job(), None).await.unwrap();

        let stdout = fs::read_to_string(LogPair::for_job(dir.path(), &job()).stdout).unwrap();
        let vars: Vec<&str> = stdout.lines().skip(1).collect();
        assert!(vars.contains(&"ONLY_THIS=yes"));
        assert!(vars.contains(&"PATH=/usr/bin:/bin"));
        assert!(vars.iter().all(|line| line.starts_with("ONLY_THIS=") || line.starts_with("PATH=")));
    }

    #[tokio::test]
    async fn non_zero_exit_is_reported_with_code() {
        let dir = tempfile::tempdir().unwrap();
        let err = run(
            &argv(&["sh", "-c", "echo bad >&2; exit 3"]),
            &env_with_path(),
            dir.path(),
            &job(),
            None,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, DispatchError::ProcessExecutionError { exit_code: 3 }));
        let stderr = fs::read_to_string(LogPair::for_job(dir.path(), &job()).stderr).unwrap();
        assert_eq!(stderr, "bad\n");
    }

    #[tokio::test]
    async fn missing_executable_is_a_launch_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = run(
            &argv(&["definitely-not-a-real-binary-xyz"]),
            &env_with_path(),
            dir.path(),
            &job(),
            None,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, DispatchError::ProcessLaunchError { .. }));
    }

    #[tokio::test]
    async fn cancellation_kills_the_child() {
        let dir = tempfile::tempdir().unwrap();
        let (cancel_tx, cancel_rx) = cancel_token();

        let handle = {
            let log_dir = dir.path().to_path_buf();
            tokio::spawn(async move {
                run(&argv(&["sleep", "30"]), &env_with_path(), &log_dir, &job(), Some(cancel_rx))
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel_tx.send(()).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("run did not return after cancellation")
            .unwrap();
        assert!(matches!(result, Err(DispatchError::Cancelled)));
    }

    #[tokio::test]
    async fn dropped_cancel_sender_lets_the_job_finish() {
        let dir = tempfile::tempdir().unwrap();
        let (cancel_tx, cancel_rx) = cancel_token();
        drop(cancel_tx);

        let status = run(&argv(&["true"]), &env_with_path(), dir.path(), &job(), Some(cancel_rx))
            .await
            .unwrap();
        assert!(status.success());
    }
}
