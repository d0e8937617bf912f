// Built-in `command` task: run an external program as a job
//
// args[0] is the program, the remaining args are its arguments.
// kwargs: env (object, filtered by the allowlist), working_dir, timeout_ms.

use async_trait::async_trait;
use lightq_core::domain::Job;
use lightq_core::error::{AppError, Result};
use lightq_core::port::Task;
use serde_json::Value;
use std::collections::HashMap;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::info;

pub const COMMAND_TASK: &str = "command";

/// Bytes of stderr quoted in a failure message
const STDERR_TAIL: usize = 512;

#[derive(Debug, PartialEq)]
struct Invocation {
    program: String,
    args: Vec<String>,
    env: HashMap<String, String>,
    working_dir: Option<String>,
    timeout: Option<Duration>,
}

/// Spawns one child process per job
pub struct CommandTask {
    env_allowlist: Vec<String>,
}

impl CommandTask {
    /// Create a new command task
    ///
    /// # Arguments
    /// * `env_allowlist` - Environment variables a job may set for its command
    ///
    /// # Example
    /// ```ignore
    /// let task = CommandTask::new(vec!["PATH".to_string(), "HOME".to_string()]);
    /// ```
    pub fn new(env_allowlist: Vec<String>) -> Self {
        Self { env_allowlist }
    }

    /// Filter environment variables to allowlist only
    fn filter_env(&self, env: HashMap<String, String>) -> HashMap<String, String> {
        env.into_iter()
            .filter(|(k, _)| self.env_allowlist.contains(k))
            .collect()
    }

    fn parse(&self, job: &Job) -> Result<Invocation> {
        let mut words = job.args.iter().map(|arg| match arg {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        });
        let program = words
            .next()
            .filter(|program| !program.is_empty())
            .ok_or_else(|| AppError::Validation("command job needs a program in args[0]".to_string()))?;
        let args = words.collect();

        let env = match job.kwarg("env") {
            None | Some(Value::Null) => HashMap::new(),
            Some(Value::Object(obj)) => obj
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect(),
            Some(_) => {
                return Err(AppError::Validation(
                    "command kwarg 'env' must be an object".to_string(),
                ))
            }
        };

        let working_dir = job
            .kwarg("working_dir")
            .and_then(Value::as_str)
            .map(str::to_string);

        let timeout = match job.kwarg("timeout_ms") {
            None | Some(Value::Null) => None,
            Some(value) => Some(Duration::from_millis(value.as_u64().ok_or_else(|| {
                AppError::Validation("command kwarg 'timeout_ms' must be a positive integer".to_string())
            })?)),
        };

        Ok(Invocation {
            program,
            args,
            env: self.filter_env(env),
            working_dir,
            timeout,
        })
    }
}

#[async_trait]
impl Task for CommandTask {
    async fn run(&self, job: &Job) -> Result<()> {
        let invocation = self.parse(job)?;
        info!(
            program = %invocation.program,
            args = ?invocation.args,
            timeout_ms = ?invocation.timeout.map(|t| t.as_millis() as u64),
            "Starting command"
        );

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .envs(&invocation.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // A timed-out child is dropped, and with it killed
            .kill_on_drop(true);
        if let Some(dir) = &invocation.working_dir {
            command.current_dir(dir);
        }

        let started = Instant::now();
        let child = command.spawn().map_err(|e| {
            AppError::task(format!("failed to spawn '{}': {}", invocation.program, e))
        })?;

        let output = match invocation.timeout {
            Some(limit) => timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| {
                    AppError::task(format!(
                        "'{}' timed out after {}ms",
                        invocation.program,
                        limit.as_millis()
                    ))
                })??,
            None => child.wait_with_output().await?,
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        info!(
            program = %invocation.program,
            duration_ms,
            exit_code = ?output.status.code(),
            "Command finished"
        );

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail_start = stderr
            .char_indices()
            .rev()
            .nth(STDERR_TAIL.saturating_sub(1))
            .map_or(0, |(i, _)| i);
        Err(AppError::task(format!(
            "'{}' exited with {}: {}",
            invocation.program,
            output.status,
            stderr[tail_start..].trim()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn command_job(args: Vec<Value>) -> Job {
        Job::new_test(COMMAND_TASK, "default").with_args(args)
    }

    #[test]
    fn test_parse_invocation() {
        let task = CommandTask::new(vec!["ALLOWED_VAR".to_string()]);
        let job = command_job(vec![json!("echo"), json!("hello"), json!(3)])
            .with_kwarg("env", json!({"ALLOWED_VAR": "1", "BLOCKED_VAR": "2"}))
            .with_kwarg("working_dir", json!("/tmp"))
            .with_kwarg("timeout_ms", json!(250));

        let invocation = task.parse(&job).unwrap();
        assert_eq!(invocation.program, "echo");
        assert_eq!(invocation.args, vec!["hello", "3"]);
        assert_eq!(invocation.env.len(), 1);
        assert!(invocation.env.contains_key("ALLOWED_VAR"));
        assert_eq!(invocation.working_dir.as_deref(), Some("/tmp"));
        assert_eq!(invocation.timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_parse_rejects_missing_program() {
        let task = CommandTask::new(vec![]);
        assert!(matches!(
            task.parse(&command_job(vec![])),
            Err(AppError::Validation(_))
        ));
        let bad_timeout = command_job(vec![json!("true")]).with_kwarg("timeout_ms", json!("soon"));
        assert!(task.parse(&bad_timeout).is_err());
    }

    #[tokio::test]
    async fn test_run_success() {
        let task = CommandTask::new(vec![]);
        task.run(&command_job(vec![json!("true")])).await.unwrap();
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_failure() {
        let task = CommandTask::new(vec![]);
        let job = command_job(vec![json!("sh"), json!("-c"), json!("echo boom >&2; exit 3")]);

        let err = task.run(&job).await.unwrap_err();
        let message = err.to_string();
        assert!(matches!(err, AppError::Task(_)));
        assert!(message.contains("boom"), "{}", message);
    }

    #[tokio::test]
    async fn test_timeout_is_failure() {
        let task = CommandTask::new(vec![]);
        let job = command_job(vec![json!("sleep"), json!("10")]).with_kwarg("timeout_ms", json!(100));

        let started = Instant::now();
        let err = task.run(&job).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let task = CommandTask::new(vec![]);
        let job = command_job(vec![json!("/nonexistent/lightq-binary")]);
        assert!(matches!(task.run(&job).await, Err(AppError::Task(_))));
    }

    #[tokio::test]
    async fn test_allowed_env_reaches_child() {
        let task = CommandTask::new(vec!["LIGHTQ_TEST_VAR".to_string()]);
        let job = command_job(vec![
            json!("sh"),
            json!("-c"),
            json!("test \"$LIGHTQ_TEST_VAR\" = expected"),
        ])
        .with_kwarg("env", json!({"LIGHTQ_TEST_VAR": "expected"}));

        task.run(&job).await.unwrap();
    }
}
