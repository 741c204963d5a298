//! Evaluation invoker
//!
//! [`Evaluator`] is the only way the gateway reaches expression evaluation.
//! [`ProcessEvaluator`] runs one isolated child process per request; the
//! in-memory doubles are for tests and embedding.

use crate::config::EvaluatorConfig;
use crate::error::EvaluationFailure;
use async_trait::async_trait;
use calc_protocol::{CalculationRequest, Mode};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Outcome of one evaluation
pub type EvaluationResult = Result<String, EvaluationFailure>;

/// Evaluates a validated request
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(&self, request: &CalculationRequest) -> EvaluationResult;
}

/// Runs the evaluator program as a child process
///
/// The expression is written to the child's stdin, which is then closed. In
/// float mode the float flag is appended to the launch arguments. The child is
/// killed if it outlives the timeout.
#[derive(Debug, Clone)]
pub struct ProcessEvaluator {
    program: String,
    args: Vec<String>,
    float_flag: String,
    timeout: Duration,
}

impl ProcessEvaluator {
    pub fn new(program: impl Into<String>) -> Self {
        let defaults = EvaluatorConfig::default();
        let timeout = defaults.timeout();
        Self {
            program: program.into(),
            args: defaults.args,
            float_flag: defaults.float_flag,
            timeout,
        }
    }

    pub fn from_config(config: &EvaluatorConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            float_flag: config.float_flag.clone(),
            timeout: config.timeout(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_float_flag(mut self, flag: impl Into<String>) -> Self {
        self.float_flag = flag.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn command(&self, mode: Mode) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        if mode.is_float() {
            command.arg(&self.float_flag);
        }
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl Evaluator for ProcessEvaluator {
    async fn evaluate(&self, request: &CalculationRequest) -> EvaluationResult {
        let mut child = self.command(request.mode).spawn().map_err(|e| {
            EvaluationFailure::LaunchFailure(format!(
                "failed to launch evaluator {}: {e}",
                self.program
            ))
        })?;

        let stdin = child.stdin.take();
        let expression = request.expression.clone();

        let feed_stdin = async move {
            if let Some(mut stdin) = stdin {
                // The child may exit without reading its input
                if let Err(e) = stdin.write_all(expression.as_bytes()).await {
                    if e.kind() != std::io::ErrorKind::BrokenPipe {
                        warn!("Failed to write expression to evaluator: {}", e);
                    }
                }
            }
        };

        let run = async move {
            let ((), output) = tokio::join!(feed_stdin, child.wait_with_output());
            output
        };

        // Dropping `run` on timeout drops the child, which kills it
        let output = match tokio::time::timeout(self.timeout, run).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(EvaluationFailure::LaunchFailure(format!(
                    "failed to collect evaluator output: {e}"
                )));
            }
            Err(_) => {
                warn!("Evaluator timed out after {:?} on {:?}", self.timeout, request.expression);
                return Err(EvaluationFailure::Timeout);
            }
        };

        if output.status.success() {
            let result = String::from_utf8_lossy(&output.stdout).trim().to_string();
            debug!("Evaluated {:?} ({}) = {}", request.expression, request.mode, result);
            Ok(result)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if stderr.is_empty() {
                Err(EvaluationFailure::NonZeroExit(describe_status(output.status)))
            } else {
                Err(EvaluationFailure::NonZeroExit(stderr))
            }
        }
    }
}

fn describe_status(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("evaluator exited with status {code}"),
        None => "evaluator terminated by signal".to_string(),
    }
}

/// Evaluator returning fixed answers per expression and mode
///
/// Unscripted expressions fail with a `NonZeroExit`.
#[derive(Default)]
pub struct ScriptedEvaluator {
    answers: Mutex<HashMap<(String, Mode), EvaluationResult>>,
    invocations: AtomicUsize,
}

impl ScriptedEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_answer(self, expression: &str, mode: Mode, answer: EvaluationResult) -> Self {
        self.answers.lock().insert((expression.to_string(), mode), answer);
        self
    }

    /// Number of evaluate calls so far
    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Evaluator for ScriptedEvaluator {
    async fn evaluate(&self, request: &CalculationRequest) -> EvaluationResult {
        self.invocations.fetch_add(1, Ordering::SeqCst);

        self.answers
            .lock()
            .get(&(request.expression.clone(), request.mode))
            .cloned()
            .unwrap_or_else(|| {
                Err(EvaluationFailure::NonZeroExit(format!(
                    "no scripted answer for {:?}",
                    request.expression
                )))
            })
    }
}

/// Evaluator backed by a closure
pub struct FnEvaluator<F> {
    func: F,
}

impl<F> FnEvaluator<F>
where
    F: Fn(&CalculationRequest) -> EvaluationResult + Send + Sync,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F> Evaluator for FnEvaluator<F>
where
    F: Fn(&CalculationRequest) -> EvaluationResult + Send + Sync,
{
    async fn evaluate(&self, request: &CalculationRequest) -> EvaluationResult {
        (self.func)(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(expression: &str, mode: Mode) -> CalculationRequest {
        CalculationRequest::new(expression, mode)
    }

    #[tokio::test]
    async fn test_scripted_evaluator() {
        let evaluator =
            ScriptedEvaluator::new().with_answer("3 + 2", Mode::Integer, Ok("5".to_string()));

        assert_eq!(evaluator.evaluate(&request("3 + 2", Mode::Integer)).await, Ok("5".to_string()));
        assert!(evaluator.evaluate(&request("3 + 2", Mode::Float)).await.is_err());
        assert_eq!(evaluator.invocations(), 2);
    }

    #[tokio::test]
    async fn test_fn_evaluator() {
        let evaluator = FnEvaluator::new(|req: &CalculationRequest| {
            arith_evaluator::evaluate(&req.expression, req.mode)
                .map_err(|e| EvaluationFailure::NonZeroExit(format!("error: {e}")))
        });

        assert_eq!(evaluator.evaluate(&request("3 / 2", Mode::Float)).await, Ok("1.5".to_string()));
        assert_eq!(
            evaluator.evaluate(&request("1 / 0", Mode::Integer)).await,
            Err(EvaluationFailure::NonZeroExit("error: division by zero".to_string()))
        );
    }

    #[tokio::test]
    async fn test_launch_failure() {
        let evaluator = ProcessEvaluator::new("/nonexistent/calc-evaluator");
        let result = evaluator.evaluate(&request("1 + 1", Mode::Integer)).await;
        assert!(matches!(result, Err(EvaluationFailure::LaunchFailure(_))));
    }

    #[cfg(unix)]
    mod unix {
        use super::*;

        fn shell(script: &str) -> ProcessEvaluator {
            ProcessEvaluator::new("/bin/sh").with_args(["-c", script])
        }

        #[tokio::test]
        async fn test_stdin_delivered_and_stdout_trimmed() {
            let evaluator = shell("cat");
            let result = evaluator.evaluate(&request("  3 + 2\n", Mode::Integer)).await;
            assert_eq!(result, Ok("3 + 2".to_string()));
        }

        #[tokio::test]
        async fn test_nonzero_exit_reports_stderr() {
            let evaluator = shell("echo boom >&2; exit 3");
            let result = evaluator.evaluate(&request("1", Mode::Integer)).await;
            assert_eq!(result, Err(EvaluationFailure::NonZeroExit("boom".to_string())));
        }

        #[tokio::test]
        async fn test_nonzero_exit_without_stderr_names_status() {
            let evaluator = shell("exit 4");
            let result = evaluator.evaluate(&request("1", Mode::Integer)).await;
            assert_eq!(
                result,
                Err(EvaluationFailure::NonZeroExit("evaluator exited with status 4".to_string()))
            );
        }

        #[tokio::test]
        async fn test_timeout_kills_child() {
            let evaluator = shell("sleep 5").with_timeout(Duration::from_millis(100));

            let started = std::time::Instant::now();
            let result = evaluator.evaluate(&request("1", Mode::Integer)).await;

            assert_eq!(result, Err(EvaluationFailure::Timeout));
            assert_eq!(result.unwrap_err().to_string(), "evaluator timeout");
            assert!(started.elapsed() < Duration::from_secs(3));
        }

        #[tokio::test]
        async fn test_float_flag_appended_in_float_mode() {
            // With `sh -c`, the first extra argument becomes $0
            let evaluator = shell("echo $0");

            let float = evaluator.evaluate(&request("1", Mode::Float)).await;
            assert_eq!(float, Ok("--float".to_string()));

            let integer = evaluator.evaluate(&request("1", Mode::Integer)).await;
            assert_eq!(integer, Ok("/bin/sh".to_string()));
        }
    }
}
