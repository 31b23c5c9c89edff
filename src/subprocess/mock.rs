use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::error::ProcessError;
use super::runner::{ExitStatus, ProcessCommand, ProcessOutput, ProcessRunner};
use crate::workflow::executor::OUTPUT_FILE_KEY;

type ArgsMatcher = Box<dyn Fn(&[String]) -> bool + Send + Sync>;

/// Scripted [`ProcessRunner`] recording every command it receives
///
/// Expectations are matched in registration order. A matched expectation can
/// also write step outputs into the file named by `STEPLINE_OUTPUT_FILE`, the
/// way a real step script would.
#[derive(Clone, Default)]
pub struct MockProcessRunner {
    expectations: Arc<Mutex<Vec<MockExpectation>>>,
    call_history: Arc<Mutex<Vec<ProcessCommand>>>,
}

struct MockExpectation {
    program: String,
    args_matcher: Option<ArgsMatcher>,
    response: ProcessOutput,
    outputs: Vec<(String, String)>,
    times_called: usize,
    expected_times: Option<usize>,
}

pub struct MockCommandConfig {
    runner: MockProcessRunner,
    expectation: MockExpectation,
}

impl MockProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expect_command(&self, program: &str) -> MockCommandConfig {
        MockCommandConfig {
            runner: self.clone(),
            expectation: MockExpectation {
                program: program.to_string(),
                args_matcher: None,
                response: ProcessOutput {
                    status: ExitStatus::Success,
                    stdout: String::new(),
                    stderr: String::new(),
                    duration: Duration::from_millis(10),
                },
                outputs: Vec::new(),
                times_called: 0,
                expected_times: None,
            },
        }
    }

    pub fn verify_called(&self, program: &str, times: usize) -> bool {
        self.lock_history()
            .iter()
            .filter(|cmd| cmd.program == program)
            .count()
            == times
    }

    pub fn get_call_history(&self) -> Vec<ProcessCommand> {
        self.lock_history().clone()
    }

    fn lock_history(&self) -> std::sync::MutexGuard<'_, Vec<ProcessCommand>> {
        self.call_history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ProcessRunner for MockProcessRunner {
    async fn run(&self, command: ProcessCommand) -> Result<ProcessOutput, ProcessError> {
        self.lock_history().push(command.clone());

        let mut expectations = self
            .expectations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        for expectation in expectations.iter_mut() {
            if expectation.program != command.program {
                continue;
            }
            if let Some(ref args_matcher) = expectation.args_matcher {
                if !(args_matcher)(&command.args) {
                    continue;
                }
            }

            expectation.times_called += 1;
            if let Some(expected) = expectation.expected_times {
                if expectation.times_called > expected {
                    return Err(ProcessError::MockExpectationNotMet(format!(
                        "Command '{}' called {} times, expected {}",
                        command.program, expectation.times_called, expected
                    )));
                }
            }

            if !expectation.outputs.is_empty() {
                if let Some(path) = command.env.get(OUTPUT_FILE_KEY) {
                    let content: String = expectation
                        .outputs
                        .iter()
                        .map(|(key, value)| format!("{}={}\n", key, value))
                        .collect();
                    std::fs::write(path, content)?;
                }
            }

            return Ok(expectation.response.clone());
        }

        Err(ProcessError::MockExpectationNotMet(format!(
            "No expectation found for command: {} {:?}",
            command.program, command.args
        )))
    }
}

impl MockCommandConfig {
    pub fn with_args<F>(mut self, matcher: F) -> Self
    where
        F: Fn(&[String]) -> bool + Send + Sync + 'static,
    {
        self.expectation.args_matcher = Some(Box::new(matcher));
        self
    }

    pub fn returns_stdout(mut self, stdout: &str) -> Self {
        self.expectation.response.stdout = stdout.to_string();
        self
    }

    pub fn returns_stderr(mut self, stderr: &str) -> Self {
        self.expectation.response.stderr = stderr.to_string();
        self
    }

    pub fn returns_exit_code(mut self, code: i32) -> Self {
        self.expectation.response.status = if code == 0 {
            ExitStatus::Success
        } else {
            ExitStatus::Error(code)
        };
        self
    }

    /// Write `KEY=VALUE` to the step output file when matched
    pub fn writes_output(mut self, key: &str, value: &str) -> Self {
        self.expectation
            .outputs
            .push((key.to_string(), value.to_string()));
        self
    }

    pub fn times(mut self, n: usize) -> Self {
        self.expectation.expected_times = Some(n);
        self
    }

    pub fn finish(self) {
        self.runner
            .expectations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(self.expectation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subprocess::ProcessCommandBuilder;

    #[tokio::test]
    async fn test_mock_matches_program_and_args() {
        let mock = MockProcessRunner::new();
        mock.expect_command("bash")
            .with_args(|args| args == ["-c", "echo hi"])
            .returns_stdout("hi\n")
            .finish();

        let output = mock
            .run(ProcessCommandBuilder::new("bash").args(["-c", "echo hi"]).build())
            .await
            .unwrap();
        assert!(output.status.success());
        assert_eq!(output.stdout, "hi\n");
        assert!(mock.verify_called("bash", 1));

        let err = mock
            .run(ProcessCommandBuilder::new("bash").arg("other.sh").build())
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::MockExpectationNotMet(_)));
        assert_eq!(mock.get_call_history().len(), 2);
    }

    #[tokio::test]
    async fn test_mock_times_limit() {
        let mock = MockProcessRunner::new();
        mock.expect_command("bash").returns_exit_code(2).times(1).finish();

        let first = mock
            .run(ProcessCommandBuilder::new("bash").build())
            .await
            .unwrap();
        assert_eq!(first.status, ExitStatus::Error(2));
        assert!(mock
            .run(ProcessCommandBuilder::new("bash").build())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_mock_writes_outputs() {
        let temp = tempfile::NamedTempFile::new().unwrap();
        let mock = MockProcessRunner::new();
        mock.expect_command("bash")
            .writes_output("ENV0", "Hello")
            .finish();

        mock.run(
            ProcessCommandBuilder::new("bash")
                .env(OUTPUT_FILE_KEY, temp.path().to_string_lossy())
                .build(),
        )
        .await
        .unwrap();

        assert_eq!(std::fs::read_to_string(temp.path()).unwrap(), "ENV0=Hello\n");
    }
}
