use crate::executor::{Execution, ExecutionStatus};
use crate::fault::FaultKind;
use serde::Serialize;

/// What a run of the harness is supposed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "expect", content = "fault")]
pub enum Expectation {
    /// The input must not fault.
    Clean,
    /// The input must trigger this kind.
    Fault(FaultKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Verdict {
    Pass,
    Mismatch,
    /// The kind is only observable under a sanitizer, and none reported it.
    NeedsSanitizer,
}

/// One classified run.
#[derive(Debug, Clone, Serialize)]
pub struct FaultReport {
    pub case: String,
    pub expectation: Expectation,
    pub verdict: Verdict,
    pub description: String,
    /// MD5 of the input, for correlating with a driver's crash records.
    pub input_hash: String,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
}

/// Compares how a child run ended with what its input was built to do.
#[derive(Debug, Default)]
pub struct FaultOracle;

impl FaultOracle {
    pub fn new() -> Self {
        FaultOracle
    }

    /// Judges one run.
    ///
    /// A sanitizer summary in stderr decides first; its category has to name
    /// the expected kind. Without one, the run must end by one of the kind's
    /// signals. A plain exit code never confirms a fault: it is what a failed
    /// initialization looks like.
    pub fn verdict(&self, expectation: Expectation, execution: &Execution) -> Verdict {
        let kind = match expectation {
            Expectation::Clean => {
                return match execution.status {
                    ExecutionStatus::Ok => Verdict::Pass,
                    _ => Verdict::Mismatch,
                };
            }
            Expectation::Fault(kind) => kind,
        };

        match &execution.status {
            ExecutionStatus::Ok if kind.crashes_uninstrumented() => Verdict::Mismatch,
            ExecutionStatus::Ok => Verdict::NeedsSanitizer,
            ExecutionStatus::Timeout | ExecutionStatus::Other(_) => Verdict::Mismatch,
            ExecutionStatus::Crash(_) => {
                if let Some(category) = sanitizer_category(&execution.output.stderr) {
                    return if kind.matches_sanitizer_category(&category) {
                        Verdict::Pass
                    } else {
                        Verdict::Mismatch
                    };
                }
                match execution.output.signal {
                    Some(signal) if kind.expected_signals().contains(&signal) => Verdict::Pass,
                    // Memory corruption may kill the process later, from the allocator
                    // or a clobbered frame; the signal says nothing about the kind.
                    Some(_) if !kind.crashes_uninstrumented() => Verdict::NeedsSanitizer,
                    _ => Verdict::Mismatch,
                }
            }
        }
    }

    pub fn examine(
        &self,
        case: &str,
        input: &[u8],
        expectation: Expectation,
        execution: &Execution,
    ) -> FaultReport {
        let description = match &execution.status {
            ExecutionStatus::Ok => "completed".to_string(),
            ExecutionStatus::Timeout => "timed out".to_string(),
            ExecutionStatus::Crash(desc) | ExecutionStatus::Other(desc) => desc.clone(),
        };
        FaultReport {
            case: case.to_string(),
            expectation,
            verdict: self.verdict(expectation, execution),
            description,
            input_hash: format!("{:x}", md5::compute(input)),
            exit_code: execution.output.exit_code,
            signal: execution.output.signal,
        }
    }
}

/// Category from the first `SUMMARY: <Tool>Sanitizer: <category> ...` line.
fn sanitizer_category(stderr: &[u8]) -> Option<String> {
    String::from_utf8_lossy(stderr).lines().find_map(|line| {
        let rest = line.trim_start().strip_prefix("SUMMARY: ")?;
        let (tool, details) = rest.split_once(": ")?;
        if !tool.ends_with("Sanitizer") {
            return None;
        }
        details.split_whitespace().next().map(str::to_string)
    })
}
