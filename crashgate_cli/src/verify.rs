//! Regression check run from the outside: every fault kind and a set of
//! control inputs go through a fresh `crashgate run` child, and the oracle
//! compares how each child ended with what its input was built to do.

use crate::load_config;
use crashgate_core::input::{near_miss_input, short_input, trigger_input};
use crashgate_core::options::ONLY_ASAN_FAILURES_FLAG;
use crashgate_core::{
    CommandExecutor, CommandExecutorConfig, Expectation, FaultKind, FaultOracle, FaultReport,
    InputDelivery, TargetMode, Verdict,
};

use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Args, Debug)]
pub struct VerifyArgs {
    #[clap(short, long, value_parser)]
    config_file: Option<PathBuf>,
    #[clap(long)]
    json: bool,
    #[clap(long, default_value_t = 5000)]
    timeout_ms: u64,
}

struct Case {
    name: String,
    input: Vec<u8>,
    harness_args: Vec<String>,
    expectation: Expectation,
}

impl Case {
    fn new(name: impl Into<String>, input: Vec<u8>, expectation: Expectation) -> Self {
        Self {
            name: name.into(),
            input,
            harness_args: Vec::new(),
            expectation,
        }
    }
}

fn cases(config: &crashgate_core::HarnessConfig) -> Vec<Case> {
    let gate = &config.input_gate();
    let mut cases: Vec<Case> = FaultKind::ALL
        .iter()
        .map(|&kind| {
            Case::new(
                kind.label(),
                trigger_input(gate, kind.selector()),
                Expectation::Fault(kind),
            )
        })
        .collect();

    cases.push(Case::new("empty-input", Vec::new(), Expectation::Clean));
    cases.push(Case::new("short-input", short_input(gate), Expectation::Clean));
    cases.push(Case::new(
        "near-miss",
        near_miss_input(gate, FaultKind::NullWrite.selector()),
        Expectation::Clean,
    ));
    cases.push(Case::new(
        "unknown-selector",
        trigger_input(gate, FaultKind::ALL.len() as u8),
        Expectation::Clean,
    ));
    cases.push(Case::new(
        "unknown-selector-max",
        trigger_input(gate, u8::MAX),
        Expectation::Clean,
    ));

    // The flag only reaches the local dispatcher; forwarded modules run their own.
    if config.target.mode == TargetMode::Local {
        let mut suppressed = Case::new(
            "suppressed-abort",
            trigger_input(gate, FaultKind::Abort.selector()),
            Expectation::Clean,
        );
        suppressed.harness_args = vec![ONLY_ASAN_FAILURES_FLAG.to_string()];
        cases.push(suppressed);

        let mut still_active = Case::new(
            "suppressed-abort-keeps-null-write",
            trigger_input(gate, FaultKind::NullWrite.selector()),
            Expectation::Fault(FaultKind::NullWrite),
        );
        still_active.harness_args = vec![ONLY_ASAN_FAILURES_FLAG.to_string()];
        cases.push(still_active);
    }
    cases
}

fn child_command(
    config_file: Option<&PathBuf>,
    harness_args: &[String],
) -> Result<Vec<String>, anyhow::Error> {
    let exe = std::env::current_exe()
        .map_err(|e| anyhow::anyhow!("Failed to locate the crashgate binary: {e}"))?;
    let mut command = vec![exe.to_string_lossy().into_owned(), "run".to_string()];
    if let Some(path) = config_file {
        command.push("--config-file".to_string());
        command.push(path.to_string_lossy().into_owned());
    }
    command.push("--".to_string());
    command.extend(harness_args.iter().cloned());
    Ok(command)
}

pub fn verify(args: VerifyArgs) -> Result<(), anyhow::Error> {
    let config = load_config(args.config_file.as_deref())?;
    config.validate()?;
    // Children inherit the environment and working directory, so only an
    // explicit path needs passing on.
    let config_file = args.config_file.as_ref();

    let oracle = FaultOracle::new();
    let mut reports: Vec<FaultReport> = Vec::new();
    for case in cases(&config) {
        let executor = CommandExecutor::new(CommandExecutorConfig {
            command: child_command(config_file, &case.harness_args)?,
            input_delivery: InputDelivery::StdIn,
            timeout: Duration::from_millis(args.timeout_ms),
            working_dir: None,
            envs: Vec::new(),
        });
        let execution = executor.execute(&case.input);
        let report = oracle.examine(&case.name, &case.input, case.expectation, &execution);
        tracing::info!(case = %report.case, verdict = ?report.verdict, "{}", report.description);
        reports.push(report);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        println!("{:<36} {:<16} {}", "case", "verdict", "outcome");
        for report in &reports {
            let verdict = match report.verdict {
                Verdict::Pass => "pass",
                Verdict::Mismatch => "MISMATCH",
                Verdict::NeedsSanitizer => "needs-sanitizer",
            };
            println!("{:<36} {:<16} {}", report.case, verdict, report.description);
        }
    }

    let mismatches = reports
        .iter()
        .filter(|report| report.verdict == Verdict::Mismatch)
        .count();
    if mismatches > 0 {
        anyhow::bail!("{mismatches} case(s) did not end as expected");
    }
    Ok(())
}
