//! Fixture runner behind the `test` subcommand and the integration suite.
//!
//! Each case directory under `tests/programs` holds `program.py`, a
//! `case.yaml` describing its class, and the expected output files.
//! Runtime cases are compiled cold, run, compiled again to prove the warm
//! cache skips Zig, and compared against expected stdout. Frontend cases
//! only need the front end, so they run even without a Zig toolchain.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, ensure};

use crate::compiler;
use crate::fixtures::{self, Case, CaseClass};

pub fn normalize_output(output: &str) -> String {
    output.replace("\r\n", "\n").trim_end().to_string()
}

/// A runnable `zig version` decides whether end-to-end cases execute.
pub fn detect_zig() -> Option<String> {
    let zig = compiler::zig_executable();
    let status = Command::new(&zig).arg("version").output();
    match status {
        Ok(output) if output.status.success() => Some(zig),
        _ => {
            eprintln!("Skipping compiled cases: no '{zig}' on PATH (set ZYTH_ZIG to override).");
            None
        }
    }
}

/// Scratch build directory per runner invocation, under the system temp dir.
pub fn scratch_cache_dir(tag: &str) -> Result<PathBuf> {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("zyth-{tag}-{nanos}"));
    fs::create_dir_all(&dir).with_context(|| format!("Creating {}", dir.display()))?;
    Ok(dir)
}

pub fn run_cases(programs_dir: &Path) -> Result<()> {
    let cases = fixtures::load_cases(programs_dir)?;
    let zig = detect_zig();
    let scratch = scratch_cache_dir("test")?;

    for case in cases {
        match case.spec.class {
            CaseClass::FrontendError => run_frontend_error_case(&case)?,
            CaseClass::RuntimeSuccess => {
                if zig.is_none() {
                    continue;
                }
                run_runtime_case(&case, &scratch)?;
            }
        }
    }
    Ok(())
}

fn run_frontend_error_case(case: &Case) -> Result<()> {
    ensure!(
        case.spec.expected.exit_code != 0,
        "Case {} expected exit code must be non-zero for frontend_error",
        case.name
    );
    let expected_file = case
        .spec
        .expected
        .stderr_contains_file
        .as_deref()
        .with_context(|| format!("Missing stderr_contains_file in {}", case.name))?;
    let expected_error = case.read_text(expected_file)?;
    let expected_error = expected_error.trim();

    let source = fs::read_to_string(&case.program_path)
        .with_context(|| format!("Reading {}", case.name))?;
    let result = compiler::compile_to_zig(&source);
    ensure!(
        result.is_err(),
        "Expected frontend error in {}, but compilation succeeded",
        case.name
    );
    let actual = result.expect_err("result checked as err").to_string();
    ensure!(
        actual.contains(expected_error),
        "Expected frontend error containing '{expected_error}' in {}, got '{actual}'",
        case.name
    );
    Ok(())
}

fn run_runtime_case(case: &Case, scratch: &Path) -> Result<()> {
    ensure!(
        case.spec.expected.exit_code == 0,
        "Case {} expected exit code must be 0 for runtime_success",
        case.name
    );
    let stdout_file = case
        .spec
        .expected
        .stdout_file
        .as_deref()
        .with_context(|| format!("Missing stdout_file in {}", case.name))?;
    let expected = case.read_text(stdout_file)?;

    let binary_path = scratch.join(&case.name);

    let cold = compiler::build(&case.program_path, Some(&binary_path))
        .with_context(|| format!("Building {}", case.name))?;
    ensure!(!cold.cache_hit, "Cold build of {} hit the cache", case.name);

    let (exit_code, stdout) = compiler::run_captured(&cold.binary_path)
        .with_context(|| format!("Running {}", case.name))?;
    ensure!(
        exit_code == case.spec.expected.exit_code,
        "Case {} exited with {exit_code}",
        case.name
    );
    assert_eq!(
        normalize_output(&stdout),
        normalize_output(&expected),
        "Output mismatch for {}",
        case.name
    );

    // A second build over unchanged source must reuse the cached binary.
    let warm = compiler::build(&case.program_path, Some(&binary_path))
        .with_context(|| format!("Rebuilding {}", case.name))?;
    ensure!(warm.cache_hit, "Warm build of {} missed the cache", case.name);

    let (_, warm_stdout) = compiler::run_captured(&warm.binary_path)
        .with_context(|| format!("Re-running {}", case.name))?;
    assert_eq!(
        normalize_output(&warm_stdout),
        normalize_output(&expected),
        "Warm-cache output mismatch for {}",
        case.name
    );
    Ok(())
}
