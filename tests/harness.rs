use std::fs;
use std::path::Path;

use anyhow::{Result, ensure};

use zyth::compiler;
use zyth::harness::{detect_zig, normalize_output, run_cases, scratch_cache_dir};

#[test]
fn runs_fixture_programs() -> Result<()> {
    run_cases(Path::new("tests/programs"))
}

#[test]
fn warm_cache_skips_recompilation_and_one_byte_edit_invalidates() -> Result<()> {
    let Some(_zig) = detect_zig() else {
        return Ok(());
    };
    let dir = scratch_cache_dir("cache")?;
    let source_path = dir.join("program.py");
    let binary_path = dir.join("program");

    fs::write(&source_path, "print(1)\n")?;
    let cold = compiler::build(&source_path, Some(&binary_path))?;
    ensure!(!cold.cache_hit, "first build must compile");
    let (exit_code, stdout) = compiler::run_captured(&cold.binary_path)?;
    ensure!(exit_code == 0);
    assert_eq!(normalize_output(&stdout), "1");

    let warm = compiler::build(&source_path, Some(&binary_path))?;
    ensure!(warm.cache_hit, "unchanged source must hit the cache");

    // One changed byte invalidates.
    fs::write(&source_path, "print(2)\n")?;
    let rebuilt = compiler::build(&source_path, Some(&binary_path))?;
    ensure!(!rebuilt.cache_hit, "edited source must recompile");
    let (exit_code, stdout) = compiler::run_captured(&rebuilt.binary_path)?;
    ensure!(exit_code == 0);
    assert_eq!(normalize_output(&stdout), "2");
    Ok(())
}

#[test]
fn hash_sidecar_records_source_digest() -> Result<()> {
    let Some(_zig) = detect_zig() else {
        return Ok(());
    };
    let dir = scratch_cache_dir("sidecar")?;
    let source_path = dir.join("program.py");
    let binary_path = dir.join("program");

    let source = "print(41 + 1)\n";
    fs::write(&source_path, source)?;
    compiler::build(&source_path, Some(&binary_path))?;

    let recorded = fs::read_to_string(dir.join("program.hash"))?;
    assert_eq!(recorded.trim(), compiler::source_digest(source));
    assert_eq!(recorded.trim().len(), 64);
    ensure!(
        recorded
            .trim()
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()),
        "digest must be lowercase hex"
    );
    Ok(())
}

#[test]
fn compilation_is_deterministic_without_a_toolchain() -> Result<()> {
    // Byte-identical Zig text across runs, toolchain or not.
    let source = fs::read_to_string("tests/programs/fibonacci/program.py")?;
    let first = compiler::compile_to_zig(&source)?;
    let second = compiler::compile_to_zig(&source)?;
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn scratch_zig_module_is_left_beside_the_binary() -> Result<()> {
    let Some(_zig) = detect_zig() else {
        return Ok(());
    };
    let dir = scratch_cache_dir("scratch")?;
    let source_path = dir.join("program.py");
    let binary_path = dir.join("program");

    fs::write(&source_path, "print(9)\n")?;
    compiler::build(&source_path, Some(&binary_path))?;
    let scratch = dir.join("program.zig");
    ensure!(scratch.exists(), "scratch Zig module should remain for inspection");
    let text = fs::read_to_string(scratch)?;
    ensure!(text.contains("const runtime = struct {"));
    ensure!(text.contains("pub fn main()"));
    Ok(())
}
