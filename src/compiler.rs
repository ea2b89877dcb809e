//! Build orchestration: source → Zig text → native binary, with a digest
//! cache so unchanged sources never re-invoke the Zig compiler.
//!
//! Cache layout: `<cache_dir>/<name>` is the binary, `<cache_dir>/<name>.hash`
//! holds the lowercase hex SHA-256 of the exact source bytes, and
//! `<cache_dir>/<name>.zig` is the scratch module handed to `zig build-exe`.
//! Stale outputs are never deleted; the cache directory belongs to the caller.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};
use sha2::{Digest, Sha256};

use crate::analyzer;
use crate::emitter;
use crate::lexer;
use crate::parser;

#[derive(Debug)]
pub struct BuildOutcome {
    pub binary_path: PathBuf,
    pub cache_hit: bool,
}

pub fn cache_dir() -> PathBuf {
    std::env::var_os("ZYTH_CACHE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(".zyth-cache"))
}

pub fn zig_executable() -> String {
    std::env::var("ZYTH_ZIG").unwrap_or_else(|_| "zig".to_string())
}

/// Front end plus emission: source text to the complete Zig module.
pub fn compile_to_zig(source: &str) -> Result<String> {
    let tokens = lexer::tokenize(source)?;
    let program = parser::parse_tokens(tokens)?;
    let analysis = analyzer::analyze(&program);
    Ok(emitter::emit_program(&program, &analysis)?)
}

/// Lowercase hex SHA-256 of the exact source bytes.
pub fn source_digest(source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

pub fn build(source_path: &Path, output_path: Option<&Path>) -> Result<BuildOutcome> {
    let source = fs::read_to_string(source_path)
        .with_context(|| format!("Reading {}", source_path.display()))?;
    let binary_path = resolve_output_path(source_path, output_path)?;
    let hash_path = sidecar_path(&binary_path, "hash");

    let digest = source_digest(&source);
    let cached = binary_path.exists()
        && fs::read_to_string(&hash_path)
            .map(|recorded| recorded.trim() == digest)
            .unwrap_or(false);
    if cached {
        return Ok(BuildOutcome {
            binary_path,
            cache_hit: true,
        });
    }

    let zig_source = compile_to_zig(&source)?;

    let scratch_path = sidecar_path(&binary_path, "zig");
    fs::write(&scratch_path, &zig_source)
        .with_context(|| format!("Writing {}", scratch_path.display()))?;

    eprintln!("Compiling {}...", source_path.display());
    let zig = zig_executable();
    let output = Command::new(&zig)
        .arg("build-exe")
        .arg(&scratch_path)
        .arg("-O")
        .arg("ReleaseFast")
        .arg(format!("-femit-bin={}", binary_path.display()))
        .current_dir(binary_path.parent().unwrap_or(Path::new(".")))
        .output()
        .with_context(|| format!("Running '{zig} build-exe' (is Zig installed?)"))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("Zig compilation failed:\n{stderr}");
    }

    fs::write(&hash_path, &digest).with_context(|| format!("Writing {}", hash_path.display()))?;

    Ok(BuildOutcome {
        binary_path,
        cache_hit: false,
    })
}

/// Spawn the produced binary with inherited standard streams and hand back
/// its exit code.
pub fn run(binary_path: &Path) -> Result<i32> {
    let status = Command::new(binary_path)
        .status()
        .with_context(|| format!("Running {}", binary_path.display()))?;
    Ok(status.code().unwrap_or(1))
}

/// Spawn the produced binary capturing stdout; used by the fixture runner.
pub fn run_captured(binary_path: &Path) -> Result<(i32, String)> {
    let output = Command::new(binary_path)
        .output()
        .with_context(|| format!("Running {}", binary_path.display()))?;
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    Ok((output.status.code().unwrap_or(1), stdout))
}

fn resolve_output_path(source_path: &Path, output_path: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = output_path {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Creating {}", parent.display()))?;
            }
        }
        return Ok(path.to_path_buf());
    }
    let dir = cache_dir();
    fs::create_dir_all(&dir).with_context(|| format!("Creating {}", dir.display()))?;
    let stem = source_path
        .file_stem()
        .and_then(|value| value.to_str())
        .context("Source path has no file name")?;
    Ok(dir.join(stem))
}

fn sidecar_path(binary_path: &Path, suffix: &str) -> PathBuf {
    PathBuf::from(format!("{}.{suffix}", binary_path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_sha256_hex() {
        let digest = source_digest("abc");
        assert_eq!(digest.len(), 64);
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn digest_changes_on_single_byte_edit() {
        let a = source_digest("print(1)\n");
        let b = source_digest("print(2)\n");
        assert_ne!(a, b);
    }

    #[test]
    fn compile_to_zig_is_deterministic() {
        let source = "def f(n):\n    return n\nprint(f(7))\n";
        let first = compile_to_zig(source).expect("compile failed");
        let second = compile_to_zig(source).expect("compile failed");
        assert_eq!(first, second);
    }

    #[test]
    fn compile_to_zig_reports_frontend_errors() {
        let err = compile_to_zig("x = 1 @ 2\n").expect_err("expected lex failure");
        assert!(err.to_string().contains("Unexpected character"));

        let err = compile_to_zig("import os\n").expect_err("expected import rejection");
        assert!(err.to_string().contains("Unsupported import"));
    }

    #[test]
    fn sidecar_paths_share_the_binary_name() {
        let binary = PathBuf::from("/tmp/cache/prog");
        assert_eq!(
            sidecar_path(&binary, "hash"),
            PathBuf::from("/tmp/cache/prog.hash")
        );
        assert_eq!(
            sidecar_path(&binary, "zig"),
            PathBuf::from("/tmp/cache/prog.zig")
        );
    }
}
