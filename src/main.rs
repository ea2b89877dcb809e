use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use zyth::{compiler, harness};

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.first().map(String::as_str) {
        None => {
            bail!("Usage: zyth <file> | zyth build <file> [output] | zyth run <file> | zyth test");
        }
        Some("build") => {
            let Some(file) = args.get(1) else {
                bail!("Usage: zyth build <file> [output]");
            };
            let output = args.get(2).map(PathBuf::from);
            let outcome = compiler::build(Path::new(file), output.as_deref())?;
            if outcome.cache_hit {
                println!("✓ Up to date: {}", outcome.binary_path.display());
            } else {
                println!("✓ Compiled to {}", outcome.binary_path.display());
            }
            Ok(())
        }
        Some("run") => {
            let Some(file) = args.get(1) else {
                bail!("Usage: zyth run <file>");
            };
            compile_and_run(Path::new(file))
        }
        Some("test") => harness::run_cases(Path::new("tests/programs")),
        Some(file) => {
            if args.len() > 1 {
                bail!("Only one input file is supported");
            }
            compile_and_run(Path::new(file))
        }
    }
}

fn compile_and_run(file: &Path) -> Result<()> {
    let outcome = compiler::build(file, None)?;
    let exit_code = compiler::run(&outcome.binary_path)?;
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}
