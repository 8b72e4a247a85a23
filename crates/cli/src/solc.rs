//! Invocation of the Solidity compiler.

use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

/// Outputs requested from `solc`; [`splint_core::ContractArtifact::load`] reads them back.
pub const OUTPUT_FLAGS: [&str; 6] = [
    "--overwrite",
    "--bin",
    "--bin-runtime",
    "--abi",
    "--combined-json",
    "abi,hashes,srcmap-runtime",
];

/// Errors that can occur while compiling a contract.
#[derive(Debug, Error)]
pub enum CompileError {
    /// The compiler binary could not be started.
    #[error("could not run {}: {source}", solc.display())]
    Spawn {
        solc: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The compiler ran and rejected the source.
    #[error("{} failed on {} ({status}):\n{stderr}", solc.display(), contract.display())]
    Failed {
        solc: PathBuf,
        contract: PathBuf,
        status: std::process::ExitStatus,
        stderr: String,
    },
}

/// Compiles `source` into `out_dir`.
pub fn compile(solc: &Path, source: &Path, out_dir: &Path) -> Result<(), CompileError> {
    tracing::info!("Compiling {} with {}", source.display(), solc.display());
    let output = Command::new(solc)
        .args(OUTPUT_FLAGS)
        .arg("-o")
        .arg(out_dir)
        .arg(source)
        .output()
        .map_err(|source| CompileError::Spawn {
            solc: solc.to_path_buf(),
            source,
        })?;

    if !output.status.success() {
        return Err(CompileError::Failed {
            solc: solc.to_path_buf(),
            contract: source.to_path_buf(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }
    let warnings = String::from_utf8_lossy(&output.stderr);
    if !warnings.trim().is_empty() {
        tracing::debug!("solc: {}", warnings.trim());
    }
    Ok(())
}
