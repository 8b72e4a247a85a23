//! Patch compilation and bytecode rewriting.
//!
//! A [`PatchSpecification`] names functions to guard or remove. [`compile`] turns it into a
//! deterministic [`PatchPlan`] of (entry offset, payload) insertions, and a
//! [`BytecodeRewriter`] applies the plan to runtime bytecode.

pub mod expr;
pub mod plan;
pub mod rewriter;
pub mod spec;
pub mod translate;

pub use expr::{CompiledGuard, compile_guard};
pub use plan::{Insertion, PatchKind, PatchPlan, compile};
pub use rewriter::JumpOutRewriter;
pub use spec::{PatchSpecification, RequirePatch};
pub use translate::translate;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Patch error type encompassing all patch module errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Core operation failed.
    #[error(transparent)]
    Core(#[from] splint_core::Error),

    /// A guard expression could not be parsed.
    #[error("cannot parse guard `{expression}` at column {column}: {message}")]
    Parse {
        expression: String,
        column: usize,
        message: String,
    },

    /// The patch specification document is malformed.
    #[error("malformed patch specification: {0}")]
    Specification(#[from] serde_yaml::Error),

    /// The patch specification file could not be read.
    #[error("could not read patch specification '{}': {source}", path.display())]
    SpecificationRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A patch offset does not start an instruction in the runtime code.
    #[error("offset 0x{offset:x} for {function} is not an instruction boundary")]
    NotInstructionBoundary { function: String, offset: usize },

    /// The code at a patch point cannot host a jump-out.
    #[error("cannot patch at 0x{offset:x}: {reason}")]
    UnsafePatchPoint { offset: usize, reason: String },

    /// Two patch points would overwrite the same bytes.
    #[error("patch points 0x{first:x} and 0x{second:x} overlap")]
    OverlappingPatchPoints { first: usize, second: usize },

    /// Patched code exceeds the configured size limit.
    #[error("patched runtime is {size} bytes, above the {limit} byte limit")]
    CodeTooLarge { size: usize, limit: usize },
}

/// Patch result type
pub type Result<T> = std::result::Result<T, Error>;

/// Applies a [`PatchPlan`] to runtime bytecode.
pub trait BytecodeRewriter: Send + Sync {
    /// Returns the rewriter's name for logging and identification.
    fn name(&self) -> &'static str;
    /// Produces patched runtime code. An empty plan yields `runtime` unchanged.
    fn rewrite(&self, runtime: &[u8], plan: &PatchPlan) -> Result<Vec<u8>>;
}

/// Configuration for the jump-out rewriter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewriterConfig {
    /// Zero bytes placed between the original code and the first trampoline, so that a
    /// PUSH opcode spelled by trailing metadata cannot swallow a trampoline `JUMPDEST`.
    pub padding: usize,
    /// Upper bound on patched runtime size.
    pub max_code_size: usize,
}

impl Default for RewriterConfig {
    fn default() -> Self {
        Self {
            padding: 32,
            // EIP-170
            max_code_size: 0x6000,
        }
    }
}
