use crate::harness::ValidationOutcome;
use std::fmt;
use thiserror::Error;

/// Which side of the patch boundary an exploit attempt ran on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExploitStage {
    PrePatch,
    PostPatch,
}

impl fmt::Display for ExploitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExploitStage::PrePatch => write!(f, "pre-patch"),
            ExploitStage::PostPatch => write!(f, "post-patch"),
        }
    }
}

/// Validation error type encompassing all validation module errors.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] splint_core::Error),

    #[error(transparent)]
    Patch(#[from] splint_patch::Error),

    #[error(transparent)]
    Deploy(#[from] splint_deploy::Error),

    /// The target lacks an entry point the harness drives.
    #[error("unsupported target: {0}")]
    UnsupportedTarget(String),

    /// The exploit did not behave as expected for its stage.
    #[error("{}", describe(*stage, outcome))]
    UnexpectedExploitOutcome {
        stage: ExploitStage,
        outcome: ValidationOutcome,
    },
}

fn describe(stage: ExploitStage, outcome: &ValidationOutcome) -> String {
    match stage {
        ExploitStage::PrePatch => format!(
            "pre-patch exploit did not drain the target ({outcome}); the environment is broken"
        ),
        ExploitStage::PostPatch => {
            format!("post-patch exploit still drains the target ({outcome}); the patch failed")
        }
    }
}

/// Validation result type
pub type Result<T> = std::result::Result<T, Error>;
