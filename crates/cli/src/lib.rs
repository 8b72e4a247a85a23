pub mod commands;
pub mod logging;
pub mod solc;

use std::process::ExitCode;

/// Process exit status for a failed run.
///
/// `2` when the exploit does not work against the unpatched contract, `3` when it still
/// works after patching, `1` for everything else.
pub fn exit_code(report: &color_eyre::Report) -> ExitCode {
    ExitCode::from(exit_status(report))
}

fn exit_status(report: &color_eyre::Report) -> u8 {
    use splint_validate::{Error, ExploitStage};

    match report.downcast_ref::<Error>() {
        Some(Error::UnexpectedExploitOutcome {
            stage: ExploitStage::PrePatch,
            ..
        }) => 2,
        Some(Error::UnexpectedExploitOutcome {
            stage: ExploitStage::PostPatch,
            ..
        }) => 3,
        _ => 1,
    }
}
