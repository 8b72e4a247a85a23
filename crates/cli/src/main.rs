use clap::Parser;
use splint_cli::commands::run::RunArgs;
use splint_cli::commands::{Cmd, Command};
use splint_cli::{exit_code, logging};
use std::path::PathBuf;
use std::process::ExitCode;

/// splint
///
/// Hot-patches a contract deployed behind an upgradeable proxy and proves the patch by
/// running a known exploit before and after the upgrade.
#[derive(Parser)]
#[command(name = "splint", version)]
#[command(about = "splint: hot-patch an upgradeable contract and prove the exploit is gone")]
#[command(args_conflicts_with_subcommands = true, subcommand_negates_reqs = true)]
struct Cli {
    /// Log debug detail to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Debug log file.
    #[arg(long, global = true, value_name = "PATH", default_value = logging::DEFAULT_LOG_FILE)]
    log_file: PathBuf,
    #[command(subcommand)]
    command: Option<Cmd>,
    #[command(flatten)]
    run: RunArgs,
}

/// Runs the splint CLI with the provided arguments.
#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(report) = color_eyre::install() {
        eprintln!("{report:?}");
    }
    if let Err(report) = logging::init(cli.verbose, &cli.log_file) {
        eprintln!("could not set up logging: {report:?}");
        return ExitCode::FAILURE;
    }

    let result = match cli.command {
        Some(command) => command.execute().await,
        None => cli.run.execute().await,
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(report) => {
            tracing::error!("{report}");
            eprintln!("{report:?}");
            exit_code(&report)
        }
    }
}
