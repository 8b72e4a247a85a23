use async_trait::async_trait;
use clap::{Args, Subcommand, ValueEnum};
use color_eyre::eyre::WrapErr;
use splint_core::ContractArtifact;
use splint_deploy::rpc::resolve_ipc_path;
use splint_deploy::{ContextConfig, ExecutionContext, LocalNode, Node, RpcNode};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub mod functions;
pub mod plan;
pub mod run;

/// CLI subcommands for splint. Without one, splint runs the full protocol.
#[derive(Subcommand)]
pub enum Cmd {
    /// Print the function table resolved for a contract.
    Functions(functions::FunctionsArgs),
    /// Compile a patch specification and print the plan and patched runtime.
    Plan(plan::PlanArgs),
}

/// Trait for executing CLI subcommands.
#[async_trait]
pub trait Command {
    /// Executes the subcommand.
    async fn execute(self) -> color_eyre::Result<()>;
}

#[async_trait]
impl Command for Cmd {
    async fn execute(self) -> color_eyre::Result<()> {
        match self {
            Cmd::Functions(args) => args.execute().await,
            Cmd::Plan(args) => args.execute().await,
        }
    }
}

/// Where compiled artifacts come from.
#[derive(Args, Debug, Clone)]
pub struct BuildArgs {
    /// Read existing compiler outputs from this directory instead of running solc.
    #[arg(long, value_name = "DIR")]
    pub artifacts: Option<PathBuf>,
    /// Solidity compiler binary.
    #[arg(long, value_name = "BIN", default_value = "solc")]
    pub solc: PathBuf,
}

impl BuildArgs {
    /// Returns the artifact for `name` and the source text of `source`.
    pub fn load(&self, source: &Path, name: &str) -> color_eyre::Result<(ContractArtifact, String)> {
        let text = std::fs::read_to_string(source)
            .wrap_err_with(|| format!("reading contract source {}", source.display()))?;

        let artifact = match &self.artifacts {
            Some(dir) => ContractArtifact::load(dir, name)?,
            None => {
                let out = tempfile::tempdir()?;
                crate::solc::compile(&self.solc, source, out.path())?;
                ContractArtifact::load(out.path(), name)?
            }
        };
        Ok((artifact, text))
    }
}

/// Which chain to run against.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// In-process chain with pre-funded accounts.
    Local,
    /// A running node reached over its IPC socket.
    Ipc,
}

#[derive(Args, Debug, Clone)]
pub struct NodeArgs {
    #[arg(long, value_enum, default_value_t = NodeKind::Ipc)]
    pub node: NodeKind,
    /// IPC socket; defaults to ~/.geth.ipc, then /tmp/geth/geth.ipc.
    #[arg(long, value_name = "PATH")]
    pub ipc_path: Option<PathBuf>,
    /// Seconds to wait for each transaction to be mined.
    #[arg(long, value_name = "SECS", default_value_t = 120)]
    pub timeout: u64,
}

impl NodeArgs {
    pub async fn connect(&self) -> color_eyre::Result<ExecutionContext> {
        let node: Arc<dyn Node> = match self.node {
            NodeKind::Local => Arc::new(LocalNode::default()),
            NodeKind::Ipc => Arc::new(RpcNode::connect(resolve_ipc_path(self.ipc_path.clone())).await?),
        };
        let config = ContextConfig {
            confirmation_timeout: Duration::from_secs(self.timeout),
        };
        Ok(ExecutionContext::connect(node, config).await?)
    }
}
