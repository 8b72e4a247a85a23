//! The default command: deploy, exploit, patch, re-validate.

use super::{BuildArgs, NodeArgs};
use async_trait::async_trait;
use clap::Args;
use color_eyre::eyre::{WrapErr, eyre};
use splint_patch::PatchSpecification;
use splint_validate::{HarnessConfig, Protocol, Verdict};
use std::fs;
use std::path::PathBuf;

/// Arguments of a full run.
///
/// The positionals are optional to clap only so that subcommands can stand in for them;
/// [`execute`](super::Command::execute) insists on both.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Solidity source file of the target.
    #[arg(required = true)]
    pub contract_source: Option<PathBuf>,
    /// Contract to deploy and patch.
    #[arg(required = true)]
    pub contract_name: Option<String>,
    /// YAML patch specification; without one splint deploys and smoke-tests only.
    pub patch_spec: Option<PathBuf>,
    #[command(flatten)]
    pub build: BuildArgs,
    #[command(flatten)]
    pub node: NodeArgs,
    /// Write the compiled patch plan as JSON.
    #[arg(long, value_name = "PATH")]
    pub emit_plan: Option<PathBuf>,
}

#[async_trait]
impl super::Command for RunArgs {
    async fn execute(self) -> color_eyre::Result<()> {
        let source_path = self
            .contract_source
            .ok_or_else(|| eyre!("missing <CONTRACT_SOURCE>"))?;
        let name = self
            .contract_name
            .ok_or_else(|| eyre!("missing <CONTRACT_NAME>"))?;

        // everything that can fail offline happens before connecting
        let (artifact, source) = self.build.load(&source_path, &name)?;
        let spec = self
            .patch_spec
            .as_deref()
            .map(PatchSpecification::from_path)
            .transpose()?;
        let protocol = Protocol::new(artifact, source, spec, HarnessConfig::default())?;
        let prepared = protocol.prepare()?;

        if let (Some(path), Some(prepared)) = (&self.emit_plan, &prepared) {
            fs::write(path, serde_json::to_string_pretty(&prepared.plan)?)
                .wrap_err_with(|| format!("writing plan to {}", path.display()))?;
            tracing::info!("Plan written to {}", path.display());
        }

        let ctx = self.node.connect().await?;
        let verdict = protocol.run_prepared(&ctx, prepared).await?;

        let system = verdict.system();
        println!("proxy  {}", system.proxy);
        println!("logic  {}", system.logic);
        println!("owner  {}", system.owner);
        let smoke = verdict.smoke();
        println!(
            "smoke  {} (expected {}, observed {})",
            if smoke.passed() { "ok" } else { "MISMATCH" },
            smoke.expected,
            smoke.observed
        );
        if let Verdict::PatchValidated { pre, post, .. } = &verdict {
            println!("before {pre}");
            println!("after  {post}");
            println!("patch validated");
        }
        Ok(())
    }
}
