//! The `plan` subcommand: compile and rewrite without touching a node.

use super::BuildArgs;
use async_trait::async_trait;
use clap::Args;
use splint_core::{DispatcherResolver, FunctionTableResolver};
use splint_patch::{BytecodeRewriter, JumpOutRewriter, PatchSpecification, compile};
use std::path::PathBuf;

#[derive(Args)]
pub struct PlanArgs {
    /// Solidity source file.
    pub contract_source: PathBuf,
    /// Contract to patch.
    pub contract_name: String,
    /// YAML patch specification.
    pub patch_spec: PathBuf,
    #[command(flatten)]
    pub build: BuildArgs,
}

#[async_trait]
impl super::Command for PlanArgs {
    async fn execute(self) -> color_eyre::Result<()> {
        let (artifact, source) = self.build.load(&self.contract_source, &self.contract_name)?;
        let spec = PatchSpecification::from_path(&self.patch_spec)?;
        let table = DispatcherResolver.resolve(&artifact, &source)?;
        let plan = compile(&spec, &table)?;
        let runtime = JumpOutRewriter::default().rewrite(&artifact.runtime_code, &plan)?;

        for insertion in plan.insertions() {
            println!(
                "0x{:04x}  {:<16} {:?}",
                insertion.offset, insertion.function, insertion.kind
            );
            print!("{}", insertion.payload);
        }
        println!("0x{}", hex::encode(&runtime));
        Ok(())
    }
}
