//! The `functions` subcommand: shows where each external function starts.

use super::BuildArgs;
use async_trait::async_trait;
use clap::Args;
use splint_core::{DispatcherResolver, FunctionTableResolver};
use std::path::PathBuf;

#[derive(Args)]
pub struct FunctionsArgs {
    /// Solidity source file.
    pub contract_source: PathBuf,
    /// Contract to inspect.
    pub contract_name: String,
    #[command(flatten)]
    pub build: BuildArgs,
}

#[async_trait]
impl super::Command for FunctionsArgs {
    async fn execute(self) -> color_eyre::Result<()> {
        let (artifact, source) = self.build.load(&self.contract_source, &self.contract_name)?;
        let table = DispatcherResolver.resolve(&artifact, &source)?;
        for (name, offset) in table.iter() {
            println!("0x{offset:04x}  {name}");
        }
        Ok(())
    }
}
