//! End to end runs on a local revm chain.
//!
//! The wallet is deployed behind the proxy exactly as the CLI would, then driven through
//! the smoke test, the exploit and each kind of patch.

mod protocol;
mod wallet;

use color_eyre::Result;
use splint_deploy::{ContextConfig, ExecutionContext, LocalNode};
use std::sync::Arc;

/// A fresh chain and a context owned by its first development account.
pub async fn local_context() -> Result<(Arc<LocalNode>, ExecutionContext)> {
    let node = Arc::new(LocalNode::default());
    let ctx = ExecutionContext::connect(node.clone(), ContextConfig::default()).await?;
    Ok((node, ctx))
}
