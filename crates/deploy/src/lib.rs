//! Deployment of a contract behind an upgradeable proxy, and hot-swapping its logic.
//!
//! Everything that talks to a chain goes through the [`Node`] trait. Two nodes ship:
//! [`LocalNode`], an in-process chain on revm, and [`RpcNode`], a JSON-RPC client over a
//! node's IPC socket. [`ExecutionContext`] adds the deployer identity and confirmation
//! policy; [`Orchestrator`] drives the proxy lifecycle on top of it.

pub mod context;
pub mod local;
pub mod node;
pub mod orchestrator;
pub mod proxy;
pub mod rpc;

pub use context::{ContextConfig, ExecutionContext};
pub use local::LocalNode;
pub use node::{Node, Receipt, TxOutcome, TxRequest};
pub use orchestrator::{DeployedSystem, DeploymentState, Orchestrator};
pub use rpc::RpcNode;

use thiserror::Error;

/// Deploy error type encompassing all deploy module errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Core operation failed.
    #[error(transparent)]
    Core(#[from] splint_core::Error),

    /// The node could not be reached.
    #[error("network unavailable at {endpoint}: {reason}")]
    NetworkUnavailable { endpoint: String, reason: String },

    /// The node exposes no accounts to deploy from.
    #[error("node exposes no accounts")]
    NoAccounts,

    /// A transaction the workflow depends on did not succeed.
    #[error("{action} failed: {detail}")]
    TransactionFailed { action: String, detail: String },

    /// JSON-RPC request failed for a reason other than a revert.
    #[error("rpc error: {0}")]
    Rpc(String),

    /// The local EVM rejected a transaction outright.
    #[error("evm error: {0}")]
    Evm(String),

    /// An orchestrator operation was called out of order.
    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: DeploymentState,
    },

    /// A built-in ABI document failed to parse.
    #[error("invalid ABI: {0}")]
    Abi(#[from] serde_json::Error),

    /// Init code does not have the constructor-then-runtime layout the proxy builder expects.
    #[error("unrecognised init code: {0}")]
    UnrecognisedInitCode(String),
}

/// Deploy result type
pub type Result<T> = std::result::Result<T, Error>;
