//! [`Node`] over a node's JSON-RPC IPC socket, with node-managed accounts.

use crate::node::{Node, Receipt, TxOutcome, TxRequest};
use crate::{Error, Result};
use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, U256};
use alloy::providers::{DynProvider, IpcConnect, Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// IPC socket used when none is given, relative to `$HOME`.
pub const DEFAULT_IPC_FILE: &str = ".geth.ipc";

/// Socket tried when the default one does not exist.
pub const FALLBACK_IPC_PATH: &str = "/tmp/geth/geth.ipc";

/// Picks the IPC socket: `explicit` if given, else `~/.geth.ipc`, else the fallback path
/// when that one exists.
pub fn resolve_ipc_path(explicit: Option<PathBuf>) -> PathBuf {
    if let Some(path) = explicit {
        return path;
    }
    let home = std::env::var_os("HOME").map(PathBuf::from);
    default_ipc_path(home.as_deref(), Path::new(FALLBACK_IPC_PATH))
}

fn default_ipc_path(home: Option<&Path>, fallback: &Path) -> PathBuf {
    let default = home.map_or_else(
        || PathBuf::from(DEFAULT_IPC_FILE),
        |home| home.join(DEFAULT_IPC_FILE),
    );
    if !default.exists() && fallback.exists() {
        tracing::debug!(
            "{} not found, using {}",
            default.display(),
            fallback.display()
        );
        return fallback.to_path_buf();
    }
    default
}

/// A geth-style node reached over IPC.
pub struct RpcNode {
    path: PathBuf,
    provider: DynProvider,
}

impl RpcNode {
    /// Opens the IPC connection; failure is [`Error::NetworkUnavailable`].
    pub async fn connect(path: PathBuf) -> Result<Self> {
        tracing::debug!("Connecting to {}", path.display());
        let provider = ProviderBuilder::new()
            .connect_ipc(IpcConnect::new(path.clone()))
            .await
            .map_err(|e| Error::NetworkUnavailable {
                endpoint: path.display().to_string(),
                reason: e.to_string(),
            })?
            .erased();
        Ok(Self { path, provider })
    }
}

/// True for the gas-estimation failure geth reports when the call would revert: "always
/// failing transaction" before 1.9.15, "execution reverted" since.
fn is_revert_message(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("always failing") || message.contains("execution reverted")
}

#[async_trait]
impl Node for RpcNode {
    fn endpoint(&self) -> String {
        self.path.display().to_string()
    }

    async fn client_version(&self) -> Result<String> {
        self.provider
            .get_client_version()
            .await
            .map_err(|e| Error::Rpc(e.to_string()))
    }

    async fn accounts(&self) -> Result<Vec<Address>> {
        self.provider
            .get_accounts()
            .await
            .map_err(|e| Error::Rpc(e.to_string()))
    }

    async fn create_account(&self) -> Result<Address> {
        let address: Address = self
            .provider
            .raw_request("personal_newAccount".into(), (String::new(),))
            .await
            .map_err(|e| Error::Rpc(format!("personal_newAccount: {e}")))?;
        let unlocked: bool = self
            .provider
            .raw_request("personal_unlockAccount".into(), (address, String::new(), 0u64))
            .await
            .map_err(|e| Error::Rpc(format!("personal_unlockAccount: {e}")))?;
        if !unlocked {
            return Err(Error::Rpc(format!("node refused to unlock {address}")));
        }
        tracing::debug!("Created account {}", address);
        Ok(address)
    }

    async fn balance(&self, address: Address) -> Result<U256> {
        self.provider
            .get_balance(address)
            .await
            .map_err(|e| Error::Rpc(e.to_string()))
    }

    async fn submit(&self, tx: TxRequest) -> Result<TxOutcome> {
        let mut request = TransactionRequest::default()
            .with_from(tx.from)
            .with_value(tx.value);
        request = match tx.to {
            Some(to) => request.with_to(to).with_input(tx.data),
            None => request.with_deploy_code(tx.data),
        };
        if let Some(gas_limit) = tx.gas_limit {
            request = request.with_gas_limit(gas_limit);
        }

        let pending = match self.provider.send_transaction(request).await {
            Ok(pending) => pending,
            Err(e) if is_revert_message(&e.to_string()) => {
                return Ok(TxOutcome::Reverted {
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(Error::Rpc(e.to_string())),
        };
        let receipt = pending
            .get_receipt()
            .await
            .map_err(|e| Error::Rpc(e.to_string()))?;

        if !receipt.status() {
            return Ok(TxOutcome::Reverted {
                reason: format!("transaction {} reverted", receipt.transaction_hash),
            });
        }
        Ok(TxOutcome::Confirmed(Receipt {
            tx_hash: Some(receipt.transaction_hash),
            block_number: receipt.block_number.unwrap_or_default(),
            gas_used: receipt.gas_used,
            contract_address: receipt.contract_address,
        }))
    }
}
