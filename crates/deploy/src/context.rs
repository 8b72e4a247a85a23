//! The connection every deploy and validation step runs against.

use crate::node::{Node, Receipt, TxOutcome, TxRequest};
use crate::{Error, Result};
use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Policy knobs for an [`ExecutionContext`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// How long to wait for a submitted transaction to be mined.
    #[serde(with = "duration_secs")]
    pub confirmation_timeout: Duration,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            confirmation_timeout: Duration::from_secs(120),
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

/// A live node plus the identity that deploys and administers contracts.
#[derive(Clone)]
pub struct ExecutionContext {
    node: Arc<dyn Node>,
    owner: Address,
    config: ContextConfig,
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("endpoint", &self.node.endpoint())
            .field("owner", &self.owner)
            .field("config", &self.config)
            .finish()
    }
}

impl ExecutionContext {
    /// Probes `node` and picks its first account as owner.
    pub async fn connect(node: Arc<dyn Node>, config: ContextConfig) -> Result<Self> {
        let endpoint = node.endpoint();
        let version = node
            .client_version()
            .await
            .map_err(|e| Error::NetworkUnavailable {
                endpoint: endpoint.clone(),
                reason: e.to_string(),
            })?;
        let owner = node
            .accounts()
            .await?
            .first()
            .copied()
            .ok_or(Error::NoAccounts)?;

        tracing::info!("Connected to {} ({})", endpoint, version);
        tracing::info!("Deploying as {}", owner);

        Ok(Self {
            node,
            owner,
            config,
        })
    }

    pub fn node(&self) -> &Arc<dyn Node> {
        &self.node
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    pub async fn balance(&self, address: Address) -> Result<U256> {
        self.node.balance(address).await
    }

    /// Submits `tx`, giving up after the configured confirmation timeout.
    ///
    /// Reverts come back as [`TxOutcome::Reverted`] rather than an error so callers that
    /// expect a revert can treat it as a normal result.
    pub async fn submit_and_confirm(&self, tx: TxRequest) -> Result<TxOutcome> {
        let timeout = self.config.confirmation_timeout;
        match tokio::time::timeout(timeout, self.node.submit(tx)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!("No receipt after {:?}", timeout);
                Ok(TxOutcome::TimedOut(timeout))
            }
        }
    }

    /// Like [`submit_and_confirm`](Self::submit_and_confirm), but anything short of a mined,
    /// successful transaction is an error attributed to `action`.
    pub async fn confirm(&self, action: &str, tx: TxRequest) -> Result<Receipt> {
        match self.submit_and_confirm(tx).await? {
            TxOutcome::Confirmed(receipt) => {
                tracing::debug!("{}: {}", action, receipt);
                Ok(receipt)
            }
            TxOutcome::Reverted { reason } => Err(Error::TransactionFailed {
                action: action.to_string(),
                detail: reason,
            }),
            TxOutcome::TimedOut(after) => Err(Error::TransactionFailed {
                action: action.to_string(),
                detail: format!("not mined within {after:?}"),
            }),
        }
    }
}
