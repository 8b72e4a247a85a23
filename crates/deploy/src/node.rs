//! The boundary between splint and an Ethereum node.

use crate::Result;
use alloy::primitives::{Address, B256, Bytes, U256};
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

/// Default gas limit for transactions the node does not estimate itself.
pub const DEFAULT_GAS_LIMIT: u64 = 10_000_000;

/// A transaction to submit. `to == None` creates a contract from `data`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRequest {
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
    pub data: Bytes,
    /// Left to the node when `None`.
    pub gas_limit: Option<u64>,
}

impl TxRequest {
    pub fn create(from: Address, code: impl Into<Bytes>) -> Self {
        Self {
            from,
            to: None,
            value: U256::ZERO,
            data: code.into(),
            gas_limit: None,
        }
    }

    pub fn call(from: Address, to: Address, data: impl Into<Bytes>) -> Self {
        Self {
            from,
            to: Some(to),
            value: U256::ZERO,
            data: data.into(),
            gas_limit: None,
        }
    }

    pub fn transfer(from: Address, to: Address, value: U256) -> Self {
        Self::call(from, to, Bytes::new()).with_value(value)
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = Some(gas_limit);
        self
    }
}

/// Receipt of a successfully executed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: Option<B256>,
    pub block_number: u64,
    pub gas_used: u64,
    pub contract_address: Option<Address>,
}

impl fmt::Display for Receipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block {} gas {}", self.block_number, self.gas_used)?;
        if let Some(hash) = &self.tx_hash {
            write!(f, " tx {hash}")?;
        }
        if let Some(address) = &self.contract_address {
            write!(f, " created {address}")?;
        }
        Ok(())
    }
}

/// How a submitted transaction ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxOutcome {
    Confirmed(Receipt),
    /// Execution reverted or halted; a benign, expected result for exploit attempts.
    Reverted { reason: String },
    /// No receipt arrived within the confirmation timeout.
    TimedOut(Duration),
}

impl TxOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, TxOutcome::Confirmed(_))
    }
}

/// Operations splint needs from a node.
#[async_trait]
pub trait Node: Send + Sync {
    /// Human-readable location of the node, for logs and errors.
    fn endpoint(&self) -> String;

    async fn client_version(&self) -> Result<String>;

    /// Accounts the node can sign for; the first one deploys and owns the system.
    async fn accounts(&self) -> Result<Vec<Address>>;

    /// Creates a fresh, unlocked, unfunded account.
    async fn create_account(&self) -> Result<Address>;

    async fn balance(&self, address: Address) -> Result<U256>;

    /// Submits `tx` and waits for it to be mined.
    async fn submit(&self, tx: TxRequest) -> Result<TxOutcome>;
}

/// Human-readable revert reason: the `Error(string)` message when present, else hex.
pub fn revert_reason(output: &[u8]) -> String {
    const ERROR_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

    if output.is_empty() {
        return "execution reverted".to_string();
    }
    if output.len() >= 68 && output[..4] == ERROR_SELECTOR {
        let length = U256::from_be_slice(&output[36..68]);
        if let Ok(length) = usize::try_from(length)
            && let Some(message) = output.get(68..68 + length)
        {
            return format!("execution reverted: {}", String::from_utf8_lossy(message));
        }
    }
    format!("execution reverted: 0x{}", hex::encode(output))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_error_string() {
        let mut output = vec![0x08, 0xc3, 0x79, 0xa0];
        output.extend_from_slice(&[0u8; 31]);
        output.push(0x20);
        output.extend_from_slice(&[0u8; 31]);
        output.push(3);
        output.extend_from_slice(b"nop");
        output.extend_from_slice(&[0u8; 29]);
        assert_eq!(revert_reason(&output), "execution reverted: nop");
    }

    #[test]
    fn empty_and_custom_reverts() {
        assert_eq!(revert_reason(&[]), "execution reverted");
        assert_eq!(revert_reason(&[0xde, 0xad]), "execution reverted: 0xdead");
    }

    #[test]
    fn request_builders() {
        let a = Address::repeat_byte(1);
        let b = Address::repeat_byte(2);
        let tx = TxRequest::transfer(a, b, U256::from(7));
        assert_eq!(tx.to, Some(b));
        assert_eq!(tx.value, U256::from(7));
        assert!(tx.data.is_empty());
        assert_eq!(TxRequest::create(a, vec![0x00]).to, None);
    }
}
