//! An in-process chain backed by revm.
//!
//! Every transaction is mined in its own block. Gas is free (zero gas price), so balances
//! move only by transferred value, which keeps balance assertions exact.

use crate::node::{DEFAULT_GAS_LIMIT, Node, Receipt, TxOutcome, TxRequest, revert_reason};
use crate::{Error, Result};
use alloy::primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use parking_lot::Mutex;
use revm::context::result::{ExecutionResult, Output};
use revm::context::{ContextTr, TxEnv};
use revm::database::InMemoryDB;
use revm::primitives::{KECCAK_EMPTY, TxKind};
use revm::state::AccountInfo;
use revm::{Context, DatabaseCommit, ExecuteEvm, MainBuilder, MainContext};

/// Number of pre-funded accounts a default node exposes.
pub const DEV_ACCOUNTS: usize = 4;

/// Pre-funded accounts are `0x1010..10` through `0xffff..ff`, one per repeated byte.
pub const MAX_DEV_ACCOUNTS: usize = 0x100 - 0x10;

/// One million ether, in wei.
pub fn dev_balance() -> U256 {
    U256::from(10u64).pow(U256::from(24u64))
}

struct Chain {
    db: InMemoryDB,
    accounts: Vec<Address>,
    created_accounts: u64,
    block_number: u64,
}

impl Chain {
    fn nonce(&self, address: Address) -> u64 {
        self.db
            .cache
            .accounts
            .get(&address)
            .map(|account| account.info.nonce)
            .unwrap_or_default()
    }

    fn balance(&self, address: Address) -> U256 {
        self.db
            .cache
            .accounts
            .get(&address)
            .map(|account| account.info.balance)
            .unwrap_or_default()
    }

    fn fund(&mut self, address: Address, balance: U256) {
        self.db.insert_account_info(
            address,
            AccountInfo {
                balance,
                nonce: 0,
                code_hash: KECCAK_EMPTY,
                code: None,
            },
        );
    }
}

/// In-memory node. Cheap to create; each instance is an independent chain.
pub struct LocalNode {
    chain: Mutex<Chain>,
}

impl Default for LocalNode {
    fn default() -> Self {
        Self::new(DEV_ACCOUNTS)
    }
}

impl LocalNode {
    /// Creates a chain with `accounts` pre-funded signers, at most [`MAX_DEV_ACCOUNTS`].
    pub fn new(accounts: usize) -> Self {
        if accounts > MAX_DEV_ACCOUNTS {
            tracing::warn!(
                "{} pre-funded accounts requested, creating {}",
                accounts,
                MAX_DEV_ACCOUNTS
            );
        }
        let accounts = accounts.min(MAX_DEV_ACCOUNTS);
        let mut chain = Chain {
            db: InMemoryDB::default(),
            accounts: Vec::with_capacity(accounts),
            created_accounts: 0,
            block_number: 0,
        };
        for byte in (0x10..=u8::MAX).take(accounts) {
            let address = Address::repeat_byte(byte);
            chain.fund(address, dev_balance());
            chain.accounts.push(address);
        }
        Self {
            chain: Mutex::new(chain),
        }
    }

    /// Runtime code at `address`, empty for accounts without code.
    pub fn code(&self, address: Address) -> Bytes {
        self.chain
            .lock()
            .db
            .cache
            .accounts
            .get(&address)
            .and_then(|account| account.info.code.as_ref())
            .map(|code| code.original_bytes())
            .unwrap_or_default()
    }

    pub fn nonce(&self, address: Address) -> u64 {
        self.chain.lock().nonce(address)
    }

    /// Number of blocks mined so far, one per transaction.
    pub fn block_number(&self) -> u64 {
        self.chain.lock().block_number
    }

    fn transact(&self, tx: TxRequest) -> Result<TxOutcome> {
        let mut chain = self.chain.lock();
        let env = TxEnv {
            caller: tx.from,
            gas_limit: tx.gas_limit.unwrap_or(DEFAULT_GAS_LIMIT),
            kind: match tx.to {
                Some(to) => TxKind::Call(to),
                None => TxKind::Create,
            },
            data: tx.data,
            value: tx.value,
            nonce: chain.nonce(tx.from),
            ..Default::default()
        };

        let db = std::mem::take(&mut chain.db);
        let mut evm = Context::mainnet().with_db(db).build_mainnet();
        let executed = evm.transact(env);
        let outcome = match executed {
            Ok(executed) => {
                evm.db_mut().commit(executed.state);
                chain.block_number += 1;
                Ok(outcome_of(executed.result, chain.block_number))
            }
            Err(e) => Err(Error::Evm(format!("{e:?}"))),
        };
        chain.db = std::mem::take(evm.db_mut());
        outcome
    }
}

fn outcome_of(result: ExecutionResult, block_number: u64) -> TxOutcome {
    match result {
        ExecutionResult::Success {
            output, gas_used, ..
        } => {
            let contract_address = match output {
                Output::Create(_, Some(address)) => Some(address),
                Output::Create(_, None) => {
                    return TxOutcome::Reverted {
                        reason: "contract creation returned no address".into(),
                    };
                }
                Output::Call(_) => None,
            };
            TxOutcome::Confirmed(Receipt {
                tx_hash: None,
                block_number,
                gas_used,
                contract_address,
            })
        }
        ExecutionResult::Revert { output, .. } => TxOutcome::Reverted {
            reason: revert_reason(&output),
        },
        ExecutionResult::Halt { reason, .. } => TxOutcome::Reverted {
            reason: format!("halted: {reason:?}"),
        },
    }
}

#[async_trait]
impl Node for LocalNode {
    fn endpoint(&self) -> String {
        "local revm chain".to_string()
    }

    async fn client_version(&self) -> Result<String> {
        Ok(format!("splint-local/{}", env!("CARGO_PKG_VERSION")))
    }

    async fn accounts(&self) -> Result<Vec<Address>> {
        Ok(self.chain.lock().accounts.clone())
    }

    async fn create_account(&self) -> Result<Address> {
        let mut chain = self.chain.lock();
        chain.created_accounts += 1;
        let seed = format!("splint-local-account-{}", chain.created_accounts);
        let hash = splint_core::keccak256(seed.as_bytes());
        let address = Address::from_slice(&hash[12..]);
        chain.fund(address, U256::ZERO);
        Ok(address)
    }

    async fn balance(&self, address: Address) -> Result<U256> {
        Ok(self.chain.lock().balance(address))
    }

    async fn submit(&self, tx: TxRequest) -> Result<TxOutcome> {
        self.transact(tx)
    }
}
