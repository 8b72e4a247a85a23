//! Smoke test and exploit attempts against a deployed wallet-like contract.
//!
//! The harness holds no history: every call takes the current [`DeployedSystem`] and returns
//! a fresh outcome, so a pre-patch result can never leak into the post-patch judgement.

use crate::{Error, Result};
use alloy::json_abi::{Function, JsonAbi};
use alloy::primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};
use splint_deploy::{DeployedSystem, ExecutionContext, TxOutcome, TxRequest};
use std::fmt;

/// Amounts and entry points the harness uses. Amounts are in wei.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub deposit_amount: u128,
    pub withdraw_amount: u128,
    /// Sent to each freshly created attacker so it can pay for gas.
    pub attacker_funding: u128,
    /// Payable, no arguments.
    pub deposit_function: String,
    /// Takes a single `uint256` amount.
    pub withdraw_function: String,
    /// The vulnerable transfer; takes the beneficiary `address`, or nothing.
    pub exploit_function: String,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            deposit_amount: 10,
            withdraw_amount: 5,
            attacker_funding: 100 * 10u128.pow(18),
            deposit_function: "deposit".into(),
            withdraw_function: "withdraw".into(),
            exploit_function: "migrateTo".into(),
        }
    }
}

/// Result of the deposit/withdraw round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmokeOutcome {
    pub expected: U256,
    pub observed: U256,
}

impl SmokeOutcome {
    pub fn passed(&self) -> bool {
        self.expected == self.observed
    }
}

/// One exploit attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub balance_before: U256,
    pub balance_after: U256,
    /// The exploit transaction reverted.
    pub reverted: bool,
    /// The target was drained to zero.
    pub succeeded: bool,
}

impl fmt::Display for ValidationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "balance {} -> {}, call {}",
            self.balance_before,
            self.balance_after,
            if self.reverted { "reverted" } else { "succeeded" }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExploitCall {
    NoArguments([u8; 4]),
    /// The attacker passes its own address as beneficiary.
    Beneficiary([u8; 4]),
}

impl ExploitCall {
    fn resolve(abi: &JsonAbi, name: &str) -> Result<Self> {
        let function = find(abi, name)?;
        if takes(function, &[]) {
            Ok(Self::NoArguments(function.selector().0))
        } else if takes(function, &["address"]) {
            Ok(Self::Beneficiary(function.selector().0))
        } else {
            Err(Error::UnsupportedTarget(format!(
                "{} must take an address or nothing",
                function.signature()
            )))
        }
    }

    fn calldata(self, attacker: Address) -> Bytes {
        match self {
            Self::NoArguments(selector) => selector.to_vec().into(),
            Self::Beneficiary(selector) => {
                let mut data = selector.to_vec();
                data.extend_from_slice(&[0u8; 12]);
                data.extend_from_slice(attacker.as_slice());
                data.into()
            }
        }
    }
}

/// Drives the deposit, withdraw and exploit entry points of a target.
#[derive(Debug, Clone)]
pub struct ValidationHarness {
    config: HarnessConfig,
    deposit: [u8; 4],
    withdraw: [u8; 4],
    /// `None` for a harness that only runs the smoke test.
    exploit: Option<ExploitCall>,
}

impl ValidationHarness {
    /// Checks that `abi` has the entry points `config` names, with usable signatures.
    pub fn new(abi: &JsonAbi, config: HarnessConfig) -> Result<Self> {
        let exploit = ExploitCall::resolve(abi, &config.exploit_function)?;
        Ok(Self {
            exploit: Some(exploit),
            ..Self::smoke_only(abi, config)?
        })
    }

    /// Like [`new`](Self::new) but without the exploit entry point, for deploy-only runs.
    /// [`run_exploit`](Self::run_exploit) then fails with [`Error::UnsupportedTarget`].
    pub fn smoke_only(abi: &JsonAbi, config: HarnessConfig) -> Result<Self> {
        let deposit = find(abi, &config.deposit_function)?;
        if !deposit.inputs.is_empty() {
            return Err(Error::UnsupportedTarget(format!(
                "{} must take no arguments",
                deposit.signature()
            )));
        }

        let withdraw = find(abi, &config.withdraw_function)?;
        if !takes(withdraw, &["uint256"]) {
            return Err(Error::UnsupportedTarget(format!(
                "{} must take a single uint256",
                withdraw.signature()
            )));
        }

        Ok(Self {
            deposit: deposit.selector().0,
            withdraw: withdraw.selector().0,
            exploit: None,
            config,
        })
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Deposits then withdraws a smaller amount as the owner and compares the balance.
    ///
    /// A mismatch is logged and reported, not raised.
    pub async fn run_baseline_smoke_test(
        &self,
        ctx: &ExecutionContext,
        system: &DeployedSystem,
    ) -> Result<SmokeOutcome> {
        let deposit = U256::from(self.config.deposit_amount);
        let withdraw = U256::from(self.config.withdraw_amount);
        let before = ctx.balance(system.proxy).await?;

        self.deposit(ctx, system, system.owner, deposit).await?;
        ctx.confirm(
            "withdraw",
            TxRequest::call(system.owner, system.proxy, self.withdraw_calldata(withdraw)),
        )
        .await?;

        let outcome = SmokeOutcome {
            expected: before + deposit - withdraw,
            observed: ctx.balance(system.proxy).await?,
        };
        if outcome.passed() {
            tracing::info!("Smoke test passed: balance {}", outcome.observed);
        } else {
            tracing::error!(
                "Smoke test mismatch: expected balance {}, observed {}",
                outcome.expected,
                outcome.observed
            );
        }
        Ok(outcome)
    }

    /// Attempts to drain the target from a fresh, funded account.
    pub async fn run_exploit(
        &self,
        ctx: &ExecutionContext,
        system: &DeployedSystem,
    ) -> Result<ValidationOutcome> {
        let exploit = self.exploit.ok_or_else(|| {
            Error::UnsupportedTarget(format!(
                "harness was built without `{}`",
                self.config.exploit_function
            ))
        })?;
        let attacker = ctx.node().create_account().await?;
        ctx.confirm(
            "attacker funding",
            TxRequest::transfer(
                system.owner,
                attacker,
                U256::from(self.config.attacker_funding),
            ),
        )
        .await?;
        tracing::debug!("Attacker {} funded", attacker);

        if ctx.balance(system.proxy).await?.is_zero() {
            tracing::info!("Target is empty, depositing so there is something to drain");
            let amount = U256::from(self.config.deposit_amount);
            self.deposit(ctx, system, system.owner, amount).await?;
        }

        let balance_before = ctx.balance(system.proxy).await?;
        let attempt = TxRequest::call(attacker, system.proxy, exploit.calldata(attacker));
        let reverted = match ctx.submit_and_confirm(attempt).await? {
            TxOutcome::Confirmed(receipt) => {
                tracing::debug!("Exploit mined: {}", receipt);
                false
            }
            TxOutcome::Reverted { reason } => {
                tracing::info!("Exploit reverted: {}", reason);
                true
            }
            TxOutcome::TimedOut(after) => {
                return Err(splint_deploy::Error::TransactionFailed {
                    action: "exploit".into(),
                    detail: format!("not mined within {after:?}"),
                }
                .into());
            }
        };
        let balance_after = ctx.balance(system.proxy).await?;

        let outcome = ValidationOutcome {
            balance_before,
            balance_after,
            reverted,
            succeeded: balance_after.is_zero(),
        };
        tracing::info!("Exploit attempt: {}", outcome);
        Ok(outcome)
    }

    async fn deposit(
        &self,
        ctx: &ExecutionContext,
        system: &DeployedSystem,
        from: Address,
        amount: U256,
    ) -> Result<()> {
        let tx = TxRequest::call(from, system.proxy, self.deposit.to_vec()).with_value(amount);
        ctx.confirm("deposit", tx).await?;
        Ok(())
    }

    fn withdraw_calldata(&self, amount: U256) -> Bytes {
        let mut data = self.withdraw.to_vec();
        data.extend_from_slice(&amount.to_be_bytes::<32>());
        data.into()
    }
}

fn find<'a>(abi: &'a JsonAbi, name: &str) -> Result<&'a Function> {
    abi.functions
        .get(name)
        .and_then(|overloads| overloads.first())
        .ok_or_else(|| Error::UnsupportedTarget(format!("no `{name}` function in the ABI")))
}

fn takes(function: &Function, types: &[&str]) -> bool {
    function.inputs.len() == types.len()
        && function
            .inputs
            .iter()
            .zip(types)
            .all(|(param, ty)| param.ty == *ty)
}
