//! Lifecycle of a proxy/logic pair: deploy, bind, upgrade.

use crate::context::ExecutionContext;
use crate::node::TxRequest;
use crate::proxy::{make_deployable, proxy_deploy, upgrade_calldata};
use crate::{Error, Result};
use alloy::primitives::Address;
use splint_core::ContractArtifact;
use std::fmt;

/// Where an [`Orchestrator`] is in the proxy lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentState {
    Unset,
    ProxyAndLogicDeployed,
    LogicBound,
    /// Number of upgrades since the initial bind.
    Upgraded(u32),
}

impl fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeploymentState::Unset => write!(f, "nothing is deployed"),
            DeploymentState::ProxyAndLogicDeployed => write!(f, "proxy and logic are unbound"),
            DeploymentState::LogicBound => write!(f, "logic is bound"),
            DeploymentState::Upgraded(k) => write!(f, "upgraded {k} time(s)"),
        }
    }
}

/// Addresses of a live deployment. The proxy never changes; `logic` follows every upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeployedSystem {
    pub proxy: Address,
    pub logic: Address,
    pub owner: Address,
}

/// Drives one proxy through its lifecycle. Transactions are sent from the context owner,
/// who is also the proxy admin.
#[derive(Debug)]
pub struct Orchestrator {
    ctx: ExecutionContext,
    state: DeploymentState,
    system: Option<DeployedSystem>,
}

impl Orchestrator {
    pub fn new(ctx: ExecutionContext) -> Self {
        Self {
            ctx,
            state: DeploymentState::Unset,
            system: None,
        }
    }

    pub fn state(&self) -> DeploymentState {
        self.state
    }

    pub fn system(&self) -> Option<DeployedSystem> {
        self.system
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.ctx
    }

    /// Deploys the logic contract from the artifact's runtime, then the proxy.
    pub async fn deploy(&mut self, artifact: &ContractArtifact) -> Result<DeployedSystem> {
        self.expect_state("deploy", |state| state == DeploymentState::Unset)?;
        artifact.ensure_no_constructor_args()?;

        let owner = self.ctx.owner();
        let logic = self.deploy_logic(&artifact.runtime_code).await?;

        let init = proxy_deploy(&artifact.init_code, &artifact.runtime_code, owner)?;
        let proxy = self.create("proxy deployment", init).await?;
        tracing::info!("Proxy for {} deployed at {}", artifact.name, proxy);

        let system = DeployedSystem {
            proxy,
            logic,
            owner,
        };
        self.system = Some(system);
        self.state = DeploymentState::ProxyAndLogicDeployed;
        Ok(system)
    }

    /// Points the freshly deployed proxy at its logic contract.
    pub async fn bind(&mut self) -> Result<DeployedSystem> {
        self.expect_state("bind", |state| {
            state == DeploymentState::ProxyAndLogicDeployed
        })?;
        let system = self.current("bind")?;

        self.point_proxy_at(&system, system.logic, "bind").await?;
        self.state = DeploymentState::LogicBound;
        Ok(system)
    }

    /// Deploys `runtime` as a new logic contract and re-points the proxy at it.
    pub async fn upgrade(&mut self, runtime: &[u8]) -> Result<DeployedSystem> {
        self.expect_state("upgrade", |state| {
            matches!(
                state,
                DeploymentState::LogicBound | DeploymentState::Upgraded(_)
            )
        })?;
        let mut system = self.current("upgrade")?;

        let logic = self.deploy_logic(runtime).await?;
        self.point_proxy_at(&system, logic, "upgrade").await?;

        system.logic = logic;
        self.system = Some(system);
        self.state = match self.state {
            DeploymentState::Upgraded(k) => DeploymentState::Upgraded(k + 1),
            _ => DeploymentState::Upgraded(1),
        };
        tracing::info!("Proxy {} now runs logic {} ({})", system.proxy, logic, self.state);
        Ok(system)
    }

    async fn deploy_logic(&self, runtime: &[u8]) -> Result<Address> {
        let address = self
            .create("logic deployment", make_deployable(runtime)?)
            .await?;
        tracing::info!("Logic contract ({} bytes) deployed at {}", runtime.len(), address);
        Ok(address)
    }

    async fn create(&self, action: &str, code: Vec<u8>) -> Result<Address> {
        let receipt = self
            .ctx
            .confirm(action, TxRequest::create(self.ctx.owner(), code))
            .await?;
        receipt
            .contract_address
            .ok_or_else(|| Error::TransactionFailed {
                action: action.to_string(),
                detail: format!("receipt without contract address ({receipt})"),
            })
    }

    async fn point_proxy_at(
        &self,
        system: &DeployedSystem,
        logic: Address,
        action: &str,
    ) -> Result<()> {
        let tx = TxRequest::call(system.owner, system.proxy, upgrade_calldata(logic));
        let receipt = self.ctx.confirm(action, tx).await?;
        tracing::debug!("{} {} -> {}: {}", action, system.proxy, logic, receipt);
        Ok(())
    }

    fn expect_state(
        &self,
        operation: &'static str,
        allowed: impl Fn(DeploymentState) -> bool,
    ) -> Result<()> {
        if allowed(self.state) {
            Ok(())
        } else {
            Err(Error::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    fn current(&self, operation: &'static str) -> Result<DeployedSystem> {
        self.system.ok_or(Error::InvalidState {
            operation,
            state: self.state,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextConfig;
    use crate::node::{Node, TxOutcome};
    use crate::LocalNode;
    use alloy::json_abi::JsonAbi;
    use alloy::primitives::U256;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    const ACCEPTING: [u8; 1] = [0x00];
    const REVERTING: [u8; 4] = [0x60, 0x00, 0x80, 0xfd];

    fn artifact(runtime: &[u8]) -> ContractArtifact {
        ContractArtifact {
            name: "Sink".into(),
            init_code: make_deployable(runtime).unwrap(),
            runtime_code: runtime.to_vec(),
            abi: JsonAbi::default(),
            source_map: String::new(),
            selectors: BTreeMap::new(),
        }
    }

    async fn setup() -> (Arc<LocalNode>, Orchestrator) {
        let node = Arc::new(LocalNode::default());
        let ctx = ExecutionContext::connect(node.clone(), ContextConfig::default())
            .await
            .unwrap();
        (node, Orchestrator::new(ctx))
    }

    #[tokio::test]
    async fn full_lifecycle_keeps_proxy_address() {
        let (node, mut orchestrator) = setup().await;
        let deployed = orchestrator.deploy(&artifact(&ACCEPTING)).await.unwrap();
        assert_eq!(orchestrator.state(), DeploymentState::ProxyAndLogicDeployed);
        assert_eq!(node.code(deployed.logic).as_ref(), &ACCEPTING);

        let bound = orchestrator.bind().await.unwrap();
        assert_eq!(bound, deployed);
        assert_eq!(orchestrator.state(), DeploymentState::LogicBound);

        let pay = TxRequest::transfer(bound.owner, bound.proxy, U256::from(1));
        assert!(node.submit(pay.clone()).await.unwrap().is_confirmed());

        let upgraded = orchestrator.upgrade(&REVERTING).await.unwrap();
        assert_eq!(upgraded.proxy, deployed.proxy);
        assert_ne!(upgraded.logic, deployed.logic);
        assert_eq!(orchestrator.state(), DeploymentState::Upgraded(1));
        assert!(matches!(
            node.submit(pay).await.unwrap(),
            TxOutcome::Reverted { .. }
        ));

        orchestrator.upgrade(&ACCEPTING).await.unwrap();
        assert_eq!(orchestrator.state(), DeploymentState::Upgraded(2));
        assert_eq!(orchestrator.system().unwrap().proxy, deployed.proxy);
    }

    #[tokio::test]
    async fn out_of_order_calls_are_rejected() {
        let (_, mut orchestrator) = setup().await;
        assert!(matches!(
            orchestrator.bind().await,
            Err(Error::InvalidState { operation: "bind", state: DeploymentState::Unset })
        ));
        assert!(matches!(
            orchestrator.upgrade(&ACCEPTING).await,
            Err(Error::InvalidState { operation: "upgrade", .. })
        ));

        orchestrator.deploy(&artifact(&ACCEPTING)).await.unwrap();
        assert!(matches!(
            orchestrator.upgrade(&ACCEPTING).await,
            Err(Error::InvalidState { .. })
        ));
        let err = orchestrator.deploy(&artifact(&ACCEPTING)).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "cannot deploy while proxy and logic are unbound"
        );
    }

    #[tokio::test]
    async fn constructor_arguments_are_refused_before_any_transaction() {
        let (node, mut orchestrator) = setup().await;
        let mut target = artifact(&ACCEPTING);
        target.abi = serde_json::from_str(
            r#"[{"type":"constructor","inputs":[{"name":"cap","type":"uint256","internalType":"uint256"}],"stateMutability":"nonpayable"}]"#,
        )
        .unwrap();

        let err = orchestrator.deploy(&target).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Core(splint_core::Error::UnsupportedConstructorArguments { .. })
        ));
        assert_eq!(node.nonce(orchestrator.context().owner()), 0);
        assert_eq!(orchestrator.state(), DeploymentState::Unset);
    }

    #[test]
    fn state_display() {
        assert_eq!(DeploymentState::Upgraded(3).to_string(), "upgraded 3 time(s)");
    }
}
