use super::local_context;
use crate::fixtures::{self, DELETE_PATCH, MIGRATE_TO, REQUIRE_PATCH, WALLET_SOURCE, WITHDRAW};
use alloy::primitives::{Address, Bytes, U256};
use color_eyre::Result;
use splint_core::{ContractArtifact, DispatcherResolver, FunctionTableResolver, function_selector};
use splint_deploy::proxy::proxy_abi;
use splint_deploy::{DeploymentState, ExecutionContext, Orchestrator, TxOutcome, TxRequest};
use splint_patch::{BytecodeRewriter, JumpOutRewriter, PatchSpecification, compile};
use splint_validate::{HarnessConfig, ValidationHarness};

fn harness(artifact: &ContractArtifact) -> ValidationHarness {
    ValidationHarness::new(&proxy_abi(&artifact.abi).unwrap(), HarnessConfig::default()).unwrap()
}

fn patched_runtime(artifact: &ContractArtifact, yaml: &str) -> Result<Vec<u8>> {
    let table = DispatcherResolver.resolve(artifact, WALLET_SOURCE)?;
    let plan = compile(&PatchSpecification::from_yaml(yaml)?, &table)?;
    Ok(JumpOutRewriter::default().rewrite(&artifact.runtime_code, &plan)?)
}

fn calldata(signature: &str, word: [u8; 32]) -> Bytes {
    let mut data = function_selector(signature).to_be_bytes().to_vec();
    data.extend_from_slice(&word);
    data.into()
}

fn address_word(address: Address) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address.as_slice());
    word
}

async fn deposit(ctx: &ExecutionContext, proxy: Address, amount: u64) -> Result<()> {
    let tx = TxRequest::call(ctx.owner(), proxy, function_selector("deposit()").to_be_bytes().to_vec())
        .with_value(U256::from(amount));
    ctx.confirm("deposit", tx).await?;
    Ok(())
}

#[tokio::test]
async fn smoke_test_round_trips_through_the_proxy() -> Result<()> {
    fixtures::init_tracing();
    let (_dir, artifact) = fixtures::wallet_artifact()?;
    let (node, ctx) = local_context().await?;

    let mut orchestrator = Orchestrator::new(ctx.clone());
    orchestrator.deploy(&artifact).await?;
    let system = orchestrator.bind().await?;
    assert_eq!(orchestrator.state(), DeploymentState::LogicBound);
    assert_eq!(system.owner, ctx.owner());
    assert_eq!(node.code(system.logic).to_vec(), artifact.runtime_code);
    assert_ne!(node.code(system.proxy).to_vec(), artifact.runtime_code);

    let smoke = harness(&artifact).run_baseline_smoke_test(&ctx, &system).await?;
    assert!(smoke.passed());
    assert_eq!(smoke.observed, U256::from(5));
    assert_eq!(ctx.balance(system.logic).await?, U256::ZERO);
    Ok(())
}

#[tokio::test]
async fn exploit_drains_the_unpatched_wallet() -> Result<()> {
    fixtures::init_tracing();
    let (_dir, artifact) = fixtures::wallet_artifact()?;
    let (_node, ctx) = local_context().await?;
    let harness = harness(&artifact);

    let mut orchestrator = Orchestrator::new(ctx.clone());
    orchestrator.deploy(&artifact).await?;
    let system = orchestrator.bind().await?;
    harness.run_baseline_smoke_test(&ctx, &system).await?;

    let outcome = harness.run_exploit(&ctx, &system).await?;
    assert!(outcome.succeeded);
    assert!(!outcome.reverted);
    assert_eq!(outcome.balance_before, U256::from(5));
    assert_eq!(outcome.balance_after, U256::ZERO);
    Ok(())
}

#[tokio::test]
async fn require_patch_stops_the_attacker_but_not_the_owner() -> Result<()> {
    fixtures::init_tracing();
    let (_dir, artifact) = fixtures::wallet_artifact()?;
    let (_node, ctx) = local_context().await?;
    let harness = harness(&artifact);

    let mut orchestrator = Orchestrator::new(ctx.clone());
    orchestrator.deploy(&artifact).await?;
    let original = orchestrator.bind().await?;
    assert!(harness.run_exploit(&ctx, &original).await?.succeeded);

    let system = orchestrator
        .upgrade(&patched_runtime(&artifact, REQUIRE_PATCH)?)
        .await?;
    assert_eq!(orchestrator.state(), DeploymentState::Upgraded(1));
    assert_eq!(system.proxy, original.proxy);
    assert_ne!(system.logic, original.logic);

    let outcome = harness.run_exploit(&ctx, &system).await?;
    assert!(outcome.reverted);
    assert!(!outcome.succeeded);
    assert_eq!(outcome.balance_before, U256::from(10));
    assert_eq!(outcome.balance_after, outcome.balance_before);

    // the guard lets the owner through: withdraw still works, and so does migrateTo
    let withdraw = calldata(WITHDRAW, U256::from(4).to_be_bytes::<32>());
    ctx.confirm("withdraw", TxRequest::call(ctx.owner(), system.proxy, withdraw))
        .await?;
    assert_eq!(ctx.balance(system.proxy).await?, U256::from(6));

    let migrate = calldata(MIGRATE_TO, address_word(ctx.owner()));
    ctx.confirm("migrate", TxRequest::call(ctx.owner(), system.proxy, migrate))
        .await?;
    assert_eq!(ctx.balance(system.proxy).await?, U256::ZERO);
    Ok(())
}

#[tokio::test]
async fn deleted_function_reverts_even_for_the_owner() -> Result<()> {
    fixtures::init_tracing();
    let (_dir, artifact) = fixtures::wallet_artifact()?;
    let (_node, ctx) = local_context().await?;

    let mut orchestrator = Orchestrator::new(ctx.clone());
    orchestrator.deploy(&artifact).await?;
    orchestrator.bind().await?;
    let system = orchestrator
        .upgrade(&patched_runtime(&artifact, DELETE_PATCH)?)
        .await?;
    deposit(&ctx, system.proxy, 10).await?;

    let migrate = calldata(MIGRATE_TO, address_word(ctx.owner()));
    let outcome = ctx
        .submit_and_confirm(TxRequest::call(ctx.owner(), system.proxy, migrate))
        .await?;
    assert!(matches!(outcome, TxOutcome::Reverted { .. }), "{outcome:?}");
    assert_eq!(ctx.balance(system.proxy).await?, U256::from(10));

    let attempt = harness(&artifact).run_exploit(&ctx, &system).await?;
    assert!(attempt.reverted);
    assert_eq!(attempt.balance_after, U256::from(10));
    Ok(())
}

#[tokio::test]
async fn second_upgrade_replaces_the_first() -> Result<()> {
    let (_dir, artifact) = fixtures::wallet_artifact()?;
    let (node, ctx) = local_context().await?;

    let mut orchestrator = Orchestrator::new(ctx.clone());
    orchestrator.deploy(&artifact).await?;
    orchestrator.bind().await?;
    orchestrator
        .upgrade(&patched_runtime(&artifact, DELETE_PATCH)?)
        .await?;
    let system = orchestrator.upgrade(&artifact.runtime_code).await?;
    assert_eq!(orchestrator.state(), DeploymentState::Upgraded(2));
    assert_eq!(node.code(system.logic).to_vec(), artifact.runtime_code);

    // back on the original logic the exploit works again
    assert!(harness(&artifact).run_exploit(&ctx, &system).await?.succeeded);
    Ok(())
}
