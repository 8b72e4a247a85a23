use super::local_context;
use crate::fixtures::{self, DELETE_PATCH, REQUIRE_PATCH, WALLET_SOURCE};
use color_eyre::Result;
use splint_core::{ContractArtifact, DispatcherResolver, FunctionTableResolver};
use splint_patch::{BytecodeRewriter, JumpOutRewriter, PatchSpecification, compile};
use splint_validate::{Error, ExploitStage, HarnessConfig, Protocol, Verdict};

fn protocol(artifact: ContractArtifact, yaml: Option<&str>) -> Result<Protocol> {
    let spec = yaml.map(PatchSpecification::from_yaml).transpose()?;
    Ok(Protocol::new(
        artifact,
        WALLET_SOURCE.to_string(),
        spec,
        HarnessConfig::default(),
    )?)
}

#[tokio::test]
async fn both_patch_kinds_are_validated() -> Result<()> {
    fixtures::init_tracing();
    for yaml in [REQUIRE_PATCH, DELETE_PATCH] {
        let (_dir, artifact) = fixtures::wallet_artifact()?;
        let (node, ctx) = local_context().await?;
        let protocol = protocol(artifact.clone(), Some(yaml))?;

        let verdict = protocol.run(&ctx).await?;
        let Verdict::PatchValidated {
            system,
            smoke,
            pre,
            post,
        } = &verdict
        else {
            panic!("expected a validated patch, got {verdict:?}");
        };
        assert!(smoke.passed());
        assert!(pre.succeeded);
        assert!(post.reverted);
        assert!(!post.succeeded);
        assert!(!post.balance_after.is_zero());
        assert_ne!(node.code(system.logic).to_vec(), artifact.runtime_code);
    }
    Ok(())
}

#[tokio::test]
async fn without_a_specification_only_the_smoke_test_runs() -> Result<()> {
    let (_dir, artifact) = fixtures::wallet_artifact()?;
    let (node, ctx) = local_context().await?;

    let protocol = protocol(artifact, None)?;
    assert!(protocol.prepare()?.is_none());
    let verdict = protocol.run(&ctx).await?;
    assert!(matches!(verdict, Verdict::DeployedOnly { .. }), "{verdict:?}");
    assert!(verdict.smoke().passed());
    // logic, proxy, bind, deposit, withdraw
    assert_eq!(node.nonce(ctx.owner()), 5);
    Ok(())
}

#[tokio::test]
async fn deploy_only_run_needs_no_exploit_entry_point() -> Result<()> {
    let (_dir, mut artifact) = fixtures::wallet_artifact()?;
    artifact.abi.functions.remove("migrateTo");

    let spec = PatchSpecification::from_yaml(REQUIRE_PATCH)?;
    let rejected = Protocol::new(
        artifact.clone(),
        WALLET_SOURCE.to_string(),
        Some(spec),
        HarnessConfig::default(),
    );
    assert!(
        matches!(&rejected, Err(Error::UnsupportedTarget(message)) if message.contains("migrateTo")),
        "{:?}",
        rejected.err()
    );

    let (_node, ctx) = local_context().await?;
    let protocol = protocol(artifact, None)?;
    let verdict = protocol.run(&ctx).await?;
    assert!(matches!(verdict, Verdict::DeployedOnly { .. }), "{verdict:?}");
    assert!(verdict.smoke().passed());
    Ok(())
}

#[tokio::test]
async fn unknown_function_fails_before_any_transaction() -> Result<()> {
    let (_dir, artifact) = fixtures::wallet_artifact()?;
    let (node, ctx) = local_context().await?;

    let protocol = protocol(artifact, Some("add_require_patch:\n  drain:\n    - msg.sender == sload(owner)\n"))?;
    match protocol.run(&ctx).await {
        Err(Error::Patch(splint_patch::Error::Core(splint_core::Error::FunctionNotFound {
            function,
            ..
        }))) => assert_eq!(function, "drain"),
        other => panic!("expected FunctionNotFound, got {other:?}"),
    }
    assert_eq!(node.nonce(ctx.owner()), 0);
    assert_eq!(node.block_number(), 0);
    Ok(())
}

#[tokio::test]
async fn already_fixed_target_is_a_pre_patch_failure() -> Result<()> {
    let (_dir, mut artifact) = fixtures::wallet_artifact()?;
    let table = DispatcherResolver.resolve(&artifact, WALLET_SOURCE)?;
    let plan = compile(&PatchSpecification::from_yaml(DELETE_PATCH)?, &table)?;
    artifact.runtime_code = JumpOutRewriter::default().rewrite(&artifact.runtime_code, &plan)?;
    artifact.init_code = fixtures::wallet_init(&artifact.runtime_code)?;

    let (_node, ctx) = local_context().await?;
    match protocol(artifact, Some(REQUIRE_PATCH))?.run(&ctx).await {
        Err(Error::UnexpectedExploitOutcome {
            stage: ExploitStage::PrePatch,
            outcome,
        }) => {
            assert!(outcome.reverted);
            assert!(!outcome.succeeded);
        }
        other => panic!("expected a pre-patch failure, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn guarding_the_wrong_function_is_a_post_patch_failure() -> Result<()> {
    let (_dir, artifact) = fixtures::wallet_artifact()?;
    let (_node, ctx) = local_context().await?;

    let yaml = "add_require_patch:\n  owner:\n    - msg.sender == sload(owner)\n";
    match protocol(artifact, Some(yaml))?.run(&ctx).await {
        Err(Error::UnexpectedExploitOutcome {
            stage: ExploitStage::PostPatch,
            outcome,
        }) => {
            assert!(outcome.succeeded);
            assert!(outcome.balance_after.is_zero());
        }
        other => panic!("expected a post-patch failure, got {other:?}"),
    }
    Ok(())
}
