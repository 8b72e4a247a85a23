//! The deploy, exploit, patch, re-validate sequence.

use crate::harness::{HarnessConfig, SmokeOutcome, ValidationHarness, ValidationOutcome};
use crate::result::{Error, ExploitStage, Result};
use splint_core::{ContractArtifact, DispatcherResolver, FunctionTable, FunctionTableResolver};
use splint_deploy::proxy::proxy_abi;
use splint_deploy::{DeployedSystem, ExecutionContext, Orchestrator};
use splint_patch::{BytecodeRewriter, JumpOutRewriter, PatchPlan, PatchSpecification, compile};

/// Everything computed from the artifact and specification before the chain is touched.
#[derive(Debug, Clone)]
pub struct PreparedPatch {
    pub table: FunctionTable,
    pub plan: PatchPlan,
    /// Patched runtime code, ready to deploy as the next logic contract.
    pub runtime: Vec<u8>,
}

/// How a run ended when nothing went wrong.
#[derive(Debug, Clone)]
pub enum Verdict {
    /// No patch specification: the target was deployed behind a proxy and smoke-tested.
    DeployedOnly {
        system: DeployedSystem,
        smoke: SmokeOutcome,
    },
    /// The exploit drained the original and failed against the patched logic.
    PatchValidated {
        system: DeployedSystem,
        smoke: SmokeOutcome,
        pre: ValidationOutcome,
        post: ValidationOutcome,
    },
}

impl Verdict {
    pub fn system(&self) -> &DeployedSystem {
        match self {
            Verdict::DeployedOnly { system, .. } | Verdict::PatchValidated { system, .. } => {
                system
            }
        }
    }

    pub fn smoke(&self) -> &SmokeOutcome {
        match self {
            Verdict::DeployedOnly { smoke, .. } | Verdict::PatchValidated { smoke, .. } => smoke,
        }
    }
}

/// One target contract, optionally with a patch to validate.
pub struct Protocol {
    artifact: ContractArtifact,
    source: String,
    spec: Option<PatchSpecification>,
    resolver: Box<dyn FunctionTableResolver>,
    rewriter: Box<dyn BytecodeRewriter>,
    harness: ValidationHarness,
}

impl Protocol {
    /// Uses the dispatcher resolver and the default jump-out rewriter.
    ///
    /// The harness is checked against the ABI the proxy exposes, so a target the harness
    /// cannot drive is rejected here. The exploit entry point is only required when there
    /// is a specification to validate.
    pub fn new(
        artifact: ContractArtifact,
        source: String,
        spec: Option<PatchSpecification>,
        harness: HarnessConfig,
    ) -> Result<Self> {
        let abi = proxy_abi(&artifact.abi)?;
        let harness = if spec.is_some() {
            ValidationHarness::new(&abi, harness)?
        } else {
            ValidationHarness::smoke_only(&abi, harness)?
        };
        Ok(Self {
            artifact,
            source,
            spec,
            resolver: Box::new(DispatcherResolver),
            rewriter: Box::new(JumpOutRewriter::default()),
            harness,
        })
    }

    pub fn with_resolver(mut self, resolver: Box<dyn FunctionTableResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_rewriter(mut self, rewriter: Box<dyn BytecodeRewriter>) -> Self {
        self.rewriter = rewriter;
        self
    }

    pub fn artifact(&self) -> &ContractArtifact {
        &self.artifact
    }

    pub fn harness(&self) -> &ValidationHarness {
        &self.harness
    }

    /// Resolves the function table, compiles the plan and rewrites the runtime.
    ///
    /// `None` when there is no specification to apply.
    pub fn prepare(&self) -> Result<Option<PreparedPatch>> {
        let Some(spec) = &self.spec else {
            return Ok(None);
        };
        let table = self.resolver.resolve(&self.artifact, &self.source)?;
        tracing::debug!(
            "{} resolver found {} function(s) in {}",
            self.resolver.name(),
            table.len(),
            self.artifact.name
        );
        let plan = compile(spec, &table)?;
        let runtime = self.rewriter.rewrite(&self.artifact.runtime_code, &plan)?;
        tracing::info!(
            "{} rewrote runtime: {} -> {} bytes",
            self.rewriter.name(),
            self.artifact.runtime_code.len(),
            runtime.len()
        );
        Ok(Some(PreparedPatch {
            table,
            plan,
            runtime,
        }))
    }

    /// Runs the whole protocol against `ctx`.
    ///
    /// The patch is prepared before the first transaction, so a specification naming an
    /// unknown function fails without deploying anything.
    pub async fn run(&self, ctx: &ExecutionContext) -> Result<Verdict> {
        let prepared = self.prepare()?;
        self.run_prepared(ctx, prepared).await
    }

    /// Runs the protocol with a patch from an earlier [`prepare`](Self::prepare).
    pub async fn run_prepared(
        &self,
        ctx: &ExecutionContext,
        prepared: Option<PreparedPatch>,
    ) -> Result<Verdict> {
        let mut orchestrator = Orchestrator::new(ctx.clone());
        orchestrator.deploy(&self.artifact).await?;
        let system = orchestrator.bind().await?;
        let smoke = self.harness.run_baseline_smoke_test(ctx, &system).await?;

        let Some(prepared) = prepared else {
            tracing::info!("No patch specification, stopping after the smoke test");
            return Ok(Verdict::DeployedOnly { system, smoke });
        };

        let pre = self.harness.run_exploit(ctx, &system).await?;
        if !pre.succeeded {
            tracing::error!("Exploit failed against unpatched logic: {}", pre);
            return Err(Error::UnexpectedExploitOutcome {
                stage: ExploitStage::PrePatch,
                outcome: pre,
            });
        }
        tracing::info!("Exploit drains the unpatched contract");

        let system = orchestrator.upgrade(&prepared.runtime).await?;
        let post = self.harness.run_exploit(ctx, &system).await?;
        if post.succeeded {
            tracing::error!("Exploit still drains patched logic: {}", post);
            return Err(Error::UnexpectedExploitOutcome {
                stage: ExploitStage::PostPatch,
                outcome: post,
            });
        }
        tracing::info!("Patch validated: exploit no longer drains {}", system.proxy);

        Ok(Verdict::PatchValidated {
            system,
            smoke,
            pre,
            post,
        })
    }
}
