use crate::fixtures::{self, DELETE_PATCH, REQUIRE_PATCH, WALLET_SOURCE};
use splint_core::decoder::{decode, jump_destinations};
use splint_core::{DispatcherResolver, FunctionTable, FunctionTableResolver};
use splint_patch::{
    BytecodeRewriter, Error, JumpOutRewriter, PatchKind, PatchSpecification, RewriterConfig,
    compile,
};

fn wallet_table() -> (Vec<u8>, FunctionTable) {
    let (_dir, artifact) = fixtures::wallet_artifact().unwrap();
    let table = DispatcherResolver.resolve(&artifact, WALLET_SOURCE).unwrap();
    (artifact.runtime_code, table)
}

#[test]
fn empty_specification_leaves_runtime_identical() {
    let (runtime, table) = wallet_table();
    let plan = compile(&PatchSpecification::from_yaml("").unwrap(), &table).unwrap();
    assert!(plan.is_empty());

    let rewritten = JumpOutRewriter::default().rewrite(&runtime, &plan).unwrap();
    assert_eq!(rewritten, runtime);
}

#[test]
fn require_patch_keeps_original_jump_targets() {
    fixtures::init_tracing();
    let (runtime, table) = wallet_table();
    let spec = PatchSpecification::from_yaml(REQUIRE_PATCH).unwrap();
    let plan = compile(&spec, &table).unwrap();

    assert_eq!(plan.len(), 1);
    let insertion = &plan.insertions()[0];
    assert_eq!(insertion.offset, table.offset("migrateTo").unwrap());
    assert!(matches!(
        &insertion.kind,
        PatchKind::Require { translated, .. } if translated == "caller() == sload(0)"
    ));

    let padding = RewriterConfig::default().padding;
    let patched = JumpOutRewriter::default().rewrite(&runtime, &plan).unwrap();
    assert!(patched.len() > runtime.len() + padding);
    assert_eq!(patched[..insertion.offset], runtime[..insertion.offset]);
    assert!(patched[runtime.len()..runtime.len() + padding].iter().all(|b| *b == 0));

    // every function entry is still a JUMPDEST, and the trampoline adds its own
    let destinations = jump_destinations(&decode(&patched));
    for (name, offset) in table.iter() {
        assert!(destinations.contains(&offset), "{name} lost its JUMPDEST");
    }
    assert!(destinations.contains(&(runtime.len() + padding)));
}

#[test]
fn delete_patch_reverts_at_entry() {
    let (runtime, table) = wallet_table();
    let spec = PatchSpecification::from_yaml(DELETE_PATCH).unwrap();
    let plan = compile(&spec, &table).unwrap();

    assert_eq!(plan.len(), 1);
    assert_eq!(plan.insertions()[0].kind, PatchKind::Delete);

    let offset = plan.insertions()[0].offset;
    let patched = JumpOutRewriter::default().rewrite(&runtime, &plan).unwrap();
    assert_eq!(patched[..offset], runtime[..offset]);
    assert_ne!(patched[offset..runtime.len()], runtime[offset..]);
}

#[test]
fn unknown_function_produces_no_plan() {
    let (_, table) = wallet_table();
    let spec = PatchSpecification::from_yaml("delete_function_patch: [drain]\n").unwrap();

    match compile(&spec, &table) {
        Err(Error::Core(splint_core::Error::FunctionNotFound { function, known })) => {
            assert_eq!(function, "drain");
            assert_eq!(known, vec!["deposit", "migrateTo", "owner", "withdraw"]);
        }
        other => panic!("expected FunctionNotFound, got {other:?}"),
    }
}
