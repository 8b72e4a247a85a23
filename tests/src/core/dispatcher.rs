use crate::fixtures::{self, DEPOSIT, MIGRATE_TO, OWNER, WITHDRAW, WALLET_SOURCE};
use splint_core::decoder::decode;
use splint_core::detection::detect_function_dispatcher;
use splint_core::{DispatcherResolver, FunctionTableResolver, Opcode, function_selector};

#[test]
fn dispatcher_routes_every_wallet_selector() {
    fixtures::init_tracing();
    let runtime = fixtures::wallet_runtime().unwrap();
    let instructions = decode(&runtime);

    let dispatcher = detect_function_dispatcher(&instructions).expect("dispatcher");
    assert_eq!(dispatcher.entries.len(), 4);
    let selectors: Vec<u32> = dispatcher.entries.iter().map(|entry| entry.selector).collect();
    assert_eq!(
        selectors,
        [DEPOSIT, WITHDRAW, MIGRATE_TO, OWNER].map(function_selector)
    );
}

#[test]
fn resolved_offsets_are_jump_destinations() {
    fixtures::init_tracing();
    let (_dir, artifact) = fixtures::wallet_artifact().unwrap();
    let table = DispatcherResolver.resolve(&artifact, WALLET_SOURCE).unwrap();

    let names: Vec<&str> = table.names().collect();
    assert_eq!(names, vec!["deposit", "migrateTo", "owner", "withdraw"]);

    let instructions = decode(&artifact.runtime_code);
    for (name, offset) in table.iter() {
        let ins = instructions
            .iter()
            .find(|ins| ins.pc == offset)
            .unwrap_or_else(|| panic!("{name} at 0x{offset:x} is not an instruction"));
        assert_eq!(ins.op, Opcode::JUMPDEST, "{name}");
    }
}
