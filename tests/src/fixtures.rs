//! A hand-assembled `Wallet` laid out the way solc 0.6 lays it out, plus the compiler
//! outputs splint reads for it.
//!
//! Building the bytecode here keeps the suite independent of a local `solc`; the shapes
//! that matter (selector extraction, comparison chain, non-payable checks, the constructor's
//! `CODECOPY` of the runtime, a metadata trailer) match real compiler output.

use color_eyre::Result;
use hex_literal::hex;
use serde_json::json;
use splint_core::asm::Assembler;
use splint_core::{ContractArtifact, Opcode, function_selector};
use std::collections::BTreeMap;
use std::fs;
use tempfile::TempDir;

pub const WALLET_SOURCE: &str = include_str!("../contracts/Wallet.sol");
pub const WALLET_ABI: &str = include_str!("../contracts/Wallet.abi");
pub const REQUIRE_PATCH: &str = include_str!("../contracts/patch.yaml");
pub const DELETE_PATCH: &str = include_str!("../contracts/delete.yaml");

pub const DEPOSIT: &str = "deposit()";
pub const WITHDRAW: &str = "withdraw(uint256)";
pub const MIGRATE_TO: &str = "migrateTo(address)";
pub const OWNER: &str = "owner()";

/// CBOR metadata trailer. The 0x7f inside the hash spells a PUSH32 that runs off the end.
const METADATA: [u8; 54] = hex!(
    "fe a2 64 6970667358 22 1220"
    "11111111111111111111111111111111111111111111111111111111 7f 010203"
    "64 736f6c6343 000604 0033"
);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

/// Runtime code of the wallet.
pub fn wallet_runtime() -> Result<Vec<u8>> {
    let mut asm = Assembler::new();
    let fallback = asm.new_label();
    let deposit = asm.new_label();
    let withdraw = asm.new_label();
    let migrate = asm.new_label();
    let owner = asm.new_label();

    asm.push_u64(0x80).push_u64(0x40).op(Opcode::MSTORE);
    asm.push_u64(4)
        .op(Opcode::CALLDATASIZE)
        .op(Opcode::LT)
        .push_label(fallback)
        .op(Opcode::JUMPI);
    asm.push_u64(0)
        .op(Opcode::CALLDATALOAD)
        .push_u64(0xe0)
        .op(Opcode::SHR);
    for (signature, target) in [
        (DEPOSIT, deposit),
        (WITHDRAW, withdraw),
        (MIGRATE_TO, migrate),
        (OWNER, owner),
    ] {
        asm.op(Opcode::DUP(1))
            .push_fixed(function_selector(signature).into(), 4)?
            .op(Opcode::EQ)
            .push_label(target)
            .op(Opcode::JUMPI);
    }
    asm.bind(fallback).push_u64(0).op(Opcode::DUP(1)).op(Opcode::REVERT);

    // deposit() payable: internal call into an empty body
    let deposit_return = asm.new_label();
    let deposit_body = asm.new_label();
    asm.bind(deposit)
        .push_label(deposit_return)
        .push_label(deposit_body)
        .op(Opcode::JUMP);
    asm.bind(deposit_return).op(Opcode::STOP);
    asm.bind(deposit_body).op(Opcode::JUMP);

    // withdraw(uint256): owner only, sends the amount to the caller
    asm.bind(withdraw);
    non_payable(&mut asm);
    let authorised = asm.new_label();
    asm.push_u64(0)
        .op(Opcode::SLOAD)
        .op(Opcode::CALLER)
        .op(Opcode::EQ)
        .push_label(authorised)
        .op(Opcode::JUMPI);
    revert(&mut asm);
    asm.bind(authorised);
    asm.push_u64(0)
        .ops(&[Opcode::DUP(1), Opcode::DUP(1), Opcode::DUP(1)])
        .push_u64(4)
        .op(Opcode::CALLDATALOAD)
        .op(Opcode::CALLER);
    call_or_revert(&mut asm);

    // migrateTo(address): no owner check
    asm.bind(migrate);
    non_payable(&mut asm);
    asm.push_u64(0)
        .ops(&[Opcode::DUP(1), Opcode::DUP(1), Opcode::DUP(1)])
        .op(Opcode::SELFBALANCE)
        .push_u64(4)
        .op(Opcode::CALLDATALOAD);
    call_or_revert(&mut asm);

    // owner() view
    asm.bind(owner)
        .push_u64(0)
        .op(Opcode::SLOAD)
        .push_u64(0)
        .op(Opcode::MSTORE)
        .push_u64(0x20)
        .push_u64(0)
        .op(Opcode::RETURN);

    let mut code = asm.finish().assemble(0)?;
    code.extend_from_slice(&METADATA);
    Ok(code)
}

fn non_payable(asm: &mut Assembler) {
    let ok = asm.new_label();
    asm.op(Opcode::CALLVALUE)
        .op(Opcode::DUP(1))
        .op(Opcode::ISZERO)
        .push_label(ok)
        .op(Opcode::JUMPI);
    revert(asm);
    asm.bind(ok).op(Opcode::POP);
}

fn revert(asm: &mut Assembler) {
    asm.push_u64(0).op(Opcode::DUP(1)).op(Opcode::REVERT);
}

/// `GAS CALL`, reverting when the call fails. Expects value and recipient on the stack.
fn call_or_revert(asm: &mut Assembler) {
    let failed = asm.new_label();
    asm.op(Opcode::GAS)
        .op(Opcode::CALL)
        .op(Opcode::ISZERO)
        .push_label(failed)
        .op(Opcode::JUMPI)
        .op(Opcode::STOP);
    asm.bind(failed);
    revert(asm);
}

/// Constructor storing the deployer as owner, followed by `runtime`.
pub fn wallet_init(runtime: &[u8]) -> Result<Vec<u8>> {
    let prefix = |offset: u64| -> Result<Vec<u8>> {
        let mut asm = Assembler::new();
        asm.push_u64(0x80).push_u64(0x40).op(Opcode::MSTORE);
        non_payable(&mut asm);
        asm.op(Opcode::CALLER).push_u64(0).op(Opcode::SSTORE);
        asm.push_fixed(runtime.len() as u64, 2)?
            .op(Opcode::DUP(1))
            .push_fixed(offset, 2)?
            .push_u64(0)
            .op(Opcode::CODECOPY)
            .push_u64(0)
            .op(Opcode::RETURN)
            .op(Opcode::INVALID);
        Ok(asm.finish().assemble(0)?)
    };

    let length = prefix(0)?.len();
    let mut code = prefix(length as u64)?;
    code.extend_from_slice(runtime);
    Ok(code)
}

/// Selector hashes as solc reports them in `combined.json`.
pub fn wallet_hashes() -> BTreeMap<String, String> {
    [DEPOSIT, WITHDRAW, MIGRATE_TO, OWNER]
        .into_iter()
        .map(|signature| {
            (
                signature.to_string(),
                format!("{:08x}", function_selector(signature)),
            )
        })
        .collect()
}

/// Writes the four compiler outputs for `Wallet` (and its source) into a fresh directory.
pub fn write_wallet_artifacts() -> Result<TempDir> {
    let dir = tempfile::tempdir()?;
    let runtime = wallet_runtime()?;
    let init = wallet_init(&runtime)?;

    fs::write(dir.path().join("Wallet.bin"), hex::encode(&init))?;
    fs::write(dir.path().join("Wallet.bin-runtime"), hex::encode(&runtime))?;
    fs::write(dir.path().join("Wallet.abi"), WALLET_ABI)?;
    let combined = json!({
        "contracts": {
            "contracts/Wallet.sol:Wallet": {
                "abi": serde_json::from_str::<serde_json::Value>(WALLET_ABI)?,
                "hashes": wallet_hashes(),
                "srcmap-runtime": "73:500:0:-:0;;;;;;;;",
            }
        },
        "version": "0.6.4+commit.1dca32f3.Linux.g++"
    });
    fs::write(
        dir.path().join("combined.json"),
        serde_json::to_string_pretty(&combined)?,
    )?;
    fs::write(dir.path().join("Wallet.sol"), WALLET_SOURCE)?;
    Ok(dir)
}

/// Loads the wallet through the same path the CLI uses. Keep the directory alive while the
/// artifact is in use only if you need the files; the artifact itself is self-contained.
pub fn wallet_artifact() -> Result<(TempDir, ContractArtifact)> {
    let dir = write_wallet_artifacts()?;
    let artifact = ContractArtifact::load(dir.path(), "Wallet")?;
    Ok((dir, artifact))
}
