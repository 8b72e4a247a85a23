//! Code builders for the logic/proxy pair.
//!
//! The proxy stores its implementation address in the EIP-1967 implementation slot and
//! forwards every call to it with `DELEGATECALL`, so the logic contract runs against the
//! proxy's storage and balance. One administrative entry point, `__upgrade(address)`,
//! rewrites the slot; only the admin address baked into the proxy may call it.

use crate::{Error, Result};
use alloy::json_abi::JsonAbi;
use alloy::primitives::{Address, Bytes};
use splint_core::asm::Assembler;
use splint_core::decoder::decode;
use splint_core::{Opcode, function_selector};

/// `bytes32(uint256(keccak256("eip1967.proxy.implementation")) - 1)`
pub const IMPLEMENTATION_SLOT: [u8; 32] = [
    0x36, 0x08, 0x94, 0xa1, 0x3b, 0xa1, 0xa3, 0x21, 0x06, 0x67, 0xc8, 0x28, 0x49, 0x2d, 0xb9,
    0x8d, 0xca, 0x3e, 0x20, 0x76, 0xcc, 0x37, 0x35, 0xa9, 0x20, 0xa3, 0xca, 0x50, 0x5d, 0x38,
    0x2b, 0xbc,
];

pub const UPGRADE_SIGNATURE: &str = "__upgrade(address)";

/// Administrative ABI every proxy adds on top of the target's ABI.
pub const PROXY_ABI: &str = r#"[
  {
    "type": "function",
    "name": "__upgrade",
    "inputs": [{ "name": "implementation", "type": "address", "internalType": "address" }],
    "outputs": [],
    "stateMutability": "nonpayable"
  }
]"#;

/// Instructions scanned before a `CODECOPY` for the push of the runtime length.
const LENGTH_PUSH_WINDOW: usize = 6;

/// Wraps `runtime` in init code that returns it verbatim.
pub fn make_deployable(runtime: &[u8]) -> Result<Vec<u8>> {
    let mut asm = Assembler::new();
    asm.push_fixed(runtime.len() as u64, 2)?;
    asm.op(Opcode::DUP(1));
    // prelude size, fixed because every push above and below has a fixed width
    asm.push_fixed(13, 2)?;
    asm.push_u64(0)
        .op(Opcode::CODECOPY)
        .push_u64(0)
        .op(Opcode::RETURN);

    let mut code = asm.finish().assemble(0)?;
    debug_assert_eq!(code.len(), 13);
    code.extend_from_slice(runtime);
    Ok(code)
}

/// Runtime code of the proxy administered by `admin`.
pub fn proxy_runtime(admin: Address) -> Result<Vec<u8>> {
    let mut asm = Assembler::new();
    let upgrade = asm.new_label();
    let authorised = asm.new_label();
    let success = asm.new_label();

    // dispatch __upgrade(address)
    asm.push_u64(0)
        .op(Opcode::CALLDATALOAD)
        .push_u64(0xe0)
        .op(Opcode::SHR)
        .push_fixed(function_selector(UPGRADE_SIGNATURE).into(), 4)?
        .op(Opcode::EQ)
        .push_label(upgrade)
        .op(Opcode::JUMPI);

    // forward everything else
    asm.op(Opcode::CALLDATASIZE)
        .push_u64(0)
        .op(Opcode::DUP(1))
        .op(Opcode::CALLDATACOPY)
        .push_u64(0)
        .op(Opcode::DUP(1))
        .op(Opcode::CALLDATASIZE)
        .push_u64(0)
        .push(&IMPLEMENTATION_SLOT)?
        .ops(&[Opcode::SLOAD, Opcode::GAS, Opcode::DELEGATECALL])
        .op(Opcode::RETURNDATASIZE)
        .push_u64(0)
        .op(Opcode::DUP(1))
        .op(Opcode::RETURNDATACOPY)
        .push_label(success)
        .op(Opcode::JUMPI)
        .op(Opcode::RETURNDATASIZE)
        .push_u64(0)
        .op(Opcode::REVERT);
    asm.bind(success)
        .op(Opcode::RETURNDATASIZE)
        .push_u64(0)
        .op(Opcode::RETURN);

    // only the admin may move the implementation slot
    asm.bind(upgrade)
        .push(admin.as_slice())?
        .op(Opcode::CALLER)
        .op(Opcode::EQ)
        .push_label(authorised)
        .op(Opcode::JUMPI)
        .push_u64(0)
        .op(Opcode::DUP(1))
        .op(Opcode::REVERT);
    asm.bind(authorised)
        .push_u64(4)
        .op(Opcode::CALLDATALOAD)
        .push(&IMPLEMENTATION_SLOT)?
        .op(Opcode::SSTORE)
        .op(Opcode::STOP);

    let code = asm.finish().assemble(0)?;
    tracing::debug!("Proxy runtime: {} bytes, admin {}", code.len(), admin);
    Ok(code)
}

/// Init code for a proxy that runs the target's constructor but installs the proxy runtime.
///
/// `init_code` must be the target's constructor followed by `runtime`. Every runtime-length
/// push feeding a `CODECOPY` in the constructor is rewritten, at the same width, to the proxy
/// runtime length; the constructor's storage writes thereby land in the proxy.
pub fn proxy_deploy(init_code: &[u8], runtime: &[u8], admin: Address) -> Result<Vec<u8>> {
    if runtime.is_empty() || !init_code.ends_with(runtime) {
        return Err(Error::UnrecognisedInitCode(
            "init code does not end with the runtime code".into(),
        ));
    }
    let proxy = proxy_runtime(admin)?;
    let mut prefix = init_code[..init_code.len() - runtime.len()].to_vec();
    let instructions = decode(&prefix);

    let mut rewritten = 0;
    for (index, ins) in instructions.iter().enumerate() {
        if ins.op != Opcode::CODECOPY {
            continue;
        }
        let window = &instructions[index.saturating_sub(LENGTH_PUSH_WINDOW)..index];
        let Some(push) = window
            .iter()
            .find(|candidate| candidate.push_value() == Some(runtime.len() as u64))
        else {
            continue;
        };

        let width = splint_core::immediate_width(push.op);
        let bytes = (proxy.len() as u64).to_be_bytes();
        if width == 0 || width > 8 || bytes[..8 - width].iter().any(|b| *b != 0) {
            return Err(Error::UnrecognisedInitCode(format!(
                "length push at 0x{:04x} is too narrow for {} bytes",
                push.pc,
                proxy.len()
            )));
        }
        prefix[push.pc + 1..push.pc + 1 + width].copy_from_slice(&bytes[8 - width..]);
        tracing::debug!(
            "Rewrote runtime length at 0x{:04x}: {} -> {}",
            push.pc,
            runtime.len(),
            proxy.len()
        );
        rewritten += 1;
    }

    if rewritten == 0 {
        return Err(Error::UnrecognisedInitCode(
            "no CODECOPY of the runtime found in the constructor".into(),
        ));
    }

    prefix.extend_from_slice(&proxy);
    Ok(prefix)
}

/// Calldata for `__upgrade(implementation)`.
pub fn upgrade_calldata(implementation: Address) -> Bytes {
    let mut data = Vec::with_capacity(36);
    data.extend_from_slice(&function_selector(UPGRADE_SIGNATURE).to_be_bytes());
    data.extend_from_slice(&[0u8; 12]);
    data.extend_from_slice(implementation.as_slice());
    data.into()
}

/// ABI a client sees at the proxy address: the target's plus [`PROXY_ABI`].
pub fn proxy_abi(target: &JsonAbi) -> Result<JsonAbi> {
    let admin: JsonAbi = serde_json::from_str(PROXY_ABI)?;
    let mut abi = target.clone();
    for (name, functions) in admin.functions {
        abi.functions.entry(name).or_default().extend(functions);
    }
    Ok(abi)
}
