//! Bytecode primitives shared by every splint crate.
//!
//! This crate knows how to read EVM bytecode (a linear-sweep [`decoder`]), write it back
//! ([`encoder`]), assemble small relocatable fragments with labels ([`asm`]), load the
//! outputs of a Solidity compilation ([`artifact`]) and map function names to the byte
//! offsets of their entry points ([`function_table`]).

pub mod artifact;
pub mod asm;
pub mod decoder;
pub mod detection;
pub mod encoder;
pub mod function_table;
pub mod hex_bytes;
pub mod result;

pub use artifact::ContractArtifact;
pub use eot::UnifiedOpcode as Opcode;
pub use function_table::{DispatcherResolver, FunctionTable, FunctionTableResolver};
pub use hex_bytes::HexBytes;
pub use result::{Error, Result};

use sha3::{Digest, Keccak256};

/// Returns true if the opcode terminates execution.
///
/// Terminal opcodes are those that end the execution of a program or transaction,
/// such as STOP, RETURN, REVERT, SELFDESTRUCT, and INVALID.
#[inline]
pub fn is_terminal_opcode(opcode: Opcode) -> bool {
    matches!(
        opcode,
        Opcode::STOP | Opcode::RETURN | Opcode::REVERT | Opcode::SELFDESTRUCT | Opcode::INVALID
    )
}

/// Returns true if control never falls through to the next instruction.
#[inline]
pub fn is_unconditional_exit(opcode: Opcode) -> bool {
    is_terminal_opcode(opcode) || opcode == Opcode::JUMP
}

/// Number of immediate bytes that follow `opcode` in the code stream.
#[inline]
pub fn immediate_width(opcode: Opcode) -> usize {
    match opcode {
        Opcode::PUSH(n) => n as usize,
        _ => 0,
    }
}

/// Keccak-256 digest of `data`.
pub fn keccak256(data: impl AsRef<[u8]>) -> [u8; 32] {
    Keccak256::digest(data.as_ref()).into()
}

/// Four-byte function selector for a canonical signature such as `withdraw(uint256)`.
pub fn function_selector(signature: &str) -> u32 {
    let hash = keccak256(signature.as_bytes());
    u32::from_be_bytes([hash[0], hash[1], hash[2], hash[3]])
}

/// Strips an optional `0x` prefix plus surrounding whitespace and lowercases the rest.
pub fn normalize_hex_string(input: &str) -> Result<String> {
    let trimmed = input.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let normalized: String = digits
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_lowercase())
        .collect();

    if normalized.len() % 2 != 0 {
        return Err(Error::OddHexLength(normalized.len()));
    }
    Ok(normalized)
}

/// Decodes a hex string (with or without `0x`) into bytes.
pub fn decode_hex(input: &str) -> Result<Vec<u8>> {
    let normalized = normalize_hex_string(input)?;
    Ok(hex::decode(normalized)?)
}
