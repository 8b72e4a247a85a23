//! Encoding of instruction streams back into bytecode.

use crate::Opcode;
use crate::decoder::Instruction;
use crate::result::Error;

/// Encodes a sequence of EVM instructions into bytecode.
///
/// Every PUSH must carry an immediate of exactly its declared width; truncated pushes from
/// the tail of a code blob cannot be re-encoded faithfully and are rejected.
///
/// # Examples
/// ```rust,ignore
/// use splint_core::Opcode;
/// let ins = Instruction {
///     pc: 0,
///     op: Opcode::PUSH(1),
///     imm: Some("aa".to_string()),
/// };
/// let bytes = encode(&[ins]).unwrap();
/// assert_eq!(bytes, vec![0x60, 0xaa]);
/// ```
pub fn encode(instructions: &[Instruction]) -> Result<Vec<u8>, Error> {
    let mut bytes = Vec::with_capacity(instructions.len() * 3);

    for ins in instructions {
        let opcode = ins.op;
        bytes.push(opcode.to_byte());

        if let Opcode::PUSH(n) = opcode {
            let Some(immediate) = &ins.imm else {
                tracing::error!("Missing immediate for {} at pc={}", opcode, ins.pc);
                return Err(Error::InvalidImmediate(format!(
                    "PUSH{} missing immediate at pc={}",
                    n, ins.pc
                )));
            };
            let imm_bytes = hex::decode(immediate)?;
            if imm_bytes.len() != n as usize {
                return Err(Error::InvalidImmediate(format!(
                    "PUSH{} requires {}-byte immediate, got {} bytes at pc={}",
                    n,
                    n,
                    imm_bytes.len(),
                    ins.pc
                )));
            }
            bytes.extend_from_slice(&imm_bytes);
        }
    }

    tracing::debug!(
        "Encoded {} instructions into {} bytes",
        instructions.len(),
        bytes.len()
    );
    Ok(bytes)
}
