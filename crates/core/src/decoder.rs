//! Linear-sweep disassembly of EVM bytecode into an instruction stream.
//!
//! The sweep walks the code byte by byte, skipping PUSH immediates, which is exactly how
//! the EVM itself decides which bytes are opcodes when it validates jump destinations.
//! Trailing data (constructor arguments, CBOR metadata) is decoded as whatever opcodes it
//! happens to spell; a PUSH that runs past the end keeps its truncated immediate.

use crate::{Opcode, immediate_width};
use std::fmt;

/// Single disassembled EVM instruction with PC, opcode, and optional immediate data.
#[derive(Clone, Debug, PartialEq)]
pub struct Instruction {
    /// Program counter (byte offset)
    pub pc: usize,
    /// Parsed opcode
    pub op: Opcode,
    /// Immediate data (hex string without 0x prefix)
    pub imm: Option<String>,
}

/// Decodes `bytes` into instructions, one per opcode position.
pub fn decode(bytes: &[u8]) -> Vec<Instruction> {
    let mut instructions = Vec::with_capacity(bytes.len() / 2);
    let mut pc = 0;

    while pc < bytes.len() {
        let (op, _) = Opcode::parse(bytes[pc]);
        let width = immediate_width(op);
        let imm = (width > 0).then(|| {
            let end = (pc + 1 + width).min(bytes.len());
            hex::encode(&bytes[pc + 1..end])
        });

        instructions.push(Instruction { pc, op, imm });
        pc += 1 + width;
    }

    tracing::debug!(
        "Decoded {} bytes into {} instructions",
        bytes.len(),
        instructions.len()
    );
    instructions
}

/// Byte offsets that are valid `JUMP` targets.
pub fn jump_destinations(instructions: &[Instruction]) -> Vec<usize> {
    instructions
        .iter()
        .filter(|ins| ins.op == Opcode::JUMPDEST)
        .map(|ins| ins.pc)
        .collect()
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // pc: six-digit hex, opcode left-padded to 8 chars, then optional imm
        if let Some(immediate) = &self.imm {
            write!(f, "{:06x}  {:<8} {}", self.pc, self.op, immediate)
        } else {
            write!(f, "{:06x}  {}", self.pc, self.op)
        }
    }
}

impl Instruction {
    /// Returns the byte size of this instruction (1 for most opcodes, 1+N for PUSH(N)).
    #[inline]
    pub fn byte_size(&self) -> usize {
        1 + immediate_width(self.op)
    }

    /// True when a PUSH ran off the end of the code and carries fewer bytes than it declares.
    pub fn is_truncated(&self) -> bool {
        match (&self.imm, immediate_width(self.op)) {
            (Some(imm), width) => imm.len() / 2 != width,
            (None, width) => width != 0,
        }
    }

    /// Numeric value of a PUSH immediate, when it fits in a `u64`.
    pub fn push_value(&self) -> Option<u64> {
        match self.op {
            Opcode::PUSH0 => Some(0),
            Opcode::PUSH(_) => self
                .imm
                .as_deref()
                .and_then(|imm| u64::from_str_radix(imm, 16).ok()),
            _ => None,
        }
    }
}
