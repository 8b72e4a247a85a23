//! Recovers the selector → entry-point table from a Solidity dispatcher.
//!
//! Solidity opens runtime code with a linear chain of comparisons:
//!
//! ```text
//! PUSH1 0x00 CALLDATALOAD PUSH1 0xe0 SHR
//! DUP1 PUSH4 <selector> EQ PUSH2 <entry> JUMPI
//! DUP1 PUSH4 <selector> EQ PUSH2 <entry> JUMPI
//! ...
//! ```
//!
//! The detector finds the selector extraction and then tracks the abstract stack just far
//! enough to pair each `PUSH4 .. EQ` with the constant consumed as the `JUMPI` destination.

use crate::Opcode;
use crate::decoder::Instruction;

/// How far past the extraction the tracker looks for comparisons.
const SCAN_WINDOW: usize = 600;
/// Only the head of the code is searched for the extraction sequence.
const EXTRACTION_WINDOW: usize = 200;

/// Detected dispatcher and the entries it routes to.
#[derive(Debug, Clone)]
pub struct DispatcherInfo {
    /// Instruction index where selector extraction begins.
    pub extraction_index: usize,
    /// Calldata extraction shape that was recognised.
    pub pattern: ExtractionPattern,
    /// Selectors in comparison order.
    pub entries: Vec<DispatchEntry>,
}

impl DispatcherInfo {
    /// Entry offset for `selector`, if the dispatcher routes it.
    pub fn entry_for(&self, selector: u32) -> Option<usize> {
        self.entries
            .iter()
            .find(|entry| entry.selector == selector)
            .map(|entry| entry.entry_offset)
    }
}

/// A selector paired with the byte offset the dispatcher jumps to for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchEntry {
    pub selector: u32,
    pub entry_offset: usize,
    /// Index of the `PUSH4` carrying the selector.
    pub instruction_index: usize,
}

/// Calldata extraction sequences emitted by solc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionPattern {
    /// `PUSH1 0x00 CALLDATALOAD PUSH1 0xe0 SHR` (or `PUSH0` first).
    Standard,
    /// `CALLDATALOAD PUSH1 0xe0 SHR` with the offset already on the stack.
    Short,
}

#[derive(Clone, Copy, Debug)]
enum Slot {
    Const(u64),
    Unknown,
}

/// Detects the dispatcher in `instructions` (runtime code, decoded from offset 0).
pub fn detect_function_dispatcher(instructions: &[Instruction]) -> Option<DispatcherInfo> {
    let (extraction_index, length, pattern) = find_extraction(instructions)?;
    let start = extraction_index + length;
    let end = (start + SCAN_WINDOW).min(instructions.len());

    let mut entries = Vec::new();
    let mut stack: Vec<Slot> = Vec::with_capacity(16);
    let mut pending: Option<(u32, usize)> = None;

    for index in start..end {
        let ins = &instructions[index];
        match ins.op {
            Opcode::PUSH(_) | Opcode::PUSH0 => {
                stack.push(ins.push_value().map_or(Slot::Unknown, Slot::Const));
            }
            Opcode::DUP(n) => {
                let depth = n as usize;
                let slot = stack
                    .len()
                    .checked_sub(depth)
                    .map_or(Slot::Unknown, |i| stack[i]);
                stack.push(slot);
            }
            Opcode::EQ => {
                if let Some(previous) = index.checked_sub(1).map(|i| &instructions[i])
                    && previous.op == Opcode::PUSH(4)
                    && let Some(selector) = previous.push_value()
                {
                    pending = Some((selector as u32, index - 1));
                    tracing::debug!(
                        "Selector candidate 0x{:08x} at instruction {}",
                        selector,
                        index - 1
                    );
                }
                binary(&mut stack);
            }
            Opcode::JUMPI => {
                let destination = stack.pop();
                stack.pop();
                if let (Some(Slot::Const(target)), Some((selector, at))) = (destination, pending.take())
                {
                    tracing::debug!("Paired selector 0x{:08x} -> 0x{:x}", selector, target);
                    entries.push(DispatchEntry {
                        selector,
                        entry_offset: target as usize,
                        instruction_index: at,
                    });
                }
            }
            Opcode::JUMP | Opcode::POP => {
                stack.pop();
            }
            Opcode::ADD
            | Opcode::SUB
            | Opcode::MUL
            | Opcode::DIV
            | Opcode::MOD
            | Opcode::LT
            | Opcode::GT
            | Opcode::SLT
            | Opcode::SGT
            | Opcode::AND
            | Opcode::OR => binary(&mut stack),
            Opcode::ISZERO | Opcode::NOT => {
                if stack.pop().is_some() {
                    stack.push(Slot::Unknown);
                }
            }
            // The fallback revert closes the comparison chain.
            Opcode::REVERT | Opcode::STOP | Opcode::RETURN if !entries.is_empty() => break,
            _ => {}
        }
    }

    if entries.is_empty() {
        tracing::debug!("No selector/entry pairs found after extraction");
        return None;
    }

    tracing::debug!("Dispatcher routes {} selectors", entries.len());
    Some(DispatcherInfo {
        extraction_index,
        pattern,
        entries,
    })
}

fn binary(stack: &mut Vec<Slot>) {
    if stack.len() >= 2 {
        stack.truncate(stack.len() - 2);
        stack.push(Slot::Unknown);
    }
}

fn find_extraction(instructions: &[Instruction]) -> Option<(usize, usize, ExtractionPattern)> {
    let limit = instructions.len().min(EXTRACTION_WINDOW);
    let is_shift = |ins: &Instruction| ins.op == Opcode::PUSH(1) && ins.imm.as_deref() == Some("e0");

    for i in 0..limit {
        let window = &instructions[i..];
        if window.len() >= 4
            && window[0].push_value() == Some(0)
            && window[1].op == Opcode::CALLDATALOAD
            && is_shift(&window[2])
            && window[3].op == Opcode::SHR
        {
            tracing::debug!("Standard selector extraction at instruction {}", i);
            return Some((i, 4, ExtractionPattern::Standard));
        }
        if window.len() >= 3
            && window[0].op == Opcode::CALLDATALOAD
            && is_shift(&window[1])
            && window[2].op == Opcode::SHR
        {
            tracing::debug!("Short selector extraction at instruction {}", i);
            return Some((i, 3, ExtractionPattern::Short));
        }
    }
    None
}
