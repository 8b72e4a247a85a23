//! Jump-out patching of runtime bytecode.
//!
//! Original code never moves, so every existing jump target stays valid. At each patch
//! point a few instructions are overwritten with `PUSH2 <trampoline> JUMP`. The trampoline,
//! appended after the original code, runs the payloads, replays the displaced instructions
//! and jumps back:
//!
//! ```text
//! entry:  JUMPDEST                      ; kept when the function starts with one
//!         PUSH2 tramp JUMP INVALID.. JUMPDEST(resume)
//!         ...original code...  metadata  00 * padding
//! tramp:  JUMPDEST
//!         <payload 1> <payload 2> ...
//!         <displaced instructions>
//!         PUSH2 resume JUMP
//! ```
//!
//! When the displaced run ends in a `JUMP` or a terminating opcode there is nothing to
//! resume and the return jump is omitted.

use crate::plan::{Insertion, PatchPlan};
use crate::{BytecodeRewriter, Error, Result, RewriterConfig};
use splint_core::asm::Assembler;
use splint_core::decoder::{Instruction, decode};
use splint_core::encoder::encode;
use splint_core::{Opcode, is_unconditional_exit};
use std::collections::HashMap;

const PUSH2: u8 = 0x61;
const JUMP: u8 = 0x56;
const JUMPDEST: u8 = 0x5b;
const INVALID: u8 = 0xfe;

/// `PUSH2 hi lo JUMP`
const JUMP_OUT_LEN: usize = 4;

/// Rewriter that diverts each patch point through an appended trampoline.
#[derive(Debug, Clone, Default)]
pub struct JumpOutRewriter {
    config: RewriterConfig,
}

impl JumpOutRewriter {
    pub fn new(config: RewriterConfig) -> Self {
        Self { config }
    }
}

/// The bytes overwritten at one patch point.
#[derive(Debug)]
struct JumpSite {
    start: usize,
    end: usize,
    displaced: Vec<Instruction>,
    /// Address of the `JUMPDEST` written into the last displaced byte.
    resume: Option<usize>,
}

impl JumpSite {
    fn locate(
        instructions: &[Instruction],
        index_of: &HashMap<usize, usize>,
        insertion: &Insertion,
    ) -> Result<Self> {
        let offset = insertion.offset;
        let mut index = *index_of
            .get(&offset)
            .ok_or_else(|| Error::NotInstructionBoundary {
                function: insertion.function.clone(),
                offset,
            })?;

        if instructions[index].op == Opcode::JUMPDEST {
            index += 1;
        }
        let unsafe_point = |reason: String| Error::UnsafePatchPoint { offset, reason };

        let start = instructions
            .get(index)
            .map(|ins| ins.pc)
            .ok_or_else(|| unsafe_point("function body is empty".into()))?;

        let mut displaced = Vec::new();
        let mut covered = 0;
        let exits = loop {
            let Some(ins) = instructions.get(index) else {
                return Err(unsafe_point(format!(
                    "only {covered} byte(s) of code before the end of the runtime"
                )));
            };
            match ins.op {
                Opcode::JUMPDEST => {
                    return Err(unsafe_point(format!(
                        "jump destination at 0x{:x} inside the {} bytes needed for a jump-out",
                        ins.pc,
                        JUMP_OUT_LEN + 1
                    )));
                }
                Opcode::PC => {
                    return Err(unsafe_point(format!(
                        "PC at 0x{:x} would observe its relocated address",
                        ins.pc
                    )));
                }
                _ if ins.is_truncated() => {
                    return Err(unsafe_point(format!("truncated push at 0x{:x}", ins.pc)));
                }
                _ => {}
            }

            covered += ins.byte_size();
            displaced.push(ins.clone());
            index += 1;

            if is_unconditional_exit(ins.op) {
                break true;
            }
            if covered > JUMP_OUT_LEN {
                break false;
            }
        };

        if covered < JUMP_OUT_LEN {
            return Err(unsafe_point(format!(
                "{covered} byte(s) before the body exits, {JUMP_OUT_LEN} needed"
            )));
        }

        let end = start + covered;
        Ok(Self {
            start,
            end,
            displaced,
            resume: (!exits).then_some(end - 1),
        })
    }
}

impl BytecodeRewriter for JumpOutRewriter {
    fn name(&self) -> &'static str {
        "jump-out"
    }

    fn rewrite(&self, runtime: &[u8], plan: &PatchPlan) -> Result<Vec<u8>> {
        if plan.is_empty() {
            tracing::debug!("Empty plan, runtime left untouched");
            return Ok(runtime.to_vec());
        }

        let instructions = decode(runtime);
        let index_of: HashMap<usize, usize> = instructions
            .iter()
            .enumerate()
            .map(|(index, ins)| (ins.pc, index))
            .collect();

        let mut code = runtime.to_vec();
        code.resize(runtime.len() + self.config.padding, 0x00);

        let mut claimed: Vec<(usize, usize, usize)> = Vec::new();

        for (offset, insertions) in plan.patch_points() {
            let site = JumpSite::locate(&instructions, &index_of, insertions[0])?;
            if let Some(&(other, _, _)) = claimed
                .iter()
                .find(|(_, start, end)| site.start < *end && *start < site.end)
            {
                return Err(Error::OverlappingPatchPoints {
                    first: other,
                    second: offset,
                });
            }
            claimed.push((offset, site.start, site.end));

            let base = code.len();
            let mut asm = Assembler::new();
            let entry = asm.new_label();
            asm.bind(entry);
            for insertion in &insertions {
                asm.append(&insertion.payload);
            }
            asm.raw(&encode(&site.displaced)?);
            if let Some(resume) = site.resume {
                asm.push_fixed(resume as u64, 2)?.op(Opcode::JUMP);
            }
            let trampoline = asm.finish().assemble(base)?;

            let target = u16::try_from(base).map_err(|_| Error::CodeTooLarge {
                size: base,
                limit: usize::from(u16::MAX),
            })?;
            let patch = &mut code[site.start..site.end];
            patch.fill(INVALID);
            patch[0] = PUSH2;
            patch[1..3].copy_from_slice(&target.to_be_bytes());
            patch[3] = JUMP;
            if site.resume.is_some() {
                patch[patch.len() - 1] = JUMPDEST;
            }

            tracing::debug!(
                "{} @0x{:04x}: displaced 0x{:x}..0x{:x}, trampoline 0x{:x} ({} bytes, {} payload(s))",
                insertions[0].function,
                offset,
                site.start,
                site.end,
                base,
                trampoline.len(),
                insertions.len()
            );
            code.extend_from_slice(&trampoline);
        }

        if code.len() > self.config.max_code_size {
            return Err(Error::CodeTooLarge {
                size: code.len(),
                limit: self.config.max_code_size,
            });
        }

        tracing::info!(
            "{}: runtime {} -> {} bytes",
            self.name(),
            runtime.len(),
            code.len()
        );
        Ok(code)
    }
}
