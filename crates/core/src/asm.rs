//! A tiny label-aware assembler for relocatable code fragments.
//!
//! Fragments are assembled against a base address chosen late, once the caller knows where
//! the code will live. Label references always encode as `PUSH2`, so a fragment's size never
//! depends on its base and a 16-bit label range is enforced at assembly time.

use crate::decoder::decode;
use crate::hex_bytes::HexBytes;
use crate::result::{Error, Result};
use crate::Opcode;
use serde::{Deserialize, Serialize};
use std::fmt;

const PUSH1: u8 = 0x60;
const PUSH2: u8 = 0x61;
const JUMPDEST: u8 = 0x5b;

/// A jump target local to one [`Fragment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Label(usize);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@L{}", self.0)
    }
}

/// One element of a fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Item {
    /// Opcodes and immediates emitted verbatim.
    Code(HexBytes),
    /// `PUSH2` of the label's absolute address.
    PushLabel(Label),
    /// A `JUMPDEST` that binds the label to its own address.
    Bind(Label),
}

impl Item {
    fn size(&self) -> usize {
        match self {
            Item::Code(bytes) => bytes.len(),
            Item::PushLabel(_) => 3,
            Item::Bind(_) => 1,
        }
    }
}

/// Relocatable code with local labels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    items: Vec<Item>,
    labels: usize,
}

impl Fragment {
    /// Size in bytes, independent of the base address.
    pub fn len(&self) -> usize {
        self.items.iter().map(Item::size).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    /// Produces the bytes of this fragment as if its first byte lived at `base`.
    pub fn assemble(&self, base: usize) -> Result<Vec<u8>> {
        let mut addresses: Vec<Option<usize>> = vec![None; self.labels];
        let mut cursor = base;
        for item in &self.items {
            if let Item::Bind(Label(id)) = item {
                if addresses[*id].replace(cursor).is_some() {
                    return Err(Error::LabelRebound(*id));
                }
            }
            cursor += item.size();
        }

        let mut out = Vec::with_capacity(cursor - base);
        for item in &self.items {
            match item {
                Item::Code(bytes) => out.extend_from_slice(bytes),
                Item::Bind(_) => out.push(JUMPDEST),
                Item::PushLabel(Label(id)) => {
                    let address = addresses[*id].ok_or(Error::UnboundLabel(*id))?;
                    let address = u16::try_from(address).map_err(|_| Error::LabelOutOfRange(address))?;
                    out.push(PUSH2);
                    out.extend_from_slice(&address.to_be_bytes());
                }
            }
        }
        Ok(out)
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut offset = 0;
        for item in &self.items {
            match item {
                Item::Code(bytes) => {
                    for ins in decode(bytes) {
                        match &ins.imm {
                            Some(imm) => writeln!(f, "{:04x}  {} 0x{}", offset + ins.pc, ins.op, imm)?,
                            None => writeln!(f, "{:04x}  {}", offset + ins.pc, ins.op)?,
                        }
                    }
                }
                Item::PushLabel(label) => writeln!(f, "{offset:04x}  PUSH2 {label}")?,
                Item::Bind(label) => writeln!(f, "{offset:04x}  {label}: JUMPDEST")?,
            }
            offset += item.size();
        }
        Ok(())
    }
}

/// Builder for [`Fragment`]s.
#[derive(Debug, Default)]
pub struct Assembler {
    fragment: Fragment,
}

impl Assembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh label; it must be bound exactly once before assembly.
    pub fn new_label(&mut self) -> Label {
        let label = Label(self.fragment.labels);
        self.fragment.labels += 1;
        label
    }

    /// Emits a `JUMPDEST` and binds `label` to it.
    pub fn bind(&mut self, label: Label) -> &mut Self {
        self.fragment.items.push(Item::Bind(label));
        self
    }

    pub fn op(&mut self, opcode: Opcode) -> &mut Self {
        self.raw(&[opcode.to_byte()])
    }

    pub fn ops(&mut self, opcodes: &[Opcode]) -> &mut Self {
        for opcode in opcodes {
            self.op(*opcode);
        }
        self
    }

    /// Pushes a big-endian value using the narrowest `PUSHn` that holds it.
    ///
    /// Zero is emitted as `PUSH1 0x00` so the output runs on pre-Shanghai chains.
    pub fn push(&mut self, value: &[u8]) -> Result<&mut Self> {
        let first = value.iter().position(|b| *b != 0).unwrap_or(value.len());
        let significant = &value[first..];
        if significant.len() > 32 {
            return Err(Error::ImmediateTooWide {
                value: hex::encode(value),
                width: 32,
            });
        }
        if significant.is_empty() {
            return Ok(self.raw(&[PUSH1, 0x00]));
        }
        let mut bytes = Vec::with_capacity(significant.len() + 1);
        bytes.push(PUSH1 + (significant.len() as u8 - 1));
        bytes.extend_from_slice(significant);
        Ok(self.raw(&bytes))
    }

    pub fn push_u64(&mut self, value: u64) -> &mut Self {
        let first = value.to_be_bytes().iter().position(|b| *b != 0).unwrap_or(7);
        let bytes = value.to_be_bytes();
        let mut out = vec![PUSH1 + (7 - first) as u8];
        out.extend_from_slice(&bytes[first..]);
        self.raw(&out)
    }

    /// Pushes `value` with an exact immediate width, for code whose layout must not shift.
    pub fn push_fixed(&mut self, value: u64, width: usize) -> Result<&mut Self> {
        let bytes = value.to_be_bytes();
        if width == 0 || width > 8 || bytes[..8 - width].iter().any(|b| *b != 0) {
            return Err(Error::ImmediateTooWide {
                value: format!("{value:x}"),
                width,
            });
        }
        let mut out = vec![PUSH1 + (width as u8 - 1)];
        out.extend_from_slice(&bytes[8 - width..]);
        Ok(self.raw(&out))
    }

    pub fn push_label(&mut self, label: Label) -> &mut Self {
        self.fragment.items.push(Item::PushLabel(label));
        self
    }

    /// Emits bytes verbatim.
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        if bytes.is_empty() {
            return self;
        }
        if let Some(Item::Code(tail)) = self.fragment.items.last_mut() {
            tail.0.extend_from_slice(bytes);
        } else {
            self.fragment.items.push(Item::Code(bytes.to_vec().into()));
        }
        self
    }

    /// Splices another fragment in place, renumbering its labels into this one.
    pub fn append(&mut self, other: &Fragment) -> &mut Self {
        let shift = self.fragment.labels;
        self.fragment.labels += other.labels;
        for item in &other.items {
            match item {
                Item::Code(bytes) => {
                    self.raw(bytes);
                }
                Item::PushLabel(Label(id)) => {
                    self.fragment.items.push(Item::PushLabel(Label(id + shift)));
                }
                Item::Bind(Label(id)) => {
                    self.fragment.items.push(Item::Bind(Label(id + shift)));
                }
            }
        }
        self
    }

    pub fn len(&self) -> usize {
        self.fragment.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragment.is_empty()
    }

    pub fn finish(self) -> Fragment {
        self.fragment
    }
}
