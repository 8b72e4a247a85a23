//! Function name → runtime entry offset.

use crate::artifact::ContractArtifact;
use crate::decoder::decode;
use crate::detection::detect_function_dispatcher;
use crate::result::{Error, Result};
use serde::Serialize;
use std::collections::BTreeMap;

/// Maps each externally callable function to the byte offset where its body starts in
/// runtime code. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FunctionTable {
    entries: BTreeMap<String, usize>,
}

impl FunctionTable {
    pub fn new(entries: impl IntoIterator<Item = (String, usize)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// Entry offset of `function`, or [`Error::FunctionNotFound`] listing every known name.
    pub fn offset(&self, function: &str) -> Result<usize> {
        self.entries
            .get(function)
            .copied()
            .ok_or_else(|| Error::FunctionNotFound {
                function: function.to_string(),
                known: self.names().map(str::to_string).collect(),
            })
    }

    pub fn contains(&self, function: &str) -> bool {
        self.entries.contains_key(function)
    }

    /// Function names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.entries.iter().map(|(name, offset)| (name.as_str(), *offset))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Strategy for deriving a [`FunctionTable`] from compiler output.
pub trait FunctionTableResolver: Send + Sync {
    fn name(&self) -> &'static str;

    fn resolve(&self, artifact: &ContractArtifact, source: &str) -> Result<FunctionTable>;
}

/// Resolves entry points by reading the selector dispatcher out of the runtime code and
/// joining it with the compiler's signature hashes.
///
/// The source text is only consulted to log functions that are declared but not routed
/// (internal helpers, or externals the compiler inlined away).
#[derive(Debug, Clone, Copy, Default)]
pub struct DispatcherResolver;

impl FunctionTableResolver for DispatcherResolver {
    fn name(&self) -> &'static str {
        "dispatcher"
    }

    fn resolve(&self, artifact: &ContractArtifact, source: &str) -> Result<FunctionTable> {
        let instructions = decode(&artifact.runtime_code);
        let dispatcher = detect_function_dispatcher(&instructions).ok_or(Error::NoDispatcher)?;

        let mut entries: BTreeMap<String, usize> = BTreeMap::new();
        for (signature, selector) in &artifact.selectors {
            let name = signature.split('(').next().unwrap_or(signature).to_string();
            let Some(offset) = dispatcher.entry_for(*selector) else {
                tracing::warn!(
                    "{} (0x{:08x}) is not routed by the dispatcher",
                    signature,
                    selector
                );
                continue;
            };

            match entries.get(&name) {
                Some(existing) if *existing != offset => tracing::warn!(
                    "Overloaded function {} has several entries; patching the one at 0x{:x}",
                    name,
                    existing
                ),
                Some(_) => {}
                None => {
                    tracing::debug!("{} -> 0x{:04x}", signature, offset);
                    entries.insert(name, offset);
                }
            }
        }

        for declared in declared_functions(source) {
            if !entries.contains_key(declared) {
                tracing::debug!("Function {} declared in source has no dispatcher entry", declared);
            }
        }

        Ok(FunctionTable { entries })
    }
}

fn declared_functions(source: &str) -> impl Iterator<Item = &str> {
    source.split("function").skip(1).filter_map(|rest| {
        let rest = rest.trim_start();
        let end = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        (end > 0).then(|| &rest[..end])
    })
}
