//! Loading of Solidity compiler outputs.
//!
//! A compilation with
//! `solc --bin --bin-runtime --abi --combined-json abi,hashes,srcmap-runtime -o DIR`
//! leaves four files per run that splint needs: `<Name>.bin`, `<Name>.bin-runtime`,
//! `<Name>.abi` and `combined.json`.

use crate::result::{Error, Result};
use crate::decode_hex;
use alloy::json_abi::JsonAbi;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Everything splint needs to know about one compiled contract.
#[derive(Debug, Clone)]
pub struct ContractArtifact {
    pub name: String,
    /// Deployment bytecode: constructor followed by the runtime image.
    pub init_code: Vec<u8>,
    pub runtime_code: Vec<u8>,
    pub abi: JsonAbi,
    /// Compressed runtime source map, kept opaque.
    pub source_map: String,
    /// Canonical signature → four-byte selector, as reported by the compiler.
    pub selectors: BTreeMap<String, u32>,
}

#[derive(Debug, Deserialize)]
struct CombinedOutput {
    contracts: BTreeMap<String, CombinedContract>,
}

#[derive(Debug, Deserialize)]
struct CombinedContract {
    #[serde(default)]
    hashes: BTreeMap<String, String>,
    #[serde(default, rename = "srcmap-runtime")]
    srcmap_runtime: String,
}

impl ContractArtifact {
    /// File names a compilation of `name` must have produced.
    pub fn expected_files(name: &str) -> Vec<String> {
        vec![
            format!("{name}.bin"),
            format!("{name}.bin-runtime"),
            format!("{name}.abi"),
            "combined.json".to_string(),
        ]
    }

    /// Reads the artifacts of contract `name` from `dir`.
    ///
    /// Fails with [`Error::CompilationArtifactMissing`] before touching any content if one
    /// of the expected files is absent.
    pub fn load(dir: &Path, name: &str) -> Result<Self> {
        let expected = Self::expected_files(name);
        if let Some(missing) = expected
            .iter()
            .map(|file| dir.join(file))
            .find(|path| !path.is_file())
        {
            return Err(Error::CompilationArtifactMissing { missing, expected });
        }

        let init_code = decode_hex(&read(&dir.join(&expected[0]))?)?;
        let runtime_code = decode_hex(&read(&dir.join(&expected[1]))?)?;

        let abi_path = dir.join(&expected[2]);
        let abi: JsonAbi = serde_json::from_str(&read(&abi_path)?).map_err(|source| Error::Json {
            what: "ABI",
            path: abi_path.clone(),
            source,
        })?;

        let combined_path = dir.join(&expected[3]);
        let combined: CombinedOutput =
            serde_json::from_str(&read(&combined_path)?).map_err(|source| Error::Json {
                what: "combined compiler output",
                path: combined_path.clone(),
                source,
            })?;
        let contract = select_contract(combined, name)?;

        let mut selectors = BTreeMap::new();
        for (signature, hash) in contract.hashes {
            match u32::from_str_radix(hash.trim_start_matches("0x"), 16) {
                Ok(selector) => {
                    selectors.insert(signature, selector);
                }
                Err(_) => tracing::warn!("Ignoring malformed selector '{}' for {}", hash, signature),
            }
        }

        tracing::debug!(
            "Loaded {}: init {} bytes, runtime {} bytes, {} selectors",
            name,
            init_code.len(),
            runtime_code.len(),
            selectors.len()
        );

        Ok(Self {
            name: name.to_string(),
            init_code,
            runtime_code,
            abi,
            source_map: contract.srcmap_runtime,
            selectors,
        })
    }

    /// Rejects contracts whose constructor takes arguments; deployment never supplies any.
    pub fn ensure_no_constructor_args(&self) -> Result<()> {
        match &self.abi.constructor {
            Some(constructor) if !constructor.inputs.is_empty() => {
                Err(Error::UnsupportedConstructorArguments {
                    contract: self.name.clone(),
                    inputs: constructor.inputs.len(),
                })
            }
            _ => Ok(()),
        }
    }

    /// True when the ABI exposes a function called `name` (any overload).
    pub fn has_function(&self, name: &str) -> bool {
        self.abi.functions.contains_key(name)
    }

    /// Selector of the first ABI overload of `name`.
    pub fn selector_of(&self, name: &str) -> Option<u32> {
        let function = self.abi.functions.get(name)?.first()?;
        Some(u32::from_be_bytes(function.selector().0))
    }
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| Error::FileRead {
        path: PathBuf::from(path),
        source,
    })
}

fn select_contract(combined: CombinedOutput, name: &str) -> Result<CombinedContract> {
    let suffix = format!(":{name}");
    let key = combined
        .contracts
        .keys()
        .find(|key| key.as_str() == name || key.ends_with(&suffix))
        .cloned();

    match key {
        Some(key) => {
            let mut contracts = combined.contracts;
            contracts.remove(&key).ok_or(Error::ContractNotInOutput {
                contract: name.to_string(),
                available: Vec::new(),
            })
        }
        None => Err(Error::ContractNotInOutput {
            contract: name.to_string(),
            available: combined.contracts.into_keys().collect(),
        }),
    }
}
