//! The YAML patch specification.
//!
//! ```yaml
//! add_require_patch:
//!   migrateTo:
//!     - msg.sender == sload(owner)
//! delete_function_patch:
//!   - selfdestructAll
//! ```
//!
//! Both keys are optional and an empty document is a valid (empty) specification. Unknown
//! top-level keys are rejected. Function order under `add_require_patch` is preserved.

use crate::{Error, Result};
use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::Path;

/// Guards to add in front of one function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequirePatch {
    pub function: String,
    /// Conditions in document order; each must hold for the call to proceed.
    pub guards: Vec<String>,
}

/// A parsed patch specification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawSpecification")]
pub struct PatchSpecification {
    pub add_require_patch: Vec<RequirePatch>,
    pub delete_function_patch: Vec<String>,
}

impl PatchSpecification {
    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| Error::SpecificationRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text)
    }

    pub fn is_empty(&self) -> bool {
        self.add_require_patch.is_empty() && self.delete_function_patch.is_empty()
    }

    /// Every function the specification refers to, require patches first.
    pub fn referenced_functions(&self) -> impl Iterator<Item = &str> {
        self.add_require_patch
            .iter()
            .map(|patch| patch.function.as_str())
            .chain(self.delete_function_patch.iter().map(String::as_str))
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSpecification {
    #[serde(default)]
    add_require_patch: Option<OrderedGuards>,
    #[serde(default)]
    delete_function_patch: Option<Vec<String>>,
}

impl From<RawSpecification> for PatchSpecification {
    fn from(raw: RawSpecification) -> Self {
        Self {
            add_require_patch: raw.add_require_patch.map(|g| g.0).unwrap_or_default(),
            delete_function_patch: raw.delete_function_patch.unwrap_or_default(),
        }
    }
}

/// `function -> [guard]` mapping that keeps document order.
struct OrderedGuards(Vec<RequirePatch>);

impl<'de> Deserialize<'de> for OrderedGuards {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct OrderedGuardsVisitor;

        impl<'de> Visitor<'de> for OrderedGuardsVisitor {
            type Value = OrderedGuards;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a mapping from function name to a list of conditions")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut patches: Vec<RequirePatch> = Vec::new();
                while let Some((function, guards)) = map.next_entry::<String, Vec<String>>()? {
                    if patches.iter().any(|p| p.function == function) {
                        return Err(de::Error::custom(format!(
                            "function '{function}' listed twice under add_require_patch"
                        )));
                    }
                    patches.push(RequirePatch { function, guards });
                }
                Ok(OrderedGuards(patches))
            }

            fn visit_unit<E>(self) -> std::result::Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(OrderedGuards(Vec::new()))
            }
        }

        deserializer.deserialize_map(OrderedGuardsVisitor)
    }
}
