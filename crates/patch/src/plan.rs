//! Compilation of a [`PatchSpecification`] into an ordered [`PatchPlan`].

use crate::expr::{compile_guard, revert_payload};
use crate::spec::PatchSpecification;
use crate::Result;
use serde::Serialize;
use splint_core::FunctionTable;
use splint_core::asm::Fragment;

/// What an insertion does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PatchKind {
    /// Revert unless `condition` holds.
    Require { condition: String, translated: String },
    /// Revert unconditionally.
    Delete,
}

/// One payload to run at a function entry, before the original body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Insertion {
    pub function: String,
    /// Entry offset in the unpatched runtime code.
    pub offset: usize,
    #[serde(flatten)]
    pub kind: PatchKind,
    pub payload: Fragment,
}

/// Ordered insertions. Require patches come first in specification order, then deletes.
/// Insertions sharing an offset execute in plan order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PatchPlan {
    insertions: Vec<Insertion>,
}

impl PatchPlan {
    pub fn insertions(&self) -> &[Insertion] {
        &self.insertions
    }

    pub fn is_empty(&self) -> bool {
        self.insertions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.insertions.len()
    }

    /// Insertions grouped by offset, groups ordered by first appearance in the plan.
    pub fn patch_points(&self) -> Vec<(usize, Vec<&Insertion>)> {
        let mut points: Vec<(usize, Vec<&Insertion>)> = Vec::new();
        for insertion in &self.insertions {
            match points.iter_mut().find(|(offset, _)| *offset == insertion.offset) {
                Some((_, group)) => group.push(insertion),
                None => points.push((insertion.offset, vec![insertion])),
            }
        }
        points
    }
}

/// Builds the plan for `spec` against `table`.
///
/// Every referenced function is resolved and every guard compiled before the plan is
/// returned; the first failure aborts with nothing produced.
pub fn compile(spec: &PatchSpecification, table: &FunctionTable) -> Result<PatchPlan> {
    for function in spec.referenced_functions() {
        table.offset(function)?;
    }

    let mut insertions = Vec::new();

    for require in &spec.add_require_patch {
        let offset = table.offset(&require.function)?;
        for condition in &require.guards {
            let guard = compile_guard(condition)?;
            tracing::debug!(
                "require {} @0x{:04x}: {}",
                require.function,
                offset,
                guard.translated
            );
            insertions.push(Insertion {
                function: require.function.clone(),
                offset,
                kind: PatchKind::Require {
                    condition: guard.condition,
                    translated: guard.translated,
                },
                payload: guard.payload,
            });
        }
    }

    let mut deleted: Vec<&str> = Vec::new();
    for function in &spec.delete_function_patch {
        if deleted.contains(&function.as_str()) {
            tracing::debug!("{} already deleted, skipping duplicate", function);
            continue;
        }
        deleted.push(function.as_str());
        let offset = table.offset(function)?;
        tracing::debug!("delete {} @0x{:04x}", function, offset);
        insertions.push(Insertion {
            function: function.clone(),
            offset,
            kind: PatchKind::Delete,
            payload: revert_payload(),
        });
    }

    let plan = PatchPlan { insertions };
    tracing::info!(
        "Patch plan: {} insertion(s) at {} point(s)",
        plan.len(),
        plan.patch_points().len()
    );
    Ok(plan)
}
