//! Registry of layer variables.
//!
//! The engine's variable store is global mutable state. The registry makes
//! ownership explicit: every cell has exactly one declared writer and a set of
//! readers, so synthesis can be checked before anything touches a document.

use crate::models::layer_spec::LayerSpec;
use std::collections::{BTreeSet, HashMap};

/// Who writes a variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellOwner {
    /// Global prerequisite variable, written outside the generated rules
    Root,
    /// Written by hand-authored rules (siblings, foreign parents)
    External,
    /// Written by a generated setter
    GeneratedSetter {
        /// Owning layer
        layer: String,
        /// Owning mode, `None` for the layer setter itself
        mode: Option<String>,
    },
    /// Layer setter that stays hand-authored
    ExternalSetter {
        /// Owning layer
        layer: String,
    },
    /// Scratch cell written by guard rules and never read
    Scratch,
}

impl std::fmt::Display for CellOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Root => write!(f, "root"),
            Self::External => write!(f, "external"),
            Self::GeneratedSetter { layer, mode: None } => write!(f, "setter of layer {layer}"),
            Self::GeneratedSetter {
                layer,
                mode: Some(mode),
            } => write!(f, "setter of mode {layer}+{mode}"),
            Self::ExternalSetter { layer } => write!(f, "hand-authored setter of layer {layer}"),
            Self::Scratch => write!(f, "guard scratch"),
        }
    }
}

/// A named boolean cell (default 0).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableCell {
    /// Variable name
    pub name: String,
    /// Single declared writer
    pub owner: CellOwner,
    /// Readers, as `<layer>/<category>`
    pub readers: BTreeSet<String>,
}

/// Explicit registry of every variable the generated rules touch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableRegistry {
    cells: Vec<VariableCell>,
    index: HashMap<String, usize>,
}

impl VariableRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares the writer of a cell.
    ///
    /// Fails if the cell already has a writer.
    pub fn declare(&mut self, name: &str, owner: CellOwner) -> Result<(), String> {
        if let Some(&idx) = self.index.get(name) {
            let existing = &self.cells[idx].owner;
            return Err(format!(
                "Variable '{name}' is written by both the {existing} and the {owner}"
            ));
        }
        self.index.insert(name.to_string(), self.cells.len());
        self.cells.push(VariableCell {
            name: name.to_string(),
            owner,
            readers: BTreeSet::new(),
        });
        Ok(())
    }

    /// Records that `reader` guards on `name`.
    pub fn record_reader(&mut self, name: &str, reader: &str) -> Result<(), String> {
        let idx = *self
            .index
            .get(name)
            .ok_or_else(|| format!("{reader} reads undeclared variable '{name}'"))?;
        let cell = &mut self.cells[idx];
        if cell.owner == CellOwner::Scratch {
            return Err(format!(
                "{reader} reads the guard scratch variable '{name}'"
            ));
        }
        cell.readers.insert(reader.to_string());
        Ok(())
    }

    /// Looks up a cell.
    #[must_use]
    pub fn cell(&self, name: &str) -> Option<&VariableCell> {
        self.index.get(name).map(|&idx| &self.cells[idx])
    }

    /// Cells in declaration order.
    #[must_use]
    pub fn cells(&self) -> &[VariableCell] {
        &self.cells
    }

    /// Whether a generated setter owns the cell.
    #[must_use]
    pub fn is_generated(&self, name: &str) -> bool {
        matches!(
            self.cell(name).map(|c| &c.owner),
            Some(CellOwner::GeneratedSetter { .. })
        )
    }

    /// Declares every writer implied by a layer spec.
    pub fn from_spec(spec: &LayerSpec) -> Result<Self, String> {
        let mut registry = Self::new();

        if let Some(root) = &spec.root {
            registry.declare(root, CellOwner::Root)?;
        }
        registry.declare(&spec.noop_variable, CellOwner::Scratch)?;
        for sibling in &spec.siblings {
            registry.declare(sibling, CellOwner::External)?;
        }

        for layer in &spec.layers {
            let owner = if layer.external_setter {
                CellOwner::ExternalSetter {
                    layer: layer.name.clone(),
                }
            } else {
                CellOwner::GeneratedSetter {
                    layer: layer.name.clone(),
                    mode: None,
                }
            };
            registry.declare(&layer.variable(), owner)?;

            for mode in &layer.modes {
                registry.declare(
                    &mode.variable(),
                    CellOwner::GeneratedSetter {
                        layer: layer.name.clone(),
                        mode: Some(mode.name.clone()),
                    },
                )?;
            }
        }

        // Parents that are neither root nor another layer are foreign cells.
        for layer in &spec.layers {
            if let Some(parent) = &layer.parent {
                if registry.cell(parent).is_none() {
                    registry.declare(parent, CellOwner::External)?;
                }
            }
        }

        Ok(registry)
    }
}
