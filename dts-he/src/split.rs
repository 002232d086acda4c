//! Split definitions and validated rows by storage destination

use crate::types::{Cell, FieldDef, Storage, ValidCell};
use std::collections::BTreeMap;

/// Definitions partitioned by storage, order kept within each group
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitDefs {
    /// Columns of `human_dsg`
    pub shared: Vec<FieldDef>,
    /// Keys of the `human_dsg.custom` JSON map
    pub custom: Vec<FieldDef>,
    /// Columns of the effect table
    pub not_shared: Vec<FieldDef>,
}

impl SplitDefs {
    pub fn len(&self) -> usize {
        self.shared.len() + self.custom.len() + self.not_shared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn split_defs(defs: &[FieldDef]) -> SplitDefs {
    let mut split = SplitDefs::default();
    for def in defs {
        match def.storage {
            Storage::Shared => split.shared.push(def.clone()),
            Storage::Custom => split.custom.push(def.clone()),
            Storage::Table => split.not_shared.push(def.clone()),
        }
    }
    split
}

/// Validated row routed to its two physical rows
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitRow {
    pub shared: Vec<ValidCell>,
    /// db name -> cell
    pub custom: BTreeMap<String, Cell>,
    pub not_shared: Vec<ValidCell>,
}

impl SplitRow {
    /// Shared cells carrying a value or an explicit null
    pub fn supplied_shared(&self) -> impl Iterator<Item = &ValidCell> {
        self.shared.iter().filter(|c| !c.cell.is_unset())
    }

    pub fn supplied_not_shared(&self) -> impl Iterator<Item = &ValidCell> {
        self.not_shared.iter().filter(|c| !c.cell.is_unset())
    }

    pub fn has_custom_input(&self) -> bool {
        self.custom.values().any(|c| !c.is_unset())
    }
}

pub fn split_row(cells: Vec<ValidCell>) -> SplitRow {
    let mut split = SplitRow::default();
    for cell in cells {
        match cell.storage {
            Storage::Shared => split.shared.push(cell),
            Storage::Custom => {
                split.custom.insert(cell.db_name, cell.cell);
            }
            Storage::Table => split.not_shared.push(cell),
        }
    }
    split
}
