//! Importable tables and the columns a mapping may target.

use crate::error::ImportError;
use crate::models::entity::{beneficiaries, profiles, transactions};
use sea_orm::{EntityTrait, IdenStatic, Iterable};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Columns managed by the system, never offered as mapping targets.
pub const EXCLUDED_COLUMNS: &[&str] = &[
    "id",
    "import_id",
    "beneficiary_id",
    "profile_id",
    "created_at",
    "updated_at",
    "deleted_at",
];

pub const NAME_COLUMNS: &[&str] = &["first_name", "last_name", "middle_name", "extension_name"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportTable {
    Beneficiaries,
    Profiles,
    Transactions,
}

impl ImportTable {
    /// Allow-list, in suggestion priority order.
    pub const ALL: [ImportTable; 3] = [
        ImportTable::Beneficiaries,
        ImportTable::Profiles,
        ImportTable::Transactions,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ImportTable::Beneficiaries => "beneficiaries",
            ImportTable::Profiles => "profiles",
            ImportTable::Transactions => "transactions",
        }
    }
}

impl fmt::Display for ImportTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImportTable {
    type Err = ImportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ImportTable::ALL
            .into_iter()
            .find(|table| table.as_str() == s)
            .ok_or_else(|| ImportError::TableNotAllowed(s.to_string()))
    }
}

/// Lists the non-system columns of a named table.
pub trait SchemaIntrospection {
    fn column_listing(&self, table: ImportTable) -> Vec<String>;
}

/// Introspects the sea-orm entity definitions.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntitySchema;

impl SchemaIntrospection for EntitySchema {
    fn column_listing(&self, table: ImportTable) -> Vec<String> {
        match table {
            ImportTable::Beneficiaries => entity_columns::<beneficiaries::Entity>(),
            ImportTable::Profiles => entity_columns::<profiles::Entity>(),
            ImportTable::Transactions => entity_columns::<transactions::Entity>(),
        }
    }
}

fn entity_columns<E: EntityTrait>() -> Vec<String> {
    E::Column::iter()
        .map(|column| column.as_str().to_string())
        .collect()
}

/// Importable columns per table, in declaration order.
#[derive(Debug, Clone)]
pub struct TableCatalog {
    columns: BTreeMap<ImportTable, Vec<String>>,
}

impl TableCatalog {
    pub fn new<S: SchemaIntrospection>(schema: &S) -> Self {
        let columns = ImportTable::ALL
            .into_iter()
            .map(|table| {
                let importable = schema
                    .column_listing(table)
                    .into_iter()
                    .filter(|column| !EXCLUDED_COLUMNS.contains(&column.as_str()))
                    .collect();
                (table, importable)
            })
            .collect();
        Self { columns }
    }

    pub fn from_entities() -> Self {
        Self::new(&EntitySchema)
    }

    pub fn columns(&self, table: ImportTable) -> &[String] {
        self.columns.get(&table).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_column(&self, table: ImportTable, column: &str) -> bool {
        self.columns(table).iter().any(|c| c == column)
    }

    /// Table name → columns, the shape the mapping screen renders.
    pub fn to_map(&self) -> BTreeMap<String, Vec<String>> {
        self.columns
            .iter()
            .map(|(table, columns)| (table.as_str().to_string(), columns.clone()))
            .collect()
    }
}
