use crate::catalog::{ImportTable, TableCatalog};
use crate::error::{ImportError, MappingError};
use crate::normalize::normalize;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Known header spellings that do not normalize to a column name.
const HEADER_ALIASES: &[(&str, ImportTable, &str)] = &[
    ("surname", ImportTable::Beneficiaries, "last_name"),
    ("lastname", ImportTable::Beneficiaries, "last_name"),
    ("family_name", ImportTable::Beneficiaries, "last_name"),
    ("firstname", ImportTable::Beneficiaries, "first_name"),
    ("given_name", ImportTable::Beneficiaries, "first_name"),
    ("middlename", ImportTable::Beneficiaries, "middle_name"),
    ("mi", ImportTable::Beneficiaries, "middle_name"),
    ("middle_initial", ImportTable::Beneficiaries, "middle_name"),
    ("ext", ImportTable::Beneficiaries, "extension_name"),
    ("suffix", ImportTable::Beneficiaries, "extension_name"),
    ("name_ext", ImportTable::Beneficiaries, "extension_name"),
    ("ext_name", ImportTable::Beneficiaries, "extension_name"),
    ("gender", ImportTable::Beneficiaries, "sex"),
    ("dob", ImportTable::Beneficiaries, "birthday"),
    ("birthdate", ImportTable::Beneficiaries, "birthday"),
    ("birth_date", ImportTable::Beneficiaries, "birthday"),
    ("date_of_birth", ImportTable::Beneficiaries, "birthday"),
    ("contact_no", ImportTable::Beneficiaries, "contact_number"),
    ("mobile_number", ImportTable::Beneficiaries, "contact_number"),
    ("cellphone_number", ImportTable::Beneficiaries, "contact_number"),
    ("citymunicipality", ImportTable::Beneficiaries, "city"),
    ("municipality", ImportTable::Beneficiaries, "city"),
    ("brgy", ImportTable::Beneficiaries, "barangay"),
    ("amount", ImportTable::Transactions, "assistance_amount"),
    ("type_of_assistance", ImportTable::Transactions, "assistance_type"),
    ("mode_of_assistance", ImportTable::Transactions, "assistance_mode"),
    ("date_completed", ImportTable::Transactions, "completed_at"),
];

/// Normalized prefixes marking a header as describing the beneficiary.
const BENEFICIARY_PREFIXES: &[&str] = &["beneficiary_", "ben_", "b_"];

/// Headers that denote the profile instead once beneficiary prefixes appear in the sheet.
const PROFILE_CONTEXT_COLUMNS: &[&str] = &[
    "sex",
    "civil_status",
    "occupation",
    "region",
    "province",
    "barangay",
    "category",
];

/// Unprefixed personal columns redirected to profiles once beneficiary prefixes appear.
///
/// A sheet with both `B First Name` and `First Name` names two people. The prefixed
/// header takes `beneficiaries.first_name`, so the plain one must take
/// `profiles.first_name` or both would claim the same target.
const PROFILE_CONTEXT_PERSON_COLUMNS: &[&str] = &[
    "first_name",
    "last_name",
    "middle_name",
    "extension_name",
    "birthday",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingTarget {
    pub table: String,
    pub column: String,
}

/// One row of the mapping form as submitted by the human.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub header_index: usize,
    pub table: String,
    pub column: String,
}

/// Header index → (table, column). Tables are checked when the mapping is resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    targets: BTreeMap<usize, MappingTarget>,
}

impl ColumnMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a mapping from form entries, ignoring rows left blank.
    pub fn from_entries(entries: &[MappingEntry]) -> Self {
        let mut mapping = Self::new();
        for entry in entries {
            let table = entry.table.trim();
            let column = entry.column.trim();
            if !table.is_empty() && !column.is_empty() {
                mapping.insert(entry.header_index, table, column);
            }
        }
        mapping
    }

    pub fn insert(&mut self, header_index: usize, table: &str, column: &str) {
        self.targets.insert(
            header_index,
            MappingTarget {
                table: table.to_string(),
                column: column.to_string(),
            },
        );
    }

    pub fn get(&self, header_index: usize) -> Option<&MappingTarget> {
        self.targets.get(&header_index)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &MappingTarget)> {
        self.targets.iter().map(|(index, target)| (*index, target))
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Distinct target tables in header order, as stored on the import record.
    pub fn target_tables(&self) -> Vec<String> {
        let mut tables: Vec<String> = Vec::new();
        for target in self.targets.values() {
            if !tables.contains(&target.table) {
                tables.push(target.table.clone());
            }
        }
        tables
    }

    /// Checks performed before the human may confirm the mapping.
    pub fn validate(&self) -> Result<(), MappingError> {
        if self.targets.is_empty() {
            return Err(MappingError::Empty);
        }

        let mut seen: HashMap<(&str, &str), usize> = HashMap::new();
        for (index, target) in &self.targets {
            let key = (target.table.as_str(), target.column.as_str());
            if let Some(first) = seen.insert(key, *index) {
                return Err(MappingError::DuplicateTarget {
                    table: target.table.clone(),
                    column: target.column.clone(),
                    first,
                    second: *index,
                });
            }
        }
        Ok(())
    }

    /// Groups the mapping by table, failing on tables outside the allow-list.
    pub fn resolve(&self, catalog: &TableCatalog) -> Result<TableMap, ImportError> {
        let mut groups: BTreeMap<ImportTable, Vec<(usize, String)>> = BTreeMap::new();

        for (index, target) in &self.targets {
            let table: ImportTable = target.table.parse()?;
            if !catalog.has_column(table, &target.column) {
                return Err(ImportError::UnknownColumn {
                    table: target.table.clone(),
                    column: target.column.clone(),
                });
            }
            groups
                .entry(table)
                .or_default()
                .push((*index, target.column.clone()));
        }

        Ok(TableMap::new(groups))
    }
}

/// A resolved mapping: columns grouped per table, plus the dual-name flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMap {
    groups: BTreeMap<ImportTable, Vec<(usize, String)>>,
    dual_name_mode: bool,
}

impl TableMap {
    pub fn new(groups: BTreeMap<ImportTable, Vec<(usize, String)>>) -> Self {
        let has_names = |table: ImportTable| {
            groups.get(&table).is_some_and(|columns| {
                columns
                    .iter()
                    .any(|(_, column)| column == "first_name" || column == "last_name")
            })
        };
        let dual_name_mode = has_names(ImportTable::Beneficiaries) && has_names(ImportTable::Profiles);
        Self {
            groups,
            dual_name_mode,
        }
    }

    /// True when both beneficiaries and profiles have a first or last name mapped.
    pub fn dual_name_mode(&self) -> bool {
        self.dual_name_mode
    }

    pub fn group(&self, table: ImportTable) -> Option<&[(usize, String)]> {
        self.groups.get(&table).map(Vec::as_slice)
    }

    pub fn tables(&self) -> impl Iterator<Item = ImportTable> + '_ {
        self.groups.keys().copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestedTarget {
    pub table: ImportTable,
    pub column: String,
}

pub type SuggestedMapping = BTreeMap<usize, SuggestedTarget>;

/// Proposes a header → (table, column) assignment for a sheet.
pub struct MappingSuggester {
    catalog: TableCatalog,
    lookup: HashMap<String, (ImportTable, String)>,
    aliases: HashMap<&'static str, (ImportTable, &'static str)>,
}

impl MappingSuggester {
    pub fn new(catalog: TableCatalog) -> Self {
        // First table in priority order keeps a shared column name.
        let mut lookup = HashMap::new();
        for table in ImportTable::ALL {
            for column in catalog.columns(table) {
                lookup
                    .entry(normalize(column))
                    .or_insert_with(|| (table, column.clone()));
            }
        }

        let aliases = HEADER_ALIASES
            .iter()
            .map(|(header, table, column)| (*header, (*table, *column)))
            .collect();

        Self {
            catalog,
            lookup,
            aliases,
        }
    }

    pub fn catalog(&self) -> &TableCatalog {
        &self.catalog
    }

    /// Suggests targets for `(header index, header text)` pairs. Unmatched headers are absent.
    pub fn suggest<'a, I>(&self, headers: I) -> SuggestedMapping
    where
        I: IntoIterator<Item = (usize, &'a str)>,
    {
        let normalized: Vec<(usize, String)> = headers
            .into_iter()
            .map(|(index, header)| (index, normalize(header)))
            .collect();

        let profile_context = normalized
            .iter()
            .any(|(_, header)| self.beneficiary_prefixed(header).is_some());

        let suggestions: SuggestedMapping = normalized
            .iter()
            .filter_map(|(index, header)| {
                self.suggest_one(header, profile_context)
                    .map(|(table, column)| (*index, SuggestedTarget { table, column }))
            })
            .collect();

        debug!(
            "Suggested {} of {} headers (beneficiary prefix context: {})",
            suggestions.len(),
            normalized.len(),
            profile_context
        );
        suggestions
    }

    fn suggest_one(&self, header: &str, profile_context: bool) -> Option<(ImportTable, String)> {
        if header.is_empty() {
            return None;
        }

        if let Some(column) = self.beneficiary_prefixed(header) {
            return Some((ImportTable::Beneficiaries, column));
        }

        let (table, column) = self.plain_target(header)?;

        if profile_context
            && table == ImportTable::Beneficiaries
            && (PROFILE_CONTEXT_COLUMNS.contains(&column.as_str())
                || PROFILE_CONTEXT_PERSON_COLUMNS.contains(&column.as_str()))
            && self.catalog.has_column(ImportTable::Profiles, &column)
        {
            return Some((ImportTable::Profiles, column));
        }

        Some((table, column))
    }

    /// Alias first, then the normalized column lookup.
    fn plain_target(&self, header: &str) -> Option<(ImportTable, String)> {
        if let Some((table, column)) = self.aliases.get(header) {
            return Some((*table, column.to_string()));
        }
        self.lookup.get(header).cloned()
    }

    /// Beneficiary column named by a prefixed header such as `B. First Name`.
    fn beneficiary_prefixed(&self, header: &str) -> Option<String> {
        BENEFICIARY_PREFIXES.iter().find_map(|prefix| {
            let rest = header.strip_prefix(prefix)?;
            let column = match self.plain_target(rest) {
                Some((_, column)) => column,
                None => rest.to_string(),
            };
            self.catalog
                .has_column(ImportTable::Beneficiaries, &column)
                .then_some(column)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suggester() -> MappingSuggester {
        MappingSuggester::new(TableCatalog::from_entities())
    }

    fn suggest(headers: &[&str]) -> SuggestedMapping {
        suggester().suggest(headers.iter().copied().enumerate())
    }

    fn target(table: ImportTable, column: &str) -> SuggestedTarget {
        SuggestedTarget {
            table,
            column: column.to_string(),
        }
    }

    #[test]
    fn shared_column_prefers_beneficiaries() {
        let suggestions = suggest(&["Civil Status", "First Name"]);
        assert_eq!(suggestions[&0], target(ImportTable::Beneficiaries, "civil_status"));
        assert_eq!(suggestions[&1], target(ImportTable::Beneficiaries, "first_name"));
    }

    #[test]
    fn aliases_override_lookup() {
        let suggestions = suggest(&["Surname", "Gender", "Amount", "Date of Birth"]);
        assert_eq!(suggestions[&0], target(ImportTable::Beneficiaries, "last_name"));
        assert_eq!(suggestions[&1], target(ImportTable::Beneficiaries, "sex"));
        assert_eq!(suggestions[&2], target(ImportTable::Transactions, "assistance_amount"));
        assert_eq!(suggestions[&3], target(ImportTable::Beneficiaries, "birthday"));
    }

    #[test]
    fn unknown_and_empty_headers_are_absent() {
        let suggestions = suggest(&["Remarks of the Mayor", "", "Status"]);
        assert!(!suggestions.contains_key(&0));
        assert!(!suggestions.contains_key(&1));
        assert_eq!(suggestions[&2], target(ImportTable::Transactions, "status"));
    }

    #[test]
    fn beneficiary_prefix_redirects_demographics_to_profiles() {
        let suggestions = suggest(&[
            "First Name",
            "Last Name",
            "B. First Name",
            "B Last Name",
            "Sex",
            "Civil Status",
            "Barangay",
            "Contact Number",
            "Amount",
        ]);
        assert_eq!(suggestions[&0], target(ImportTable::Profiles, "first_name"));
        assert_eq!(suggestions[&1], target(ImportTable::Profiles, "last_name"));
        assert_eq!(suggestions[&2], target(ImportTable::Beneficiaries, "first_name"));
        assert_eq!(suggestions[&3], target(ImportTable::Beneficiaries, "last_name"));
        assert_eq!(suggestions[&4], target(ImportTable::Profiles, "sex"));
        assert_eq!(suggestions[&5], target(ImportTable::Profiles, "civil_status"));
        assert_eq!(suggestions[&6], target(ImportTable::Profiles, "barangay"));
        assert_eq!(suggestions[&7], target(ImportTable::Beneficiaries, "contact_number"));
        assert_eq!(suggestions[&8], target(ImportTable::Transactions, "assistance_amount"));
    }

    #[test]
    fn plain_and_prefixed_person_columns_never_share_a_target() {
        let suggestions = suggest(&["Birthday", "Ben Birthday"]);
        assert_eq!(suggestions[&0], target(ImportTable::Profiles, "birthday"));
        assert_eq!(suggestions[&1], target(ImportTable::Beneficiaries, "birthday"));

        let mut mapping = ColumnMapping::new();
        for (index, t) in &suggestions {
            mapping.insert(*index, t.table.as_str(), &t.column);
        }
        assert!(mapping.validate().is_ok());
    }

    #[test]
    fn without_prefix_demographics_stay_on_beneficiaries() {
        let suggestions = suggest(&["Sex", "Occupation"]);
        assert_eq!(suggestions[&0], target(ImportTable::Beneficiaries, "sex"));
        assert_eq!(suggestions[&1], target(ImportTable::Beneficiaries, "occupation"));
    }

    #[test]
    fn prefixed_alias_resolves_to_beneficiary() {
        let suggestions = suggest(&["B. Surname", "Beneficiary Gender"]);
        assert_eq!(suggestions[&0], target(ImportTable::Beneficiaries, "last_name"));
        assert_eq!(suggestions[&1], target(ImportTable::Beneficiaries, "sex"));
    }

    #[test]
    fn suggestions_keep_original_header_indices() {
        let suggestions = suggester().suggest([(0, "First Name"), (3, "Amount")]);
        assert!(suggestions.contains_key(&3));
        assert!(!suggestions.contains_key(&1));
    }

    #[test]
    fn duplicate_target_is_rejected() {
        let mut mapping = ColumnMapping::new();
        mapping.insert(0, "profiles", "first_name");
        mapping.insert(2, "profiles", "first_name");
        assert_eq!(
            mapping.validate(),
            Err(MappingError::DuplicateTarget {
                table: "profiles".into(),
                column: "first_name".into(),
                first: 0,
                second: 2,
            })
        );
        assert_eq!(ColumnMapping::new().validate(), Err(MappingError::Empty));
    }

    #[test]
    fn blank_form_rows_are_dropped() {
        let entries = vec![
            MappingEntry { header_index: 0, table: "profiles".into(), column: "first_name".into() },
            MappingEntry { header_index: 1, table: "".into(), column: "".into() },
            MappingEntry { header_index: 2, table: "transactions".into(), column: " ".into() },
        ];
        let mapping = ColumnMapping::from_entries(&entries);
        assert_eq!(mapping.len(), 1);
        assert_eq!(mapping.target_tables(), vec!["profiles".to_string()]);
    }

    #[test]
    fn resolve_rejects_tables_outside_allow_list() {
        let mut mapping = ColumnMapping::new();
        mapping.insert(0, "users", "email");
        let err = mapping.resolve(&TableCatalog::from_entities()).unwrap_err();
        assert!(matches!(err, ImportError::TableNotAllowed(table) if table == "users"));
    }

    #[test]
    fn resolve_rejects_system_columns() {
        let mut mapping = ColumnMapping::new();
        mapping.insert(0, "profiles", "beneficiary_id");
        let err = mapping.resolve(&TableCatalog::from_entities()).unwrap_err();
        assert!(matches!(err, ImportError::UnknownColumn { .. }));
    }

    #[test]
    fn dual_name_mode_requires_names_on_both_sides() {
        let catalog = TableCatalog::from_entities();

        let mut mapping = ColumnMapping::new();
        mapping.insert(0, "beneficiaries", "last_name");
        mapping.insert(1, "profiles", "first_name");
        assert!(mapping.resolve(&catalog).unwrap().dual_name_mode());

        let mut mapping = ColumnMapping::new();
        mapping.insert(0, "beneficiaries", "first_name");
        mapping.insert(1, "profiles", "middle_name");
        mapping.insert(2, "profiles", "sex");
        assert!(!mapping.resolve(&catalog).unwrap().dual_name_mode());
    }

    #[test]
    fn mapping_without_name_columns_is_never_dual() {
        let catalog = TableCatalog::from_entities();
        let mut mapping = ColumnMapping::new();
        mapping.insert(0, "beneficiaries", "sex");
        mapping.insert(1, "profiles", "sex");
        mapping.insert(2, "transactions", "assistance_amount");
        assert!(!mapping.resolve(&catalog).unwrap().dual_name_mode());
    }
}
