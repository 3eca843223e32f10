//! Turns one spreadsheet row into beneficiary, profile and transaction inserts.

use crate::catalog::{ImportTable, NAME_COLUMNS};
use crate::coerce::{coerce_date, coerce_sex};
use crate::mapping::TableMap;
use crate::models::entity::{beneficiaries, profiles, transactions};
use crate::models::ImportStats;
use crate::spreadsheet::cell;
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{ActiveModelTrait, ConnectionTrait, DbErr, EntityTrait, Set, Value};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::debug;

/// Columns stored as calendar dates.
const DATE_COLUMNS: &[&str] = &["birthday", "completed_at"];

pub const SELF_RELATIONSHIP: &str = "Self";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Date(NaiveDate),
}

impl FieldValue {
    fn to_db_value(&self) -> Value {
        match self {
            FieldValue::Text(text) => text.clone().into(),
            FieldValue::Date(date) => (*date).into(),
        }
    }

    fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            FieldValue::Date(_) => None,
        }
    }
}

/// Values one row contributes to one table. Empty and uncoercible cells are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableRecord {
    fields: BTreeMap<String, FieldValue>,
}

impl TableRecord {
    pub fn build(row: &[String], columns: &[(usize, String)]) -> Self {
        let mut fields = BTreeMap::new();
        for (index, column) in columns {
            if let Some(value) = coerce_field(column, cell(row, *index)) {
                fields.insert(column.clone(), value);
            }
        }
        Self { fields }
    }

    pub fn has_data(&self) -> bool {
        !self.fields.is_empty()
    }

    /// A non-empty first or last name.
    pub fn has_name(&self) -> bool {
        self.text("first_name").is_some() || self.text("last_name").is_some()
    }

    pub fn has_non_name_data(&self) -> bool {
        self.fields
            .keys()
            .any(|column| !NAME_COLUMNS.contains(&column.as_str()))
    }

    pub fn text(&self, column: &str) -> Option<&str> {
        self.fields.get(column).and_then(FieldValue::as_text)
    }

    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.fields.get(column)
    }

    pub fn set_text(&mut self, column: &str, value: &str) {
        self.fields
            .insert(column.to_string(), FieldValue::Text(value.to_string()));
    }

    /// Copies the name fields of `other` wherever this record has none.
    pub fn fill_names_from(&mut self, other: &TableRecord) {
        for column in NAME_COLUMNS {
            if self.text(column).is_none() {
                if let Some(value) = other.text(column) {
                    self.set_text(column, value);
                }
            }
        }
    }

    fn fields(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.fields.iter()
    }
}

fn coerce_field(column: &str, raw: &str) -> Option<FieldValue> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }
    if DATE_COLUMNS.contains(&column) {
        return coerce_date(value).map(FieldValue::Date);
    }
    if column == "sex" {
        return coerce_sex(value).map(|sex| FieldValue::Text(sex.as_str().to_string()));
    }
    Some(FieldValue::Text(value.to_string()))
}

/// The per-table records of one row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowRecords {
    pub beneficiary: Option<TableRecord>,
    pub profile: Option<TableRecord>,
    pub transaction: Option<TableRecord>,
}

impl RowRecords {
    pub fn build(row: &[String], table_map: &TableMap) -> Self {
        let record = |table| table_map.group(table).map(|columns| TableRecord::build(row, columns));
        Self {
            beneficiary: record(ImportTable::Beneficiaries),
            profile: record(ImportTable::Profiles),
            transaction: record(ImportTable::Transactions),
        }
    }

    fn transaction_with_data(&self) -> Option<&TableRecord> {
        self.transaction.as_ref().filter(|record| record.has_data())
    }
}

/// Which side of a dual-name row carries a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DualNameBranch {
    Both,
    BeneficiaryOnly,
    ProfileOnly,
    Neither,
}

impl DualNameBranch {
    pub fn classify(records: &RowRecords) -> Self {
        let has_name = |record: &Option<TableRecord>| record.as_ref().is_some_and(TableRecord::has_name);
        match (has_name(&records.beneficiary), has_name(&records.profile)) {
            (true, true) => DualNameBranch::Both,
            (true, false) => DualNameBranch::BeneficiaryOnly,
            (false, true) => DualNameBranch::ProfileOnly,
            (false, false) => DualNameBranch::Neither,
        }
    }
}

/// Ids generated for one row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowOutcome {
    pub beneficiary_id: Option<i32>,
    pub profile_id: Option<i32>,
    pub transaction_id: Option<i32>,
    pub skipped: bool,
}

impl RowOutcome {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

pub struct RowMaterializer<'a> {
    table_map: &'a TableMap,
    import_id: i32,
}

impl<'a> RowMaterializer<'a> {
    pub fn new(table_map: &'a TableMap, import_id: i32) -> Self {
        Self {
            table_map,
            import_id,
        }
    }

    /// Inserts whatever the row describes and updates `stats`.
    pub async fn materialize<C>(
        &self,
        conn: &C,
        row: &[String],
        stats: &mut ImportStats,
    ) -> Result<RowOutcome, DbErr>
    where
        C: ConnectionTrait,
    {
        let records = RowRecords::build(row, self.table_map);
        let now = Utc::now();

        let outcome = if self.table_map.dual_name_mode() {
            self.materialize_dual(conn, records, now, stats).await?
        } else {
            self.materialize_standard(conn, records, now, stats).await?
        };

        if outcome.skipped {
            stats.skipped_rows += 1;
        }
        Ok(outcome)
    }

    async fn materialize_dual<C>(
        &self,
        conn: &C,
        records: RowRecords,
        now: DateTime<Utc>,
        stats: &mut ImportStats,
    ) -> Result<RowOutcome, DbErr>
    where
        C: ConnectionTrait,
    {
        let branch = DualNameBranch::classify(&records);
        debug!("Dual-name row branch: {:?}", branch);

        let mut outcome = RowOutcome::default();
        let mut beneficiary = records.beneficiary.clone().unwrap_or_default();
        let profile = records.profile.clone().unwrap_or_default();

        match branch {
            DualNameBranch::Both => {
                let beneficiary_id = self.insert_beneficiary(conn, &beneficiary, now).await?;
                stats.beneficiaries_imported += 1;
                let profile_id = self
                    .insert_profile(conn, &profile, Some(beneficiary_id), now)
                    .await?;
                stats.profiles_imported += 1;
                outcome.beneficiary_id = Some(beneficiary_id);
                outcome.profile_id = Some(profile_id);
            }
            DualNameBranch::BeneficiaryOnly => {
                beneficiary.set_text("relationship", SELF_RELATIONSHIP);
                let beneficiary_id = self.insert_beneficiary(conn, &beneficiary, now).await?;
                stats.beneficiaries_imported += 1;
                outcome.beneficiary_id = Some(beneficiary_id);

                if profile.has_non_name_data() {
                    let profile_id = self
                        .insert_profile(conn, &profile, Some(beneficiary_id), now)
                        .await?;
                    stats.profiles_imported += 1;
                    outcome.profile_id = Some(profile_id);
                }
            }
            DualNameBranch::ProfileOnly => {
                beneficiary.fill_names_from(&profile);
                beneficiary.set_text("relationship", SELF_RELATIONSHIP);
                let beneficiary_id = self.insert_beneficiary(conn, &beneficiary, now).await?;
                stats.beneficiaries_imported += 1;
                let profile_id = self
                    .insert_profile(conn, &profile, Some(beneficiary_id), now)
                    .await?;
                stats.profiles_imported += 1;
                outcome.beneficiary_id = Some(beneficiary_id);
                outcome.profile_id = Some(profile_id);
            }
            DualNameBranch::Neither => return Ok(RowOutcome::skipped()),
        }

        if let Some(transaction) = records.transaction_with_data() {
            let transaction_id = self
                .insert_transaction(conn, transaction, outcome.profile_id, outcome.beneficiary_id, now)
                .await?;
            stats.transactions_imported += 1;
            outcome.transaction_id = Some(transaction_id);
        }

        Ok(outcome)
    }

    /// Each table is inserted independently; profiles are not linked to beneficiaries.
    async fn materialize_standard<C>(
        &self,
        conn: &C,
        records: RowRecords,
        now: DateTime<Utc>,
        stats: &mut ImportStats,
    ) -> Result<RowOutcome, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut outcome = RowOutcome::default();

        if let Some(beneficiary) = records.beneficiary.as_ref().filter(|r| r.has_data()) {
            outcome.beneficiary_id = Some(self.insert_beneficiary(conn, beneficiary, now).await?);
            stats.beneficiaries_imported += 1;
        }

        if let Some(profile) = records.profile.as_ref().filter(|r| r.has_data()) {
            outcome.profile_id = Some(self.insert_profile(conn, profile, None, now).await?);
            stats.profiles_imported += 1;
        }

        if let Some(transaction) = records.transaction_with_data() {
            let transaction_id = self
                .insert_transaction(conn, transaction, outcome.profile_id, outcome.beneficiary_id, now)
                .await?;
            outcome.transaction_id = Some(transaction_id);
            stats.transactions_imported += 1;
        }

        if outcome == RowOutcome::default() {
            return Ok(RowOutcome::skipped());
        }
        Ok(outcome)
    }

    async fn insert_beneficiary<C>(
        &self,
        conn: &C,
        record: &TableRecord,
        now: DateTime<Utc>,
    ) -> Result<i32, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut model = beneficiaries::ActiveModel {
            import_id: Set(self.import_id),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        apply_fields(&mut model, record)?;
        Ok(model.insert(conn).await?.id)
    }

    async fn insert_profile<C>(
        &self,
        conn: &C,
        record: &TableRecord,
        beneficiary_id: Option<i32>,
        now: DateTime<Utc>,
    ) -> Result<i32, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut model = profiles::ActiveModel {
            import_id: Set(self.import_id),
            beneficiary_id: Set(beneficiary_id),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        apply_fields(&mut model, record)?;
        Ok(model.insert(conn).await?.id)
    }

    async fn insert_transaction<C>(
        &self,
        conn: &C,
        record: &TableRecord,
        profile_id: Option<i32>,
        beneficiary_id: Option<i32>,
        now: DateTime<Utc>,
    ) -> Result<i32, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut model = transactions::ActiveModel {
            import_id: Set(self.import_id),
            profile_id: Set(profile_id),
            beneficiary_id: Set(beneficiary_id),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        apply_fields(&mut model, record)?;
        Ok(model.insert(conn).await?.id)
    }
}

fn apply_fields<A>(model: &mut A, record: &TableRecord) -> Result<(), DbErr>
where
    A: ActiveModelTrait,
{
    for (name, value) in record.fields() {
        let column = <A::Entity as EntityTrait>::Column::from_str(name)
            .map_err(|_| DbErr::Custom(format!("Unknown column {}", name)))?;
        model.set(column, value.to_db_value());
    }
    Ok(())
}
