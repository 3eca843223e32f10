use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use chrono::{DateTime, NaiveDate, Utc};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "profiles")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub import_id: i32,
    pub beneficiary_id: Option<i32>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub middle_name: Option<String>,
    pub extension_name: Option<String>,
    pub birthday: Option<NaiveDate>,
    pub sex: Option<String>,
    pub civil_status: Option<String>,
    pub contact_number: Option<String>,
    pub occupation: Option<String>,
    pub category: Option<String>,
    pub region: Option<String>,
    pub province: Option<String>,
    pub city: Option<String>,
    pub barangay: Option<String>,
    #[sea_orm(column_type = "TimestampWithTimeZone")]
    pub created_at: DateTime<Utc>,
    #[sea_orm(column_type = "TimestampWithTimeZone")]
    pub updated_at: DateTime<Utc>,
    #[sea_orm(column_type = "TimestampWithTimeZone", nullable)]
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::imports::Entity",
        from = "Column::ImportId",
        to = "super::imports::Column::Id",
        on_delete = "Cascade"
    )]
    Imports,
    #[sea_orm(
        belongs_to = "super::beneficiaries::Entity",
        from = "Column::BeneficiaryId",
        to = "super::beneficiaries::Column::Id",
        on_delete = "SetNull"
    )]
    Beneficiaries,
}

impl Related<super::imports::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Imports.def()
    }
}

impl Related<super::beneficiaries::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Beneficiaries.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
