use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use chrono::{DateTime, NaiveDate, Utc};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub import_id: i32,
    pub profile_id: Option<i32>,
    pub beneficiary_id: Option<i32>,
    pub entered_by: Option<String>,
    pub assistance_type: Option<String>,
    pub assistance_mode: Option<String>,
    pub assistance_amount: Option<String>,
    pub status: Option<String>,
    pub remarks: Option<String>,
    pub completed_at: Option<NaiveDate>,
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
        belongs_to = "super::profiles::Entity",
        from = "Column::ProfileId",
        to = "super::profiles::Column::Id",
        on_delete = "SetNull"
    )]
    Profiles,
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

impl Related<super::profiles::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Profiles.def()
    }
}

impl Related<super::beneficiaries::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Beneficiaries.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
