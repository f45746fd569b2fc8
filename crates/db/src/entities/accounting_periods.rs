//! `SeaORM` Entity for accounting_periods table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "accounting_periods")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub start_date: Date,
    #[sea_orm(unique)]
    pub end_date: Date,
    pub status: String,
    #[sea_orm(column_type = "Decimal(Some((20, 4)))")]
    pub total_revenue: Decimal,
    #[sea_orm(column_type = "Decimal(Some((20, 4)))")]
    pub total_expense: Decimal,
    #[sea_orm(column_type = "Decimal(Some((20, 4)))")]
    pub net_income: Decimal,
    pub closing_entry_id: Option<Uuid>,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    pub closed_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::journal_entries::Entity",
        from = "Column::ClosingEntryId",
        to = "super::journal_entries::Column::Id"
    )]
    ClosingEntry,
}

impl Related<super::journal_entries::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ClosingEntry.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
