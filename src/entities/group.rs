use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "groups")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub name: String,
    pub display_name: String,
    #[sea_orm(unique)]
    pub number: i32,
    pub managed_by: Option<String>,
    pub capabilities: String, // JSON array of capability names
    pub expansions: String,   // JSON array of expansion rules
    pub untyped_meta: String, // JSON array of "key:value" strings
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
