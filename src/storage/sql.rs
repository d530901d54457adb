use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::{Expr, LikeExpr, OnConflict};
use sea_orm::{
    Database, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};

use crate::entities::{group, principal};
use crate::settings::Database as DbCfg;
use crate::storage::{SearchRequest, Storage, StorageError};
use crate::types::{Entity, EntityMeta, Group};

/// Storage backed by a relational database through sea-orm.
///
/// List-valued fields are stored as JSON text. Saves are single-row upserts,
/// which the database serializes per primary key.
#[derive(Debug, Clone)]
pub struct SqlStorage {
    db: DatabaseConnection,
}

impl SqlStorage {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn connect(cfg: &DbCfg) -> Result<Self, StorageError> {
        let db = Database::connect(&cfg.url).await?;
        Ok(Self { db })
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

/// `LIKE` pattern for a literal substring. The database comparison may be
/// case-insensitive, so callers still filter with [`SearchRequest::matches`].
fn contains_pattern(expression: &str) -> LikeExpr {
    let mut pattern = String::with_capacity(expression.len() + 2);
    pattern.push('%');
    for c in expression.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    LikeExpr::new(pattern).escape('\\')
}

fn entity_from_model(model: principal::Model) -> Result<Entity, StorageError> {
    let meta: EntityMeta = serde_json::from_str(&model.meta)?;
    Ok(Entity {
        id: model.id,
        number: model.number,
        secret: model.secret,
        meta,
    })
}

fn group_from_model(model: group::Model) -> Result<Group, StorageError> {
    Ok(Group {
        name: model.name,
        display_name: model.display_name,
        number: model.number,
        managed_by: model.managed_by,
        capabilities: serde_json::from_str(&model.capabilities)?,
        expansions: serde_json::from_str(&model.expansions)?,
        untyped_meta: serde_json::from_str(&model.untyped_meta)?,
    })
}

#[async_trait]
impl Storage for SqlStorage {
    async fn discover_entity_ids(&self) -> Result<Vec<String>, StorageError> {
        use principal::{Column, Entity as Row};

        let rows = Row::find().order_by_asc(Column::Id).all(&self.db).await?;
        Ok(rows.into_iter().map(|m| m.id).collect())
    }

    async fn load_entity(&self, id: &str) -> Result<Entity, StorageError> {
        use principal::Entity as Row;

        match Row::find_by_id(id.to_string()).one(&self.db).await? {
            Some(model) => entity_from_model(model),
            None => Err(StorageError::NotFound(format!("entity `{id}`"))),
        }
    }

    async fn save_entity(&self, entity: &Entity) -> Result<(), StorageError> {
        use principal::{Column, Entity as Row};

        let now = Utc::now().timestamp();
        let row = principal::ActiveModel {
            id: Set(entity.id.clone()),
            number: Set(entity.number),
            secret: Set(entity.secret.clone()),
            meta: Set(serde_json::to_string(&entity.meta)?),
            created_at: Set(now),
            updated_at: Set(now),
        };

        Row::insert(row)
            .on_conflict(
                OnConflict::column(Column::Id)
                    .update_columns([
                        Column::Number,
                        Column::Secret,
                        Column::Meta,
                        Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec(&self.db)
            .await?;

        Ok(())
    }

    async fn delete_entity(&self, id: &str) -> Result<(), StorageError> {
        use principal::Entity as Row;

        let res = Row::delete_by_id(id.to_string()).exec(&self.db).await?;
        if res.rows_affected == 0 {
            return Err(StorageError::NotFound(format!("entity `{id}`")));
        }
        Ok(())
    }

    async fn next_entity_number(&self) -> Result<i32, StorageError> {
        use principal::{Column, Entity as Row};

        let highest = Row::find()
            .order_by_desc(Column::Number)
            .one(&self.db)
            .await?
            .map(|m| m.number)
            .unwrap_or(0);
        Ok(highest.max(0) + 1)
    }

    async fn search_entities(&self, req: &SearchRequest) -> Result<Vec<Entity>, StorageError> {
        use principal::{Column, Entity as Row};

        Row::find()
            .filter(Expr::col(Column::Id).like(contains_pattern(&req.expression)))
            .order_by_asc(Column::Id)
            .all(&self.db)
            .await?
            .into_iter()
            .filter(|m| req.matches(&m.id))
            .map(entity_from_model)
            .collect()
    }

    async fn discover_group_names(&self) -> Result<Vec<String>, StorageError> {
        use group::{Column, Entity as Row};

        let rows = Row::find().order_by_asc(Column::Name).all(&self.db).await?;
        Ok(rows.into_iter().map(|m| m.name).collect())
    }

    async fn load_group(&self, name: &str) -> Result<Group, StorageError> {
        use group::Entity as Row;

        match Row::find_by_id(name.to_string()).one(&self.db).await? {
            Some(model) => group_from_model(model),
            None => Err(StorageError::NotFound(format!("group `{name}`"))),
        }
    }

    async fn save_group(&self, group: &Group) -> Result<(), StorageError> {
        use group::{Column, Entity as Row};

        let now = Utc::now().timestamp();
        let row = group::ActiveModel {
            name: Set(group.name.clone()),
            display_name: Set(group.display_name.clone()),
            number: Set(group.number),
            managed_by: Set(group.managed_by.clone()),
            capabilities: Set(serde_json::to_string(&group.capabilities)?),
            expansions: Set(serde_json::to_string(&group.expansions)?),
            untyped_meta: Set(serde_json::to_string(&group.untyped_meta)?),
            created_at: Set(now),
            updated_at: Set(now),
        };

        Row::insert(row)
            .on_conflict(
                OnConflict::column(Column::Name)
                    .update_columns([
                        Column::DisplayName,
                        Column::Number,
                        Column::ManagedBy,
                        Column::Capabilities,
                        Column::Expansions,
                        Column::UntypedMeta,
                        Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec(&self.db)
            .await?;

        Ok(())
    }

    async fn delete_group(&self, name: &str) -> Result<(), StorageError> {
        use group::Entity as Row;

        let res = Row::delete_by_id(name.to_string()).exec(&self.db).await?;
        if res.rows_affected == 0 {
            return Err(StorageError::NotFound(format!("group `{name}`")));
        }
        Ok(())
    }

    async fn next_group_number(&self) -> Result<i32, StorageError> {
        use group::{Column, Entity as Row};

        let highest = Row::find()
            .order_by_desc(Column::Number)
            .one(&self.db)
            .await?
            .map(|m| m.number)
            .unwrap_or(0);
        Ok(highest.max(0) + 1)
    }

    async fn search_groups(&self, req: &SearchRequest) -> Result<Vec<Group>, StorageError> {
        use group::{Column, Entity as Row};

        Row::find()
            .filter(Expr::col(Column::Name).like(contains_pattern(&req.expression)))
            .order_by_asc(Column::Name)
            .all(&self.db)
            .await?
            .into_iter()
            .filter(|m| req.matches(&m.name))
            .map(group_from_model)
            .collect()
    }
}
