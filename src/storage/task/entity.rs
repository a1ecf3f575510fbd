use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Flat row shape of a task. Input and output variants are spread over
/// nullable columns; `mapping` turns a row back into a checked `Task`.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tasks")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub owner_id: Option<String>,
    pub task_type: String,
    pub status: String,
    pub input_text: Option<String>,
    pub input_url: Option<String>,
    pub language: Option<String>,
    pub voice: Option<String>,
    pub output_url: Option<String>,
    /// `kind` of the stored output, "audio" or "transcript".
    pub output_kind: Option<String>,
    pub transcript_text: Option<String>,
    pub transcript_json: Option<String>,
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
