//! SeaORM Entity for survey_responses table

use crate::responses::AnswerMap;
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "survey_responses")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub survey_id: i32,
    /// None for anonymous responses.
    pub respondent_id: Option<String>,
    pub is_anonymous: bool,
    /// JSON object of question id to answer. Keys are not checked against
    /// the survey's questions.
    #[sea_orm(column_type = "Text")]
    pub answers: String,
    pub submitted_at: DateTime,
}

impl Model {
    /// Decode the stored answer mapping.
    pub fn answer_map(&self) -> Result<AnswerMap, serde_json::Error> {
        serde_json::from_str(&self.answers)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::surveys::Entity",
        from = "Column::SurveyId",
        to = "super::surveys::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Survey,
}

impl Related<super::surveys::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Survey.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
