//! Survey responses: submission, retrieval and aggregated results.

pub mod export;
pub mod results;

pub use export::{ExportFormat, SurveyExport};
pub use results::SurveyResults;

use crate::cache;
use crate::error::{ApiError, ApiResult};
use crate::orm::surveys::SurveyStatus;
use crate::orm::{survey_responses, surveys};
use crate::surveys::{self as survey_service, SurveyDetail};
use chrono::{NaiveDateTime, Utc};
use sea_orm::{
    entity::*, query::*, ActiveValue::Set, DatabaseConnection, PaginatorTrait, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A single answer: one token, several tokens, or nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Answer {
    Unanswered,
    Integer(i64),
    Decimal(f64),
    Text(String),
    Choices(Vec<String>),
}

/// Question id (as a string key) to answer.
pub type AnswerMap = BTreeMap<String, Answer>;

impl Answer {
    pub fn is_blank(&self) -> bool {
        match self {
            Answer::Unanswered => true,
            Answer::Text(s) => s.trim().is_empty(),
            Answer::Choices(c) => c.is_empty(),
            Answer::Integer(_) | Answer::Decimal(_) => false,
        }
    }

    /// Every token carried by the answer, as strings.
    pub fn tokens(&self) -> Vec<String> {
        match self {
            Answer::Unanswered => Vec::new(),
            Answer::Integer(n) => vec![n.to_string()],
            Answer::Decimal(f) => vec![f.to_string()],
            Answer::Text(s) => vec![s.clone()],
            Answer::Choices(c) => c.clone(),
        }
    }

    /// Whole-number reading of the answer, if it has one.
    pub fn as_rating(&self) -> Option<i64> {
        match self {
            Answer::Integer(n) => Some(*n),
            Answer::Decimal(f) if f.is_finite() && f.fract() == 0.0 => Some(*f as i64),
            Answer::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<String> {
        if self.is_blank() {
            return None;
        }
        match self {
            Answer::Text(s) => Some(s.clone()),
            Answer::Choices(c) => Some(c.join(", ")),
            other => other.tokens().into_iter().next(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewResponse {
    #[serde(default)]
    pub answers: AnswerMap,
    /// Submit without recording the respondent. Only for surveys that allow it.
    #[serde(default)]
    pub is_anonymous: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseView {
    pub id: i32,
    pub survey_id: i32,
    pub respondent_id: Option<String>,
    pub is_anonymous: bool,
    pub answers: AnswerMap,
    pub submitted_at: NaiveDateTime,
}

impl TryFrom<survey_responses::Model> for ResponseView {
    type Error = ApiError;

    fn try_from(model: survey_responses::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            answers: model.answer_map()?,
            id: model.id,
            survey_id: model.survey_id,
            respondent_id: model.respondent_id,
            is_anonymous: model.is_anonymous,
            submitted_at: model.submitted_at,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SurveyBrief {
    pub id: i32,
    pub title: String,
    pub description: Option<String>,
    pub status: SurveyStatus,
}

impl From<surveys::Model> for SurveyBrief {
    fn from(s: surveys::Model) -> Self {
        Self {
            id: s.id,
            title: s.title,
            description: s.description,
            status: s.status,
        }
    }
}

/// A response of the caller together with the survey it answers.
#[derive(Debug, Clone, Serialize)]
pub struct MyResponse {
    #[serde(flatten)]
    pub response: ResponseView,
    pub survey: Option<SurveyBrief>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SurveyResponses {
    pub survey: SurveyDetail,
    pub responses: Vec<ResponseView>,
    pub total_responses: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseStatus {
    pub has_responded: bool,
    pub response_id: Option<i32>,
    pub responded_at: Option<NaiveDateTime>,
}

async fn find_response(db: &DatabaseConnection, response_id: i32) -> ApiResult<survey_responses::Model> {
    survey_responses::Entity::find_by_id(response_id)
        .one(db)
        .await?
        .ok_or_else(|| ApiError::not_found("Response"))
}

/// Record a response to an active survey.
///
/// Answer keys are not checked against the survey's questions and repeat
/// submissions are kept. Anonymous submissions store no respondent and need
/// a survey that allows them; any other submission needs a signed-in caller.
pub async fn submit(
    db: &DatabaseConnection,
    survey_id: i32,
    respondent_id: Option<&str>,
    new: NewResponse,
) -> ApiResult<ResponseView> {
    let now = Utc::now().naive_utc();
    let txn = db.begin().await?;
    let survey = survey_service::find_survey(&txn, survey_id).await?;

    if survey.status != SurveyStatus::Active {
        return Err(ApiError::Validation("Survey is not active".to_owned()));
    }
    if survey.expires_at.map_or(false, |at| at <= now) {
        return Err(ApiError::Validation("Survey has expired".to_owned()));
    }
    if new.is_anonymous && !survey.allow_anonymous {
        return Err(ApiError::Validation(
            "This survey does not allow anonymous responses".to_owned(),
        ));
    }
    let respondent_id = match (new.is_anonymous, respondent_id) {
        (true, _) => None,
        (false, Some(id)) => Some(id.to_owned()),
        (false, None) => {
            return Err(ApiError::Unauthorized(
                "You must be logged in to submit a non-anonymous response".to_owned(),
            ))
        }
    };
    if let Some(max) = survey.max_responses {
        let received = survey_responses::Entity::find()
            .filter(survey_responses::Column::SurveyId.eq(survey_id))
            .count(&txn)
            .await?;
        if received >= max.max(0) as usize {
            return Err(ApiError::Validation(
                "Survey has reached its maximum number of responses".to_owned(),
            ));
        }
    }

    let answers = serde_json::to_string(&new.answers)?;
    let model = survey_responses::ActiveModel {
        survey_id: Set(survey_id),
        respondent_id: Set(respondent_id),
        is_anonymous: Set(new.is_anonymous),
        answers: Set(answers),
        submitted_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;
    cache::invalidate_results(survey_id);
    log::info!(
        "Response {} submitted to survey {} by {}",
        model.id,
        survey_id,
        model.respondent_id.as_deref().unwrap_or("anonymous")
    );

    ResponseView::try_from(model)
}

/// Responses submitted by `respondent_id`, newest first.
pub async fn list_mine(db: &DatabaseConnection, respondent_id: &str) -> ApiResult<Vec<MyResponse>> {
    let rows = survey_responses::Entity::find()
        .filter(survey_responses::Column::RespondentId.eq(respondent_id.to_owned()))
        .order_by_desc(survey_responses::Column::SubmittedAt)
        .order_by_desc(survey_responses::Column::Id)
        .find_also_related(surveys::Entity)
        .all(db)
        .await?;

    rows.into_iter()
        .map(|(response, survey)| {
            Ok(MyResponse {
                response: ResponseView::try_from(response)?,
                survey: survey.map(SurveyBrief::from),
            })
        })
        .collect()
}

/// Every response to a survey, for its owner.
pub async fn list_for_survey(
    db: &DatabaseConnection,
    survey_id: i32,
    requester: &str,
) -> ApiResult<SurveyResponses> {
    let survey =
        survey_service::find_owned(db, survey_id, requester, "view these responses").await?;

    let responses = survey_responses::Entity::find()
        .filter(survey_responses::Column::SurveyId.eq(survey_id))
        .order_by_asc(survey_responses::Column::SubmittedAt)
        .order_by_asc(survey_responses::Column::Id)
        .all(db)
        .await?
        .into_iter()
        .map(ResponseView::try_from)
        .collect::<ApiResult<Vec<_>>>()?;

    Ok(SurveyResponses {
        survey: survey_service::detail(db, survey).await?,
        total_responses: responses.len() as u64,
        responses,
    })
}

/// A single response, visible to its respondent and the survey owner.
pub async fn get(db: &DatabaseConnection, response_id: i32, requester: &str) -> ApiResult<MyResponse> {
    let response = find_response(db, response_id).await?;
    let survey = surveys::Entity::find_by_id(response.survey_id).one(db).await?;

    let owns_survey = survey.as_ref().map_or(false, |s| s.owner_id == requester);
    if response.respondent_id.as_deref() != Some(requester) && !owns_survey {
        return Err(ApiError::forbidden("view this response"));
    }

    Ok(MyResponse {
        response: ResponseView::try_from(response)?,
        survey: survey.map(SurveyBrief::from),
    })
}

/// Delete a response. Only the owner of the survey it answers may do so.
pub async fn delete(db: &DatabaseConnection, response_id: i32, requester: &str) -> ApiResult<()> {
    let response = find_response(db, response_id).await?;
    survey_service::find_owned(db, response.survey_id, requester, "delete this response").await?;

    survey_responses::Entity::delete_by_id(response_id)
        .exec(db)
        .await?;
    cache::invalidate_results(response.survey_id);
    log::info!("Response {} deleted by {}", response_id, requester);

    Ok(())
}

/// Whether `respondent_id` has answered the survey, and their latest response.
pub async fn my_response(
    db: &DatabaseConnection,
    survey_id: i32,
    respondent_id: &str,
) -> ApiResult<ResponseStatus> {
    survey_service::find_survey(db, survey_id).await?;

    let latest = survey_responses::Entity::find()
        .filter(survey_responses::Column::SurveyId.eq(survey_id))
        .filter(survey_responses::Column::RespondentId.eq(respondent_id.to_owned()))
        .order_by_desc(survey_responses::Column::SubmittedAt)
        .order_by_desc(survey_responses::Column::Id)
        .one(db)
        .await?;

    Ok(ResponseStatus {
        has_responded: latest.is_some(),
        response_id: latest.as_ref().map(|r| r.id),
        responded_at: latest.map(|r| r.submitted_at),
    })
}

/// Aggregated results of a survey, served from cache while fresh. Follows
/// the same visibility rule as reading the survey.
pub async fn results(
    db: &DatabaseConnection,
    survey_id: i32,
    viewer: Option<&str>,
) -> ApiResult<Arc<SurveyResults>> {
    let survey = survey_service::find_survey(db, survey_id).await?;
    survey_service::ensure_visible(&survey, viewer)?;

    if let Some(cached) = cache::get_results(survey_id) {
        return Ok(cached);
    }
    let questions = survey_service::load_questions(db, survey_id).await?;

    let answer_maps = survey_responses::Entity::find()
        .filter(survey_responses::Column::SurveyId.eq(survey_id))
        .order_by_asc(survey_responses::Column::SubmittedAt)
        .order_by_asc(survey_responses::Column::Id)
        .all(db)
        .await?
        .iter()
        .map(|r| r.answer_map().map_err(ApiError::from))
        .collect::<ApiResult<Vec<_>>>()?;

    let computed = Arc::new(results::aggregate(
        survey.id,
        &survey.title,
        &questions,
        &answer_maps,
        Utc::now().naive_utc(),
    ));
    cache::put_results(survey_id, computed.clone());

    Ok(computed)
}
