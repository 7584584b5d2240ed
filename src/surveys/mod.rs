//! Survey service: survey/question/option trees and their ownership rules.

use crate::cache;
use crate::constants::{
    DASHBOARD_RECENT_COUNT, DEFAULT_PAGE_SIZE, DEFAULT_RATING_MAX, DEFAULT_RATING_MIN,
    MAX_PAGE_SIZE, MAX_RATING_SPAN,
};
use crate::error::{ApiError, ApiResult};
use crate::images::{self, ImageView};
use crate::orm::questions::QuestionType;
use crate::orm::surveys::SurveyStatus;
use crate::orm::{question_options, questions, survey_images, survey_responses, surveys};
use crate::storage::StorageBackend;
use chrono::{DateTime, NaiveDateTime, Utc};
use sea_orm::{
    entity::*, query::*, sea_query::Expr, ActiveValue::Set, Condition, ConnectionTrait,
    DatabaseConnection, FromQueryResult, PaginatorTrait, TransactionTrait,
};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::ops::RangeInclusive;
use validator::{Validate, ValidationError};

// =============================================================================
// Input
// =============================================================================

/// Tells an absent field (`None`) from an explicit `null` (`Some(None)`).
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewOption {
    #[serde(alias = "text")]
    #[validate(length(min = 1, max = 255))]
    pub label: String,
    #[validate(length(min = 1, max = 255))]
    pub value: String,
    #[serde(default)]
    pub order: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[validate(schema(function = "validate_rating_range"))]
pub struct NewQuestion {
    #[serde(rename = "type", alias = "question_type", default)]
    pub question_type: QuestionType,
    #[serde(alias = "question_text")]
    #[validate(length(min = 1))]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "is_required")]
    pub required: bool,
    /// Display position. Defaults to the index in the submitted list.
    #[serde(default, alias = "order_number")]
    pub order: Option<i32>,
    #[serde(default)]
    pub placeholder: Option<String>,
    #[serde(default)]
    pub min_value: Option<i32>,
    #[serde(default)]
    pub max_value: Option<i32>,
    #[serde(default)]
    pub options: Vec<NewOption>,
}

/// Rating scale of a question with the default bounds filled in. None when
/// the bounds are inverted or span more than `MAX_RATING_SPAN`.
pub fn rating_scale(min: Option<i32>, max: Option<i32>) -> Option<RangeInclusive<i64>> {
    let min = i64::from(min.unwrap_or(DEFAULT_RATING_MIN));
    let max = i64::from(max.unwrap_or(DEFAULT_RATING_MAX));
    (min <= max && max - min <= MAX_RATING_SPAN).then(|| min..=max)
}

fn validate_rating_range(q: &NewQuestion) -> Result<(), ValidationError> {
    check_range(q.question_type, q.min_value, q.max_value)
}

fn check_range(
    question_type: QuestionType,
    min: Option<i32>,
    max: Option<i32>,
) -> Result<(), ValidationError> {
    if let (Some(min), Some(max)) = (min, max) {
        if min > max {
            return Err(ValidationError::new("min_value_exceeds_max"));
        }
    }
    if question_type == QuestionType::Rating && rating_scale(min, max).is_none() {
        return Err(ValidationError::new("rating_scale_out_of_bounds"));
    }
    Ok(())
}

impl NewQuestion {
    fn validate_tree(&self) -> ApiResult<()> {
        self.validate()?;
        for option in &self.options {
            option.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewSurvey {
    #[validate(length(min = 1, max = 255))]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<SurveyStatus>,
    #[serde(default)]
    pub allow_anonymous: bool,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    #[validate(range(min = 1))]
    pub max_responses: Option<i32>,
    #[serde(default)]
    pub questions: Vec<NewQuestion>,
}

/// Partial survey update. Absent fields are left alone and `null` clears a
/// nullable one; `questions`, when present, replaces the whole question tree.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct SurveyChanges {
    #[validate(length(min = 1, max = 255))]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    pub status: Option<SurveyStatus>,
    pub allow_anonymous: Option<bool>,
    #[serde(default, deserialize_with = "nullable")]
    pub expires_at: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "nullable")]
    pub max_responses: Option<Option<i32>>,
    pub questions: Option<Vec<NewQuestion>>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct QuestionChanges {
    #[serde(rename = "type", alias = "question_type")]
    pub question_type: Option<QuestionType>,
    #[serde(alias = "question_text")]
    #[validate(length(min = 1))]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    #[serde(alias = "is_required")]
    pub required: Option<bool>,
    #[serde(alias = "order_number")]
    pub order: Option<i32>,
    #[serde(default, deserialize_with = "nullable")]
    pub placeholder: Option<Option<String>>,
    /// `null` resets the bound to the default scale.
    #[serde(default, deserialize_with = "nullable")]
    pub min_value: Option<Option<i32>>,
    #[serde(default, deserialize_with = "nullable")]
    pub max_value: Option<Option<i32>>,
    /// Replaces every option of the question when present.
    pub options: Option<Vec<NewOption>>,
}

fn check_max_responses(max_responses: Option<i32>) -> ApiResult<()> {
    match max_responses {
        Some(n) if n < 1 => Err(ApiError::Validation(
            "max_responses must be at least 1".to_owned(),
        )),
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, Default)]
pub struct SurveyFilter {
    pub status: Option<SurveyStatus>,
    pub creator_id: Option<String>,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}

// =============================================================================
// Output
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionView {
    pub id: i32,
    pub label: String,
    pub value: String,
    pub order: i32,
}

impl From<question_options::Model> for OptionView {
    fn from(o: question_options::Model) -> Self {
        Self {
            id: o.id,
            label: o.label,
            value: o.value,
            order: o.display_order,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionView {
    pub id: i32,
    pub survey_id: i32,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub title: String,
    pub description: Option<String>,
    pub required: bool,
    pub order: i32,
    pub placeholder: Option<String>,
    pub min_value: Option<i32>,
    pub max_value: Option<i32>,
    pub options: Vec<OptionView>,
}

impl QuestionView {
    fn new(q: questions::Model, options: Vec<question_options::Model>) -> Self {
        Self {
            id: q.id,
            survey_id: q.survey_id,
            question_type: q.question_type,
            title: q.title,
            description: q.description,
            required: q.is_required,
            order: q.display_order,
            placeholder: q.placeholder,
            min_value: q.min_value,
            max_value: q.max_value,
            options: options.into_iter().map(OptionView::from).collect(),
        }
    }
}

/// A survey with its full question tree.
#[derive(Debug, Clone, Serialize)]
pub struct SurveyDetail {
    pub id: i32,
    pub title: String,
    pub description: Option<String>,
    pub status: SurveyStatus,
    pub owner_id: String,
    pub allow_anonymous: bool,
    pub expires_at: Option<NaiveDateTime>,
    pub max_responses: Option<i32>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub questions: Vec<QuestionView>,
    pub images: Vec<ImageView>,
    pub response_count: u64,
}

/// List entry, without questions.
#[derive(Debug, Clone, Serialize)]
pub struct SurveySummary {
    pub id: i32,
    pub title: String,
    pub description: Option<String>,
    pub status: SurveyStatus,
    pub owner_id: String,
    pub allow_anonymous: bool,
    pub expires_at: Option<NaiveDateTime>,
    pub max_responses: Option<i32>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub response_count: u64,
    pub images: Vec<ImageView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecentSurvey {
    pub id: i32,
    pub title: String,
    pub status: SurveyStatus,
    pub created_at: NaiveDateTime,
    pub response_count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecentResponse {
    pub id: i32,
    pub survey_id: i32,
    pub respondent_id: Option<String>,
    pub submitted_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub total_surveys: u64,
    pub active_surveys: u64,
    /// Responses received by the user's surveys.
    pub total_responses: u64,
    /// Responses the user submitted.
    pub my_responses: u64,
    pub recent_surveys: Vec<RecentSurvey>,
    pub recent_responses: Vec<RecentResponse>,
}

// =============================================================================
// Lookups shared with the other services
// =============================================================================

pub(crate) async fn find_survey<C>(db: &C, survey_id: i32) -> ApiResult<surveys::Model>
where
    C: ConnectionTrait,
{
    surveys::Entity::find_by_id(survey_id)
        .one(db)
        .await?
        .ok_or_else(|| ApiError::not_found("Survey"))
}

pub(crate) fn ensure_owner(
    survey: &surveys::Model,
    requester: &str,
    action: &str,
) -> ApiResult<()> {
    if survey.owner_id == requester {
        Ok(())
    } else {
        Err(ApiError::forbidden(action))
    }
}

/// Active surveys are public; any other status is visible to its owner only.
pub(crate) fn ensure_visible(survey: &surveys::Model, viewer: Option<&str>) -> ApiResult<()> {
    if survey.status == SurveyStatus::Active || viewer == Some(survey.owner_id.as_str()) {
        Ok(())
    } else {
        Err(ApiError::forbidden("view this survey"))
    }
}

/// Fetch a survey the requester owns. NotFound wins over Forbidden.
pub(crate) async fn find_owned<C>(
    db: &C,
    survey_id: i32,
    requester: &str,
    action: &str,
) -> ApiResult<surveys::Model>
where
    C: ConnectionTrait,
{
    let survey = find_survey(db, survey_id).await?;
    ensure_owner(&survey, requester, action)?;
    Ok(survey)
}

/// Questions of a survey with their options, both in display order.
pub(crate) async fn load_questions<C>(db: &C, survey_id: i32) -> ApiResult<Vec<QuestionView>>
where
    C: ConnectionTrait,
{
    let question_models = questions::Entity::find()
        .filter(questions::Column::SurveyId.eq(survey_id))
        .order_by_asc(questions::Column::DisplayOrder)
        .order_by_asc(questions::Column::Id)
        .all(db)
        .await?;

    let ids: Vec<i32> = question_models.iter().map(|q| q.id).collect();
    let mut options_by_question: HashMap<i32, Vec<question_options::Model>> = HashMap::new();
    if !ids.is_empty() {
        let options = question_options::Entity::find()
            .filter(question_options::Column::QuestionId.is_in(ids))
            .order_by_asc(question_options::Column::DisplayOrder)
            .order_by_asc(question_options::Column::Id)
            .all(db)
            .await?;
        for option in options {
            options_by_question
                .entry(option.question_id)
                .or_default()
                .push(option);
        }
    }

    Ok(question_models
        .into_iter()
        .map(|q| {
            let options = options_by_question.remove(&q.id).unwrap_or_default();
            QuestionView::new(q, options)
        })
        .collect())
}

#[derive(Debug, FromQueryResult)]
struct SurveyCount {
    survey_id: i32,
    count: i64,
}

/// Number of responses per survey id. Surveys without responses are absent.
pub(crate) async fn response_counts<C>(db: &C, survey_ids: &[i32]) -> ApiResult<HashMap<i32, u64>>
where
    C: ConnectionTrait,
{
    if survey_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows = survey_responses::Entity::find()
        .select_only()
        .column(survey_responses::Column::SurveyId)
        .column_as(Expr::col(survey_responses::Column::Id).count(), "count")
        .filter(survey_responses::Column::SurveyId.is_in(survey_ids.to_vec()))
        .group_by(survey_responses::Column::SurveyId)
        .into_model::<SurveyCount>()
        .all(db)
        .await?;

    Ok(rows
        .into_iter()
        .map(|r| (r.survey_id, r.count.max(0) as u64))
        .collect())
}

async fn insert_options<C>(db: &C, question_id: i32, options: &[NewOption]) -> ApiResult<()>
where
    C: ConnectionTrait,
{
    for (index, option) in options.iter().enumerate() {
        question_options::ActiveModel {
            question_id: Set(question_id),
            label: Set(option.label.clone()),
            value: Set(option.value.clone()),
            display_order: Set(option.order.unwrap_or(index as i32)),
            ..Default::default()
        }
        .insert(db)
        .await?;
    }
    Ok(())
}

async fn insert_question<C>(
    db: &C,
    survey_id: i32,
    question: &NewQuestion,
    default_order: i32,
) -> ApiResult<questions::Model>
where
    C: ConnectionTrait,
{
    let model = questions::ActiveModel {
        survey_id: Set(survey_id),
        question_type: Set(question.question_type),
        title: Set(question.title.clone()),
        description: Set(question.description.clone()),
        is_required: Set(question.required),
        display_order: Set(question.order.unwrap_or(default_order)),
        placeholder: Set(question.placeholder.clone()),
        min_value: Set(question.min_value),
        max_value: Set(question.max_value),
        ..Default::default()
    }
    .insert(db)
    .await?;

    insert_options(db, model.id, &question.options).await?;
    Ok(model)
}

async fn delete_question_tree<C>(db: &C, survey_id: i32) -> ApiResult<()>
where
    C: ConnectionTrait,
{
    let question_ids: Vec<i32> = questions::Entity::find()
        .filter(questions::Column::SurveyId.eq(survey_id))
        .all(db)
        .await?
        .into_iter()
        .map(|q| q.id)
        .collect();

    if !question_ids.is_empty() {
        question_options::Entity::delete_many()
            .filter(question_options::Column::QuestionId.is_in(question_ids))
            .exec(db)
            .await?;
    }

    questions::Entity::delete_many()
        .filter(questions::Column::SurveyId.eq(survey_id))
        .exec(db)
        .await?;

    Ok(())
}

async fn touch<C>(db: &C, survey: surveys::Model) -> ApiResult<surveys::Model>
where
    C: ConnectionTrait,
{
    let mut active: surveys::ActiveModel = survey.into();
    active.updated_at = Set(Utc::now().naive_utc());
    Ok(active.update(db).await?)
}

// =============================================================================
// Survey operations
// =============================================================================

/// Create a survey and its question tree in one transaction.
pub async fn create(
    db: &DatabaseConnection,
    owner_id: &str,
    new: NewSurvey,
) -> ApiResult<SurveyDetail> {
    new.validate()?;
    for question in &new.questions {
        question.validate_tree()?;
    }

    let now = Utc::now().naive_utc();
    let txn = db.begin().await?;

    let survey = surveys::ActiveModel {
        title: Set(new.title),
        description: Set(new.description),
        status: Set(new.status.unwrap_or_default()),
        owner_id: Set(owner_id.to_owned()),
        allow_anonymous: Set(new.allow_anonymous),
        expires_at: Set(new.expires_at.map(|t| t.naive_utc())),
        max_responses: Set(new.max_responses),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    for (index, question) in new.questions.iter().enumerate() {
        insert_question(&txn, survey.id, question, index as i32).await?;
    }

    txn.commit().await?;
    log::info!(
        "Survey {} created by {} with {} question(s)",
        survey.id,
        owner_id,
        new.questions.len()
    );

    detail(db, survey).await
}

async fn summarize(
    db: &DatabaseConnection,
    models: Vec<surveys::Model>,
) -> ApiResult<Vec<SurveySummary>> {
    let ids: Vec<i32> = models.iter().map(|s| s.id).collect();
    let counts = response_counts(db, &ids).await?;
    let mut images = images::views_for_surveys(db, &ids).await?;

    Ok(models
        .into_iter()
        .map(|s| SurveySummary {
            response_count: counts.get(&s.id).copied().unwrap_or(0),
            images: images.remove(&s.id).unwrap_or_default(),
            id: s.id,
            title: s.title,
            description: s.description,
            status: s.status,
            owner_id: s.owner_id,
            allow_anonymous: s.allow_anonymous,
            expires_at: s.expires_at,
            max_responses: s.max_responses,
            created_at: s.created_at,
            updated_at: s.updated_at,
        })
        .collect())
}

/// List surveys visible to `viewer`, newest first. Anonymous callers see
/// active surveys only; signed-in callers also see their own.
pub async fn list(
    db: &DatabaseConnection,
    filter: &SurveyFilter,
    viewer: Option<&str>,
) -> ApiResult<Vec<SurveySummary>> {
    let mut visible = Condition::any().add(surveys::Column::Status.eq(SurveyStatus::Active));
    if let Some(viewer) = viewer {
        visible = visible.add(surveys::Column::OwnerId.eq(viewer.to_owned()));
    }

    let mut query = surveys::Entity::find().filter(visible);
    if let Some(status) = filter.status {
        query = query.filter(surveys::Column::Status.eq(status));
    }
    if let Some(creator_id) = &filter.creator_id {
        query = query.filter(surveys::Column::OwnerId.eq(creator_id.clone()));
    }

    let limit = filter
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);

    let models = query
        .order_by_desc(surveys::Column::CreatedAt)
        .order_by_desc(surveys::Column::Id)
        .offset(filter.skip.unwrap_or(0))
        .limit(limit)
        .all(db)
        .await?;

    summarize(db, models).await
}

/// Every survey owned by `owner_id`, newest first.
pub async fn list_mine(db: &DatabaseConnection, owner_id: &str) -> ApiResult<Vec<SurveySummary>> {
    let models = surveys::Entity::find()
        .filter(surveys::Column::OwnerId.eq(owner_id.to_owned()))
        .order_by_desc(surveys::Column::CreatedAt)
        .order_by_desc(surveys::Column::Id)
        .all(db)
        .await?;

    summarize(db, models).await
}

/// Build the full view of an already loaded survey.
pub(crate) async fn detail<C>(db: &C, survey: surveys::Model) -> ApiResult<SurveyDetail>
where
    C: ConnectionTrait,
{
    let questions = load_questions(db, survey.id).await?;
    let images = images::views_for_survey(db, survey.id).await?;
    let response_count = response_counts(db, &[survey.id])
        .await?
        .get(&survey.id)
        .copied()
        .unwrap_or(0);

    Ok(SurveyDetail {
        id: survey.id,
        title: survey.title,
        description: survey.description,
        status: survey.status,
        owner_id: survey.owner_id,
        allow_anonymous: survey.allow_anonymous,
        expires_at: survey.expires_at,
        max_responses: survey.max_responses,
        created_at: survey.created_at,
        updated_at: survey.updated_at,
        questions,
        images,
        response_count,
    })
}

/// A survey with its question tree. Non-active surveys are Forbidden to
/// everyone but their owner.
pub async fn get(
    db: &DatabaseConnection,
    survey_id: i32,
    viewer: Option<&str>,
) -> ApiResult<SurveyDetail> {
    let survey = find_survey(db, survey_id).await?;
    ensure_visible(&survey, viewer)?;
    detail(db, survey).await
}

/// Apply a partial update. Any status may be written; there is no
/// transition order.
pub async fn update(
    db: &DatabaseConnection,
    survey_id: i32,
    requester: &str,
    changes: SurveyChanges,
) -> ApiResult<SurveyDetail> {
    changes.validate()?;
    if let Some(max_responses) = changes.max_responses {
        check_max_responses(max_responses)?;
    }
    if let Some(questions) = &changes.questions {
        for question in questions {
            question.validate_tree()?;
        }
    }

    let txn = db.begin().await?;
    let survey = find_owned(&txn, survey_id, requester, "update this survey").await?;

    let mut active: surveys::ActiveModel = survey.into();
    if let Some(title) = changes.title {
        active.title = Set(title);
    }
    if let Some(description) = changes.description {
        active.description = Set(description);
    }
    if let Some(status) = changes.status {
        active.status = Set(status);
    }
    if let Some(allow_anonymous) = changes.allow_anonymous {
        active.allow_anonymous = Set(allow_anonymous);
    }
    if let Some(expires_at) = changes.expires_at {
        active.expires_at = Set(expires_at.map(|t| t.naive_utc()));
    }
    if let Some(max_responses) = changes.max_responses {
        active.max_responses = Set(max_responses);
    }
    active.updated_at = Set(Utc::now().naive_utc());
    let survey = active.update(&txn).await?;

    if let Some(questions) = &changes.questions {
        delete_question_tree(&txn, survey_id).await?;
        for (index, question) in questions.iter().enumerate() {
            insert_question(&txn, survey_id, question, index as i32).await?;
        }
    }

    let view = detail(&txn, survey).await?;
    txn.commit().await?;
    cache::invalidate_results(survey_id);
    log::info!("Survey {} updated by {}", survey_id, requester);

    Ok(view)
}

/// Close every active survey whose `expires_at` has passed. Returns how many
/// were closed.
pub async fn close_expired(db: &DatabaseConnection) -> ApiResult<u64> {
    let now = Utc::now().naive_utc();
    let txn = db.begin().await?;

    let expired = surveys::Entity::find()
        .filter(surveys::Column::Status.eq(SurveyStatus::Active))
        .filter(surveys::Column::ExpiresAt.lte(now))
        .all(&txn)
        .await?;

    let mut closed = Vec::with_capacity(expired.len());
    for survey in expired {
        let id = survey.id;
        let mut active: surveys::ActiveModel = survey.into();
        active.status = Set(SurveyStatus::Closed);
        active.updated_at = Set(now);
        active.update(&txn).await?;
        closed.push(id);
    }

    txn.commit().await?;
    for id in &closed {
        cache::invalidate_results(*id);
        log::info!("Closed expired survey {}", id);
    }

    Ok(closed.len() as u64)
}

/// Delete a survey with its questions, options, responses and images.
/// Image files are removed after the rows are gone; failures there are
/// logged and leave orphaned files behind.
pub async fn delete(
    db: &DatabaseConnection,
    storage: &dyn StorageBackend,
    survey_id: i32,
    requester: &str,
) -> ApiResult<()> {
    let txn = db.begin().await?;
    find_owned(&txn, survey_id, requester, "delete this survey").await?;

    let image_rows = survey_images::Entity::find()
        .filter(survey_images::Column::SurveyId.eq(survey_id))
        .all(&txn)
        .await?;

    delete_question_tree(&txn, survey_id).await?;
    survey_responses::Entity::delete_many()
        .filter(survey_responses::Column::SurveyId.eq(survey_id))
        .exec(&txn)
        .await?;
    survey_images::Entity::delete_many()
        .filter(survey_images::Column::SurveyId.eq(survey_id))
        .exec(&txn)
        .await?;
    surveys::Entity::delete_by_id(survey_id).exec(&txn).await?;

    txn.commit().await?;
    cache::invalidate_results(survey_id);
    log::info!("Survey {} deleted by {}", survey_id, requester);

    for image in &image_rows {
        images::remove_file(storage, &image.file_path).await;
    }
    if let Err(e) = storage.delete_prefix(&survey_id.to_string()).await {
        log::warn!("Could not remove upload directory of survey {}: {}", survey_id, e);
    }

    Ok(())
}

// =============================================================================
// Question operations
// =============================================================================

async fn question_view<C>(db: &C, question: questions::Model) -> ApiResult<QuestionView>
where
    C: ConnectionTrait,
{
    let options = question_options::Entity::find()
        .filter(question_options::Column::QuestionId.eq(question.id))
        .order_by_asc(question_options::Column::DisplayOrder)
        .order_by_asc(question_options::Column::Id)
        .all(db)
        .await?;
    Ok(QuestionView::new(question, options))
}

async fn find_question<C>(db: &C, survey_id: i32, question_id: i32) -> ApiResult<questions::Model>
where
    C: ConnectionTrait,
{
    questions::Entity::find_by_id(question_id)
        .filter(questions::Column::SurveyId.eq(survey_id))
        .one(db)
        .await?
        .ok_or_else(|| ApiError::not_found("Question"))
}

/// Append a question. Without an explicit order it goes after the last one.
pub async fn add_question(
    db: &DatabaseConnection,
    survey_id: i32,
    requester: &str,
    question: NewQuestion,
) -> ApiResult<QuestionView> {
    question.validate_tree()?;

    let txn = db.begin().await?;
    let survey = find_owned(&txn, survey_id, requester, "modify this survey").await?;

    let next_order = questions::Entity::find()
        .filter(questions::Column::SurveyId.eq(survey_id))
        .order_by_desc(questions::Column::DisplayOrder)
        .one(&txn)
        .await?
        .map(|q| q.display_order + 1)
        .unwrap_or(0);

    let model = insert_question(&txn, survey_id, &question, next_order).await?;
    touch(&txn, survey).await?;
    let view = question_view(&txn, model).await?;

    txn.commit().await?;
    cache::invalidate_results(survey_id);
    log::info!("Question {} added to survey {}", view.id, survey_id);

    Ok(view)
}

pub async fn update_question(
    db: &DatabaseConnection,
    survey_id: i32,
    question_id: i32,
    requester: &str,
    changes: QuestionChanges,
) -> ApiResult<QuestionView> {
    changes.validate()?;
    if let Some(options) = &changes.options {
        for option in options {
            option.validate()?;
        }
    }

    let txn = db.begin().await?;
    let survey = find_owned(&txn, survey_id, requester, "modify this survey").await?;
    let question = find_question(&txn, survey_id, question_id).await?;

    let question_type = changes.question_type.unwrap_or(question.question_type);
    let min_value = changes.min_value.unwrap_or(question.min_value);
    let max_value = changes.max_value.unwrap_or(question.max_value);
    check_range(question_type, min_value, max_value)
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let mut active: questions::ActiveModel = question.into();
    active.question_type = Set(question_type);
    if let Some(title) = changes.title {
        active.title = Set(title);
    }
    if let Some(description) = changes.description {
        active.description = Set(description);
    }
    if let Some(required) = changes.required {
        active.is_required = Set(required);
    }
    if let Some(order) = changes.order {
        active.display_order = Set(order);
    }
    if let Some(placeholder) = changes.placeholder {
        active.placeholder = Set(placeholder);
    }
    active.min_value = Set(min_value);
    active.max_value = Set(max_value);
    let model = active.update(&txn).await?;

    if let Some(options) = &changes.options {
        question_options::Entity::delete_many()
            .filter(question_options::Column::QuestionId.eq(question_id))
            .exec(&txn)
            .await?;
        insert_options(&txn, question_id, options).await?;
    }

    touch(&txn, survey).await?;
    let view = question_view(&txn, model).await?;

    txn.commit().await?;
    cache::invalidate_results(survey_id);

    Ok(view)
}

pub async fn delete_question(
    db: &DatabaseConnection,
    survey_id: i32,
    question_id: i32,
    requester: &str,
) -> ApiResult<()> {
    let txn = db.begin().await?;
    let survey = find_owned(&txn, survey_id, requester, "modify this survey").await?;
    find_question(&txn, survey_id, question_id).await?;

    question_options::Entity::delete_many()
        .filter(question_options::Column::QuestionId.eq(question_id))
        .exec(&txn)
        .await?;
    questions::Entity::delete_by_id(question_id).exec(&txn).await?;
    touch(&txn, survey).await?;

    txn.commit().await?;
    cache::invalidate_results(survey_id);
    log::info!("Question {} removed from survey {}", question_id, survey_id);

    Ok(())
}

// =============================================================================
// Dashboard
// =============================================================================

pub async fn dashboard(db: &DatabaseConnection, owner_id: &str) -> ApiResult<Dashboard> {
    let owned = surveys::Entity::find()
        .filter(surveys::Column::OwnerId.eq(owner_id.to_owned()))
        .order_by_desc(surveys::Column::CreatedAt)
        .order_by_desc(surveys::Column::Id)
        .all(db)
        .await?;

    let ids: Vec<i32> = owned.iter().map(|s| s.id).collect();
    let counts = response_counts(db, &ids).await?;

    let total_surveys = owned.len() as u64;
    let active_surveys = owned
        .iter()
        .filter(|s| s.status == SurveyStatus::Active)
        .count() as u64;
    let total_responses = counts.values().sum();

    let my_responses = survey_responses::Entity::find()
        .filter(survey_responses::Column::RespondentId.eq(owner_id.to_owned()))
        .count(db)
        .await? as u64;

    let recent_responses = if ids.is_empty() {
        Vec::new()
    } else {
        survey_responses::Entity::find()
            .filter(survey_responses::Column::SurveyId.is_in(ids))
            .order_by_desc(survey_responses::Column::SubmittedAt)
            .order_by_desc(survey_responses::Column::Id)
            .limit(DASHBOARD_RECENT_COUNT)
            .all(db)
            .await?
            .into_iter()
            .map(|r| RecentResponse {
                id: r.id,
                survey_id: r.survey_id,
                respondent_id: r.respondent_id,
                submitted_at: r.submitted_at,
            })
            .collect()
    };

    let recent_surveys = owned
        .into_iter()
        .take(DASHBOARD_RECENT_COUNT as usize)
        .map(|s| RecentSurvey {
            response_count: counts.get(&s.id).copied().unwrap_or(0),
            id: s.id,
            title: s.title,
            status: s.status,
            created_at: s.created_at,
        })
        .collect();

    Ok(Dashboard {
        total_surveys,
        active_surveys,
        total_responses,
        my_responses,
        recent_surveys,
        recent_responses,
    })
}
