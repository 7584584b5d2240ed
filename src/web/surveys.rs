use crate::error::ApiError;
use crate::middleware::ClientCtx;
use crate::orm::surveys::SurveyStatus;
use crate::storage::StorageBackend;
use crate::surveys::{self, NewQuestion, NewSurvey, QuestionChanges, SurveyChanges, SurveyFilter};
use actix_web::{delete, get, post, put, web, HttpResponse};
use sea_orm::DatabaseConnection;
use serde::Deserialize;
use std::sync::Arc;

pub(super) fn configure(conf: &mut web::ServiceConfig) {
    // Fixed paths first; {id} would swallow them.
    conf.service(view_my_surveys)
        .service(view_dashboard)
        .service(view_surveys)
        .service(create_survey)
        .service(view_survey)
        .service(update_survey)
        .service(delete_survey)
        .service(create_question)
        .service(update_question)
        .service(delete_question);
}

#[derive(Debug, Deserialize)]
pub struct SurveyListQuery {
    pub status: Option<SurveyStatus>,
    pub creator_id: Option<String>,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}

impl From<SurveyListQuery> for SurveyFilter {
    fn from(q: SurveyListQuery) -> Self {
        Self {
            status: q.status,
            creator_id: q.creator_id,
            skip: q.skip,
            limit: q.limit,
        }
    }
}

#[get("/api/surveys/my-surveys")]
async fn view_my_surveys(
    client: ClientCtx,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, ApiError> {
    let user_id = client.require_login()?;
    let list = surveys::list_mine(&db, user_id).await?;
    Ok(HttpResponse::Ok().json(list))
}

#[get("/api/surveys/stats/dashboard")]
async fn view_dashboard(
    client: ClientCtx,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, ApiError> {
    let user_id = client.require_login()?;
    let stats = surveys::dashboard(&db, user_id).await?;
    Ok(HttpResponse::Ok().json(stats))
}

#[get("/api/surveys")]
async fn view_surveys(
    client: ClientCtx,
    db: web::Data<DatabaseConnection>,
    query: web::Query<SurveyListQuery>,
) -> Result<HttpResponse, ApiError> {
    let filter = SurveyFilter::from(query.into_inner());
    let list = surveys::list(&db, &filter, client.user_id()).await?;
    Ok(HttpResponse::Ok().json(list))
}

#[post("/api/surveys")]
async fn create_survey(
    client: ClientCtx,
    db: web::Data<DatabaseConnection>,
    body: web::Json<NewSurvey>,
) -> Result<HttpResponse, ApiError> {
    let user_id = client.require_login()?;
    let survey = surveys::create(&db, user_id, body.into_inner()).await?;
    Ok(HttpResponse::Created().json(survey))
}

#[get("/api/surveys/{id}")]
async fn view_survey(
    client: ClientCtx,
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let survey = surveys::get(&db, path.into_inner(), client.user_id()).await?;
    Ok(HttpResponse::Ok().json(survey))
}

#[put("/api/surveys/{id}")]
async fn update_survey(
    client: ClientCtx,
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
    body: web::Json<SurveyChanges>,
) -> Result<HttpResponse, ApiError> {
    let user_id = client.require_login()?;
    let survey = surveys::update(&db, path.into_inner(), user_id, body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(survey))
}

#[delete("/api/surveys/{id}")]
async fn delete_survey(
    client: ClientCtx,
    db: web::Data<DatabaseConnection>,
    storage: web::Data<Arc<dyn StorageBackend>>,
    path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let user_id = client.require_login()?;
    surveys::delete(&db, storage.get_ref().as_ref(), path.into_inner(), user_id).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[post("/api/surveys/{id}/questions")]
async fn create_question(
    client: ClientCtx,
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
    body: web::Json<NewQuestion>,
) -> Result<HttpResponse, ApiError> {
    let user_id = client.require_login()?;
    let question = surveys::add_question(&db, path.into_inner(), user_id, body.into_inner()).await?;
    Ok(HttpResponse::Created().json(question))
}

#[put("/api/surveys/{id}/questions/{question_id}")]
async fn update_question(
    client: ClientCtx,
    db: web::Data<DatabaseConnection>,
    path: web::Path<(i32, i32)>,
    body: web::Json<QuestionChanges>,
) -> Result<HttpResponse, ApiError> {
    let user_id = client.require_login()?;
    let (survey_id, question_id) = path.into_inner();
    let question =
        surveys::update_question(&db, survey_id, question_id, user_id, body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(question))
}

#[delete("/api/surveys/{id}/questions/{question_id}")]
async fn delete_question(
    client: ClientCtx,
    db: web::Data<DatabaseConnection>,
    path: web::Path<(i32, i32)>,
) -> Result<HttpResponse, ApiError> {
    let user_id = client.require_login()?;
    let (survey_id, question_id) = path.into_inner();
    surveys::delete_question(&db, survey_id, question_id, user_id).await?;
    Ok(HttpResponse::NoContent().finish())
}
