use crate::error::ApiError;
use crate::middleware::ClientCtx;
use crate::responses::{self, ExportFormat, NewResponse};
use actix_web::http::header;
use actix_web::{delete, get, post, web, HttpResponse};
use sea_orm::DatabaseConnection;
use serde::Deserialize;

pub(super) fn configure(conf: &mut web::ServiceConfig) {
    // Registered ahead of the survey routes; /api/surveys/{id} also matches
    // /api/surveys/responses.
    conf.service(view_my_responses)
        .service(view_response)
        .service(delete_response)
        .service(submit_response)
        .service(view_survey_responses)
        .service(view_my_response)
        .service(view_results)
        .service(export_responses);
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    #[serde(default)]
    pub format: ExportFormat,
}

#[get("/api/surveys/responses")]
async fn view_my_responses(
    client: ClientCtx,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, ApiError> {
    let user_id = client.require_login()?;
    let list = responses::list_mine(&db, user_id).await?;
    Ok(HttpResponse::Ok().json(list))
}

#[get("/api/surveys/responses/{id}")]
async fn view_response(
    client: ClientCtx,
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let user_id = client.require_login()?;
    let response = responses::get(&db, path.into_inner(), user_id).await?;
    Ok(HttpResponse::Ok().json(response))
}

#[delete("/api/surveys/responses/{id}")]
async fn delete_response(
    client: ClientCtx,
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let user_id = client.require_login()?;
    responses::delete(&db, path.into_inner(), user_id).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[post("/api/surveys/{id}/responses")]
async fn submit_response(
    client: ClientCtx,
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
    body: web::Json<NewResponse>,
) -> Result<HttpResponse, ApiError> {
    // Anonymous submissions need no token; the service decides.
    let response =
        responses::submit(&db, path.into_inner(), client.user_id(), body.into_inner()).await?;
    Ok(HttpResponse::Created().json(response))
}

#[get("/api/surveys/{id}/responses")]
async fn view_survey_responses(
    client: ClientCtx,
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let user_id = client.require_login()?;
    let list = responses::list_for_survey(&db, path.into_inner(), user_id).await?;
    Ok(HttpResponse::Ok().json(list))
}

#[get("/api/surveys/{id}/my-response")]
async fn view_my_response(
    client: ClientCtx,
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let user_id = client.require_login()?;
    let status = responses::my_response(&db, path.into_inner(), user_id).await?;
    Ok(HttpResponse::Ok().json(status))
}

#[get("/api/surveys/{id}/results")]
async fn view_results(
    client: ClientCtx,
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let results = responses::results(&db, path.into_inner(), client.user_id()).await?;
    Ok(HttpResponse::Ok().json(results.as_ref()))
}

#[get("/api/surveys/{id}/export")]
async fn export_responses(
    client: ClientCtx,
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
    query: web::Query<ExportQuery>,
) -> Result<HttpResponse, ApiError> {
    let user_id = client.require_login()?;
    let survey_id = path.into_inner();
    let export = responses::export::export(&db, survey_id, user_id).await?;

    match query.format {
        ExportFormat::Json => Ok(HttpResponse::Ok().json(export)),
        ExportFormat::Csv => Ok(HttpResponse::Ok()
            .content_type("text/csv; charset=utf-8")
            .insert_header((
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"survey-{}.csv\"", survey_id),
            ))
            .body(export.to_csv()?)),
    }
}
