use crate::app_config::UploadConfig;
use crate::error::ApiError;
use crate::images::{self, ImageUpload};
use crate::middleware::ClientCtx;
use crate::storage::StorageBackend;
use actix_multipart::{Field, Multipart};
use actix_web::{delete, get, post, web, HttpResponse};
use futures::{StreamExt, TryStreamExt};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

pub(super) fn configure(conf: &mut web::ServiceConfig) {
    conf.service(upload_image)
        .service(view_images)
        .service(delete_image);
}

/// Read a field into memory, stopping once it exceeds `limit` bytes.
/// The service rejects anything over the limit, so the surplus is never kept.
async fn read_field(field: &mut Field, limit: u64) -> Result<Vec<u8>, ApiError> {
    let mut buf: Vec<u8> = Vec::with_capacity(8192);
    while let Some(chunk) = field.next().await {
        let bytes = chunk.map_err(|e| {
            log::error!("upload_image: multipart read error: {}", e);
            ApiError::Validation("Error reading uploaded file.".to_owned())
        })?;
        buf.extend_from_slice(&bytes);
        if buf.len() as u64 > limit {
            break;
        }
    }
    Ok(buf)
}

#[post("/api/surveys/{id}/upload-image")]
async fn upload_image(
    client: ClientCtx,
    db: web::Data<DatabaseConnection>,
    storage: web::Data<Arc<dyn StorageBackend>>,
    limits: web::Data<UploadConfig>,
    path: web::Path<i32>,
    mut payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let user_id = client.require_login()?;
    let survey_id = path.into_inner();

    let mut upload: Option<ImageUpload> = None;
    while let Some(mut field) = payload.try_next().await.map_err(|e| {
        log::error!("upload_image: multipart error: {}", e);
        ApiError::Validation("Error interpreting upload.".to_owned())
    })? {
        if field.content_disposition().get_name() != Some("file") {
            continue;
        }

        let filename = field
            .content_disposition()
            .get_filename()
            .unwrap_or("upload")
            .to_owned();
        let content_type = field
            .content_type()
            .map(|m| m.essence_str().to_owned())
            .unwrap_or_default();
        let data = read_field(&mut field, limits.max_image_size).await?;

        upload = Some(ImageUpload {
            filename,
            content_type,
            data,
        });
        break;
    }

    let upload = upload.ok_or_else(|| ApiError::Validation("No file provided".to_owned()))?;
    let image = images::upload(
        &db,
        storage.get_ref().as_ref(),
        &limits,
        survey_id,
        user_id,
        upload,
    )
    .await?;

    Ok(HttpResponse::Created().json(image))
}

#[get("/api/surveys/{id}/images")]
async fn view_images(
    client: ClientCtx,
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let list = images::list(&db, path.into_inner(), client.user_id()).await?;
    Ok(HttpResponse::Ok().json(list))
}

#[delete("/api/surveys/{id}/images/{image_id}")]
async fn delete_image(
    client: ClientCtx,
    db: web::Data<DatabaseConnection>,
    storage: web::Data<Arc<dyn StorageBackend>>,
    path: web::Path<(i32, i32)>,
) -> Result<HttpResponse, ApiError> {
    let user_id = client.require_login()?;
    let (survey_id, image_id) = path.into_inner();
    images::delete(&db, storage.get_ref().as_ref(), survey_id, image_id, user_id).await?;
    Ok(HttpResponse::NoContent().finish())
}
