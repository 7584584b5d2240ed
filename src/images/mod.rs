//! Images attached to surveys.
//!
//! Bytes live in a [`StorageBackend`]; a `survey_images` row records where.

use crate::app_config::UploadConfig;
use crate::error::{ApiError, ApiResult};
use crate::orm::survey_images;
use crate::storage::{public_url, survey_key, StorageBackend, StorageError};
use crate::surveys::{ensure_owner, ensure_visible, find_owned, find_survey};
use chrono::{NaiveDateTime, Utc};
use mime::Mime;
use sea_orm::{entity::*, query::*, ActiveValue::Set, ConnectionTrait, DatabaseConnection};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

/// An uploaded file as received from the client.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageView {
    pub id: i32,
    pub survey_id: i32,
    pub filename: String,
    pub file_path: String,
    pub url: String,
    pub file_size: i64,
    pub mime_type: String,
    pub uploaded_at: NaiveDateTime,
}

impl From<survey_images::Model> for ImageView {
    fn from(m: survey_images::Model) -> Self {
        Self {
            url: public_url(&m.file_path),
            id: m.id,
            survey_id: m.survey_id,
            filename: m.filename,
            file_path: m.file_path,
            file_size: m.file_size,
            mime_type: m.mime_type,
            uploaded_at: m.uploaded_at,
        }
    }
}

/// File extension for a stored upload. Known image types map from the MIME
/// type so the served file matches what was validated; otherwise the client's
/// extension is kept when it is short and alphanumeric.
pub fn extension_for(filename: &str, mime_type: &str) -> String {
    let known = mime_type
        .to_ascii_lowercase()
        .parse::<Mime>()
        .ok()
        .filter(|m| m.type_() == mime::IMAGE)
        .and_then(|m| match m.subtype().as_str() {
            "jpeg" | "jpg" | "pjpeg" => Some("jpg"),
            "png" => Some("png"),
            "gif" => Some("gif"),
            "webp" => Some("webp"),
            "svg" => Some("svg"),
            "bmp" => Some("bmp"),
            "avif" => Some("avif"),
            _ => None,
        });
    if let Some(ext) = known {
        return ext.to_owned();
    }

    match filename.rsplit_once('.') {
        Some((_, ext))
            if !ext.is_empty()
                && ext.len() <= 5
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            ext.to_ascii_lowercase()
        }
        _ => "bin".to_owned(),
    }
}

/// Remove a stored file, logging instead of failing.
pub(crate) async fn remove_file(storage: &dyn StorageBackend, key: &str) {
    match storage.delete_object(key).await {
        Ok(()) | Err(StorageError::NotFound(_)) => {}
        Err(e) => log::warn!("Could not remove stored file {}: {}", key, e),
    }
}

/// Attach an image to a survey.
///
/// Checks run in order: survey exists, requester owns it, MIME type is
/// allowed, size is within limits. Nothing is written unless all pass.
pub async fn upload(
    db: &DatabaseConnection,
    storage: &dyn StorageBackend,
    limits: &UploadConfig,
    survey_id: i32,
    requester: &str,
    upload: ImageUpload,
) -> ApiResult<ImageView> {
    let survey = find_survey(db, survey_id).await?;
    ensure_owner(&survey, requester, "upload images to this survey")?;

    if !limits.allows(&upload.content_type) {
        return Err(ApiError::Validation(format!(
            "File type not allowed. Allowed types: {}",
            limits.allowed_image_types.join(", ")
        )));
    }
    if upload.data.is_empty() {
        return Err(ApiError::Validation("Uploaded file is empty".to_owned()));
    }
    if upload.data.len() as u64 > limits.max_image_size {
        return Err(ApiError::Validation(format!(
            "File too large. Maximum size is {} MB",
            limits.max_image_size as f64 / (1024.0 * 1024.0)
        )));
    }

    let stored_name = format!(
        "{}.{}",
        Uuid::new_v4(),
        extension_for(&upload.filename, &upload.content_type)
    );
    let key = survey_key(survey_id, &stored_name);
    let file_size = upload.data.len() as i64;

    storage.put_object(upload.data, &key).await?;

    let inserted = survey_images::ActiveModel {
        survey_id: Set(survey_id),
        filename: Set(upload.filename),
        file_path: Set(key.clone()),
        file_size: Set(file_size),
        mime_type: Set(upload.content_type),
        uploaded_at: Set(Utc::now().naive_utc()),
        ..Default::default()
    }
    .insert(db)
    .await;

    match inserted {
        Ok(model) => {
            log::info!("Image {} stored for survey {} at {}", model.id, survey_id, key);
            Ok(ImageView::from(model))
        }
        Err(e) => {
            remove_file(storage, &key).await;
            Err(e.into())
        }
    }
}

/// Images of a survey, oldest first. Visible wherever the survey is.
pub async fn list(
    db: &DatabaseConnection,
    survey_id: i32,
    viewer: Option<&str>,
) -> ApiResult<Vec<ImageView>> {
    let survey = find_survey(db, survey_id).await?;
    ensure_visible(&survey, viewer)?;
    views_for_survey(db, survey_id).await
}

pub(crate) async fn views_for_survey<C>(db: &C, survey_id: i32) -> ApiResult<Vec<ImageView>>
where
    C: ConnectionTrait,
{
    Ok(survey_images::Entity::find()
        .filter(survey_images::Column::SurveyId.eq(survey_id))
        .order_by_asc(survey_images::Column::UploadedAt)
        .order_by_asc(survey_images::Column::Id)
        .all(db)
        .await?
        .into_iter()
        .map(ImageView::from)
        .collect())
}

/// Images of several surveys keyed by survey id.
pub(crate) async fn views_for_surveys<C>(
    db: &C,
    survey_ids: &[i32],
) -> ApiResult<HashMap<i32, Vec<ImageView>>>
where
    C: ConnectionTrait,
{
    let mut grouped: HashMap<i32, Vec<ImageView>> = HashMap::new();
    if survey_ids.is_empty() {
        return Ok(grouped);
    }

    let rows = survey_images::Entity::find()
        .filter(survey_images::Column::SurveyId.is_in(survey_ids.to_vec()))
        .order_by_asc(survey_images::Column::UploadedAt)
        .order_by_asc(survey_images::Column::Id)
        .all(db)
        .await?;
    for row in rows {
        grouped
            .entry(row.survey_id)
            .or_default()
            .push(ImageView::from(row));
    }
    Ok(grouped)
}

/// Remove an image row and its file.
pub async fn delete(
    db: &DatabaseConnection,
    storage: &dyn StorageBackend,
    survey_id: i32,
    image_id: i32,
    requester: &str,
) -> ApiResult<()> {
    find_owned(db, survey_id, requester, "delete images from this survey").await?;
    let image = survey_images::Entity::find_by_id(image_id)
        .filter(survey_images::Column::SurveyId.eq(survey_id))
        .one(db)
        .await?
        .ok_or_else(|| ApiError::not_found("Image"))?;

    survey_images::Entity::delete_by_id(image_id).exec(db).await?;
    remove_file(storage, &image.file_path).await;
    log::info!("Image {} removed from survey {}", image_id, survey_id);

    Ok(())
}
