//! Test fixtures for creating test data
#![allow(dead_code)]

use jsonwebtoken::{encode, EncodingKey, Header};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use survey_platform::app_config::{AuthConfig, UploadConfig};
use survey_platform::auth::TokenVerifier;
use survey_platform::orm::questions::QuestionType;
use survey_platform::storage::local::LocalStorage;
use survey_platform::storage::StorageBackend;
use survey_platform::surveys::{self, NewSurvey, SurveyDetail};

pub const TEST_SECRET: &str = "integration-test-secret";

#[derive(Serialize)]
struct Claims<'a> {
    sub: &'a str,
    exp: i64,
}

pub fn auth_config() -> AuthConfig {
    AuthConfig {
        shared_secret: TEST_SECRET.to_owned(),
        ..Default::default()
    }
}

pub fn verifier() -> TokenVerifier {
    TokenVerifier::from_config(&auth_config()).expect("test verifier")
}

/// Signed HS256 token for `user_id`, valid for an hour.
pub fn token_for(user_id: &str) -> String {
    encode(
        &Header::default(),
        &Claims {
            sub: user_id,
            exp: chrono::Utc::now().timestamp() + 3600,
        },
        &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
    )
    .expect("token encoding")
}

pub fn bearer(user_id: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer {}", token_for(user_id)))
}

pub fn storage_in(dir: &Path) -> Arc<dyn StorageBackend> {
    Arc::new(LocalStorage::new(dir.to_path_buf()).expect("local storage"))
}

/// Small limits so size checks are cheap to hit.
pub fn upload_limits() -> UploadConfig {
    UploadConfig {
        directory: String::new(),
        max_image_size: 1024,
        ..Default::default()
    }
}

/// Survey payload with one question of each kind.
pub fn feedback_survey(title: &str) -> NewSurvey {
    serde_json::from_value(serde_json::json!({
        "title": title,
        "description": "Tell us how we did",
        "status": "active",
        "questions": [
            {
                "type": "multiple_choice",
                "title": "Overall?",
                "required": true,
                "options": [
                    { "label": "Great", "value": "great" },
                    { "label": "Good", "value": "good" },
                    { "label": "Fair", "value": "fair" }
                ]
            },
            {
                "type": "rating",
                "title": "Score",
                "min_value": 1,
                "max_value": 5
            },
            {
                "type": "checkbox",
                "title": "What did you use?",
                "options": [
                    { "label": "Web", "value": "web" },
                    { "label": "Mobile", "value": "mobile" }
                ]
            },
            {
                "type": "text",
                "title": "Anything else?",
                "placeholder": "Optional"
            }
        ]
    }))
    .expect("valid survey payload")
}

pub async fn create_feedback_survey(
    db: &DatabaseConnection,
    owner_id: &str,
    title: &str,
) -> SurveyDetail {
    surveys::create(db, owner_id, feedback_survey(title))
        .await
        .expect("Failed to create survey")
}

/// Question id of the first question of the given type, as an answer key.
pub fn question_key(survey: &SurveyDetail, question_type: QuestionType) -> String {
    survey
        .questions
        .iter()
        .find(|q| q.question_type == question_type)
        .map(|q| q.id.to_string())
        .expect("question of that type")
}

/// Active one-question survey with extra top-level settings merged in.
pub async fn create_survey_with(
    db: &DatabaseConnection,
    owner_id: &str,
    settings: serde_json::Value,
) -> SurveyDetail {
    let mut payload = serde_json::json!({
        "title": "Configured",
        "status": "active",
        "questions": [ { "type": "text", "title": "Comments" } ]
    });
    if let (Some(base), Some(extra)) = (payload.as_object_mut(), settings.as_object()) {
        base.extend(extra.clone());
    }
    surveys::create(
        db,
        owner_id,
        serde_json::from_value(payload).expect("valid survey payload"),
    )
    .await
    .expect("Failed to create survey")
}
