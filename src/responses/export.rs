//! Full dumps of a survey's responses for its owner.

use super::{Answer, ResponseView};
use crate::error::{ApiError, ApiResult};
use crate::orm::survey_responses;
use crate::orm::surveys::SurveyStatus;
use crate::surveys::{self as survey_service, QuestionView};
use chrono::NaiveDateTime;
use sea_orm::{entity::*, query::*, DatabaseConnection};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Csv,
}

impl Default for ExportFormat {
    fn default() -> Self {
        Self::Json
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportedSurvey {
    pub id: i32,
    pub title: String,
    pub description: Option<String>,
    pub status: SurveyStatus,
    pub created_at: NaiveDateTime,
    pub total_responses: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SurveyExport {
    pub survey: ExportedSurvey,
    pub questions: Vec<QuestionView>,
    pub responses: Vec<ResponseView>,
}

impl SurveyExport {
    /// One row per response: id, timestamp, then one column per question in
    /// display order. Choice lists are joined with ", "; missing answers are
    /// empty cells.
    pub fn to_csv(&self) -> ApiResult<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());

        let mut header = vec!["Response ID".to_owned(), "Submitted At".to_owned()];
        header.extend(self.questions.iter().map(|q| q.title.clone()));
        writer.write_record(&header).map_err(csv_error)?;

        for response in &self.responses {
            let mut row = vec![
                response.id.to_string(),
                response.submitted_at.format("%Y-%m-%dT%H:%M:%S").to_string(),
            ];
            row.extend(self.questions.iter().map(|q| {
                response
                    .answers
                    .get(&q.id.to_string())
                    .and_then(Answer::as_text)
                    .unwrap_or_default()
            }));
            writer.write_record(&row).map_err(csv_error)?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| ApiError::Internal(format!("CSV error: {}", e)))?;
        String::from_utf8(bytes).map_err(|e| ApiError::Internal(format!("CSV error: {}", e)))
    }
}

fn csv_error(e: csv::Error) -> ApiError {
    ApiError::Internal(format!("CSV error: {}", e))
}

/// Collect a survey with every response to it. Owner only.
pub async fn export(
    db: &DatabaseConnection,
    survey_id: i32,
    requester: &str,
) -> ApiResult<SurveyExport> {
    let survey =
        survey_service::find_owned(db, survey_id, requester, "export this survey").await?;
    let questions = survey_service::load_questions(db, survey_id).await?;

    let responses = survey_responses::Entity::find()
        .filter(survey_responses::Column::SurveyId.eq(survey_id))
        .order_by_asc(survey_responses::Column::SubmittedAt)
        .order_by_asc(survey_responses::Column::Id)
        .all(db)
        .await?
        .into_iter()
        .map(ResponseView::try_from)
        .collect::<ApiResult<Vec<_>>>()?;

    log::info!(
        "Survey {} exported by {} ({} responses)",
        survey_id,
        requester,
        responses.len()
    );

    Ok(SurveyExport {
        survey: ExportedSurvey {
            id: survey.id,
            title: survey.title,
            description: survey.description,
            status: survey.status,
            created_at: survey.created_at,
            total_responses: responses.len() as u64,
        },
        questions,
        responses,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orm::questions::QuestionType;

    fn text_question(id: i32, title: &str) -> QuestionView {
        QuestionView {
            id,
            survey_id: 1,
            question_type: QuestionType::Text,
            title: title.to_owned(),
            description: None,
            required: false,
            order: id,
            placeholder: None,
            min_value: None,
            max_value: None,
            options: Vec::new(),
        }
    }

    #[test]
    fn test_csv_quotes_and_joins_answers() {
        let submitted_at = NaiveDateTime::parse_from_str("2024-03-01 12:30:00", "%Y-%m-%d %H:%M:%S")
            .unwrap();
        let export = SurveyExport {
            survey: ExportedSurvey {
                id: 1,
                title: "Feedback".to_owned(),
                description: None,
                status: SurveyStatus::Active,
                created_at: submitted_at,
                total_responses: 2,
            },
            questions: vec![text_question(10, "Comments, please"), text_question(11, "Tools")],
            responses: vec![
                ResponseView {
                    id: 5,
                    survey_id: 1,
                    respondent_id: Some("u1".to_owned()),
                    is_anonymous: false,
                    answers: serde_json::from_value(serde_json::json!({
                        "10": "said \"hi\"",
                        "11": ["web", "mobile"]
                    }))
                    .unwrap(),
                    submitted_at,
                },
                ResponseView {
                    id: 6,
                    survey_id: 1,
                    respondent_id: None,
                    is_anonymous: true,
                    answers: Default::default(),
                    submitted_at,
                },
            ],
        };

        let csv = export.to_csv().unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "Response ID,Submitted At,\"Comments, please\",Tools");
        assert_eq!(
            lines[1],
            "5,2024-03-01T12:30:00,\"said \"\"hi\"\"\",\"web, mobile\""
        );
        assert_eq!(lines[2], "6,2024-03-01T12:30:00,,");
    }

    #[test]
    fn test_format_parses_lowercase() {
        let f: ExportFormat = serde_json::from_value(serde_json::json!("csv")).unwrap();
        assert_eq!(f, ExportFormat::Csv);
        assert_eq!(ExportFormat::default(), ExportFormat::Json);
    }
}
