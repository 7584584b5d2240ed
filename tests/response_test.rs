//! Response submission and results integration tests

mod common;

use serial_test::serial;
use survey_platform::error::ApiError;
use survey_platform::orm::questions::QuestionType;
use survey_platform::orm::surveys::SurveyStatus;
use survey_platform::responses::results::AnswerSummary;
use survey_platform::responses::{self, Answer, NewResponse};
use survey_platform::surveys::{self, SurveyChanges};

fn answers(json: serde_json::Value) -> NewResponse {
    serde_json::from_value(serde_json::json!({ "answers": json })).unwrap()
}

fn choice_counts(summary: &AnswerSummary) -> Vec<(String, u64)> {
    match summary {
        AnswerSummary::Choice { options } => options
            .iter()
            .map(|o| (o.value.clone(), o.count))
            .collect(),
        other => panic!("expected choice summary, got {:?}", other),
    }
}

#[actix_rt::test]
#[serial]
async fn test_unknown_question_id_is_accepted() {
    let db = common::database::setup_test_database()
        .await
        .expect("Failed to setup test database");
    let survey = common::fixtures::create_feedback_survey(&db, "owner_1", "Permissive").await;

    let stored = responses::submit(
        &db,
        survey.id,
        Some("respondent_1"),
        answers(serde_json::json!({ "424242": "from another survey" })),
    )
    .await
    .expect("unknown keys are stored as-is");

    assert_eq!(
        stored.answers.get("424242"),
        Some(&Answer::Text("from another survey".to_owned()))
    );

    let listed = responses::list_for_survey(&db, survey.id, "owner_1")
        .await
        .unwrap();
    assert_eq!(listed.total_responses, 1);
    assert_eq!(listed.responses[0].answers.len(), 1);
}

#[actix_rt::test]
#[serial]
async fn test_submit_to_missing_survey_is_not_found() {
    let db = common::database::setup_test_database()
        .await
        .expect("Failed to setup test database");

    let result = responses::submit(&db, 77, Some("respondent_1"), answers(serde_json::json!({}))).await;
    assert!(matches!(result, Err(ApiError::NotFound(_))));
}

#[actix_rt::test]
#[serial]
async fn test_submit_needs_an_active_survey() {
    let db = common::database::setup_test_database()
        .await
        .expect("Failed to setup test database");
    let survey = common::fixtures::create_feedback_survey(&db, "owner_1", "Gated").await;

    // Repeat submissions to an active survey are kept as separate responses.
    for _ in 0..2 {
        responses::submit(&db, survey.id, Some("respondent_1"), answers(serde_json::json!({})))
            .await
            .unwrap();
    }
    let status = responses::my_response(&db, survey.id, "respondent_1")
        .await
        .unwrap();
    assert!(status.has_responded);
    assert!(status.responded_at.is_some());

    let listed = responses::list_for_survey(&db, survey.id, "owner_1")
        .await
        .unwrap();
    assert_eq!(listed.total_responses, 2);
    assert_eq!(status.response_id, Some(listed.responses[1].id));

    for closed_status in [SurveyStatus::Closed, SurveyStatus::Draft] {
        surveys::update(
            &db,
            survey.id,
            "owner_1",
            SurveyChanges {
                status: Some(closed_status),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let result =
            responses::submit(&db, survey.id, Some("respondent_2"), answers(serde_json::json!({})))
                .await;
        match result {
            Err(ApiError::Validation(msg)) => assert_eq!(msg, "Survey is not active"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    let listed = responses::list_for_survey(&db, survey.id, "owner_1")
        .await
        .unwrap();
    assert_eq!(listed.total_responses, 2);
}

#[actix_rt::test]
#[serial]
async fn test_results_count_choice_answers() {
    let db = common::database::setup_test_database()
        .await
        .expect("Failed to setup test database");
    let survey = common::fixtures::create_feedback_survey(&db, "owner_1", "Results").await;
    let choice = common::fixtures::question_key(&survey, QuestionType::MultipleChoice);
    let rating = common::fixtures::question_key(&survey, QuestionType::Rating);
    let text = common::fixtures::question_key(&survey, QuestionType::Text);

    for (respondent, pick, score) in [("r1", "great", 5), ("r2", "great", 4), ("r3", "good", 3)] {
        let mut map = serde_json::Map::new();
        map.insert(choice.clone(), serde_json::json!(pick));
        map.insert(rating.clone(), serde_json::json!(score));
        map.insert(text.clone(), serde_json::json!(format!("note from {}", respondent)));
        responses::submit(&db, survey.id, Some(respondent), answers(map.into()))
            .await
            .unwrap();
    }

    let results = responses::results(&db, survey.id, None).await.unwrap();
    assert_eq!(results.total_responses, 3);
    assert_eq!(results.questions.len(), 4);

    assert_eq!(
        choice_counts(&results.questions[0].summary),
        vec![
            ("great".to_owned(), 2),
            ("good".to_owned(), 1),
            ("fair".to_owned(), 0)
        ]
    );

    match &results.questions[1].summary {
        AnswerSummary::Rating { count, mean, .. } => {
            assert_eq!(*count, 3);
            assert_eq!(*mean, Some(4.0));
        }
        other => panic!("expected rating summary, got {:?}", other),
    }

    match &results.questions[3].summary {
        AnswerSummary::Text { answers } => {
            assert_eq!(answers, &vec!["note from r1", "note from r2", "note from r3"]);
        }
        other => panic!("expected text summary, got {:?}", other),
    }
}

#[actix_rt::test]
#[serial]
async fn test_results_cache_is_invalidated_by_new_response() {
    let db = common::database::setup_test_database()
        .await
        .expect("Failed to setup test database");
    let survey = common::fixtures::create_feedback_survey(&db, "owner_1", "Cache").await;
    let choice = common::fixtures::question_key(&survey, QuestionType::MultipleChoice);

    let first = responses::results(&db, survey.id, None).await.unwrap();
    assert_eq!(first.total_responses, 0);

    // Served from cache while nothing changes.
    let again = responses::results(&db, survey.id, None).await.unwrap();
    assert!(std::sync::Arc::ptr_eq(&first, &again));

    let mut map = serde_json::Map::new();
    map.insert(choice, serde_json::json!("fair"));
    responses::submit(&db, survey.id, Some("r1"), answers(map.into()))
        .await
        .unwrap();

    let fresh = responses::results(&db, survey.id, None).await.unwrap();
    assert_eq!(fresh.total_responses, 1);
    assert_eq!(
        choice_counts(&fresh.questions[0].summary)[2],
        ("fair".to_owned(), 1)
    );
}

#[actix_rt::test]
#[serial]
async fn test_response_visibility_and_deletion() {
    let db = common::database::setup_test_database()
        .await
        .expect("Failed to setup test database");
    let survey = common::fixtures::create_feedback_survey(&db, "owner_1", "Private").await;

    let response =
        responses::submit(&db, survey.id, Some("respondent_1"), answers(serde_json::json!({})))
            .await
            .unwrap();

    // Respondent and owner can read it; nobody else.
    assert!(responses::get(&db, response.id, "respondent_1").await.is_ok());
    assert!(responses::get(&db, response.id, "owner_1").await.is_ok());
    assert!(matches!(
        responses::get(&db, response.id, "stranger").await,
        Err(ApiError::Forbidden(_))
    ));

    // Only the survey owner lists or deletes responses.
    assert!(matches!(
        responses::list_for_survey(&db, survey.id, "respondent_1").await,
        Err(ApiError::Forbidden(_))
    ));
    assert!(matches!(
        responses::delete(&db, response.id, "respondent_1").await,
        Err(ApiError::Forbidden(_))
    ));
    assert!(responses::get(&db, response.id, "owner_1").await.is_ok());

    responses::delete(&db, response.id, "owner_1").await.unwrap();
    assert!(matches!(
        responses::get(&db, response.id, "owner_1").await,
        Err(ApiError::NotFound(_))
    ));
    assert!(matches!(
        responses::delete(&db, response.id, "owner_1").await,
        Err(ApiError::NotFound(_))
    ));
}

#[actix_rt::test]
#[serial]
async fn test_list_mine_includes_survey_summary() {
    let db = common::database::setup_test_database()
        .await
        .expect("Failed to setup test database");
    let first = common::fixtures::create_feedback_survey(&db, "owner_1", "First").await;
    let second = common::fixtures::create_feedback_survey(&db, "owner_2", "Second").await;

    responses::submit(&db, first.id, Some("respondent_1"), answers(serde_json::json!({})))
        .await
        .unwrap();
    responses::submit(&db, second.id, Some("respondent_1"), answers(serde_json::json!({})))
        .await
        .unwrap();
    responses::submit(&db, second.id, Some("someone_else"), answers(serde_json::json!({})))
        .await
        .unwrap();

    let mine = responses::list_mine(&db, "respondent_1").await.unwrap();
    assert_eq!(mine.len(), 2);
    let titles: Vec<&str> = mine
        .iter()
        .map(|r| r.survey.as_ref().unwrap().title.as_str())
        .collect();
    assert!(titles.contains(&"First") && titles.contains(&"Second"));

    let none = responses::my_response(&db, first.id, "someone_else")
        .await
        .unwrap();
    assert!(!none.has_responded);
    assert_eq!(none.response_id, None);
}

fn anonymous(json: serde_json::Value) -> NewResponse {
    serde_json::from_value(serde_json::json!({ "answers": json, "is_anonymous": true })).unwrap()
}

#[actix_rt::test]
#[serial]
async fn test_anonymous_responses_follow_survey_setting() {
    let db = common::database::setup_test_database()
        .await
        .expect("Failed to setup test database");
    let open = common::fixtures::create_survey_with(
        &db,
        "owner_1",
        serde_json::json!({ "allow_anonymous": true }),
    )
    .await;
    let closed_door = common::fixtures::create_survey_with(&db, "owner_1", serde_json::json!({})).await;

    let stored = responses::submit(&db, open.id, None, anonymous(serde_json::json!({})))
        .await
        .unwrap();
    assert_eq!(stored.respondent_id, None);
    assert!(stored.is_anonymous);

    // A signed-in caller may still choose not to be recorded.
    let hidden = responses::submit(&db, open.id, Some("r1"), anonymous(serde_json::json!({})))
        .await
        .unwrap();
    assert_eq!(hidden.respondent_id, None);
    let status = responses::my_response(&db, open.id, "r1").await.unwrap();
    assert!(!status.has_responded);

    match responses::submit(&db, closed_door.id, Some("r1"), anonymous(serde_json::json!({}))).await {
        Err(ApiError::Validation(msg)) => {
            assert_eq!(msg, "This survey does not allow anonymous responses")
        }
        other => panic!("unexpected: {:?}", other),
    }

    for survey_id in [open.id, closed_door.id] {
        let result = responses::submit(&db, survey_id, None, answers(serde_json::json!({}))).await;
        assert!(matches!(result, Err(ApiError::Unauthorized(_))));
    }

    let listed = responses::list_for_survey(&db, open.id, "owner_1").await.unwrap();
    assert_eq!(listed.total_responses, 2);
    assert!(listed.responses.iter().all(|r| r.is_anonymous));
}

#[actix_rt::test]
#[serial]
async fn test_response_limit_and_expiry() {
    let db = common::database::setup_test_database()
        .await
        .expect("Failed to setup test database");
    let limited = common::fixtures::create_survey_with(
        &db,
        "owner_1",
        serde_json::json!({ "max_responses": 2 }),
    )
    .await;
    let expired = common::fixtures::create_survey_with(
        &db,
        "owner_1",
        serde_json::json!({ "expires_at": "2000-01-01T00:00:00Z" }),
    )
    .await;

    for respondent in ["r1", "r2"] {
        responses::submit(&db, limited.id, Some(respondent), answers(serde_json::json!({})))
            .await
            .unwrap();
    }
    match responses::submit(&db, limited.id, Some("r3"), answers(serde_json::json!({}))).await {
        Err(ApiError::Validation(msg)) => {
            assert_eq!(msg, "Survey has reached its maximum number of responses")
        }
        other => panic!("unexpected: {:?}", other),
    }

    match responses::submit(&db, expired.id, Some("r1"), answers(serde_json::json!({}))).await {
        Err(ApiError::Validation(msg)) => assert_eq!(msg, "Survey has expired"),
        other => panic!("unexpected: {:?}", other),
    }

    // The sweep closes only the expired survey.
    assert_eq!(surveys::close_expired(&db).await.unwrap(), 1);
    let swept = surveys::get(&db, expired.id, Some("owner_1")).await.unwrap();
    assert_eq!(swept.status, SurveyStatus::Closed);
    let untouched = surveys::get(&db, limited.id, None).await.unwrap();
    assert_eq!(untouched.status, SurveyStatus::Active);
    assert_eq!(surveys::close_expired(&db).await.unwrap(), 0);
}

#[actix_rt::test]
#[serial]
async fn test_results_follow_survey_visibility() {
    let db = common::database::setup_test_database()
        .await
        .expect("Failed to setup test database");
    let draft = common::fixtures::create_survey_with(
        &db,
        "owner_1",
        serde_json::json!({ "status": "draft" }),
    )
    .await;

    assert!(matches!(
        responses::results(&db, draft.id, None).await,
        Err(ApiError::Forbidden(_))
    ));
    assert!(matches!(
        responses::results(&db, draft.id, Some("intruder")).await,
        Err(ApiError::Forbidden(_))
    ));
    let own = responses::results(&db, draft.id, Some("owner_1")).await.unwrap();
    assert_eq!(own.total_responses, 0);

    // A cached entry does not bypass the check.
    assert!(matches!(
        responses::results(&db, draft.id, None).await,
        Err(ApiError::Forbidden(_))
    ));
    assert!(matches!(
        responses::results(&db, 999, None).await,
        Err(ApiError::NotFound(_))
    ));
}

#[actix_rt::test]
#[serial]
async fn test_export_is_owner_only() {
    let db = common::database::setup_test_database()
        .await
        .expect("Failed to setup test database");
    let survey = common::fixtures::create_feedback_survey(&db, "owner_1", "Exported").await;
    let choice = common::fixtures::question_key(&survey, QuestionType::MultipleChoice);
    let checkbox = common::fixtures::question_key(&survey, QuestionType::Checkbox);

    let mut map = serde_json::Map::new();
    map.insert(choice, serde_json::json!("great"));
    map.insert(checkbox, serde_json::json!(["web", "mobile"]));
    responses::submit(&db, survey.id, Some("r1"), answers(map.into()))
        .await
        .unwrap();
    responses::submit(&db, survey.id, Some("r2"), answers(serde_json::json!({})))
        .await
        .unwrap();

    assert!(matches!(
        responses::export::export(&db, survey.id, "r1").await,
        Err(ApiError::Forbidden(_))
    ));
    assert!(matches!(
        responses::export::export(&db, 999, "owner_1").await,
        Err(ApiError::NotFound(_))
    ));

    let export = responses::export::export(&db, survey.id, "owner_1").await.unwrap();
    assert_eq!(export.survey.total_responses, 2);
    assert_eq!(export.questions.len(), 4);
    assert_eq!(export.responses.len(), 2);

    let csv = export.to_csv().unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(
        lines[0],
        "Response ID,Submitted At,Overall?,Score,What did you use?,Anything else?"
    );
    assert!(lines[1].ends_with(",great,,\"web, mobile\","));
    assert!(lines[2].ends_with(",,,,"));
}
