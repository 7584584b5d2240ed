//! Per-question aggregation of submitted answers.

use super::{Answer, AnswerMap};
use crate::constants::{DEFAULT_RATING_MAX, DEFAULT_RATING_MIN};
use crate::orm::questions::QuestionType;
use crate::surveys::{rating_scale, QuestionView};
use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionCount {
    pub value: String,
    pub label: String,
    pub count: u64,
    /// Share of all responses to the survey, 0 to 100, one decimal.
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatingBucket {
    pub rating: i64,
    pub count: u64,
    /// Share of all responses to the survey, 0 to 100, one decimal.
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnswerSummary {
    Choice {
        options: Vec<OptionCount>,
    },
    Rating {
        count: u64,
        mean: Option<f64>,
        distribution: Vec<RatingBucket>,
    },
    Text {
        answers: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionResults {
    pub question_id: i32,
    pub title: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    /// Responses that gave this question any answer.
    pub answered: u64,
    pub summary: AnswerSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurveyResults {
    pub survey_id: i32,
    pub title: String,
    pub total_responses: u64,
    pub questions: Vec<QuestionResults>,
    pub generated_at: NaiveDateTime,
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

fn percentage(count: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        round_to(count as f64 / total as f64 * 100.0, 1)
    }
}

fn summarize_choice<'a>(
    question: &QuestionView,
    answers: impl Iterator<Item = &'a Answer>,
    total: u64,
) -> AnswerSummary {
    let mut counts = vec![0u64; question.options.len()];

    for answer in answers {
        // A respondent counts at most once per option.
        let tokens: HashSet<String> = answer.tokens().into_iter().collect();
        for (index, option) in question.options.iter().enumerate() {
            if tokens.contains(&option.value) {
                counts[index] += 1;
            }
        }
    }

    AnswerSummary::Choice {
        options: question
            .options
            .iter()
            .zip(counts)
            .map(|(option, count)| OptionCount {
                value: option.value.clone(),
                label: option.label.clone(),
                count,
                percentage: percentage(count, total),
            })
            .collect(),
    }
}

fn summarize_rating<'a>(
    question: &QuestionView,
    answers: impl Iterator<Item = &'a Answer>,
    total: u64,
) -> AnswerSummary {
    // Stored bounds are validated on write; an unusable pair falls back to
    // the default scale rather than sizing buckets from it.
    let scale = rating_scale(question.min_value, question.max_value)
        .unwrap_or(i64::from(DEFAULT_RATING_MIN)..=i64::from(DEFAULT_RATING_MAX));
    let min = *scale.start();

    let mut counts = vec![0u64; (scale.end() - min + 1) as usize];
    let mut count = 0u64;
    let mut sum = 0i64;

    for rating in answers.filter_map(Answer::as_rating) {
        if !scale.contains(&rating) {
            continue;
        }
        count += 1;
        sum += rating;
        counts[(rating - min) as usize] += 1;
    }

    let distribution = scale
        .zip(counts)
        .map(|(rating, count)| RatingBucket {
            rating,
            count,
            percentage: percentage(count, total),
        })
        .collect();
    let mean = (count > 0).then(|| round_to(sum as f64 / count as f64, 2));
    AnswerSummary::Rating {
        count,
        mean,
        distribution,
    }
}

fn summarize_text<'a>(answers: impl Iterator<Item = &'a Answer>) -> AnswerSummary {
    AnswerSummary::Text {
        answers: answers.filter_map(Answer::as_text).collect(),
    }
}

/// Aggregate `responses` (in submission order) against the survey's questions.
/// Answers keyed by ids that are not questions of the survey are ignored.
pub fn aggregate(
    survey_id: i32,
    title: &str,
    questions: &[QuestionView],
    responses: &[AnswerMap],
    generated_at: NaiveDateTime,
) -> SurveyResults {
    let total = responses.len() as u64;

    let questions = questions
        .iter()
        .map(|question| {
            let key = question.id.to_string();
            let answered: Vec<&Answer> = responses
                .iter()
                .filter_map(|r| r.get(&key))
                .filter(|a| !a.is_blank())
                .collect();

            let summary = match question.question_type {
                t if t.is_choice() => summarize_choice(question, answered.iter().copied(), total),
                QuestionType::Rating => summarize_rating(question, answered.iter().copied(), total),
                _ => summarize_text(answered.iter().copied()),
            };

            QuestionResults {
                question_id: question.id,
                title: question.title.clone(),
                question_type: question.question_type,
                answered: answered.len() as u64,
                summary,
            }
        })
        .collect();

    SurveyResults {
        survey_id,
        title: title.to_owned(),
        total_responses: total,
        questions,
        generated_at,
    }
}
