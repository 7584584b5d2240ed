//! SeaORM entities for the survey schema.

pub mod question_options;
pub mod questions;
pub mod survey_images;
pub mod survey_responses;
pub mod surveys;
