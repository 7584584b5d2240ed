pub mod app_config;
pub mod auth;
pub mod cache;
pub mod constants;
pub mod db;
pub mod error;
pub mod images;
pub mod middleware;
pub mod orm;
pub mod responses;
pub mod storage;
pub mod surveys;
pub mod web;
