pub mod answer_bank;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod loader;
pub mod questionnaire;
