//! BDD step definitions for the uptime tracker

pub mod api_steps;
pub mod cache_steps;
pub mod pipeline_steps;
pub mod retention_steps;
