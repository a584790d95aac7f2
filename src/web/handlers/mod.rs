//! # Trigger Endpoint Handlers

pub mod health;
pub mod jobs;
