//! Axum HTTP handlers: the chat orchestrator plus health and ingestion.

pub mod admin;
pub mod chat;
