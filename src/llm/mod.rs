//! Clients for the opaque external models: embeddings and chat completion.

pub mod chat;
pub mod embeddings;
