pub mod chat_service;
pub mod chat_stream;
pub mod completion;
pub mod completion_client;
pub mod memory_store;
pub mod pg_store;
pub mod prompt;
pub mod repository;

#[cfg(test)]
mod chat_stream_tests;
