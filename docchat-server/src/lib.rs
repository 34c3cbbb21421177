//! DocChat server: chats over uploaded documents with live updates via server-sent events.

pub mod app_state;
pub mod db;
pub mod handlers;
pub mod http;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod services;
mod tracer;

#[cfg(test)]
mod tracer_tests;
