#![cfg_attr(not(test), forbid(unsafe_code))]

//! Types shared between the DocChat server and its clients: domain records, the
//! stream event union carried over SSE, and the layered server configuration.

pub mod config;
pub mod models;
