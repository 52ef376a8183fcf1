//! HTTP API exposing the question answering pipeline

pub mod handler;
pub mod server;

pub use server::{router, HttpServer};
