//! Thinkgate - reasoning-tag filtering proxy for local LLM servers
//!
//! This crate provides a daemon that sits in front of an Ollama-compatible
//! inference server, strips `<think>` regions from reasoning model output
//! (including when markers are split across stream chunks), and unloads
//! models that have been idle too long.

pub mod admin;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod proxy;
pub mod testing;
pub mod thinking;
pub mod upstream;

pub use error::ThinkgateError;
