//! Prerender Service Library
//!
//! Composition root for the prerender server: wires the metrics registry,
//! the plugin chain and a renderer behind an axum router.
//!
//! # Request flow
//!
//! ```text
//! routes/mod.rs -> handlers/prerender.rs -> pipeline.rs (plugins) -> renderer.rs
//! ```
//!
//! # Modules
//!
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `pipeline` - Ordered plugin chain and in-flight request guard
//! - `renderer` - Renderer seam and the fetch-based renderer
//! - `routes` - Axum router setup
//! - `shutdown` - Signal handling and drain for graceful shutdown

pub mod config;
pub mod errors;
pub mod handlers;
pub mod pipeline;
pub mod renderer;
pub mod routes;
pub mod shutdown;
