//! # Prerender Test Utilities
//!
//! Shared test utilities for the prerender service.
//!
//! This crate provides:
//! - Server test harness (`TestPrerenderServer` for E2E tests)
//! - Scriptable renderer (`MockRenderer`)
//!
//! ## Usage
//!
//! ```rust,no_run
//! use prerender_test_utils::*;
//! use std::sync::Arc;
//!
//! async fn render_example_page() -> Result<(), anyhow::Error> {
//!     let server = TestPrerenderServer::spawn(Arc::new(MockRenderer::html("<html></html>"))).await?;
//!
//!     let response = reqwest::get(format!("{}/https://example.com/", server.url())).await?;
//!
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```

pub mod mock_renderer;
pub mod server_harness;

// Re-export commonly used items
pub use mock_renderer::*;
pub use server_harness::*;
