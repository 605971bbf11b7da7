//! HTTP request handlers for the prerender service.

pub mod health;
pub mod prerender;

pub use health::health_check;
pub use prerender::prerender_handler;
