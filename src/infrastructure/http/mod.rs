//! Read-only operations surface over the delivery engine.

pub mod controllers;
pub mod middleware;
pub mod router;

pub use router::build_router;
