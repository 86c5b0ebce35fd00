//! HTTP API handlers

pub mod health;
pub mod route;
pub mod sync;
