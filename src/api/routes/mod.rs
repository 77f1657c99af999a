//! API Routes
//!
//! Route handlers organized by functionality.

pub mod broadcast;
pub mod devices;
pub mod health;
