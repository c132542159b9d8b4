//! Forum thread notifier library.
//!
//! Watches paginated forum threads on behalf of email subscribers and sends
//! a notification whenever new posts appear, checking quiet threads less often.

pub mod config;
pub mod constants;
pub mod email;
pub mod error;
pub mod forum;
pub mod models;
pub mod poll;
pub mod retry;
pub mod store;
pub mod web;
