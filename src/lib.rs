//! Agora - marketplace and forum backend
//!
//! Comments and reviews flow through a moderation pipeline: toxicity
//! analysis, a threshold policy, community reports, appeals and bulk
//! moderator actions, with reputation and priority-routed notifications
//! as side effects.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
