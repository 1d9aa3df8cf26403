pub mod config;
pub mod error;
pub mod store;
pub mod validation;

pub mod api;
pub mod auth;

pub mod git;
pub mod pipeline;
pub mod secrets;
pub mod security;
