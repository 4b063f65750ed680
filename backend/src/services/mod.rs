// src/services/mod.rs

pub mod auth;
pub mod exam;
pub mod maintenance;
