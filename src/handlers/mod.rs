// src/handlers/mod.rs

pub mod auth;
pub mod config;
pub mod questions;
pub mod submissions;
pub mod users;
