// src/models/mod.rs

pub mod exam_config;
pub mod question;
pub mod submission;
pub mod user;
