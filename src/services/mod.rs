// src/services/mod.rs

pub mod store;
pub mod telegram;
pub mod verification;
