// src/handlers/mod.rs

pub mod install;
pub mod webhook;

pub use install::{handle_install, handle_uninstall};
pub use webhook::handle_webhook;
