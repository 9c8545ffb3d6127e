pub mod adb;
pub mod cancel;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod scheduler;
pub mod state;
pub mod ui;
