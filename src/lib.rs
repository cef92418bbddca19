pub mod cli;
pub mod commands;
pub mod db;
pub mod error;
pub mod extractor;
mod migrations;
pub mod poller;
pub mod report;
pub mod runescape;
pub mod scheduler;
pub mod state;
pub mod types;
pub mod util;
