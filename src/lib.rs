pub mod config;
pub mod game;
pub mod web;

pub use config::Config;
pub use game::*;
