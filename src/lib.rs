pub mod app;
pub mod bot;
pub mod cli;
pub mod config;
pub mod delivery;
pub mod global;
pub mod index;
pub mod lock;
pub mod meeting;
pub mod project;
pub mod session;
pub mod zoom;
