pub mod app;
pub mod auth;
pub mod clock;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod extract;
pub mod gate;
pub mod projects;
pub mod state;
pub mod store;
pub mod team;
pub mod workspaces;
