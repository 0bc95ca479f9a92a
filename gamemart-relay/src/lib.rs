pub mod config;
pub mod msgid;
pub mod server;
pub mod session;
pub mod state;
pub mod web;
