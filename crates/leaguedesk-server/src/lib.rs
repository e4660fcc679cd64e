pub mod app;
pub mod cli;
pub mod config;
pub mod context;
pub mod db;
pub mod import;
pub mod protocol;
pub mod ws_server;
