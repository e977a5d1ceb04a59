pub mod app;
pub mod archive;
pub mod config;
pub mod credentials;
pub mod file_item;
pub mod models;
pub mod prompt_builder;
pub mod remote;
pub mod session;
pub mod token_count;
