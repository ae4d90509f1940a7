pub mod backend;
pub mod config;
pub mod gallery;
pub mod layout;
pub mod types;
pub mod utils;
