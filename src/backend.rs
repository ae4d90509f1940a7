pub mod api;
pub mod config;
pub mod coordinator;
pub mod engagement;
#[cfg(test)]
pub(crate) mod mock;
pub mod model;
mod watch;
pub mod watches;

pub use api::{GalleryApi, HttpApi};
pub use watch::{Watch, Watcher};
