#![allow(clippy::uninlined_format_args)]

pub mod api;
pub mod app;
pub mod breadcrumbs;
pub mod config;
pub mod data;
pub mod discourse;
pub mod logging;
pub mod model;
pub mod render;
pub mod replies;
pub mod sort;
pub mod store;
pub mod sync;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::run;
