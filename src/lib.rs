pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use app::LunchTools;
pub use config::AppConfig;
pub use core::{
    date_resolver::DateResolver, menu_store::MenuStore, order_client::OrderClient, query::QueryEngine,
};
pub use utils::error::{LunchError, Result};
