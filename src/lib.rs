use anyhow::Result;

pub mod auth;
pub mod config;
pub mod error;
pub mod flatten;
pub mod http;
pub mod ingest;
pub mod reconcile;
pub mod sheets;
pub mod store;
pub mod timestamp;
pub mod types;

pub const APP_NAME: &str = "proposalsync";

pub fn set_up_logger(calling_module: &'static str, verbose: bool) -> Result<()> {
    jluszcz_rust_utils::set_up_logger(APP_NAME, calling_module, verbose)?;
    Ok(())
}
