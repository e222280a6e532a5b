pub mod batch;
pub mod cli;
pub mod config;
pub mod db;
pub mod dedup;
pub mod dhash;
pub mod hamming;
pub mod imdedup;
pub mod imgproc;
mod metrics;
mod server;
pub mod utils;

pub use config::Opts;
pub use imdedup::{ImDedup, ImDedupBuilder};
