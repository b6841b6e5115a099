pub mod analyze;
pub mod config;
pub mod download;
pub mod filter;
pub mod input;
pub mod models;
pub mod output;
pub mod package;
pub mod search;
pub mod tree;
pub mod unpack;

pub use config::Limits;
pub use models::*;
pub use package::{ExtensionPackage, PackageError};
