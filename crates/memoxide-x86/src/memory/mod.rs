pub mod cache;
pub mod config;
pub mod error;
pub mod layers;
pub mod model;
pub mod process;
pub mod traits;
pub mod translators;
pub mod types;
