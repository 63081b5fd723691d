pub mod batch;
pub mod config;
pub mod delivery;
pub mod error;
pub mod sanitize;
pub mod store;
pub mod terminal;
pub mod validate;
pub mod workdir;
pub mod xml;
