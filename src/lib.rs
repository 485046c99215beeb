pub mod config;
pub mod models;
pub mod lookup;
pub mod scan;
