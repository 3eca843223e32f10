pub mod catalog;
pub mod coerce;
pub mod config;
pub mod database_sea;
pub mod error;
pub mod import_processor_sea;
pub mod import_records;
pub mod mapping;
pub mod materializer;
pub mod models;
pub mod normalize;
pub mod spreadsheet;
pub mod web_server;
