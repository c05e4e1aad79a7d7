//! Data Store backends.

pub mod postgres;

pub use postgres::PostgresDataStore;
