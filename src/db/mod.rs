pub mod postgres;

pub use postgres::PostgresTickStore;
