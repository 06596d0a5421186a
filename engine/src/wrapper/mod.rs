pub mod mysql;
pub mod mysqldump;
pub mod pg_dump;
pub mod psql;

// Re-export for convenience
pub use mysql::MysqlClient;
pub use mysqldump::MysqlDump;
pub use pg_dump::PgDump;
pub use psql::Psql;
