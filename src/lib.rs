// Library for tests to access modules

pub mod analytics;
pub mod backfill;
pub mod config;
pub mod error;
pub mod models;
pub mod query;
pub mod rollup_repo;
pub mod rollup_worker;
pub mod routes;
pub mod version;
