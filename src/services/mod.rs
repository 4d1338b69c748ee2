//! # Services
//!
//! Collaborators injected into the jobs: object storage, secrets, HTTP
//! fetching, and the warehouse. Jobs only see the traits, so every one of
//! them can be swapped for an in-process realization in tests and local runs.

pub mod http;
pub mod object_store;
pub mod secrets;
pub mod warehouse;

pub use http::HttpFetcher;
pub use object_store::{list_all, FileSystemObjectStore, InMemoryObjectStore, ObjectPage, ObjectStore, ObjectSummary};
pub use secrets::{secret_field, EnvSecretStore, SecretStore, StaticSecretStore};
pub use warehouse::{
    PgWarehouseExecutor, QueryRows, RecordingWarehouse, SqlStatement, SqlType, SqlValue, StatementStatus,
    WarehouseClient, WarehouseExecutor,
};
