//! flow-persistence
//!
//! Implementación Postgres (Diesel) del contrato `FlowStore` de flow-core,
//! más utilidades de conexión y migraciones. La semántica es paridad 1:1
//! con el backend en memoria; la diferencia es durabilidad y que el lock
//! por registro y la atomicidad los provee la base (FOR UPDATE +
//! transacción + FKs en cascada).
//!
//! Módulos:
//! - `pg`: `PgFlowStore` y helpers de pool.
//! - `migrations`: runner embebido de migraciones Diesel.
//! - `config`: carga de configuración desde .env.
//! - `schema`: tablas Diesel declaradas para compilar queries.

pub mod config;
pub mod error;
pub mod migrations;
pub mod pg;
pub mod schema;

pub use config::init_dotenv;
pub use error::PersistenceError;
pub use pg::{build_dev_pool_from_env, build_pool, ConnectionProvider, PgFlowStore, PgPool, PoolProvider};
