/*
 * Responsibility
 * - Identity & policy store: the read-only query surface the gateway needs
 * - Postgres (sqlx) and in-memory (seed file) implementations
 */
pub mod error;
pub mod memory;
pub mod model;
pub mod policy_repo;
pub mod seed;
pub mod store;

pub use error::{RepoError, RepoResult};
pub use memory::MemoryPolicyStore;
pub use model::{AccessPermission, Role, Service, User};
pub use policy_repo::PgPolicyStore;
pub use store::PolicyStore;
