//! Tenant-isolated read models, rebuilt from committed events.

pub mod contracts;
pub mod tenant_store;

pub use contracts::{ContractDirectory, ContractProjectionError, ContractSummary};
pub use tenant_store::{InMemoryTenantStore, TenantStore};
