//! Authorization module: permission resolution engine
//!
//! This module implements the decision path used by every screen of the
//! practice application:
//! - Permission key parsing and RBAC action mapping (`codec`)
//! - Per-role TTL cache with coalesced misses (`cache`)
//! - Module visibility with key/display-name canonicalisation (`visibility`)
//! - Module permission matrices with `manage` as ceiling (`matrix`)
//! - The orchestrating `PermissionEngine` with fail-closed semantics (`engine`)
//! - Fire-and-forget decision auditing (`audit`)

pub mod audit;
pub mod cache;
pub mod clock;
pub mod codec;
pub mod engine;
pub mod matrix;
pub mod visibility;

#[cfg(test)]
pub(crate) mod testing;

pub use audit::{AuditSink, EventBusAuditSink, NoopAuditSink, TracingAuditSink};
pub use cache::{CacheEntry, RolePermissionCache, TtlCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{Decision, PermissionEngine};
pub use matrix::PermissionMatrixBuilder;
pub use visibility::{ModuleCatalog, ModuleVisibilityResolver};

/// Well-known role names
pub mod roles {
    pub const ADMIN: &str = "admin";
    pub const PARTNER: &str = "partner";
    pub const MANAGER: &str = "manager";
    pub const STAFF: &str = "staff";
}

/// Module whose `admin` grant allows permission administration.
pub const ADMINISTRATION_MODULE: &str = "settings";
