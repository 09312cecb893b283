//! Package & Service Resolver
//!
//! Translates the database selection and platform attributes into concrete
//! package names and the service name.
//!
//! # Design
//!
//! - **No hardcoded names**: package lists come from `openstack.identity.platform.*`
//! - **Deduplication**: a package listed twice is declared once, first position wins
//! - **Pure logic**: No I/O, no side effects, only resolves names
//!
//! # Resolution Rules
//!
//! | Attribute                         | Resolved To |
//! |-----------------------------------|-------------|
//! | `db.identity.service_type`        | `<db>_python_packages` |
//! | (always)                          | `memcache_python_packages` |
//! | (always)                          | `keystone_packages` |
//! | `platform.keystone_service`       | service name |

use crate::attributes::AttributeStore;
use crate::error::Result;
use crate::types::DbType;

// ============================================================================
// Package Resolution
// ============================================================================

/// Resolve every package the identity server needs, in install order.
///
/// Database bindings come first, then the memcache binding, then the service
/// packages. An empty platform list (sqlite ships no binding) contributes
/// nothing.
pub fn resolve_packages(store: &AttributeStore) -> Result<Vec<String>> {
    let db_type: DbType = store.choice(
        "openstack.db.identity.service_type",
        "mysql, postgresql or sqlite",
    )?;

    let mut packages = Vec::new();
    packages.extend(store.list(&db_type.python_packages_attr())?);
    packages.extend(store.list("openstack.identity.platform.memcache_python_packages")?);
    packages.extend(store.list("openstack.identity.platform.keystone_packages")?);

    Ok(dedup_preserving_order(packages))
}

/// Packages providing the service itself (the last group above).
pub fn service_packages(store: &AttributeStore) -> Result<Vec<String>> {
    Ok(dedup_preserving_order(
        store.list("openstack.identity.platform.keystone_packages")?,
    ))
}

// ============================================================================
// Service Resolution
// ============================================================================

/// Name of the system service running the identity API.
pub fn resolve_service(store: &AttributeStore) -> Result<String> {
    store.string("openstack.identity.platform.keystone_service")
}

fn dedup_preserving_order(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|item| !item.trim().is_empty() && seen.insert(item.clone()))
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
