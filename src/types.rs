//! Type-safe selector types for the identity server
//!
//! Enum-valued attributes (database type, messaging backend, auth strategy and
//! the per-subsystem backend drivers) are parsed into these enums once, so the
//! renderer and graph builder match exhaustively instead of comparing strings.

use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use strum::{Display, EnumIter, EnumString};

/// Maps a backend selector to the one driver literal it stands for.
pub trait BackendDriver {
    /// Fully qualified driver class emitted as `driver = ...`.
    fn driver(&self) -> &str;
}

/// Database service type (`openstack.db.identity.service_type`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum DbType {
    #[default]
    Mysql,
    Postgresql,
    Sqlite,
}

impl DbType {
    /// Attribute holding the python binding packages for this database.
    pub fn python_packages_attr(&self) -> String {
        format!("openstack.identity.platform.{}_python_packages", self)
    }

    /// Connection-string scheme.
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Mysql => "mysql",
            Self::Postgresql => "postgresql",
            Self::Sqlite => "sqlite",
        }
    }
}

/// Messaging service type (`openstack.mq.service_type`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum MqType {
    #[default]
    Rabbitmq,
    Qpid,
}

impl MqType {
    /// Value of the `rpc_backend` line.
    pub fn rpc_backend(&self) -> &'static str {
        match self {
            Self::Rabbitmq => "rabbit",
            Self::Qpid => "qpid",
        }
    }
}

/// Token signing strategy (`openstack.auth.strategy`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum AuthStrategy {
    #[default]
    Pki,
    Uuid,
}

impl AuthStrategy {
    pub fn is_pki(&self) -> bool {
        matches!(self, Self::Pki)
    }
}

/// `[identity] driver`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum IdentityBackend {
    #[default]
    Sql,
    Ldap,
    Pam,
}

impl BackendDriver for IdentityBackend {
    fn driver(&self) -> &str {
        match self {
            Self::Sql => "keystone.identity.backends.sql.Identity",
            Self::Ldap => "keystone.identity.backends.ldap.Identity",
            Self::Pam => "keystone.identity.backends.pam.PamIdentity",
        }
    }
}

/// `[assignment] driver`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum AssignmentBackend {
    #[default]
    Sql,
    Ldap,
}

impl BackendDriver for AssignmentBackend {
    fn driver(&self) -> &str {
        match self {
            Self::Sql => "keystone.assignment.backends.sql.Assignment",
            Self::Ldap => "keystone.assignment.backends.ldap.Assignment",
        }
    }
}

/// `[catalog] driver`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum CatalogBackend {
    #[default]
    Sql,
    Templated,
}

impl BackendDriver for CatalogBackend {
    fn driver(&self) -> &str {
        match self {
            Self::Sql => "keystone.catalog.backends.sql.Catalog",
            Self::Templated => "keystone.catalog.backends.templated.TemplatedCatalog",
        }
    }
}

/// `[token] driver`
///
/// Unlike the other backends, any value is accepted: an unknown selector is
/// taken to be a driver class and emitted as is.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TokenBackend {
    #[default]
    Sql,
    Memcache,
    MemcachePool,
    Kvs,
    Other(String),
}

impl TokenBackend {
    /// Only the sql backend keeps expired tokens around to flush.
    pub fn is_sql(&self) -> bool {
        matches!(self, Self::Sql)
    }
}

impl FromStr for TokenBackend {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "sql" => Self::Sql,
            "memcache" => Self::Memcache,
            "memcache_pool" => Self::MemcachePool,
            "kvs" => Self::Kvs,
            other => Self::Other(other.to_string()),
        })
    }
}

impl fmt::Display for TokenBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sql => write!(f, "sql"),
            Self::Memcache => write!(f, "memcache"),
            Self::MemcachePool => write!(f, "memcache_pool"),
            Self::Kvs => write!(f, "kvs"),
            Self::Other(name) => write!(f, "{}", name),
        }
    }
}

impl BackendDriver for TokenBackend {
    fn driver(&self) -> &str {
        match self {
            Self::Sql => "keystone.token.persistence.backends.sql.Token",
            Self::Memcache => "keystone.token.persistence.backends.memcache.Token",
            Self::MemcachePool => "keystone.token.persistence.backends.memcache_pool.Token",
            Self::Kvs => "keystone.token.persistence.backends.kvs.Token",
            Self::Other(driver) => driver,
        }
    }
}

/// `[policy] driver`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum PolicyBackend {
    #[default]
    Sql,
    Rules,
}

impl BackendDriver for PolicyBackend {
    fn driver(&self) -> &str {
        match self {
            Self::Sql => "keystone.policy.backends.sql.Policy",
            Self::Rules => "keystone.policy.backends.rules.Policy",
        }
    }
}

/// Owner, group and permission bits for a file or directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ownership {
    pub owner: String,
    pub group: String,
    pub mode: u32,
}

impl Ownership {
    pub fn new(owner: impl Into<String>, group: impl Into<String>, mode: u32) -> Self {
        Self {
            owner: owner.into(),
            group: group.into(),
            mode,
        }
    }
}

impl fmt::Display for Ownership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} {:04o}", self.owner, self.group, self.mode)
    }
}

/// Render a boolean the way Python configuration parsers spell it.
pub fn python_bool(value: bool) -> &'static str {
    if value { "True" } else { "False" }
}
