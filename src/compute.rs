//! Value computers
//!
//! Pure functions deriving secondary values from resolved attributes. They are
//! re-run at the start of every convergence run; nothing here is cached.

use crate::attributes::AttributeStore;
use crate::error::{ConvergeError, Result};
use crate::host::{AddressFamily, InterfaceResolver};
use crate::types::{AuthStrategy, DbType, MqType};
use tracing::debug;

/// One named service endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: Option<String>,
    pub scheme: String,
}

impl Endpoint {
    /// Read `openstack.endpoints.<name>.{host,port,scheme}`.
    ///
    /// The scheme falls back to `http` for bind-only endpoints that never set one.
    pub fn from_store(store: &AttributeStore, name: &str) -> Result<Self> {
        let base = format!("openstack.endpoints.{}", name);
        Ok(Self {
            host: store.string(&format!("{}.host", base))?,
            port: store.opt_string(&format!("{}.port", base))?,
            scheme: store
                .opt_string(&format!("{}.scheme", base))?
                .unwrap_or_else(|| "http".to_string()),
        })
    }

    /// `scheme://host:port/`, or `scheme://host/` without a port.
    pub fn uri(&self) -> String {
        endpoint_uri(&self.scheme, &self.host, self.port.as_deref())
    }
}

/// Build an endpoint URI with a trailing slash.
pub fn endpoint_uri(scheme: &str, host: &str, port: Option<&str>) -> String {
    match port {
        Some(port) if !port.is_empty() => format!("{}://{}:{}/", scheme, host, port),
        _ => format!("{}://{}/", scheme, host),
    }
}

/// Address a service should bind to.
///
/// When `openstack.endpoints.<name>.bind_interface` is set, the address of that
/// interface; otherwise the endpoint's own host, unchanged.
pub fn bind_host(
    store: &AttributeStore,
    name: &str,
    resolver: &dyn InterfaceResolver,
) -> Result<String> {
    let interface = store.opt_string(&format!("openstack.endpoints.{}.bind_interface", name))?;
    match interface {
        Some(interface) => {
            let family: AddressFamily = store.choice("openstack.endpoints.family", "inet or inet6")?;
            let address = resolver
                .resolve_interface_address(&interface, family)
                .map_err(|e| ConvergeError::collaborator(format!("interface[{}]", interface), e.to_string()))?;
            debug!(endpoint = name, interface = %interface, address = %address, "Resolved bind address");
            Ok(address)
        }
        None => store.string(&format!("openstack.endpoints.{}.host", name)),
    }
}

/// Comma-join `host:port` entries; an empty list yields an empty string.
pub fn join_servers<S: AsRef<str>>(servers: &[S]) -> String {
    servers
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(",")
}

/// SQLAlchemy connection string for the identity database.
pub fn db_connection(store: &AttributeStore) -> Result<String> {
    let db_type: DbType = store.choice(
        "openstack.db.identity.service_type",
        "mysql, postgresql or sqlite",
    )?;
    if db_type == DbType::Sqlite {
        let path = store.string("openstack.db.identity.sqlite_path")?;
        return Ok(format!("sqlite:///{}", path));
    }

    let user = store.string("openstack.db.identity.username")?;
    let password = store.string(crate::attributes::defaults::DB_PASSWORD)?;
    let host = store.string("openstack.db.identity.host")?;
    let port = store.string("openstack.db.identity.port")?;
    let db_name = store.string("openstack.db.identity.db_name")?;
    let suffix = match db_type {
        DbType::Mysql => "?charset=utf8",
        _ => "",
    };
    Ok(format!(
        "{}://{}:{}@{}:{}/{}{}",
        db_type.scheme(),
        user,
        password,
        host,
        port,
        db_name,
        suffix
    ))
}

/// Every derived value the renderer and graph builder consume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputedValues {
    pub public_endpoint: String,
    pub admin_endpoint: String,
    pub internal_endpoint: String,
    pub public_bind_host: String,
    pub admin_bind_host: String,
    pub public_port: String,
    pub admin_port: String,
    pub memcache_servers: String,
    pub rabbit_hosts: String,
    pub db_connection: String,
    pub db_type: DbType,
    pub mq_type: MqType,
    pub auth_strategy: AuthStrategy,
}

impl ComputedValues {
    pub fn derive(store: &AttributeStore, resolver: &dyn InterfaceResolver) -> Result<Self> {
        let public = Endpoint::from_store(store, "identity-api")?;
        let admin = Endpoint::from_store(store, "identity-admin")?;
        let internal = Endpoint::from_store(store, "identity-internal")?;

        let values = Self {
            public_endpoint: public.uri(),
            admin_endpoint: admin.uri(),
            internal_endpoint: internal.uri(),
            public_bind_host: bind_host(store, "identity-bind", resolver)?,
            admin_bind_host: bind_host(store, "identity-admin-bind", resolver)?,
            public_port: store.string("openstack.endpoints.identity-bind.port")?,
            admin_port: store.string("openstack.endpoints.identity-admin-bind.port")?,
            memcache_servers: join_servers(&store.list("openstack.memcached_servers")?),
            rabbit_hosts: join_servers(&store.list("openstack.mq.identity.rabbit.servers")?),
            db_connection: db_connection(store)?,
            db_type: store.choice("openstack.db.identity.service_type", "mysql, postgresql or sqlite")?,
            mq_type: store.choice("openstack.mq.service_type", "rabbitmq or qpid")?,
            auth_strategy: store.choice("openstack.auth.strategy", "pki or uuid")?,
        };
        debug!(
            public = %values.public_endpoint,
            admin = %values.admin_endpoint,
            "Derived computed values"
        );
        Ok(values)
    }
}
