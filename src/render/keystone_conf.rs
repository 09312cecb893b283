//! keystone.conf renderer
//!
//! Produces the primary multi-section configuration file. Lines that come
//! straight from one attribute live in [`SIMPLE_LINES`] and [`OPTIONAL_LINES`];
//! everything conditional or derived is emitted by the per-section functions.

use super::document::{ConfigDocument, Separator};
use crate::attributes::AttributeStore;
use crate::compute::ComputedValues;
use crate::error::Result;
use crate::types::{
    AssignmentBackend, AuthStrategy, BackendDriver, CatalogBackend, IdentityBackend, MqType,
    PolicyBackend, TokenBackend, python_bool,
};
use std::str::FromStr;

/// A line emitted verbatim from one attribute.
#[derive(Debug, Clone, Copy)]
pub struct SimpleLine {
    pub section: &'static str,
    pub key: &'static str,
    pub path: &'static str,
    pub separator: Separator,
}

const fn spaced(section: &'static str, key: &'static str, path: &'static str) -> SimpleLine {
    SimpleLine {
        section,
        key,
        path,
        separator: Separator::Spaced,
    }
}

const fn tight(section: &'static str, key: &'static str, path: &'static str) -> SimpleLine {
    SimpleLine {
        section,
        key,
        path,
        separator: Separator::Tight,
    }
}

/// Always-emitted lines with a schema default.
pub const SIMPLE_LINES: &[SimpleLine] = &[
    spaced("DEFAULT", "admin_token", "openstack.identity.admin_token"),
    spaced("DEFAULT", "verbose", "openstack.identity.verbose"),
    spaced("DEFAULT", "debug", "openstack.identity.debug"),
    spaced("DEFAULT", "notification_driver", "openstack.mq.identity.notification_driver"),
    spaced("DEFAULT", "notification_topics", "openstack.mq.identity.notification_topics"),
    spaced("DEFAULT", "rpc_thread_pool_size", "openstack.mq.identity.rpc_thread_pool_size"),
    spaced("DEFAULT", "rpc_response_timeout", "openstack.mq.identity.rpc_response_timeout"),
    spaced("DEFAULT", "control_exchange", "openstack.mq.identity.control_exchange"),
    tight("identity", "default_domain_id", "openstack.identity.identity.default_domain_id"),
    tight(
        "identity",
        "domain_specific_drivers_enabled",
        "openstack.identity.identity.domain_specific_drivers_enabled",
    ),
    tight("identity", "domain_config_dir", "openstack.identity.identity.domain_config_dir"),
    spaced("token", "expiration", "openstack.identity.token.expiration"),
    spaced("token", "hash_algorithm", "openstack.identity.token.hash_algorithm"),
    tight("saml", "assertion_expiration_time", "openstack.identity.saml.assertion_expiration_time"),
    tight("saml", "xmlsec1_binary", "openstack.identity.saml.xmlsec1_binary"),
    tight("saml", "certfile", "openstack.identity.saml.certfile"),
    tight("saml", "keyfile", "openstack.identity.saml.keyfile"),
    tight("saml", "idp_entity_id", "openstack.identity.saml.idp_entity_id"),
    tight("saml", "idp_sso_endpoint", "openstack.identity.saml.idp_sso_endpoint"),
    tight("saml", "idp_lang", "openstack.identity.saml.idp_lang"),
    tight("saml", "idp_organization_name", "openstack.identity.saml.idp_organization_name"),
    tight(
        "saml",
        "idp_organization_display_name",
        "openstack.identity.saml.idp_organization_display_name",
    ),
    tight("saml", "idp_organization_url", "openstack.identity.saml.idp_organization_url"),
    tight("saml", "idp_contact_company", "openstack.identity.saml.idp_contact_company"),
    tight("saml", "idp_contact_name", "openstack.identity.saml.idp_contact_name"),
    tight("saml", "idp_contact_surname", "openstack.identity.saml.idp_contact_surname"),
    tight("saml", "idp_contact_email", "openstack.identity.saml.idp_contact_email"),
    tight("saml", "idp_contact_telephone", "openstack.identity.saml.idp_contact_telephone"),
    tight("saml", "idp_contact_type", "openstack.identity.saml.idp_contact_type"),
    tight("saml", "idp_metadata_path", "openstack.identity.saml.idp_metadata_path"),
    spaced("ldap", "url", "openstack.identity.ldap.url"),
    spaced("ldap", "user", "openstack.identity.ldap.user"),
    spaced("ldap", "suffix", "openstack.identity.ldap.suffix"),
    spaced("ldap", "use_dumb_member", "openstack.identity.ldap.use_dumb_member"),
    spaced("ldap", "dumb_member", "openstack.identity.ldap.dumb_member"),
    spaced("ldap", "allow_subtree_delete", "openstack.identity.ldap.allow_subtree_delete"),
    spaced("ldap", "query_scope", "openstack.identity.ldap.query_scope"),
    spaced("ldap", "page_size", "openstack.identity.ldap.page_size"),
    spaced("ldap", "alias_dereferencing", "openstack.identity.ldap.alias_dereferencing"),
    spaced("ldap", "user_objectclass", "openstack.identity.ldap.user_objectclass"),
    spaced("ldap", "user_id_attribute", "openstack.identity.ldap.user_id_attribute"),
    spaced("ldap", "user_name_attribute", "openstack.identity.ldap.user_name_attribute"),
    spaced("ldap", "user_mail_attribute", "openstack.identity.ldap.user_mail_attribute"),
    spaced("ldap", "user_pass_attribute", "openstack.identity.ldap.user_pass_attribute"),
    spaced("ldap", "user_enabled_attribute", "openstack.identity.ldap.user_enabled_attribute"),
    spaced("ldap", "user_enabled_mask", "openstack.identity.ldap.user_enabled_mask"),
    spaced("ldap", "user_enabled_default", "openstack.identity.ldap.user_enabled_default"),
    spaced("ldap", "user_attribute_ignore", "openstack.identity.ldap.user_attribute_ignore"),
    spaced("ldap", "user_allow_create", "openstack.identity.ldap.user_allow_create"),
    spaced("ldap", "user_allow_update", "openstack.identity.ldap.user_allow_update"),
    spaced("ldap", "user_allow_delete", "openstack.identity.ldap.user_allow_delete"),
    spaced("ldap", "user_enabled_emulation", "openstack.identity.ldap.user_enabled_emulation"),
    spaced("ldap", "group_objectclass", "openstack.identity.ldap.group_objectclass"),
    spaced("ldap", "group_id_attribute", "openstack.identity.ldap.group_id_attribute"),
    spaced("ldap", "group_name_attribute", "openstack.identity.ldap.group_name_attribute"),
    spaced("ldap", "group_member_attribute", "openstack.identity.ldap.group_member_attribute"),
    spaced("ldap", "group_desc_attribute", "openstack.identity.ldap.group_desc_attribute"),
    spaced("ldap", "group_allow_create", "openstack.identity.ldap.group_allow_create"),
    spaced("ldap", "group_allow_update", "openstack.identity.ldap.group_allow_update"),
    spaced("ldap", "group_allow_delete", "openstack.identity.ldap.group_allow_delete"),
    spaced("ldap", "project_objectclass", "openstack.identity.ldap.project_objectclass"),
    spaced("ldap", "project_id_attribute", "openstack.identity.ldap.project_id_attribute"),
    spaced("ldap", "project_member_attribute", "openstack.identity.ldap.project_member_attribute"),
    spaced("ldap", "project_name_attribute", "openstack.identity.ldap.project_name_attribute"),
    spaced("ldap", "project_desc_attribute", "openstack.identity.ldap.project_desc_attribute"),
    spaced("ldap", "project_enabled_attribute", "openstack.identity.ldap.project_enabled_attribute"),
    spaced(
        "ldap",
        "project_domain_id_attribute",
        "openstack.identity.ldap.project_domain_id_attribute",
    ),
    spaced("ldap", "project_allow_create", "openstack.identity.ldap.project_allow_create"),
    spaced("ldap", "project_allow_update", "openstack.identity.ldap.project_allow_update"),
    spaced("ldap", "project_allow_delete", "openstack.identity.ldap.project_allow_delete"),
    spaced("ldap", "project_enabled_emulation", "openstack.identity.ldap.project_enabled_emulation"),
    spaced("ldap", "role_objectclass", "openstack.identity.ldap.role_objectclass"),
    spaced("ldap", "role_id_attribute", "openstack.identity.ldap.role_id_attribute"),
    spaced("ldap", "role_name_attribute", "openstack.identity.ldap.role_name_attribute"),
    spaced("ldap", "role_member_attribute", "openstack.identity.ldap.role_member_attribute"),
    spaced("ldap", "role_allow_create", "openstack.identity.ldap.role_allow_create"),
    spaced("ldap", "role_allow_update", "openstack.identity.ldap.role_allow_update"),
    spaced("ldap", "role_allow_delete", "openstack.identity.ldap.role_allow_delete"),
];

/// Lines emitted only when their attribute holds a value.
pub const OPTIONAL_LINES: &[SimpleLine] = &[
    tight("DEFAULT", "list_limit", "openstack.identity.list_limit"),
    tight("eventlet_server", "admin_workers", "openstack.identity.admin_workers"),
    tight("eventlet_server", "public_workers", "openstack.identity.public_workers"),
    tight("identity", "list_limit", "openstack.identity.identity.list_limit"),
    tight("assignment", "list_limit", "openstack.identity.assignment.list_limit"),
    tight("catalog", "list_limit", "openstack.identity.catalog.list_limit"),
    tight("policy", "list_limit", "openstack.identity.policy.list_limit"),
    spaced("ldap", "password", "openstack.identity.ldap.password"),
    spaced("ldap", "user_tree_dn", "openstack.identity.ldap.user_tree_dn"),
    spaced("ldap", "user_filter", "openstack.identity.ldap.user_filter"),
    spaced("ldap", "user_enabled_emulation_dn", "openstack.identity.ldap.user_enabled_emulation_dn"),
    spaced("ldap", "group_tree_dn", "openstack.identity.ldap.group_tree_dn"),
    spaced("ldap", "group_filter", "openstack.identity.ldap.group_filter"),
    spaced("ldap", "group_attribute_ignore", "openstack.identity.ldap.group_attribute_ignore"),
    spaced("ldap", "project_tree_dn", "openstack.identity.ldap.project_tree_dn"),
    spaced("ldap", "project_filter", "openstack.identity.ldap.project_filter"),
    spaced("ldap", "project_attribute_ignore", "openstack.identity.ldap.project_attribute_ignore"),
    spaced(
        "ldap",
        "project_enabled_emulation_dn",
        "openstack.identity.ldap.project_enabled_emulation_dn",
    ),
    spaced("ldap", "role_tree_dn", "openstack.identity.ldap.role_tree_dn"),
    spaced("ldap", "role_filter", "openstack.identity.ldap.role_filter"),
    spaced("ldap", "role_attribute_ignore", "openstack.identity.ldap.role_attribute_ignore"),
];

/// Render keystone.conf from resolved and computed values.
pub fn render_keystone_conf(store: &AttributeStore, computed: &ComputedValues) -> Result<ConfigDocument> {
    let mut doc = ConfigDocument::new();

    render_default(&mut doc, store, computed)?;
    render_backend::<AssignmentBackend>(&mut doc, store, "assignment", "sql or ldap")?;
    render_catalog(&mut doc, store)?;
    doc.section("database").set("connection", computed.db_connection.clone());
    render_eventlet(&mut doc, store, computed)?;
    render_backend::<IdentityBackend>(&mut doc, store, "identity", "sql, ldap or pam")?;
    render_ldap(&mut doc, store)?;
    doc.section("memcache").set("servers", computed.memcache_servers.clone());
    render_messaging(&mut doc, store, computed)?;
    render_backend::<PolicyBackend>(&mut doc, store, "policy", "sql or rules")?;
    emit_table(&mut doc, store, "saml")?;
    render_signing(&mut doc, store, computed)?;
    render_token(&mut doc, store, computed)?;

    Ok(doc)
}

/// Emit the table-driven lines for one section.
fn emit_table(doc: &mut ConfigDocument, store: &AttributeStore, section: &str) -> Result<()> {
    for line in SIMPLE_LINES.iter().filter(|l| l.section == section) {
        let value = store.string(line.path)?;
        doc.section(section).set_with(line.key, value, line.separator);
    }
    for line in OPTIONAL_LINES.iter().filter(|l| l.section == section) {
        if let Some(value) = store.opt_string(line.path)? {
            doc.section(section).set_with(line.key, value, line.separator);
        }
    }
    Ok(())
}

/// Resolve `openstack.identity.<subsystem>.backend` to its driver literal.
fn driver_for<T>(store: &AttributeStore, subsystem: &str, expected: &str) -> Result<String>
where
    T: BackendDriver + FromStr,
{
    let backend: T = store.choice(&format!("openstack.identity.{}.backend", subsystem), expected)?;
    Ok(backend.driver().to_string())
}

fn render_backend<T>(doc: &mut ConfigDocument, store: &AttributeStore, subsystem: &str, expected: &str) -> Result<()>
where
    T: BackendDriver + FromStr,
{
    let driver = driver_for::<T>(store, subsystem, expected)?;
    doc.section(subsystem).set("driver", driver);
    emit_table(doc, store, subsystem)
}

fn render_default(doc: &mut ConfigDocument, store: &AttributeStore, computed: &ComputedValues) -> Result<()> {
    emit_table(doc, store, "DEFAULT")?;

    let section = doc.section("DEFAULT");
    section
        .set("public_endpoint", computed.public_endpoint.clone())
        .set("admin_endpoint", computed.admin_endpoint.clone())
        .set("rpc_backend", computed.mq_type.rpc_backend());

    if store.flag("openstack.identity.syslog.use")? {
        section.set(
            "log_config_append",
            store.string("openstack.identity.syslog.config_file")?,
        );
    } else {
        section.set("log_file", store.string("openstack.identity.log_file")?);
    }

    for extra in store.list("openstack.identity.misc_keystone")? {
        section.raw(extra);
    }
    Ok(())
}

fn render_catalog(doc: &mut ConfigDocument, store: &AttributeStore) -> Result<()> {
    render_backend::<CatalogBackend>(doc, store, "catalog", "sql or templated")?;
    let backend: CatalogBackend = store.choice("openstack.identity.catalog.backend", "sql or templated")?;
    if backend == CatalogBackend::Templated {
        doc.section("catalog").set(
            "template_file",
            store.string("openstack.identity.catalog.template_file")?,
        );
    }
    Ok(())
}

fn render_eventlet(doc: &mut ConfigDocument, store: &AttributeStore, computed: &ComputedValues) -> Result<()> {
    doc.section("eventlet_server")
        .set("public_bind_host", computed.public_bind_host.clone())
        .set("admin_bind_host", computed.admin_bind_host.clone())
        .set("public_port", computed.public_port.clone())
        .set("admin_port", computed.admin_port.clone());
    emit_table(doc, store, "eventlet_server")?;

    if store.flag("openstack.identity.ssl.enabled")? {
        let basedir = store.string("openstack.identity.ssl.basedir")?;
        let file = |key: &str| store.string(&format!("openstack.identity.ssl.{}", key));
        let cert_required = store.flag("openstack.identity.ssl.cert_required")?;
        doc.section("eventlet_server_ssl")
            .set("enable", python_bool(true))
            .set("certfile", format!("{}/certs/{}", basedir, file("certfile")?))
            .set("keyfile", format!("{}/private/{}", basedir, file("keyfile")?))
            .set("ca_certs", format!("{}/certs/{}", basedir, file("ca_certs")?))
            .set("cert_required", cert_required.to_string());
    }
    Ok(())
}

fn render_ldap(doc: &mut ConfigDocument, store: &AttributeStore) -> Result<()> {
    emit_table(doc, store, "ldap")?;

    let use_tls = store.flag_or("openstack.identity.ldap.use_tls", false)?;
    let section = doc.section("ldap");
    section.set("use_tls", use_tls.to_string());
    if use_tls {
        let cacertfile = store.opt_string("openstack.identity.ldap.tls_cacertfile")?;
        let cacertdir = store.opt_string("openstack.identity.ldap.tls_cacertdir")?;
        match (cacertfile, cacertdir) {
            (Some(file), _) => {
                section.set("tls_cacertfile", file);
            }
            (None, Some(dir)) => {
                section.set("tls_cacertdir", dir);
            }
            (None, None) => {}
        }
        section.set("tls_req_cert", store.string("openstack.identity.ldap.tls_req_cert")?);
    }
    Ok(())
}

fn render_messaging(doc: &mut ConfigDocument, store: &AttributeStore, computed: &ComputedValues) -> Result<()> {
    let mq = |key: &str| store.string(&format!("openstack.mq.identity.{}", key));
    let (name, prefix) = match computed.mq_type {
        MqType::Rabbitmq => ("oslo_messaging_rabbit", "rabbit"),
        MqType::Qpid => ("oslo_messaging_qpid", "qpid"),
    };

    let section = doc.section(name);
    section
        .set("amqp_durable_queues", mq("durable_queues")?)
        .set("amqp_auto_delete", mq("auto_delete")?)
        .set("rpc_conn_pool_size", mq("rpc_conn_pool_size")?);

    let field = |key: &str| mq(&format!("{}.{}", prefix, key));
    match computed.mq_type {
        MqType::Rabbitmq => {
            let flag = |key: &str| store.flag_or(&format!("openstack.mq.identity.rabbit.{}", key), false);
            if flag("ha")? {
                section
                    .set("rabbit_hosts", computed.rabbit_hosts.clone())
                    .set("rabbit_ha_queues", "true");
            } else {
                section
                    .set("rabbit_host", field("host")?)
                    .set("rabbit_port", field("port")?);
            }
            let use_ssl = flag("use_ssl")?;
            section.set("rabbit_use_ssl", use_ssl.to_string());
            if use_ssl {
                section.set_opt(
                    "kombu_ssl_version",
                    store.opt_string("openstack.mq.identity.rabbit.kombu_ssl_version")?,
                );
            }
            section
                .set("rabbit_userid", field("userid")?)
                .set("rabbit_password", field("password")?)
                .set("rabbit_virtual_host", field("vhost")?);
        }
        MqType::Qpid => {
            for (key, attr) in [
                ("qpid_hostname", "host"),
                ("qpid_port", "port"),
                ("qpid_username", "username"),
                ("qpid_password", "password"),
                ("qpid_sasl_mechanisms", "sasl_mechanisms"),
                ("qpid_heartbeat", "heartbeat"),
                ("qpid_protocol", "protocol"),
                ("qpid_tcp_nodelay", "tcp_nodelay"),
                ("qpid_topology_version", "topology_version"),
            ] {
                section.set(key, field(attr)?);
            }
        }
    }
    Ok(())
}

fn render_signing(doc: &mut ConfigDocument, store: &AttributeStore, computed: &ComputedValues) -> Result<()> {
    if computed.auth_strategy != AuthStrategy::Pki {
        return Ok(());
    }
    let signing = |key: &str| store.string(&format!("openstack.identity.signing.{}", key));
    doc.section("signing")
        .set("certfile", signing("certfile")?)
        .set("keyfile", signing("keyfile")?)
        .set("ca_certs", signing("ca_certs")?)
        .set("key_size", signing("key_size")?)
        .set("valid_days", signing("valid_days")?)
        .set(
            "ca_password",
            store
                .opt_string("openstack.identity.signing.ca_password")?
                .unwrap_or_default(),
        )
        .set("cert_subject", signing("cert_subject")?);
    Ok(())
}

fn render_token(doc: &mut ConfigDocument, store: &AttributeStore, computed: &ComputedValues) -> Result<()> {
    let driver = driver_for::<TokenBackend>(store, "token", "a token backend or driver class")?;
    let provider = match computed.auth_strategy {
        AuthStrategy::Pki => "keystone.token.providers.pki.Provider",
        AuthStrategy::Uuid => "keystone.token.providers.uuid.Provider",
    };
    doc.section("token").set("driver", driver).set("provider", provider);
    emit_table(doc, store, "token")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::defaults::DB_PASSWORD;
    use crate::host::mock::MockHost;

    fn render(store: &AttributeStore) -> ConfigDocument {
        let computed = ComputedValues::derive(store, &MockHost::new()).unwrap();
        render_keystone_conf(store, &computed).unwrap()
    }

    fn store() -> AttributeStore {
        let mut store = AttributeStore::with_defaults();
        store.set_override(DB_PASSWORD, "db-pass");
        store
    }

    #[test]
    fn test_default_section_basics() {
        let doc = render(&store());
        assert_eq!(doc.get("DEFAULT", "admin_token"), Some("bootstrap-token"));
        assert_eq!(doc.get("DEFAULT", "rpc_backend"), Some("rabbit"));
        assert_eq!(doc.get("DEFAULT", "log_file"), Some("/var/log/keystone/keystone.log"));
        assert!(doc.get("DEFAULT", "log_config_append").is_none());
    }

    #[test]
    fn test_syslog_swaps_log_file() {
        let mut store = store();
        store.set_override("openstack.identity.syslog.use", true);
        let doc = render(&store);
        assert_eq!(
            doc.get("DEFAULT", "log_config_append"),
            Some("/etc/openstack/logging.conf")
        );
        assert!(doc.get("DEFAULT", "log_file").is_none());
    }

    #[test]
    fn test_exactly_one_driver_per_backend() {
        let mut store = store();
        store.set_override("openstack.identity.catalog.backend", "templated");
        let doc = render(&store);
        let catalog = doc.get_section("catalog").unwrap();
        assert_eq!(
            catalog.get("driver"),
            Some("keystone.catalog.backends.templated.TemplatedCatalog")
        );
        assert!(!doc.contains_line("driver = keystone.catalog.backends.sql.Catalog"));
        assert_eq!(doc.sections_with_key("template_file"), vec!["catalog"]);
    }

    #[test]
    fn test_unknown_backend_is_invalid_value() {
        let mut store = store();
        store.set_override("openstack.identity.policy.backend", "mongo");
        let computed = ComputedValues::derive(&store, &MockHost::new()).unwrap();
        let err = render_keystone_conf(&store, &computed).unwrap_err();
        assert!(matches!(err, crate::error::ConvergeError::InvalidValue { .. }));
    }

    #[test]
    fn test_ssl_guard_non_boolean_is_fatal() {
        let mut store = store();
        store.set_override("openstack.identity.ssl.enabled", "yes");
        let computed = ComputedValues::derive(&store, &MockHost::new()).unwrap();
        let err = render_keystone_conf(&store, &computed).unwrap_err();
        assert!(
            matches!(err, crate::error::ConvergeError::GuardEvaluation { ref path, .. } if path == "openstack.identity.ssl.enabled")
        );
    }

    #[test]
    fn test_qpid_replaces_rabbit_section() {
        let mut store = store();
        store.set_override("openstack.mq.service_type", "qpid");
        let doc = render(&store);
        assert!(!doc.has_section("oslo_messaging_rabbit"));
        assert_eq!(doc.get("oslo_messaging_qpid", "qpid_sasl_mechanisms"), Some(""));
        assert_eq!(doc.get("oslo_messaging_qpid", "qpid_tcp_nodelay"), Some("true"));
        assert_eq!(doc.get("DEFAULT", "rpc_backend"), Some("qpid"));
    }

    #[test]
    fn test_token_provider_follows_strategy() {
        let mut store = store();
        assert_eq!(
            render(&store).get("token", "provider"),
            Some("keystone.token.providers.pki.Provider")
        );
        store.set_override("openstack.auth.strategy", "uuid");
        assert_eq!(
            render(&store).get("token", "provider"),
            Some("keystone.token.providers.uuid.Provider")
        );
    }

    #[test]
    fn test_table_paths_exist_in_schema() {
        for line in SIMPLE_LINES.iter().chain(OPTIONAL_LINES) {
            assert!(
                crate::attributes::defaults::default_for(line.path).is_some(),
                "{} has no schema default",
                line.path
            );
        }
    }
}
