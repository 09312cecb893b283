//! Attribute schema for the identity-server node
//!
//! Every attribute the renderer, value computers, and graph builder read has an
//! entry here. `Literal::Nil` documents an attribute whose absence is meaningful
//! (an optional line that is not emitted, an optional URL that disables a
//! resource). The only required attribute without a default is the database
//! password, which must come from an attribute file.

use super::{AttrValue, AttributeStore, Tier};

/// A default literal in the schema table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Literal {
    Nil,
    Bool(bool),
    Int(i64),
    Str(&'static str),
    List(&'static [&'static str]),
}

impl Literal {
    pub fn to_value(self) -> AttrValue {
        match self {
            Self::Nil => AttrValue::Null,
            Self::Bool(b) => AttrValue::Bool(b),
            Self::Int(i) => AttrValue::Int(i),
            Self::Str(s) => AttrValue::Str(s.to_string()),
            Self::List(items) => AttrValue::List(items.iter().map(|s| s.to_string()).collect()),
        }
    }
}

use Literal::{Bool, Int, List, Nil, Str};

/// Path of the one required attribute without a default.
pub const DB_PASSWORD: &str = "openstack.db.identity.password";

/// Default pipeline for the public API.
pub const PUBLIC_API_PIPELINE: &str = "sizelimit url_normalize request_id build_auth_context token_auth admin_token_auth json_body ec2_extension user_crud_extension public_service";

/// Default pipeline for the admin API.
pub const ADMIN_API_PIPELINE: &str = "sizelimit url_normalize request_id build_auth_context token_auth admin_token_auth json_body ec2_extension s3_extension crud_extension admin_service";

/// Default pipeline for the v3 API.
pub const API_V3_PIPELINE: &str = "sizelimit url_normalize request_id build_auth_context token_auth admin_token_auth json_body ec2_extension_v3 s3_extension simple_cert_extension revoke_extension federation_extension oauth1_extension endpoint_filter_extension endpoint_policy_extension service_v3";

/// The default tier, as `(dotted path, literal)` pairs.
pub const SCHEMA: &[(&str, Literal)] = &[
    // General
    ("openstack.identity.admin_token", Str("bootstrap-token")),
    ("openstack.identity.user", Str("keystone")),
    ("openstack.identity.group", Str("keystone")),
    ("openstack.identity.verbose", Str("False")),
    ("openstack.identity.debug", Str("False")),
    ("openstack.identity.log_file", Str("/var/log/keystone/keystone.log")),
    ("openstack.identity.syslog.use", Bool(false)),
    ("openstack.identity.syslog.config_file", Str("/etc/openstack/logging.conf")),
    ("openstack.identity.syslog.facility", Str("LOG_LOCAL2")),
    ("openstack.identity.syslog.error_facility", Str("LOG_LOCAL1")),
    ("openstack.identity.region", Str("RegionOne")),
    ("openstack.identity.list_limit", Nil),
    ("openstack.identity.admin_workers", Nil),
    ("openstack.identity.public_workers", Nil),
    ("openstack.identity.misc_keystone", List(&[])),
    ("openstack.identity.misc_paste", List(&[])),
    ("openstack.identity.pastefile_url", Nil),
    ("openstack.identity.start_delay", Int(10)),
    ("openstack.auth.strategy", Str("pki")),
    ("openstack.memcached_servers", List(&[])),
    // Platform
    ("openstack.identity.platform.keystone_packages", List(&["keystone"])),
    ("openstack.identity.platform.keystone_service", Str("keystone")),
    ("openstack.identity.platform.memcache_python_packages", List(&["python-memcache"])),
    ("openstack.identity.platform.mysql_python_packages", List(&["python-mysqldb"])),
    ("openstack.identity.platform.postgresql_python_packages", List(&["python-psycopg2"])),
    ("openstack.identity.platform.sqlite_python_packages", List(&[])),
    // Endpoints
    ("openstack.endpoints.family", Str("inet")),
    ("openstack.endpoints.identity-api.host", Str("127.0.0.1")),
    ("openstack.endpoints.identity-api.port", Str("5000")),
    ("openstack.endpoints.identity-api.scheme", Str("http")),
    ("openstack.endpoints.identity-admin.host", Str("127.0.0.1")),
    ("openstack.endpoints.identity-admin.port", Str("35357")),
    ("openstack.endpoints.identity-admin.scheme", Str("http")),
    ("openstack.endpoints.identity-internal.host", Str("127.0.0.1")),
    ("openstack.endpoints.identity-internal.port", Str("5000")),
    ("openstack.endpoints.identity-internal.scheme", Str("http")),
    ("openstack.endpoints.identity-bind.host", Str("127.0.0.1")),
    ("openstack.endpoints.identity-bind.port", Str("5000")),
    ("openstack.endpoints.identity-bind.bind_interface", Nil),
    ("openstack.endpoints.identity-admin-bind.host", Str("127.0.0.1")),
    ("openstack.endpoints.identity-admin-bind.port", Str("35357")),
    ("openstack.endpoints.identity-admin-bind.bind_interface", Nil),
    // Database
    ("openstack.db.identity.service_type", Str("mysql")),
    ("openstack.db.identity.host", Str("127.0.0.1")),
    ("openstack.db.identity.port", Str("3306")),
    ("openstack.db.identity.db_name", Str("keystone")),
    ("openstack.db.identity.username", Str("keystone")),
    ("openstack.db.identity.migrate", Bool(true)),
    ("openstack.db.identity.sqlite_path", Str("/var/lib/keystone/keystone.db")),
    // Messaging
    ("openstack.mq.service_type", Str("rabbitmq")),
    ("openstack.mq.identity.durable_queues", Bool(false)),
    ("openstack.mq.identity.auto_delete", Bool(false)),
    ("openstack.mq.identity.rpc_conn_pool_size", Int(30)),
    ("openstack.mq.identity.rpc_thread_pool_size", Int(64)),
    ("openstack.mq.identity.rpc_response_timeout", Int(60)),
    ("openstack.mq.identity.control_exchange", Str("openstack")),
    ("openstack.mq.identity.notification_driver", Str("messaging")),
    ("openstack.mq.identity.notification_topics", Str("notifications")),
    ("openstack.mq.identity.rabbit.host", Str("127.0.0.1")),
    ("openstack.mq.identity.rabbit.port", Str("5672")),
    ("openstack.mq.identity.rabbit.userid", Str("guest")),
    ("openstack.mq.identity.rabbit.password", Str("guest")),
    ("openstack.mq.identity.rabbit.vhost", Str("/")),
    ("openstack.mq.identity.rabbit.use_ssl", Bool(false)),
    ("openstack.mq.identity.rabbit.kombu_ssl_version", Nil),
    ("openstack.mq.identity.rabbit.ha", Bool(false)),
    ("openstack.mq.identity.rabbit.servers", List(&[])),
    ("openstack.mq.identity.qpid.host", Str("127.0.0.1")),
    ("openstack.mq.identity.qpid.port", Str("5672")),
    ("openstack.mq.identity.qpid.username", Str("guest")),
    ("openstack.mq.identity.qpid.password", Str("guest")),
    ("openstack.mq.identity.qpid.sasl_mechanisms", Str("")),
    ("openstack.mq.identity.qpid.heartbeat", Int(60)),
    ("openstack.mq.identity.qpid.protocol", Str("tcp")),
    ("openstack.mq.identity.qpid.tcp_nodelay", Bool(true)),
    ("openstack.mq.identity.qpid.topology_version", Int(1)),
    // SSL (eventlet server)
    ("openstack.identity.ssl.enabled", Bool(false)),
    ("openstack.identity.ssl.basedir", Str("/etc/keystone/ssl")),
    ("openstack.identity.ssl.certfile", Str("sslcert.pem")),
    ("openstack.identity.ssl.keyfile", Str("sslkey.pem")),
    ("openstack.identity.ssl.ca_certs", Str("sslca.pem")),
    ("openstack.identity.ssl.cert_required", Bool(false)),
    // PKI signing
    ("openstack.identity.signing.basedir", Str("/etc/keystone/ssl")),
    ("openstack.identity.signing.certfile", Str("/etc/keystone/ssl/certs/signing_cert.pem")),
    ("openstack.identity.signing.keyfile", Str("/etc/keystone/ssl/private/signing_key.pem")),
    ("openstack.identity.signing.ca_certs", Str("/etc/keystone/ssl/certs/ca.pem")),
    ("openstack.identity.signing.key_size", Int(2048)),
    ("openstack.identity.signing.valid_days", Int(3650)),
    ("openstack.identity.signing.ca_password", Nil),
    ("openstack.identity.signing.cert_subject", Str("/C=US/ST=Unset/L=Unset/O=Unset/CN=www.example.com")),
    ("openstack.identity.signing.certfile_url", Nil),
    ("openstack.identity.signing.keyfile_url", Nil),
    ("openstack.identity.signing.ca_certs_url", Nil),
    // Backends
    ("openstack.identity.identity.backend", Str("sql")),
    ("openstack.identity.identity.default_domain_id", Str("default")),
    ("openstack.identity.identity.domain_specific_drivers_enabled", Bool(false)),
    ("openstack.identity.identity.domain_config_dir", Str("/etc/keystone/domains")),
    ("openstack.identity.identity.list_limit", Nil),
    ("openstack.identity.assignment.backend", Str("sql")),
    ("openstack.identity.assignment.list_limit", Nil),
    ("openstack.identity.catalog.backend", Str("sql")),
    ("openstack.identity.catalog.list_limit", Nil),
    ("openstack.identity.catalog.template_file", Str("/etc/keystone/default_catalog.templates")),
    ("openstack.identity.token.backend", Str("sql")),
    ("openstack.identity.token.expiration", Int(3600)),
    ("openstack.identity.token.hash_algorithm", Str("md5")),
    ("openstack.identity.policy.backend", Str("sql")),
    ("openstack.identity.policy.list_limit", Nil),
    // Token flush job
    ("openstack.identity.token_flush_cron.minute", Str("30")),
    ("openstack.identity.token_flush_cron.hour", Str("3")),
    ("openstack.identity.token_flush_cron.day", Str("*")),
    ("openstack.identity.token_flush_cron.month", Str("*")),
    ("openstack.identity.token_flush_cron.weekday", Str("*")),
    ("openstack.identity.token_flush_cron.log_file", Str("/var/log/keystone/keystone-tokenflush.log")),
    // Paste pipelines
    ("openstack.identity.pipeline.public_api", Str(PUBLIC_API_PIPELINE)),
    ("openstack.identity.pipeline.admin_api", Str(ADMIN_API_PIPELINE)),
    ("openstack.identity.pipeline.api_v3", Str(API_V3_PIPELINE)),
    // SAML
    ("openstack.identity.saml.assertion_expiration_time", Int(3600)),
    ("openstack.identity.saml.xmlsec1_binary", Str("xmlsec1")),
    ("openstack.identity.saml.certfile", Str("")),
    ("openstack.identity.saml.keyfile", Str("")),
    ("openstack.identity.saml.idp_entity_id", Str("")),
    ("openstack.identity.saml.idp_sso_endpoint", Str("")),
    ("openstack.identity.saml.idp_lang", Str("")),
    ("openstack.identity.saml.idp_organization_name", Str("")),
    ("openstack.identity.saml.idp_organization_display_name", Str("")),
    ("openstack.identity.saml.idp_organization_url", Str("")),
    ("openstack.identity.saml.idp_contact_company", Str("")),
    ("openstack.identity.saml.idp_contact_name", Str("")),
    ("openstack.identity.saml.idp_contact_surname", Str("")),
    ("openstack.identity.saml.idp_contact_email", Str("")),
    ("openstack.identity.saml.idp_contact_telephone", Str("")),
    ("openstack.identity.saml.idp_contact_type", Str("")),
    ("openstack.identity.saml.idp_metadata_path", Str("")),
    // LDAP
    ("openstack.identity.ldap.url", Str("ldap://localhost")),
    ("openstack.identity.ldap.user", Str("dc=Manager,dc=example,dc=com")),
    ("openstack.identity.ldap.password", Nil),
    ("openstack.identity.ldap.suffix", Str("cn=example,cn=com")),
    ("openstack.identity.ldap.use_dumb_member", Bool(false)),
    ("openstack.identity.ldap.dumb_member", Str("cn=dumb,dc=example,dc=com")),
    ("openstack.identity.ldap.allow_subtree_delete", Bool(false)),
    ("openstack.identity.ldap.query_scope", Str("one")),
    ("openstack.identity.ldap.page_size", Int(0)),
    ("openstack.identity.ldap.alias_dereferencing", Str("default")),
    ("openstack.identity.ldap.user_tree_dn", Nil),
    ("openstack.identity.ldap.user_filter", Nil),
    ("openstack.identity.ldap.user_objectclass", Str("inetOrgPerson")),
    ("openstack.identity.ldap.user_id_attribute", Str("cn")),
    ("openstack.identity.ldap.user_name_attribute", Str("sn")),
    ("openstack.identity.ldap.user_mail_attribute", Str("email")),
    ("openstack.identity.ldap.user_pass_attribute", Str("userPassword")),
    ("openstack.identity.ldap.user_enabled_attribute", Str("enabled")),
    ("openstack.identity.ldap.user_enabled_mask", Int(0)),
    ("openstack.identity.ldap.user_enabled_default", Str("True")),
    ("openstack.identity.ldap.user_attribute_ignore", Str("default_project_id,tenants")),
    ("openstack.identity.ldap.user_allow_create", Bool(true)),
    ("openstack.identity.ldap.user_allow_update", Bool(true)),
    ("openstack.identity.ldap.user_allow_delete", Bool(true)),
    ("openstack.identity.ldap.user_enabled_emulation", Bool(false)),
    ("openstack.identity.ldap.user_enabled_emulation_dn", Nil),
    ("openstack.identity.ldap.group_tree_dn", Nil),
    ("openstack.identity.ldap.group_filter", Nil),
    ("openstack.identity.ldap.group_objectclass", Str("groupOfNames")),
    ("openstack.identity.ldap.group_id_attribute", Str("cn")),
    ("openstack.identity.ldap.group_name_attribute", Str("ou")),
    ("openstack.identity.ldap.group_member_attribute", Str("member")),
    ("openstack.identity.ldap.group_desc_attribute", Str("description")),
    ("openstack.identity.ldap.group_attribute_ignore", Nil),
    ("openstack.identity.ldap.group_allow_create", Bool(true)),
    ("openstack.identity.ldap.group_allow_update", Bool(true)),
    ("openstack.identity.ldap.group_allow_delete", Bool(true)),
    ("openstack.identity.ldap.project_tree_dn", Nil),
    ("openstack.identity.ldap.project_filter", Nil),
    ("openstack.identity.ldap.project_objectclass", Str("groupOfNames")),
    ("openstack.identity.ldap.project_id_attribute", Str("cn")),
    ("openstack.identity.ldap.project_member_attribute", Str("member")),
    ("openstack.identity.ldap.project_name_attribute", Str("ou")),
    ("openstack.identity.ldap.project_desc_attribute", Str("description")),
    ("openstack.identity.ldap.project_enabled_attribute", Str("enabled")),
    ("openstack.identity.ldap.project_domain_id_attribute", Str("businessCategory")),
    ("openstack.identity.ldap.project_attribute_ignore", Nil),
    ("openstack.identity.ldap.project_allow_create", Bool(true)),
    ("openstack.identity.ldap.project_allow_update", Bool(true)),
    ("openstack.identity.ldap.project_allow_delete", Bool(true)),
    ("openstack.identity.ldap.project_enabled_emulation", Bool(false)),
    ("openstack.identity.ldap.project_enabled_emulation_dn", Nil),
    ("openstack.identity.ldap.role_tree_dn", Nil),
    ("openstack.identity.ldap.role_filter", Nil),
    ("openstack.identity.ldap.role_objectclass", Str("organizationalRole")),
    ("openstack.identity.ldap.role_id_attribute", Str("cn")),
    ("openstack.identity.ldap.role_name_attribute", Str("ou")),
    ("openstack.identity.ldap.role_member_attribute", Str("roleOccupant")),
    ("openstack.identity.ldap.role_attribute_ignore", Nil),
    ("openstack.identity.ldap.role_allow_create", Bool(true)),
    ("openstack.identity.ldap.role_allow_update", Bool(true)),
    ("openstack.identity.ldap.role_allow_delete", Bool(true)),
    ("openstack.identity.ldap.use_tls", Bool(false)),
    ("openstack.identity.ldap.tls_cacertfile", Nil),
    ("openstack.identity.ldap.tls_cacertdir", Nil),
    ("openstack.identity.ldap.tls_req_cert", Str("demand")),
];

/// Write every schema default into the default tier.
pub fn load_defaults(store: &mut AttributeStore) {
    for (path, literal) in SCHEMA {
        store.set(Tier::Default, *path, literal.to_value());
    }
}

/// Look up the documented default for a path.
pub fn default_for(path: &str) -> Option<Literal> {
    SCHEMA.iter().find(|(p, _)| *p == path).map(|(_, l)| *l)
}
