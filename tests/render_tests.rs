//! Rendered configuration checks, section by section.

mod common;

use common::{node_store, render, render_with};
use identity_converge::host::mock::MockHost;
use identity_converge::render::keystone_conf::{OPTIONAL_LINES, SIMPLE_LINES};
use identity_converge::render::{ConfigDocument, ConfigFile, Separator};
use identity_converge::{AttributeStore, ConvergeError};

fn keystone_conf(store: &AttributeStore) -> ConfigDocument {
    render(store).keystone_conf
}

fn line_text(key: &str, value: &str, separator: Separator) -> String {
    match separator {
        Separator::Spaced => format!("{} = {}", key, value),
        Separator::Tight => format!("{}={}", key, value),
    }
}

/// Sections other than `section` that carry the exact line.
fn elsewhere(doc: &ConfigDocument, section: &str, text: &str) -> Vec<String> {
    doc.section_names()
        .into_iter()
        .filter(|name| *name != section)
        .filter(|name| doc.get_section(name).is_some_and(|s| s.contains_line(text)))
        .map(str::to_string)
        .collect()
}

// ============================================================================
// [DEFAULT]
// ============================================================================

#[test]
fn endpoints_render_from_node_attributes() {
    let doc = keystone_conf(&node_store());
    assert_eq!(doc.get("DEFAULT", "public_endpoint"), Some("https://127.0.1.1:5000/"));
    assert_eq!(doc.get("DEFAULT", "admin_endpoint"), Some("https://127.0.1.1:35357/"));
    assert!(doc.contains_line("public_endpoint = https://127.0.1.1:5000/"));
}

#[test]
fn debug_defaults_to_python_false() {
    let doc = keystone_conf(&node_store());
    assert_eq!(doc.get("DEFAULT", "debug"), Some("False"));
}

#[test]
fn misc_keystone_lines_are_verbatim_in_default() {
    let mut store = node_store();
    store.set_override(
        "openstack.identity.misc_keystone",
        vec!["MISC1=OPTION1", "MISC2=OPTION2"],
    );
    let doc = keystone_conf(&store);
    let default = doc.get_section("DEFAULT").unwrap();
    assert!(default.contains_line("MISC1=OPTION1"));
    assert!(default.contains_line("MISC2=OPTION2"));
    assert!(elsewhere(&doc, "DEFAULT", "MISC1=OPTION1").is_empty());
}

#[test]
fn list_limits_are_scoped_to_their_section() {
    let store = node_store();
    let doc = keystone_conf(&store);
    assert!(doc.sections_with_key("list_limit").is_empty());

    let mut store = store;
    store.set_override("openstack.identity.catalog.list_limit", 500);
    let doc = keystone_conf(&store);
    assert_eq!(doc.sections_with_key("list_limit"), vec!["catalog"]);
    assert_eq!(doc.get("catalog", "list_limit"), Some("500"));
}

// ============================================================================
// Table-driven lines
// ============================================================================

#[test]
fn every_simple_line_follows_its_attribute() {
    for line in SIMPLE_LINES.iter().chain(OPTIONAL_LINES) {
        let mut store = node_store();
        let value = format!("custom-{}-{}", line.section, line.key);
        store.set_override(line.path, value.as_str());

        let doc = keystone_conf(&store);
        assert_eq!(
            doc.get(line.section, line.key),
            Some(value.as_str()),
            "[{}] {}",
            line.section,
            line.key
        );
        let text = line_text(line.key, &value, line.separator);
        assert!(
            doc.get_section(line.section).unwrap().contains_line(&text),
            "separator for [{}] {}",
            line.section,
            line.key
        );
        assert!(elsewhere(&doc, line.section, &text).is_empty(), "{}", text);
    }
}

#[test]
fn optional_lines_are_absent_by_default() {
    let doc = keystone_conf(&node_store());
    for line in OPTIONAL_LINES {
        assert_eq!(doc.get(line.section, line.key), None, "[{}] {}", line.section, line.key);
    }
}

#[test]
fn bool_attributes_render_lowercase() {
    let mut store = node_store();
    store.set_override("openstack.identity.ldap.allow_subtree_delete", true);
    let doc = keystone_conf(&store);
    assert!(doc.get_section("ldap").unwrap().contains_line("allow_subtree_delete = true"));
}

// ============================================================================
// [eventlet_server]
// ============================================================================

#[test]
fn bind_hosts_default_to_endpoint_hosts() {
    let doc = keystone_conf(&node_store());
    assert_eq!(doc.get("eventlet_server", "public_bind_host"), Some("127.0.1.1"));
    assert_eq!(doc.get("eventlet_server", "admin_bind_host"), Some("127.0.1.1"));
    assert_eq!(doc.get("eventlet_server", "public_port"), Some("5000"));
    assert_eq!(doc.get("eventlet_server", "admin_port"), Some("35357"));
}

#[test]
fn bind_interface_resolves_through_host() {
    let mut store = node_store();
    store.set_override("openstack.endpoints.identity-bind.bind_interface", "eth0");
    let mut host = MockHost::new();
    host.add_interface("eth0", "10.0.0.2");

    let doc = render_with(&store, &host).keystone_conf;
    assert_eq!(doc.get("eventlet_server", "public_bind_host"), Some("10.0.0.2"));
    assert_eq!(doc.get("eventlet_server", "admin_bind_host"), Some("127.0.1.1"));
}

#[test]
fn unknown_bind_interface_is_an_error() {
    let mut store = node_store();
    store.set_override("openstack.endpoints.identity-admin-bind.bind_interface", "bond7");
    let err = identity_converge::ComputedValues::derive(&store, &MockHost::new()).unwrap_err();
    assert!(matches!(err, ConvergeError::Collaborator { .. }));
}

#[test]
fn ssl_section_only_when_enabled() {
    let store = node_store();
    assert!(!keystone_conf(&store).has_section("eventlet_server_ssl"));

    let mut store = store;
    store.set_override("openstack.identity.ssl.enabled", true);
    let doc = keystone_conf(&store);
    let ssl = doc.get_section("eventlet_server_ssl").unwrap();
    assert!(ssl.contains_line("enable = True"));
    assert!(ssl.contains_line("certfile = /etc/keystone/ssl/certs/sslcert.pem"));
    assert!(ssl.contains_line("keyfile = /etc/keystone/ssl/private/sslkey.pem"));
    assert!(ssl.contains_line("ca_certs = /etc/keystone/ssl/certs/sslca.pem"));
    assert!(ssl.contains_line("cert_required = false"));
}

// ============================================================================
// [signing] / [token]
// ============================================================================

#[test]
fn signing_section_follows_auth_strategy() {
    let store = node_store();
    let doc = keystone_conf(&store);
    assert_eq!(doc.get("signing", "keyfile"), Some(common::KEYFILE));
    assert_eq!(doc.get("signing", "ca_password"), Some(""));
    assert_eq!(doc.get("token", "provider"), Some("keystone.token.providers.pki.Provider"));

    let mut store = store;
    store.set_override("openstack.auth.strategy", "uuid");
    let doc = keystone_conf(&store);
    assert!(!doc.has_section("signing"));
    assert_eq!(doc.get("token", "provider"), Some("keystone.token.providers.uuid.Provider"));
}

#[test]
fn unknown_auth_strategy_is_rejected() {
    let mut store = node_store();
    store.set_override("openstack.auth.strategy", "kerberos");
    let err = identity_converge::ComputedValues::derive(&store, &MockHost::new()).unwrap_err();
    assert!(err.to_string().contains("kerberos"));
}

#[test]
fn token_driver_follows_backend() {
    let mut store = node_store();
    store.set_override("openstack.identity.token.backend", "memcache_pool");
    let doc = keystone_conf(&store);
    assert_eq!(
        doc.get("token", "driver"),
        Some("keystone.token.persistence.backends.memcache_pool.Token")
    );
}

#[test]
fn unknown_token_backend_is_used_as_driver() {
    let mut store = node_store();
    store.set_override("openstack.identity.token.backend", "notsql");
    let doc = keystone_conf(&store);
    assert_eq!(doc.get("token", "driver"), Some("notsql"));
}

// ============================================================================
// [ldap]
// ============================================================================

#[test]
fn ldap_tls_lines_are_guarded() {
    let store = node_store();
    let doc = keystone_conf(&store);
    assert_eq!(doc.get("ldap", "use_tls"), Some("false"));
    assert_eq!(doc.get("ldap", "tls_req_cert"), None);

    let mut store = store;
    store.set_override("openstack.identity.ldap.use_tls", true);
    store.set_override("openstack.identity.ldap.tls_cacertdir", "/etc/ssl/certs");
    let doc = keystone_conf(&store);
    assert_eq!(doc.get("ldap", "tls_cacertdir"), Some("/etc/ssl/certs"));
    assert_eq!(doc.get("ldap", "tls_req_cert"), Some("demand"));

    // a CA file wins over a CA directory
    store.set_override("openstack.identity.ldap.tls_cacertfile", "/etc/ssl/ca.pem");
    let doc = keystone_conf(&store);
    assert_eq!(doc.get("ldap", "tls_cacertfile"), Some("/etc/ssl/ca.pem"));
    assert_eq!(doc.get("ldap", "tls_cacertdir"), None);
}

#[test]
fn identity_driver_follows_backend() {
    let mut store = node_store();
    store.set_override("openstack.identity.identity.backend", "ldap");
    let doc = keystone_conf(&store);
    assert_eq!(doc.get("identity", "driver"), Some("keystone.identity.backends.ldap.Identity"));
    assert_eq!(doc.sections_with_key("driver").iter().filter(|s| **s == "identity").count(), 1);
}

// ============================================================================
// [catalog] and the templated catalog file
// ============================================================================

#[test]
fn templated_catalog_renders_its_own_file() {
    let store = node_store();
    let files = render(&store);
    assert!(files.catalog.is_none());
    assert_eq!(files.keystone_conf.get("catalog", "template_file"), None);

    let mut store = store;
    store.set_override("openstack.identity.catalog.backend", "templated");
    let files = render(&store);
    assert_eq!(
        files.keystone_conf.get("catalog", "driver"),
        Some("keystone.catalog.backends.templated.TemplatedCatalog")
    );
    assert!(files.keystone_conf.get("catalog", "template_file").is_some());

    let catalog = files.get(ConfigFile::Catalog).unwrap();
    assert!(catalog.section_names().is_empty());
    assert!(
        catalog
            .to_string()
            .contains("catalog.RegionOne.identity.publicURL = https://127.0.1.1:5000/v2.0\n")
    );
}

// ============================================================================
// keystone-paste.ini
// ============================================================================

#[test]
fn paste_misc_lines_precede_first_section() {
    let mut store = node_store();
    store.set_override("openstack.identity.misc_paste", vec!["MISC1=OPTION1"]);
    let files = render(&store);
    let paste = files.get(ConfigFile::PasteIni).unwrap();
    assert_eq!(paste.preamble_lines().len(), 1);
    assert!(paste.to_string().starts_with("MISC1=OPTION1\n"));
    assert_eq!(
        paste.get("filter:debug", "paste.filter_factory"),
        Some("keystone.common.wsgi:Debug.factory")
    );
}

#[test]
fn paste_pipelines_follow_attributes() {
    let mut store = node_store();
    store.set_override("openstack.identity.pipeline.public_api", "sizelimit public_service");
    let paste = render(&store).paste_ini.unwrap();
    assert_eq!(paste.get("pipeline:public_api", "pipeline"), Some("sizelimit public_service"));
    assert_eq!(paste.get("composite:main", "/v2.0"), Some("public_api"));
}

#[test]
fn pastefile_url_skips_paste_rendering() {
    let mut store = node_store();
    store.set_override("openstack.identity.pastefile_url", "http://server/keystone-paste.ini");
    assert!(render(&store).get(ConfigFile::PasteIni).is_none());
}

// ============================================================================
// Whole-file properties
// ============================================================================

#[test]
fn rendering_twice_is_byte_identical() {
    let store = node_store();
    assert_eq!(render(&store), render(&store));
    assert_eq!(
        render(&store).keystone_conf.to_string(),
        render(&store).keystone_conf.to_string()
    );
}

#[test]
fn keystone_conf_sections_are_in_order() {
    let doc = keystone_conf(&node_store());
    let names = doc.section_names();
    assert_eq!(names.first(), Some(&"DEFAULT"));
    assert_eq!(names.last(), Some(&"token"));
    assert!(doc.to_string().ends_with('\n'));
}
