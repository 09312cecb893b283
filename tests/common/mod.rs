//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use identity_converge::attributes::defaults::DB_PASSWORD;
use identity_converge::host::mock::MockHost;
use identity_converge::render::{RenderedFiles, render_all};
use identity_converge::{AttributeStore, ComputedValues};

pub const KEYFILE: &str = "/etc/keystone/ssl/private/signing_key.pem";
pub const PKI_SETUP: &str = "keystone-manage pki_setup --keystone-user keystone --keystone-group keystone";
pub const DB_SYNC: &str = "keystone-manage db_sync";

/// Node attributes for a host serving the identity API over https on 127.0.1.1.
pub fn node_store() -> AttributeStore {
    let mut store = AttributeStore::with_defaults();
    for (name, port, scheme) in [
        ("identity-bind", Some("5000"), None),
        ("identity-api", Some("5000"), Some("https")),
        ("identity-admin", Some("35357"), Some("https")),
        ("identity-admin-bind", Some("35357"), None),
    ] {
        store.set_override(format!("openstack.endpoints.{}.host", name), "127.0.1.1");
        if let Some(port) = port {
            store.set_override(format!("openstack.endpoints.{}.port", name), port);
        }
        if let Some(scheme) = scheme {
            store.set_override(format!("openstack.endpoints.{}.scheme", name), scheme);
        }
    }
    assert!(store.set_unless(DB_PASSWORD, "db-pass"));
    store
}

pub fn render_with(store: &AttributeStore, host: &MockHost) -> RenderedFiles {
    let computed = ComputedValues::derive(store, host).unwrap();
    render_all(store, &computed).unwrap()
}

pub fn render(store: &AttributeStore) -> RenderedFiles {
    render_with(store, &MockHost::new())
}

/// A mock host whose pki_setup run leaves the signing key behind.
pub fn pki_host() -> MockHost {
    let mut host = MockHost::new();
    host.set_command_effect(PKI_SETUP, &[KEYFILE]);
    host
}
