//! Property-based tests for identity-converge
//!
//! These tests verify:
//! - Attribute tier precedence and set-unless semantics
//! - Endpoint and server-list computation
//! - Rendering determinism
//! - Enum string round-trips

use proptest::prelude::*;

use identity_converge::attributes::defaults::DB_PASSWORD;
use identity_converge::compute::{endpoint_uri, join_servers};
use identity_converge::cron::CronSchedule;
use identity_converge::host::mock::MockHost;
use identity_converge::render::{self, ConfigFile};
use identity_converge::{AttrValue, AttributeStore, ComputedValues, KeyPath, Tier};
use strum::IntoEnumIterator;

fn segment() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_-]{0,8}"
}

fn key_path() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(segment(), 1..5)
}

fn scalar() -> impl Strategy<Value = String> {
    "[A-Za-z0-9_./:-]{1,16}"
}

// =============================================================================
// Attribute store
// =============================================================================

proptest! {
    /// force_override beats override beats default, wherever each is set
    #[test]
    fn highest_tier_wins(
        path in key_path(),
        default in scalar(),
        overridden in proptest::option::of(scalar()),
        forced in proptest::option::of(scalar()),
    ) {
        let path = KeyPath::new(path);
        let mut store = AttributeStore::new();
        store.set_default(&path, default.as_str());
        if let Some(v) = &overridden {
            store.set_override(&path, v.as_str());
        }
        if let Some(v) = &forced {
            store.set_force_override(&path, v.as_str());
        }

        let expected = forced.or(overridden).unwrap_or(default);
        prop_assert_eq!(store.string(&path.to_string()).unwrap(), expected);
    }

    /// Writing a lower tier after a higher one never changes the result
    #[test]
    fn lower_tier_write_is_shadowed(path in key_path(), high in scalar(), low in scalar()) {
        let path = KeyPath::new(path);
        let mut store = AttributeStore::new();
        store.set_force_override(&path, high.as_str());
        store.set_override(&path, low.as_str());
        store.set_default(&path, low.as_str());
        let (tier, value) = store.lookup(&path).unwrap();
        prop_assert_eq!(tier, Tier::ForceOverride);
        let expected = AttrValue::Str(high);
        prop_assert_eq!(value, &expected);
    }

    /// set_unless writes once and never replaces an existing value
    #[test]
    fn set_unless_is_non_destructive(path in key_path(), first in scalar(), second in scalar()) {
        let path = KeyPath::new(path);
        let mut store = AttributeStore::new();
        prop_assert!(store.set_unless(&path, first.as_str()));
        prop_assert!(!store.set_unless(&path, second.as_str()));
        let expected = AttrValue::Str(first);
        prop_assert_eq!(store.get_at(Tier::Override, &path), Some(&expected));
    }

    /// set_unless leaves a defaulted value alone
    #[test]
    fn set_unless_respects_defaults(path in key_path(), default in scalar(), other in scalar()) {
        let path = KeyPath::new(path);
        let mut store = AttributeStore::new();
        store.set_default(&path, default.as_str());
        prop_assert!(!store.set_unless(&path, other.as_str()));
        prop_assert_eq!(store.string(&path.to_string()).unwrap(), default);
    }

    /// Dotted paths survive parse and display
    #[test]
    fn key_path_dotted_form(path in key_path()) {
        let dotted = path.join(".");
        let parsed = KeyPath::parse(&dotted);
        prop_assert_eq!(parsed.segments(), path.as_slice());
        prop_assert_eq!(parsed.to_string(), dotted);
    }
}

// =============================================================================
// Computed values
// =============================================================================

proptest! {
    /// Endpoint URIs always carry scheme, host and a trailing slash
    #[test]
    fn endpoint_uri_shape(
        scheme in prop_oneof![Just("http"), Just("https")],
        host in "[a-z0-9.-]{1,20}",
        port in proptest::option::of(1u16..=65535),
    ) {
        let port = port.map(|p| p.to_string());
        let uri = endpoint_uri(scheme, &host, port.as_deref());
        let prefix = format!("{}://{}", scheme, host);
        prop_assert!(uri.starts_with(&prefix));
        prop_assert!(uri.ends_with('/'));
        match port {
            Some(p) => prop_assert_eq!(uri, format!("{}:{}/", prefix, p)),
            None => prop_assert_eq!(uri, format!("{}/", prefix)),
        }
    }

    /// An empty port renders like no port at all
    #[test]
    fn empty_port_is_omitted(host in "[a-z0-9.-]{1,20}") {
        prop_assert_eq!(endpoint_uri("http", &host, Some("")), endpoint_uri("http", &host, None));
    }

    /// Joined server lists split back into the original entries
    #[test]
    fn join_servers_preserves_entries(servers in prop::collection::vec("[a-z0-9.]{1,12}:[0-9]{2,5}", 0..6)) {
        let joined = join_servers(&servers);
        if servers.is_empty() {
            prop_assert_eq!(joined, "");
        } else {
            let split: Vec<&str> = joined.split(',').collect();
            prop_assert_eq!(split, servers.iter().map(String::as_str).collect::<Vec<_>>());
        }
    }
}

// =============================================================================
// Rendering
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Same attributes, same bytes
    #[test]
    fn rendering_is_deterministic(
        token in "[A-Za-z0-9]{1,24}",
        limit in proptest::option::of(1i64..10_000),
        servers in prop::collection::vec("[a-z]{1,8}:11211", 0..4),
    ) {
        let mut store = AttributeStore::with_defaults();
        store.set_override(DB_PASSWORD, "db-pass");
        store.set_override("openstack.identity.admin_token", token.as_str());
        store.set_override("openstack.memcached_servers", servers.clone());
        if let Some(limit) = limit {
            store.set_override("openstack.identity.list_limit", limit);
        }

        let host = MockHost::new();
        let first = render::render_all(&store, &ComputedValues::derive(&store, &host).unwrap()).unwrap();
        let second = render::render_all(&store, &ComputedValues::derive(&store, &host).unwrap()).unwrap();
        prop_assert_eq!(first.keystone_conf.to_string(), second.keystone_conf.to_string());
        prop_assert_eq!(first.keystone_conf.get("DEFAULT", "admin_token"), Some(token.as_str()));
        let expected_servers = servers.join(",");
        prop_assert_eq!(first.keystone_conf.get("memcache", "servers"), Some(expected_servers.as_str()));
    }
}

// =============================================================================
// Enums and schedules
// =============================================================================

proptest! {
    /// Five-field schedules parse back to the same expression
    #[test]
    fn cron_schedule_display_parses(fields in prop::collection::vec("[0-9*/,-]{1,6}", 5)) {
        let expr = fields.join(" ");
        let schedule = CronSchedule::parse(&expr).unwrap();
        prop_assert_eq!(schedule.to_string(), expr);
    }

    /// Anything but five fields is rejected
    #[test]
    fn cron_schedule_rejects_wrong_arity(fields in prop::collection::vec("[0-9*]{1,3}", 0..10)) {
        prop_assume!(fields.len() != 5);
        prop_assert!(CronSchedule::parse(&fields.join(" ")).is_none());
    }
}

#[test]
fn config_file_roundtrip() {
    for file in ConfigFile::iter() {
        let parsed: ConfigFile = file.to_string().parse().unwrap();
        assert_eq!(parsed, file);
    }
}
