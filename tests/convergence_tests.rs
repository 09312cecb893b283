//! End-to-end convergence runs against the in-memory host.

mod common;

use common::{DB_SYNC, KEYFILE, PKI_SETUP, node_store, pki_host};
use identity_converge::attributes::defaults::DB_PASSWORD;
use identity_converge::engine::NotificationOutcome;
use identity_converge::graph::identity::{DB_SYNC_STAMP, SLEEP_UNIT, SQLITE_DB_PATH};
use identity_converge::host::ServiceAction;
use identity_converge::host::mock::{HostCall, MockHost};
use identity_converge::render::{KEYSTONE_CONF_PATH, PASTE_INI_PATH};
use identity_converge::types::Ownership;
use identity_converge::{
    AttributeStore, ConvergeError, EngineOptions, NotifyAction, RunReport, UnitId, UnitOutcome, converge,
};

fn run(store: &AttributeStore, host: &mut MockHost) -> RunReport {
    converge(store, host, EngineOptions::default()).unwrap()
}

fn keystone() -> UnitId {
    UnitId::service("keystone")
}

fn position(host: &MockHost, call: &HostCall) -> usize {
    host.calls.iter().position(|c| c == call).unwrap()
}

// ============================================================================
// First run / second run
// ============================================================================

#[test]
fn first_run_builds_the_node() {
    let store = node_store();
    let mut host = pki_host();
    let report = run(&store, &mut host);

    assert!(report.is_success(), "{}", report);
    assert_eq!(report.outcome(&UnitId::package("keystone")), Some(&UnitOutcome::Created));
    assert_eq!(report.outcome(&UnitId::file(KEYSTONE_CONF_PATH)), Some(&UnitOutcome::Created));
    assert_eq!(report.outcome(&keystone()), Some(&UnitOutcome::Updated));

    let conf = host.file_content(KEYSTONE_CONF_PATH).unwrap();
    assert!(conf.contains("public_endpoint = https://127.0.1.1:5000/\n"));
    assert!(host.file_content(PASTE_INI_PATH).is_some());
    assert!(host.has_path(KEYFILE));
    assert!(host.cron_job("token-flush").is_some());

    let state = host.service_state("keystone");
    assert!(state.enabled && state.running);
}

#[test]
fn second_run_changes_nothing() {
    let store = node_store();
    let mut host = pki_host();
    run(&store, &mut host);
    host.clear_calls();

    let report = run(&store, &mut host);
    assert!(report.all_unchanged(), "{}", report);
    assert!(report.notifications.is_empty());
    assert!(host.calls.is_empty(), "{:?}", host.calls);
}

#[test]
fn python_bindings_install_before_the_server() {
    let mut host = pki_host();
    run(&node_store(), &mut host);
    let mysql = position(&host, &HostCall::InstallPackage("python-mysqldb".into()));
    let server = position(&host, &HostCall::InstallPackage("keystone".into()));
    let conf = position(&host, &HostCall::WriteFile(KEYSTONE_CONF_PATH.into()));
    assert!(mysql < server);
    assert!(server < conf);
}

#[test]
fn service_restarts_once_and_last() {
    let mut host = pki_host();
    let report = run(&node_store(), &mut host);

    assert_eq!(host.service_actions("keystone", ServiceAction::Restart), 1);
    assert_eq!(
        host.calls.last(),
        Some(&HostCall::ControlService {
            name: "keystone".into(),
            action: ServiceAction::Restart,
        })
    );

    let restart = report.notification(&keystone(), NotifyAction::Restart).unwrap();
    assert_eq!(restart.outcome, NotificationOutcome::Fired);
    assert!(restart.sources.contains(&UnitId::file(KEYSTONE_CONF_PATH)));
    assert!(restart.sources.contains(&UnitId::file(PASTE_INI_PATH)));
}

#[test]
fn settle_step_runs_after_service_change() {
    let mut host = pki_host();
    let report = run(&node_store(), &mut host);
    assert_eq!(host.command_runs("sleep 10"), 1);
    let settle = report.notification(&UnitId::execute(SLEEP_UNIT), NotifyAction::Run).unwrap();
    assert_eq!(settle.sources, vec![keystone()]);

    host.clear_calls();
    run(&node_store(), &mut host);
    assert_eq!(host.command_runs("sleep 10"), 0);
}

// ============================================================================
// Configuration changes
// ============================================================================

#[test]
fn changed_attribute_rewrites_syncs_and_restarts() {
    let mut store = node_store();
    let mut host = pki_host();
    run(&store, &mut host);
    host.clear_calls();

    store.set_override("openstack.identity.admin_token", "rotated");
    let report = run(&store, &mut host);

    assert_eq!(report.outcome(&UnitId::file(KEYSTONE_CONF_PATH)), Some(&UnitOutcome::Updated));
    assert_eq!(report.outcome(&UnitId::file(PASTE_INI_PATH)), Some(&UnitOutcome::Unchanged));
    assert_eq!(host.command_runs(DB_SYNC), 1);
    assert_eq!(host.service_actions("keystone", ServiceAction::Restart), 1);
    assert!(host.file_content(KEYSTONE_CONF_PATH).unwrap().contains("admin_token = rotated\n"));
}

#[test]
fn db_sync_runs_before_the_restart() {
    let mut host = pki_host();
    run(&node_store(), &mut host);
    let sync = position(&host, &HostCall::RunCommand(DB_SYNC.into()));
    let restart = position(
        &host,
        &HostCall::ControlService {
            name: "keystone".into(),
            action: ServiceAction::Restart,
        },
    );
    assert!(sync < restart);
}

#[test]
fn disabled_migrations_never_sync() {
    let mut store = node_store();
    store.set_override("openstack.db.identity.migrate", false);
    let mut host = pki_host();
    let report = run(&store, &mut host);

    assert_eq!(host.command_runs(DB_SYNC), 0);
    let sync = report
        .notification(&UnitId::execute(DB_SYNC), NotifyAction::Run)
        .unwrap();
    assert!(matches!(sync.outcome, NotificationOutcome::Suppressed { .. }));
    assert!(report.is_success());
}

#[test]
fn migrate_enabled_later_syncs() {
    let mut store = node_store();
    store.set_override("openstack.db.identity.migrate", false);
    let mut host = pki_host();
    run(&store, &mut host);
    assert_eq!(host.command_runs(DB_SYNC), 0);

    host.clear_calls();
    store.set_override("openstack.db.identity.migrate", true);
    let report = run(&store, &mut host);
    assert!(report.is_success(), "{}", report);
    assert_eq!(report.outcome(&UnitId::file(KEYSTONE_CONF_PATH)), Some(&UnitOutcome::Unchanged));
    assert_eq!(report.outcome(&UnitId::execute(DB_SYNC)), Some(&UnitOutcome::Updated));
    assert_eq!(host.command_runs(DB_SYNC), 1);
    assert!(host.has_path(DB_SYNC_STAMP));

    host.clear_calls();
    assert!(run(&store, &mut host).all_unchanged());
    assert_eq!(host.command_runs(DB_SYNC), 0);
}

#[test]
fn failed_db_sync_is_retried_next_run() {
    let store = node_store();
    let mut host = pki_host();
    let failure = format!("run:{}", DB_SYNC);
    host.fail_on(&failure);
    let report = run(&store, &mut host);

    assert!(!report.is_success());
    assert_eq!(host.command_runs(DB_SYNC), 1);
    assert!(matches!(
        report.outcome(&UnitId::execute(DB_SYNC)),
        Some(UnitOutcome::Failed { .. })
    ));
    assert!(matches!(report.outcome(&keystone()), Some(UnitOutcome::Skipped { .. })));
    assert!(!host.has_path(DB_SYNC_STAMP));

    host.clear_failure(&failure);
    host.clear_calls();
    let report = run(&store, &mut host);
    assert!(report.is_success(), "{}", report);
    assert_eq!(host.command_runs(DB_SYNC), 1);
    assert_eq!(report.outcome(&UnitId::execute(DB_SYNC)), Some(&UnitOutcome::Updated));
    assert!(host.service_state("keystone").running);

    host.clear_calls();
    assert!(run(&store, &mut host).all_unchanged());
}

#[test]
fn db_sync_runs_once_when_config_changes() {
    let mut store = node_store();
    let mut host = pki_host();
    run(&store, &mut host);
    assert_eq!(host.command_runs(DB_SYNC), 1);

    host.clear_calls();
    store.set_override("openstack.identity.debug", true);
    let report = run(&store, &mut host);
    assert_eq!(host.command_runs(DB_SYNC), 1);
    let sync = report.notification(&UnitId::execute(DB_SYNC), NotifyAction::Run).unwrap();
    assert_eq!(sync.outcome, NotificationOutcome::Fired);
    assert_eq!(report.outcome(&UnitId::execute(DB_SYNC)), Some(&UnitOutcome::Updated));
}

#[test]
fn syslog_installs_the_logging_config() {
    let mut store = node_store();
    store.set_override("openstack.identity.syslog.use", true);
    let mut host = pki_host();
    let report = run(&store, &mut host);

    assert!(report.is_success(), "{}", report);
    let logging = host.file_content("/etc/openstack/logging.conf").unwrap();
    assert!(logging.contains("[handler_syslog]\n"));
    assert!(host.has_path("/etc/openstack"));
    let conf = host.file_content(KEYSTONE_CONF_PATH).unwrap();
    assert!(conf.contains("log_config_append = /etc/openstack/logging.conf\n"));
}

#[test]
fn package_upgrade_is_an_update() {
    let mut host = pki_host();
    run(&node_store(), &mut host);
    host.clear_calls();

    host.set_candidate("keystone", "2.0");
    let report = run(&node_store(), &mut host);
    assert_eq!(report.outcome(&UnitId::package("keystone")), Some(&UnitOutcome::Updated));
    assert_eq!(host.count_calls(|c| matches!(c, HostCall::UpgradePackage(_))), 1);
}

#[test]
fn stale_sqlite_database_is_removed() {
    let mut host = pki_host();
    host.add_file(SQLITE_DB_PATH, "", Ownership::new("keystone", "keystone", 0o600));
    let report = run(&node_store(), &mut host);
    assert_eq!(report.outcome(&UnitId::file(SQLITE_DB_PATH)), Some(&UnitOutcome::Deleted));
    assert!(!host.has_path(SQLITE_DB_PATH));
}

// ============================================================================
// PKI material
// ============================================================================

#[test]
fn pki_setup_skipped_when_key_exists() {
    let mut host = pki_host();
    host.add_file(KEYFILE, "key", Ownership::new("keystone", "keystone", 0o640));
    let report = run(&node_store(), &mut host);
    assert_eq!(host.command_runs(PKI_SETUP), 0);
    assert_eq!(report.outcome(&UnitId::execute(PKI_SETUP)), Some(&UnitOutcome::Unchanged));
}

#[test]
fn pki_setup_repeats_until_key_appears() {
    let store = node_store();
    let mut host = MockHost::new();
    run(&store, &mut host);
    run(&store, &mut host);
    assert_eq!(host.command_runs(PKI_SETUP), 2);
}

#[test]
fn signing_urls_fetch_material_instead_of_setup() {
    let mut store = node_store();
    let mut host = MockHost::new();
    for key in ["certfile", "keyfile", "ca_certs"] {
        let url = format!("http://pki.example.com/{}", key);
        store.set_override(format!("openstack.identity.signing.{}_url", key), url.as_str());
        host.serve_url(&url, key);
    }
    let report = run(&store, &mut host);

    assert!(report.is_success(), "{}", report);
    assert_eq!(host.command_runs(PKI_SETUP), 0);
    assert_eq!(host.file_content(KEYFILE), Some("keyfile"));
    assert_eq!(
        host.count_calls(|c| matches!(c, HostCall::FetchRemoteFile { .. })),
        3
    );
}

#[test]
fn uuid_strategy_needs_no_pki() {
    let mut store = node_store();
    store.set_override("openstack.auth.strategy", "uuid");
    let mut host = MockHost::new();
    let report = run(&store, &mut host);

    assert!(report.is_success());
    assert_eq!(host.count_calls(|c| matches!(c, HostCall::RunCommand(cmd) if cmd.contains("pki_setup"))), 0);
    assert!(!host.has_path("/etc/keystone/ssl"));

    host.clear_calls();
    assert!(run(&store, &mut host).all_unchanged());
}

// ============================================================================
// Scheduled jobs
// ============================================================================

#[test]
fn token_flush_follows_token_backend() {
    let mut store = node_store();
    let mut host = pki_host();
    run(&store, &mut host);
    let job = host.cron_job("token-flush").unwrap();
    assert_eq!(job.schedule.to_string(), "30 3 * * *");
    assert_eq!(job.user, "keystone");

    store.set_override("openstack.identity.token.backend", "memcache");
    let report = run(&store, &mut host);
    assert_eq!(report.outcome(&UnitId::cron("token-flush")), Some(&UnitOutcome::Deleted));
    assert!(host.cron_job("token-flush").is_none());

    host.clear_calls();
    let report = run(&store, &mut host);
    assert_eq!(report.outcome(&UnitId::cron("token-flush")), Some(&UnitOutcome::Unchanged));
    assert!(host.calls.is_empty());
}

#[test]
fn unknown_token_backend_removes_existing_flush_job() {
    let mut store = node_store();
    let mut host = pki_host();
    run(&store, &mut host);
    assert!(host.cron_job("token-flush").is_some());

    store.set_override("openstack.identity.token.backend", "notsql");
    let report = run(&store, &mut host);
    assert!(report.is_success(), "{}", report);
    assert_eq!(report.outcome(&UnitId::cron("token-flush")), Some(&UnitOutcome::Deleted));
    assert!(host.cron_job("token-flush").is_none());
    assert!(host.file_content(KEYSTONE_CONF_PATH).unwrap().contains("driver = notsql\n"));
}

#[test]
fn token_flush_schedule_change_updates_job() {
    let mut store = node_store();
    let mut host = pki_host();
    run(&store, &mut host);

    store.set_override("openstack.identity.token_flush_cron.hour", "*/2");
    let report = run(&store, &mut host);
    assert_eq!(report.outcome(&UnitId::cron("token-flush")), Some(&UnitOutcome::Updated));
    assert_eq!(host.cron_job("token-flush").unwrap().schedule.hour, "*/2");
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn failed_config_write_skips_dependents_only() {
    let mut host = pki_host();
    host.fail_on(&format!("write:{}", KEYSTONE_CONF_PATH));
    let report = run(&node_store(), &mut host);

    assert!(!report.is_success());
    assert!(matches!(
        report.outcome(&UnitId::file(KEYSTONE_CONF_PATH)),
        Some(UnitOutcome::Failed { .. })
    ));
    assert!(matches!(report.outcome(&keystone()), Some(UnitOutcome::Skipped { .. })));
    assert!(matches!(
        report.outcome(&UnitId::execute(DB_SYNC)),
        Some(UnitOutcome::Skipped { .. })
    ));

    // independent units still converge
    assert_eq!(report.outcome(&UnitId::file(PASTE_INI_PATH)), Some(&UnitOutcome::Created));
    assert_eq!(report.outcome(&UnitId::cron("token-flush")), Some(&UnitOutcome::Created));
    assert_eq!(host.service_actions("keystone", ServiceAction::Restart), 0);
    assert_eq!(host.command_runs(DB_SYNC), 0);
}

#[test]
fn failed_package_blocks_what_comes_after_it() {
    let mut host = pki_host();
    host.fail_on("install:keystone");
    let report = run(&node_store(), &mut host);

    assert_eq!(report.failures().len(), 1);
    assert_eq!(report.failures()[0].0, UnitId::package("keystone"));
    assert_eq!(report.outcome(&UnitId::package("python-mysqldb")), Some(&UnitOutcome::Created));
    assert!(matches!(
        report.outcome(&UnitId::directory("/etc/keystone")),
        Some(UnitOutcome::Skipped { .. })
    ));
    assert!(host.file_content(KEYSTONE_CONF_PATH).is_none());
}

#[test]
fn missing_password_is_fatal() {
    let mut store = node_store();
    store.unset(identity_converge::Tier::Override, DB_PASSWORD);
    let mut host = MockHost::new();

    let err = converge(&store, &mut host, EngineOptions::default()).unwrap_err();
    assert!(matches!(err, ConvergeError::AttributeResolution { .. }));
    assert!(err.to_string().contains(DB_PASSWORD));
    assert!(host.calls.is_empty());
}

#[test]
fn invalid_backend_is_fatal() {
    let mut store = node_store();
    store.set_override("openstack.identity.identity.backend", "kerberos");
    let mut host = MockHost::new();
    let err = converge(&store, &mut host, EngineOptions::default()).unwrap_err();
    assert!(matches!(err, ConvergeError::InvalidValue { .. }));
    assert!(host.calls.is_empty());
}

// ============================================================================
// Dry run
// ============================================================================

#[test]
fn dry_run_reports_without_touching_host() {
    let mut host = pki_host();
    let report = converge(&node_store(), &mut host, EngineOptions { dry_run: true }).unwrap();

    assert!(report.dry_run);
    assert!(host.calls.is_empty());
    assert_eq!(report.outcome(&UnitId::file(KEYSTONE_CONF_PATH)), Some(&UnitOutcome::Created));
    assert!(
        report
            .notifications
            .iter()
            .all(|n| n.outcome == NotificationOutcome::WouldFire)
    );
    assert!(report.to_string().contains("units:"));
}

#[test]
fn dry_run_after_converge_is_clean() {
    let store = node_store();
    let mut host = pki_host();
    run(&store, &mut host);
    host.clear_calls();

    let report = converge(&store, &mut host, EngineOptions { dry_run: true }).unwrap();
    assert!(report.all_unchanged());
    assert!(host.calls.is_empty());
}
