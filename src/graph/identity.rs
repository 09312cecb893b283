//! Declared resource set for the identity server.
//!
//! Built fresh every run from the attribute store, the computed values and
//! the rendered documents.

use super::{
    CommandTrigger, CommandUnit, NotifyAction, PackageAction, ResourceGraph, ResourceUnit, RunStamp, Timing,
    UnitId,
};
use crate::attributes::AttributeStore;
use crate::compute::ComputedValues;
use crate::cron::reconcile_token_flush;
use crate::error::{ConvergeError, Result};
use crate::host::{content_hash, CommandSpec};
use crate::logic::resolver;
use crate::manage::{DbSync, ManageArgs, PkiSetup};
use crate::render::{self, KEYSTONE_CONF_PATH, PASTE_INI_PATH, RenderedFiles};
use crate::types::{DbType, Ownership};
use std::path::Path;
use tracing::debug;

pub const CONFIG_DIR: &str = "/etc/keystone";
pub const SQLITE_DB_PATH: &str = "/var/lib/keystone/keystone.db";
/// Written after a successful db_sync; holds the hash of the keystone.conf it ran against.
pub const DB_SYNC_STAMP: &str = "/var/lib/keystone/db_sync.stamp";
/// Name of the settle step run after the service changes.
pub const SLEEP_UNIT: &str = "Keystone: sleep";

/// Declare every unit the identity server needs.
pub fn declare_identity_server(
    store: &AttributeStore,
    computed: &ComputedValues,
    files: &RenderedFiles,
) -> Result<ResourceGraph> {
    let user = store.string("openstack.identity.user")?;
    let group = store.string("openstack.identity.group")?;
    let owned = |mode: u32| Ownership::new(user.clone(), group.clone(), mode);

    let service_name = resolver::resolve_service(store)?;
    let service = UnitId::service(&service_name);
    let restart = |unit: ResourceUnit| unit.notify(&service, NotifyAction::Restart, Timing::Delayed);

    let mut graph = ResourceGraph::new();

    // Packages
    let mut last_package = None;
    for name in resolver::resolve_packages(store)? {
        let mut unit = ResourceUnit::package(&name, PackageAction::Upgrade);
        if let Some(prev) = &last_package {
            unit = unit.after(prev);
        }
        last_package = Some(graph.add(unit)?);
    }
    let service_package = match resolver::service_packages(store)?.last() {
        Some(name) => Some(UnitId::package(name)),
        None => last_package.clone(),
    };
    let after_packages = |unit: ResourceUnit| match &service_package {
        Some(pkg) => unit.after(pkg),
        None => unit,
    };

    if computed.db_type != DbType::Sqlite {
        graph.add(after_packages(ResourceUnit::absent_file(SQLITE_DB_PATH)))?;
    }

    // Directories
    let config_dir = graph.add(after_packages(ResourceUnit::directory(CONFIG_DIR, owned(0o700))))?;

    if store.flag("openstack.identity.identity.domain_specific_drivers_enabled")? {
        let dir = store.string("openstack.identity.identity.domain_config_dir")?;
        graph.add(ResourceUnit::directory(&dir, owned(0o700)).after(&config_dir))?;
    }

    // PKI material
    let mut pki_units = Vec::new();
    if computed.auth_strategy.is_pki() {
        let basedir = store.string("openstack.identity.signing.basedir")?;
        let ssl_dir = graph.add(ResourceUnit::directory(&basedir, owned(0o700)).after(&config_dir))?;
        let certs_dir = graph.add(
            ResourceUnit::directory(&format!("{}/certs", basedir), owned(0o755)).after(&ssl_dir),
        )?;
        let private_dir = graph.add(
            ResourceUnit::directory(&format!("{}/private", basedir), owned(0o750)).after(&ssl_dir),
        )?;
        pki_units.extend([certs_dir.clone(), private_dir.clone()]);

        let signing = |key: &str| store.string(&format!("openstack.identity.signing.{}", key));
        let signing_url = |key: &str| store.opt_string(&format!("openstack.identity.signing.{}_url", key));
        let mut any_url = false;
        for key in ["certfile", "keyfile", "ca_certs"] {
            if let Some(url) = signing_url(key)? {
                any_url = true;
                let path = signing(key)?;
                let parent = if key == "keyfile" { &private_dir } else { &certs_dir };
                let unit = ResourceUnit::remote_file(&path, &url, owned(0o640), false).after(parent);
                pki_units.push(graph.add(restart(unit))?);
            }
        }

        if !any_url {
            let keyfile = signing("keyfile")?;
            let setup = PkiSetup {
                user: user.clone(),
                group: group.clone(),
            };
            let command = setup.to_command().run_as(user.clone(), group.clone());
            let unit = ResourceUnit::command(
                &command.to_string(),
                CommandUnit {
                    command,
                    trigger: CommandTrigger::Run,
                    enabled: true,
                    creates: Some(keyfile),
                    stamp: None,
                },
            )
            .after(&certs_dir)
            .after(&private_dir);
            pki_units.push(graph.add(unit)?);
        }
    }

    // Rendered configuration
    let db_sync_command = DbSync.to_command().run_as(user.clone(), group.clone());
    let db_sync = UnitId::execute(&db_sync_command.to_string());

    let keystone_conf = files.keystone_conf.to_string();
    let db_sync_stamp = RunStamp {
        path: DB_SYNC_STAMP.to_string(),
        content: format!("{}\n", content_hash(&keystone_conf)),
        ownership: owned(0o640),
    };
    let conf = ResourceUnit::file(KEYSTONE_CONF_PATH, keystone_conf, owned(0o640))
        .after(&config_dir)
        .notify(&db_sync, NotifyAction::Run, Timing::Immediately);
    let conf = graph.add(restart(conf))?;
    let mut service_inputs = vec![conf.clone()];

    let paste = match store.opt_string("openstack.identity.pastefile_url")? {
        Some(url) => ResourceUnit::remote_file(PASTE_INI_PATH, &url, owned(0o644), true),
        None => {
            let doc = files
                .paste_ini
                .as_ref()
                .ok_or_else(|| ConvergeError::graph("keystone-paste.ini was not rendered"))?;
            ResourceUnit::file(PASTE_INI_PATH, doc.to_string(), owned(0o644))
        }
    };
    service_inputs.push(graph.add(restart(paste.after(&config_dir)))?);

    if let Some(catalog) = &files.catalog {
        let path = render::catalog_path(store)?;
        let unit = ResourceUnit::file(&path, catalog.to_string(), owned(0o644)).after(&config_dir);
        service_inputs.push(graph.add(restart(unit))?);
    }

    if let Some(logging) = &files.logging_conf {
        let path = store.string("openstack.identity.syslog.config_file")?;
        let mut unit = ResourceUnit::file(&path, logging.to_string(), Ownership::new("root", "root", 0o644));
        if let Some(parent) = Path::new(&path).parent().and_then(Path::to_str).filter(|p| *p != "/") {
            let dir = ResourceUnit::directory(parent, Ownership::new("root", "root", 0o755));
            if !graph.contains(&dir.id) {
                graph.add(after_packages(dir))?;
            }
            unit = unit.after(&UnitId::directory(parent));
        }
        service_inputs.push(graph.add(restart(unit))?);
    }

    // Migrations
    let migrate = store.flag("openstack.db.identity.migrate")?;
    graph.add(
        ResourceUnit::command(
            &db_sync_command.to_string(),
            CommandUnit {
                command: db_sync_command.clone(),
                trigger: CommandTrigger::Run,
                enabled: migrate,
                creates: None,
                stamp: Some(db_sync_stamp),
            },
        )
        .after(&conf),
    )?;
    service_inputs.push(db_sync);

    // Service
    let sleep = UnitId::execute(SLEEP_UNIT);
    let mut unit = ResourceUnit::service(&service_name, true, true)
        .notify(&sleep, NotifyAction::Run, Timing::Immediately);
    for input in service_inputs.iter().chain(&pki_units) {
        unit = unit.after(input);
    }
    graph.add(unit)?;

    let delay = store.int("openstack.identity.start_delay")?;
    graph.add(ResourceUnit::command(
        SLEEP_UNIT,
        CommandUnit {
            command: CommandSpec::new(["sleep".to_string(), delay.to_string()]),
            trigger: CommandTrigger::Nothing,
            enabled: true,
            creates: None,
            stamp: None,
        },
    ))?;

    // Scheduled jobs
    graph.add(after_packages(ResourceUnit::cron(reconcile_token_flush(store)?)))?;

    graph.validate()?;
    debug!(units = graph.len(), "Declared identity server resources");
    Ok(graph)
}
