//! logging.conf renderer
//!
//! Python `fileConfig` format routing keystone's log records to syslog. Only
//! rendered when `openstack.identity.syslog.use` is set; keystone.conf then
//! points `log_config_append` at it.

use super::document::ConfigDocument;
use crate::attributes::AttributeStore;
use crate::error::Result;

fn syslog_args(facility: &str) -> String {
    format!("('/dev/log', handlers.SysLogHandler.{})", facility)
}

pub fn render_logging_conf(store: &AttributeStore) -> Result<ConfigDocument> {
    let facility = store.string("openstack.identity.syslog.facility")?;
    let error_facility = store.string("openstack.identity.syslog.error_facility")?;

    let mut doc = ConfigDocument::new();
    doc.section("loggers").set("keys", "root, keystone");
    doc.section("handlers").set("keys", "syslog, errors");
    doc.section("formatters").set("keys", "normal");

    doc.section("logger_root").set("level", "NOTSET").set("handlers", "syslog");
    doc.section("logger_keystone")
        .set("level", "INFO")
        .set("handlers", "syslog, errors")
        .set("qualname", "keystone")
        .set("propagate", "0");

    doc.section("handler_syslog")
        .set("class", "handlers.SysLogHandler")
        .set("args", syslog_args(&facility))
        .set("formatter", "normal");
    doc.section("handler_errors")
        .set("class", "handlers.SysLogHandler")
        .set("level", "ERROR")
        .set("args", syslog_args(&error_facility))
        .set("formatter", "normal");

    doc.section("formatter_normal")
        .set("format", "keystone: %(levelname)s %(name)s %(message)s");
    Ok(doc)
}
