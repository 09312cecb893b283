//! Template rendering
//!
//! Every renderer is a pure function of the attribute store and the computed
//! values: identical inputs always produce identical documents.

pub mod catalog;
pub mod document;
pub mod keystone_conf;
pub mod logging_conf;
pub mod paste_ini;

pub use document::{ConfigDocument, Line, Section, Separator};

use crate::attributes::AttributeStore;
use crate::compute::ComputedValues;
use crate::error::Result;
use crate::types::CatalogBackend;
use strum::{Display, EnumIter, EnumString};

pub const KEYSTONE_CONF_PATH: &str = "/etc/keystone/keystone.conf";
pub const PASTE_INI_PATH: &str = "/etc/keystone/keystone-paste.ini";

/// The files this crate knows how to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
#[strum(serialize_all = "kebab-case")]
pub enum ConfigFile {
    KeystoneConf,
    PasteIni,
    Catalog,
    LoggingConf,
}

/// Rendered documents for one run.
///
/// `paste_ini` is `None` when the paste file is fetched from a URL instead;
/// `catalog` is `None` unless the templated catalog backend is selected;
/// `logging_conf` is `None` unless logging goes to syslog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFiles {
    pub keystone_conf: ConfigDocument,
    pub paste_ini: Option<ConfigDocument>,
    pub catalog: Option<ConfigDocument>,
    pub logging_conf: Option<ConfigDocument>,
}

impl RenderedFiles {
    pub fn get(&self, file: ConfigFile) -> Option<&ConfigDocument> {
        match file {
            ConfigFile::KeystoneConf => Some(&self.keystone_conf),
            ConfigFile::PasteIni => self.paste_ini.as_ref(),
            ConfigFile::Catalog => self.catalog.as_ref(),
            ConfigFile::LoggingConf => self.logging_conf.as_ref(),
        }
    }
}

/// Render every file the current attributes call for.
pub fn render_all(store: &AttributeStore, computed: &ComputedValues) -> Result<RenderedFiles> {
    let keystone_conf = keystone_conf::render_keystone_conf(store, computed)?;

    let paste_ini = match store.opt_string("openstack.identity.pastefile_url")? {
        Some(_) => None,
        None => Some(paste_ini::render_paste_ini(store)?),
    };

    let backend: CatalogBackend = store.choice("openstack.identity.catalog.backend", "sql or templated")?;
    let catalog = match backend {
        CatalogBackend::Templated => Some(catalog::render_catalog_templates(store, computed)?),
        CatalogBackend::Sql => None,
    };

    let logging_conf = if store.flag("openstack.identity.syslog.use")? {
        Some(logging_conf::render_logging_conf(store)?)
    } else {
        None
    };

    Ok(RenderedFiles {
        keystone_conf,
        paste_ini,
        catalog,
        logging_conf,
    })
}

/// Path the templated catalog is written to.
pub fn catalog_path(store: &AttributeStore) -> Result<String> {
    store.string("openstack.identity.catalog.template_file")
}
