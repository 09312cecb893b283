//! default_catalog.templates renderer
//!
//! The templated catalog backend reads section-less
//! `catalog.<region>.<service>.<field> = <value>` lines.

use super::document::{ConfigDocument, Line, Separator};
use crate::attributes::AttributeStore;
use crate::compute::ComputedValues;
use crate::error::Result;

/// Render the identity entries of the templated service catalog.
pub fn render_catalog_templates(store: &AttributeStore, computed: &ComputedValues) -> Result<ConfigDocument> {
    let region = store.string("openstack.identity.region")?;
    let prefix = format!("catalog.{}.identity", region);

    let mut doc = ConfigDocument::new();
    let lines = doc.preamble();
    for (field, value) in [
        ("publicURL", format!("{}v2.0", computed.public_endpoint)),
        ("adminURL", format!("{}v2.0", computed.admin_endpoint)),
        ("internalURL", format!("{}v2.0", computed.internal_endpoint)),
        ("name", "Identity Service".to_string()),
    ] {
        lines.push(Line::Entry {
            key: format!("{}.{}", prefix, field),
            value,
            separator: Separator::Spaced,
        });
    }
    Ok(doc)
}
