//! keystone-paste.ini renderer

use super::document::{ConfigDocument, Line};
use crate::attributes::AttributeStore;
use crate::error::Result;

/// `[filter:<name>]` factories, in emission order.
const FILTERS: &[(&str, &str)] = &[
    ("debug", "keystone.common.wsgi:Debug.factory"),
    ("request_id", "oslo.middleware:RequestId.factory"),
    ("build_auth_context", "keystone.middleware:AuthContextMiddleware.factory"),
    ("token_auth", "keystone.middleware:TokenAuthMiddleware.factory"),
    ("admin_token_auth", "keystone.middleware:AdminTokenAuthMiddleware.factory"),
    ("json_body", "keystone.middleware:JsonBodyMiddleware.factory"),
    ("user_crud_extension", "keystone.contrib.user_crud:CrudExtension.factory"),
    ("crud_extension", "keystone.contrib.admin_crud:CrudExtension.factory"),
    ("ec2_extension", "keystone.contrib.ec2:Ec2Extension.factory"),
    ("ec2_extension_v3", "keystone.contrib.ec2:Ec2ExtensionV3.factory"),
    ("federation_extension", "keystone.contrib.federation.routers:FederationExtension.factory"),
    ("oauth1_extension", "keystone.contrib.oauth1.routers:OAuth1Extension.factory"),
    ("s3_extension", "keystone.contrib.s3:S3Extension.factory"),
    (
        "endpoint_filter_extension",
        "keystone.contrib.endpoint_filter.routers:EndpointFilterExtension.factory",
    ),
    (
        "endpoint_policy_extension",
        "keystone.contrib.endpoint_policy.routers:EndpointPolicyExtension.factory",
    ),
    ("simple_cert_extension", "keystone.contrib.simple_cert:SimpleCertExtension.factory"),
    ("revoke_extension", "keystone.contrib.revoke.routers:RevokeExtension.factory"),
    ("url_normalize", "keystone.middleware:NormalizingFilter.factory"),
    ("sizelimit", "oslo.middleware.sizelimit:RequestBodySizeLimiter.factory"),
];

/// `[app:<name>]` factories.
const APPS: &[(&str, &str)] = &[
    ("public_service", "keystone.service:public_app_factory"),
    ("service_v3", "keystone.service:v3_app_factory"),
    ("admin_service", "keystone.service:admin_app_factory"),
    ("public_version_service", "keystone.service:public_version_app_factory"),
    ("admin_version_service", "keystone.service:admin_version_app_factory"),
];

/// Render keystone-paste.ini. `misc_paste` lines precede the first section.
pub fn render_paste_ini(store: &AttributeStore) -> Result<ConfigDocument> {
    let mut doc = ConfigDocument::new();

    for extra in store.list("openstack.identity.misc_paste")? {
        doc.preamble().push(Line::Raw(extra));
    }

    for (name, factory) in FILTERS {
        doc.section(&format!("filter:{}", name))
            .set("paste.filter_factory", *factory);
    }
    for (name, factory) in APPS {
        doc.section(&format!("app:{}", name))
            .set("paste.app_factory", *factory);
    }

    for api in ["public_api", "admin_api", "api_v3"] {
        let pipeline = store.string(&format!("openstack.identity.pipeline.{}", api))?;
        doc.section(&format!("pipeline:{}", api)).set("pipeline", pipeline);
    }
    doc.section("pipeline:public_version_api")
        .set("pipeline", "sizelimit url_normalize public_version_service");
    doc.section("pipeline:admin_version_api")
        .set("pipeline", "sizelimit url_normalize admin_version_service");

    doc.section("composite:main")
        .set("use", "egg:Paste#urlmap")
        .set("/v2.0", "public_api")
        .set("/v3", "api_v3")
        .set("/", "public_version_api");
    doc.section("composite:admin")
        .set("use", "egg:Paste#urlmap")
        .set("/v2.0", "admin_api")
        .set("/v3", "api_v3")
        .set("/", "admin_version_api");

    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::defaults::{ADMIN_API_PIPELINE, API_V3_PIPELINE, PUBLIC_API_PIPELINE};

    #[test]
    fn test_default_pipelines() {
        let doc = render_paste_ini(&AttributeStore::with_defaults()).unwrap();
        assert_eq!(doc.get("pipeline:public_api", "pipeline"), Some(PUBLIC_API_PIPELINE));
        assert_eq!(doc.get("pipeline:admin_api", "pipeline"), Some(ADMIN_API_PIPELINE));
        assert_eq!(doc.get("pipeline:api_v3", "pipeline"), Some(API_V3_PIPELINE));
    }

    #[test]
    fn test_pipeline_overrides() {
        let mut store = AttributeStore::with_defaults();
        store.set_override("openstack.identity.pipeline.public_api", "public_service");
        store.set_override("openstack.identity.pipeline.api_v3", "service_v3");
        let doc = render_paste_ini(&store).unwrap();
        assert!(doc.contains_line("pipeline = public_service"));
        assert!(doc.contains_line("pipeline = service_v3"));
        assert_eq!(doc.get("pipeline:admin_api", "pipeline"), Some(ADMIN_API_PIPELINE));
    }

    #[test]
    fn test_misc_paste_lines_precede_sections() {
        let mut store = AttributeStore::with_defaults();
        store.set_override("openstack.identity.misc_paste", vec!["MISC1=OPTION1", "MISC2=OPTION2"]);
        let text = render_paste_ini(&store).unwrap().to_string();
        assert!(text.starts_with("MISC1=OPTION1\nMISC2=OPTION2\n\n[filter:debug]\n"));
    }

    #[test]
    fn test_every_pipeline_stage_is_defined() {
        let doc = render_paste_ini(&AttributeStore::with_defaults()).unwrap();
        for pipeline in [PUBLIC_API_PIPELINE, ADMIN_API_PIPELINE, API_V3_PIPELINE] {
            for stage in pipeline.split_whitespace() {
                assert!(
                    doc.has_section(&format!("filter:{}", stage)) || doc.has_section(&format!("app:{}", stage)),
                    "pipeline stage {} has no section",
                    stage
                );
            }
        }
    }
}
