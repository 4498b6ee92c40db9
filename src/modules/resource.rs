//! Resource module - Converge one ARM resource
//!
//! Every mutating `azure_rm_*` module is an instance of this type, built from
//! a catalog [`ResourceDescriptor`]. The descriptor's arguments are extended
//! with the common `state`, `tags` and `append_tags` arguments.

use super::{Failure, Module, ModuleContext, ModuleOutput};
use crate::engine::desired::{APPEND_TAGS_ARG, STATE_ARG, TAGS_ARG};
use crate::engine::{reconcile, ResourceDescriptor};
use crate::schema::{ArgSpec, ArgType, ArgumentSchema, BoundArgs};
use crate::tags::TagMode;
use async_trait::async_trait;
use serde_json::json;

/// A mutating module driven by the reconciliation engine.
pub struct ResourceModule {
    descriptor: ResourceDescriptor,
    schema: ArgumentSchema,
}

impl ResourceModule {
    pub fn new(descriptor: ResourceDescriptor) -> Self {
        let mut schema = descriptor.arguments.clone();
        schema.insert_if_absent(
            STATE_ARG,
            ArgSpec::new(ArgType::Str)
                .with_default(json!("present"))
                .with_choices(["present", "absent"])
                .with_description("Whether the resource should exist"),
        );
        if descriptor.supports_tags {
            schema.insert_if_absent(
                TAGS_ARG,
                ArgSpec::new(ArgType::Dict).with_description("Resource tags"),
            );
            schema.insert_if_absent(
                APPEND_TAGS_ARG,
                ArgSpec::new(ArgType::Bool)
                    .with_default(json!(descriptor.tag_mode == TagMode::Merge))
                    .with_description("Merge tags into the existing set instead of replacing it"),
            );
        }
        Self { descriptor, schema }
    }

    pub fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }
}

#[async_trait]
impl Module for ResourceModule {
    fn name(&self) -> &str {
        &self.descriptor.name
    }

    fn description(&self) -> &str {
        &self.descriptor.description
    }

    fn schema(&self) -> &ArgumentSchema {
        &self.schema
    }

    fn result_key(&self) -> &str {
        &self.descriptor.kind
    }

    async fn execute(
        &self,
        args: &BoundArgs,
        context: &ModuleContext,
    ) -> Result<ModuleOutput, Failure> {
        let outcome = reconcile(&self.descriptor, args, context).await?;

        let mut output = ModuleOutput::with_changed(outcome.changed)
            .with_data(self.descriptor.kind.clone(), outcome.data);
        if let Some(diff) = outcome.diff {
            output = output.with_diff(diff);
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arm::{CloudError, MockArmClient, Response};
    use crate::modules::{ModuleParams, ModuleRegistry};
    use crate::redact::NO_LOG_MARKER;
    use serde_json::Value;
    use std::sync::Arc;

    fn descriptor() -> ResourceDescriptor {
        serde_yaml::from_str(
            r#"
name: azure_rm_keyvaultsecret
kind: secret
tag_mode: merge
collection:
  path: /subscriptions/{subscription_id}/resourceGroups/{resource_group}/providers/Microsoft.KeyVault/vaults/{vault_name}/secrets/{name}
  api_version: "2023-07-01"
arguments:
  resource_group: {type: str, required: true}
  vault_name: {type: str, required: true}
  name: {type: str, required: true}
  value: {type: str, no_log: true}
coordinates: [resource_group, vault_name, name]
body:
  value: properties.value
output:
  - id
  - name: value
    path: properties.value
"#,
        )
        .unwrap()
    }

    fn params(value: Value) -> ModuleParams {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_common_arguments_injected() {
        let module = ResourceModule::new(descriptor());
        let schema = module.schema();
        assert!(schema.contains(STATE_ARG));
        assert!(schema.contains(TAGS_ARG));
        assert_eq!(
            schema.get(APPEND_TAGS_ARG).unwrap().default,
            Some(json!(true))
        );
    }

    #[test]
    fn test_untagged_resource_gets_no_tag_arguments() {
        let mut d = descriptor();
        d.supports_tags = false;
        let module = ResourceModule::new(d);
        assert!(!module.schema().contains(TAGS_ARG));
        assert!(!module.schema().contains(APPEND_TAGS_ARG));
    }

    #[test]
    fn test_replace_descriptor_defaults_append_tags_off() {
        let mut d = descriptor();
        d.tag_mode = TagMode::Replace;
        let module = ResourceModule::new(d);
        assert_eq!(
            module.schema().get(APPEND_TAGS_ARG).unwrap().default,
            Some(json!(false))
        );
    }

    #[tokio::test]
    async fn test_secret_value_never_echoed_or_published() {
        let mut client = MockArmClient::new();
        client
            .expect_get()
            .times(1)
            .returning(|_, _| Err(CloudError::not_found("absent")));
        client.expect_create_or_update().times(1).returning(|_, _, body| {
            Ok(Response::done(json!({
                "id": "/vaults/kv1/secrets/db",
                "properties": {"value": body["properties"]["value"].clone()}
            })))
        });

        let mut registry = ModuleRegistry::new();
        registry.register(Arc::new(ResourceModule::new(descriptor())));
        let context = ModuleContext::new(Arc::new(client));

        let output = registry
            .execute(
                "azure_rm_keyvaultsecret",
                &params(json!({
                    "resource_group": "rg1",
                    "vault_name": "kv1",
                    "name": "db",
                    "value": "pa55w0rd"
                })),
                &context,
            )
            .await;

        let rendered = serde_json::to_string(&output).unwrap();
        assert!(output.changed);
        assert!(!rendered.contains("pa55w0rd"), "{}", rendered);
        assert_eq!(output.data["invocation"]["module_args"]["value"], NO_LOG_MARKER);
        assert_eq!(output.data["secret"]["id"], "/vaults/kv1/secrets/db");
        assert_eq!(output.data["secret"]["value"], NO_LOG_MARKER);
    }
}
