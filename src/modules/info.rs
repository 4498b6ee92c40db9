//! Facts modules - Read-only `azure_rm_*_info` queries
//!
//! Results are always a sequence published under the descriptor's kind,
//! empty when nothing matched. Facts modules never report a change.

use super::{Failure, Module, ModuleContext, ModuleOutput};
use crate::engine::desired::TAGS_ARG;
use crate::facts::{gather, FactsDescriptor, TOP_ARG};
use crate::schema::{ArgSpec, ArgType, ArgumentSchema, BoundArgs};
use async_trait::async_trait;
use serde_json::Value;

/// A read-only module driven by the facts engine.
pub struct FactsModule {
    descriptor: FactsDescriptor,
    schema: ArgumentSchema,
}

impl FactsModule {
    pub fn new(descriptor: FactsDescriptor) -> Self {
        let mut schema = descriptor.arguments.clone();
        schema.insert_if_absent(
            TAGS_ARG,
            ArgSpec::new(ArgType::List)
                .with_elements(ArgType::Str)
                .with_description("Only return resources carrying these tags ('key' or 'key:value')"),
        );
        if descriptor.supports_top {
            schema.insert_if_absent(
                TOP_ARG,
                ArgSpec::new(ArgType::Int).with_description("Maximum number of items returned"),
            );
        }
        Self { descriptor, schema }
    }

    pub fn descriptor(&self) -> &FactsDescriptor {
        &self.descriptor
    }
}

#[async_trait]
impl Module for FactsModule {
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

    fn is_mutating(&self) -> bool {
        false
    }

    async fn execute(
        &self,
        args: &BoundArgs,
        context: &ModuleContext,
    ) -> Result<ModuleOutput, Failure> {
        let items = gather(&self.descriptor, args, context.client.clone()).await?;
        Ok(ModuleOutput::ok().with_data(self.descriptor.kind.clone(), Value::Array(items)))
    }
}
