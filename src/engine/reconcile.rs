//! The reconciliation state machine.

use super::{Action, DesiredState, Intent, OperationSet, Phase, ResourceDescriptor};
use crate::arm::{await_completion, Coordinates, Gateway, Response};
use crate::compare;
use crate::modules::{Diff, Failure, ModuleContext, ModuleError, ModuleResult};
use crate::redact::{self, NoLogRegistry};
use crate::retry::{PollOutcome, Probe};
use crate::schema::BoundArgs;
use crate::tags::{self, Tags};
use serde_json::{Map, Value};
use tracing::{debug, info, trace, warn};

/// Server-managed members dropped before a full-replacement update.
const READ_ONLY_FIELDS: &[&str] = &["id", "name", "type", "etag", "systemData"];

/// Result of one successful reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub action: Action,
    /// True iff a mutation was issued, or would have been outside dry-run.
    pub changed: bool,
    /// Formatted, redacted resource. Empty after deletes and dry-run creates.
    pub data: Value,
    /// Present in diff mode.
    pub diff: Option<Diff>,
}

/// Decided action plus the body to submit with it.
#[derive(Debug, Clone, PartialEq)]
struct Plan {
    action: Action,
    body: Option<Value>,
}

impl Plan {
    fn no_op() -> Self {
        Self {
            action: Action::NoOp,
            body: None,
        }
    }
}

/// Drives one resource from its observed to its desired state.
pub struct Reconciler<'a> {
    descriptor: &'a ResourceDescriptor,
    context: &'a ModuleContext,
    gateway: Gateway,
    redactor: NoLogRegistry,
    secret_paths: Vec<&'a str>,
    phase: Phase,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        descriptor: &'a ResourceDescriptor,
        context: &'a ModuleContext,
        redactor: NoLogRegistry,
    ) -> Self {
        Self {
            descriptor,
            context,
            gateway: Gateway::new(context.client.clone(), descriptor.collection.clone()),
            redactor,
            secret_paths: descriptor.no_log_paths(),
            phase: Phase::Start,
        }
    }

    fn enter(&mut self, phase: Phase) {
        trace!("{}: {} -> {}", self.descriptor.name, self.phase, phase);
        self.phase = phase;
    }

    pub async fn run(mut self, desired: &DesiredState) -> Result<Outcome, Failure> {
        let coords = &desired.coordinates;

        self.enter(Phase::Read);
        let observed = self.gateway.get(coords).await?;

        self.enter(Phase::Decide);
        let plan = self.decide(desired, observed.as_ref())?;
        info!(
            "{} {}: {}{}",
            self.descriptor.name,
            coords,
            plan.action,
            if desired.dry_run { " (check mode)" } else { "" }
        );

        let diff = self
            .context
            .diff_mode
            .then(|| self.diff(observed.as_ref(), &plan));

        if desired.dry_run || !plan.action.is_mutation() {
            let data = match (plan.action, &observed) {
                (Action::Create | Action::Delete, _) | (_, None) => empty(),
                (_, Some(current)) => self.publish(current),
            };
            self.enter(Phase::Done);
            return Ok(Outcome {
                action: plan.action,
                changed: plan.action.is_mutation(),
                data,
                diff,
            });
        }

        self.enter(Phase::Mutate);
        let result = self.mutate(coords, &plan).await?;

        self.enter(Phase::Confirm);
        let data = match plan.action {
            Action::Delete => {
                self.confirm_absent(coords).await?;
                empty()
            }
            _ => {
                let current = self.confirm_present(coords, result).await?;
                self.publish(&current)
            }
        };

        self.enter(Phase::Done);
        Ok(Outcome {
            action: plan.action,
            changed: true,
            data,
            diff,
        })
    }

    fn decide(&self, desired: &DesiredState, observed: Option<&Value>) -> ModuleResult<Plan> {
        let operations = self.descriptor.operations;
        let coords = &desired.coordinates;

        match (observed, desired.intent) {
            (None, Intent::Absent) => Ok(Plan::no_op()),
            (Some(_), Intent::Absent) => Ok(Plan {
                action: Action::Delete,
                body: None,
            }),
            (None, Intent::Present) => {
                if !operations.supports_create() {
                    return Err(ModuleError::Unsupported(format!(
                        "{} cannot create {}; the resource can only be updated",
                        self.descriptor.name, coords
                    )));
                }
                let mut body = compare::prune_nulls(&desired.body);
                if let Some(tags) = &desired.tags {
                    set_tags(&mut body, tags);
                }
                Ok(Plan {
                    action: Action::Create,
                    body: Some(body),
                })
            }
            (Some(current), Intent::Present) => {
                let observed_tags = current.get("tags").and_then(tags::from_value);
                let tag_plan = tags::reconcile(
                    desired.tags.as_ref(),
                    observed_tags.as_ref(),
                    desired.tag_mode,
                );
                let body_matches = compare::equal(&desired.body, current);
                debug!(
                    "{}: body matches={}, tags changed={}",
                    coords, body_matches, tag_plan.changed
                );
                if body_matches && !tag_plan.changed {
                    return Ok(Plan::no_op());
                }

                if !operations.supports_update() {
                    return Err(ModuleError::Unsupported(format!(
                        "{} does not support updating {} in place and it differs from the requested state",
                        self.descriptor.name, coords
                    )));
                }

                // A full PUT without the observed base must restate the tags.
                let bare_put = !operations.partial_update() && !self.descriptor.merge_observed;
                let mut body = if operations.partial_update() || bare_put {
                    compare::prune_nulls(&desired.body)
                } else {
                    compare::merge(&writable(current), &desired.body)
                };
                if tag_plan.changed || (bare_put && !tag_plan.tags.is_empty()) {
                    set_tags(&mut body, &tag_plan.tags);
                }

                if operations.partial_update() && body.as_object().map_or(true, Map::is_empty) {
                    return Err(ModuleError::Unsupported(format!(
                        "{} has no update body for {}",
                        self.descriptor.name, coords
                    )));
                }

                Ok(Plan {
                    action: Action::Update,
                    body: Some(body),
                })
            }
        }
    }

    async fn mutate(&self, coords: &Coordinates, plan: &Plan) -> Result<Value, Failure> {
        let empty_body = empty();
        let body = plan.body.as_ref().unwrap_or(&empty_body);
        let operations = self.descriptor.operations;

        let (operation, response): (&str, ModuleResult<Response>) = match plan.action {
            Action::Create if operations == OperationSet::Distinct => {
                ("create", self.gateway.create(coords, body).await)
            }
            Action::Create => (
                "create_or_update",
                self.gateway.create_or_update(coords, body).await,
            ),
            Action::Update if operations.partial_update() => {
                ("update", self.gateway.update(coords, body).await)
            }
            Action::Update => (
                "create_or_update",
                self.gateway.create_or_update(coords, body).await,
            ),
            Action::Delete => ("delete", self.gateway.delete(coords).await),
            Action::NoOp => return Ok(Value::Null),
        };

        // Rejected calls changed nothing; anything after acceptance did.
        let response = response?;
        if response.is_pending() {
            info!("{} accepted for {}, waiting for completion", operation, coords);
        } else {
            debug!("{} accepted for {}", operation, coords);
        }
        await_completion(response, &self.context.polling, operation, coords)
            .await
            .map_err(Failure::after_mutation)
    }

    /// Poll `get` until the resource is gone.
    async fn confirm_absent(&self, coords: &Coordinates) -> Result<(), Failure> {
        if !self.descriptor.post_delete_wait {
            return Ok(());
        }

        let gateway = &self.gateway;
        let outcome = self
            .context
            .delete_confirmation
            .poll_until(|attempt| async move {
                trace!("Delete confirmation read {} for {}", attempt + 1, coords);
                match gateway.get(coords).await? {
                    None => Ok::<_, ModuleError>(Probe::Ready(())),
                    Some(_) => Ok(Probe::pending()),
                }
            })
            .await
            .map_err(Failure::after_mutation)?;

        match outcome {
            PollOutcome::Ready(()) => Ok(()),
            PollOutcome::Exhausted { attempts, .. } => {
                warn!("{} still present after delete", coords);
                Err(Failure::after_mutation(ModuleError::transient(
                    "delete",
                    format!(
                        "{} still present after {} confirmation reads",
                        coords, attempts
                    ),
                )))
            }
        }
    }

    /// Take the mutation result as the new state unless it lacks expected
    /// fields, in which case the resource is read again.
    async fn confirm_present(&self, coords: &Coordinates, result: Value) -> Result<Value, Failure> {
        let complete = result.is_object()
            && self
                .descriptor
                .expected_fields
                .iter()
                .all(|field| crate::format::lookup(&result, field).map_or(false, |v| !v.is_null()));
        if complete {
            return Ok(result);
        }

        debug!("Mutation result for {} is incomplete, re-reading", coords);
        match self.gateway.get(coords).await.map_err(Failure::after_mutation)? {
            Some(current) => Ok(current),
            None => {
                warn!("{} not readable right after mutation", coords);
                Ok(result)
            }
        }
    }

    /// Observed and desired documents with secret members masked and any
    /// registered secret scrubbed.
    fn scrub(&self, value: &Value) -> Value {
        self.redactor
            .redact_value(&redact::mask_paths(value, &self.secret_paths))
    }

    fn publish(&self, observed: &Value) -> Value {
        let masked = redact::mask_paths(observed, &self.secret_paths);
        self.redactor
            .redact_value(&self.descriptor.output.format(&masked))
    }

    fn diff(&self, observed: Option<&Value>, plan: &Plan) -> Diff {
        let before = observed.cloned().unwrap_or_else(empty);
        let after = match (plan.action, &plan.body) {
            (Action::Delete, _) => empty(),
            (Action::Update, Some(body)) => compare::merge(&before, body),
            (_, Some(body)) => body.clone(),
            (_, None) => before.clone(),
        };
        Diff::between(self.scrub(&before), self.scrub(&after))
    }
}

/// Bind, then reconcile, one resource.
pub async fn reconcile(
    descriptor: &ResourceDescriptor,
    args: &BoundArgs,
    context: &ModuleContext,
) -> Result<Outcome, Failure> {
    let desired = DesiredState::from_args(descriptor, args, context.check_mode)?;
    Reconciler::new(descriptor, context, args.redactor())
        .run(&desired)
        .await
}

fn empty() -> Value {
    Value::Object(Map::new())
}

fn set_tags(body: &mut Value, tags: &Tags) {
    if let Value::Object(map) = body {
        map.insert("tags".to_string(), tags::to_value(tags));
    }
}

/// Observed representation minus server-managed members.
fn writable(observed: &Value) -> Value {
    let mut value = observed.clone();
    if let Value::Object(map) = &mut value {
        for field in READ_ONLY_FIELDS {
            map.remove(*field);
        }
        if let Some(Value::Object(properties)) = map.get_mut("properties") {
            properties.remove("provisioningState");
        }
    }
    value
}
