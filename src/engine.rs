use crate::rules::RuleSet;
use crate::value::Value;
use chrono::{DateTime, Utc};
use itertools::Itertools;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// The entity type this engine classifies.
pub const ENTITY_TYPE: &str = "ip";

/// The event name that forces re-evaluation of every configured tag.
pub const REFRESH_EVENT: &str = "!refresh_tags";

/// A two-part entity key, e.g. `("ip", "192.0.2.42")`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntityKey<'a> {
    pub entity_type: &'a str,
    pub key: &'a str,
}

impl<'a> EntityKey<'a> {
    pub fn new(entity_type: &'a str, key: &'a str) -> Self {
        Self { entity_type, key }
    }

    pub fn ip(key: &'a str) -> Self {
        Self::new(ENTITY_TYPE, key)
    }
}

/// One entry of the update list handed to the handler: an attribute (or
/// `!event`) name and its new value. The engine only inspects the names.
#[derive(Clone, Debug, PartialEq)]
pub struct AttributeUpdate {
    pub attribute: String,
    pub value: Value,
}

impl AttributeUpdate {
    pub fn new(attribute: impl Into<String>, value: Value) -> Self {
        Self {
            attribute: attribute.into(),
            value,
        }
    }

    pub fn refresh() -> Self {
        Self::new(REFRESH_EVENT, Value::Null)
    }

    /// Event entries (`!`-prefixed names) are not attributes and never hit
    /// the trigger index.
    pub fn is_event(&self) -> bool {
        self.attribute.starts_with('!')
    }
}

/// A record mutation proposed by reconciliation. Paths are dotted
/// (`tags.<id>.confidence`). The caller applies mutations and owns
/// persistence; the engine never touches the record itself.
#[derive(Clone, Debug, PartialEq)]
pub enum Mutation {
    Set { path: String, value: Value },
    Remove { path: String },
}

impl Mutation {
    pub fn set(path: impl Into<String>, value: Value) -> Self {
        Mutation::Set {
            path: path.into(),
            value,
        }
    }

    pub fn remove(path: impl Into<String>) -> Self {
        Mutation::Remove { path: path.into() }
    }

    pub fn path(&self) -> &str {
        match self {
            Mutation::Set { path, .. } | Mutation::Remove { path } => path,
        }
    }
}

/// The prior state of a tag as stored on the record under `tags.<id>`.
///
/// Only confidence and info take part in the changed/unchanged decision;
/// the timestamps under the same subtree belong to the store and are never
/// read back.
#[derive(Clone, Debug, PartialEq)]
pub struct TagState {
    pub confidence: Value,
    pub info: Option<Value>,
}

impl TagState {
    pub fn from_record(record: &Value, tag_id: &str) -> Option<Self> {
        let entry = record.get("tags")?.get(tag_id)?;
        Some(Self {
            confidence: entry.get("confidence").cloned().unwrap_or(Value::Null),
            info: entry.get("info").cloned(),
        })
    }
}

/// The dispatcher interface the engine registers itself with at startup.
pub trait UpdateManager {
    fn register_handler(
        &mut self,
        entity_type: &str,
        trigger_attributes: &[String],
        declared_outputs: &[String],
    );
}

// The evaluation outcome of a satisfied tag.
struct Satisfied {
    confidence: Decimal,
    info: Option<Value>,
}

// Condition truth: false for null, false, zero and the empty list,
// true for everything else (empty strings included).
fn condition_met(value: &Value) -> bool {
    match value {
        Value::Null | Value::Boolean(false) => false,
        Value::Number(number) => !number.is_zero(),
        Value::List(values) => !values.is_empty(),
        _ => true,
    }
}

// Confidence reduction: numeric results pass through, null and false are 0,
// everything else (true included) is 1.
fn confidence_of(value: &Value) -> Decimal {
    match value {
        Value::Null | Value::Boolean(false) => Decimal::ZERO,
        Value::Number(number) => *number,
        _ => Decimal::ONE,
    }
}

impl RuleSet {
    /// Register this rule set's handler interests with the dispatcher.
    pub fn register(&self, manager: &mut dyn UpdateManager) {
        manager.register_handler(
            ENTITY_TYPE,
            &self.trigger_attributes(),
            &self.declared_outputs(),
        );
    }

    /// The engine's entry point: reconcile the record's tags against the
    /// compiled rules.
    ///
    /// Determines the tags eligible for re-evaluation from the updated
    /// attribute names (or all of them on a `!refresh_tags` event),
    /// evaluates their conditions against the record snapshot and returns
    /// the mutations that bring the record's `tags` subtree up to date.
    /// Returns `None` for any entity type other than `"ip"`.
    pub fn update_tags(
        &self,
        entity: &EntityKey<'_>,
        record: &Value,
        updates: &[AttributeUpdate],
    ) -> Option<Vec<Mutation>> {
        self.update_tags_at(entity, record, updates, Utc::now())
    }

    /// [`RuleSet::update_tags`] with an explicit timestamp for the
    /// `time_added`/`time_modified` mutations.
    pub fn update_tags_at(
        &self,
        entity: &EntityKey<'_>,
        record: &Value,
        updates: &[AttributeUpdate],
        now: DateTime<Utc>,
    ) -> Option<Vec<Mutation>> {
        if entity.entity_type != ENTITY_TYPE {
            return None;
        }

        let refresh_all = updates
            .iter()
            .any(|update| update.attribute == REFRESH_EVENT);

        let mut eligible: BTreeSet<&str> = BTreeSet::new();
        if refresh_all {
            eligible.extend(self.tag_ids());
        } else {
            for update in updates.iter().filter(|update| !update.is_event()) {
                if let Some(dependents) = self.dependents(&update.attribute) {
                    eligible.extend(dependents.iter().map(String::as_str));
                }
            }
        }
        debug!(
            key = %entity.key,
            tags = %eligible.iter().join(", "),
            "re-evaluating tags"
        );

        let mut satisfied: BTreeMap<&str, Satisfied> = BTreeMap::new();
        for tag_id in &eligible {
            let Some(tag) = self.get(tag_id) else {
                continue;
            };
            let value = tag.condition().eval(record);
            if condition_met(&value) {
                let confidence = confidence_of(&value);
                let info = tag.info().map(|expr| expr.eval(record));
                debug!(
                    tag = %tag.id(),
                    key = %entity.key,
                    %confidence,
                    "tag condition satisfied"
                );
                satisfied.insert(*tag_id, Satisfied { confidence, info });
            } else {
                debug!(tag = %tag.id(), key = %entity.key, "tag condition not satisfied");
            }
        }

        let mut mutations = Vec::new();

        // A forced refresh also drops record tags that are no longer in the
        // configuration.
        if refresh_all {
            if let Some(Value::Map(existing)) = record.get("tags") {
                for tag_id in existing.keys() {
                    if !eligible.contains(tag_id.as_str()) {
                        debug!(
                            tag = %tag_id,
                            key = %entity.key,
                            "removing tag that is no longer configured"
                        );
                        mutations.push(Mutation::remove(format!("tags.{tag_id}")));
                    }
                }
            }
        }

        let timestamp = Value::String(now.to_rfc3339());
        for tag_id in &eligible {
            let state = TagState::from_record(record, tag_id);
            match (satisfied.get(tag_id), state) {
                (Some(result), Some(state)) => {
                    let confidence = Value::Number(result.confidence);
                    if state.confidence != confidence || state.info != result.info {
                        mutations.push(Mutation::set(
                            format!("tags.{tag_id}.confidence"),
                            confidence,
                        ));
                        if let Some(info) = &result.info {
                            mutations
                                .push(Mutation::set(format!("tags.{tag_id}.info"), info.clone()));
                        }
                        mutations.push(Mutation::set(
                            format!("tags.{tag_id}.time_modified"),
                            timestamp.clone(),
                        ));
                        debug!(tag = %tag_id, key = %entity.key, "tag has been updated");
                    } else {
                        debug!(tag = %tag_id, key = %entity.key, "tag is unchanged");
                    }
                }
                (Some(result), None) => {
                    mutations.push(Mutation::set(
                        format!("tags.{tag_id}.confidence"),
                        Value::Number(result.confidence),
                    ));
                    if let Some(info) = &result.info {
                        mutations.push(Mutation::set(format!("tags.{tag_id}.info"), info.clone()));
                    }
                    mutations.push(Mutation::set(
                        format!("tags.{tag_id}.time_added"),
                        timestamp.clone(),
                    ));
                    mutations.push(Mutation::set(
                        format!("tags.{tag_id}.time_modified"),
                        timestamp.clone(),
                    ));
                    debug!(tag = %tag_id, key = %entity.key, "tag has been added");
                }
                (None, Some(_)) => {
                    mutations.push(Mutation::remove(format!("tags.{tag_id}")));
                    debug!(tag = %tag_id, key = %entity.key, "tag has been removed");
                }
                (None, None) => {}
            }
        }

        Some(mutations)
    }
}
