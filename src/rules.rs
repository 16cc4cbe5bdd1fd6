use crate::ast::Expr;
use crate::engine::REFRESH_EVENT;
use crate::error::ConfigError;
use crate::parser;
use itertools::Itertools;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, error, info};

/// The tag configuration consumed by the rule compiler: a mapping from tag
/// id to its condition text and optional info template.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct TagsConfig {
    #[serde(default)]
    pub tags: BTreeMap<String, TagDefinition>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct TagDefinition {
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub info: Option<String>,
}

/// A tag whose condition (and optional info template) compiled successfully.
#[derive(Clone, Debug)]
pub struct CompiledTag {
    id: String,
    condition: Expr,
    info: Option<Expr>,
    triggers: BTreeSet<String>,
}

impl CompiledTag {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn condition(&self) -> &Expr {
        &self.condition
    }

    pub fn info(&self) -> Option<&Expr> {
        self.info.as_ref()
    }

    /// The attribute names whose update re-triggers this tag's evaluation,
    /// derived from the condition (info placeholders do not re-trigger).
    pub fn triggers(&self) -> impl Iterator<Item = &str> {
        self.triggers.iter().map(String::as_str)
    }

    pub fn has_info(&self) -> bool {
        self.info.is_some()
    }
}

/// The compiled rule set: every tag that survived compilation plus the
/// trigger index mapping attribute names to the tags that depend on them.
///
/// A [`RuleSet`] is built once at configuration load and never mutated
/// afterwards, so it can be shared freely between concurrent evaluations;
/// hot reload replaces the whole value.
#[derive(Clone, Debug, Default)]
pub struct RuleSet {
    tags: BTreeMap<String, CompiledTag>,
    triggers: BTreeMap<String, BTreeSet<String>>,
}

impl RuleSet {
    /// Compile every tag in the configuration.
    ///
    /// A tag missing its `condition`, or whose condition or info fails to
    /// parse, is skipped with a logged error; the remaining tags still load.
    pub fn from_config(config: &TagsConfig) -> Self {
        let mut tags = BTreeMap::new();
        for (tag_id, definition) in &config.tags {
            let Some(condition_text) = &definition.condition else {
                error!(
                    tag = %tag_id,
                    "tag does not have the obligatory \"condition\" key, skipping it"
                );
                continue;
            };
            let condition = match parser::parse(condition_text) {
                Ok(parsed) => parsed,
                Err(parse_error) => {
                    error!(
                        tag = %tag_id,
                        %parse_error,
                        "failed to parse the condition of the tag, skipping it"
                    );
                    continue;
                }
            };
            let info = match &definition.info {
                Some(info_text) => match parser::parse_info(info_text) {
                    Ok(parsed) => Some(parsed.ast),
                    Err(parse_error) => {
                        error!(
                            tag = %tag_id,
                            %parse_error,
                            "failed to parse the info of the tag, skipping it"
                        );
                        continue;
                    }
                },
                None => None,
            };
            debug!(tag = %tag_id, "tag has been compiled");
            tags.insert(
                tag_id.clone(),
                CompiledTag {
                    id: tag_id.clone(),
                    condition: condition.ast,
                    info,
                    triggers: condition.triggers,
                },
            );
        }

        let mut triggers: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for tag in tags.values() {
            for attribute in tag.triggers() {
                triggers
                    .entry(attribute.to_string())
                    .or_default()
                    .insert(tag.id().to_string());
            }
        }
        for (attribute, dependents) in &triggers {
            debug!(
                attribute = %attribute,
                tags = %dependents.iter().join(", "),
                "attribute triggers tag re-evaluation"
            );
        }
        info!(count = tags.len(), "tags have been compiled");

        Self { tags, triggers }
    }

    /// Deserialize a YAML tag configuration and compile it.
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let config: TagsConfig = serde_yaml::from_str(text)?;
        Ok(Self::from_config(&config))
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn get(&self, tag_id: &str) -> Option<&CompiledTag> {
        self.tags.get(tag_id)
    }

    pub fn tags(&self) -> impl Iterator<Item = &CompiledTag> {
        self.tags.values()
    }

    pub(crate) fn tag_ids(&self) -> impl Iterator<Item = &str> {
        self.tags.keys().map(String::as_str)
    }

    pub(crate) fn dependents(&self, attribute: &str) -> Option<&BTreeSet<String>> {
        self.triggers.get(attribute)
    }

    /// The attribute set to register with the dispatcher: every trigger
    /// attribute plus the forced-refresh event.
    pub fn trigger_attributes(&self) -> Vec<String> {
        let mut attributes: Vec<String> = self.triggers.keys().cloned().collect();
        attributes.push(REFRESH_EVENT.to_string());
        attributes
    }

    /// The record attributes reconciliation may set or remove, declared to
    /// the dispatcher at registration time.
    pub fn declared_outputs(&self) -> Vec<String> {
        let mut outputs = Vec::with_capacity(self.tags.len() * 4);
        for tag in self.tags.values() {
            outputs.push(format!("tags.{}.confidence", tag.id()));
            outputs.push(format!("tags.{}.time_added", tag.id()));
            outputs.push(format!("tags.{}.time_modified", tag.id()));
            if tag.has_info() {
                outputs.push(format!("tags.{}.info", tag.id()));
            }
        }
        outputs
    }
}
