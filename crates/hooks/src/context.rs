//! Caller-supplied mutation context and extra-field resolution.
//!
//! Every configured extra field is looked up in the same order, whatever its
//! declared origin:
//! 1. the explicit [`MutationContext`];
//! 2. the partial `$set` payload of the update, if any;
//! 3. the entity as stored after the transition.
//!
//! The declared origin only names where the value is expected to come from.
//! A field found nowhere is left out of the patch.

use crate::config::{FieldOrigin, VersioningConfig};
use revlog_common::Document;
use revlog_persist::{Update, get_path};
use serde_json::Value;
use std::collections::BTreeMap;

/// Context passed alongside a mutation (actor, reason, request id, ...).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutationContext(Document);

impl MutationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        get_path(&self.0, path)
    }
}

impl From<Document> for MutationContext {
    fn from(doc: Document) -> Self {
        Self(doc)
    }
}

pub(crate) fn resolve_extra(
    config: &VersioningConfig,
    entity: &Document,
    update: Option<&Update>,
    ctx: &MutationContext,
) -> BTreeMap<String, Value> {
    config
        .include_fields
        .iter()
        .filter_map(|(name, field)| {
            let (origin, value) = lookup(&field.source, entity, update, ctx)?;
            if origin != field.origin {
                tracing::debug!(
                    field = %name,
                    source = %field.source,
                    declared = ?field.origin,
                    found = ?origin,
                    "extra field resolved outside its declared origin"
                );
            }
            Some((name.clone(), value.clone()))
        })
        .collect()
}

fn lookup<'a>(
    source: &str,
    entity: &'a Document,
    update: Option<&'a Update>,
    ctx: &'a MutationContext,
) -> Option<(FieldOrigin, &'a Value)> {
    ctx.get(source)
        .or_else(|| update.and_then(|u| get_path(&u.set, source)))
        .map(|v| (FieldOrigin::Context, v))
        .or_else(|| get_path(entity, source).map(|v| (FieldOrigin::Entity, v)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(v: Value) -> Document {
        match v {
            Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    fn config() -> VersioningConfig {
        VersioningConfig::new("tasks")
            .include("actor", "user", FieldOrigin::Context)
            .include("list", "listId", FieldOrigin::Entity)
    }

    #[test]
    fn explicit_context_wins_over_everything() {
        let entity = doc(json!({"listId": "home", "user": "stale"}));
        let update = Update::set("user", json!("payload"));
        let ctx = MutationContext::new()
            .with("user", json!("kim"))
            .with("listId", json!("ctx-list"));
        let extra = resolve_extra(&config(), &entity, Some(&update), &ctx);
        assert_eq!(extra["actor"], json!("kim"));
        assert_eq!(extra["list"], json!("ctx-list"));
    }

    #[test]
    fn set_payload_comes_before_the_entity_for_every_origin() {
        let entity = doc(json!({"listId": "home", "user": "from-entity"}));
        let update = Update::set("user", json!("payload")).and_set("listId", json!("moved"));
        let extra = resolve_extra(&config(), &entity, Some(&update), &MutationContext::new());
        assert_eq!(extra["actor"], json!("payload"));
        assert_eq!(extra["list"], json!("moved"));
    }

    #[test]
    fn context_origin_falls_back_to_the_entity() {
        let entity = doc(json!({"listId": "home", "user": "kim"}));
        let extra = resolve_extra(&config(), &entity, None, &MutationContext::new());
        assert_eq!(extra["actor"], json!("kim"));
        assert_eq!(extra["list"], json!("home"));

        let extra = resolve_extra(&config(), &Document::new(), None, &MutationContext::new());
        assert!(extra.is_empty());
    }

    #[test]
    fn nested_sources() {
        let c = VersioningConfig::new("tasks").include("why", "meta.reason", FieldOrigin::Context);
        let ctx = MutationContext::from(doc(json!({"meta": {"reason": "cleanup"}})));
        let extra = resolve_extra(&c, &Document::new(), None, &ctx);
        assert_eq!(extra["why"], json!("cleanup"));
    }
}
