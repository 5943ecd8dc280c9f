/**
 * ============================================================================
 * SCHEMA REGISTRY MODULE
 * ============================================================================
 *
 * PURPOSE: Hold the event definitions the tracker accepts and validate
 * event parameters against them
 *
 * SCHEMA DOCUMENT (JSON):
 * {
 *   "version": "1.1.0",
 *   "events": {
 *     "purchase": {
 *       "priority": "high",
 *       "params": { "orderId": { "type": "string", "required": true } }
 *     }
 *   }
 * }
 *
 * MERGE RULES:
 * - New version string replaces the old one
 * - Event definitions are unioned by name
 * - A same-named definition replaces the old one wholesale
 *
 * ============================================================================
 */

use crate::sdk::types::{ParamType, Priority, TrackerError};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::{PoisonError, RwLock};

/**
 * Built-in schema every tracker starts from
 */
static DEFAULT_SCHEMA: Lazy<Schema> = Lazy::new(|| {
    use ParamType::*;

    let mut events = IndexMap::new();
    events.insert("pageView".to_string(), definition(Priority::Low, &[("pageTitle", String), ("referrer", String)]));
    events.insert("pageStay".to_string(), definition(Priority::Low, &[("duration", Number), ("scrollDepth", Number)]));
    events.insert(
        "exposure".to_string(),
        definition(Priority::Low, &[("componentId", String), ("componentName", String), ("duration", Number)]),
    );
    events.insert(
        "buttonClick".to_string(),
        definition(
            Priority::Medium,
            &[("buttonId", String), ("buttonText", String), ("pageUrl", String), ("extra", Object)],
        ),
    );
    events.insert("formSubmit".to_string(), definition(Priority::Medium, &[("formId", String), ("formData", Object)]));
    events.insert(
        "purchase".to_string(),
        definition(
            Priority::High,
            &[("orderId", String), ("amount", Number), ("currency", String), ("items", Array)],
        ),
    );
    events.insert("performance".to_string(), definition(Priority::Low, &[("fcp", Number), ("lcp", Number), ("ttfb", Number)]));
    events.insert(
        "error".to_string(),
        definition(
            Priority::High,
            &[("message", String), ("stack", String), ("filename", String), ("lineno", Number), ("colno", Number)],
        ),
    );

    Schema {
        version: "1.0.0".to_string(),
        events,
    }
});

fn definition(priority: Priority, params: &[(&str, ParamType)]) -> EventDefinition {
    EventDefinition {
        priority,
        params: params
            .iter()
            .map(|(name, param_type)| (name.to_string(), ParamSpec::optional(*param_type)))
            .collect(),
        description: None,
    }
}

/**
 * Declared type and presence rule for one event parameter
 */
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParamSpec {
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ParamSpec {
    pub fn optional(param_type: ParamType) -> Self {
        Self {
            param_type,
            required: false,
            description: None,
        }
    }

    pub fn required(param_type: ParamType) -> Self {
        Self {
            param_type,
            required: true,
            description: None,
        }
    }
}

/**
 * Contract a named event must satisfy
 */
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventDefinition {
    pub priority: Priority,
    #[serde(default, alias = "parameters")]
    pub params: IndexMap<String, ParamSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/**
 * Versioned set of event definitions
 */
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Schema {
    pub version: String,
    #[serde(default, alias = "definitions")]
    pub events: IndexMap<String, EventDefinition>,
}

impl Default for Schema {
    fn default() -> Self {
        DEFAULT_SCHEMA.clone()
    }
}

/**
 * Outcome of validating one event against the schema
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationResult {
    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/**
 * Runtime-extensible registry of event definitions
 * Single writer lock: merges are atomic with respect to readers
 */
#[derive(Debug)]
pub struct SchemaRegistry {
    schema: RwLock<Schema>,
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaRegistry {
    /**
     * Registry seeded with the built-in default schema
     */
    pub fn new() -> Self {
        Self {
            schema: RwLock::new(Schema::default()),
        }
    }

    /**
     * Registry seeded with the default schema, then merged with `initial`
     */
    pub fn with_schema(initial: Schema) -> Self {
        let registry = Self::new();
        registry.load_config(initial);
        registry
    }

    /**
     * Merge a schema into the current one
     * Version is replaced, definitions are replaced per event name
     */
    pub fn load_config(&self, schema: Schema) {
        log::info!(
            "Loading schema version {} ({} event definitions)",
            schema.version,
            schema.events.len()
        );

        let mut current = self.schema.write().unwrap_or_else(PoisonError::into_inner);
        current.version = schema.version;
        for (name, definition) in schema.events {
            if current.events.insert(name.clone(), definition).is_some() {
                log::debug!("Schema definition for '{}' replaced", name);
            }
        }
    }

    /**
     * Parse a JSON schema document and merge it
     * The current schema is left untouched when parsing fails
     */
    pub fn load_json(&self, json_str: &str) -> Result<(), TrackerError> {
        let schema: Schema = serde_json::from_str(json_str)
            .map_err(|e| TrackerError::SchemaLoad(format!("Failed to parse schema JSON: {}", e)))?;
        self.load_config(schema);
        Ok(())
    }

    /**
     * Validate event parameters against the event's definition
     * Collects every violation instead of stopping at the first one
     */
    pub fn validate(&self, event_name: &str, params: &Map<String, Value>) -> ValidationResult {
        let schema = self.schema.read().unwrap_or_else(PoisonError::into_inner);

        let Some(definition) = schema.events.get(event_name) else {
            return ValidationResult::from_errors(vec![format!(
                "Event '{}' is not defined in the schema.",
                event_name
            )]);
        };

        let mut errors = Vec::new();
        for (key, spec) in &definition.params {
            let actual = params.get(key).and_then(ParamType::of);
            match actual {
                None if spec.required => {
                    errors.push(format!("Missing required parameter: '{}'", key));
                }
                None => {}
                Some(actual) if !spec.param_type.accepts(actual) => {
                    errors.push(format!(
                        "Parameter '{}' expected type '{}' but got '{}'",
                        key, spec.param_type, actual
                    ));
                }
                Some(_) => {}
            }
        }

        ValidationResult::from_errors(errors)
    }

    /**
     * Declared priority of an event, `low` when the event is unknown
     */
    pub fn priority(&self, event_name: &str) -> Priority {
        let schema = self.schema.read().unwrap_or_else(PoisonError::into_inner);
        schema
            .events
            .get(event_name)
            .map(|definition| definition.priority)
            .unwrap_or_default()
    }

    pub fn version(&self) -> String {
        self.schema.read().unwrap_or_else(PoisonError::into_inner).version.clone()
    }

    pub fn contains(&self, event_name: &str) -> bool {
        self.schema
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .events
            .contains_key(event_name)
    }

    /**
     * Copy of the current schema
     */
    pub fn snapshot(&self) -> Schema {
        self.schema.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn test_schema() -> Schema {
        serde_json::from_value(json!({
            "version": "1.0.1",
            "events": {
                "testEvent": {
                    "priority": "low",
                    "params": { "requiredField": { "type": "string", "required": true } }
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_default_schema_contents() {
        let registry = SchemaRegistry::new();
        assert_eq!(registry.version(), "1.0.0");
        for name in [
            "pageView", "pageStay", "exposure", "buttonClick", "formSubmit", "purchase", "performance", "error",
        ] {
            assert!(registry.contains(name), "missing default event {}", name);
        }
        assert_eq!(registry.priority("purchase"), Priority::High);
        assert_eq!(registry.priority("error"), Priority::High);
        assert_eq!(registry.priority("buttonClick"), Priority::Medium);
        assert_eq!(registry.priority("pageView"), Priority::Low);
    }

    #[test]
    fn test_unknown_event_is_invalid_and_low_priority() {
        let registry = SchemaRegistry::new();
        let result = registry.validate("unknownEvent", &Map::new());
        assert!(!result.valid);
        assert_eq!(result.errors, vec!["Event 'unknownEvent' is not defined in the schema.".to_string()]);
        assert_eq!(registry.priority("unknownEvent"), Priority::Low);
    }

    #[test]
    fn test_type_mismatch_reported() {
        let registry = SchemaRegistry::new();
        let result = registry.validate("pageView", &params(json!({"pageTitle": 123, "referrer": ""})));
        assert!(!result.valid);
        assert_eq!(
            result.errors,
            vec!["Parameter 'pageTitle' expected type 'string' but got 'number'".to_string()]
        );
    }

    #[test]
    fn test_all_errors_collected() {
        let registry = SchemaRegistry::new();
        let result = registry.validate(
            "purchase",
            &params(json!({"orderId": 1, "amount": "100", "currency": "USD", "items": {}})),
        );
        assert_eq!(result.errors.len(), 3);
        assert!(result.errors[0].contains("'orderId'"));
        assert!(result.errors[1].contains("'amount'"));
        assert!(result.errors[2].contains("expected type 'array' but got 'object'"));
    }

    #[test]
    fn test_object_type_accepts_arrays_and_scalars() {
        let registry = SchemaRegistry::new();
        let with_array = registry.validate("formSubmit", &params(json!({"formId": "f", "formData": [1, 2]})));
        assert!(with_array.valid);
        let with_string = registry.validate("buttonClick", &params(json!({"extra": "loose"})));
        assert!(with_string.valid);
    }

    #[test]
    fn test_required_and_null_handling() {
        let registry = SchemaRegistry::with_schema(test_schema());

        let missing = registry.validate("testEvent", &Map::new());
        assert_eq!(missing.errors, vec!["Missing required parameter: 'requiredField'".to_string()]);

        let null = registry.validate("testEvent", &params(json!({"requiredField": null})));
        assert!(!null.valid);

        let ok = registry.validate("testEvent", &params(json!({"requiredField": "ok"})));
        assert!(ok.valid);

        // Optional params may be null
        let optional_null = registry.validate("pageView", &params(json!({"pageTitle": null})));
        assert!(optional_null.valid);
    }

    #[test]
    fn test_extra_params_allowed() {
        let registry = SchemaRegistry::new();
        let result = registry.validate("pageView", &params(json!({"pageTitle": "t", "campaign": "x"})));
        assert!(result.valid);
    }

    #[test]
    fn test_validate_is_idempotent_and_pure() {
        let registry = SchemaRegistry::new();
        let before = registry.snapshot();
        let input = params(json!({"pageTitle": 5}));
        let first = registry.validate("pageView", &input);
        let second = registry.validate("pageView", &input);
        assert_eq!(first, second);
        assert_eq!(registry.snapshot(), before);
    }

    #[test]
    fn test_merge_keeps_existing_definitions() {
        let registry = SchemaRegistry::new();
        let input = params(json!({"pageTitle": 5}));
        let before = registry.validate("pageView", &input);

        registry.load_config(test_schema());

        assert_eq!(registry.version(), "1.0.1");
        assert!(registry.contains("testEvent"));
        assert!(registry.contains("purchase"));
        assert_eq!(registry.validate("pageView", &input), before);
    }

    #[test]
    fn test_merge_replaces_whole_definition() {
        let registry = SchemaRegistry::new();
        registry
            .load_json(r#"{"version":"2.0.0","events":{"purchase":{"priority":"low","params":{"sku":{"type":"string","required":true}}}}}"#)
            .unwrap();

        assert_eq!(registry.priority("purchase"), Priority::Low);
        // orderId is no longer declared, so a wrong type passes
        let result = registry.validate("purchase", &params(json!({"orderId": 1, "sku": "a"})));
        assert!(result.valid);
        let missing = registry.validate("purchase", &Map::new());
        assert_eq!(missing.errors, vec!["Missing required parameter: 'sku'".to_string()]);
    }

    #[test]
    fn test_load_json_failure_leaves_schema_untouched() {
        let registry = SchemaRegistry::new();
        let before = registry.snapshot();

        let err = registry
            .load_json(r#"{"version":"9","events":{"x":{"priority":"high","params":{"a":{"type":"date"}}}}}"#)
            .unwrap_err();
        assert!(matches!(err, TrackerError::SchemaLoad(_)));
        assert_eq!(registry.snapshot(), before);
    }

    #[test]
    fn test_schema_aliases_accepted() {
        let schema: Schema = serde_json::from_str(
            r#"{"version":"3","definitions":{"e":{"priority":"medium","parameters":{"p":{"type":"boolean"}}}}}"#,
        )
        .unwrap();
        assert_eq!(schema.events["e"].params["p"].param_type, ParamType::Boolean);
        assert!(!schema.events["e"].params["p"].required);
    }
}
