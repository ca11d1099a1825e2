//! JSON schemas for OpenAI strict structured outputs.
//!
//! Schemas are generated with `schemars` and then rewritten into the subset
//! strict mode accepts:
//! 1. `additionalProperties: false` on every object schema
//! 2. every property listed in `required`, nullable ones included
//! 3. no `$ref`: definitions are inlined and dropped

use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Types usable as OpenAI structured output.
///
/// Blanket-implemented for any `JsonSchema + DeserializeOwned` type.
pub trait StructuredOutput: JsonSchema + DeserializeOwned {
    /// OpenAI-compatible JSON schema for this type.
    fn openai_schema() -> Value {
        let schema = schema_for!(Self);
        normalize_schema(serde_json::to_value(schema).unwrap_or_default())
    }

    fn type_name() -> String {
        <Self as JsonSchema>::schema_name()
    }
}

impl<T: JsonSchema + DeserializeOwned> StructuredOutput for T {}

/// Rewrite an arbitrary schemars root schema for strict mode.
pub fn normalize_schema(mut value: Value) -> Value {
    fix_object_schemas(&mut value);
    inline_refs(&mut value);

    if let Value::Object(map) = &mut value {
        map.remove("definitions");
        map.remove("$schema");
    }

    value
}

fn fix_object_schemas(value: &mut Value) {
    match value {
        Value::Object(map) => {
            if map.get("type") == Some(&Value::String("object".to_string())) {
                map.insert("additionalProperties".to_string(), Value::Bool(false));

                if let Some(Value::Object(props)) = map.get("properties") {
                    let all_keys: Vec<Value> =
                        props.keys().map(|k| Value::String(k.clone())).collect();
                    map.insert("required".to_string(), Value::Array(all_keys));
                }
            }

            for (_, v) in map.iter_mut() {
                fix_object_schemas(v);
            }
        }
        Value::Array(arr) => {
            for item in arr.iter_mut() {
                fix_object_schemas(item);
            }
        }
        _ => {}
    }
}

fn inline_refs(value: &mut Value) {
    let definitions = match value {
        Value::Object(map) => map.get("definitions").cloned(),
        _ => None,
    };

    if let Some(defs) = definitions {
        inline_refs_recursive(value, &defs);
    }
}

fn inline_refs_recursive(value: &mut Value, definitions: &Value) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(ref_path)) = map.get("$ref").cloned() {
                if let Some(type_name) = ref_path.strip_prefix("#/definitions/") {
                    if let Some(def) = definitions.get(type_name) {
                        *value = def.clone();
                        inline_refs_recursive(value, definitions);
                        return;
                    }
                }
            }

            for (_, v) in map.iter_mut() {
                inline_refs_recursive(v, definitions);
            }
        }
        Value::Array(arr) => {
            for item in arr.iter_mut() {
                inline_refs_recursive(item, definitions);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemars::JsonSchema;
    use serde::Deserialize;

    #[derive(Deserialize, JsonSchema)]
    struct LinkNote {
        url: String,
        reason: Option<String>,
    }

    #[derive(Deserialize, JsonSchema)]
    struct PageNotes {
        summary: String,
        best_link: LinkNote,
        links: Vec<LinkNote>,
    }

    #[test]
    fn test_optional_fields_are_required() {
        let schema = LinkNote::openai_schema();
        let required: Vec<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|v| v.as_str())
            .collect();

        assert!(required.contains(&"url"));
        assert!(required.contains(&"reason"));
        assert_eq!(schema["additionalProperties"], Value::Bool(false));
    }

    #[test]
    fn test_nested_refs_are_inlined() {
        let schema = PageNotes::openai_schema();
        let obj = schema.as_object().unwrap();

        assert!(!obj.contains_key("definitions"));
        assert!(!obj.contains_key("$schema"));

        let best_link = &schema["properties"]["best_link"];
        assert!(best_link.get("$ref").is_none());
        assert_eq!(best_link["type"], "object");
        assert_eq!(best_link["additionalProperties"], Value::Bool(false));

        let items = &schema["properties"]["links"]["items"];
        assert!(items.get("$ref").is_none());
        assert_eq!(items["type"], "object");
    }

    #[test]
    fn test_normalize_schema_on_raw_value() {
        let raw = serde_json::json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "type": "object",
            "properties": { "inner": { "$ref": "#/definitions/Inner" } },
            "definitions": {
                "Inner": { "type": "object", "properties": { "x": { "type": "string" } } }
            }
        });

        let schema = normalize_schema(raw);
        assert!(schema.get("definitions").is_none());
        assert_eq!(schema["properties"]["inner"]["required"][0], "x");
    }
}
