//! Schema generation for strict structured output.
//!
//! Both providers reject schemas with open objects or `$ref` indirection in strict
//! mode, so every schema handed to a client goes through [`strictify`] first.

use schemars::{schema_for, JsonSchema};
use serde_json::{Map, Value};

/// Strict JSON schema for `T`: refs inlined, every object closed and fully required.
pub fn strict_schema<T: JsonSchema>() -> Value {
    let mut value = serde_json::to_value(schema_for!(T)).unwrap_or_default();
    strictify(&mut value);
    value
}

/// Rewrite a schema in place into the strict subset.
pub fn strictify(schema: &mut Value) {
    let definitions = schema
        .as_object_mut()
        .and_then(|root| root.remove("definitions"))
        .unwrap_or(Value::Null);
    if let Value::Object(root) = schema {
        root.remove("$schema");
    }
    rewrite(schema, &definitions, 0);
}

/// Nesting guard for self-referential definitions.
const MAX_DEPTH: usize = 32;

fn rewrite(node: &mut Value, definitions: &Value, depth: usize) {
    if depth > MAX_DEPTH {
        return;
    }
    match node {
        Value::Object(map) => {
            if let Some(target) = resolve_ref(map, definitions) {
                *node = target;
                rewrite(node, definitions, depth + 1);
                return;
            }
            if let Some(single) = single_all_of(map) {
                *node = single;
                rewrite(node, definitions, depth + 1);
                return;
            }
            close_object(map);
            for child in map.values_mut() {
                rewrite(child, definitions, depth + 1);
            }
        }
        Value::Array(items) => {
            for item in items {
                rewrite(item, definitions, depth + 1);
            }
        }
        _ => {}
    }
}

fn resolve_ref(map: &Map<String, Value>, definitions: &Value) -> Option<Value> {
    let name = map.get("$ref")?.as_str()?.strip_prefix("#/definitions/")?;
    definitions.get(name).cloned()
}

/// schemars wraps documented field types as `allOf: [<ref>]`.
fn single_all_of(map: &Map<String, Value>) -> Option<Value> {
    match map.get("allOf")? {
        Value::Array(parts) if parts.len() == 1 => Some(parts[0].clone()),
        _ => None,
    }
}

fn close_object(map: &mut Map<String, Value>) {
    if map.get("type").and_then(Value::as_str) != Some("object") {
        return;
    }
    map.insert("additionalProperties".into(), Value::Bool(false));
    let keys: Vec<Value> = map
        .get("properties")
        .and_then(Value::as_object)
        .map(|props| props.keys().cloned().map(Value::String).collect())
        .unwrap_or_default();
    map.insert("required".into(), Value::Array(keys));
}
