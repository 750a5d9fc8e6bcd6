//! Conversion between Terraform state values, resource models and API
//! payloads
//!
//! Every direction goes through `serde_json::Value`. Merging conversions
//! only overwrite destination fields the source actually carries, so
//! server-omitted fields keep their planned or prior values.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tfplug::schema::Schema;
use tfplug::{AttributePath, Diagnostic, Dynamic, DynamicValue};

const CONVERSION_ERROR: &str = "Value Conversion Error";

/// Decodes host state or plan into a typed model
pub fn from_state<T: DeserializeOwned>(state: &DynamicValue) -> Result<T, Vec<Diagnostic>> {
    serde_json::from_value(state.to_json()).map_err(|e| {
        vec![Diagnostic::error(
            CONVERSION_ERROR,
            format!(
                "failed to read {} from state: {}",
                short_type_name::<T>(),
                e
            ),
        )]
    })
}

/// Merges the non-null fields of `source` into host state
pub fn to_state<T: Serialize>(source: &T, state: &mut DynamicValue) -> Vec<Diagnostic> {
    let fields = match source_fields(source) {
        Ok(fields) => fields,
        Err(diags) => return diags,
    };

    let mut diags = Vec::new();
    for (name, value) in fields {
        if let Err(e) = state.set(&AttributePath::new(&name), Dynamic::from_json(value)) {
            diags.push(
                Diagnostic::error(
                    CONVERSION_ERROR,
                    format!("failed to write '{}' to state: {}", name, e),
                )
                .with_attribute(AttributePath::new(&name)),
            );
        }
    }
    diags
}

/// Converts a resource model into an API request shape
pub fn tf_to_sdk<S: Serialize, D: DeserializeOwned>(source: &S) -> Result<D, Vec<Diagnostic>> {
    let value = serde_json::to_value(source).map_err(encode_error::<S>)?;
    serde_json::from_value(value).map_err(|e| {
        vec![Diagnostic::error(
            CONVERSION_ERROR,
            format!(
                "failed to convert {} to {}: {}",
                short_type_name::<S>(),
                short_type_name::<D>(),
                e
            ),
        )]
    })
}

/// Merges an API response into a resource model
pub fn sdk_to_tf<S: Serialize, D: Serialize + DeserializeOwned>(
    source: &S,
    destination: &mut D,
) -> Vec<Diagnostic> {
    let fields = match source_fields(source) {
        Ok(fields) => fields,
        Err(diags) => return diags,
    };

    let mut merged = match serde_json::to_value(&*destination) {
        Ok(Value::Object(map)) => map,
        Ok(_) => Map::new(),
        Err(e) => return encode_error::<D>(e),
    };
    merged.extend(fields);

    match serde_json::from_value(Value::Object(merged)) {
        Ok(updated) => {
            *destination = updated;
            Vec::new()
        }
        Err(e) => vec![Diagnostic::error(
            CONVERSION_ERROR,
            format!(
                "failed to convert {} to {}: {}",
                short_type_name::<S>(),
                short_type_name::<D>(),
                e
            ),
        )],
    }
}

/// Removes computed-only attributes so they are never sent to the API
pub fn strip_read_only(schema: &Schema, state: &mut DynamicValue) {
    for attribute in schema.read_only_attributes() {
        state.remove(&AttributePath::new(&attribute.name));
    }
}

/// Sets every schema attribute absent from state to null
pub fn fill_missing_attributes(schema: &Schema, state: &mut DynamicValue) {
    for attribute in &schema.attributes {
        let path = AttributePath::new(&attribute.name);
        if state.get(&path).is_err() {
            // Non-object state has no attributes to fill
            let _ = state.set(&path, Dynamic::Null);
        }
    }
}

/// Error diagnostics for required attributes that are null or unknown
pub fn missing_required(schema: &Schema, state: &DynamicValue) -> Vec<Diagnostic> {
    schema
        .required_attributes()
        .filter(|attribute| {
            state
                .get(&AttributePath::new(&attribute.name))
                .map_or(true, Dynamic::is_absent)
        })
        .map(|attribute| {
            Diagnostic::error(
                "Missing required attribute",
                format!("The attribute '{}' is required", attribute.name),
            )
            .with_attribute(AttributePath::new(&attribute.name))
        })
        .collect()
}

/// Replaces values still unknown after apply with null
pub fn resolve_unknowns(state: &mut DynamicValue) {
    fn resolve(value: &mut Dynamic) {
        match value {
            Dynamic::Unknown => *value = Dynamic::Null,
            Dynamic::List(items) => items.iter_mut().for_each(resolve),
            Dynamic::Map(map) => map.values_mut().for_each(resolve),
            _ => {}
        }
    }
    resolve(&mut state.value);
}

fn source_fields<T: Serialize>(source: &T) -> Result<Map<String, Value>, Vec<Diagnostic>> {
    match serde_json::to_value(source) {
        Ok(Value::Object(map)) => Ok(map.into_iter().filter(|(_, v)| !v.is_null()).collect()),
        Ok(other) => Err(vec![Diagnostic::error(
            CONVERSION_ERROR,
            format!(
                "{} must serialize to an object, got {}",
                short_type_name::<T>(),
                Dynamic::from_json(other).type_name()
            ),
        )]),
        Err(e) => Err(encode_error::<T>(e)),
    }
}

fn encode_error<T>(e: serde_json::Error) -> Vec<Diagnostic> {
    vec![Diagnostic::error(
        CONVERSION_ERROR,
        format!("failed to encode {}: {}", short_type_name::<T>(), e),
    )]
}

fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}
