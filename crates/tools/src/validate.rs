//! Tool input validation against a declared JSON Schema.

use serde_json::Value;

/// Validate arguments against a schema. Returns every violation as one
/// human-readable line, suitable for a `VALIDATION_ERROR` diagnostic.
pub fn validate_input(schema: &Value, args: &Value) -> Result<(), Vec<String>> {
    let validator = match jsonschema::validator_for(schema) {
        Ok(v) => v,
        Err(e) => return Err(vec![format!("schema is not a valid JSON Schema: {e}")]),
    };

    let errors: Vec<String> = validator
        .iter_errors(args)
        .map(|e| {
            let path = e.instance_path.to_string();
            if path.is_empty() {
                e.to_string()
            } else {
                format!("{path}: {e}")
            }
        })
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
