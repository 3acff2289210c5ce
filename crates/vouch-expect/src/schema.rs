use crate::Expectation;
use jsonschema::JSONSchema;
use serde_json::{json, Value};
use std::borrow::Cow;
use vouch_core::errors::{EvalError, Result};

/// Something that can be validated as a JSON document. Text is parsed first;
/// text that is not JSON fails the schema rather than erroring.
pub trait JsonInstance {
    fn to_instance(&self) -> std::result::Result<Cow<'_, Value>, String>;
}

impl JsonInstance for Value {
    fn to_instance(&self) -> std::result::Result<Cow<'_, Value>, String> {
        Ok(Cow::Borrowed(self))
    }
}

impl JsonInstance for str {
    fn to_instance(&self) -> std::result::Result<Cow<'_, Value>, String> {
        serde_json::from_str(self)
            .map(Cow::Owned)
            .map_err(|e| format!("value is not valid JSON: {}", e))
    }
}

impl JsonInstance for String {
    fn to_instance(&self) -> std::result::Result<Cow<'_, Value>, String> {
        self.as_str().to_instance()
    }
}

impl<J: JsonInstance + ?Sized> JsonInstance for &J {
    fn to_instance(&self) -> std::result::Result<Cow<'_, Value>, String> {
        (**self).to_instance()
    }
}

impl<'a, T: JsonInstance> Expectation<'a, T> {
    /// Validates against a JSON Schema document. A schema that does not
    /// compile is a configuration error.
    pub fn to_match_schema(&self, schema: &Value) -> Result<()> {
        let compiled = JSONSchema::options()
            .compile(schema)
            .map_err(|e| EvalError::config(format!("schema compile failed: {}", e)))?;

        let errors: Vec<String> = match self.actual.to_instance() {
            Ok(instance) => match compiled.validate(&instance) {
                Ok(()) => vec![],
                Err(errs) => errs
                    .map(|e| {
                        let path = e.instance_path.to_string();
                        if path.is_empty() {
                            e.to_string()
                        } else {
                            format!("{}: {}", path, e)
                        }
                    })
                    .collect(),
            },
            Err(parse) => vec![parse],
        };

        let passed = errors.is_empty();
        self.verdict(
            "to_match_schema",
            passed,
            || EvalError::SchemaMismatch { errors },
            || {
                (
                    "expected value not to match the schema".to_string(),
                    json!({ "schema": schema }),
                )
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use crate::expect;
    use serde_json::json;

    fn person() -> serde_json::Value {
        json!({
            "type": "object",
            "required": ["name", "age"],
            "properties": {
                "name": { "type": "string" },
                "age": { "type": "integer" },
                "role": { "enum": ["admin", "user"] },
                "tags": { "type": "array", "items": { "type": "string" } }
            }
        })
    }

    #[test]
    fn validates_values_and_text() {
        let schema = person();
        assert!(expect(json!({"name": "Ada", "age": 36})).to_match_schema(&schema).is_ok());
        assert!(expect(r#"{"name": "Ada", "age": 36, "tags": ["x"]}"#)
            .to_match_schema(&schema)
            .is_ok());
    }

    #[test]
    fn nested_errors_are_reported_with_paths() {
        let err = expect(json!({"name": "Ada", "age": "old", "tags": [1], "role": "root"}))
            .to_match_schema(&person())
            .unwrap_err();
        assert_eq!(err.kind(), "SchemaMismatch");
        let d = err.details();
        let errors: Vec<&str> = d["errors"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|e| e.as_str())
            .collect();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.starts_with("/age")));
        assert!(errors.iter().any(|e| e.starts_with("/tags/0")));
    }

    #[test]
    fn non_json_text_fails_and_negates() {
        let schema = person();
        let err = expect("not json").to_match_schema(&schema).unwrap_err();
        assert_eq!(err.kind(), "SchemaMismatch");
        assert!(expect("not json").not().to_match_schema(&schema).is_ok());
        let err = expect(json!({"name": "x", "age": 1}))
            .not()
            .to_match_schema(&schema)
            .unwrap_err();
        assert_eq!(err.kind(), "AssertionError");
    }

    #[test]
    fn broken_schema_is_config_error() {
        let err = expect(json!(1))
            .to_match_schema(&json!({"type": 12}))
            .unwrap_err();
        assert_eq!(err.kind(), "ConfigError");
    }
}
