use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::request::OperationRequest;

/// Result-cache key derived from (backend, operation type, parameters).
///
/// Parameters are serialized as canonical JSON (object keys sorted at every
/// depth), so semantically identical requests collide and distinct requests
/// never do. Backend and type identifiers contain no `:`, which keeps the
/// prefix unambiguous.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn derive(request: &OperationRequest) -> Self {
        let mut body = String::new();
        body.push('{');
        for (i, (key, value)) in request.parameters.iter().enumerate() {
            if i > 0 {
                body.push(',');
            }
            write_json_string(&mut body, key);
            body.push(':');
            write_canonical(&mut body, value);
        }
        body.push('}');

        Self(format!(
            "{}:{}:{}",
            request.backend.as_ref(),
            request.operation_type.as_ref(),
            body
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn write_canonical(out: &mut String, value: &Value) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, inner)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_json_string(out, key);
                out.push(':');
                write_canonical(out, inner);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, inner) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(out, inner);
            }
            out.push(']');
        }
        // Scalars have a single serde_json rendering.
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn write_json_string(out: &mut String, s: &str) {
    out.push_str(&Value::String(s.to_string()).to_string());
}
