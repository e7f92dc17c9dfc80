use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Caller-facing result of one backend call.
///
/// CLI-style operations fill `output`; richer backends (screenshots,
/// diagnostic lists) put their structured payload in `data`. `success` and
/// timing are always present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationOutput {
    pub success: bool,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    /// Produced by simulation mode. Never authoritative.
    #[serde(default)]
    pub simulated: bool,
}

impl OperationOutput {
    pub fn success(output: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
            data: None,
            exit_code: None,
            duration_ms,
            tokens: None,
            cost: None,
            simulated: false,
        }
    }

    pub fn failure(error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error.into()),
            data: None,
            exit_code: None,
            duration_ms,
            tokens: None,
            cost: None,
            simulated: false,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }

    pub fn with_usage(mut self, tokens: u64, cost: f64) -> Self {
        self.tokens = Some(tokens);
        self.cost = Some(cost);
        self
    }

    /// Error text for a failed output, falling back to a generic message.
    pub fn error_message(&self) -> String {
        self.error
            .clone()
            .filter(|e| !e.trim().is_empty())
            .unwrap_or_else(|| match self.exit_code {
                Some(code) => format!("process exited with code {code}"),
                None => "backend reported failure".to_string(),
            })
    }
}
