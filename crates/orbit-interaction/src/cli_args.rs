//! Argument lists for the command-line backend.
//!
//! | operation type    | arguments                                                   | stdin          |
//! |-------------------|-------------------------------------------------------------|----------------|
//! | `chat`            | `chat`                                                      | `message`      |
//! | `edit-file`       | `edit <path>`                                               | `instructions` |
//! | `create-file`     | `create <path>`                                             | `content`      |
//! | `analyze-project` | `analyze [path] [--depth N] [--include-tests] [--include-docs]` | -          |
//! | `run-tests`       | `test [path] [--watch] [--coverage]`                        | -              |
//! | `execute-shell`   | `exec -- <command>`                                         | -              |

use orbit_core::backend::OperationType;
use orbit_core::error::{OrbitError, Result};
use orbit_core::operation::OperationRequest;

/// Program arguments plus the optional stdin payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliInvocation {
    pub args: Vec<String>,
    pub stdin: Option<String>,
}

impl CliInvocation {
    fn new<const N: usize>(args: [&str; N]) -> Self {
        Self {
            args: args.iter().map(|a| a.to_string()).collect(),
            stdin: None,
        }
    }

    fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    fn arg_if(self, cond: bool, arg: &str) -> Self {
        if cond { self.arg(arg) } else { self }
    }

    fn stdin(mut self, input: Option<&str>) -> Self {
        self.stdin = input.map(str::to_string);
        self
    }

    /// Total characters sent to the program, used for usage estimates.
    pub fn input_chars(&self) -> usize {
        self.stdin.as_deref().map(|s| s.chars().count()).unwrap_or(0)
            + self.args.iter().map(|a| a.chars().count()).sum::<usize>()
    }
}

/// Builds the invocation for one command-line operation.
///
/// # Errors
///
/// `InvalidParameter` when a required parameter is missing, and
/// `UnsupportedOperation` for types outside the command-line registry.
pub fn build_invocation(request: &OperationRequest) -> Result<CliInvocation> {
    let invocation = match request.operation_type {
        OperationType::Chat => {
            CliInvocation::new(["chat"]).stdin(Some(request.required_str("message")?))
        }
        OperationType::EditFile => CliInvocation::new(["edit"])
            .arg(request.required_str("path")?)
            .stdin(Some(request.required_str("instructions")?)),
        OperationType::CreateFile => CliInvocation::new(["create"])
            .arg(request.required_str("path")?)
            .stdin(request.optional_str("content")),
        OperationType::AnalyzeProject => {
            let mut inv = CliInvocation::new(["analyze"]);
            if let Some(path) = request.optional_str("path") {
                inv = inv.arg(path);
            }
            if let Some(depth) = request.optional_u64("depth") {
                inv = inv.arg("--depth").arg(depth.to_string());
            }
            inv.arg_if(request.flag("include_tests"), "--include-tests")
                .arg_if(request.flag("include_docs"), "--include-docs")
        }
        OperationType::RunTests => {
            let mut inv = CliInvocation::new(["test"]);
            if let Some(path) = request.optional_str("path") {
                inv = inv.arg(path);
            }
            inv.arg_if(request.flag("watch"), "--watch")
                .arg_if(request.flag("coverage"), "--coverage")
        }
        OperationType::ExecuteShell => {
            CliInvocation::new(["exec", "--"]).arg(request.required_str("command")?)
        }
        other => {
            return Err(OrbitError::UnsupportedOperation {
                backend: request.backend.to_string(),
                operation: other.to_string(),
            });
        }
    };
    Ok(invocation)
}

/// Rough usage estimate: four characters per token.
pub fn estimate_usage(input_chars: usize, output_chars: usize, cost_per_1k: f64) -> (u64, f64) {
    let tokens = ((input_chars + output_chars) / 4) as u64;
    let cost = tokens as f64 / 1000.0 * cost_per_1k;
    (tokens, cost)
}

#[cfg(test)]
mod tests {
    use super::*;
    use orbit_core::backend::BackendId;

    fn cli(op: OperationType) -> OperationRequest {
        OperationRequest::new(BackendId::Cli, op)
    }

    #[test]
    fn test_chat_pipes_message() {
        let inv = build_invocation(&cli(OperationType::Chat).with_param("message", "hi")).unwrap();
        assert_eq!(inv.args, vec!["chat"]);
        assert_eq!(inv.stdin.as_deref(), Some("hi"));
    }

    #[test]
    fn test_edit_requires_path_and_instructions() {
        let err = build_invocation(&cli(OperationType::EditFile).with_param("path", "a.rs"))
            .unwrap_err();
        assert!(matches!(err, OrbitError::InvalidParameter { ref name, .. } if name == "instructions"));

        let inv = build_invocation(
            &cli(OperationType::EditFile)
                .with_param("path", "src/a.rs")
                .with_param("instructions", "rename foo"),
        )
        .unwrap();
        assert_eq!(inv.args, vec!["edit", "src/a.rs"]);
    }

    #[test]
    fn test_create_content_is_optional() {
        let inv =
            build_invocation(&cli(OperationType::CreateFile).with_param("path", "new.rs")).unwrap();
        assert_eq!(inv.args, vec!["create", "new.rs"]);
        assert!(inv.stdin.is_none());
    }

    #[test]
    fn test_analyze_flags_in_order() {
        let inv = build_invocation(
            &cli(OperationType::AnalyzeProject)
                .with_param("path", "crates")
                .with_param("depth", 3)
                .with_param("include_tests", true)
                .with_param("include_docs", false),
        )
        .unwrap();
        assert_eq!(
            inv.args,
            vec!["analyze", "crates", "--depth", "3", "--include-tests"]
        );

        let bare = build_invocation(&cli(OperationType::AnalyzeProject)).unwrap();
        assert_eq!(bare.args, vec!["analyze"]);
    }

    #[test]
    fn test_run_tests_flags() {
        let inv = build_invocation(
            &cli(OperationType::RunTests)
                .with_param("watch", true)
                .with_param("coverage", true),
        )
        .unwrap();
        assert_eq!(inv.args, vec!["test", "--watch", "--coverage"]);
    }

    #[test]
    fn test_exec_passes_command_after_separator() {
        let inv = build_invocation(
            &cli(OperationType::ExecuteShell).with_param("command", "ls -la --color"),
        )
        .unwrap();
        assert_eq!(inv.args, vec!["exec", "--", "ls -la --color"]);
    }

    #[test]
    fn test_foreign_type_is_unsupported() {
        let err = build_invocation(&cli(OperationType::Screenshot)).unwrap_err();
        assert!(matches!(err, OrbitError::UnsupportedOperation { .. }));
    }

    #[test]
    fn test_usage_estimate() {
        let (tokens, cost) = estimate_usage(2_000, 2_000, 0.015);
        assert_eq!(tokens, 1_000);
        assert!((cost - 0.015).abs() < f64::EPSILON);
        assert_eq!(estimate_usage(3, 0, 0.015).0, 0);
    }
}
