use thiserror::Error;

/// Errors raised while lowering a resolved program.
///
/// Source programs that pass resolution never produce these; they signal a
/// broken invariant between the resolver and the compiler.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("compile error: program has no 'main' function")]
    MissingMain,

    /// A variable node reached the compiler without a resolved binding.
    #[error("compile error: no binding recorded for '{name}'")]
    MissingBinding { name: String },

    /// A call node reached the compiler without a resolved target.
    #[error("compile error: no call target recorded for '{name}'")]
    MissingCallTarget { name: String },

    #[error("compile error: function '{function}' has more than {limit} constants")]
    TooManyConstants { function: String, limit: usize },

    #[error("compile error: jump target {target} in '{function}' does not fit a 16-bit operand")]
    JumpTooFar { function: String, target: usize },

    /// Internal compiler error (shouldn't happen in normal use)
    #[error("compile error: internal error: {0}")]
    Internal(String),
}

impl CompileError {
    pub fn internal(msg: impl Into<String>) -> Self {
        CompileError::Internal(msg.into())
    }

    pub fn missing_binding(name: &str) -> Self {
        CompileError::MissingBinding {
            name: name.to_string(),
        }
    }

    pub fn missing_call_target(name: &str) -> Self {
        CompileError::MissingCallTarget {
            name: name.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_main_display() {
        assert_eq!(
            CompileError::MissingMain.to_string(),
            "compile error: program has no 'main' function"
        );
    }

    #[test]
    fn test_constructors() {
        let err = CompileError::missing_binding("x");
        assert!(err.to_string().contains("'x'"));

        let err = CompileError::missing_call_target("f");
        assert!(matches!(err, CompileError::MissingCallTarget { ref name } if name == "f"));

        let err = CompileError::internal("something went wrong");
        assert!(err.to_string().contains("internal error: something went wrong"));
    }

    #[test]
    fn test_error_implements_std_error() {
        let err = CompileError::TooManyConstants {
            function: "main".to_string(),
            limit: 65536,
        };
        let _: &dyn std::error::Error = &err;
    }
}
