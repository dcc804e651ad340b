//! Composable error flags and the engine-wide fault type.
//!
//! A single operation can fail for more than one reason at once (an
//! aborted execution is both `OUT_OF_RANGE` and `NOT_COMPLETED`), so
//! errors are a small bit set rather than an enum.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Bit set of failure kinds.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct ErrorFlags(u16);

impl ErrorFlags {
    pub const NONE: ErrorFlags = ErrorFlags(0);
    /// Malformed RPN line: missing/extra parameters, duplicate output
    /// declaration, reserved command in input text.
    pub const ILLEGAL_OPERATION: ErrorFlags = ErrorFlags(1 << 0);
    /// Non-numeric type where numeric required, zero-size type, no
    /// matching operator signature, unresolvable variable name.
    pub const UNSUPPORTED_FEATURE: ErrorFlags = ErrorFlags(1 << 1);
    /// Literal-parsing failure or failed low-level memory access.
    pub const FATAL_ERROR: ErrorFlags = ErrorFlags(1 << 2);
    /// Unbalanced type stack at end of compile, or evaluation-stack
    /// cursor not back at base after execution. Indicates a compiler
    /// defect, never a user-input defect.
    pub const INTERNAL_SETUP_ERROR: ErrorFlags = ErrorFlags(1 << 3);
    /// Evaluation-stack bounds violation at runtime, or a value outside
    /// the domain of a checked conversion or arithmetic operation.
    pub const OUT_OF_RANGE: ErrorFlags = ErrorFlags(1 << 4);
    /// Execution aborted before reaching the end of the bytecode.
    pub const NOT_COMPLETED: ErrorFlags = ErrorFlags(1 << 5);

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: ErrorFlags) -> bool {
        (self.0 & other.0) == other.0
    }

    pub fn insert(&mut self, other: ErrorFlags) {
        self.0 |= other.0;
    }
}

impl BitOr for ErrorFlags {
    type Output = ErrorFlags;

    fn bitor(self, rhs: ErrorFlags) -> ErrorFlags {
        ErrorFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for ErrorFlags {
    fn bitor_assign(&mut self, rhs: ErrorFlags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for ErrorFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(ErrorFlags, &str); 6] = [
            (ErrorFlags::ILLEGAL_OPERATION, "IllegalOperation"),
            (ErrorFlags::UNSUPPORTED_FEATURE, "UnsupportedFeature"),
            (ErrorFlags::FATAL_ERROR, "FatalError"),
            (ErrorFlags::INTERNAL_SETUP_ERROR, "InternalSetupError"),
            (ErrorFlags::OUT_OF_RANGE, "OutOfRange"),
            (ErrorFlags::NOT_COMPLETED, "NotCompleted"),
        ];
        if self.is_empty() {
            return write!(f, "NoError");
        }
        let mut first = true;
        for (flag, name) in NAMES {
            if self.contains(flag) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{}", name)?;
                first = false;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ErrorFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ErrorFlags({})", self)
    }
}

/// An error with one or more failure kinds and a human-readable context.
#[derive(Clone, Debug)]
pub struct Fault {
    flags: ErrorFlags,
    context: String,
}

impl Fault {
    pub fn new(flags: ErrorFlags, context: impl Into<String>) -> Self {
        Self {
            flags,
            context: context.into(),
        }
    }

    pub fn illegal(context: impl Into<String>) -> Self {
        Self::new(ErrorFlags::ILLEGAL_OPERATION, context)
    }

    pub fn unsupported(context: impl Into<String>) -> Self {
        Self::new(ErrorFlags::UNSUPPORTED_FEATURE, context)
    }

    pub fn fatal(context: impl Into<String>) -> Self {
        Self::new(ErrorFlags::FATAL_ERROR, context)
    }

    pub fn internal(context: impl Into<String>) -> Self {
        Self::new(ErrorFlags::INTERNAL_SETUP_ERROR, context)
    }

    pub fn flags(&self) -> ErrorFlags {
        self.flags
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    /// Add further failure kinds to an existing fault.
    pub fn with_flags(mut self, extra: ErrorFlags) -> Self {
        self.flags |= extra;
        self
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.flags, self.context)
    }
}

impl std::error::Error for Fault {}

pub type Result<T> = std::result::Result<T, Fault>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_compose() {
        let flags = ErrorFlags::OUT_OF_RANGE | ErrorFlags::NOT_COMPLETED;
        assert!(flags.contains(ErrorFlags::OUT_OF_RANGE));
        assert!(flags.contains(ErrorFlags::NOT_COMPLETED));
        assert!(!flags.contains(ErrorFlags::FATAL_ERROR));
        assert_eq!(flags.to_string(), "OutOfRange|NotCompleted");
    }

    #[test]
    fn empty_flags() {
        assert!(ErrorFlags::NONE.is_empty());
        assert_eq!(ErrorFlags::NONE.to_string(), "NoError");
    }

    #[test]
    fn fault_display() {
        let fault = Fault::illegal("WRITE without variable name");
        assert_eq!(
            fault.to_string(),
            "IllegalOperation: WRITE without variable name"
        );
    }

    #[test]
    fn fault_with_flags() {
        let fault = Fault::new(ErrorFlags::OUT_OF_RANGE, "stack overflow")
            .with_flags(ErrorFlags::NOT_COMPLETED);
        assert!(fault.flags().contains(ErrorFlags::OUT_OF_RANGE));
        assert!(fault.flags().contains(ErrorFlags::NOT_COMPLETED));
    }
}
