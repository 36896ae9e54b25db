use std::fmt;

/// Category of an engine failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Syntax,
    FileNotExist,
    FileAlreadyExist,
    FieldNotExist,
    FieldLength,
    FunctionNotExist,
    FunctionArgument,
    Placeholder,
    InvalidValue,
    Repository,
    Lock,
    Io,
    Commit,
    Rollback,
    Cancelled,
    DeadlineExceeded,
}

impl ErrorCode {
    /// Stable numeric identifier, grouped by category.
    #[must_use]
    pub fn number(self) -> u32 {
        match self {
            ErrorCode::Syntax => 2001,
            ErrorCode::FileNotExist => 10_001,
            ErrorCode::FileAlreadyExist => 10_002,
            ErrorCode::FieldNotExist => 10_101,
            ErrorCode::FieldLength => 10_102,
            ErrorCode::FunctionNotExist => 10_201,
            ErrorCode::FunctionArgument => 10_202,
            ErrorCode::Placeholder => 10_301,
            ErrorCode::InvalidValue => 10_302,
            ErrorCode::Repository => 30_001,
            ErrorCode::Lock => 30_002,
            ErrorCode::Io => 30_003,
            ErrorCode::Commit => 30_101,
            ErrorCode::Rollback => 30_102,
            ErrorCode::Cancelled => 40_001,
            ErrorCode::DeadlineExceeded => 40_002,
        }
    }
}

/// Error raised by the engine, positioned in the query text when a position is known.
///
/// Displays as `[L:<line> C:<char>] <message>`, or just the message when unpositioned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineError {
    code: ErrorCode,
    line: usize,
    char: usize,
    message: String,
}

impl EngineError {
    #[must_use]
    pub fn new(code: ErrorCode, line: usize, char: usize, message: impl Into<String>) -> Self {
        Self {
            code,
            line,
            char,
            message: message.into(),
        }
    }

    /// Error without a position in the query text.
    #[must_use]
    pub fn unpositioned(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(code, 0, 0, message)
    }

    #[must_use]
    pub fn syntax(line: usize, char: usize, message: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::Syntax,
            line,
            char,
            format!("syntax error: {}", message.into()),
        )
    }

    #[must_use]
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    #[must_use]
    pub fn number(&self) -> u32 {
        self.code.number()
    }

    #[must_use]
    pub fn line(&self) -> usize {
        self.line
    }

    #[must_use]
    pub fn char(&self) -> usize {
        self.char
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.line > 0 {
            write!(f, "[L:{} C:{}] {}", self.line, self.char, self.message)
        } else {
            f.write_str(&self.message)
        }
    }
}

impl std::error::Error for EngineError {}
