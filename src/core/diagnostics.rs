// This module implements the structured diagnostic channel shared by every stage.
// A Diagnostic carries a message code, the source offset it refers to, whether the
// problem is in the user's program or inside the compiler, a severity, and the raw
// format arguments. Nothing here renders text; an external logger decides how the
// message reads. The DiagnosticCollector accumulates reports across a full pass and
// supports snapshot/rollback so a tentative operation (constant folding, speculative
// resolution) can discard whatever it reported when it gives up.

//! Structured diagnostics with snapshot/rollback.

use std::fmt;

/// Identifies what went wrong. The external renderer maps codes to messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageCode {
    UnresolvedSymbol,
    UnresolvedUsing,
    AccessViolation,
    InvalidOperands,
    MalformedLiteral,
    LiteralOverflow,
    DivisionByZero,
    UnreachableCode,
    /// A compiler invariant broke; the argument is the fatal error.
    InternalFailure,
}

impl MessageCode {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageCode::UnresolvedSymbol => "unresolved-symbol",
            MessageCode::UnresolvedUsing => "unresolved-using",
            MessageCode::AccessViolation => "access-violation",
            MessageCode::InvalidOperands => "invalid-operands",
            MessageCode::MalformedLiteral => "malformed-literal",
            MessageCode::LiteralOverflow => "literal-overflow",
            MessageCode::DivisionByZero => "division-by-zero",
            MessageCode::UnreachableCode => "unreachable-code",
            MessageCode::InternalFailure => "internal-failure",
        }
    }
}

/// Whether the problem lies in the compiled program or in the compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Source,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub code: MessageCode,
    pub offset: usize,
    pub kind: MessageKind,
    pub level: Level,
    pub args: Vec<String>,
}

impl Diagnostic {
    pub fn error(code: MessageCode, offset: usize, args: Vec<String>) -> Self {
        Self {
            code,
            offset,
            kind: MessageKind::Source,
            level: Level::Error,
            args,
        }
    }

    pub fn warning(code: MessageCode, offset: usize, args: Vec<String>) -> Self {
        Self {
            code,
            offset,
            kind: MessageKind::Source,
            level: Level::Warning,
            args,
        }
    }

    pub fn internal(code: MessageCode, offset: usize, args: Vec<String>) -> Self {
        Self {
            code,
            offset,
            kind: MessageKind::Internal,
            level: Level::Error,
            args,
        }
    }

    pub fn is_error(&self) -> bool {
        self.level == Level::Error
    }
}

impl fmt::Display for Diagnostic {
    /// Debug rendering only; user-facing text is produced elsewhere.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            Level::Warning => "warning",
            Level::Error => "error",
        };
        write!(f, "{level}[{}]@{}", self.code.as_str(), self.offset)?;
        if !self.args.is_empty() {
            write!(f, " ({})", self.args.join(", "))?;
        }
        Ok(())
    }
}

/// Position in the collector a tentative operation can roll back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot(usize);

/// Accumulates diagnostics for a whole pass.
#[derive(Debug, Default, Clone)]
pub struct DiagnosticCollector {
    entries: Vec<Diagnostic>,
}

impl DiagnosticCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, diagnostic: Diagnostic) {
        log::debug!("diagnostic: {diagnostic}");
        self.entries.push(diagnostic);
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot(self.entries.len())
    }

    /// Drop everything reported after `snapshot`.
    pub fn rollback(&mut self, snapshot: Snapshot) {
        self.entries.truncate(snapshot.0);
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn with_code(&self, code: MessageCode) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(move |d| d.code == code)
    }

    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(Diagnostic::is_error)
    }

    pub fn error_count(&self) -> usize {
        self.entries.iter().filter(|d| d.is_error()).count()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
