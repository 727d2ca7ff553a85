/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
/// This mirrors the convention used by POSIX shells and many command-line tools.
pub type ExitCode = i32;

/// Operator connecting a chain segment to the segment before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainOp {
    /// `&&`: run this segment only when the previous one succeeded.
    And,
    /// `||`: run this segment only when the previous one failed.
    Or,
}

impl ChainOp {
    /// The token text this operator was parsed from.
    pub fn as_str(self) -> &'static str {
        match self {
            ChainOp::And => "&&",
            ChainOp::Or => "||",
        }
    }
}

/// One stretch of an input line between `&&`/`||` operators.
///
/// The first segment of a line carries no operator. The token sequence is
/// never empty and may still contain `|` and redirection tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainSegment {
    pub op: Option<ChainOp>,
    pub tokens: Vec<String>,
}

/// A single command of a pipeline with its redirections resolved.
///
/// `argv` is never empty after successful parsing; a redirection-only
/// segment is rejected by the parser. `stdout_append` only matters when
/// `stdout_file` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub argv: Vec<String>,
    pub stdin_file: Option<String>,
    pub stdout_file: Option<String>,
    pub stdout_append: bool,
}

impl Command {
    /// The program name this command will resolve and execute.
    pub fn program(&self) -> &str {
        &self.argv[0]
    }
}
