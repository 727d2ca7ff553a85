//! Shapes a flat token stream into executable structures: conditional
//! chain segments, pipeline segments and redirection-resolved commands.

use thiserror::Error;

use crate::command::{ChainOp, ChainSegment, Command};

/// Errors raised while splitting tokens into commands.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// An operator appeared where a command or filename was required.
    #[error("syntax error near unexpected token `{0}'")]
    UnexpectedToken(String),
    /// A segment contained redirections but no command words.
    #[error("syntax error: missing command")]
    MissingCommand,
}

/// Split tokens on `&&` / `||` into segments paired with the operator
/// connecting each one to its predecessor.
///
/// The first segment carries no operator. A chain operator that appears
/// first, last, or directly after another chain operator is a syntax
/// error. Pipe tokens are left inside segments for [`split_pipeline`].
pub fn split_chain(tokens: &[String]) -> Result<Vec<ChainSegment>, ParseError> {
    let mut segments = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut pending: Option<ChainOp> = None;

    for token in tokens {
        let op = match token.as_str() {
            "&&" => Some(ChainOp::And),
            "||" => Some(ChainOp::Or),
            _ => None,
        };
        match op {
            Some(op) => {
                if current.is_empty() {
                    return Err(ParseError::UnexpectedToken(token.clone()));
                }
                segments.push(ChainSegment {
                    op: pending,
                    tokens: std::mem::take(&mut current),
                });
                pending = Some(op);
            }
            None => current.push(token.clone()),
        }
    }

    if current.is_empty() {
        let near = pending.map_or("newline", ChainOp::as_str);
        return Err(ParseError::UnexpectedToken(near.to_string()));
    }
    segments.push(ChainSegment {
        op: pending,
        tokens: current,
    });

    Ok(segments)
}

/// Split one chain segment on `|` into per-command token groups.
///
/// A pipe that appears first, last, or directly after another pipe is a
/// syntax error; every returned group is non-empty.
pub fn split_pipeline(tokens: &[String]) -> Result<Vec<Vec<String>>, ParseError> {
    let mut segments = Vec::new();
    let mut current: Vec<String> = Vec::new();

    for token in tokens {
        if token == "|" {
            if current.is_empty() {
                return Err(ParseError::UnexpectedToken("|".to_string()));
            }
            segments.push(std::mem::take(&mut current));
        } else {
            current.push(token.clone());
        }
    }

    if current.is_empty() {
        return Err(ParseError::UnexpectedToken("|".to_string()));
    }
    segments.push(current);

    Ok(segments)
}

/// Strip redirection operators and their filenames out of a command
/// segment, leaving `argv` in original relative order.
///
/// Redirections may appear anywhere in the segment. When stdout is
/// redirected more than once the last occurrence wins, for the target and
/// the append mode together; stdin behaves the same way. A redirection
/// operator with no following filename, or a segment with no command words
/// left, is a syntax error.
pub fn parse_redirections(segment: &[String]) -> Result<Command, ParseError> {
    let mut argv = Vec::new();
    let mut stdin_file = None;
    let mut stdout_file = None;
    let mut stdout_append = false;

    let mut i = 0;
    while i < segment.len() {
        match segment[i].as_str() {
            "<" => {
                let target = segment
                    .get(i + 1)
                    .ok_or_else(|| ParseError::UnexpectedToken("newline".to_string()))?;
                stdin_file = Some(target.clone());
                i += 2;
            }
            op @ (">" | ">>") => {
                let target = segment
                    .get(i + 1)
                    .ok_or_else(|| ParseError::UnexpectedToken("newline".to_string()))?;
                stdout_file = Some(target.clone());
                stdout_append = op == ">>";
                i += 2;
            }
            _ => {
                argv.push(segment[i].clone());
                i += 1;
            }
        }
    }

    if argv.is_empty() {
        return Err(ParseError::MissingCommand);
    }

    Ok(Command {
        argv,
        stdin_file,
        stdout_file,
        stdout_append,
    })
}
