//! Variable, tilde and glob expansion.
//!
//! Variable expansion runs on the raw line before tokenization so it can
//! track quote context character by character; tilde and glob expansion
//! run on individual word tokens afterwards.

use std::sync::OnceLock;

use glob::MatchOptions;
use regex::Regex;

use crate::env::Environment;
use crate::lexer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quote {
    None,
    Single,
    Double,
}

/// Expand `$VAR` and `${VAR}` references in the raw input line.
///
/// References inside single quotes are left alone; double-quoted and
/// unquoted references are expanded. A backslash copies itself and the
/// next character verbatim, suppressing both expansion and quote-state
/// changes for that pair. Unset variables expand to the empty string.
/// Quote characters are preserved for the tokenizer to strip.
pub fn expand_variables(line: &str, env: &Environment) -> String {
    let chars: Vec<char> = line.chars().collect();
    let mut result = String::with_capacity(line.len());
    let mut quote = Quote::None;
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];

        if ch == '\\' && i + 1 < chars.len() {
            result.push(ch);
            result.push(chars[i + 1]);
            i += 2;
            continue;
        }

        if ch == '\'' && quote != Quote::Double {
            quote = if quote == Quote::Single { Quote::None } else { Quote::Single };
            result.push(ch);
            i += 1;
            continue;
        }

        if ch == '"' && quote != Quote::Single {
            quote = if quote == Quote::Double { Quote::None } else { Quote::Double };
            result.push(ch);
            i += 1;
            continue;
        }

        if ch == '$' && quote != Quote::Single {
            let (expanded, consumed) = expand_one_var(&chars, i, env);
            result.push_str(&expanded);
            i += consumed;
            continue;
        }

        result.push(ch);
        i += 1;
    }

    result
}

/// Expand a single variable reference starting at `chars[pos] == '$'`.
///
/// Returns the expanded text and the number of characters consumed.
fn expand_one_var(chars: &[char], pos: usize, env: &Environment) -> (String, usize) {
    if pos + 1 >= chars.len() {
        return ("$".to_string(), 1);
    }

    if chars[pos + 1] == '{' {
        return match chars[pos + 2..].iter().position(|&c| c == '}') {
            Some(off) => {
                let name: String = chars[pos + 2..pos + 2 + off].iter().collect();
                (env.get_var(&name).unwrap_or_default(), off + 3)
            }
            // No closing brace: emit `${` literally and rescan what follows.
            None => ("${".to_string(), 2),
        };
    }

    let rest: String = chars[pos + 1..].iter().collect();
    match var_name_pattern().find(&rest) {
        Some(m) => {
            let value = env.get_var(m.as_str()).unwrap_or_default();
            (value, 1 + m.as_str().chars().count())
        }
        None => ("$".to_string(), 1),
    }
}

fn var_name_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("^[a-zA-Z_][a-zA-Z0-9_]*").expect("static pattern"))
}

/// Replace a leading `~` in each token with the user's home directory.
///
/// Applied independently per token and only at the token's start, so
/// `foo~bar` is unaffected. The home directory comes from the session
/// environment's `HOME`.
pub fn expand_tilde(tokens: Vec<String>, env: &Environment) -> Vec<String> {
    tokens
        .into_iter()
        .map(|t| {
            if t.starts_with('~') {
                shellexpand::tilde_with_context(&t, || env.get_var("HOME")).into_owned()
            } else {
                t
            }
        })
        .collect()
}

/// Expand `*` and `?` patterns against the filesystem.
///
/// Matches replace the pattern token in lexicographic order; a pattern
/// matching nothing is kept verbatim. Operator tokens are never treated as
/// patterns.
pub fn expand_globs(tokens: Vec<String>) -> Vec<String> {
    let mut expanded = Vec::with_capacity(tokens.len());
    for token in tokens {
        if lexer::is_operator(&token) || !(token.contains('*') || token.contains('?')) {
            expanded.push(token);
            continue;
        }
        let matches = glob_matches(&token);
        if matches.is_empty() {
            expanded.push(token);
        } else {
            expanded.extend(matches);
        }
    }
    expanded
}

fn glob_matches(pattern: &str) -> Vec<String> {
    let options = MatchOptions {
        // `*` must not pick up dotfiles, matching shell convention.
        require_literal_leading_dot: true,
        ..MatchOptions::default()
    };
    let Ok(paths) = glob::glob_with(pattern, options) else {
        return Vec::new();
    };
    let mut matches: Vec<String> = paths
        .filter_map(|entry| entry.ok())
        .map(|path| path.to_string_lossy().into_owned())
        .collect();
    matches.sort();
    matches
}
