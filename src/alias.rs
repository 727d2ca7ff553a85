//! Alias resolution: textual rewrite of a command segment's leading word.

use std::collections::HashMap;
use std::collections::HashSet;

use crate::lexer;

/// Rewrite the first token through the alias table until a fixed point.
///
/// Each alias name substitutes at most once per call, tracked in a
/// seen-set, so `alias ls='ls -a'` expands one level and a cycle of
/// mutually referential aliases stops at a literal command name instead of
/// looping. Replacement text is re-tokenized and spliced in front of the
/// remaining tokens; replacement text that fails to tokenize ends the
/// rewrite with whatever has been accumulated.
pub fn expand_aliases(mut tokens: Vec<String>, aliases: &HashMap<String, String>) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();

    loop {
        let Some(first) = tokens.first() else { break };
        if seen.contains(first) {
            break;
        }
        let Some(replacement) = aliases.get(first) else { break };
        seen.insert(first.clone());

        let Ok(mut replacement_tokens) = lexer::tokenize(replacement) else {
            break;
        };
        replacement_tokens.extend(tokens.drain(1..));
        tokens = replacement_tokens;
    }

    tokens
}
