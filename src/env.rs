use std::collections::HashMap;
use std::env as stdenv;
use std::path::PathBuf;

use crate::command::ExitCode;

/// Mutable session state threaded through every stage of the interpreter.
///
/// The environment contains:
/// - `vars`: the variables visible to executed commands, seeded from the
///   process environment at startup.
/// - `current_dir`: the working directory for command execution.
/// - `aliases`: alias name to raw replacement text; not persisted.
/// - `last_exit`: exit status of the most recent pipeline or builtin.
/// - `should_exit`: set by the `exit` builtin; the read loop checks it
///   after every line.
///
/// Stages that need variable or alias state receive a reference to this
/// struct instead of reaching into process-wide globals.
#[derive(Debug, Clone)]
pub struct Environment {
    pub vars: HashMap<String, String>,
    pub current_dir: PathBuf,
    pub aliases: HashMap<String, String>,
    pub last_exit: ExitCode,
    pub should_exit: bool,
}

impl Environment {
    /// Capture the current process state into a new `Environment`.
    pub fn new() -> Self {
        let vars = stdenv::vars().collect();
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            vars,
            current_dir,
            aliases: HashMap::new(),
            last_exit: 0,
            should_exit: false,
        }
    }

    /// Get the value of a variable.
    ///
    /// There is no fallback to `std::env`: the map is the single source of
    /// truth, so `unset` stays observable to later lookups.
    pub fn get_var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }

    /// Set or override a variable.
    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }

    /// Remove a variable. Removing an absent key is not an error.
    pub fn unset_var(&mut self, key: &str) {
        self.vars.remove(key);
    }

    /// Home directory of the invoking user, taken from `$HOME`.
    pub fn home_dir(&self) -> Option<PathBuf> {
        self.get_var("HOME").map(PathBuf::from)
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}
