//! Built-in commands: run in-process so they can mutate the session.
//!
//! Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed
//! directly without spawning a child process. Output goes through the
//! writer the interpreter provides, which may point at a redirection
//! target instead of the terminal.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use argh::{EarlyExit, FromArgs};

use crate::command::ExitCode;
use crate::env::Environment;
use crate::external;
use crate::interpreter;

/// A command implemented inside the interpreter.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "cd" or "alias".
    fn name() -> &'static str;

    /// One-line usage summary shown by `help`.
    fn summary() -> &'static str;

    /// Executes the command against the session state.
    ///
    /// Return value follows shell conventions: 0 for success, non-zero for
    /// error.
    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode>;
}

/// Object-safe handle for one dispatched builtin invocation.
pub(crate) trait Builtin {
    fn execute(
        self: Box<Self>,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode>;
}

impl<T: BuiltinCommand> Builtin for T {
    fn execute(
        self: Box<Self>,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        match BuiltinCommand::execute(*self, stdout, env) {
            Ok(code) => Ok(code),
            Err(err) => {
                eprintln!("{err:#}");
                Ok(1)
            }
        }
    }
}

/// Result of handing argh a malformed argument list: the usage or error
/// text it produced, replayed when the command "runs".
struct InvalidArgs {
    output: String,
    is_error: bool,
}

impl Builtin for InvalidArgs {
    fn execute(
        self: Box<Self>,
        stdout: &mut dyn Write,
        _env: &mut Environment,
    ) -> Result<ExitCode> {
        if self.is_error {
            eprintln!("{}", self.output);
            Ok(1)
        } else {
            writeln!(stdout, "{}", self.output)?;
            Ok(0)
        }
    }
}

/// Registry entry: knows one builtin's name and how to instantiate it.
pub(crate) trait BuiltinFactory {
    fn name(&self) -> &'static str;
    fn summary(&self) -> &'static str;
    fn create(&self, args: &[&str]) -> Box<dyn Builtin>;
}

pub(crate) struct Factory<T> {
    _phantom: std::marker::PhantomData<T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<T: BuiltinCommand + 'static> BuiltinFactory for Factory<T> {
    fn name(&self) -> &'static str {
        T::name()
    }

    fn summary(&self) -> &'static str {
        T::summary()
    }

    fn create(&self, args: &[&str]) -> Box<dyn Builtin> {
        match T::from_args(&[T::name()], args) {
            Ok(cmd) => Box::new(cmd),
            Err(EarlyExit { output, status }) => Box::new(InvalidArgs {
                output,
                is_error: status.is_err(),
            }),
        }
    }
}

/// All builtins known to the shell, in `help` display order.
pub(crate) fn registry() -> Vec<Box<dyn BuiltinFactory>> {
    vec![
        Box::new(Factory::<Cd>::default()),
        Box::new(Factory::<Exit>::default()),
        Box::new(Factory::<Help>::default()),
        Box::new(Factory::<Pwd>::default()),
        Box::new(Factory::<Export>::default()),
        Box::new(Factory::<Unset>::default()),
        Box::new(Factory::<Env>::default()),
        Box::new(Factory::<Alias>::default()),
        Box::new(Factory::<Unalias>::default()),
        Box::new(Factory::<Which>::default()),
        Box::new(Factory::<Type>::default()),
        Box::new(Factory::<Source>::default()),
    ]
}

/// Whether `name` is implemented by the interpreter itself.
pub(crate) fn is_builtin(name: &str) -> bool {
    registry().iter().any(|f| f.name() == name)
}

/// Instantiate the builtin registered under `name`, if any.
pub(crate) fn lookup(name: &str, args: &[&str]) -> Option<Box<dyn Builtin>> {
    registry()
        .into_iter()
        .find(|f| f.name() == name)
        .map(|f| f.create(args))
}

#[derive(FromArgs)]
/// Change the current working directory.
/// If no target is provided, changes to the directory named by HOME.
pub(crate) struct Cd {
    #[argh(positional)]
    /// directory to switch to; absolute or relative to the current directory
    target: Option<String>,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn summary() -> &'static str {
        "cd [dir]          - Change directory (default: $HOME)"
    }

    fn execute(self, _stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        let target = match &self.target {
            Some(t) if !t.is_empty() => PathBuf::from(t),
            _ => env.home_dir().context("cd: HOME not set")?,
        };

        let new_dir = if target.is_absolute() {
            target
        } else {
            env.current_dir.join(target)
        };

        let canonical = fs::canonicalize(&new_dir)
            .with_context(|| format!("cd: no such file or directory: {}", new_dir.display()))?;
        if !canonical.is_dir() {
            anyhow::bail!("cd: not a directory: {}", canonical.display());
        }

        // Keep the process working directory in sync so relative paths in
        // redirections and glob patterns resolve against it.
        std::env::set_current_dir(&canonical)
            .with_context(|| format!("cd: cannot change to {}", canonical.display()))?;
        env.current_dir = canonical;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Leave the shell after the current line finishes.
pub(crate) struct Exit {
    #[argh(positional)]
    /// exit status to report; defaults to 0
    code: Option<i32>,
}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn summary() -> &'static str {
        "exit [code]       - Exit the shell"
    }

    fn execute(self, _stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        env.should_exit = true;
        Ok(self.code.unwrap_or(0))
    }
}

#[derive(FromArgs)]
/// List the commands implemented by the shell itself.
pub(crate) struct Help {}

impl BuiltinCommand for Help {
    fn name() -> &'static str {
        "help"
    }

    fn summary() -> &'static str {
        "help              - Show this help message"
    }

    fn execute(self, stdout: &mut dyn Write, _env: &mut Environment) -> Result<ExitCode> {
        writeln!(stdout, "pipeshell - built-in commands:\n")?;
        for factory in registry() {
            writeln!(stdout, "  {}", factory.summary())?;
        }
        writeln!(stdout)?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Print the current working directory to standard output.
pub(crate) struct Pwd {}

impl BuiltinCommand for Pwd {
    fn name() -> &'static str {
        "pwd"
    }

    fn summary() -> &'static str {
        "pwd               - Print working directory"
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        writeln!(stdout, "{}", env.current_dir.to_string_lossy())?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Set environment variables for subsequently executed commands.
/// Without arguments, prints every exported variable.
pub(crate) struct Export {
    #[argh(positional, greedy)]
    /// assignments of the form NAME=value
    assignments: Vec<String>,
}

impl BuiltinCommand for Export {
    fn name() -> &'static str {
        "export"
    }

    fn summary() -> &'static str {
        "export VAR=value  - Set environment variable"
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        if self.assignments.is_empty() {
            let mut entries: Vec<_> = env.vars.iter().collect();
            entries.sort();
            for (key, value) in entries {
                writeln!(stdout, "export {}='{}'", key, value)?;
            }
            return Ok(0);
        }
        for spec in &self.assignments {
            if let Some((name, value)) = spec.split_once('=') {
                env.set_var(name, value);
            }
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Remove variables from the environment.
pub(crate) struct Unset {
    #[argh(positional, greedy)]
    /// variable names to remove
    names: Vec<String>,
}

impl BuiltinCommand for Unset {
    fn name() -> &'static str {
        "unset"
    }

    fn summary() -> &'static str {
        "unset VAR         - Unset environment variable"
    }

    fn execute(self, _stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        for name in &self.names {
            env.unset_var(name);
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Print all environment variables.
pub(crate) struct Env {}

impl BuiltinCommand for Env {
    fn name() -> &'static str {
        "env"
    }

    fn summary() -> &'static str {
        "env               - Print all environment variables"
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        let mut entries: Vec<_> = env.vars.iter().collect();
        entries.sort();
        for (key, value) in entries {
            writeln!(stdout, "{}={}", key, value)?;
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Define aliases or list the ones currently set.
pub(crate) struct Alias {
    #[argh(positional, greedy)]
    /// definitions of the form name=replacement, or names to display
    specs: Vec<String>,
}

impl BuiltinCommand for Alias {
    fn name() -> &'static str {
        "alias"
    }

    fn summary() -> &'static str {
        "alias [name=cmd]  - Define or list aliases"
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        if self.specs.is_empty() {
            let mut entries: Vec<_> = env.aliases.iter().collect();
            entries.sort();
            for (name, value) in entries {
                writeln!(stdout, "alias {}='{}'", name, value)?;
            }
            return Ok(0);
        }

        let mut code = 0;
        for spec in &self.specs {
            match spec.split_once('=') {
                Some((name, value)) => {
                    env.aliases.insert(name.to_string(), value.to_string());
                }
                None => match env.aliases.get(spec) {
                    Some(value) => writeln!(stdout, "alias {}='{}'", spec, value)?,
                    None => {
                        eprintln!("alias: {}: not found", spec);
                        code = 1;
                    }
                },
            }
        }
        Ok(code)
    }
}

#[derive(FromArgs)]
/// Remove alias definitions.
pub(crate) struct Unalias {
    #[argh(positional, greedy)]
    /// alias names to remove
    names: Vec<String>,
}

impl BuiltinCommand for Unalias {
    fn name() -> &'static str {
        "unalias"
    }

    fn summary() -> &'static str {
        "unalias name      - Remove an alias"
    }

    fn execute(self, _stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        let mut code = 0;
        for name in &self.names {
            if env.aliases.remove(name).is_none() {
                eprintln!("unalias: {}: not found", name);
                code = 1;
            }
        }
        Ok(code)
    }
}

#[derive(FromArgs)]
/// Print the full path of each command found on PATH.
pub(crate) struct Which {
    #[argh(positional, greedy)]
    /// command names to look up
    names: Vec<String>,
}

impl BuiltinCommand for Which {
    fn name() -> &'static str {
        "which"
    }

    fn summary() -> &'static str {
        "which cmd         - Show path of a command"
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        let mut code = 0;
        for name in &self.names {
            match external::resolve_program(env, name) {
                Some(path) => writeln!(stdout, "{}", path.display())?,
                None => {
                    eprintln!("which: no {} in PATH", name);
                    code = 1;
                }
            }
        }
        Ok(code)
    }
}

#[derive(FromArgs)]
/// Show how each command name would be interpreted.
pub(crate) struct Type {
    #[argh(positional, greedy)]
    /// command names to classify
    names: Vec<String>,
}

impl BuiltinCommand for Type {
    fn name() -> &'static str {
        "type"
    }

    fn summary() -> &'static str {
        "type cmd          - Show how a command would be interpreted"
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        let mut code = 0;
        for name in &self.names {
            if is_builtin(name) {
                writeln!(stdout, "{} is a shell builtin", name)?;
            } else if let Some(value) = env.aliases.get(name) {
                writeln!(stdout, "{} is aliased to `{}'", name, value)?;
            } else if let Some(path) = external::resolve_program(env, name) {
                writeln!(stdout, "{} is {}", name, path.display())?;
            } else {
                eprintln!("type: {}: not found", name);
                code = 1;
            }
        }
        Ok(code)
    }
}

#[derive(FromArgs)]
/// Execute commands from a file in the current shell session.
pub(crate) struct Source {
    #[argh(positional)]
    /// path of the script to read
    file: String,
}

impl BuiltinCommand for Source {
    fn name() -> &'static str {
        "source"
    }

    fn summary() -> &'static str {
        "source file       - Execute commands from a file"
    }

    fn execute(self, _stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        let text = fs::read_to_string(&self.file)
            .with_context(|| format!("source: {}: No such file or directory", self.file))?;
        interpreter::run_script(env, &text);
        Ok(env.last_exit)
    }
}
