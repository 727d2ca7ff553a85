//! The orchestrator: runs each input line through the processing pipeline
//! and drives the interactive read loop.

use std::io::Write;

use anyhow::Result;
use log::debug;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use crate::alias;
use crate::builtin;
use crate::command::{ChainOp, Command, ExitCode};
use crate::env::Environment;
use crate::expansion;
use crate::lexer;
use crate::parser;
use crate::pipeline;

/// Run one input line through the full processing pipeline:
///
/// 1. Expand environment variables (`$VAR`, `${VAR}`) on the raw line
/// 2. Tokenize
/// 3. Expand tilde (`~`) and globs (`*`, `?`)
/// 4. Split on `&&` / `||`, short-circuiting each segment on the exit
///    status of the previous one
/// 5. Per segment: expand aliases, split on pipes, parse redirections
/// 6. Dispatch a single non-piped builtin in-process, or hand the command
///    list to the pipeline executor
///
/// A syntax error from any stage is reported, aborts the rest of the
/// line, and leaves the fixed parse-error status 2 in `env.last_exit`.
pub fn run_line(env: &mut Environment, line: &str) {
    let line = expansion::expand_variables(line, env);

    let tokens = match lexer::tokenize(&line) {
        Ok(tokens) => tokens,
        Err(err) => return report_syntax_error(env, err),
    };
    if tokens.is_empty() {
        return;
    }
    debug!("tokens: {tokens:?}");

    let tokens = expansion::expand_tilde(tokens, env);
    let tokens = expansion::expand_globs(tokens);

    let chain = match parser::split_chain(&tokens) {
        Ok(chain) => chain,
        Err(err) => return report_syntax_error(env, err),
    };

    for segment in chain {
        match segment.op {
            Some(ChainOp::And) if env.last_exit != 0 => continue,
            Some(ChainOp::Or) if env.last_exit == 0 => continue,
            _ => {}
        }

        let tokens = alias::expand_aliases(segment.tokens, &env.aliases);

        let commands = match parse_segment(&tokens) {
            Ok(commands) => commands,
            Err(err) => return report_syntax_error(env, err),
        };

        if let [command] = commands.as_slice() {
            if let Some(code) = try_run_builtin(env, command) {
                env.last_exit = code;
                if env.should_exit {
                    return;
                }
                continue;
            }
        }

        match pipeline::execute_pipeline(&commands, env) {
            Ok(code) => env.last_exit = code,
            Err(err) => {
                eprintln!("pipeshell: {err:#}");
                env.last_exit = 1;
            }
        }
    }
}

/// Run each non-empty, non-comment line of `text` in the current session.
/// Used by the `source` builtin and the rc file.
pub(crate) fn run_script(env: &mut Environment, text: &str) {
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        run_line(env, line);
        if env.should_exit {
            break;
        }
    }
}

fn parse_segment(tokens: &[String]) -> Result<Vec<Command>, parser::ParseError> {
    parser::split_pipeline(tokens)?
        .iter()
        .map(|segment| parser::parse_redirections(segment))
        .collect()
}

fn report_syntax_error(env: &mut Environment, err: impl std::fmt::Display) {
    eprintln!("pipeshell: {err}");
    env.last_exit = 2;
}

/// Dispatch a single, non-piped command to a builtin, honoring stdout
/// redirection. Returns `None` when the name is not a builtin.
fn try_run_builtin(env: &mut Environment, command: &Command) -> Option<ExitCode> {
    let args: Vec<&str> = command.argv[1..].iter().map(String::as_str).collect();
    let handler = builtin::lookup(command.program(), &args)?;

    let result = match &command.stdout_file {
        Some(path) => match pipeline::open_output(path, command.stdout_append) {
            Ok(mut file) => {
                let code = handler.execute(&mut file, env);
                let _ = file.flush();
                code
            }
            Err(err) => {
                eprintln!("pipeshell: {}: {}", path, err);
                return Some(1);
            }
        },
        None => {
            let stdout = std::io::stdout();
            let mut lock = stdout.lock();
            handler.execute(&mut lock, env)
        }
    };

    Some(match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("pipeshell: {err:#}");
            1
        }
    })
}

/// Interactive shell: owns the session state and the read loop.
///
/// Example
/// ```no_run
/// use pipeshell::Interpreter;
/// let mut sh = Interpreter::new();
/// let code = sh.run_line("echo hello | tr a-z A-Z");
/// assert_eq!(code, 0);
/// ```
pub struct Interpreter {
    env: Environment,
}

impl Interpreter {
    pub fn new() -> Self {
        Self {
            env: Environment::new(),
        }
    }

    /// Run a single line as if it had been typed at the prompt and return
    /// the resulting exit status.
    pub fn run_line(&mut self, line: &str) -> ExitCode {
        run_line(&mut self.env, line);
        self.env.last_exit
    }

    /// Whether a previously run line asked the session to end.
    pub fn should_exit(&self) -> bool {
        self.env.should_exit
    }

    /// Read-eval loop. Returns the exit status to report to the OS.
    ///
    /// History is kept in `~/.pipeshell_history`; an interrupt or
    /// end-of-input during the prompt ends the session gracefully.
    pub fn repl(&mut self) -> Result<ExitCode> {
        let mut editor = DefaultEditor::new()?;
        let history_path = self.env.home_dir().map(|home| home.join(".pipeshell_history"));
        if let Some(path) = &history_path {
            let _ = editor.load_history(path);
        }

        self.source_rc_file();

        loop {
            match editor.readline(&self.prompt()) {
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() || line.starts_with('#') {
                        continue;
                    }
                    let _ = editor.add_history_entry(line);
                    run_line(&mut self.env, line);
                    if self.env.should_exit {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                    println!();
                    break;
                }
                Err(err) => {
                    eprintln!("pipeshell: {err}");
                    break;
                }
            }
        }

        if let Some(path) = &history_path {
            let _ = editor.save_history(path);
        }
        Ok(self.env.last_exit)
    }

    /// Source `~/.pipeshellrc` when present, before the first prompt.
    fn source_rc_file(&mut self) {
        let Some(rc) = self.env.home_dir().map(|home| home.join(".pipeshellrc")) else {
            return;
        };
        let Ok(text) = std::fs::read_to_string(&rc) else {
            return;
        };
        debug!("sourcing {}", rc.display());
        run_script(&mut self.env, &text);
    }

    /// Prompt showing the working directory, with `$HOME` shortened to `~`.
    fn prompt(&self) -> String {
        let cwd = self.env.current_dir.display().to_string();
        let display = match self.env.home_dir() {
            Some(home) => {
                let home = home.display().to_string();
                if cwd == home {
                    "~".to_string()
                } else if let Some(rest) = cwd.strip_prefix(&format!("{home}/")) {
                    format!("~/{rest}")
                } else {
                    cwd
                }
            }
            None => cwd,
        };
        format!("{display} $ ")
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn test_session() -> Environment {
        let mut env = Environment::new();
        env.current_dir = std::env::temp_dir();
        env
    }

    fn make_unique_temp_dir() -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!(
            "pipeshell_interp_test_{}_{}",
            std::process::id(),
            nanos
        ));
        fs::create_dir_all(&dir).expect("create temp dir");
        dir
    }

    #[test]
    #[cfg(unix)]
    fn test_pipeline_line_uppercases_into_file() {
        let mut env = test_session();
        let dir = make_unique_temp_dir();
        let out = dir.join("out.txt");

        run_line(
            &mut env,
            &format!("echo hello world | tr a-z A-Z > {}", out.display()),
        );

        assert_eq!(env.last_exit, 0);
        assert_eq!(fs::read_to_string(&out).unwrap(), "HELLO WORLD\n");
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    #[cfg(unix)]
    fn test_and_short_circuits_after_failure() {
        let mut env = test_session();
        let dir = make_unique_temp_dir();
        let out = dir.join("skipped.txt");

        run_line(&mut env, &format!("false && echo skipped > {}", out.display()));

        assert_ne!(env.last_exit, 0);
        assert!(!out.exists());
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    #[cfg(unix)]
    fn test_or_runs_only_after_failure() {
        let mut env = test_session();
        let dir = make_unique_temp_dir();
        let taken = dir.join("taken.txt");
        let skipped = dir.join("skipped.txt");

        run_line(&mut env, &format!("false || echo taken > {}", taken.display()));
        assert_eq!(env.last_exit, 0);
        assert!(taken.exists());

        run_line(&mut env, &format!("true || echo skipped > {}", skipped.display()));
        assert!(!skipped.exists());

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    #[cfg(unix)]
    fn test_unset_variable_expands_to_nothing() {
        let mut env = test_session();
        env.unset_var("PIPESHELL_TEST_UNSET");
        let dir = make_unique_temp_dir();
        let out = dir.join("out.txt");

        run_line(
            &mut env,
            &format!("echo $PIPESHELL_TEST_UNSET > {}", out.display()),
        );

        assert_eq!(env.last_exit, 0);
        assert_eq!(fs::read_to_string(&out).unwrap(), "\n");
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    #[cfg(unix)]
    fn test_export_is_visible_to_later_lines() {
        let mut env = test_session();
        let dir = make_unique_temp_dir();
        let out = dir.join("out.txt");

        run_line(&mut env, "export PIPESHELL_TEST_GREETING=hi");
        run_line(
            &mut env,
            &format!("echo $PIPESHELL_TEST_GREETING > {}", out.display()),
        );

        assert_eq!(fs::read_to_string(&out).unwrap(), "hi\n");
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    #[cfg(unix)]
    fn test_alias_applies_to_leading_word() {
        let mut env = test_session();
        let dir = make_unique_temp_dir();
        let out = dir.join("out.txt");

        run_line(&mut env, "alias shout='echo loud'");
        run_line(&mut env, &format!("shout noise > {}", out.display()));

        assert_eq!(fs::read_to_string(&out).unwrap(), "loud noise\n");
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_builtin_stdout_redirection() {
        let mut env = test_session();
        let dir = make_unique_temp_dir();
        let out = dir.join("out.txt");

        run_line(&mut env, &format!("pwd > {}", out.display()));

        assert_eq!(env.last_exit, 0);
        let recorded = fs::read_to_string(&out).unwrap();
        assert_eq!(
            recorded.trim_end(),
            env.current_dir.to_string_lossy()
        );
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_syntax_error_sets_parse_error_status() {
        let mut env = test_session();

        run_line(&mut env, "cmd1 && && cmd2");
        assert_eq!(env.last_exit, 2);

        run_line(&mut env, "echo 'unterminated");
        assert_eq!(env.last_exit, 2);

        run_line(&mut env, "| cmd");
        assert_eq!(env.last_exit, 2);

        run_line(&mut env, "echo >");
        assert_eq!(env.last_exit, 2);
    }

    #[test]
    #[cfg(unix)]
    fn test_syntax_error_aborts_rest_of_line() {
        let mut env = test_session();
        let dir = make_unique_temp_dir();
        let out = dir.join("out.txt");

        run_line(
            &mut env,
            &format!("echo > && true > {}", out.display()),
        );

        assert_eq!(env.last_exit, 2);
        assert!(!out.exists());
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_empty_line_is_a_no_op() {
        let mut env = test_session();
        env.last_exit = 7;
        run_line(&mut env, "   ");
        assert_eq!(env.last_exit, 7);
    }

    #[test]
    fn test_exit_builtin_ends_session_with_code() {
        let mut env = test_session();
        run_line(&mut env, "exit 3");
        assert!(env.should_exit);
        assert_eq!(env.last_exit, 3);
    }

    #[test]
    #[cfg(unix)]
    fn test_command_not_found_sets_127() {
        let mut env = test_session();
        run_line(&mut env, "definitely_not_a_real_command_123");
        assert_eq!(env.last_exit, 127);
    }

    #[test]
    #[cfg(unix)]
    fn test_source_runs_script_in_session() {
        let mut env = test_session();
        let dir = make_unique_temp_dir();
        let script = dir.join("setup.psh");
        let out = dir.join("out.txt");
        fs::write(
            &script,
            "# setup\nexport PIPESHELL_TEST_SOURCED=yes\nalias hey='echo hey'\n",
        )
        .unwrap();

        run_line(&mut env, &format!("source {}", script.display()));
        assert_eq!(env.last_exit, 0);
        assert_eq!(env.get_var("PIPESHELL_TEST_SOURCED"), Some("yes".to_string()));

        run_line(&mut env, &format!("hey there > {}", out.display()));
        assert_eq!(fs::read_to_string(&out).unwrap(), "hey there\n");

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    #[cfg(unix)]
    fn test_truncate_then_append_across_lines() {
        let mut env = test_session();
        let dir = make_unique_temp_dir();
        let out = dir.join("out.txt");

        run_line(&mut env, &format!("echo a > {}", out.display()));
        run_line(&mut env, &format!("echo b >> {}", out.display()));

        assert_eq!(fs::read_to_string(&out).unwrap(), "a\nb\n");
        let _ = fs::remove_dir_all(dir);
    }
}
