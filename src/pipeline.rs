//! Pipeline execution: spawns child processes, wires their standard
//! streams together and to redirection targets, and reports the final
//! exit status.

use std::fs::{File, OpenOptions};
use std::process::{self, Child, Stdio};

use anyhow::{Context, Result};
use log::debug;

use crate::command::{Command, ExitCode};
use crate::env::Environment;
use crate::external;

/// Run a parsed pipeline to completion.
///
/// Every spawned process is waited on before this returns; the last
/// command's exit status is the pipeline's status. An unresolvable
/// program name reports "command not found" and yields 127; a redirection
/// that cannot be opened reports the failure and yields 1.
pub fn execute_pipeline(commands: &[Command], env: &Environment) -> Result<ExitCode> {
    match commands {
        [] => Ok(0),
        [single] => execute_single(single, env),
        multiple => execute_multi(multiple, env),
    }
}

fn execute_single(cmd: &Command, env: &Environment) -> Result<ExitCode> {
    let Some(program) = external::resolve_program(env, cmd.program()) else {
        eprintln!("pipeshell: command not found: {}", cmd.program());
        return Ok(127);
    };
    debug!("spawning {} as {}", cmd.program(), program.display());

    let mut proc = process::Command::new(program);
    proc.args(&cmd.argv[1..])
        .env_clear()
        .envs(&env.vars)
        .current_dir(&env.current_dir);

    if let Some(path) = &cmd.stdin_file {
        match File::open(path) {
            Ok(file) => {
                proc.stdin(Stdio::from(file));
            }
            Err(_) => {
                eprintln!("pipeshell: {}: No such file or directory", path);
                return Ok(1);
            }
        }
    }

    if let Some(path) = &cmd.stdout_file {
        match open_output(path, cmd.stdout_append) {
            Ok(file) => {
                proc.stdout(Stdio::from(file));
            }
            Err(err) => {
                eprintln!("pipeshell: {}: {}", path, err);
                return Ok(1);
            }
        }
    }

    let mut child = proc
        .spawn()
        .with_context(|| format!("failed to spawn {}", cmd.program()))?;
    let status = child.wait().context("failed to wait for child")?;
    Ok(external::exit_code(status))
}

fn execute_multi(commands: &[Command], env: &Environment) -> Result<ExitCode> {
    let mut children: Vec<Child> = Vec::new();
    let last = commands.len() - 1;

    for (i, cmd) in commands.iter().enumerate() {
        let Some(program) = external::resolve_program(env, cmd.program()) else {
            eprintln!("pipeshell: command not found: {}", cmd.program());
            reap(&mut children);
            return Ok(127);
        };
        debug!("pipeline stage {}: {}", i, program.display());

        let mut proc = process::Command::new(program);
        proc.args(&cmd.argv[1..])
            .env_clear()
            .envs(&env.vars)
            .current_dir(&env.current_dir);

        if i == 0 {
            if let Some(path) = &cmd.stdin_file {
                match File::open(path) {
                    Ok(file) => {
                        proc.stdin(Stdio::from(file));
                    }
                    Err(_) => {
                        eprintln!("pipeshell: {}: No such file or directory", path);
                        reap(&mut children);
                        return Ok(1);
                    }
                }
            }
        } else {
            // The parent must not hold on to the pipe's read end or the
            // downstream stage never sees EOF; moving the ChildStdout into
            // the spawn configuration releases the parent's copy.
            let upstream = children[i - 1]
                .stdout
                .take()
                .context("pipeline stage has no captured stdout")?;
            proc.stdin(Stdio::from(upstream));
        }

        if i == last {
            if let Some(path) = &cmd.stdout_file {
                match open_output(path, cmd.stdout_append) {
                    Ok(file) => {
                        proc.stdout(Stdio::from(file));
                    }
                    Err(err) => {
                        eprintln!("pipeshell: {}: {}", path, err);
                        reap(&mut children);
                        return Ok(1);
                    }
                }
            }
        } else {
            proc.stdout(Stdio::piped());
        }

        match proc.spawn() {
            Ok(child) => children.push(child),
            Err(err) => {
                eprintln!("pipeshell: {}: {}", cmd.program(), err);
                reap(&mut children);
                return Ok(127);
            }
        }
    }

    let mut code = 0;
    for child in &mut children {
        let status = child.wait().context("failed to wait for pipeline stage")?;
        code = external::exit_code(status);
    }
    Ok(code)
}

/// Terminate and wait on every already-spawned stage after a mid-pipeline
/// failure, so no child is left running or unreaped.
fn reap(children: &mut Vec<Child>) {
    for child in children {
        let _ = child.kill();
        let _ = child.wait();
    }
}

/// Open a stdout redirection target, truncating or appending.
pub(crate) fn open_output(path: &str, append: bool) -> std::io::Result<File> {
    if append {
        OpenOptions::new().create(true).append(true).open(path)
    } else {
        File::create(path)
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

    fn cmd(argv: &[&str]) -> Command {
        Command {
            argv: argv.iter().map(|s| s.to_string()).collect(),
            stdin_file: None,
            stdout_file: None,
            stdout_append: false,
        }
    }

    fn make_unique_temp_dir() -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!(
            "pipeshell_pipeline_test_{}_{}",
            std::process::id(),
            nanos
        ));
        fs::create_dir_all(&dir).expect("create temp dir");
        dir
    }

    #[test]
    #[cfg(unix)]
    fn test_single_command_exit_codes() {
        let env = test_session();
        assert_eq!(execute_pipeline(&[cmd(&["true"])], &env).unwrap(), 0);
        assert_eq!(execute_pipeline(&[cmd(&["false"])], &env).unwrap(), 1);
    }

    #[test]
    fn test_command_not_found_is_127() {
        let env = test_session();
        let code = execute_pipeline(&[cmd(&["definitely_not_a_real_command_123"])], &env).unwrap();
        assert_eq!(code, 127);
    }

    #[test]
    #[cfg(unix)]
    fn test_single_command_stdout_redirect() {
        let env = test_session();
        let dir = make_unique_temp_dir();
        let out = dir.join("out.txt");

        let mut command = cmd(&["echo", "a"]);
        command.stdout_file = Some(out.to_string_lossy().into_owned());
        assert_eq!(execute_pipeline(&[command], &env).unwrap(), 0);
        assert_eq!(fs::read_to_string(&out).unwrap(), "a\n");

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    #[cfg(unix)]
    fn test_truncate_then_append() {
        let env = test_session();
        let dir = make_unique_temp_dir();
        let out = dir.join("out.txt");
        let out_str = out.to_string_lossy().into_owned();

        let mut first = cmd(&["echo", "a"]);
        first.stdout_file = Some(out_str.clone());
        execute_pipeline(&[first], &env).unwrap();

        let mut second = cmd(&["echo", "b"]);
        second.stdout_file = Some(out_str);
        second.stdout_append = true;
        execute_pipeline(&[second], &env).unwrap();

        assert_eq!(fs::read_to_string(&out).unwrap(), "a\nb\n");
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    #[cfg(unix)]
    fn test_missing_stdin_file_is_1() {
        let env = test_session();
        let mut command = cmd(&["cat"]);
        command.stdin_file = Some("/definitely/not/a/real/input.txt".to_string());
        assert_eq!(execute_pipeline(&[command], &env).unwrap(), 1);
    }

    #[test]
    #[cfg(unix)]
    fn test_stdin_redirect_feeds_command() {
        let env = test_session();
        let dir = make_unique_temp_dir();
        let input = dir.join("in.txt");
        let out = dir.join("out.txt");
        fs::write(&input, "from file\n").unwrap();

        let mut command = cmd(&["cat"]);
        command.stdin_file = Some(input.to_string_lossy().into_owned());
        command.stdout_file = Some(out.to_string_lossy().into_owned());
        assert_eq!(execute_pipeline(&[command], &env).unwrap(), 0);
        assert_eq!(fs::read_to_string(&out).unwrap(), "from file\n");

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    #[cfg(unix)]
    fn test_two_stage_pipeline_uppercases() {
        let env = test_session();
        let dir = make_unique_temp_dir();
        let out = dir.join("out.txt");

        let mut sink = cmd(&["tr", "a-z", "A-Z"]);
        sink.stdout_file = Some(out.to_string_lossy().into_owned());
        let commands = vec![cmd(&["echo", "hello", "world"]), sink];

        assert_eq!(execute_pipeline(&commands, &env).unwrap(), 0);
        assert_eq!(fs::read_to_string(&out).unwrap(), "HELLO WORLD\n");

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    #[cfg(unix)]
    fn test_three_stage_pipeline_passes_data_through() {
        let env = test_session();
        let dir = make_unique_temp_dir();
        let out = dir.join("out.txt");

        let mut sink = cmd(&["cat"]);
        sink.stdout_file = Some(out.to_string_lossy().into_owned());
        let commands = vec![cmd(&["echo", "pass"]), cmd(&["cat"]), sink];

        assert_eq!(execute_pipeline(&commands, &env).unwrap(), 0);
        assert_eq!(fs::read_to_string(&out).unwrap(), "pass\n");

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    #[cfg(unix)]
    fn test_pipeline_reports_last_exit_code() {
        let env = test_session();
        let code = execute_pipeline(&[cmd(&["false"]), cmd(&["true"])], &env).unwrap();
        assert_eq!(code, 0);

        let code = execute_pipeline(&[cmd(&["true"]), cmd(&["false"])], &env).unwrap();
        assert_eq!(code, 1);
    }

    #[test]
    #[cfg(unix)]
    fn test_pipeline_with_missing_command_is_127() {
        let env = test_session();
        let commands = vec![cmd(&["echo", "hi"]), cmd(&["definitely_not_a_real_command_123"])];
        assert_eq!(execute_pipeline(&commands, &env).unwrap(), 127);
    }
}
