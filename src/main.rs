use log::LevelFilter;
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

use pipeshell::Interpreter;

fn main() {
    // Diagnostics go to stderr so they never mix into pipeline output.
    let level = match std::env::var("PIPESHELL_LOG").as_deref() {
        Ok("trace") => LevelFilter::Trace,
        Ok("debug") => LevelFilter::Debug,
        Ok("info") => LevelFilter::Info,
        _ => LevelFilter::Warn,
    };
    let _ = TermLogger::init(
        level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    );

    let code = match Interpreter::new().repl() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("pipeshell: {err:#}");
            1
        }
    };
    std::process::exit(code);
}
