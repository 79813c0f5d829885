use std::io::{self, Write};
use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use tracing::info;
use tracing_subscriber::EnvFilter;

use textgen_repl::config::{Cli, Settings};
use textgen_repl::engine::{LLMEngine, LoadedEngine};
use textgen_repl::errors::SessionError;
use textgen_repl::prompting::PromptBuilder;
use textgen_repl::repl::SessionLoop;
use textgen_repl::session::TerminationReason;
use textgen_repl::threading::{pin_threads, OsCorePinner, ThreadPools};

const BANNER: &str = r"  _            _
 | |_ _____  _| |_ __ _  ___ _ __    _ __ ___ _ __ | |
 | __/ _ \ \/ / __/ _` |/ _ \ '_ \  | '__/ _ \ '_ \| |
 | ||  __/>  <| || (_| |  __/ | | | | | |  __/ |_) | |
  \__\___/_/\_\\__\__, |\___|_| |_| |_|  \___| .__/|_|
                  |___/                      |_|";

const INSTRUCTIONS: &str = "*Usage*
  Enter an instruction and press enter (%Q quits, %C clears the context).

*Examples*
  - Write an email to grandma thanking her for the cookies.
  - What are some historical attractions to visit around Massachusetts?
  - Compute the nth fibonacci number in javascript.
";

fn init_logging(verbosity: u8) {
    let default_level = match verbosity {
        0 => "error",
        1 => "warn",
        _ => "info",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn show_help() {
    let stderr = io::stderr();
    let mut err = stderr.lock();
    let written = Cli::command()
        .write_help(&mut err)
        .and_then(|()| writeln!(err));
    if let Err(e) = written {
        eprintln!("failed to print usage: {}", e);
    }
}

fn show_banner(settings: &Settings, out: &mut dyn Write) -> io::Result<()> {
    // clear screen
    write!(out, "\x1b[2J\x1b[1;1H")?;
    writeln!(out, "{}\n", BANNER)?;
    settings.print(settings.app.verbosity, out)?;
    writeln!(out, "\n{}", INSTRUCTIONS)?;
    out.flush()
}

fn run(settings: &Settings) -> Result<TerminationReason, SessionError> {
    let verbosity = settings.app.verbosity;

    let pools = ThreadPools::new(settings.app.num_threads)?;
    let pinning = pin_threads(&pools, &OsCorePinner);
    info!("thread setup: {:?}", pinning);

    let LoadedEngine {
        generator,
        tokenizer,
        special,
    } = LLMEngine::load(&settings.loader, &pools)
        .map_err(|e| SessionError::ModelLoad(format!("{:#}", e)))?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if verbosity >= 1 {
        show_banner(settings, &mut out)?;
    }

    let builder = PromptBuilder::new(settings.loader.model.training, special.bos);
    let mut repl = SessionLoop::new(
        generator,
        tokenizer,
        &pools,
        &settings.inference,
        builder,
        special.eos,
        verbosity,
    );

    let stdin = io::stdin();
    let stderr = io::stderr();
    let mut err = stderr.lock();
    repl.run(stdin.lock(), &mut out, &mut err)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match Settings::resolve(&cli) {
        Ok(settings) => settings,
        Err(e) => {
            show_help();
            eprintln!("\n{}", SessionError::from(e));
            return ExitCode::FAILURE;
        }
    };
    init_logging(settings.app.verbosity);

    match run(&settings) {
        Ok(reason) => {
            info!("session ended: {:?}", reason);
            ExitCode::SUCCESS
        }
        Err(e) => {
            if e.wants_help() {
                show_help();
            }
            eprintln!("\n{}", e);
            ExitCode::FAILURE
        }
    }
}
