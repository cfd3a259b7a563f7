use anyhow::{Context as _, Result};
use clap::{ArgAction, ArgMatches, CommandFactory, FromArgMatches, Parser};
use flusspferd::{current_context_scope, Context, ContextOptions, Error, SecurityContext};
use flusspferd_config::{Config, ConfigLoader};
use std::path::{Path, PathBuf};
use std::process;
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod builtins;
mod shell;

/// Interactive shell and script runner for the flusspferd bridge.
///
/// Files and expressions run in command-line order. Without any of them the
/// shell starts in interactive mode; `-i` keeps it interactive afterwards.
///
/// EXAMPLES:
///     flusspferd                        Start interactive mode
///     flusspferd script.js a b          Run a script with arguments
///     flusspferd -e 'print(1 + 2)'      Evaluate an expression
///     flusspferd -f setup.js -i         Run a file, then stay interactive
///
/// ENVIRONMENT VARIABLES:
///     FLUSSPFERD_LOG            Log filter (default: warn)
///     FLUSSPFERD_HISTORY_FILE   History file; empty disables history
///     FLUSSPFERD_GC_THRESHOLD   Allocations between collections
///     FLUSSPFERD_PRELUDE        Script run after the configuration
#[derive(Parser, Debug)]
#[command(name = "flusspferd")]
#[command(version, disable_version_flag = true)]
struct Cli {
    /// Print version and exit
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    version: Option<bool>,

    /// Load configuration from FILE
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Run FILE before standard script handling
    #[arg(short = 'f', long = "file", value_name = "FILE")]
    files: Vec<PathBuf>,

    /// Evaluate EXPR
    #[arg(short = 'e', long = "expression", value_name = "EXPR")]
    expressions: Vec<String>,

    /// Enter interactive mode (after files)
    #[arg(short = 'i', long)]
    interactive: bool,

    /// History file for interactive mode (default: ~/.flusspferd-history)
    #[arg(long, value_name = "FILE")]
    history_file: Option<PathBuf>,

    /// Do not keep a history in interactive mode
    #[arg(long)]
    no_global_history: bool,

    /// Script to run
    #[arg(value_name = "FILE")]
    script: Option<PathBuf>,

    /// Arguments exposed to the script as `arguments`
    #[arg(value_name = "ARGS", trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

/// One file or expression to run before interactive mode
#[derive(Debug, Clone, PartialEq)]
enum Startup {
    File(PathBuf),
    Expression(String),
}

impl Startup {
    fn path(&self) -> Option<&Path> {
        match self {
            Startup::File(path) => Some(path),
            Startup::Expression(_) => None,
        }
    }
}

/// `-f` and `-e` in command-line order, followed by the script
fn startup_actions(cli: &Cli, matches: &ArgMatches) -> Vec<Startup> {
    let mut ordered = Vec::new();
    if let Some(indices) = matches.indices_of("files") {
        ordered.extend(
            indices
                .zip(&cli.files)
                .map(|(index, file)| (index, Startup::File(file.clone()))),
        );
    }
    if let Some(indices) = matches.indices_of("expressions") {
        ordered.extend(
            indices
                .zip(&cli.expressions)
                .map(|(index, expr)| (index, Startup::Expression(expr.clone()))),
        );
    }
    ordered.sort_by_key(|(index, _)| *index);

    let mut actions: Vec<Startup> = ordered.into_iter().map(|(_, action)| action).collect();
    if let Some(script) = &cli.script {
        actions.push(Startup::File(script.clone()));
    }
    actions
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_env("FLUSSPFERD_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() {
    init_tracing();

    let matches = Cli::command().get_matches();
    let cli = Cli::from_arg_matches(&matches).unwrap_or_else(|err| err.exit());
    let actions = startup_actions(&cli, &matches);

    let code = match run(cli, actions) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("ERROR: {:#}", err);
            1
        }
    };
    process::exit(code);
}

/// Run startup actions and, when requested, the interactive loop
///
/// Returns the process exit code.
fn run(cli: Cli, actions: Vec<Startup>) -> Result<i32> {
    let config = ConfigLoader::new()
        .load(cli.config.as_deref())
        .context("loading configuration")?;
    let interactive = cli.interactive || actions.is_empty();

    let ctx = create_context(&config, &actions)?;
    let _scope = current_context_scope(&ctx);
    builtins::install(&ctx, &cli.args).map_err(script_error)?;

    match run_startup(config.shell.prelude.as_deref(), &actions) {
        Ok(()) => {}
        Err(Error::Quit(code)) if !interactive => return Ok(code),
        Err(Error::Quit(code)) => debug!(code, "quit during startup, staying interactive"),
        Err(err) if cli.interactive => eprintln!("ERROR: {}", err),
        Err(err) => return Err(script_error(err)),
    }

    if !interactive {
        return Ok(0);
    }
    let history = history_file(&cli, &config)?;
    shell::Shell::new(history)?.run()
}

/// Context from the configuration, with read access to the files named on the command line
fn create_context(config: &Config, actions: &[Startup]) -> Result<Context> {
    let mut security = SecurityContext::from_config(&config.permissions);
    let granted = actions
        .iter()
        .filter_map(Startup::path)
        .chain(config.shell.prelude.as_deref());
    for path in granted {
        security.grant_filesystem_read(path, false);
    }
    let options = ContextOptions::from_config(config).with_security(security);
    debug!(?options, "creating context");
    Context::with_options(options).map_err(script_error)
}

fn run_startup(prelude: Option<&Path>, actions: &[Startup]) -> flusspferd::Result<()> {
    if let Some(prelude) = prelude {
        flusspferd::execute(prelude)?;
    }
    for action in actions {
        match action {
            Startup::File(path) => {
                debug!(path = %path.display(), "running file");
                flusspferd::execute(path)?;
            }
            Startup::Expression(source) => {
                flusspferd::evaluate(source, "[command line]", 1)?;
            }
        }
    }
    Ok(())
}

fn history_file(cli: &Cli, config: &Config) -> Result<Option<PathBuf>> {
    if cli.no_global_history {
        return Ok(None);
    }
    if let Some(path) = &cli.history_file {
        return Ok(Some(path.clone()));
    }
    Ok(config.history_path()?)
}

/// Script errors hold rooted values and stay on this thread; keep only the text
fn script_error(err: Error) -> anyhow::Error {
    anyhow::anyhow!("{}", err)
}
