use std::io::IsTerminal;
use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use calltrace::agent::Agent;
use calltrace::error::Error;
use calltrace::options::AgentOptions;
use calltrace::replay;
use calltrace::script::Script;
use calltrace::selection::{RoutineKind, Selector};
use calltrace_runtime::stdout_sink;

#[derive(Parser)]
#[command(
    name = "calltrace",
    about = "Call counts, inclusive time and live call traces for selected routines",
    version,
    after_help = "Workflow: calltrace select SCRIPT -p PATTERN, then calltrace replay SCRIPT -p PATTERN"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SelectionArgs {
    /// Instrument types whose full name matches PATTERN, and their methods
    /// whose descriptor contains a match.
    #[arg(short = 'p', long = "package", value_name = "PATTERN")]
    package: Option<String>,

    /// Print a live call trace whenever a routine matching PATTERN is entered.
    #[arg(short = 't', long = "trace", value_name = "PATTERN")]
    trace: Option<String>,

    /// Compact agent options, e.g. 'p:com\.acme\..*#t:parse#d:1#i:5#n:20'.
    /// Flags given alongside override the matching keys.
    #[arg(long, value_name = "OPTIONS")]
    agent_options: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Instrument the types a script declares and replay its threads.
    Replay {
        /// Replay script to run.
        script: PathBuf,

        #[command(flatten)]
        selection: SelectionArgs,

        /// Debug level: 1 logs instrumentation, 2 logs every call.
        #[arg(short = 'd', long = "debug", value_name = "LEVEL")]
        debug: Option<u8>,

        /// Print statistics every SECS seconds while the replay runs.
        #[arg(long, value_name = "SECS")]
        interval: Option<u64>,

        /// Rows per report table.
        #[arg(long, value_name = "N")]
        top: Option<usize>,

        /// Final report format.
        #[arg(long, value_enum, default_value_t = Format::Table)]
        format: Format,
    },
    /// List the routines a script would get instrumented, grouped by type.
    Select {
        /// Replay script whose declarations are inspected.
        script: PathBuf,

        #[command(flatten)]
        selection: SelectionArgs,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Table,
    Json,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Error> {
    match cli.command {
        Commands::Replay {
            script,
            selection,
            debug,
            interval,
            top,
            format,
        } => {
            let mut options = resolve_options(selection)?;
            if let Some(level) = debug {
                options.debug_level = level;
            }
            if let Some(secs) = interval {
                options.flush_interval_secs = secs;
            }
            if let Some(n) = top {
                options.report_limit = n;
            }
            init_logging(options.debug_level);
            cmd_replay(script, options, format)
        }
        Commands::Select { script, selection } => {
            let options = resolve_options(selection)?;
            init_logging(options.debug_level);
            cmd_select(script, &options)
        }
    }
}

/// Start from `--agent-options` and let individual flags override it.
fn resolve_options(args: SelectionArgs) -> Result<AgentOptions, Error> {
    let mut options = match args.agent_options {
        Some(compact) => compact.parse()?,
        None => AgentOptions::default(),
    };
    if args.package.is_some() {
        options.package_pattern = args.package;
    }
    if args.trace.is_some() {
        options.trace_pattern = args.trace;
    }
    Ok(options)
}

fn init_logging(debug_level: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(match debug_level {
            0 => "warn",
            1 => "info",
            _ => "debug",
        })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .init();
}

fn cmd_replay(script_path: PathBuf, options: AgentOptions, format: Format) -> Result<(), Error> {
    let script = Script::load(&script_path)?;
    let agent = Agent::start(options, stdout_sink())?;

    let summary = replay::run(&agent, &script)?;
    if summary.instrumented == 0 {
        eprintln!("warning: no routines were instrumented -- check the package pattern (-p)");
    }
    eprintln!(
        "replayed {} thread(s), {} routine(s) instrumented",
        summary.threads, summary.instrumented
    );

    match format {
        Format::Table => {
            agent.shutdown();
        }
        Format::Json => {
            let report = agent.stop();
            anstream::println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}

fn cmd_select(script_path: PathBuf, options: &AgentOptions) -> Result<(), Error> {
    let script = Script::load(&script_path)?;
    let selector = Selector::from_options(options)?;

    let mut routines = 0;
    let mut types = 0;
    for decl in &script.types {
        let picked: Vec<_> = selector.select_type(decl).collect();
        if picked.is_empty() {
            continue;
        }
        types += 1;
        routines += picked.len();
        anstream::println!("{}", decl.name);
        for (routine, selection) in picked {
            let kind = match routine.kind {
                RoutineKind::Constructor => "ctor",
                RoutineKind::Method => "method",
            };
            let traced = if selection.is_traced { "  [traced]" } else { "" };
            anstream::println!("  {kind:<6}  {}{traced}", routine.descriptor);
        }
    }

    if routines == 0 {
        return Err(Error::NoRoutinesSelected);
    }
    eprintln!("selected {routines} routine(s) across {types} type(s)");
    Ok(())
}
