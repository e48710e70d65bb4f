//! Command-line front end: validate, plan, and run graph-pattern queries.
#![forbid(unsafe_code)]

mod ui;

use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use qgraph::backend::{LinkImport, MemoryBackend, ObjectImport};
use qgraph::config::EngineConfig;
use qgraph::model::Query;
use qgraph::plan::PlanSummary;
use qgraph::profile::profile_snapshot;
use qgraph::session::NO_SOLUTION_MESSAGE;
use qgraph::validate::collect_violations;
use qgraph::{CompileOutcome, QuerySession, RunOutcome};
use serde_json::json;
use tracing_subscriber::{fmt, EnvFilter};

use ui::{format_duration, Theme, Ui};

const EXIT_INVALID: u8 = 2;
const EXIT_NO_SOLUTION: u8 = 3;

#[derive(Parser, Debug)]
#[command(
    name = "qgraph",
    version,
    about = "Compile graph-pattern queries into rewrite plans and run them",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for structured responses"
    )]
    format: OutputFormat,

    #[arg(
        long,
        global = true,
        value_name = "FILE",
        env = "QGRAPH_CONFIG",
        help = "Engine config file (defaults to the user config directory)"
    )]
    config: Option<PathBuf>,

    #[arg(long, global = true, value_enum, default_value_t = Theme::Auto, help = "Color theme")]
    theme: Theme,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check a query description for structural problems.
    Validate {
        #[arg(value_name = "QUERY")]
        query: PathBuf,
    },
    /// Search for a rewrite plan and print the chosen steps.
    Plan {
        #[arg(value_name = "QUERY")]
        query: PathBuf,
        #[command(flatten)]
        search: SearchArgs,
    },
    /// Plan a query and run it against CSV data.
    Run(RunCmd),
}

#[derive(Args, Debug)]
struct SearchArgs {
    #[arg(long, help = "Expand every reachable state before choosing a path")]
    exhaustive: bool,

    #[arg(long, value_name = "N", help = "Give up once the search graph holds N states")]
    max_states: Option<usize>,
}

#[derive(Args, Debug)]
struct RunCmd {
    #[arg(value_name = "QUERY")]
    query: PathBuf,

    #[arg(long, value_name = "FILE", help = "CSV file of objects (id + attribute columns)")]
    objects: PathBuf,

    #[arg(long, value_name = "FILE", help = "CSV file of links (id, o1_id, o2_id + attributes)")]
    links: Option<PathBuf>,

    #[arg(long, value_name = "NAME", help = "Name of the result container")]
    into: String,

    #[arg(long, help = "Replace an existing result container")]
    replace: bool,

    #[arg(long, help = "Print the members of every matching subgraph")]
    show: bool,

    #[command(flatten)]
    search: SearchArgs,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() -> ExitCode {
    install_tracing_subscriber();
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn install_tracing_subscriber() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run() -> Result<ExitCode, Box<dyn Error>> {
    let cli = Cli::parse();
    let ui = Ui::new(cli.theme);
    let mut config = EngineConfig::load(cli.config.clone())?;

    let code = match &cli.command {
        Command::Validate { query } => cmd_validate(&ui, cli.format, query)?,
        Command::Plan { query, search } => {
            apply_search_args(&mut config, search);
            cmd_plan(&ui, cli.format, config, query)?
        }
        Command::Run(cmd) => {
            apply_search_args(&mut config, &cmd.search);
            config.executor.replace_existing |= cmd.replace;
            cmd_run(&ui, cli.format, config, cmd)?
        }
    };
    if cli.format == OutputFormat::Text {
        print_profile(&ui);
    }
    Ok(code)
}

fn apply_search_args(config: &mut EngineConfig, args: &SearchArgs) {
    config.planner.exhaustive |= args.exhaustive;
    if args.max_states.is_some() {
        config.planner.max_states = args.max_states;
    }
}

fn load(path: &Path) -> Result<Query, Box<dyn Error>> {
    Ok(QuerySession::load_query(path)?)
}

fn cmd_validate(ui: &Ui, format: OutputFormat, path: &Path) -> Result<ExitCode, Box<dyn Error>> {
    let query = load(path)?;
    let violations = collect_violations(&query);
    let valid = violations.is_empty();
    match format {
        OutputFormat::Json => emit_json(&json!({
            "query": query.name(),
            "valid": valid,
            "violations": violations,
        }))?,
        OutputFormat::Text if valid => ui.success(&format!("query '{}' is valid", query.name())),
        OutputFormat::Text => ui.problems(
            &format!("query '{}' has {} problem(s)", query.name(), violations.len()),
            violations,
        ),
    }
    Ok(if valid {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_INVALID)
    })
}

fn cmd_plan(
    ui: &Ui,
    format: OutputFormat,
    config: EngineConfig,
    path: &Path,
) -> Result<ExitCode, Box<dyn Error>> {
    let query = load(path)?;
    let session = QuerySession::new(config);
    let task = ui.task(format!("planning '{}'", query.name()));
    let outcome = session.compile(&query)?;
    let elapsed = task.finish();

    match outcome {
        CompileOutcome::Compiled(plan) => {
            let summary = plan.explain();
            match format {
                OutputFormat::Json => emit_json(&json!({ "status": "compiled", "plan": summary }))?,
                OutputFormat::Text => {
                    print_plan(ui, &summary);
                    ui.success(&format!("planned in {}", format_duration(elapsed)));
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        CompileOutcome::Invalid(err) => {
            let violations = err.violations().to_vec();
            report_invalid(ui, format, query.name(), violations)
        }
        CompileOutcome::NoSolution(plan) => {
            let summary = plan.explain();
            match format {
                OutputFormat::Json => emit_json(&json!({
                    "status": "no_solution",
                    "message": NO_SOLUTION_MESSAGE,
                    "plan": summary,
                }))?,
                OutputFormat::Text => {
                    print_plan(ui, &summary);
                    ui.fail(NO_SOLUTION_MESSAGE);
                }
            }
            Ok(ExitCode::from(EXIT_NO_SOLUTION))
        }
    }
}

fn cmd_run(
    ui: &Ui,
    format: OutputFormat,
    config: EngineConfig,
    cmd: &RunCmd,
) -> Result<ExitCode, Box<dyn Error>> {
    let query = load(&cmd.query)?;
    let backend = MemoryBackend::new();
    let links = cmd.links.as_ref().map(LinkImport::new);
    let imported = backend.load_csv(&ObjectImport::new(&cmd.objects), links.as_ref())?;

    let session = QuerySession::new(config);
    let task = ui.task(format!("running '{}'", query.name()));
    let outcome = session.run(&query, &backend, &cmd.into)?;
    let elapsed = task.finish();

    let code = match &outcome {
        RunOutcome::Completed { .. } => ExitCode::SUCCESS,
        RunOutcome::Invalid { .. } => ExitCode::from(EXIT_INVALID),
        RunOutcome::NoSolution { .. } => ExitCode::from(EXIT_NO_SOLUTION),
    };
    if format == OutputFormat::Json {
        emit_json(&outcome)?;
        return Ok(code);
    }
    match outcome {
        RunOutcome::Completed { plan, report } => {
            ui.section(
                "Data",
                [
                    ("objects", imported.objects_imported),
                    ("links", imported.links_imported),
                ],
            );
            print_plan(ui, &plan);
            ui.section(
                "Result",
                [
                    ("container", report.container.clone()),
                    ("subgraphs", report.subgraphs.to_string()),
                    ("objects", report.objects.to_string()),
                    ("links", report.links.to_string()),
                    ("steps executed", report.steps_executed.to_string()),
                    ("steps skipped", report.steps_skipped.to_string()),
                    ("derived links", report.derived_links.to_string()),
                ],
            );
            if cmd.show {
                print_subgraphs(&backend, &report.container);
            }
            ui.success(&format!(
                "stored {} subgraph(s) in '{}' in {}",
                report.subgraphs,
                report.container,
                format_duration(elapsed)
            ));
        }
        RunOutcome::Invalid { violations } => {
            return report_invalid(ui, format, query.name(), violations);
        }
        RunOutcome::NoSolution { plan } => {
            print_plan(ui, &plan);
            ui.fail(NO_SOLUTION_MESSAGE);
        }
    }
    Ok(code)
}

fn report_invalid(
    ui: &Ui,
    format: OutputFormat,
    name: &str,
    violations: Vec<String>,
) -> Result<ExitCode, Box<dyn Error>> {
    match format {
        OutputFormat::Json => emit_json(&json!({ "status": "invalid", "violations": violations }))?,
        OutputFormat::Text => ui.problems(&format!("query '{name}' is invalid"), violations),
    }
    Ok(ExitCode::from(EXIT_INVALID))
}

fn print_plan(ui: &Ui, summary: &PlanSummary) {
    ui.section(
        "Search",
        [
            ("query", summary.query.clone()),
            ("outcome", format!("{:?}", summary.outcome).to_lowercase()),
            ("states", summary.states.to_string()),
            ("edges", summary.edges.to_string()),
            ("shared targets", summary.shared_targets.to_string()),
        ],
    );
    if summary.steps.is_empty() {
        return;
    }
    ui.steps(
        "Steps",
        summary
            .steps
            .iter()
            .map(|step| format!("{}:{} -> {}", step.strategy, step.args, step.output)),
    );
}

fn print_subgraphs(backend: &MemoryBackend, container: &str) {
    let Some(snapshot) = backend.container(container) else {
        return;
    };
    for subg in snapshot.subgraph_ids() {
        let members: Vec<String> = snapshot
            .objects_in(subg)
            .into_iter()
            .chain(snapshot.links_in(subg))
            .map(|(id, name)| format!("{name}={id}"))
            .collect();
        println!("  subgraph {subg}: {}", members.join(" "));
    }
}

fn print_profile(ui: &Ui) {
    let Some(profile) = profile_snapshot(false) else {
        return;
    };
    ui.section(
        "Profile",
        [
            ("states created", profile.states_created),
            ("dedup hits", profile.dedup_hits),
            ("applications", profile.applications),
            ("plan ns", profile.plan_ns),
            ("steps executed", profile.steps_executed),
            ("step ns", profile.step_ns),
        ],
    );
}

fn emit_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
