use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use stepdef_index::config::Config;
use stepdef_index::model::{BuildTrigger, CodeLocation};
use stepdef_index::{format, IndexContext};

#[derive(Parser, Debug)]
#[command(
    name = "stepdef-index",
    version,
    about = "Index step definitions and resolve them to code",
    long_about = "A command-line tool for indexing behavior-specification step definitions \
        across a workspace and resolving their code locations to methods.\n\n\
        Projects, providers and type models come from stepdefs.toml in the current \
        directory (or --config). Without a configuration file the current directory \
        is a single project scanned for annotated Java step definitions.\n\n\
        Examples:\n  \
        stepdef-index build\n  \
        stepdef-index list --project shop\n  \
        stepdef-index find \"Given I have 3 cukes\" --project shop\n  \
        stepdef-index resolve com.example.Steps haveCukes --project shop\n  \
        stepdef-index classpath --project shop --resource cucumber.properties"
)]
struct Cli {
    #[arg(long, global = true, help = "Configuration file (default: ./stepdefs.toml)")]
    config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        default_value = "json",
        help = "Output format",
        long_help = "Output format.\n  json     — JSON (default, best for programmatic use)\n  markdown — Human-readable markdown"
    )]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(ValueEnum, Clone, Debug)]
enum OutputFormat {
    Json,
    Markdown,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a full build and print the build reports
    Build {
        #[arg(long, short, help = "Build only this project")]
        project: Option<String>,
    },

    /// List indexed step definitions per resource
    List {
        #[arg(long, short, help = "List only this project")]
        project: Option<String>,
    },

    /// Find the step definitions matching a step and resolve them
    #[command(long_about = "Find the step definitions matching a line of step text.\n\n\
        A leading Given/When/Then/And/But keyword is ignored. Every matching\n\
        definition is resolved against the project's type model; when a method\n\
        is overloaded, every overload is listed.\n\n\
        Examples:\n  \
        stepdef-index find \"Given I have 3 cukes\" --project shop")]
    Find {
        /// Step text
        text: String,

        #[arg(long, short, help = "Project whose definitions are searched")]
        project: String,
    },

    /// Resolve a type and method name to member candidates (no build)
    Resolve {
        /// Declaring type, fully qualified
        type_name: String,

        /// Method name
        method_name: String,

        #[arg(long, short, help = "Project whose type model is consulted")]
        project: String,
    },

    /// Show a project's isolated runtime search path (no build)
    Classpath {
        #[arg(long, short, help = "Project name")]
        project: String,

        #[arg(long, short, help = "Resource name to look up, '/'-separated")]
        resource: Option<String>,
    },

    /// List registered step-definition providers in dispatch order
    Providers,

    /// Run a full build and print the diagnostics it reported
    Diagnostics {
        #[arg(long, short, help = "Only this project")]
        project: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Handle SIGPIPE gracefully (prevents broken pipe panics when piped through head/less)
    #[cfg(unix)]
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("STEPDEF_INDEX_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let cwd = std::env::current_dir()?;
    let config = Config::discover(cli.config.as_deref(), &cwd)?;
    let ctx = IndexContext::new(&config)?;

    match cli.command {
        Command::Build { project } => {
            let reports =
                stepdef_index::build_projects(&ctx, project.as_deref(), BuildTrigger::Full).await?;
            let failed = reports.iter().any(|r| !r.failures.is_empty());
            print_output(&cli.format, &reports, |r| format::build(r))?;
            Ok(if failed {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            })
        }

        Command::List { project } => {
            stepdef_index::build_projects(&ctx, project.as_deref(), BuildTrigger::Full).await?;
            let result = stepdef_index::list_definitions(&ctx, project.as_deref())?;
            print_output(&cli.format, &result, |r| format::list(r))?;
            Ok(ExitCode::SUCCESS)
        }

        Command::Find { text, project } => {
            stepdef_index::build_projects(&ctx, Some(&project), BuildTrigger::Full).await?;
            let result = stepdef_index::find_steps(&ctx, &text, &project)?;
            let found = !result.matches.is_empty();
            print_output(&cli.format, &result, format::find)?;
            Ok(if found {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            })
        }

        Command::Resolve {
            type_name,
            method_name,
            project,
        } => {
            let location = CodeLocation::new(type_name, method_name);
            let result = stepdef_index::resolve_symbol(&ctx, &project, &location)?;
            print_output(&cli.format, &result, format::symbol)?;
            Ok(ExitCode::SUCCESS)
        }

        Command::Classpath { project, resource } => {
            let result = stepdef_index::classpath(&ctx, &project, resource.as_deref())?;
            print_output(&cli.format, &result, format::classpath)?;
            Ok(ExitCode::SUCCESS)
        }

        Command::Providers => {
            let result = stepdef_index::list_providers(&ctx);
            print_output(&cli.format, &result, |r| format::providers(r))?;
            Ok(ExitCode::SUCCESS)
        }

        Command::Diagnostics { project } => {
            stepdef_index::build_projects(&ctx, project.as_deref(), BuildTrigger::Full).await?;
            let result = stepdef_index::list_diagnostics(&ctx, project.as_deref())?;
            print_output(&cli.format, &result, |r| format::diagnostics(r))?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Print output in the requested format
fn print_output<T: serde::Serialize>(
    fmt: &OutputFormat,
    value: &T,
    markdown_fn: impl FnOnce(&T) -> String,
) -> anyhow::Result<()> {
    match fmt {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        OutputFormat::Markdown => {
            print!("{}", markdown_fn(value));
        }
    }
    Ok(())
}
