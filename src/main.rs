use std::io::{self, BufReader, BufWriter};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use mvnpilot::config::{self, Config};
use mvnpilot::tools::{Tools, TOOL_NAMES};

/// Drive a Maven project's tests, coverage, review and pull requests.
#[derive(Parser)]
#[command(name = "mvnpilot", version, about)]
struct Cli {
    /// Config file (default: ./mvnpilot.toml if present).
    #[arg(long, global = true, env = "MVNPILOT_CONFIG")]
    config: Option<PathBuf>,

    /// Maven executable, e.g. ./mvnw.
    #[arg(long, global = true, env = "MVNPILOT_MAVEN")]
    maven: Option<String>,

    /// Directory holding the parser jars.
    #[arg(long, global = true, env = "MVNPILOT_PARSERS_DIR")]
    parsers_dir: Option<PathBuf>,

    /// GitHub REST API base URL.
    #[arg(long, global = true, env = "MVNPILOT_GITHUB_API_URL")]
    github_api_url: Option<String>,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer JSON-lines tool calls on stdin, one reply per line on stdout.
    Serve,

    /// Make a single tool call and print the reply.
    Call {
        /// Tool name, e.g. getCoverage.
        tool: String,

        /// Tool arguments as a JSON object.
        #[arg(long, default_value = "{}")]
        args: String,

        /// Initialize the session with this project before the call.
        #[arg(long)]
        project: Option<PathBuf>,
    },

    /// List the available tools.
    Tools,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<Config> {
    let cwd = std::env::current_dir().context("Failed to read working directory")?;
    config::load_env_file(&cwd)?;
    let mut config = config::load(cli.config.as_deref(), &cwd)?;
    if let Some(maven) = &cli.maven {
        config.maven = maven.clone();
    }
    if let Some(dir) = &cli.parsers_dir {
        config.parsers_dir = dir.clone();
    }
    if let Some(url) = &cli.github_api_url {
        config.github_api_url = url.clone();
    }
    debug!(?config, "effective config");
    Ok(config)
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Serve => cmd_serve(config),
        Commands::Call {
            tool,
            args,
            project,
        } => cmd_call(config, &tool, &args, project),
        Commands::Tools => {
            for name in TOOL_NAMES {
                println!("{name}");
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn cmd_serve(config: Config) -> Result<ExitCode> {
    info!("serving tool calls on stdio");
    let mut tools = Tools::new(config);
    let stdin = BufReader::new(io::stdin());
    let stdout = BufWriter::new(io::stdout().lock());
    tools.serve(stdin, stdout).context("stdio transport failed")?;
    Ok(ExitCode::SUCCESS)
}

fn cmd_call(config: Config, tool: &str, args: &str, project: Option<PathBuf>) -> Result<ExitCode> {
    let args: serde_json::Value =
        serde_json::from_str(args).context("--args must be a JSON object")?;
    let mut tools = Tools::new(config);

    if let Some(project) = project {
        let init = tools.call(
            "initialize",
            serde_json::json!({ "path": project.to_string_lossy() }),
        );
        if !init.is_ok() {
            println!("{}", serde_json::to_string_pretty(&init)?);
            return Ok(ExitCode::FAILURE);
        }
    }

    let response = tools.call(tool, args);
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(if response.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
