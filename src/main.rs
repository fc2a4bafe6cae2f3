use algolia_mcp::app::{list_tools_report, App, ServerOptions};
use algolia_mcp::errors::ToolError;
use algolia_mcp::mcp::server::run_stdio;
use algolia_mcp::observability::init_tracing;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "algolia-mcp", version, about = "Algolia APIs as MCP tools over stdio")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the tool catalog over stdio (default).
    StartServer(StartServerArgs),
    /// Print every operation id, grouped by API.
    ListTools(ListToolsArgs),
}

#[derive(Args, Default)]
struct StartServerArgs {
    /// Only expose these tool ids (comma separated).
    #[arg(long, value_delimiter = ',')]
    allow_tools: Vec<String>,
    /// Never expose these tool ids (comma separated).
    #[arg(long, value_delimiter = ',')]
    deny_tools: Vec<String>,
    /// Fixed `applicationId:apiKey` pair.
    #[arg(long)]
    credentials: Option<String>,
    #[arg(long)]
    spec_dir: Option<PathBuf>,
    #[arg(long)]
    state_path: Option<PathBuf>,
}

#[derive(Args, Default)]
struct ListToolsArgs {
    #[arg(long)]
    spec_dir: Option<PathBuf>,
}

async fn start_server(args: StartServerArgs) -> Result<(), ToolError> {
    let options = ServerOptions {
        allow_tools: args.allow_tools,
        deny_tools: args.deny_tools,
        credentials: args.credentials,
        spec_dir: args.spec_dir,
        state_path: args.state_path,
    };
    let app = App::initialize(options).await?;
    run_stdio(app.dispatcher).await
}

fn list_tools(args: ListToolsArgs) -> Result<(), ToolError> {
    let options = ServerOptions {
        spec_dir: args.spec_dir,
        ..ServerOptions::default()
    };
    println!("{}", list_tools_report(&options.spec_dir())?);
    Ok(())
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let result = match cli
        .command
        .unwrap_or_else(|| Command::StartServer(StartServerArgs::default()))
    {
        Command::StartServer(args) => start_server(args).await,
        Command::ListTools(args) => list_tools(args),
    };
    if let Err(err) = result {
        eprintln!("algolia-mcp: {}", err);
        if let Some(hint) = &err.hint {
            eprintln!("hint: {}", hint);
        }
        std::process::exit(1);
    }
}
