use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use todod::client::TodoClient;
use todod::config::TodoConfig;
use todod::AppContext;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "todod",
    about = "Realtime todo daemon — in-memory store with WebSocket event fan-out",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// JSON-RPC WebSocket server port
    #[arg(long, env = "TODOD_PORT")]
    port: Option<u16>,

    /// Bind address for the WebSocket server (default: 127.0.0.1; use 0.0.0.0 for LAN access)
    #[arg(long, env = "TODOD_BIND")]
    bind_address: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "TODOD_LOG")]
    log: Option<String>,

    /// Path to the TOML config file (default: ./todod.toml)
    #[arg(long, env = "TODOD_CONFIG")]
    config: Option<std::path::PathBuf>,

    /// Write logs to this file path (rotated daily). Optional.
    #[arg(long, env = "TODOD_LOG_FILE")]
    log_file: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the todo server (default when no subcommand given).
    ///
    /// Runs todod in the foreground, serving JSON-RPC over WebSocket plus
    /// an HTTP health endpoint on the same port. The list lives in memory
    /// only — stopping the server discards it.
    ///
    /// Examples:
    ///   todod serve
    ///   todod
    Serve,
    /// Open the interactive terminal client.
    ///
    /// Mirrors the server's list live: changes made by other connected
    /// clients appear as they happen.
    ///
    /// Examples:
    ///   todod ui
    ///   todod ui --server ws://192.168.1.5:3000
    Ui {
        /// WebSocket URL of the server (default: configured local port)
        #[arg(long)]
        server: Option<String>,
    },
    /// Show server status (version, uptime, todo count, sessions).
    ///
    /// Exits 0 if the server answers, 1 if it is unreachable.
    ///
    /// Examples:
    ///   todod status
    ///   todod status --json
    Status {
        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
        /// WebSocket URL of the server (default: configured local port)
        #[arg(long)]
        server: Option<String>,
    },
    /// List all todos.
    ///
    /// Examples:
    ///   todod list
    ///   todod list --json
    List {
        /// Output as JSON array (for piping)
        #[arg(long)]
        json: bool,
        /// WebSocket URL of the server (default: configured local port)
        #[arg(long)]
        server: Option<String>,
    },
    /// Add a todo.
    ///
    /// Examples:
    ///   todod add "buy milk"
    Add {
        /// Todo text
        text: String,
        /// WebSocket URL of the server (default: configured local port)
        #[arg(long)]
        server: Option<String>,
    },
    /// Mark a todo as done.
    ///
    /// Examples:
    ///   todod done 1001
    Done {
        /// Todo id
        id: u64,
        /// WebSocket URL of the server (default: configured local port)
        #[arg(long)]
        server: Option<String>,
    },
    /// Delete a todo.
    ///
    /// Examples:
    ///   todod rm 1001
    Rm {
        /// Todo id
        id: u64,
        /// WebSocket URL of the server (default: configured local port)
        #[arg(long)]
        server: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // ── Logging setup ────────────────────────────────────────────────────────
    // Init once — must happen before any tracing calls. The terminal UI
    // shares stdout with the rendered frames, so it defaults to errors only.
    let default_level = match args.command {
        Some(Command::Ui { .. }) => "error",
        _ => "info",
    };
    let log_level = args.log.clone().unwrap_or_else(|| default_level.to_owned());
    let log_format =
        std::env::var("TODOD_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());
    let _file_guard = setup_logging(&log_level, args.log_file.as_deref(), &log_format);

    let config = TodoConfig::new(
        args.port,
        args.bind_address,
        Some(log_level),
        args.config,
    );

    match args.command {
        Some(Command::Ui { server }) => {
            let url = server.unwrap_or_else(|| config.ws_url());
            todod::client::ui::run(&url).await?;
        }
        Some(Command::Status { json, server }) => {
            let exit_code = run_status(&config, json, server).await;
            std::process::exit(exit_code);
        }
        Some(Command::List { json, server }) => {
            let client = connect(&config, server).await?;
            let todos = client.list().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&todos)?);
            } else if todos.is_empty() {
                println!("no todos");
            } else {
                for t in todos {
                    let marker = if t.done { "✓" } else { " " };
                    println!("{:>6}  [{marker}] {}", t.id, t.text);
                }
            }
        }
        Some(Command::Add { text, server }) => {
            let client = connect(&config, server).await?;
            let id = client.create(&text, false).await?;
            println!("created todo {id}");
        }
        Some(Command::Done { id, server }) => {
            let client = connect(&config, server).await?;
            client
                .mark_done(id)
                .await
                .with_context(|| format!("could not mark todo {id} as done"))?;
            println!("todo {id} marked as done");
        }
        Some(Command::Rm { id, server }) => {
            let client = connect(&config, server).await?;
            client
                .delete(id)
                .await
                .with_context(|| format!("could not delete todo {id}"))?;
            println!("todo {id} deleted");
        }
        None | Some(Command::Serve) => {
            run_server(config).await?;
        }
    }

    Ok(())
}

async fn run_server(config: TodoConfig) -> Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "todod starting");
    info!(
        port = config.port,
        bind = %config.bind_address,
        origins = config.allowed_origins.len(),
        "config loaded"
    );
    let ctx = Arc::new(AppContext::new(config));
    todod::rpc::run(ctx).await
}

/// Connect a one-shot CLI client to the server.
async fn connect(config: &TodoConfig, server: Option<String>) -> Result<TodoClient> {
    let url = server.unwrap_or_else(|| config.ws_url());
    let (client, _events) = TodoClient::connect(&url)
        .await
        .with_context(|| format!("is the server running at {url}?"))?;
    Ok(client)
}

/// Print server status; returns the process exit code.
async fn run_status(config: &TodoConfig, json: bool, server: Option<String>) -> i32 {
    let client = match connect(config, server).await {
        Ok(c) => c,
        Err(e) => {
            eprintln!("todod: stopped ({e:#})");
            return 1;
        }
    };
    match client.status().await {
        Ok(status) => {
            if json {
                println!("{status}");
            } else {
                println!(
                    "todod: running  version={}  uptime={}s  todos={}  sessions={}",
                    status["version"].as_str().unwrap_or("?"),
                    status["uptime"].as_u64().unwrap_or(0),
                    status["todos"].as_u64().unwrap_or(0),
                    status["activeSessions"].as_u64().unwrap_or(0),
                );
            }
            0
        }
        Err(e) => {
            eprintln!("todod: unresponsive ({e:#})");
            1
        }
    }
}

/// Initialize the tracing subscriber.
/// If `log_file` is set, logs go to both stdout and a daily-rolling file.
/// Returns a `WorkerGuard` that must stay alive for the process lifetime.
///
/// `log_format` may be `"pretty"` (default, human-readable compact format) or
/// `"json"` (structured JSON for log aggregators).
///
/// If the log directory cannot be created, falls back to stdout-only logging
/// with a warning — never panics.
fn setup_logging(
    log_level: &str,
    log_file: Option<&std::path::Path>,
    log_format: &str,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let use_json = log_format == "json";

    if let Some(path) = log_file {
        let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let filename = path
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("todod.log"));

        // Ensure the directory exists before tracing-appender tries to open it.
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!(
                "warn: could not create log directory '{}': {e} — falling back to stdout",
                dir.display()
            );
            if use_json {
                tracing_subscriber::fmt().json().with_env_filter(log_level).init();
            } else {
                tracing_subscriber::fmt().with_env_filter(log_level).compact().init();
            }
            return None;
        }

        let appender = tracing_appender::rolling::daily(dir, filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);

        if use_json {
            tracing_subscriber::registry()
                .with(EnvFilter::new(log_level))
                .with(fmt::layer().json())
                .with(fmt::layer().json().with_writer(non_blocking))
                .init();
        } else {
            tracing_subscriber::registry()
                .with(EnvFilter::new(log_level))
                .with(fmt::layer().compact())
                .with(fmt::layer().with_writer(non_blocking))
                .init();
        }

        Some(guard)
    } else if use_json {
        tracing_subscriber::fmt().json().with_env_filter(log_level).init();
        None
    } else {
        tracing_subscriber::fmt().with_env_filter(log_level).compact().init();
        None
    }
}
