//! Conductor SDK command line
//!
//! Bridges an external AI agent to the Conductor backend: serves the task
//! tools over stdio, or drives a task session interactively.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use conductor::{
    backend::BackendApiClient,
    config::ConductorConfig,
    context::ProjectContext,
    runtime::ConductorRuntime,
    tools::{stdio, ReceiveMessagesResult},
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "conductor")]
#[command(version)]
#[command(about = "Bridge external AI agents to the Conductor task backend")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "CONDUCTOR_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the task tools as newline-delimited JSON over stdin/stdout
    Serve,

    /// Create (or reattach to) a task session and follow its messages
    CreateTask {
        /// Backend project ID (defaults to the first project on the backend)
        #[arg(long, env = "PROJECT_ID")]
        project_id: Option<String>,

        /// Task title
        #[arg(long, env = "TASK_TITLE", default_value = "SDK Demo Task")]
        task_title: String,

        /// Initial prompt for the task
        #[arg(long, env = "TASK_PREFILL")]
        prefill: Option<String>,

        /// Reattach to an existing task instead of creating one
        #[arg(long, requires = "project_id")]
        task_id: Option<String>,

        /// Read messages to send from stdin
        #[arg(long)]
        chat: bool,

        /// Seconds between message polls
        #[arg(long, default_value_t = 0.5)]
        poll_interval: f64,

        /// How long to listen for replies when not chatting
        #[arg(long, env = "TASK_LISTEN_SECONDS", default_value_t = 15.0)]
        listen_seconds: f64,
    },

    /// List projects known to the backend
    ListProjects,

    /// Show the local workspace an agent would see
    Context {
        /// Workspace directory (defaults to the current directory)
        #[arg(long)]
        path: Option<PathBuf>,

        /// Print the working tree diff instead of the file list
        #[arg(long)]
        diff: bool,

        /// With --diff, show staged changes
        #[arg(long, requires = "diff")]
        staged: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConductorConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    // Logs go to stderr; stdout carries tool responses
    let log_level = if cli.verbose { "debug" } else { config.tracing_level() };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("conductor={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Serve => run_serve(&config).await?,
        Commands::CreateTask {
            project_id,
            task_title,
            prefill,
            task_id,
            chat,
            poll_interval,
            listen_seconds,
        } => {
            let options = TaskOptions {
                task_title,
                prefill,
                task_id,
                chat,
                poll_interval: secs(poll_interval, "--poll-interval")?,
                listen: secs(listen_seconds, "--listen-seconds")?,
            };
            run_create_task(&config, project_id, options).await?;
        }
        Commands::ListProjects => list_projects(&config).await?,
        Commands::Context { path, diff, staged } => show_context(path, diff, staged).await?,
    }

    Ok(())
}

fn secs(value: f64, flag: &str) -> Result<Duration> {
    Duration::try_from_secs_f64(value).with_context(|| format!("Invalid {}: {}", flag, value))
}

async fn run_serve(config: &ConductorConfig) -> Result<()> {
    let runtime = Arc::new(ConductorRuntime::from_config(config).await?);

    let starter = runtime.clone();
    let connecting = tokio::spawn(async move {
        if let Err(e) = starter.start().await {
            tracing::warn!(error = %e, "Bridge did not start");
        }
    });

    tracing::info!("Serving tools on stdio. Press Ctrl+C to stop.");
    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    let result = tokio::select! {
        result = stdio::serve(&runtime.tools, stdin, stdout) => result.map_err(anyhow::Error::from),
        signal = tokio::signal::ctrl_c() => signal.map_err(anyhow::Error::from),
    };

    tracing::info!("Shutting down...");
    runtime.stop().await;
    let _ = connecting.await;
    result
}

struct TaskOptions {
    task_title: String,
    prefill: Option<String>,
    task_id: Option<String>,
    chat: bool,
    poll_interval: Duration,
    listen: Duration,
}

async fn run_create_task(
    config: &ConductorConfig,
    project_id: Option<String>,
    options: TaskOptions,
) -> Result<()> {
    let project_id = match project_id.filter(|id| !id.is_empty()) {
        Some(id) => id,
        None => {
            let backend = BackendApiClient::new(config)?;
            let projects = backend.list_projects().await?;
            let Some(first) = projects.into_iter().next() else {
                bail!("No projects found on the backend. Create one before running this command.");
            };
            println!(
                "Using project {} ({})",
                first.name.as_deref().unwrap_or(&first.id),
                first.id
            );
            first.id
        }
    };

    let runtime = ConductorRuntime::from_config(config).await?;
    runtime.start().await?;

    let result = drive_task(&runtime, project_id, options).await;
    runtime.stop().await;
    result
}

async fn drive_task(runtime: &ConductorRuntime, project_id: String, options: TaskOptions) -> Result<()> {
    let task_id = match options.task_id {
        Some(task_id) => {
            runtime
                .sessions
                .add_session(task_id.clone(), task_id.clone(), project_id)
                .await;
            println!("Reattached to task {}", task_id);
            task_id
        }
        None => {
            let created = runtime
                .tools
                .handle_request(
                    "create_task_session",
                    json!({
                        "project_id": project_id,
                        "task_title": options.task_title,
                        "prefill": options.prefill,
                    }),
                )
                .await?;
            println!("create_task_session result:");
            println!("{}", serde_json::to_string_pretty(&created)?);
            created["task_id"]
                .as_str()
                .context("create_task_session returned no task_id")?
                .to_string()
        }
    };

    if options.chat {
        chat(runtime, &task_id, options.poll_interval).await
    } else {
        listen(runtime, &task_id, options.listen, options.poll_interval).await
    }
}

/// Print and ack whatever is pending for the task
async fn drain(runtime: &ConductorRuntime, task_id: &str) -> Result<()> {
    let response = runtime
        .tools
        .handle_request("receive_messages", json!({"task_id": task_id}))
        .await?;
    let response: ReceiveMessagesResult = serde_json::from_value(response)?;

    for message in &response.messages {
        println!("[{}] {}: {}", message.role, message.message_id, message.content);
    }
    if let Some(ack_token) = response.next_ack_token {
        runtime
            .tools
            .handle_request("ack_messages", json!({"task_id": task_id, "ack_token": ack_token}))
            .await?;
    }
    Ok(())
}

async fn listen(
    runtime: &ConductorRuntime,
    task_id: &str,
    duration: Duration,
    poll_interval: Duration,
) -> Result<()> {
    println!("Listening for replies for up to {:.1}s...", duration.as_secs_f64());
    let deadline = tokio::time::Instant::now() + duration;
    while tokio::time::Instant::now() < deadline {
        drain(runtime, task_id).await?;
        tokio::time::sleep(poll_interval).await;
    }
    Ok(())
}

async fn chat(runtime: &ConductorRuntime, task_id: &str, poll_interval: Duration) -> Result<()> {
    println!("Chatting on task {}. Type exit, quit or :q to leave.", task_id);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut poll = tokio::time::interval(poll_interval.max(Duration::from_millis(10)));

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if matches!(line, "exit" | "quit" | ":q") {
                    break;
                }
                if line.is_empty() {
                    continue;
                }
                runtime
                    .tools
                    .handle_request("send_message", json!({"task_id": task_id, "content": line}))
                    .await?;
            }
            _ = poll.tick() => drain(runtime, task_id).await?,
        }
    }
    Ok(())
}

async fn list_projects(config: &ConductorConfig) -> Result<()> {
    let backend = BackendApiClient::new(config)?;
    let projects = backend.list_projects().await?;
    if projects.is_empty() {
        println!("No projects found.");
        return Ok(());
    }
    for project in projects {
        println!(
            "{}\t{}\t{}",
            project.id,
            project.name.as_deref().unwrap_or("-"),
            project.description.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

async fn show_context(path: Option<PathBuf>, diff: bool, staged: bool) -> Result<()> {
    let context = ProjectContext::new(path.as_deref())?;
    if diff {
        print!("{}", context.get_diff(staged).await?);
        return Ok(());
    }

    let guess = context.guess().await;
    match &guess.repo_root {
        Some(root) => println!("Repository: {}", root.display()),
        None => println!("Directory: {} (not a git repository)", guess.project_root.display()),
    }
    for file in context.list_files(true).await? {
        println!("{}", file.display());
    }
    Ok(())
}
