//! agentrun - CLI entry point
//!
//! Submits runs, streams their events to the terminal and records them to
//! the run history.

use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use colored::*;
use eyre::{Context, Result, bail};
use tracing::{debug, info, warn};

use agentrun::cli::{Cli, Command, OutputFormat, get_log_path};
use agentrun::config::Config;
use agentrun::consumer::{Applied, RunController, RunState, Update};
use agentrun::domain::{Run, RunRequest, RunStatus};
use agentrun::events::{EventKind, StreamEvent};
use agentrun::history::RunHistory;
use agentrun::transport::create_transport;

/// Arguments of `ar run` after parsing
struct RunOptions {
    request: RunRequest,
    files: Vec<PathBuf>,
    format: OutputFormat,
    no_history: bool,
}

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_path = get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    setup_logging(cli.log_level.as_deref(), config.log_level.as_deref()).context("Failed to setup logging")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Some(Command::Run {
            agent,
            instructions,
            files,
            links,
            notes,
            integrations,
            mode,
            format,
            no_history,
        }) => {
            debug!(%agent, files = files.len(), ?format, no_history, "main: matched Run command");
            let mut request = RunRequest::new(agent, instructions)
                .with_links(links)
                .with_integrations(integrations);
            if let Some(notes) = notes {
                request = request.with_notes(notes);
            }
            if let Some(mode) = mode {
                request = request.with_mode(mode);
            }
            let options = RunOptions {
                request,
                files,
                format,
                no_history,
            };
            cmd_run(&config, options).await
        }
        Some(Command::Upload { path, format }) => {
            debug!(?path, ?format, "main: matched Upload command");
            cmd_upload(&config, &path, format).await
        }
        Some(Command::History { run_id, format }) => {
            debug!(?run_id, ?format, "main: matched History command");
            cmd_history(&config, run_id.as_deref(), format)
        }
        None => {
            debug!("main: no command");
            println!("No command given. Try `ar run --instructions <text>` or `ar --help`.");
            Ok(())
        }
    }
}

async fn cmd_run(config: &Config, options: RunOptions) -> Result<()> {
    debug!(agent_id = %options.request.agent_id, "cmd_run: called");
    let RunOptions {
        mut request,
        files,
        format,
        no_history,
    } = options;

    let transport = create_transport(config).context("Failed to create transport")?;
    let mut controller = RunController::with_capacity(transport, config.api.channel_capacity);

    // Inputs are uploaded before submission so the request can reference them
    let mut file_ids = Vec::with_capacity(files.len());
    for path in &files {
        let uploaded = controller
            .upload(path)
            .await
            .context(format!("Failed to upload {}", path.display()))?;
        if format == OutputFormat::Text {
            println!("{} Uploaded {} as {}", "✓".green(), uploaded.name, uploaded.file_id.cyan());
        }
        file_ids.push(uploaded.file_id);
    }
    request = request.with_files(file_ids);

    let run_id = controller
        .start(request)
        .await
        .context("Failed to submit run")?
        .run()
        .run_id
        .clone();

    if format == OutputFormat::Text {
        println!(
            "Run {} started ({})",
            run_id.cyan(),
            controller.transport_name().dimmed()
        );
    }

    let mut history = if config.history.enabled && !no_history {
        Some(RunHistory::new(&config.history.runs_dir))
    } else {
        None
    };

    loop {
        tokio::select! {
            update = controller.next_update() => {
                let Some(update) = update else {
                    break;
                };
                match update {
                    Update::Event { event, applied } => {
                        if applied == Applied::Ignored {
                            continue;
                        }
                        if let Some(history) = history.as_mut() {
                            if let Err(e) = history.record(&run_id, &event) {
                                warn!(%run_id, error = %e, "cmd_run: failed to record event");
                            }
                        }
                        print_event(&event, format)?;
                    }
                    Update::ConnectionFailed(message) => {
                        if format == OutputFormat::Text {
                            eprintln!("{} Connection lost: {}", "✗".red(), message);
                        }
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!(%run_id, "cmd_run: interrupted, stopping run");
                controller.stop();
                if format == OutputFormat::Text {
                    eprintln!("{} Interrupted", "✗".yellow());
                }
                break;
            }
        }
    }

    let Some(state) = controller.state() else {
        bail!("Run {} has no state", run_id);
    };

    if let Some(history) = history.as_mut() {
        if let Err(e) = history.write_snapshot(state.run()) {
            warn!(%run_id, error = %e, "cmd_run: failed to write run snapshot");
        }
    }

    print_final(state, format)?;

    if let Some(message) = state.connection_error() {
        bail!("Run {} lost its event stream: {}", run_id, message);
    }
    match state.run().status {
        RunStatus::Failed => bail!(
            "Run {} failed: {}",
            run_id,
            state.run().error.as_deref().unwrap_or("unknown error")
        ),
        RunStatus::Cancelled => bail!("Run {} was cancelled", run_id),
        _ => Ok(()),
    }
}

async fn cmd_upload(config: &Config, path: &Path, format: OutputFormat) -> Result<()> {
    debug!(?path, ?format, "cmd_upload: called");
    let transport = create_transport(config).context("Failed to create transport")?;
    let uploaded = transport
        .upload(path)
        .await
        .context(format!("Failed to upload {}", path.display()))?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&uploaded)?),
        OutputFormat::Text => {
            println!("{} Uploaded {}", "✓".green(), uploaded.name);
            println!("  File ID:      {}", uploaded.file_id.cyan());
            println!("  Size:         {} bytes", uploaded.size);
            println!("  Content type: {}", uploaded.content_type);
        }
    }
    Ok(())
}

fn cmd_history(config: &Config, run_id: Option<&str>, format: OutputFormat) -> Result<()> {
    debug!(?run_id, ?format, "cmd_history: called");
    let history = RunHistory::new(&config.history.runs_dir);

    let Some(run_id) = run_id else {
        let runs = history.list_runs().context("Failed to list runs")?;
        let snapshots: Vec<(String, Option<Run>)> = runs
            .into_iter()
            .map(|id| {
                let snapshot = history.read_snapshot(&id).unwrap_or_else(|e| {
                    warn!(run_id = %id, error = %e, "cmd_history: unreadable snapshot");
                    None
                });
                (id, snapshot)
            })
            .collect();

        match format {
            OutputFormat::Json => {
                let list: Vec<serde_json::Value> = snapshots
                    .iter()
                    .map(|(id, run)| serde_json::json!({ "run_id": id, "run": run }))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&list)?);
            }
            OutputFormat::Text => {
                if snapshots.is_empty() {
                    println!("No recorded runs in {}", history.runs_dir().display());
                }
                for (id, run) in &snapshots {
                    match run {
                        Some(run) => println!(
                            "{}  {:<10} {}",
                            id.cyan(),
                            colored_status(run.status),
                            run.request.instructions.dimmed()
                        ),
                        None => println!("{}  {}", id.cyan(), "(no snapshot)".dimmed()),
                    }
                }
            }
        }
        return Ok(());
    };

    let entries = history.read_events(run_id).context("Failed to read run history")?;
    let snapshot = history.read_snapshot(run_id).context("Failed to read run snapshot")?;
    if entries.is_empty() && snapshot.is_none() {
        bail!("No history for run {}", run_id);
    }

    for entry in &entries {
        if format == OutputFormat::Text {
            print!("{} ", entry.timestamp.format("%H:%M:%S").to_string().dimmed());
        }
        print_event(&entry.event, format)?;
    }
    if let Some(run) = snapshot {
        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string(&run)?),
            OutputFormat::Text => println!("Status: {}", colored_status(run.status)),
        }
    }
    Ok(())
}

fn colored_status(status: RunStatus) -> ColoredString {
    let text = status.to_string();
    match status {
        RunStatus::Completed => text.green(),
        RunStatus::Failed => text.red(),
        RunStatus::Cancelled => text.yellow(),
        RunStatus::Pending | RunStatus::Running => text.normal(),
    }
}

fn print_event(event: &StreamEvent, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string(event)?);
        return Ok(());
    }

    match &event.kind {
        EventKind::Log { message } => println!("{} {}", "[log]".dimmed(), message),
        EventKind::Output { content } => println!("{}", content.trim_end()),
        EventKind::Progress { progress, message } => {
            let label = format!("[{:>3}%]", progress).cyan();
            match message {
                Some(message) => println!("{} {}", label, message),
                None => println!("{}", label),
            }
        }
        EventKind::Error { error } => println!("{} {}", "[error]".red(), error),
        EventKind::Complete { result } => {
            println!("{} {}", "[complete]".green(), result.summary);
            for artifact in &result.artifacts {
                println!("  - {} ({}, {} bytes)", artifact.name, artifact.kind, artifact.size);
            }
        }
    }
    Ok(())
}

fn print_final(state: &RunState, format: OutputFormat) -> Result<()> {
    let run = state.run();
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(run)?),
        OutputFormat::Text => {
            println!();
            println!("Run {}: {}", run.run_id.cyan(), colored_status(run.status));
            println!("  Progress: {}%", run.progress);
            if let Some(duration) = run.duration() {
                println!("  Duration: {:.1}s", duration.num_milliseconds() as f64 / 1000.0);
            }
            if let Some(summary) = &run.result_summary {
                println!("  Summary:  {}", summary);
            }
            if let Some(artifacts) = &run.artifacts {
                println!("  Artifacts: {}", artifacts.len());
            }
            if let Some(error) = &run.error {
                println!("  Error:    {}", error.red());
            }
        }
    }
    Ok(())
}
