//! Database Backup/Restore Tool
//!
//! Provides CLI interface for encrypted MySQL backups and restores

// dumpvault/src/main.rs
use anyhow::{Context, Result};
use dumpvault::backup::catalog::BackupArchive;
use dumpvault::config::{self, AppConfig};
use dumpvault::events::{BackupEvent, EVENT_CHANNEL_CAPACITY, EventSink, Operation};
use dumpvault::orchestrator::BackupOrchestrator;
use std::env;
use std::io::{Write, stdin, stdout};
use std::path::PathBuf;
use std::process::ExitCode;

/// Main entry point for the backup/restore tool
#[tokio::main]
async fn main() -> ExitCode {
    match run_app().await {
        Ok(_) => {
            println!("✅ Operation completed successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_app() -> Result<()> {
    dotenv::dotenv().ok();
    // Progress is printed from the event stream; the log facade only adds
    // warnings and errors on stderr unless RUST_LOG asks for more.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = env::args().collect();
    let choice = if args.len() > 1 {
        args[1].trim().to_string()
    } else {
        prompt_choice().await?
    };
    if !matches!(
        choice.as_str(),
        "1" | "backup" | "2" | "restore" | "3" | "list"
    ) {
        println!("❌ Invalid choice. Please enter '1' (backup), '2' (restore), or '3' (list).");
        anyhow::bail!("Invalid operation choice");
    }

    let config_path = config::config_path();
    let app_config = AppConfig::load_from_json(&config_path).context(format!(
        "Failed to load application configuration from {}",
        config_path.display()
    ))?;

    let (events, mut rx) = EventSink::channel(EVENT_CHANNEL_CAPACITY);
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let BackupEvent::Log(line) = event {
                println!("{line}");
            }
        }
    });
    let orchestrator = BackupOrchestrator::new(app_config.settings, events);

    let result = run_choice(&choice, &orchestrator, &args).await;

    // Flush the remaining log lines before reporting the outcome.
    drop(orchestrator);
    printer.await.context("Event printer stopped unexpectedly")?;
    result
}

async fn run_choice(
    choice: &str,
    orchestrator: &BackupOrchestrator,
    args: &[String],
) -> Result<()> {
    match choice {
        "1" | "backup" => {
            println!("🚀 Starting Backup Process...");
            orchestrator.validate_configuration(Operation::Backup).await;
            let report = orchestrator
                .create_backup()?
                .await
                .context("Backup task aborted")?
                .context("Backup process failed")?;
            println!("📦 {}", report.archive.path.display());
        }
        "2" | "restore" => {
            let archive = match args.get(2) {
                Some(path) => PathBuf::from(path),
                None => prompt_archive(&orchestrator.list_archives()?).await?,
            };
            let password = prompt_line("Enter backup password: ").await?;
            println!(
                "⚠️ This will overwrite database data with the contents of {}.",
                archive.display()
            );
            let confirm = prompt_line("Type 'yes' to continue: ").await?;
            if !confirm.eq_ignore_ascii_case("yes") {
                anyhow::bail!("Restore cancelled by user");
            }

            println!("🔄 Starting Restore Process...");
            orchestrator.validate_configuration(Operation::Restore).await;
            orchestrator
                .restore_backup(archive, password)?
                .await
                .context("Restore task aborted")?
                .context("Restore process failed")?;
        }
        "3" | "list" => {
            let archives = orchestrator.list_archives()?;
            if archives.is_empty() {
                println!(
                    "No backups found in {}",
                    orchestrator.settings().backup_dir.display()
                );
            }
            for archive in &archives {
                println!("{}", archive.describe());
            }
        }
        other => anyhow::bail!("Invalid operation choice: {other}"),
    }
    Ok(())
}

/// Prompts user to select backup, restore or list
///
/// Returns the user's choice as String
async fn prompt_choice() -> Result<String> {
    println!("Select an operation:");
    println!("1. Take Backup (or type 'backup')");
    println!("2. Restore Backup (or type 'restore')");
    println!("3. List Backups (or type 'list')");
    prompt_line("Enter your choice: ").await
}

async fn prompt_archive(archives: &[BackupArchive]) -> Result<PathBuf> {
    if archives.is_empty() {
        anyhow::bail!("No backups available to restore");
    }
    println!("Available backups:");
    for (i, archive) in archives.iter().enumerate() {
        println!("{}. {}", i + 1, archive.describe());
    }
    let input = prompt_line("Select a backup: ").await?;
    let index: usize = input
        .parse()
        .context(format!("Invalid selection: {input}"))?;
    archives
        .get(index.wrapping_sub(1))
        .map(|a| a.path.clone())
        .ok_or_else(|| anyhow::anyhow!("Selection out of range: {index}"))
}

/// Reads one line on the blocking pool so the runtime keeps printing events.
async fn prompt_line(prompt: &str) -> Result<String> {
    print!("{prompt}");
    stdout().flush().context("Failed to flush stdout")?;

    let input = tokio::task::spawn_blocking(|| {
        let mut input = String::new();
        stdin().read_line(&mut input).map(|_| input)
    })
    .await
    .context("Input reader stopped unexpectedly")?
    .context("Failed to read user input")?;
    Ok(input.trim().to_string())
}
