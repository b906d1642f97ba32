//! Command-line front end for the committee simulator
//!
//! # Usage
//!
//! ```bash
//! # Store briefing material, then run a meeting
//! policy-committee import --meeting 2024-09 --kind cpi --file cpi.md --report-month 2024-08
//! policy-committee run --meeting 2024-09
//!
//! # Import a directory of macro.md / nfp.md / cpi.md / taylor.md and rebuild everything
//! policy-committee run --meeting 2024-09 --materials ./briefing --refresh
//!
//! # Inspect results
//! policy-committee show --meeting 2024-09 --artifact statement
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use policy_committee::orchestrator::{import_material, ARTIFACTS};
use policy_committee::{PromptStore, RunStore};
use policy_committee::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Settings file (defaults to ./committee.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Store one briefing document for a meeting
    Import {
        /// Meeting identifier
        #[arg(long)]
        meeting: String,
        /// Material kind: macro, nfp, cpi or taylor
        #[arg(long)]
        kind: String,
        /// Markdown file to import
        #[arg(long)]
        file: PathBuf,
        /// Reporting month recorded with the material, e.g. 2024-08
        #[arg(long)]
        report_month: Option<String>,
    },
    /// Run (or resume) a meeting
    Run {
        /// Meeting identifier
        #[arg(long)]
        meeting: String,
        /// Regenerate every artifact
        #[arg(long, default_value_t = false)]
        refresh: bool,
        /// Directory holding macro.md, nfp.md, cpi.md and taylor.md to import first
        #[arg(long)]
        materials: Option<PathBuf>,
        /// Reporting month recorded with imported materials
        #[arg(long)]
        report_month: Option<String>,
    },
    /// Print the artifact table, or one artifact
    Show {
        /// Meeting identifier
        #[arg(long)]
        meeting: String,
        /// Artifact name, e.g. statement or votes
        #[arg(long)]
        artifact: Option<String>,
    },
    /// List stored meetings
    List,
    /// List the prompt templates in use
    Prompts,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let settings = Settings::load(args.config.as_deref())?;
    policy_committee::tracing_ext::init_tracing(&settings.logging);

    match args.command {
        Command::Import {
            meeting,
            kind,
            file,
            report_month,
        } => {
            let store = RunStore::from_settings(&settings.storage);
            let kind: SourceKind = kind.parse()?;
            let text = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            let entry = import_material(&store, &meeting, kind, &text, report_month.as_deref()).await?;
            println!("imported {} -> {} ({} bytes)", kind, entry.path, entry.bytes);
        }
        Command::Run {
            meeting,
            refresh,
            materials,
            report_month,
        } => {
            let orchestrator = Arc::new(MeetingOrchestrator::from_settings(&settings)?);
            if let Some(dir) = materials {
                import_dir(&orchestrator, &meeting, &dir, report_month.as_deref()).await?;
            }
            run_meeting(orchestrator, MeetingRequest::new(meeting).with_refresh(refresh)).await?;
        }
        Command::Show { meeting, artifact } => {
            let store = RunStore::from_settings(&settings.storage);
            let run = store.ensure_run(&meeting).await?;
            match artifact {
                Some(name) => {
                    let text = match run.read_text(&name).await? {
                        Some(text) => text,
                        None => match run.read_json::<serde_json::Value>(&name).await? {
                            Some(value) => serde_json::to_string_pretty(&value)?,
                            None => bail!("meeting {} has no artifact {}", meeting, name),
                        },
                    };
                    println!("{}", text.trim_end());
                }
                None => {
                    let manifest = run.manifest().await?;
                    println!("Meeting {} (updated {})", manifest.meeting_id, manifest.updated_at);
                    for (name, entry) in &manifest.artifacts {
                        println!("  {:<16} {:>8} bytes  {}", name, entry.bytes, entry.path);
                    }
                }
            }
        }
        Command::List => {
            let store = RunStore::from_settings(&settings.storage);
            for meeting in store.list_runs().await? {
                println!("{}", meeting);
            }
        }
        Command::Prompts => {
            let prompts = PromptStore::from_settings(&settings.storage)?;
            for name in prompts.names() {
                println!("{:<28} {}", name, prompts.identity(name)?);
            }
        }
    }

    Ok(())
}

async fn import_dir(
    orchestrator: &MeetingOrchestrator,
    meeting: &str,
    dir: &Path,
    report_month: Option<&str>,
) -> Result<()> {
    for kind in SourceKind::ALL {
        let path = dir.join(format!("{}.md", kind));
        if !tokio::fs::try_exists(&path).await? {
            println!("- {} not found, skipped", path.display());
            continue;
        }
        let text = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        orchestrator
            .import_material(meeting, kind, &text, report_month)
            .await?;
        println!("✓ imported {}", path.display());
    }
    Ok(())
}

async fn run_meeting(orchestrator: Arc<MeetingOrchestrator>, request: MeetingRequest) -> Result<()> {
    let registry = JobRegistry::new();
    let id = orchestrator.spawn_job(&registry, request);
    println!("=== Job {} ===\n", id);

    let mut printed = 0;
    let job = loop {
        let job = registry.get(id)?;
        for line in &job.logs[printed..] {
            println!("{}", line);
        }
        printed = job.logs.len();
        if job.status.is_finished() {
            break job;
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    };

    if job.status == JobStatus::Failed {
        bail!(
            "meeting run failed: {}",
            job.error.unwrap_or_else(|| "unknown error".to_string())
        );
    }

    let outcome: MeetingOutcome =
        serde_json::from_value(job.result.context("job finished without a result")?)?;
    println!(
        "\n=== Meeting {} ({}) ===",
        outcome.meeting_id,
        if outcome.cached { "cached" } else { "generated" }
    );
    println!("crisis_mode: {}", outcome.crisis_mode);
    println!(
        "vote: cut={} hold={} hike={} unknown={} ({})",
        outcome.tally.cut,
        outcome.tally.hold,
        outcome.tally.hike,
        outcome.tally.unknown,
        outcome.vote_summary
    );
    for name in ARTIFACTS {
        match outcome.artifacts.get(name) {
            Some(entry) => println!("  {:<16} {:>8} bytes  {}", name, entry.bytes, entry.path),
            None => println!("  {:<16} missing", name),
        }
    }
    Ok(())
}

