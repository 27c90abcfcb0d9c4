use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;
use clap::Parser;
use tracing::{Instrument, error, info, info_span, warn};

use mail_triage::config::{AppConfig, Cli, LogFormat};
use mail_triage::error::Error;
use mail_triage::llm::{Classifier, create_provider};
use mail_triage::mailstore::ImapStore;
use mail_triage::pipeline::notify::LogNotifier;
use mail_triage::pipeline::processor::MessageProcessor;
use mail_triage::pipeline::rules::PriorityRules;
use mail_triage::pipeline::runner;
use mail_triage::pipeline::types::RunSummary;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    // Install rustls crypto provider before any TLS usage
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        warn!("A rustls crypto provider was already installed");
    }

    let config = match cli.into_config(chrono::Local::now().date_naive()) {
        Ok(config) => config,
        Err(e) => {
            error!(component = "config", error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let run_id = uuid::Uuid::new_v4();
    let span = info_span!("run", %run_id);
    match triage(config).instrument(span).await {
        Ok(summary) if summary.is_clean() => ExitCode::SUCCESS,
        Ok(summary) => {
            if let Err(e) = summary.into_result() {
                error!(component = "pipeline", error = %e, "Run finished with failures");
            }
            ExitCode::FAILURE
        }
        Err(e) => {
            let component = e
                .downcast_ref::<Error>()
                .map(Error::component)
                .unwrap_or("main");
            error!(component, error = %format!("{e:#}"), "Run failed");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn triage(config: AppConfig) -> anyhow::Result<RunSummary> {
    info!(
        host = %config.mail.host,
        mailbox = %config.mail.mailbox,
        model = %config.llm.model,
        filter = %config.run.filter.to_imap_query(),
        dry_run = config.run.dry_run,
        "Starting mail triage"
    );

    let llm = create_provider(&config.llm).map_err(Error::from)?;
    let rules = PriorityRules::new(&config.routing.priority_senders, &config.routing.keywords)
        .context("invalid keyword rule")?;
    let processor = Arc::new(
        MessageProcessor::new(
            Classifier::new(llm),
            rules,
            config.routing.clone(),
            Arc::new(LogNotifier),
        )
        .with_batch_limit(config.run.batch_limit)
        .with_span(info_span!(
            "processor",
            component = "processor",
            model = %config.llm.model
        )),
    );

    let mail = config.mail.clone();
    let store = tokio::task::spawn_blocking(move || ImapStore::connect(&mail))
        .await
        .context("connect task failed")?
        .map_err(Error::from)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let signal_flag = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing current message");
            signal_flag.store(true, Ordering::Relaxed);
        }
    });

    let summary = runner::run(store, processor, config.run.clone(), shutdown).await?;
    report(&summary, config.json)?;
    Ok(summary)
}

/// Print decisions and a summary line on stdout.
fn report(summary: &RunSummary, json: bool) -> anyhow::Result<()> {
    if json {
        for decision in &summary.decisions {
            println!("{}", serde_json::to_string(decision)?);
        }
        let totals = serde_json::json!({
            "matched": summary.matched,
            "processed": summary.processed,
            "moved": summary.moved,
            "failed": summary.failures.len(),
            "cancelled": summary.cancelled,
            "dry_run": summary.dry_run,
        });
        println!("{totals}");
        return Ok(());
    }

    if summary.matched == 0 {
        println!("No emails found.");
        return Ok(());
    }

    let verb = if summary.dry_run { "Would move" } else { "Moving" };
    for decision in &summary.decisions {
        println!(
            "{verb} email {:?} to folder: {}",
            decision.subject, decision.folder
        );
    }
    println!(
        "Processed {} of {} matched, moved {}, {} failed{}",
        summary.processed,
        summary.matched,
        summary.moved,
        summary.failures.len(),
        if summary.cancelled { " (interrupted)" } else { "" }
    );
    Ok(())
}
