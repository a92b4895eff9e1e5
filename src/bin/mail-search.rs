#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! CLI for searching personal and shared mailboxes over an IMAP bridge

use clap::{Parser, Subcommand};
use mailbox_search::{
    AccessReport, EmailRecord, ImapConfig, ImapProvider, MailSearch, SearchConfig, SearchQuery,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mail-search")]
#[command(about = "Search personal and shared mailboxes (read-only)")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Search subject and body text
    Search {
        /// Text to look for
        text: String,

        /// Only search the personal mailbox
        #[arg(long, conflicts_with = "shared_only")]
        personal_only: bool,

        /// Only search the shared mailbox
        #[arg(long)]
        shared_only: bool,

        /// Maximum number of results (default: MAX_SEARCH_RESULTS)
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Check which mailboxes are reachable
    CheckAccess,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = SearchConfig::from_env()?;
    let imap_config = ImapConfig::from_env()?;
    let mut engine = MailSearch::new(ImapProvider::new(imap_config), config);

    match &args.command {
        Command::Search {
            text,
            personal_only,
            shared_only,
            limit,
        } => {
            let mut query =
                SearchQuery::new(text.as_str(), limit.unwrap_or(engine.config().max_search_results));
            if *personal_only {
                query = query.personal_only();
            } else if *shared_only {
                query = query.shared_only();
            }
            cmd_search(&mut engine, &args, &query).await?;
        }
        Command::CheckAccess => {
            cmd_check_access(&mut engine, &args).await?;
        }
    }

    Ok(())
}

async fn cmd_search(
    engine: &mut MailSearch<ImapProvider>,
    args: &Args,
    query: &SearchQuery,
) -> anyhow::Result<()> {
    let records = engine.search(query).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else {
        print_record_table(&records);
    }

    Ok(())
}

async fn cmd_check_access(
    engine: &mut MailSearch<ImapProvider>,
    args: &Args,
) -> anyhow::Result<()> {
    let report = engine.check_access().await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_access_report(&report);
    }

    Ok(())
}

fn print_record_table(records: &[EmailRecord]) {
    if records.is_empty() {
        println!("No emails found.");
        return;
    }

    let header = format!(
        "{:<9} {:<17} {:<24} {:<30} {}",
        "Mailbox", "Received", "Folder", "From", "Subject"
    );
    println!("{header}");
    println!("{}", "-".repeat(110));

    for record in records {
        let received = record
            .received_time
            .map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M").to_string());
        let unread = if record.unread { "*" } else { "" };
        println!(
            "{:<9} {:<17} {:<24} {:<30} {}{}",
            record.mailbox_kind,
            received,
            truncate(&record.folder_name, 22),
            truncate(&record.sender_name, 28),
            unread,
            truncate(&record.subject, 40),
        );
    }

    println!("\n{} email(s)", records.len());
}

fn print_access_report(report: &AccessReport) {
    println!("Connected:        {}", yes_no(report.connected));
    println!(
        "Personal mailbox: {} ({})",
        yes_no(report.personal_accessible),
        report.personal_name.as_deref().unwrap_or("-")
    );
    if report.shared_configured {
        println!(
            "Shared mailbox:   {} ({})",
            yes_no(report.shared_accessible),
            report.shared_name.as_deref().unwrap_or("-")
        );
    } else {
        println!("Shared mailbox:   not configured");
    }
    println!(
        "Retention:        personal {} months, shared {} months",
        report.retention_personal_months, report.retention_shared_months
    );

    if !report.errors.is_empty() {
        println!("\n--- Errors ---");
        for e in &report.errors {
            println!("  {e}");
        }
    }
}

const fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}
