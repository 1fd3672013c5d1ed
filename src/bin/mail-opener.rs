#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! CLI for searching mailboxes by subject and opening matching mail

use anyhow::anyhow;
use clap::{Parser, Subcommand, ValueEnum};
use mail_opener::{
    AccountConfig, Disposition, HttpConfig, HttpFetcher, LinkPolicy, MailboxSession,
    MessageSummary, Presenter, RedirectMethod, RunOptions, RunReport, Runner, SearchStrategy,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mail-opener")]
#[command(about = "Search IMAP mailboxes by subject and open matching messages")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// List messages whose subject contains SUBJECT
    Search {
        subject: String,

        /// Maximum number of messages to show per account
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Count messages whose subject contains SUBJECT
    Count { subject: String },

    /// Check connectivity and which search strategies work
    Debug {
        /// Subject to try each search strategy with
        #[arg(long, default_value = "test")]
        subject: String,
    },

    /// Open matching messages one by one
    Start {
        subject: String,

        /// Number of messages to open per account
        #[arg(long, default_value = "1")]
        count: usize,

        /// Base pause between messages in seconds, jittered by ±50%
        #[arg(long, default_value = "10")]
        delay: f64,

        /// Percentage of messages whose links are followed
        #[arg(long, default_value = "0", value_parser = clap::value_parser!(u8).range(0..=100))]
        click_percentage: u8,

        /// Follow one random link among the first ten instead of all
        #[arg(long)]
        single_link: bool,

        /// What to do with a message once opened
        #[arg(long, value_enum, default_value = "delete")]
        disposition: DispositionArg,

        /// HTTP method used to follow link redirects
        #[arg(long, value_enum, default_value = "get")]
        redirect_method: RedirectArg,

        /// Directory to save rendered pages in
        #[arg(long)]
        output: Option<PathBuf>,

        /// Seed for every random choice, for reproducible runs
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum DispositionArg {
    Delete,
    MarkRead,
    Keep,
}

impl From<DispositionArg> for Disposition {
    fn from(arg: DispositionArg) -> Self {
        match arg {
            DispositionArg::Delete => Self::Delete,
            DispositionArg::MarkRead => Self::MarkRead,
            DispositionArg::Keep => Self::Keep,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum RedirectArg {
    Get,
    Head,
}

impl From<RedirectArg> for RedirectMethod {
    fn from(arg: RedirectArg) -> Self {
        match arg {
            RedirectArg::Get => Self::Get,
            RedirectArg::Head => Self::Head,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install rustls crypto provider"))?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let accounts = AccountConfig::all_from_env()?;

    match &args.command {
        Command::Search { subject, limit } => {
            cmd_search(&accounts, &args, subject, *limit).await?;
        }
        Command::Count { subject } => {
            cmd_count(&accounts, &args, subject).await?;
        }
        Command::Debug { subject } => {
            cmd_debug(&accounts, &args, subject).await?;
        }
        Command::Start {
            subject,
            count,
            delay,
            click_percentage,
            single_link,
            disposition,
            redirect_method,
            output,
            seed,
        } => {
            let options = RunOptions {
                subject: subject.clone(),
                count: *count,
                delay: Duration::try_from_secs_f64(*delay)
                    .map_err(|e| anyhow!("Invalid --delay {delay}: {e}"))?,
                click_percentage: *click_percentage,
                link_policy: if *single_link {
                    LinkPolicy::SingleRandom
                } else {
                    LinkPolicy::All
                },
                disposition: (*disposition).into(),
            };
            let fetcher = HttpFetcher::new(&HttpConfig::from_env()?, (*redirect_method).into())?;
            let presenter = Presenter::new(output.clone());
            let mut rng = seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
            cmd_start(&accounts, &args, &options, &fetcher, &presenter, &mut rng).await?;
        }
    }

    Ok(())
}

#[derive(Serialize)]
struct AccountSearch {
    account: String,
    strategy: Option<SearchStrategy>,
    total: usize,
    messages: Vec<MessageSummary>,
    error: Option<String>,
}

async fn search_account(
    config: &AccountConfig,
    subject: &str,
    limit: Option<usize>,
) -> AccountSearch {
    let mut result = AccountSearch {
        account: config.username.clone(),
        strategy: None,
        total: 0,
        messages: Vec::new(),
        error: None,
    };
    let mut session = match MailboxSession::open(config).await {
        Ok(session) => session,
        Err(e) => {
            error!(account = %config.username, error = %e, "Failed to open mailbox");
            result.error = Some(e.to_string());
            return result;
        }
    };

    let outcome = session.search_subject(subject).await;
    result.strategy = outcome.strategy;
    result.total = outcome.uids.len();
    if let Some(limit) = limit {
        let shown: Vec<u32> = outcome.uids.into_iter().take(limit).collect();
        result.messages = session.summaries(&shown).await;
    }
    session.logout().await;
    result
}

async fn cmd_search(
    accounts: &[AccountConfig],
    args: &Args,
    subject: &str,
    limit: usize,
) -> anyhow::Result<()> {
    let mut results = Vec::new();
    for config in accounts {
        results.push(search_account(config, subject, Some(limit)).await);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }
    for result in &results {
        println!("== {} ==", result.account);
        match &result.error {
            Some(e) => println!("Error: {e}"),
            None => print_message_table(&result.messages, result.total),
        }
        println!();
    }
    Ok(())
}

async fn cmd_count(accounts: &[AccountConfig], args: &Args, subject: &str) -> anyhow::Result<()> {
    let mut results = Vec::new();
    for config in accounts {
        results.push(search_account(config, subject, None).await);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }
    for result in &results {
        match &result.error {
            Some(e) => println!("{:<30} error: {e}", result.account),
            None => println!("{:<30} {}", result.account, result.total),
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct StrategyAttempt {
    strategy: SearchStrategy,
    hits: Option<usize>,
    error: Option<String>,
}

#[derive(Serialize)]
struct AccountDebug {
    account: String,
    host: String,
    port: u16,
    folders: Vec<String>,
    attempts: Vec<StrategyAttempt>,
    error: Option<String>,
}

async fn debug_account(config: &AccountConfig, subject: &str) -> AccountDebug {
    let mut report = AccountDebug {
        account: config.username.clone(),
        host: config.host.clone(),
        port: config.port,
        folders: Vec::new(),
        attempts: Vec::new(),
        error: None,
    };
    let mut session = match MailboxSession::open(config).await {
        Ok(session) => session,
        Err(e) => {
            report.error = Some(e.to_string());
            return report;
        }
    };

    match session.list_folders().await {
        Ok(folders) => report.folders = folders,
        Err(e) => report.error = Some(e.to_string()),
    }
    for strategy in SearchStrategy::DEFAULT_ORDER {
        let attempt = match strategy.run(&mut session, subject).await {
            Ok(uids) => StrategyAttempt {
                strategy,
                hits: Some(uids.len()),
                error: None,
            },
            Err(e) => StrategyAttempt {
                strategy,
                hits: None,
                error: Some(e.to_string()),
            },
        };
        report.attempts.push(attempt);
    }
    session.logout().await;
    report
}

async fn cmd_debug(accounts: &[AccountConfig], args: &Args, subject: &str) -> anyhow::Result<()> {
    let mut reports = Vec::new();
    for config in accounts {
        reports.push(debug_account(config, subject).await);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }
    for report in &reports {
        println!("== {} ({}:{}) ==", report.account, report.host, report.port);
        if let Some(e) = &report.error {
            println!("Error: {e}");
        }
        if !report.folders.is_empty() {
            println!("Folders: {}", report.folders.join(", "));
        }
        for attempt in &report.attempts {
            match (&attempt.hits, &attempt.error) {
                (Some(hits), _) => println!("  {:<22} {hits} hit(s)", attempt.strategy.name()),
                (None, Some(e)) => println!("  {:<22} failed: {e}", attempt.strategy.name()),
                (None, None) => {}
            }
        }
        println!();
    }
    Ok(())
}

#[derive(Serialize)]
struct AccountRun {
    account: String,
    report: Option<RunReport>,
    error: Option<String>,
}

async fn cmd_start(
    accounts: &[AccountConfig],
    args: &Args,
    options: &RunOptions,
    fetcher: &HttpFetcher,
    presenter: &Presenter,
    rng: &mut StdRng,
) -> anyhow::Result<()> {
    let mut runs = Vec::new();
    for config in accounts {
        let account = config.username.clone();
        let mut session = match MailboxSession::open(config).await {
            Ok(session) => session,
            Err(e) => {
                error!(%account, error = %e, "Failed to open mailbox, skipping account");
                runs.push(AccountRun {
                    account,
                    report: None,
                    error: Some(e.to_string()),
                });
                continue;
            }
        };

        let report = Runner::new(account.clone(), &mut session, fetcher, presenter)
            .run(options, rng)
            .await;
        session.logout().await;
        info!(%account, opened = report.opened(), requested = report.requested, "Run finished");
        runs.push(AccountRun {
            account,
            report: Some(report),
            error: None,
        });
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&runs)?);
        return Ok(());
    }
    for run in &runs {
        println!("== {} ==", run.account);
        match (&run.report, &run.error) {
            (Some(report), _) => print_run_report(report),
            (None, Some(e)) => println!("Error: {e}"),
            (None, None) => {}
        }
        println!();
    }
    Ok(())
}

fn print_message_table(messages: &[MessageSummary], total: usize) {
    if messages.is_empty() {
        println!("No messages found.");
        return;
    }

    let header = format!("{:<8} {:<20} {:<30} {}", "UID", "Date", "From", "Subject");
    println!("{header}");
    println!("{}", "-".repeat(100));

    for message in messages {
        println!(
            "{:<8} {:<20} {:<30} {}",
            message.uid,
            message
                .date
                .map_or_else(|| "-".to_string(), |d| d.format("%Y-%m-%d %H:%M").to_string()),
            truncate(&message.from, 28),
            truncate(&message.subject, 40),
        );
    }

    println!("\n{} of {total} message(s)", messages.len());
}

fn print_run_report(report: &RunReport) {
    for outcome in &report.outcomes {
        let subject = outcome.subject.as_deref().unwrap_or("-");
        match &outcome.error {
            Some(e) => println!("#{:<3} UID {:<8} failed: {e}", outcome.iteration + 1, outcome.uid),
            None => {
                let stats = outcome.stats.unwrap_or_default();
                println!(
                    "#{:<3} UID {:<8} {:<40} images {} links {}{}",
                    outcome.iteration + 1,
                    outcome.uid,
                    truncate(subject, 38),
                    stats.images_inlined,
                    stats.links_resolved,
                    if outcome.disposed { "" } else { " (not disposed)" },
                );
            }
        }
        if let Some(page) = &outcome.page {
            println!("     saved to {}", page.display());
        }
    }
    println!(
        "\nOpened {} of {} requested{}",
        report.opened(),
        report.requested,
        if report.stopped_early {
            ", no more matching messages"
        } else {
            ""
        }
    );
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}
