//! quota-post - Run one tick of the quota-governed publishing pipeline

use anyhow::{Context, Result};
use clap::Parser;
use libquotacast::config::{resolve_config_path, Config};
use libquotacast::generator::command::CommandGenerator;
use libquotacast::generator::fallback::FallbackGenerator;
use libquotacast::generator::ContentGenerator;
use libquotacast::logging::{LogFormat, LoggingConfig};
use libquotacast::transport::command::CommandTransport;
use libquotacast::{QuotacastError, RunController};
use std::path::PathBuf;
use tracing::{error, info};

/// Exit status when nothing can be posted in this configuration
const EXIT_SKIPPED: i32 = 3;

#[derive(Parser, Debug)]
#[command(name = "quota-post")]
#[command(version, about = "Generate, score and publish at most one post within quota")]
#[command(long_about = r#"Generate, score and publish at most one post within quota.

Each invocation is one scheduled tick: the usage ledger is loaded and rolled
over, the daily and monthly quota is checked, one candidate is generated (or
taken from the built-in fallback list), filtered by quality and duplicates,
and sent through the transport command. Successful posts are recorded in the
ledger.

EXAMPLES:
    # One tick with commands from the config file
    quota-post

    # Inspect remaining quota without posting
    quota-post --check-quota

    # Override the transport for this run
    quota-post --transport-cmd 'toot post'

    # JSON summary for schedulers
    quota-post --format json | jq .outcome.status

TRANSPORT COMMAND:
    Receives the post text on stdin and prints the published id on stdout.
    Exit code 2 means the credentials were refused. Any other failure whose
    stderr mentions "rate limit" is retried after the cooldown.

EXIT CODES:
    0 - Post published
    1 - Failure (transport errors exhausted, timeout, unreadable ledger)
    2 - Transport refused the credentials
    3 - Nothing posted (quota exhausted, low quality, duplicate, busy,
        no transport configured)
"#)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, value_name = "PATH", env = "QUOTACAST_CONFIG")]
    config: Option<PathBuf>,

    /// Print the remaining quota and exit without posting
    #[arg(long)]
    check_quota: bool,

    /// Output format for the run summary
    #[arg(short, long, default_value = "text", value_name = "FORMAT")]
    #[arg(value_parser = ["text", "json"])]
    format: String,

    /// Command that writes post text to stdout
    #[arg(long, value_name = "CMD")]
    generator_cmd: Option<String>,

    /// Command that publishes post text read from stdin
    #[arg(long, value_name = "CMD")]
    transport_cmd: Option<String>,

    /// Log format (text, json, pretty)
    #[arg(long, value_name = "FORMAT", env = "QUOTACAST_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut logging = LoggingConfig::from_env();
    logging.format = cli.log_format;
    logging.verbose = cli.verbose;
    logging.init();

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            let code = e
                .downcast_ref::<QuotacastError>()
                .map(QuotacastError::exit_code)
                .unwrap_or(1);
            std::process::exit(code);
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    let config_path = match cli.config {
        Some(path) => path,
        None => resolve_config_path()?,
    };
    let mut config = Config::load_or_default(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    if let Some(cmd) = cli.generator_cmd {
        config.generator.command = Some(cmd);
    }
    if let Some(cmd) = cli.transport_cmd {
        config.transport.command = Some(cmd);
    }

    if cli.check_quota {
        return print_quota(&config, &cli.format);
    }

    let Some(transport_cmd) = config.transport.command.clone() else {
        error!("No transport command configured; set [transport].command or --transport-cmd");
        return Err(QuotacastError::InvalidInput(
            "no transport command configured; set [transport].command or --transport-cmd".to_string(),
        )
        .into());
    };
    let transport = CommandTransport::new(transport_cmd);

    let generator: Box<dyn ContentGenerator> = match &config.generator.command {
        Some(cmd) => Box::new(CommandGenerator::new(cmd.clone(), config.topic_catalog())),
        None => {
            info!("No generator command configured, using fallback content");
            Box::new(FallbackGenerator)
        }
    };

    let controller = RunController::new(&config, generator.as_ref(), &transport);
    let cancel = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };
    let report = controller.run_once_until(chrono::Local::now(), cancel).await;

    if cli.format == "json" {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report);
    }

    Ok(report.exit_code())
}

fn print_quota(config: &Config, format: &str) -> Result<i32> {
    let ledger = config.usage_ledger();
    let record = ledger.load(chrono::Local::now())?;
    let status = ledger.check_quota(&record);

    if format == "json" {
        let output = serde_json::json!({
            "allowed": status.allowed,
            "daily_remaining": status.daily_remaining,
            "monthly_remaining": status.monthly_remaining,
            "daily_count": record.daily_count,
            "monthly_count": record.monthly_count,
            "total_posts": record.total_posts,
            "last_post_at": record.last_post_at().map(|t| t.to_rfc3339()),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!(
            "Today ({}): {} posted, {} remaining",
            record.current_date, record.daily_count, status.daily_remaining
        );
        println!(
            "Month ({}): {} posted, {} remaining",
            record.current_month, record.monthly_count, status.monthly_remaining
        );
        println!("Total posts: {}", record.total_posts);
        if let Some(last) = record.last_post_at() {
            let ago = (chrono::Utc::now() - last).to_std().unwrap_or_default();
            let ago = std::time::Duration::from_secs(ago.as_secs());
            println!("Last post: {} ago", humantime::format_duration(ago));
        }
    }

    Ok(if status.allowed { 0 } else { EXIT_SKIPPED })
}
