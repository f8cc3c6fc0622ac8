use std::path::PathBuf;

use clap::{Parser, Subcommand};

use mednews::app::App;
use mednews::config::Config;
use mednews::error::Result;
use mednews::models::ReviewDecision;
use mednews::pipeline::BatchSummary;

#[derive(Parser)]
#[command(name = "mednews")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Research, draft, review and publish medical news articles")]
struct Cli {
    /// Config file (defaults to <config dir>/mednews/config.toml)
    #[arg(long, env = "MEDNEWS_CONFIG")]
    config: Option<PathBuf>,

    /// Show info-level logs
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Queue a headline for processing
    Add {
        text: String,

        /// 1 (urgent) to 6 (low)
        #[arg(short, long)]
        priority: Option<u8>,

        #[arg(short, long)]
        category: Option<String>,
    },

    /// Queue every line of a text file as a headline
    Import { path: PathBuf },

    /// List headlines and articles awaiting review
    List {
        #[arg(short, long, default_value = "50")]
        limit: u32,
    },

    /// Process pending headlines
    Process {
        /// Number of headlines (defaults to batch_size)
        #[arg(short, long)]
        batch: Option<u32>,

        /// Only run when auto_process is enabled
        #[arg(long)]
        scheduled: bool,
    },

    /// Process one pending headline
    ProcessOne { headline: i64 },

    /// Requeue and process failed headlines
    Retry {
        #[arg(short, long, default_value = "10")]
        limit: u32,
    },

    /// Delete old finished headlines and rejected articles
    Cleanup {
        #[arg(short, long)]
        days: Option<i64>,
    },

    /// Apply an editorial decision: approve, reject, publish or request_changes
    Review {
        article: i64,
        decision: ReviewDecision,

        #[arg(short, long)]
        notes: Option<String>,

        #[arg(short, long)]
        reviewer: Option<String>,
    },

    /// Show an article as it would be published
    Preview {
        article: i64,

        #[arg(short, long, default_value = "100")]
        width: usize,
    },

    /// Processing and review statistics
    Stats {
        #[arg(short, long, default_value = "30")]
        days: i64,
    },

    /// Test API connections
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Only show warnings and errors unless asked for more
    let level = if cli.verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let app = App::new(config).await?;

    match cli.command {
        Commands::Add {
            text,
            priority,
            category,
        } => {
            let id = app.add_headline(&text, priority, category.as_deref()).await?;
            println!("Queued headline {}", id);
        }
        Commands::Import { path } => {
            let report = app.import_file(&path).await?;
            for (line, reason) in &report.skipped {
                println!("  line {}: {}", line, reason);
            }
            println!("{}", report.message());
        }
        Commands::List { limit } => {
            for headline in app.list_headlines(limit).await? {
                println!(
                    "{:>5}  {:<10}  p{}  {}",
                    headline.id, headline.status.as_str(), headline.priority, headline.text
                );
            }
            let queue = app.review_queue(limit).await?;
            if !queue.is_empty() {
                println!("\nAwaiting review:");
                for item in queue {
                    println!(
                        "{:>5}  {:<12}  q{}  {}",
                        item.article.id,
                        item.article.status.as_str(),
                        item.article.quality_score.map_or("-".to_string(), |q| q.to_string()),
                        item.headline
                    );
                }
            }
        }
        Commands::Process { batch, scheduled } => {
            let summary = if scheduled {
                app.process_scheduled().await
            } else {
                Some(app.process(batch).await)
            };
            match summary {
                Some(summary) => print_summary(&summary),
                None => println!("Automatic processing is disabled"),
            }
        }
        Commands::ProcessOne { headline } => {
            let outcome = app.process_one(headline).await;
            println!("{}", outcome.message);
        }
        Commands::Retry { limit } => print_summary(&app.retry(limit).await),
        Commands::Cleanup { days } => {
            let report = app.cleanup(days).await?;
            println!(
                "Deleted {} headlines and {} rejected articles",
                report.headlines, report.rejected_articles
            );
        }
        Commands::Review {
            article,
            decision,
            notes,
            reviewer,
        } => {
            let outcome = app.review(article, decision, notes, reviewer).await?;
            println!("{}", outcome.message);
            if let Some(url) = outcome.permalink {
                println!("{}", url);
            }
        }
        Commands::Preview { article, width } => {
            println!("{}", app.preview(article, width).await?);
        }
        Commands::Stats { days } => {
            let (processing, workflow) = app.stats(days).await?;
            println!("Last {} days", days);
            println!("  headlines processed   {}", processing.headlines_processed);
            println!("  articles generated    {}", processing.articles_generated);
            println!("  articles published    {}", processing.articles_published);
            println!("  success rate          {:.1}%", processing.success_rate);
            println!("  avg processing time   {:.1}s", processing.avg_processing_time);
            println!("  tokens used           {}", processing.total_tokens_used);
            println!("  pending review        {}", workflow.articles_pending_review);
            println!("  approved              {}", workflow.articles_approved);
            println!("  rejected              {}", workflow.articles_rejected);
            println!("  avg review time       {:.0} min", workflow.avg_review_minutes);
        }
        Commands::Check => {
            for check in app.check_connections().await {
                let mark = if check.ok { "ok" } else { "FAILED" };
                println!("{:<12} {:<7} {}", check.service, mark, check.detail);
            }
        }
    }

    Ok(())
}

fn print_summary(summary: &BatchSummary) {
    for item in &summary.items {
        println!("  #{} {}", item.headline_id, item.message);
    }
    println!("{}", summary.message());
}
