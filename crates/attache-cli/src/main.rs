use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use attache_runner::{
    AgentCli, JobRunner, MemoryContext, ReasonerDefaults, RunOutcome, StoreMaintenance,
};
use attache_store::{AttacheDb, OutboxStore, RunStateStore};
use attache_telegram::{ChatHistory, DeliveryEngine, MessageFormat, TelegramApi};

#[derive(Parser)]
#[command(name = "attache", about = "Personal assistant outbound delivery and job runner")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one background job by id, then exit
    RunJob {
        /// Job id from the job list
        job_id: Option<String>,
    },
    /// Deliver a message to a chat
    Send {
        /// Message text
        #[arg(short, long)]
        message: String,

        /// Destination chat (defaults to the owner chat)
        #[arg(long)]
        chat_id: Option<i64>,

        /// Send without rich formatting
        #[arg(long)]
        plain: bool,
    },
    /// Print configuration facts
    Health,
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::RunJob { job_id } => {
            let Some(job_id) = job_id else {
                eprintln!("usage: attache run-job <job-id>");
                std::process::exit(1);
            };
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run_job(job_id))?;
        }
        Commands::Send {
            message,
            chat_id,
            plain,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(send(message, chat_id, plain))?;
        }
        Commands::Health => health()?,
    }

    Ok(())
}

async fn run_job(job_id: String) -> anyhow::Result<()> {
    let config = attache_config::load_config()?;
    config.validate()?;

    let jobs = attache_config::load_jobs(&config.jobs_file)?;
    std::fs::create_dir_all(&config.data_dir)?;
    let db = Arc::new(AttacheDb::open(&config.data_dir.join("attache.db"))?);

    let runner = JobRunner {
        jobs,
        run_state: RunStateStore::new(config.data_dir.join("run-state.json")),
        outbox: OutboxStore::new(config.data_dir.join("outbox.json")),
        events: db.clone(),
        maintenance: Arc::new(StoreMaintenance::new(db.clone(), config.owner_chat_id)),
        context: Arc::new(MemoryContext::new(db.clone())),
        reasoner: Arc::new(AgentCli::new(&config.agent.program)),
        owner_chat_id: config.owner_chat_id,
        defaults: ReasonerDefaults {
            max_turns: config.agent.max_turns,
            timeout: Duration::from_millis(config.agent.timeout_ms),
        },
    };

    match runner.run(&job_id).await? {
        RunOutcome::Completed => tracing::info!(job_id = %job_id, "Run finished"),
        RunOutcome::Skipped => tracing::info!(job_id = %job_id, "Run skipped"),
        RunOutcome::NotFound => tracing::info!(job_id = %job_id, "Nothing to run"),
    }
    Ok(())
}

/// Chat-history adapter over the shared database.
struct DbHistory(Arc<AttacheDb>);

impl ChatHistory for DbHistory {
    fn record(&self, chat_id: i64, role: &str, text: &str) -> anyhow::Result<()> {
        self.0.log_message(chat_id, role, text)?;
        Ok(())
    }
}

async fn send(message: String, chat_id: Option<i64>, plain: bool) -> anyhow::Result<()> {
    let config = attache_config::load_config()?;
    config.validate()?;

    std::fs::create_dir_all(&config.data_dir)?;
    let db = Arc::new(AttacheDb::open(&config.data_dir.join("attache.db"))?);

    let chat_id = chat_id.unwrap_or(config.owner_chat_id);
    let format = if plain {
        Some(MessageFormat::Plain)
    } else {
        Some(MessageFormat::Rich)
    };

    let engine = DeliveryEngine::new(Arc::new(TelegramApi::new(&config.bot_token)), db.clone())
        .with_history(Arc::new(DbHistory(db)));

    if engine.deliver(chat_id, &message, format).await {
        println!("delivered");
        Ok(())
    } else {
        anyhow::bail!("delivery failed (see event log)")
    }
}

fn health() -> anyhow::Result<()> {
    let config = attache_config::load_config().unwrap_or_default();
    println!("attache is healthy");
    println!("  owner chat: {}", config.owner_chat_id);
    println!("  data dir: {}", config.data_dir.display());
    println!("  jobs file: {}", config.jobs_file.display());
    println!("  agent cli: {}", config.agent.program.display());
    Ok(())
}
