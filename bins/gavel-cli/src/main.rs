mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use gavel_engine::{DispatchMode, ValidationOptions, ValidationPolicy};
use std::path::PathBuf;
use tracing::error;

#[derive(Parser)]
#[command(name = "gavel")]
#[command(about = "Gavel - Validate problem candidates against a Judge0 deployment", long_about = None)]
struct Cli {
    /// Judge0 base URL (overrides JUDGE0_API_URL)
    #[arg(long, global = true)]
    judge_url: Option<String>,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true, default_value = "false")]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a problem candidate's reference solutions against its test cases
    Validate {
        /// Candidate JSON file (title, testcases, referenceSolutions)
        candidate: PathBuf,

        /// How submissions are sent to the judge
        #[arg(short, long, value_enum, default_value_t = ModeArg::Single)]
        mode: ModeArg,

        /// Stop at the first failure or grade every language
        #[arg(short, long, value_enum, default_value_t = PolicyArg::FailFast)]
        policy: PolicyArg,

        /// Directory accepted candidates are written to
        #[arg(short, long)]
        store: Option<PathBuf>,

        /// Language table overriding the built-in Judge0 ids
        #[arg(short, long)]
        languages: Option<PathBuf>,

        /// Print the outcome as JSON instead of a report
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// List the languages the judge can run
    Languages {
        /// Language table overriding the built-in Judge0 ids
        #[arg(short, long)]
        languages: Option<PathBuf>,
    },

    /// Grade a single source file against a test case file
    Run {
        /// Language name (e.g., python, java, cpp)
        #[arg(long)]
        language: String,

        /// Source file to grade
        #[arg(long)]
        source: PathBuf,

        /// JSON array of {"input", "output"} test cases
        #[arg(long)]
        cases: PathBuf,

        /// Language table overriding the built-in Judge0 ids
        #[arg(long)]
        languages: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Single,
    Batch,
}

impl From<ModeArg> for DispatchMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Single => DispatchMode::Single,
            ModeArg::Batch => DispatchMode::Batch,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PolicyArg {
    FailFast,
    Complete,
}

impl From<PolicyArg> for ValidationPolicy {
    fn from(policy: PolicyArg) -> Self {
        match policy {
            PolicyArg::FailFast => ValidationPolicy::FailFast,
            PolicyArg::Complete => ValidationPolicy::CompleteReport,
        }
    }
}

fn init_tracing(json_logs: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true);

    if json_logs {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let judge_url = cli.judge_url.as_deref();

    match cli.command {
        Commands::Validate {
            candidate,
            mode,
            policy,
            store,
            languages,
            json,
        } => {
            let options = ValidationOptions {
                mode: mode.into(),
                policy: policy.into(),
            };
            commands::validate(
                &candidate,
                options,
                store.as_deref(),
                languages.as_deref(),
                judge_url,
                json,
            )
            .await
        }
        Commands::Languages { languages } => {
            commands::list_languages(languages.as_deref())?;
            Ok(commands::EXIT_ACCEPT)
        }
        Commands::Run {
            language,
            source,
            cases,
            languages,
        } => {
            commands::run_source(&language, &source, &cases, languages.as_deref(), judge_url)
                .await
        }
    }
}

#[tokio::main]
async fn main() {
    // .env is optional
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("❌ {:#}", e);
            commands::EXIT_RUN_FAILURE
        }
    };

    std::process::exit(code);
}
