//! `ai-guard` command line.
//!
//! ```text
//! ai-guard [--config guard.toml] generate --input notes.txt --difficulty hard --count 5
//! ai-guard validate quiz.md
//! ai-guard set-secret openai_api_key sk-...
//! ai-guard migrate-keys
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use ai_guard::config::loader::load_config;
use ai_guard::observability::{logging, metrics};
use ai_guard::provider::{HttpTransport, ProviderSettings};
use ai_guard::secrets::{store::is_secret_key, ConfigStore, EncryptionService, SECRET_KEYS};
use ai_guard::validation::{strip_code_fences, validate_markdown_quiz_format};
use ai_guard::{create_provider, GenerationRequest, GuardConfig, GuardContext, GuardError, QuizGenerator};

#[derive(Parser)]
#[command(name = "ai-guard")]
#[command(about = "Guarded AI quiz generation", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a quiz from a text file
    Generate {
        #[arg(long, default_value = "cli")]
        session: String,
        #[arg(long, default_value = "medium")]
        difficulty: String,
        #[arg(long, default_value_t = 5)]
        count: u32,
        #[arg(long)]
        input: PathBuf,
    },
    /// Check a quiz markdown file against the quiz grammar
    Validate { file: PathBuf },
    /// Store an API key or signing secret, encrypted
    SetSecret { key: String, value: String },
    /// Encrypt any secrets still stored in plaintext
    MigrateKeys,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => GuardConfig::default(),
    };

    logging::init_tracing(&config.observability.log_level);
    tracing::info!(backend = %config.provider.backend, "ai-guard v0.1.0 starting");

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    match cli.command {
        Commands::Generate {
            session,
            difficulty,
            count,
            input,
        } => generate(&config, &session, &difficulty, count, &input).await,
        Commands::Validate { file } => validate(&file),
        Commands::SetSecret { key, value } => set_secret(&config, &key, &value),
        Commands::MigrateKeys => {
            let store = open_store(&config)?;
            let migrated = store.migrate_api_keys()?;
            println!("Migrated {} secret(s)", migrated);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn open_store(config: &GuardConfig) -> Result<ConfigStore, GuardError> {
    let encryption = EncryptionService::from_config(&config.encryption);
    ConfigStore::open(Path::new(&config.store.path), encryption)
}

async fn generate(
    config: &GuardConfig,
    session: &str,
    difficulty: &str,
    count: u32,
    input: &Path,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let store = open_store(config)?;
    let settings = ProviderSettings::from_config(config, &store);
    let context = Arc::new(GuardContext::from_config(config));
    let transport = Arc::new(HttpTransport::new(
        settings.connect_timeout,
        settings.request_timeout,
        settings.https_only,
    )?);
    let provider = create_provider(&settings, &context, transport)?;
    let generator = QuizGenerator::new(context, provider);

    generator.admit_file_processing(session)?;
    let content = std::fs::read_to_string(input)?;
    let request = GenerationRequest::parse(content, difficulty, count)?;

    match generator.generate(session, request).await {
        Ok(markdown) => {
            println!("{}", markdown);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            for violation in e.violations().unwrap_or_default() {
                eprintln!("  {}", violation);
            }
            Ok(ExitCode::FAILURE)
        }
    }
}

fn validate(file: &Path) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(file)?;
    match validate_markdown_quiz_format(&strip_code_fences(&text)) {
        Ok(quiz) => {
            println!("{}", serde_json::to_string_pretty(&quiz)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("{} is not a valid quiz:", file.display());
            for violation in e.violations().unwrap_or_default() {
                eprintln!("  {}", violation);
            }
            Ok(ExitCode::FAILURE)
        }
    }
}

fn set_secret(config: &GuardConfig, key: &str, value: &str) -> Result<ExitCode, Box<dyn std::error::Error>> {
    if !is_secret_key(key) {
        eprintln!("Unknown secret '{}'. Expected one of: {}", key, SECRET_KEYS.join(", "));
        return Ok(ExitCode::FAILURE);
    }
    let store = open_store(config)?;
    store.set(key, serde_json::Value::String(value.to_string()));
    store.save()?;
    println!("Stored {}", key);
    Ok(ExitCode::SUCCESS)
}
