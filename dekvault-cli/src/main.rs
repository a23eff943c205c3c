//! `dekvault` CLI tool for data key management and secret encryption.

#![warn(clippy::pedantic, clippy::nursery)]

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use clap::{Parser, Subcommand};
use dekvault::config::{SecretsConfig, ENCRYPTION_KEY_ENV, SECRET_KEY_ENV};
use dekvault::envelope::Envelope;
use dekvault::service::SecretsService;
use dekvault_store_file::FileDataKeyStore;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dekvault")]
#[command(about = "dekvault secrets encryption CLI", long_about = None)]
struct Cli {
    /// JSON file holding the encrypted data keys
    #[arg(long, env = "DEKVAULT_STORE", default_value = "./data-keys.json")]
    store: PathBuf,

    /// Static secret protecting the data keys
    #[arg(long, env = SECRET_KEY_ENV, hide_env_values = true)]
    secret_key: Option<String>,

    /// Data key used for new encryptions (empty: the static secret)
    #[arg(long, env = ENCRYPTION_KEY_ENV, default_value = "")]
    encryption_key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the root data key if it does not exist yet
    Init,
    /// Create a new named data key
    GenerateKey {
        /// Name of the new data key
        name: String,
    },
    /// Encrypt a value and print the blob as base64
    Encrypt {
        /// Value to encrypt (read from stdin when omitted)
        value: Option<String>,
    },
    /// Decrypt a base64 blob and write the plaintext to stdout
    Decrypt {
        /// Base64 blob (read from stdin when omitted)
        blob: Option<String>,
    },
    /// Print the data key a base64 blob was encrypted under
    ShowKey {
        /// Base64 blob
        blob: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            connect(&cli.store, cli.secret_key, cli.encryption_key).await?;
            println!("Data keys ready in: {}", cli.store.display());
        }
        Commands::GenerateKey { ref name } => {
            let secrets = connect(&cli.store, cli.secret_key, cli.encryption_key).await?;
            secrets
                .generate_data_key(name)
                .await
                .with_context(|| format!("could not create data key '{name}'"))?;
            println!("Created data key: {name}");
        }
        Commands::Encrypt { value } => {
            let secrets = connect(&cli.store, cli.secret_key, cli.encryption_key).await?;
            let payload = match value {
                Some(value) => value.into_bytes(),
                None => read_stdin()?,
            };
            let blob = secrets.encrypt(&payload).await.context("encryption failed")?;
            println!("{}", STANDARD.encode(blob));
        }
        Commands::Decrypt { blob } => {
            let secrets = connect(&cli.store, cli.secret_key, cli.encryption_key).await?;
            let blob = decode_blob(blob)?;
            let plaintext = secrets.decrypt(&blob).await.context("decryption failed")?;
            std::io::stdout().write_all(&plaintext)?;
        }
        Commands::ShowKey { blob } => {
            let blob = decode_blob(Some(blob))?;
            match Envelope::from_bytes(&blob)?.key_name() {
                Some("") => println!("(static secret)"),
                Some(name) => println!("{name}"),
                None => println!("(legacy)"),
            }
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

async fn connect(
    store: &Path,
    secret_key: Option<String>,
    encryption_key: String,
) -> Result<SecretsService<FileDataKeyStore>> {
    let Some(secret_key) = secret_key else {
        bail!("no secret key: pass --secret-key or set {SECRET_KEY_ENV}");
    };

    let store = FileDataKeyStore::open(store)
        .with_context(|| format!("could not open data key store {}", store.display()))?;
    let config = SecretsConfig::new(secret_key).with_default_encryption_key(encryption_key);

    let secrets = SecretsService::new(store, config)?;
    secrets.initialize().await.context("could not initialize secrets service")?;
    Ok(secrets)
}

fn decode_blob(blob: Option<String>) -> Result<Vec<u8>> {
    let text = match blob {
        Some(blob) => blob,
        None => String::from_utf8(read_stdin()?).context("blob is not valid UTF-8")?,
    };
    STANDARD.decode(text.trim()).context("blob is not valid base64")
}

fn read_stdin() -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    std::io::stdin().read_to_end(&mut buf).context("could not read stdin")?;
    Ok(buf)
}
