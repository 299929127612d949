//! hush: hushdrop command-line client
//!
//! Commands:
//!   key new                          - generate a transfer key
//!   encrypt / decrypt <in> <out>     - seal or open a file with the active suite
//!   share format / parse             - build or split a `<base>/t/<id>#<key>` link
//!   vault init|show|seal|open        - manage the local vault key pair
//!   dir publish|lookup|unpublish|list|log|import|contacts
//!                                    - key directory against the local state file

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use hush_core::{display_code, HushConfig, HushError, JsonFileStore, SuiteKind};
use hush_crypto::{
    build_sealer, derive_vault_identifier, export_key, generate_key, import_key,
    public_key_from_pem, vault, Keyring, SealSummary, ShareLink, SuiteKeys, VaultKeyPair,
};
use hush_directory::{InMemoryDirectory, KeyDirectory};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "hush",
    version,
    about = "hushdrop client",
    long_about = "hush: end-to-end encrypted transfers, vault items and a transparent key directory"
)]
struct Cli {
    /// Path to hush.toml configuration file
    #[arg(
        long,
        short = 'c',
        env = "HUSH_CONFIG",
        default_value = "~/.config/hushdrop/hush.toml"
    )]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides [log] level
    #[arg(long, env = "HUSH_LOG")]
    log: Option<String>,

    /// Log format; overrides [log] format
    #[arg(long, env = "HUSH_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum, PartialEq)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq)]
enum SuiteArg {
    Transfer,
    Vault,
}

impl From<SuiteArg> for SuiteKind {
    fn from(arg: SuiteArg) -> Self {
        match arg {
            SuiteArg::Transfer => SuiteKind::Transfer,
            SuiteArg::Vault => SuiteKind::Vault,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Transfer key management
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },

    /// Encrypt a file with the active suite
    ///
    /// Transfer suite: uses --key, or generates and prints a fresh one.
    /// Vault suite: seals to the local vault key pair.
    Encrypt {
        input: PathBuf,
        output: PathBuf,
        /// Exported transfer key (base64url)
        #[arg(long, short = 'k', env = "HUSH_KEY")]
        key: Option<String>,
        /// Suite to use instead of [crypto] suite
        #[arg(long)]
        suite: Option<SuiteArg>,
    },

    /// Decrypt a file with the active suite
    Decrypt {
        input: PathBuf,
        output: PathBuf,
        /// Exported transfer key (required for the transfer suite)
        #[arg(long, short = 'k', env = "HUSH_KEY")]
        key: Option<String>,
        #[arg(long)]
        suite: Option<SuiteArg>,
    },

    /// Share link helpers
    Share {
        #[command(subcommand)]
        action: ShareAction,
    },

    /// Vault key pair and vault items
    Vault {
        #[command(subcommand)]
        action: VaultAction,
    },

    /// Key directory (local state file)
    Dir {
        #[command(subcommand)]
        action: DirAction,
    },
}

#[derive(Subcommand, Debug)]
enum KeyAction {
    /// Generate a random transfer key and print it
    New,
}

#[derive(Subcommand, Debug)]
enum ShareAction {
    /// Print `<base>/t/<id>#<key>`
    Format {
        transfer_id: String,
        #[arg(long, short = 'k', env = "HUSH_KEY")]
        key: String,
        /// Overrides [directory] base_url
        #[arg(long)]
        base_url: Option<String>,
    },
    /// Split a share link into its parts
    Parse { link: String },
}

#[derive(Subcommand, Debug)]
enum VaultAction {
    /// Generate the vault key pair
    Init {
        /// Replace an existing pair. Fingerprints shared from it stop matching.
        #[arg(long)]
        force: bool,
    },
    /// Show fingerprint and vault identifier
    Show,
    /// Seal a file as a vault item
    Seal {
        input: PathBuf,
        output: PathBuf,
        /// Seal to an imported contact instead of the local key pair
        #[arg(long)]
        to: Option<String>,
    },
    /// Open a vault item with the local key pair
    Open { input: PathBuf, output: PathBuf },
}

#[derive(Subcommand, Debug)]
enum DirAction {
    /// Publish the local vault public key
    Publish {
        /// Optional signing public key (PEM file) published alongside
        #[arg(long)]
        signing_key: Option<PathBuf>,
    },
    /// Look up a code and cross-check it against the log
    Lookup { code: String },
    /// Remove a published code
    Unpublish { code: String },
    /// List published records
    List,
    /// Fetch and verify the transparency log
    Log {
        /// Check prev_hash linkage only, without recomputing entry hashes
        #[arg(long)]
        linkage_only: bool,
        /// Print the verified log as JSON
        #[arg(long)]
        json: bool,
    },
    /// Look up a code and save it as a local contact
    Import { code: String, label: String },
    /// List local contacts
    Contacts,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match HushConfig::load(&hush_core::config::expand_tilde(&cli.config)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: loading config {}: {e}", cli.config.display());
            return ExitCode::FAILURE;
        }
    };

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = cli.log_format.clone().unwrap_or(match config.log.format.as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    });
    init_logging(&level, &format);

    match run(cli.command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries command output; logs go to stderr
    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

/// The first `HushError` in the chain, if any.
fn hush_error(err: &anyhow::Error) -> Option<&HushError> {
    err.chain().find_map(|cause| cause.downcast_ref::<HushError>())
}

fn report(err: &anyhow::Error) {
    match hush_error(err) {
        Some(hush) if hush.is_security_warning() => {
            eprintln!("SECURITY WARNING: {hush}");
            eprintln!("  ({err:#})");
        }
        _ => eprintln!("error: {err:#}"),
    }
}

async fn run(command: Commands, config: &HushConfig) -> Result<()> {
    match command {
        Commands::Key { action: KeyAction::New } => cmd_key_new(),
        Commands::Encrypt { input, output, key, suite } => {
            let kind = suite.map(SuiteKind::from).unwrap_or(config.crypto.suite);
            cmd_encrypt(config, kind, &input, &output, key.as_deref()).await
        }
        Commands::Decrypt { input, output, key, suite } => {
            let kind = suite.map(SuiteKind::from).unwrap_or(config.crypto.suite);
            cmd_decrypt(config, kind, &input, &output, key.as_deref()).await
        }
        Commands::Share { action: ShareAction::Format { transfer_id, key, base_url } } => {
            let base = base_url.as_deref().unwrap_or(&config.directory.base_url);
            cmd_share_format(base, &transfer_id, &key)
        }
        Commands::Share { action: ShareAction::Parse { link } } => cmd_share_parse(&link),
        Commands::Vault { action: VaultAction::Init { force } } => cmd_vault_init(config, force),
        Commands::Vault { action: VaultAction::Show } => cmd_vault_show(config),
        Commands::Vault { action: VaultAction::Seal { input, output, to } } => {
            cmd_vault_seal(config, &input, &output, to.as_deref()).await
        }
        Commands::Vault { action: VaultAction::Open { input, output } } => {
            cmd_vault_open(config, &input, &output).await
        }
        Commands::Dir { action } => cmd_dir(config, action).await,
    }
}

// ── Shared helpers ────────────────────────────────────────────────────────────

fn open_store(config: &HushConfig) -> Result<Arc<JsonFileStore>> {
    let path = config.store_path();
    let store = JsonFileStore::open(&path)
        .with_context(|| format!("opening local store: {}", path.display()))?;
    Ok(Arc::new(store))
}

fn keyring(config: &HushConfig, store: Arc<JsonFileStore>) -> Keyring<Arc<JsonFileStore>> {
    Keyring::from_config(store, config)
}

fn load_key_pair(keyring: &Keyring<Arc<JsonFileStore>>) -> Result<VaultKeyPair> {
    keyring
        .get_key_pair()
        .context("loading vault key pair")?
        .with_context(|| {
            format!(
                "no vault key pair under '{}'; run `hush vault init` first",
                keyring.id()
            )
        })
}

type LocalDirectory = KeyDirectory<InMemoryDirectory, Arc<JsonFileStore>>;

fn open_directory(config: &HushConfig, store: Arc<JsonFileStore>) -> Result<LocalDirectory> {
    let state = config.directory_state_path();
    let server = InMemoryDirectory::open(&state)
        .with_context(|| format!("opening directory state: {}", state.display()))?;
    Ok(KeyDirectory::from_config(server, store, config))
}

async fn read_input(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))
}

async fn write_output(path: &Path, data: &[u8]) -> Result<()> {
    tokio::fs::write(path, data)
        .await
        .with_context(|| format!("writing {}", path.display()))
}

// ── `hush key` / `hush encrypt` / `hush decrypt` ──────────────────────────────

fn cmd_key_new() -> Result<()> {
    println!("{}", export_key(&generate_key()));
    Ok(())
}

fn suite_keys(
    config: &HushConfig,
    kind: SuiteKind,
    key: Option<&str>,
    generate_missing: bool,
) -> Result<SuiteKeys> {
    let mut keys = SuiteKeys::default();
    match kind {
        SuiteKind::Transfer => {
            keys.transfer = match key {
                Some(encoded) => Some(import_key(encoded).context("importing transfer key")?),
                None if generate_missing => Some(generate_key()),
                None => anyhow::bail!("the transfer suite needs --key"),
            };
        }
        SuiteKind::Vault => {
            let store = open_store(config)?;
            keys.vault = Some(load_key_pair(&keyring(config, store))?);
        }
    }
    Ok(keys)
}

async fn cmd_encrypt(
    config: &HushConfig,
    kind: SuiteKind,
    input: &Path,
    output: &Path,
    key: Option<&str>,
) -> Result<()> {
    let sealer = build_sealer(kind, suite_keys(config, kind, key, true)?)?;
    let plaintext = read_input(input).await?;
    let envelope = sealer.seal(&plaintext).context("encrypting")?;
    write_output(output, &envelope).await?;

    tracing::debug!(suite = ?kind, plaintext = plaintext.len(), envelope = envelope.len(), "sealed");
    println!("Encrypted {} → {} ({} bytes)", input.display(), output.display(), envelope.len());
    match sealer.summary()? {
        SealSummary::Transfer { key: exported } => {
            if key.is_none() {
                println!("  key:         {exported}");
            }
        }
        SealSummary::Vault { fingerprint, vault_id } => {
            println!("  fingerprint: {fingerprint}");
            println!("  vault id:    {vault_id}");
        }
    }
    Ok(())
}

async fn cmd_decrypt(
    config: &HushConfig,
    kind: SuiteKind,
    input: &Path,
    output: &Path,
    key: Option<&str>,
) -> Result<()> {
    let sealer = build_sealer(kind, suite_keys(config, kind, key, false)?)?;
    let envelope = read_input(input).await?;
    let plaintext = sealer.open(&envelope).context("decrypting")?;
    write_output(output, &plaintext).await?;

    println!("Decrypted {} → {} ({} bytes)", input.display(), output.display(), plaintext.len());
    Ok(())
}

// ── `hush share` ──────────────────────────────────────────────────────────────

fn cmd_share_format(base_url: &str, transfer_id: &str, key: &str) -> Result<()> {
    let key = import_key(key).context("importing transfer key")?;
    println!("{}", ShareLink::new(base_url, transfer_id, key));
    Ok(())
}

fn cmd_share_parse(link: &str) -> Result<()> {
    let link: ShareLink = link.parse().context("parsing share link")?;
    println!("base:     {}", link.base_url);
    println!("transfer: {}", link.transfer_id);
    println!("key:      {}", export_key(&link.key));
    Ok(())
}

// ── `hush vault` ──────────────────────────────────────────────────────────────

fn cmd_vault_init(config: &HushConfig, force: bool) -> Result<()> {
    let keyring = keyring(config, open_store(config)?);
    if keyring.has_key_pair()? && !force {
        anyhow::bail!(
            "a vault key pair already exists under '{}' (use --force to replace it)",
            keyring.id()
        );
    }

    println!("Generating {}-bit vault key pair...", config.crypto.rsa_bits);
    let pair = keyring.generate_key_pair()?;
    println!("  fingerprint: {}", pair.fingerprint()?);
    println!("  vault id:    {}", pair.vault_identifier()?);
    Ok(())
}

fn cmd_vault_show(config: &HushConfig) -> Result<()> {
    let keyring = keyring(config, open_store(config)?);
    let Some(info) = keyring.info()? else {
        anyhow::bail!("no vault key pair; run `hush vault init` first");
    };
    let pair = load_key_pair(&keyring)?;

    println!("id:          {}", info.id);
    println!("algorithm:   {}", info.algorithm);
    println!("fingerprint: {}", info.fingerprint);
    println!("vault id:    {}", pair.vault_identifier()?);
    println!("created:     {}", info.created);
    Ok(())
}

async fn cmd_vault_seal(
    config: &HushConfig,
    input: &Path,
    output: &Path,
    to: Option<&str>,
) -> Result<()> {
    let store = open_store(config)?;
    let public_key = match to {
        Some(label) => {
            let dir = open_directory(config, store)?;
            let contact = dir
                .contact(label)?
                .with_context(|| format!("no contact labelled '{label}'"))?;
            public_key_from_pem(&contact.public_key)?
        }
        None => load_key_pair(&keyring(config, store))?.public_key().clone(),
    };

    let plaintext = read_input(input).await?;
    let envelope = vault::encrypt(&public_key, &plaintext).context("sealing vault item")?;
    write_output(output, &envelope).await?;

    println!("Sealed {} → {} ({} bytes)", input.display(), output.display(), envelope.len());
    println!("  recipient vault id: {}", derive_vault_identifier(&public_key)?);
    Ok(())
}

async fn cmd_vault_open(config: &HushConfig, input: &Path, output: &Path) -> Result<()> {
    let pair = load_key_pair(&keyring(config, open_store(config)?))?;
    let envelope = read_input(input).await?;
    let plaintext = vault::decrypt(&pair, &envelope).context("opening vault item")?;
    write_output(output, &plaintext).await?;

    println!("Opened {} → {} ({} bytes)", input.display(), output.display(), plaintext.len());
    Ok(())
}

// ── `hush dir` ────────────────────────────────────────────────────────────────

async fn cmd_dir(config: &HushConfig, action: DirAction) -> Result<()> {
    let store = open_store(config)?;
    let dir = open_directory(config, store.clone())?;

    match action {
        DirAction::Publish { signing_key } => {
            let pair = load_key_pair(&keyring(config, store))?;
            let signing = match signing_key {
                Some(path) => Some(
                    tokio::fs::read_to_string(&path)
                        .await
                        .with_context(|| format!("reading signing key: {}", path.display()))?,
                ),
                None => None,
            };
            let receipt = dir.publish_key_pair(&pair, signing.as_deref()).await?;
            println!("Published {}", display_code(&receipt.code));
            println!("  fingerprint: {}", receipt.fingerprint);
        }
        DirAction::Lookup { code } => {
            let record = dir.lookup_verified(&code).await?;
            println!("code:        {}", display_code(&record.code));
            println!("fingerprint: {}", record.fingerprint);
            println!("algorithm:   {}", record.algorithm);
            println!("created:     {}", record.created);
            println!("signing key: {}", if record.signing_key.is_some() { "yes" } else { "no" });
            println!("{}", record.public_key);
        }
        DirAction::Unpublish { code } => {
            dir.unpublish(&code).await?;
            println!("Unpublished {}", display_code(&code));
        }
        DirAction::List => {
            let records = dir.list().await?;
            if records.is_empty() {
                println!("(no published keys)");
            }
            for record in records {
                println!(
                    "{}  {}  {}  {}",
                    display_code(&record.code),
                    record.fingerprint,
                    record.algorithm,
                    record.created
                );
            }
        }
        DirAction::Log { linkage_only, json } => {
            let strict = config.directory.strict_log_verification && !linkage_only;
            let view = dir.fetch_log(strict).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&view)?);
            } else {
                for entry in &view.entries {
                    println!(
                        "{:>5}  {:<9}  {}  {}  {}",
                        entry.seq,
                        entry.action,
                        display_code(&entry.code),
                        entry.fingerprint,
                        entry.timestamp
                    );
                }
                let mode = if strict { "strict" } else { "linkage-only" };
                match &view.head {
                    Some(head) => println!(
                        "verified ({mode}): {} entries, head {}",
                        view.entries.len(),
                        head.entry_hash
                    ),
                    None => println!("verified ({mode}): empty log"),
                }
            }
        }
        DirAction::Import { code, label } => {
            let record = dir.lookup_verified(&code).await?;
            let contact = dir.import_to_contacts(&record, &label)?;
            println!(
                "Imported {} as '{}' ({})",
                display_code(&contact.code),
                contact.label,
                contact.fingerprint
            );
        }
        DirAction::Contacts => {
            let contacts = dir.contacts()?;
            if contacts.is_empty() {
                println!("(no contacts)");
            }
            for contact in contacts {
                println!(
                    "{:<16}  {}  {}",
                    contact.label,
                    display_code(&contact.code),
                    contact.fingerprint
                );
            }
        }
    }
    Ok(())
}
