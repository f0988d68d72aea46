//! cwx: CloudWorx end-to-end encryption client
//!
//! Commands:
//!   register --username <u> --email <e>   - generate KEK + identity, write registration body
//!   seal <file> --kek <record.json>       - encrypt a file into an upload envelope
//!   open <envelope.json> --kek <record>   - decrypt a downloaded envelope
//!   passwd --kek <record.json>            - re-wrap the KEK under a new file password
//!   auth hash | auth verify --hash <phc>  - login-password hashing
//!   config show                           - display current configuration
//!
//! KEK records and envelopes are the JSON bodies the backend stores and
//! returns; a registration body doubles as a KEK record.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use secrecy::{ExposeSecret, SecretString};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};

use cwx_core::{CwxConfig, CwxError};
use cwx_crypto::{CryptoError, FileEnvelope, KdfCost, KekRecord, RegistrationPayload};

const ENV_FILE_PASSWORD: &str = "CWX_FILE_PASSWORD";
const ENV_AUTH_PASSWORD: &str = "CWX_AUTH_PASSWORD";

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "cwx",
    version,
    about = "CloudWorx end-to-end encryption client",
    long_about = "cwx: register keys, seal files for upload and open downloaded files"
)]
struct Cli {
    /// Path to config.toml
    #[arg(long, short = 'c', env = "CWX_CONFIG", default_value = "~/.config/cwx/config.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides [logging] level
    #[arg(long, env = "CWX_LOG")]
    log: Option<String>,

    /// Log format; overrides [logging] format
    #[arg(long, env = "CWX_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate the KEK and identity key pair and write the registration body
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        /// Output path for the registration JSON
        #[arg(long, short = 'o', default_value = "registration.json")]
        out: PathBuf,
        /// Overwrite an existing output file
        #[arg(long)]
        force: bool,
    },

    /// Encrypt a file into an upload envelope
    Seal {
        /// File to encrypt
        file: PathBuf,
        /// KEK record (registration or retrieval JSON)
        #[arg(long)]
        kek: PathBuf,
        /// MIME type recorded in the envelope
        #[arg(long = "type", default_value = "application/octet-stream")]
        file_type: String,
        /// Output path (default: <file>.cwx.json)
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,
        /// Also print the upload headers for the sealed body
        #[arg(long)]
        headers: bool,
        #[arg(long)]
        force: bool,
    },

    /// Decrypt a downloaded envelope
    Open {
        /// Envelope JSON
        envelope: PathBuf,
        /// KEK record (registration or retrieval JSON)
        #[arg(long)]
        kek: PathBuf,
        /// Output path (default: the file name stored in the envelope)
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,
        #[arg(long)]
        force: bool,
    },

    /// Re-wrap the KEK under a new file password
    Passwd {
        /// KEK record to re-wrap
        #[arg(long)]
        kek: PathBuf,
        /// Output path for the new KEK record
        #[arg(long, short = 'o', default_value = "kek.json")]
        out: PathBuf,
        #[arg(long)]
        force: bool,
    },

    /// Login-password hashing
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum AuthAction {
    /// Hash a login password into a PHC string
    Hash,
    /// Check a login password against a PHC string
    Verify {
        #[arg(long)]
        hash: String,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (defaults + config file + environment)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config_path = expand_tilde(&cli.config);

    let (config, found) = match load_config(&config_path).await {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    init_logging(
        cli.log.as_deref().unwrap_or(&config.logging.level),
        cli.log_format
            .clone()
            .unwrap_or_else(|| parse_log_format(&config.logging.format)),
    );
    if !found {
        warn!("config file not found: {}  (using defaults)", config_path.display());
    }

    match run(cli.command, &config, &config_path).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", describe_error(&e));
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands, config: &CwxConfig, config_path: &Path) -> Result<()> {
    match command {
        Commands::Register {
            username,
            email,
            out,
            force,
        } => cmd_register(config, username, email, &out, force).await,
        Commands::Seal {
            file,
            kek,
            file_type,
            out,
            headers,
            force,
        } => cmd_seal(config, &file, &kek, file_type, out, headers, force).await,
        Commands::Open {
            envelope,
            kek,
            out,
            force,
        } => cmd_open(config, &envelope, &kek, out, force).await,
        Commands::Passwd { kek, out, force } => cmd_passwd(config, &kek, &out, force).await,
        Commands::Auth {
            action: AuthAction::Hash,
        } => cmd_auth_hash(config).await,
        Commands::Auth {
            action: AuthAction::Verify { hash },
        } => cmd_auth_verify(config, hash).await,
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(config, config_path),
    }
}

/// Password and integrity failures become a fixed user-facing message;
/// everything else keeps its context chain.
fn describe_error(e: &anyhow::Error) -> String {
    let crypto = e.downcast_ref::<CryptoError>().or_else(|| {
        e.downcast_ref::<CwxError>().and_then(|cwx| match cwx {
            CwxError::Crypto(c) => Some(c),
            _ => None,
        })
    });
    match crypto {
        Some(
            c @ (CryptoError::WrongPassword
            | CryptoError::AuthenticationFailure
            | CryptoError::CorruptOrTampered
            | CryptoError::MalformedHash),
        ) => CwxError::from(c.clone()).user_message().to_string(),
        _ => format!("{e:#}"),
    }
}

// ── Config loading ────────────────────────────────────────────────────────────

/// Load config, apply `ARGON_*` overrides and validate. The flag reports
/// whether the file existed.
async fn load_config(path: &Path) -> Result<(CwxConfig, bool)> {
    let (mut config, found) = if path.exists() {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading config: {}", path.display()))?;
        let config = CwxConfig::from_toml_str(&content)
            .with_context(|| format!("parsing config: {}", path.display()))?;
        (config, true)
    } else {
        (CwxConfig::default(), false)
    };

    config.apply_env().context("applying environment overrides")?;
    config.validate()?;
    Ok((config, found))
}

fn parse_log_format(s: &str) -> LogFormat {
    if s.eq_ignore_ascii_case("json") {
        LogFormat::Json
    } else {
        LogFormat::Text
    }
}

fn init_logging(level: &str, format: LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // Logs go to stderr so stdout stays clean for key material and JSON
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

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Expand `~` in path to the user's home directory
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        let home = std::env::var("HOME").unwrap_or_default();
        PathBuf::from(home).join(rest)
    } else {
        path.to_path_buf()
    }
}

/// Password from `env_key` if set, otherwise an interactive prompt.
fn read_password(env_key: &str, prompt: &str, confirm: bool) -> Result<SecretString> {
    if let Ok(value) = std::env::var(env_key) {
        if !value.is_empty() {
            return Ok(SecretString::from(value));
        }
    }

    let first = SecretString::from(rpassword::prompt_password(prompt).context("reading password")?);
    if first.expose_secret().is_empty() {
        anyhow::bail!("password must not be empty");
    }
    if confirm {
        let second = rpassword::prompt_password("Confirm: ").context("reading password")?;
        let second = SecretString::from(second);
        if first.expose_secret() != second.expose_secret() {
            anyhow::bail!("passwords do not match");
        }
    }
    Ok(first)
}

async fn read_kek_record(path: &Path) -> Result<KekRecord> {
    let json = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading KEK record: {}", path.display()))?;
    KekRecord::from_json(&json).with_context(|| format!("parsing KEK record: {}", path.display()))
}

async fn write_output(path: &Path, contents: &[u8], force: bool) -> Result<()> {
    if !force && path.exists() {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    tokio::fs::write(path, contents)
        .await
        .with_context(|| format!("writing {}", path.display()))
}

/// Default envelope path for `seal`: `<file>.cwx.json` next to the input
fn default_envelope_path(file: &Path) -> PathBuf {
    let mut name = file.as_os_str().to_owned();
    name.push(".cwx.json");
    PathBuf::from(name)
}

/// Default plaintext path for `open`: the stored name, reduced to its final
/// component so an envelope cannot direct writes outside the working directory
fn default_open_path(envelope: &FileEnvelope) -> Result<PathBuf> {
    Path::new(&envelope.file_name)
        .file_name()
        .map(PathBuf::from)
        .context("envelope carries no usable file name; pass --out")
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> cwx_crypto::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let result = tokio::task::spawn_blocking(f)
        .await
        .context("crypto task failed")?;
    Ok(result?)
}

fn fmt_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ── `cwx register` ────────────────────────────────────────────────────────────

async fn cmd_register(
    config: &CwxConfig,
    username: String,
    email: String,
    out: &Path,
    force: bool,
) -> Result<()> {
    if !force && out.exists() {
        anyhow::bail!("{} already exists (use --force to overwrite)", out.display());
    }

    let auth_password = read_password(ENV_AUTH_PASSWORD, "Login password: ", true)?;
    let file_password = read_password(ENV_FILE_PASSWORD, "File password: ", true)?;

    let auth_cost = config.auth.kdf_cost();
    let file_cost = config.crypto.kdf_cost();
    let (auth_hash, registration) = blocking(move || {
        let auth_hash = cwx_crypto::hash_auth_password(&auth_password, &auth_cost)?;
        let registration = cwx_crypto::register(&file_password, &file_cost)?;
        Ok((auth_hash, registration))
    })
    .await?;

    let payload = RegistrationPayload {
        username,
        auth_password: auth_hash,
        email,
        public_key: registration.identity.public_key.clone(),
        kek: registration.kek_record,
    };
    write_output(out, payload.to_json()?.as_bytes(), force).await?;
    info!(out = %out.display(), "registration body written");

    println!("Registration body written to {}", out.display());
    println!();
    println!("Your private identity key is shown ONCE and is not stored anywhere:");
    println!();
    println!("{}", registration.identity.private_key.expose_secret());
    println!();
    println!("Keep it somewhere safe. Losing it means losing access to shares signed with it.");
    Ok(())
}

// ── `cwx seal` ────────────────────────────────────────────────────────────────

async fn cmd_seal(
    config: &CwxConfig,
    file: &Path,
    kek_path: &Path,
    file_type: String,
    out: Option<PathBuf>,
    headers: bool,
    force: bool,
) -> Result<()> {
    let record = read_kek_record(kek_path).await?;
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;
    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .context("input path has no file name")?;
    let out = out.unwrap_or_else(|| default_envelope_path(file));

    let file_password = read_password(ENV_FILE_PASSWORD, "File password: ", false)?;
    let fallback = config.crypto.kdf_cost();
    let envelope = blocking(move || {
        cwx_crypto::upload(&record, &file_password, &fallback, &file_name, &file_type, &bytes)
    })
    .await?;

    write_output(&out, envelope.to_json()?.as_bytes(), force).await?;

    println!("Sealed {} → {}", file.display(), out.display());
    println!("  size:  {}", fmt_bytes(envelope.file_size));
    println!("  type:  {}", envelope.file_type);
    if headers {
        println!();
        print!("{}", fmt_upload_headers(&envelope));
    }
    Ok(())
}

/// `Name: value` lines for the raw-body upload of `envelope`
fn fmt_upload_headers(envelope: &FileEnvelope) -> String {
    envelope
        .upload_headers()
        .into_iter()
        .map(|(name, value)| format!("{name}: {value}\n"))
        .collect()
}

// ── `cwx open` ────────────────────────────────────────────────────────────────

async fn cmd_open(
    config: &CwxConfig,
    envelope_path: &Path,
    kek_path: &Path,
    out: Option<PathBuf>,
    force: bool,
) -> Result<()> {
    let record = read_kek_record(kek_path).await?;
    let json = tokio::fs::read_to_string(envelope_path)
        .await
        .with_context(|| format!("reading envelope: {}", envelope_path.display()))?;
    let envelope = FileEnvelope::from_json(&json)
        .with_context(|| format!("parsing envelope: {}", envelope_path.display()))?;
    let out = match out {
        Some(p) => p,
        None => default_open_path(&envelope)?,
    };

    let file_password = read_password(ENV_FILE_PASSWORD, "File password: ", false)?;
    let fallback = config.crypto.kdf_cost();
    let plaintext =
        blocking(move || cwx_crypto::download(&record, &envelope, &file_password, &fallback))
            .await?;

    write_output(&out, &plaintext, force).await?;

    println!("Opened {} → {}", envelope_path.display(), out.display());
    println!("  size:  {}", fmt_bytes(plaintext.len() as u64));
    Ok(())
}

// ── `cwx passwd` ──────────────────────────────────────────────────────────────

async fn cmd_passwd(config: &CwxConfig, kek_path: &Path, out: &Path, force: bool) -> Result<()> {
    let record = read_kek_record(kek_path).await?;
    let old_password = read_password(ENV_FILE_PASSWORD, "Current file password: ", false)?;
    let new_password = read_password("CWX_NEW_FILE_PASSWORD", "New file password: ", true)?;

    let cost = config.crypto.kdf_cost();
    let rewrapped = blocking(move || {
        cwx_crypto::change_file_password(&record, &old_password, &new_password, &cost)
    })
    .await?;

    write_output(out, rewrapped.to_json()?.as_bytes(), force).await?;
    println!("New KEK record written to {}", out.display());
    Ok(())
}

// ── `cwx auth` ────────────────────────────────────────────────────────────────

async fn cmd_auth_hash(config: &CwxConfig) -> Result<()> {
    let password = read_password(ENV_AUTH_PASSWORD, "Login password: ", true)?;
    let cost = config.auth.kdf_cost();
    let phc = blocking(move || cwx_crypto::hash_auth_password(&password, &cost)).await?;
    println!("{phc}");
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
struct LoginCheck {
    matches: bool,
    /// Stored hash was made with a different algorithm or cost than `[auth]`
    stale: bool,
}

fn check_login(
    password: &SecretString,
    phc: &str,
    cost: &KdfCost,
) -> cwx_crypto::Result<LoginCheck> {
    let matches = cwx_crypto::verify_auth_password(password, phc)?;
    let stale = matches && cwx_crypto::needs_rehash(phc, cost)?;
    Ok(LoginCheck { matches, stale })
}

async fn cmd_auth_verify(config: &CwxConfig, hash: String) -> Result<()> {
    let password = read_password(ENV_AUTH_PASSWORD, "Login password: ", false)?;
    let cost = config.auth.kdf_cost();
    let check = blocking(move || check_login(&password, &hash, &cost)).await?;
    if !check.matches {
        anyhow::bail!("password does not match");
    }
    println!("password matches");
    if check.stale {
        warn!("stored hash does not use the [auth] cost; re-hash it with `cwx auth hash`");
    }
    Ok(())
}

// ── `cwx config show` ─────────────────────────────────────────────────────────

fn cmd_config_show(config: &CwxConfig, path: &Path) -> Result<()> {
    println!("# config: {}", path.display());
    print!("{}", toml::to_string_pretty(config).context("serializing config")?);
    Ok(())
}
