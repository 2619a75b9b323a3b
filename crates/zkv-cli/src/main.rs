//! zkv: zkvault command-line client
//!
//! Account:
//!   status                  - server reachability, registration, local session
//!   register                - register the deployment's passphrase
//!   login / logout          - start or end a session
//!   passwd                  - change the passphrase (ends every session)
//!   whoami                  - check the saved session
//!
//! Files:
//!   upload <file>           - seal, chunk and upload; prints a share link
//!   download <link|id>      - fetch, verify, decrypt and reassemble
//!   list                    - list uploads
//!   rm <id>                 - delete an upload and its chunks

mod client;
mod mime;
mod session;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;
use zkv_core::config::{expand_tilde, ZkvConfig};
use zkv_crypto::{parse_decimal, to_decimal, FileKey, Prover};
use zkv_transfer::ShareLink;

use crate::client::ApiClient;

const PASSPHRASE_ENV: &str = "ZKV_PASSPHRASE";
const NEW_PASSPHRASE_ENV: &str = "ZKV_NEW_PASSPHRASE";

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "zkv",
    version,
    about = "zkvault client",
    long_about = "zkv: log in with a zero-knowledge passphrase proof and move encrypted files in and out of zkvault"
)]
struct Cli {
    /// Path to zkv.toml configuration file
    #[arg(long, short = 'c', env = "ZKV_CONFIG", default_value = "~/.config/zkv/zkv.toml")]
    config: PathBuf,

    /// Server URL (overrides client.server)
    #[arg(long, env = "ZKV_SERVER")]
    server: Option<String>,

    /// Log level for diagnostics on stderr
    #[arg(long, env = "ZKV_LOG", default_value = "warn")]
    log: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show server and session status
    Status,

    /// Register the passphrase for this deployment (once)
    ///
    /// The passphrase is read from ZKV_PASSPHRASE or prompted for.
    Register,

    /// Prove knowledge of the passphrase and save a session token
    Login,

    /// End the saved session
    Logout,

    /// Change the passphrase; every session ends, including this one
    ///
    /// The new passphrase is read from ZKV_NEW_PASSPHRASE or prompted for.
    Passwd,

    /// Check whether the saved session is still valid
    Whoami,

    /// Encrypt and upload a file, then print its share link
    Upload {
        /// Local file
        file: PathBuf,
        /// Number of chunks (default: transfer.chunk_count)
        #[arg(long, short = 'n')]
        chunks: Option<usize>,
        /// MIME type (default: guessed from the extension)
        #[arg(long)]
        mime: Option<String>,
    },

    /// Download and decrypt a file
    Download {
        /// Share link, or an upload id together with --key
        target: String,
        /// base64url file key (when TARGET is an id)
        #[arg(long, short = 'k')]
        key: Option<String>,
        /// Output path (default: the uploaded filename in the current directory)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// List uploads
    List,

    /// Delete an upload and all of its chunks
    Rm {
        id: Uuid,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log);

    let config_path = expand_tilde(&cli.config);
    let config = load_config(&config_path).await?;
    let ctx = Ctx::new(config, cli.server.as_deref());

    match cli.command {
        Commands::Status => cmd_status(&ctx).await,
        Commands::Register => cmd_register(&ctx).await,
        Commands::Login => cmd_login(&ctx).await,
        Commands::Logout => cmd_logout(&ctx).await,
        Commands::Passwd => cmd_passwd(&ctx).await,
        Commands::Whoami => cmd_whoami(&ctx).await,
        Commands::Upload { file, chunks, mime } => {
            cmd_upload(&ctx, &file, chunks, mime.as_deref()).await
        }
        Commands::Download {
            target,
            key,
            output,
        } => cmd_download(&ctx, &target, key.as_deref(), output.as_deref()).await,
        Commands::List => cmd_list(&ctx).await,
        Commands::Rm { id } => cmd_rm(&ctx, &id).await,
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&ctx.config, &config_path),
    }
}

fn init_logging(level: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

// ── Config loading ────────────────────────────────────────────────────────────

async fn load_config(path: &Path) -> Result<ZkvConfig> {
    if path.exists() {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading config: {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing config: {}", path.display()))
    } else {
        Ok(ZkvConfig::default())
    }
}

/// Config plus the resolved server URL and session file.
struct Ctx {
    config: ZkvConfig,
    server: String,
    session_file: PathBuf,
    timeout: Duration,
}

impl Ctx {
    fn new(config: ZkvConfig, server: Option<&str>) -> Self {
        let server = server.unwrap_or(&config.client.server).to_string();
        let session_file = expand_tilde(&config.client.session_file);
        let timeout = Duration::from_secs(config.client.request_timeout_secs.max(1));
        Self {
            config,
            server,
            session_file,
            timeout,
        }
    }

    /// Client without a session token.
    fn anonymous(&self) -> Result<ApiClient> {
        self.client_for(&self.server, None)
    }

    /// Client carrying the saved session token, if any.
    fn client(&self) -> Result<ApiClient> {
        self.client_for(&self.server, session::load(&self.session_file)?)
    }

    fn client_for(&self, server: &str, token: Option<String>) -> Result<ApiClient> {
        Ok(ApiClient::new(server, self.timeout)?.with_token(token))
    }

    /// Client with a token, or an error telling the user to log in.
    fn authed_client(&self) -> Result<ApiClient> {
        let client = self.client()?;
        if !client.has_token() {
            anyhow::bail!("not logged in; run `zkv login`");
        }
        Ok(client)
    }
}

// ── Progress helpers ──────────────────────────────────────────────────────────

fn make_spinner(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{prefix:.bold} {spinner} {msg}") {
        pb.set_style(style);
    }
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

// ── Account commands ──────────────────────────────────────────────────────────

async fn cmd_status(ctx: &Ctx) -> Result<()> {
    println!("server:     {}", ctx.server);
    let client = ctx.client()?;
    match client.is_registered().await {
        Ok(registered) => {
            println!("reachable:  yes");
            println!("registered: {}", if registered { "yes" } else { "no" });
        }
        Err(e) => {
            println!("reachable:  no ({e})");
            return Ok(());
        }
    }
    let session = if !client.has_token() {
        "none"
    } else if client.verify_session().await? {
        "valid"
    } else {
        "expired"
    };
    println!("session:    {session}");
    Ok(())
}

fn public_key_for(passphrase: &SecretString) -> Result<String> {
    let prover = Prover::new(passphrase);
    Ok(to_decimal(&prover.public_key()?))
}

async fn cmd_register(ctx: &Ctx) -> Result<()> {
    let client = ctx.anonymous()?;
    if client.is_registered().await? {
        anyhow::bail!("{} already has a registered passphrase", ctx.server);
    }
    let passphrase = session::read_new_passphrase("New passphrase: ", PASSPHRASE_ENV)?;
    let public_key = public_key_for(&passphrase)?;
    client
        .register(&public_key)
        .await
        .context("registration refused")?;
    println!("Registered. Run `zkv login` to start a session.");
    Ok(())
}

async fn cmd_login(ctx: &Ctx) -> Result<()> {
    let passphrase = session::read_passphrase("Passphrase: ", PASSPHRASE_ENV)?;
    let client = ctx.anonymous()?;

    let prover = Prover::new(&passphrase);
    let commitment = prover.commit()?;
    let (session_id, challenge) = client
        .login_commit(&to_decimal(commitment.value()))
        .await
        .context("login refused")?;
    let challenge = parse_decimal(&challenge).context("server sent a malformed challenge")?;
    let response = prover.respond(commitment, &challenge)?;
    let token = client
        .login_respond(&session_id, &to_decimal(&response))
        .await
        .context("login refused")?;

    session::save(&ctx.session_file, &token)?;
    println!("Logged in (session saved to {})", ctx.session_file.display());
    Ok(())
}

async fn cmd_logout(ctx: &Ctx) -> Result<()> {
    let client = ctx.client()?;
    if client.has_token() {
        if let Err(e) = client.logout().await {
            tracing::warn!("server logout failed: {e}");
        }
    }
    if session::clear(&ctx.session_file)? {
        println!("Logged out.");
    } else {
        println!("No saved session.");
    }
    Ok(())
}

async fn cmd_passwd(ctx: &Ctx) -> Result<()> {
    let client = ctx.authed_client()?;
    let passphrase = session::read_new_passphrase("New passphrase: ", NEW_PASSPHRASE_ENV)?;
    let public_key = public_key_for(&passphrase)?;
    client
        .change_passphrase(&public_key)
        .await
        .context("passphrase change refused")?;
    session::clear(&ctx.session_file)?;
    println!("Passphrase changed. All sessions ended; run `zkv login` again.");
    Ok(())
}

async fn cmd_whoami(ctx: &Ctx) -> Result<()> {
    let client = ctx.client()?;
    if !client.has_token() {
        println!("not logged in");
    } else if client.verify_session().await? {
        println!("session valid ({})", ctx.server);
    } else {
        println!("session expired; run `zkv login`");
    }
    Ok(())
}

// ── File commands ─────────────────────────────────────────────────────────────

async fn cmd_upload(
    ctx: &Ctx,
    file: &Path,
    chunks: Option<usize>,
    mime_override: Option<&str>,
) -> Result<()> {
    let client = ctx.authed_client()?;
    let data = tokio::fs::read(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;
    let filename = file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .with_context(|| format!("not a file path: {}", file.display()))?;
    let content_type = mime_override.unwrap_or_else(|| mime::guess(file));
    let chunk_count = chunks.unwrap_or(ctx.config.transfer.chunk_count);

    let pb = make_spinner("upload");
    pb.set_message(format!("sealing {filename} into {chunk_count} chunks"));
    let prepared = zkv_transfer::prepare_upload(&filename, content_type, &data, chunk_count)?;

    pb.set_message(format!("sending {}", fmt_bytes(prepared.bundle.stored_bytes())));
    let id = client.upload(&prepared.bundle).await;
    pb.finish_and_clear();
    let id = id.with_context(|| format!("uploading {}", file.display()))?;

    let link = ShareLink::new(client.base(), id, prepared.key);
    println!("Uploaded {filename}");
    println!("  id:      {id}");
    println!("  size:    {}", fmt_bytes(data.len() as u64));
    println!("  chunks:  {}", prepared.bundle.chunks.len());
    println!("  link:    {link}");
    println!();
    println!("Anyone holding the link (and a session) can decrypt this file.");
    Ok(())
}

/// Resolve a download target into (server, id, key).
fn resolve_target(ctx: &Ctx, target: &str, key: Option<&str>) -> Result<(String, Uuid, FileKey)> {
    if target.contains('#') {
        let link = ShareLink::parse(target).context("parsing share link")?;
        return Ok((link.base, link.id, link.key));
    }
    let id = Uuid::parse_str(target).context("TARGET is neither a share link nor an upload id")?;
    let key = key.context("--key is required when downloading by id")?;
    let key = FileKey::from_fragment(key).context("parsing --key")?;
    Ok((ctx.server.clone(), id, key))
}

async fn cmd_download(
    ctx: &Ctx,
    target: &str,
    key: Option<&str>,
    output: Option<&Path>,
) -> Result<()> {
    let (server, id, key) = resolve_target(ctx, target, key)?;
    let token = session::load(&ctx.session_file)?
        .context("not logged in; run `zkv login`")?;
    let client = ctx.client_for(&server, Some(token))?;

    let pb = make_spinner("download");
    pb.set_message(format!("fetching {id}"));
    let result = async {
        let record = client.get(&id).await?;
        let data = zkv_transfer::download(&client, &record, &key).await?;
        Ok::<_, zkv_core::ZkvError>((record, data))
    }
    .await;
    pb.finish_and_clear();
    let (record, data) = result.with_context(|| format!("downloading {id}"))?;

    let dest = match output {
        Some(p) => p.to_path_buf(),
        None => PathBuf::from(safe_filename(&record.filename)),
    };
    tokio::fs::write(&dest, &data)
        .await
        .with_context(|| format!("writing {}", dest.display()))?;

    println!("Downloaded {} → {}", record.filename, dest.display());
    println!("  size:    {}", fmt_bytes(data.len() as u64));
    println!("  type:    {}", record.mime);
    Ok(())
}

async fn cmd_list(ctx: &Ctx) -> Result<()> {
    let client = ctx.authed_client()?;
    let records = client.list().await.context("listing uploads")?;
    if records.is_empty() {
        println!("No uploads.");
        return Ok(());
    }
    println!("{:<36}  {:>10}  {:>6}  NAME", "ID", "SIZE", "CHUNKS");
    for r in &records {
        println!(
            "{:<36}  {:>10}  {:>6}  {}",
            r.id,
            fmt_bytes(r.size),
            r.chunks.len(),
            r.filename
        );
    }
    Ok(())
}

async fn cmd_rm(ctx: &Ctx, id: &Uuid) -> Result<()> {
    let client = ctx.authed_client()?;
    client
        .delete(id)
        .await
        .with_context(|| format!("deleting {id}"))?;
    println!("Deleted {id}");
    Ok(())
}

fn cmd_config_show(config: &ZkvConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

// ── Utilities ─────────────────────────────────────────────────────────────────

/// Last path component of a server-supplied filename.
fn safe_filename(name: &str) -> String {
    Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .filter(|n| !n.is_empty() && n != "." && n != "..")
        .unwrap_or_else(|| "download.bin".to_string())
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

#[cfg(test)]
mod tests {
    use super::*;
    use zkv_crypto::generate_file_key;

    fn ctx() -> Ctx {
        Ctx::new(ZkvConfig::default(), Some("http://local:8700"))
    }

    #[test]
    fn target_from_share_link() {
        let id = Uuid::new_v4();
        let key = generate_file_key();
        let link = ShareLink::new("https://vault.example.com", id, key.clone()).to_string();

        let (server, parsed_id, parsed_key) = resolve_target(&ctx(), &link, None).unwrap();
        assert_eq!(server, "https://vault.example.com");
        assert_eq!(parsed_id, id);
        assert_eq!(parsed_key.as_bytes(), key.as_bytes());
    }

    #[test]
    fn target_from_id_needs_key() {
        let id = Uuid::new_v4();
        assert!(resolve_target(&ctx(), &id.to_string(), None).is_err());

        let key = generate_file_key();
        let (server, parsed_id, _) =
            resolve_target(&ctx(), &id.to_string(), Some(&key.to_fragment())).unwrap();
        assert_eq!(server, "http://local:8700");
        assert_eq!(parsed_id, id);
    }

    #[test]
    fn server_supplied_names_cannot_escape() {
        assert_eq!(safe_filename("report.pdf"), "report.pdf");
        assert_eq!(safe_filename("../../etc/passwd"), "passwd");
        assert_eq!(safe_filename(".."), "download.bin");
        assert_eq!(safe_filename(""), "download.bin");
    }

    #[test]
    fn byte_formatting() {
        assert_eq!(fmt_bytes(512), "512 B");
        assert_eq!(fmt_bytes(2048), "2.0 KB");
        assert_eq!(fmt_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn cli_parses() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
        let cli = Cli::try_parse_from(["zkv", "upload", "a.txt", "-n", "5"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Upload { chunks: Some(5), .. }
        ));
    }
}
