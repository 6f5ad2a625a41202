//! File Vault - an encrypted file store served over HTTP.
//!
//! Files are encrypted at rest with AES-256-CBC under a key derived from a
//! shared secret, and decrypted on demand.

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use file_vault::config::{
    DEFAULT_DECRYPTED_DIR, DEFAULT_ENCRYPTED_DIR, DEFAULT_LISTEN_ADDR, SECRET_ENV,
};
use file_vault::server::{self, AppState};
use file_vault::{StoreKind, VaultConfig, VaultStore};
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

#[derive(Parser)]
#[command(name = "file-vault")]
#[command(author, version, about, long_about = None)]
#[command(
    about = "Encrypted file vault",
    long_about = "Stores files encrypted at rest with AES-256-CBC and serves them over HTTP."
)]
struct Cli {
    #[command(flatten)]
    store: StoreArgs,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct StoreArgs {
    /// Shared secret the encryption key is derived from
    #[arg(long, env = SECRET_ENV, hide_env_values = true, global = true)]
    key: Option<String>,

    /// Directory for encrypted files
    #[arg(long, env = "VAULT_ENCRYPTED_DIR", default_value = DEFAULT_ENCRYPTED_DIR, global = true)]
    encrypted_dir: PathBuf,

    /// Directory for decrypted files
    #[arg(long, env = "VAULT_DECRYPTED_DIR", default_value = DEFAULT_DECRYPTED_DIR, global = true)]
    decrypted_dir: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Address to listen on
        #[arg(long, env = "VAULT_LISTEN_ADDR", default_value = DEFAULT_LISTEN_ADDR)]
        listen: SocketAddr,
    },

    /// Encrypt a local file into the vault
    Encrypt {
        /// File to encrypt
        input: PathBuf,

        /// Storage name (default: the input file name)
        #[arg(long)]
        name: Option<String>,
    },

    /// Decrypt a stored file into the decrypted directory
    Decrypt {
        /// Storage name
        name: String,

        /// Also write the plaintext here ("-" for stdout)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Decrypt every stored file
    DecryptAll,

    /// List stored files
    Ls {
        /// List the decrypted directory instead
        #[arg(long)]
        decrypted: bool,
    },

    /// Delete all decrypted files
    Purge {
        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },

    /// Show the IV and size of a stored envelope
    Inspect {
        /// Storage name
        name: String,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_tracing(log_level: &str) {
    let log_level: tracing::Level = log_level.parse().unwrap_or(tracing::Level::INFO);
    let env_filter = EnvFilter::builder()
        .with_default_directive(log_level.into())
        .from_env_lossy();

    let stderr_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(io::stderr)
        .with_filter(env_filter);

    tracing_subscriber::registry().with(stderr_layer).init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let store = cli.store;
    match cli.command {
        Commands::Serve { listen } => cmd_serve(open_store(store, false)?, listen),

        Commands::Encrypt { input, name } => cmd_encrypt(&open_store(store, true)?, &input, name),

        Commands::Decrypt { name, output } => cmd_decrypt(&open_store(store, true)?, &name, output),

        Commands::DecryptAll => cmd_decrypt_all(&open_store(store, true)?),

        Commands::Ls { decrypted } => cmd_ls(&open_store(store, false)?, decrypted),

        Commands::Purge { force } => cmd_purge(&open_store(store, false)?, force),

        Commands::Inspect { name } => cmd_inspect(&open_store(store, false)?, &name),
    }
}

fn prompt_password(prompt: &str) -> io::Result<String> {
    rpassword::prompt_password(prompt).or_else(|_| {
        eprint!("{}", prompt);
        io::stderr().flush()?;
        let mut password = String::new();
        io::stdin().read_line(&mut password)?;
        Ok(password.trim().to_string())
    })
}

fn open_store(args: StoreArgs, need_key: bool) -> anyhow::Result<VaultStore> {
    let secret = match args.key {
        Some(key) => Some(key),
        None if need_key => Some(prompt_password("Encryption key: ")?),
        None => None,
    };

    let mut config = VaultConfig::new(args.encrypted_dir, args.decrypted_dir);
    if let Some(secret) = secret {
        config = config.with_secret(secret);
    }

    VaultStore::open(&config).context("failed to open vault store")
}

fn cmd_serve(store: VaultStore, listen: SocketAddr) -> anyhow::Result<()> {
    let config = server::Config::new(listen);
    let state = AppState::new(store);

    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    runtime.block_on(async move {
        server::run(config, state, async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await
    })?;

    Ok(())
}

fn cmd_encrypt(store: &VaultStore, input: &PathBuf, name: Option<String>) -> anyhow::Result<()> {
    let name = match name {
        Some(name) => name,
        None => input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .with_context(|| format!("{} has no file name", input.display()))?,
    };

    let file = File::open(input).with_context(|| format!("failed to open {}", input.display()))?;
    let stored = store.store_encrypted(&name, BufReader::new(file))?;

    println!(
        "Encrypted {} -> {} ({} bytes)",
        input.display(),
        stored.name,
        stored.size
    );

    Ok(())
}

fn cmd_decrypt(store: &VaultStore, name: &str, output: Option<PathBuf>) -> anyhow::Result<()> {
    match output {
        Some(path) if path.as_os_str() == "-" => {
            let data = store.retrieve_decrypted(name)?;
            io::stdout().write_all(&data)?;
        }
        Some(path) => {
            let data = store.retrieve_decrypted(name)?;
            std::fs::write(&path, &data)?;
            println!("Wrote {} bytes to {}", data.len(), path.display());
        }
        None => {
            let path = store.decrypt_to_store(name)?;
            println!("Decrypted {} to {}", name, path.display());
        }
    }

    Ok(())
}

fn cmd_decrypt_all(store: &VaultStore) -> anyhow::Result<()> {
    let report = store.decrypt_all()?;

    println!("Decrypted:        {}", report.succeeded());
    println!("Failed:           {}", report.failed_count());

    if !report.is_complete() {
        println!();
        println!("Failures:");
        for failure in &report.failed {
            println!("  {} ({})", failure.name, failure.error);
        }
        bail!("{} file(s) could not be decrypted", report.failed_count());
    }

    Ok(())
}

fn cmd_ls(store: &VaultStore, decrypted: bool) -> anyhow::Result<()> {
    let which = if decrypted {
        StoreKind::Decrypted
    } else {
        StoreKind::Encrypted
    };

    let names = store.list(which)?;
    if names.is_empty() {
        println!("(empty)");
    } else {
        for name in names {
            println!("{}", name);
        }
    }

    Ok(())
}

fn cmd_purge(store: &VaultStore, force: bool) -> anyhow::Result<()> {
    if !force {
        eprint!(
            "This will delete every file in {}. Continue? [y/N] ",
            store.decrypted_dir().display()
        );
        io::stderr().flush()?;
        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Aborted");
            return Ok(());
        }
    }

    let removed = store.purge_decrypted()?;
    println!("Deleted {} decrypted file(s)", removed);

    Ok(())
}

fn cmd_inspect(store: &VaultStore, name: &str) -> anyhow::Result<()> {
    let info = store.inspect(name)?;

    println!("Envelope {}", name);
    println!("=====================");
    println!("IV:               {}", hex::encode(info.iv.as_bytes()));
    println!("Ciphertext:       {} bytes", info.ciphertext_len);
    println!(
        "Block aligned:    {}",
        if info.block_aligned { "yes" } else { "no (cannot decrypt)" }
    );

    Ok(())
}
