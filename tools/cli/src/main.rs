//! VaultX CLI - command line interface for the encrypted vault.
//!
//! Each invocation opens the local database, authenticates with the
//! master password, and performs one operation.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use url::Url;

use vaultx_auth::{AuthManager, Session};
use vaultx_backup::{BackupProtocol, Credential, ImportOutcome};
use vaultx_common::Username;
use vaultx_storage::{HttpRemote, SqliteStore};
use vaultx_sync::CloudSyncReconciler;
use vaultx_vault::{ItemFields, VaultStore};

#[derive(Parser)]
#[command(name = "vaultx")]
#[command(about = "VaultX - local-first encrypted secret vault")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Path to the vault database (defaults to the platform data dir).
    #[arg(long)]
    database: Option<PathBuf>,

    /// Account to operate on (required by everything except `reset`).
    #[arg(short, long)]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new account.
    Register {
        /// Destructively reset all local state first.
        #[arg(long)]
        force: bool,
    },

    /// Add an item to the vault.
    Add {
        /// Item title.
        #[arg(short, long)]
        title: String,

        /// Item category.
        #[arg(short, long, default_value = "general")]
        category: String,

        /// Extra fields as key=value pairs.
        #[arg(short, long)]
        field: Vec<String>,
    },

    /// List all items.
    List,

    /// Show all fields of one item.
    Show {
        /// Item id.
        id: i64,
    },

    /// Merge new field values into an existing item.
    Update {
        /// Item id.
        id: i64,

        /// Fields to set, as key=value pairs.
        #[arg(short, long, required = true)]
        field: Vec<String>,
    },

    /// Delete an item by id.
    Delete {
        /// Item id.
        id: i64,
    },

    /// Erase ALL local accounts and items.
    Reset,

    /// Export the vault as an encrypted backup container.
    Export {
        /// Output file.
        #[arg(short, long)]
        output: PathBuf,

        /// Encrypt with a transfer PIN instead of the master key.
        #[arg(long)]
        pin: bool,
    },

    /// Import a backup container, replacing this account's items.
    Import {
        /// Container file produced by `export`.
        #[arg(short, long)]
        file: PathBuf,

        /// The container was exported with a transfer PIN.
        #[arg(long)]
        pin: bool,
    },

    /// Push the encrypted vault to the cloud document store.
    Push {
        /// Root URL of the remote document store.
        #[arg(long)]
        remote_url: String,

        /// Cloud identity key of the remote document.
        #[arg(long)]
        remote_key: String,
    },

    /// Pull the cloud backup and restore it into this account.
    Pull {
        /// Root URL of the remote document store.
        #[arg(long)]
        remote_url: String,

        /// Cloud identity key of the remote document.
        #[arg(long)]
        remote_key: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let db_path = match cli.database {
        Some(path) => path,
        None => {
            let dir = dirs::data_dir()
                .context("Could not resolve the platform data directory")?
                .join("vaultx");
            std::fs::create_dir_all(&dir)?;
            dir.join("vault.db")
        }
    };

    let store = Arc::new(SqliteStore::open(&db_path)?);
    let auth = AuthManager::new(store.clone(), store.clone());
    let vault = Arc::new(VaultStore::new(store.clone()));
    let backup = BackupProtocol::new(store.clone(), store.clone(), vault.clone());
    let user = cli.user;

    match cli.command {
        Commands::Register { force } => {
            let username = required_user(user)?;
            let password = rpassword::prompt_password("Create master password: ")?;
            let confirm = rpassword::prompt_password("Confirm master password: ")?;
            if password != confirm {
                bail!("Passwords do not match");
            }
            let session = if force {
                confirm_or_abort("This erases ALL local accounts and items. Continue?")?;
                auth.register_forced(&username, &password).await?
            } else {
                auth.register(&username, &password).await?
            };
            println!("Registered '{}'", session.username());
            session.logout();
        }

        Commands::Add {
            title,
            category,
            field,
        } => {
            let username = required_user(user)?;
            let session = login(&auth, &username).await?;
            let mut fields = ItemFields::new();
            fields.insert("title".to_string(), title.into());
            fields.insert("category".to_string(), category.into());
            for pair in field {
                let (key, value) = pair
                    .split_once('=')
                    .context("Fields must be key=value pairs")?;
                fields.insert(key.to_string(), value.into());
            }
            let item = vault.add(&session, fields).await?;
            println!("Added item {}", item.id);
            session.logout();
        }

        Commands::List => {
            let username = required_user(user)?;
            let session = login(&auth, &username).await?;
            let snapshot = vault.load_all(&session).await?;
            for item in &snapshot.items {
                println!(
                    "{:>6}  {:<24}  {}",
                    item.id,
                    item.title().unwrap_or("(untitled)"),
                    item.category().unwrap_or("-"),
                );
            }
            if snapshot.failed > 0 {
                eprintln!(
                    "Warning: {} item(s) could not be decrypted - likely restored with a different password",
                    snapshot.failed
                );
            }
            session.logout();
        }

        Commands::Show { id } => {
            let username = required_user(user)?;
            let session = login(&auth, &username).await?;
            let snapshot = vault.load_all(&session).await?;
            let item = snapshot
                .items
                .iter()
                .find(|item| item.id == id)
                .with_context(|| format!("No item with id {}", id))?;
            println!("id: {}", item.id);
            println!("created_at: {}", item.created_at);
            for (key, value) in &item.fields {
                println!("{}: {}", key, value);
            }
            session.logout();
        }

        Commands::Update { id, field } => {
            let username = required_user(user)?;
            let session = login(&auth, &username).await?;
            let mut patch = ItemFields::new();
            for pair in field {
                let (key, value) = pair
                    .split_once('=')
                    .context("Fields must be key=value pairs")?;
                patch.insert(key.to_string(), value.into());
            }
            let item = vault.update(&session, id, patch).await?;
            println!(
                "Updated item {} ({})",
                item.id,
                item.title().unwrap_or("untitled")
            );
            session.logout();
        }

        Commands::Delete { id } => {
            let username = required_user(user)?;
            let session = login(&auth, &username).await?;
            vault.delete(&session, id).await?;
            println!("Deleted item {}", id);
            session.logout();
        }

        Commands::Reset => {
            confirm_or_abort("This erases ALL local accounts and items. Continue?")?;
            auth.reset().await?;
            println!("Vault reset; all accounts and items removed");
        }

        Commands::Export { output, pin } => {
            let username = required_user(user)?;
            let session = login(&auth, &username).await?;
            let container = if pin {
                let pin = rpassword::prompt_password("Transfer PIN (digits): ")?;
                backup.export_with_pin(&session, &pin).await?
            } else {
                backup.export(&session).await?
            };
            std::fs::write(&output, container)?;
            println!("Exported to {}", output.display());
            session.logout();
        }

        Commands::Import { file, pin } => {
            let username = required_user(user)?;
            let session = login(&auth, &username).await?;
            let raw = std::fs::read_to_string(&file)?;

            let mut outcome = backup.prepare_import(&raw, None, Some(&session))?;
            if let ImportOutcome::NeedsCredential(_) = outcome {
                // One re-prompt: the backup was made under another key.
                let credential = if pin {
                    Credential::Pin(rpassword::prompt_password("Transfer PIN: ")?)
                } else {
                    Credential::Password(rpassword::prompt_password("Backup password: ")?)
                };
                outcome = backup.prepare_import(&raw, Some(&credential), Some(&session))?;
            }

            let ImportOutcome::Ready(pending) = outcome else {
                bail!("Import requires a credential");
            };
            confirm_or_abort(&format!(
                "Replace all items of '{}' with {} imported item(s)?",
                session.username(),
                pending.item_count()
            ))?;

            let summary = backup.commit_restore(&session, pending).await?;
            println!("Restored {} item(s)", summary.restored);
            if summary.dropped > 0 {
                eprintln!("Warning: {} item(s) were dropped", summary.dropped);
            }
            session.logout();
        }

        Commands::Push {
            remote_url,
            remote_key,
        } => {
            let username = required_user(user)?;
            let session = login(&auth, &username).await?;
            let sync = reconciler(&remote_url, &store)?;
            sync.push(&remote_key, session.username()).await?;
            println!("Pushed vault for '{}'", session.username());
            session.logout();
        }

        Commands::Pull {
            remote_url,
            remote_key,
        } => {
            let username = required_user(user)?;
            let session = login(&auth, &username).await?;
            let sync = reconciler(&remote_url, &store)?;
            let cloud = sync.pull(&remote_key, session.username()).await?;
            if cloud.original_user != session.username().as_str() {
                eprintln!("Note: backup was created by '{}'", cloud.original_user);
            }

            let mut outcome = backup.prepare_row_import(
                cloud.rows.clone(),
                cloud.salt.as_ref(),
                None,
                Some(&session),
            )?;
            if let ImportOutcome::NeedsCredential(_) = outcome {
                let credential =
                    Credential::Password(rpassword::prompt_password("Backup password: ")?);
                outcome = backup.prepare_row_import(
                    cloud.rows,
                    cloud.salt.as_ref(),
                    Some(&credential),
                    Some(&session),
                )?;
            }
            let ImportOutcome::Ready(pending) = outcome else {
                bail!("Restore requires a credential");
            };
            confirm_or_abort(&format!(
                "Replace all items of '{}' with {} item(s) from the cloud?",
                session.username(),
                pending.item_count()
            ))?;

            let summary = backup.commit_restore(&session, pending).await?;
            println!("Restored {} item(s)", summary.restored);
            if summary.dropped > 0 {
                eprintln!("Warning: {} item(s) were dropped", summary.dropped);
            }
            session.logout();
        }
    }

    Ok(())
}

fn required_user(user: Option<String>) -> Result<Username> {
    let name = user.context("-u/--user is required for this command")?;
    Ok(Username::new(name)?)
}

fn reconciler(
    remote_url: &str,
    store: &Arc<SqliteStore>,
) -> Result<CloudSyncReconciler<HttpRemote, SqliteStore, SqliteStore>> {
    let base = Url::parse(remote_url).context("Invalid remote URL")?;
    Ok(CloudSyncReconciler::new(
        Arc::new(HttpRemote::new(base)),
        store.clone(),
        store.clone(),
        Duration::from_secs(30),
    ))
}

async fn login(
    auth: &AuthManager<SqliteStore, SqliteStore>,
    username: &Username,
) -> Result<Session> {
    let password = rpassword::prompt_password("Master password: ")?;
    Ok(auth.login(username, &password).await?)
}

fn confirm_or_abort(prompt: &str) -> Result<()> {
    print!("{} [y/N] ", prompt);
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    if !answer.trim().eq_ignore_ascii_case("y") {
        bail!("Aborted");
    }
    Ok(())
}
