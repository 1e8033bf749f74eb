use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "presence", about = "Presence attendance CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll a face for an identity (or add a training sample)
    Enroll {
        /// Identity reference (links to the account in the surrounding system)
        #[arg(short, long)]
        user: String,
        /// Display name
        #[arg(short, long)]
        name: String,
        /// Contact reference (e-mail or similar)
        #[arg(short, long, default_value = "")]
        contact: String,
        /// Path to the captured image
        #[arg(short, long)]
        image: std::path::PathBuf,
        /// Add as a training sample instead of replacing the primary signature
        #[arg(long)]
        sample: bool,
    },
    /// Verify a captured image against an identity
    Verify {
        #[arg(short, long)]
        user: String,
        #[arg(short, long)]
        image: std::path::PathBuf,
    },
    /// Check in for today
    CheckIn {
        #[arg(short, long)]
        user: String,
        #[arg(short, long)]
        image: std::path::PathBuf,
    },
    /// Check out for today
    CheckOut {
        #[arg(short, long)]
        user: String,
        #[arg(short, long)]
        image: std::path::PathBuf,
    },
    /// Show today's attendance state for an identity
    Status {
        #[arg(short, long)]
        user: String,
    },
    /// List enrolled identities
    List,
    /// Remove an identity and its records
    Remove {
        #[arg(short, long)]
        user: String,
    },
    /// Show daemon status
    DaemonStatus,
}

// `#[zbus::proxy]` generates `PresenceProxy` from this trait definition;
// method names map to the daemon's PascalCase D-Bus members.
#[zbus::proxy(
    interface = "org.freedesktop.Presence1",
    default_service = "org.freedesktop.Presence1",
    default_path = "/org/freedesktop/Presence1"
)]
trait Presence {
    async fn register(
        &self,
        identity_ref: &str,
        display_name: &str,
        contact: &str,
        image: Vec<u8>,
        additional_sample: bool,
    ) -> zbus::Result<String>;

    async fn verify(&self, identity_ref: &str, image: Vec<u8>) -> zbus::Result<String>;

    async fn mark(&self, identity_ref: &str, action: &str, image: Vec<u8>)
        -> zbus::Result<String>;

    async fn status_today(&self, identity_ref: &str) -> zbus::Result<String>;

    async fn list_identities(&self) -> zbus::Result<String>;

    async fn remove_identity(&self, identity_ref: &str) -> zbus::Result<bool>;

    async fn status(&self) -> zbus::Result<String>;
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let connection = zbus::Connection::session()
        .await
        .context("cannot connect to the session bus — is presenced running?")?;
    let proxy = PresenceProxy::new(&connection).await?;

    match cli.command {
        Commands::Enroll {
            user,
            name,
            contact,
            image,
            sample,
        } => {
            let bytes = read_image(&image)?;
            let reply = proxy.register(&user, &name, &contact, bytes, sample).await;
            print_reply(reply);
        }
        Commands::Verify { user, image } => {
            let bytes = read_image(&image)?;
            print_reply(proxy.verify(&user, bytes).await);
        }
        Commands::CheckIn { user, image } => {
            let bytes = read_image(&image)?;
            print_reply(proxy.mark(&user, "check_in", bytes).await);
        }
        Commands::CheckOut { user, image } => {
            let bytes = read_image(&image)?;
            print_reply(proxy.mark(&user, "check_out", bytes).await);
        }
        Commands::Status { user } => {
            print_reply(proxy.status_today(&user).await);
        }
        Commands::List => {
            print_reply(proxy.list_identities().await);
        }
        Commands::Remove { user } => match proxy.remove_identity(&user).await {
            Ok(true) => println!("removed {user}"),
            Ok(false) => println!("no such identity: {user}"),
            Err(e) => print_error(&e),
        },
        Commands::DaemonStatus => {
            print_reply(proxy.status().await);
        }
    }

    Ok(())
}

fn read_image(path: &std::path::Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("cannot read image {}", path.display()))
}

/// Pretty-print a JSON reply, or the structured error the daemon returned.
fn print_reply(reply: zbus::Result<String>) {
    match reply {
        Ok(body) => println!("{}", pretty(&body)),
        Err(e) => print_error(&e),
    }
}

fn print_error(err: &zbus::Error) {
    // Daemon errors carry a JSON body with the machine-readable code
    if let zbus::Error::MethodError(_, Some(body), _) = err {
        eprintln!("{}", pretty(body));
    } else {
        eprintln!("error: {err}");
    }
    std::process::exit(1);
}

fn pretty(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .and_then(|v| serde_json::to_string_pretty(&v))
        .unwrap_or_else(|_| body.to_string())
}
