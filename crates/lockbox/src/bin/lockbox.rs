use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use lockbox::server::{DEFAULT_BACKLOG, DEFAULT_LISTEN_ADDR};
use lockbox::{
    Client, ClientConfig, FrameConfig, Identity, Response, ResponsePayload, Server, ServerConfig,
    ServerState, ShutdownHandle,
};
use lockbox_perms::{load_or_generate_keypair, FsKeyDirectory, KeyDirectory};
use lockbox_store::{FsBlobStore, SqliteRegistryStore};

#[derive(Parser)]
#[command(name = "lockbox")]
#[command(about = "Multi-user file sharing with sealed, signed requests", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Shared directory of `<identity>.pub.json` public key files
    #[arg(long, global = true, default_value = "keys")]
    keys_dir: PathBuf,

    /// Private directory for this party's `<identity>.key` seed
    #[arg(long, global = true, default_value = "secret")]
    secret_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ClientArgs {
    /// Server address
    #[arg(short, long, default_value = DEFAULT_LISTEN_ADDR)]
    server: SocketAddr,

    /// Act as this user
    #[arg(short, long)]
    user: Identity,

    /// Seconds to wait for the response (0 waits forever)
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the server until interrupted
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value = DEFAULT_LISTEN_ADDR)]
        listen: SocketAddr,

        /// Directory for uploaded file contents
        #[arg(long, default_value = "files")]
        files_dir: PathBuf,

        /// SQLite database for the access registry
        #[arg(long, default_value = "lockbox.db")]
        db: PathBuf,

        /// Pending-connection queue length
        #[arg(long, default_value_t = DEFAULT_BACKLOG)]
        backlog: u32,

        /// Seconds to wait for a request frame (0 waits forever)
        #[arg(long, default_value_t = 30)]
        read_timeout_secs: u64,

        /// Seconds in-flight connections get to finish at shutdown
        #[arg(long, default_value_t = 30)]
        shutdown_grace_secs: u64,
    },
    /// Create (or show) the keypair of an identity
    Keygen {
        /// Identity to generate keys for
        identity: Identity,
    },
    /// Register as a new user
    AddUser {
        #[command(flatten)]
        client: ClientArgs,
    },
    /// Upload a local file
    Upload {
        #[command(flatten)]
        client: ClientArgs,

        /// Path of the file to upload
        path: PathBuf,

        /// Name to store it under (default: the file's own name)
        #[arg(long)]
        name: Option<String>,
    },
    /// Download a file
    Download {
        #[command(flatten)]
        client: ClientArgs,

        /// Name of the file on the server
        filename: String,

        /// Where to write it (default: ./<filename>)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Delete a file you own
    Delete {
        #[command(flatten)]
        client: ClientArgs,

        /// Name of the file on the server
        filename: String,
    },
    /// Give another user read access to a file you own
    Share {
        #[command(flatten)]
        client: ClientArgs,

        /// Name of the file on the server
        filename: String,

        /// User to share with
        target: Identity,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Serve {
            listen,
            files_dir,
            db,
            backlog,
            read_timeout_secs,
            shutdown_grace_secs,
        } => {
            let config = ServerConfig {
                listen_addr: listen,
                backlog,
                frame: frame_config(read_timeout_secs),
                shutdown_grace: Duration::from_secs(shutdown_grace_secs),
                ..Default::default()
            };
            serve(config, &cli.secret_dir, &cli.keys_dir, files_dir, &db).await?;
        }
        Commands::Keygen { identity } => {
            let keys = load_or_generate_keypair(&cli.secret_dir, &cli.keys_dir, &identity)?;
            let public = keys.public_keys();
            println!("identity:   {identity}");
            println!("signing:    {}", public.signing.to_hex());
            println!("encryption: {}", public.encryption.to_hex());
        }
        Commands::AddUser { client } => {
            let response = connect(&cli.secret_dir, &cli.keys_dir, &client)?.add_user().await?;
            report(response)?;
        }
        Commands::Upload { client, path, name } => {
            let name = match name {
                Some(name) => name,
                None => path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .context("cannot derive a file name from the path; pass --name")?,
            };
            let data = tokio::fs::read(&path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            let response = connect(&cli.secret_dir, &cli.keys_dir, &client)?
                .upload_file(name, data)
                .await?;
            report(response)?;
        }
        Commands::Download {
            client,
            filename,
            output,
        } => {
            let output = output.unwrap_or_else(|| PathBuf::from(&filename));
            let response = connect(&cli.secret_dir, &cli.keys_dir, &client)?
                .download_file(filename)
                .await?;
            if let Response::Success {
                payload: ResponsePayload::File { data, .. },
            } = &response
            {
                tokio::fs::write(&output, data)
                    .await
                    .with_context(|| format!("writing {}", output.display()))?;
                println!("saved {} bytes to {}", data.len(), output.display());
                return Ok(());
            }
            report(response)?;
        }
        Commands::Delete { client, filename } => {
            let response = connect(&cli.secret_dir, &cli.keys_dir, &client)?
                .delete_file(filename)
                .await?;
            report(response)?;
        }
        Commands::Share {
            client,
            filename,
            target,
        } => {
            let response = connect(&cli.secret_dir, &cli.keys_dir, &client)?
                .share_file(filename, target)
                .await?;
            report(response)?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let env_filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    let stderr_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(std::io::stderr)
        .with_filter(env_filter);

    tracing_subscriber::registry().with(stderr_layer).init();
}

fn frame_config(timeout_secs: u64) -> FrameConfig {
    FrameConfig {
        read_timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
        ..Default::default()
    }
}

async fn serve(
    config: ServerConfig,
    secret_dir: &Path,
    keys_dir: &Path,
    files_dir: PathBuf,
    db: &Path,
) -> anyhow::Result<()> {
    let identity = load_or_generate_keypair(secret_dir, keys_dir, &Identity::server())
        .context("loading server keys")?;
    let directory = Arc::new(FsKeyDirectory::open(keys_dir)?);
    let blobs = Arc::new(FsBlobStore::open(files_dir).await?);
    let persistence = Arc::new(
        SqliteRegistryStore::open(db)
            .with_context(|| format!("opening registry database {}", db.display()))?,
    );

    let state = ServerState::load(config, identity, directory, blobs, persistence).await?;
    let server = Server::bind(Arc::new(state)).context("binding listener")?;

    let (handle, shutdown) = ShutdownHandle::channel();
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("received shutdown signal");
        handle.shutdown();
    });

    let report = server.serve(shutdown).await?;
    tracing::info!(
        connections = report.connections,
        aborted = report.aborted,
        persisted = report.persisted,
        "goodbye"
    );
    Ok(())
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        if let Ok(mut terminate) = signal(SignalKind::terminate()) {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
            return;
        }
    }

    let _ = tokio::signal::ctrl_c().await;
}

fn connect(secret_dir: &Path, keys_dir: &Path, args: &ClientArgs) -> anyhow::Result<Client> {
    let keys = load_or_generate_keypair(secret_dir, keys_dir, &args.user)
        .with_context(|| format!("loading keys for {}", args.user))?;
    let server = FsKeyDirectory::open(keys_dir)?
        .require(&Identity::server())
        .context("no server public key; copy server.pub.json into the key directory")?;

    let config = ClientConfig {
        server_addr: args.server,
        frame: frame_config(args.timeout_secs),
        ..Default::default()
    };
    Ok(Client::new(args.user.clone(), keys, server, config))
}

fn report(response: Response) -> anyhow::Result<()> {
    match response {
        Response::Success { .. } => {
            println!("success");
            Ok(())
        }
        Response::Failure { error } => bail!("{error}"),
    }
}
