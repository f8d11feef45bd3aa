use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};

use privateer::config::{self, FleetConfig};
use privateer::executor::{ExecCtx, ExecSink, StdoutSink};
use privateer::identity::{find_identity, identity_root, write_identity};
use privateer::logging::{self, LogConfig};
use privateer::runtime::{ContainerRuntime, DockerCli};
use privateer::vault::VaultClient;
use privateer::{backup, check, configure, keys, restore, service, tar};

const DEFAULT_CONFIG: &str = "privateer.json";

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to the fleet configuration [default: privateer.json]
    #[arg(long, global = true)]
    path: Option<PathBuf>,
    /// Act as this machine instead of the configured identity
    #[arg(long = "as", global = true)]
    as_name: Option<String>,
    /// Print the equivalent commands instead of running them
    #[arg(long, global = true)]
    dry_run: bool,
    /// Debug-level diagnostics on stderr
    #[arg(long, global = true)]
    verbose: bool,
    /// Diagnostics as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate keypairs and store them in the vault
    Keygen {
        /// Machine to generate a keypair for
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        name: Option<String>,
        /// Generate keypairs for every machine
        #[arg(long)]
        all: bool,
    },
    /// Copy a machine's credentials into its key volume
    Configure { name: String },
    /// Verify this machine's credential volume
    Check {
        /// Also test ssh connectivity to every server (clients only)
        #[arg(long)]
        connection: bool,
    },
    /// Manage the server container
    Server {
        #[command(subcommand)]
        action: ServiceAction,
    },
    /// Manage the scheduled-backup container
    Schedule {
        #[command(subcommand)]
        action: ServiceAction,
    },
    /// Copy a volume to a server
    Backup {
        volume: String,
        #[arg(long)]
        server: Option<String>,
    },
    /// Restore a volume from a server
    Restore {
        volume: String,
        #[arg(long)]
        server: Option<String>,
        #[arg(long)]
        source: Option<String>,
    },
    /// Write a volume's server-side copy to a tar file on this host
    Export {
        volume: String,
        /// Directory for the tar file [default: current directory]
        #[arg(long)]
        to: Option<PathBuf>,
        #[arg(long)]
        source: Option<String>,
    },
    /// Create a volume from a tar file
    Import { tarfile: PathBuf, volume: String },
    /// Pull the client and server images
    Pull,
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum ServiceAction {
    Start,
    Stop,
    Status,
}

fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    logging::init(LogConfig {
        json: args.log_json,
        verbose: args.verbose,
    });

    let sink: Arc<dyn ExecSink> = Arc::new(StdoutSink);

    if let Command::Import { tarfile, volume } = &args.cmd {
        if args.path.is_some() || args.as_name.is_some() {
            bail!("'import' does not accept --path or --as");
        }
        let ctx = ExecCtx::new(args.dry_run, runtime()?, sink);
        tar::import_tar(&ctx, volume, tarfile)
            .with_context(|| format!("importing '{}' into '{volume}'", tarfile.display()))?;
        return Ok(());
    }

    let path = args
        .path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let cfg = config::load(&path).with_context(|| format!("loading {}", path.display()))?;

    match &args.cmd {
        Command::Keygen { name, all } => cmd_keygen(&cfg, &args, name.as_deref(), *all),
        Command::Configure { name } => cmd_configure(&cfg, &args, &path, name, sink),
        Command::Pull => cmd_pull(&cfg, &args, sink),
        cmd => {
            let root = identity_root(&path);
            let name = find_identity(args.as_name.as_deref(), &root)?;
            let ctx = ExecCtx::new(args.dry_run, runtime()?, sink);
            run_as(&cfg, &ctx, &name, cmd)
        }
    }
}

fn runtime() -> anyhow::Result<Arc<dyn ContainerRuntime>> {
    let docker = DockerCli::detect().context("selecting a container engine")?;
    tracing::debug!(engine = docker.engine(), "container engine selected");
    Ok(Arc::new(docker))
}

fn cmd_keygen(cfg: &FleetConfig, args: &Args, name: Option<&str>, all: bool) -> anyhow::Result<()> {
    if args.dry_run {
        bail!("'keygen' has no dry-run mode");
    }
    let store = VaultClient::connect(&cfg.vault).context("connecting to vault")?;
    let sink = StdoutSink;
    if all {
        keys::keygen_all(cfg, &store, &sink)?;
        return Ok(());
    }
    let name = name.context("a machine name or --all is required")?;
    keys::keygen(cfg, &store, &sink, name)?;
    Ok(())
}

fn cmd_configure(
    cfg: &FleetConfig,
    args: &Args,
    path: &Path,
    name: &str,
    sink: Arc<dyn ExecSink>,
) -> anyhow::Result<()> {
    let store = VaultClient::connect(&cfg.vault).context("connecting to vault")?;
    let ctx = ExecCtx::new(args.dry_run, runtime()?, sink);
    configure::configure(cfg, &store, &ctx, name)
        .with_context(|| format!("configuring '{name}'"))?;
    if !args.dry_run {
        let root = identity_root(path);
        write_identity(&root, name)
            .with_context(|| format!("recording identity in {}", root.display()))?;
    }
    Ok(())
}

fn cmd_pull(cfg: &FleetConfig, args: &Args, sink: Arc<dyn ExecSink>) -> anyhow::Result<()> {
    let ctx = ExecCtx::new(args.dry_run, runtime()?, sink);
    for image in [cfg.client_image(), cfg.server_image()] {
        if args.dry_run {
            ctx.command(format!("docker pull {image}"));
            continue;
        }
        ctx.say(format!("pulling '{image}'"));
        ctx.runtime
            .pull_image(&image)
            .with_context(|| format!("pulling {image}"))?;
    }
    Ok(())
}

fn run_as(cfg: &FleetConfig, ctx: &ExecCtx, name: &str, cmd: &Command) -> anyhow::Result<()> {
    match cmd {
        Command::Check { connection } => {
            check::check(cfg, ctx, name, *connection)?;
        }
        Command::Server { action } => match action {
            ServiceAction::Start => service::server_start(cfg, ctx, name)?,
            ServiceAction::Stop => service::server_stop(cfg, ctx, name)?,
            ServiceAction::Status => {
                service::server_status(cfg, ctx, name)?;
            }
        },
        Command::Schedule { action } => match action {
            ServiceAction::Start => service::schedule_start(cfg, ctx, name)?,
            ServiceAction::Stop => service::schedule_stop(cfg, ctx, name)?,
            ServiceAction::Status => {
                service::schedule_status(cfg, ctx, name)?;
            }
        },
        Command::Backup { volume, server } => {
            backup::backup(cfg, ctx, name, volume, server.as_deref())?;
        }
        Command::Restore {
            volume,
            server,
            source,
        } => {
            restore::restore(cfg, ctx, name, volume, server.as_deref(), source.as_deref())?;
        }
        Command::Export { volume, to, source } => {
            tar::export_tar(cfg, ctx, name, volume, to.as_deref(), source.as_deref())?;
        }
        other => bail!("{other:?} does not act as a configured machine"),
    }
    Ok(())
}
