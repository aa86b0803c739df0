//! vsphere-instance - render and plan vSphere instances
//!
//! Renders the cloud-init documents and guestinfo extra config for an
//! instance file, or plans the full create request against an inventory
//! snapshot.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use vsphere_instance_rs::config::load_instance_args;
use vsphere_instance_rs::instance::render_guest_config;
use vsphere_instance_rs::provider::inventory::InventoryProvider;
use vsphere_instance_rs::{InstanceError, Normalizer, TemplateRenderer, plan_instance};

#[derive(Parser)]
#[command(name = "vsphere-instance")]
#[command(author, version, about = "Render and plan vSphere instances with cloud-init guestinfo", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the rendered metadata and userdata documents
    Render(InstanceOpts),
    /// Print the encoded guestinfo extra config as JSON
    ExtraConfig(InstanceOpts),
    /// Print the create request planned against an inventory file
    Plan {
        #[command(flatten)]
        instance: InstanceOpts,

        /// Inventory YAML describing the platform
        #[arg(long, env = "VSPHERE_INSTANCE_INVENTORY")]
        inventory: PathBuf,
    },
}

#[derive(Args)]
struct InstanceOpts {
    /// Instance YAML file
    #[arg(short, long)]
    config: PathBuf,

    /// Instance name, used as instance-id and hostname
    #[arg(short, long)]
    name: String,

    /// Directory with metadata.yaml.j2 and userdata.yaml.j2 overrides
    #[arg(long, env = "VSPHERE_INSTANCE_TEMPLATE_DIR")]
    template_dir: Option<PathBuf>,
}

impl InstanceOpts {
    async fn renderer(&self) -> Result<TemplateRenderer, InstanceError> {
        match &self.template_dir {
            Some(dir) => TemplateRenderer::from_dir(dir).await,
            None => Ok(TemplateRenderer::new()),
        }
    }
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

#[tokio::main]
async fn main() -> Result<(), InstanceError> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let normalizer = Normalizer::new();

    match cli.command {
        Commands::Render(opts) => {
            info!("Rendering guest documents for {}", opts.name);
            let args = load_instance_args(&opts.config).await?;
            let renderer = opts.renderer().await?;
            let guest = render_guest_config(&renderer, &normalizer, &opts.name, args).await?;

            match guest.documents {
                Some(documents) => {
                    println!("# metadata");
                    print!("{}", documents.metadata);
                    println!("# userdata");
                    print!("{}", documents.userdata);
                }
                None => info!("Custom extra config supplied, no documents rendered"),
            }
        }
        Commands::ExtraConfig(opts) => {
            let args = load_instance_args(&opts.config).await?;
            let renderer = opts.renderer().await?;
            let guest = render_guest_config(&renderer, &normalizer, &opts.name, args).await?;
            println!("{}", serde_json::to_string_pretty(&guest.extra_config)?);
        }
        Commands::Plan {
            instance: opts,
            inventory,
        } => {
            info!("Planning {} against {}", opts.name, inventory.display());
            let args = load_instance_args(&opts.config).await?;
            let renderer = opts.renderer().await?;
            let provider = InventoryProvider::load(&inventory).await?;
            let plan = plan_instance(&provider, &renderer, &normalizer, &opts.name, args).await?;
            println!("{}", serde_json::to_string_pretty(&plan.request)?);
        }
    }

    Ok(())
}
