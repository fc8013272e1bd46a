use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use tsumiki::{load, KubeApi, Stack};

#[derive(Parser)]
#[clap(version = "0.1.0", author = "Lach")]
struct Opts {
    /// Namespace used for namespaced resources which do not specify one
    #[clap(short, long, default_value = "default")]
    namespace: String,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Reconcile manifests against the cluster
    Apply {
        /// Stack name, written to every resource as the ownership label
        #[clap(short, long)]
        stack: String,
        /// Keep resources which are no longer part of the stack
        #[clap(long)]
        no_prune: bool,
        /// Manifest files or directories
        #[clap(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Remove every resource belonging to a stack
    Delete {
        #[clap(short, long)]
        stack: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let opts: Opts = Opts::parse();

    let client = KubeApi::connect(&opts.namespace)
        .await
        .context("connecting to cluster")?;

    match opts.command {
        Command::Apply {
            stack,
            no_prune,
            paths,
        } => {
            let resources = load::load_paths(&paths).context("loading manifests")?;
            let mut stack = Stack::new(stack, resources);
            let applied = stack.apply(&client, !no_prune).await?;
            log::info!("applied {} resources", applied.len());
        }
        Command::Delete { stack } => {
            Stack::new(stack, vec![]).delete(&client).await?;
        }
    }
    Ok(())
}
