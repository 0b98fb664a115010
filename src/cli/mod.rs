//! Command-line interface
//!
//! Three subcommands over the same pipeline: `package` builds (or reuses) an
//! artifact and prints its descriptor, `status` reports what the store holds
//! for the current source tree, `delete` evicts the stored artifact.
//! Handlers return process exit codes; configuration mistakes exit with 2,
//! everything else with 1.

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::error;

use crate::config::BuildConfig;
use crate::error::{PackError, Result};
use crate::package::{self, Kind};
use crate::project::Project;
use crate::store::{ArtifactStore, FsObjectClient};

#[derive(Parser, Debug)]
#[command(
    name = "packbox",
    about = "Content-addressed packaging of source code and Python dependencies into deployable zip artifacts",
    version,
    author
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, global = true, help = "Increase verbosity")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Package a project and store the artifact",
        long_about = "Hashes the source tree, reuses the stored artifact when its provenance \
                      matches, otherwise installs dependencies, assembles the zip and uploads \
                      it. Prints the artifact descriptor as JSON.\n\n\
                      Examples:\n  \
                      packbox package\n  \
                      packbox package /path/to/project --kind layer\n  \
                      packbox package --runtime python3.12 --docker"
    )]
    Package(PackageArgs),

    #[command(about = "Show what the store holds for a project")]
    Status(StatusArgs),

    #[command(about = "Evict the stored artifact for a project")]
    Delete(StatusArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct PackageArgs {
    #[arg(value_name = "PATH", help = "Project root (defaults to current directory)")]
    pub path: Option<PathBuf>,

    #[arg(short = 'k', long, value_enum, default_value = "function", help = "Artifact layout")]
    pub kind: KindArg,

    #[arg(long, value_name = "DIR", help = "Store directory (or PACKBOX_STORE_DIR)")]
    pub store: Option<PathBuf>,

    #[arg(short = 'r', long, value_name = "RUNTIME", help = "Target runtime, e.g. python3.12")]
    pub runtime: Option<String>,

    #[arg(short = 'm', long, value_name = "MANAGER", help = "Dependency manager (auto|uv|poetry|pipenv|pip)")]
    pub manager: Option<String>,

    #[arg(long, help = "Install dependencies in an isolated container")]
    pub docker: bool,

    #[arg(long, value_name = "IMAGE", help = "Isolated-build image reference")]
    pub image: Option<String>,

    #[arg(long, value_name = "FILE", help = "Dockerfile for the isolated-build image")]
    pub dockerfile: Option<PathBuf>,

    #[arg(long, help = "Keep bytecode and caches in the archive")]
    pub no_slim: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct StatusArgs {
    #[arg(value_name = "PATH", help = "Project root (defaults to current directory)")]
    pub path: Option<PathBuf>,

    #[arg(short = 'k', long, value_enum, default_value = "function", help = "Artifact layout")]
    pub kind: KindArg,

    #[arg(long, value_name = "DIR", help = "Store directory (or PACKBOX_STORE_DIR)")]
    pub store: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindArg {
    Function,
    Layer,
}

impl From<KindArg> for Kind {
    fn from(arg: KindArg) -> Self {
        match arg {
            KindArg::Function => Kind::Function,
            KindArg::Layer => Kind::Layer,
        }
    }
}

pub async fn handle_package(args: &PackageArgs) -> i32 {
    match run_package(args).await {
        Ok(rendered) => {
            println!("{rendered}");
            0
        }
        Err(e) => exit_code_for(&e),
    }
}

pub async fn handle_status(args: &StatusArgs) -> i32 {
    match run_status(args).await {
        Ok(rendered) => {
            println!("{rendered}");
            0
        }
        Err(e) => exit_code_for(&e),
    }
}

pub async fn handle_delete(args: &StatusArgs) -> i32 {
    match run_delete(args).await {
        Ok(key) => {
            println!("deleted {key}");
            0
        }
        Err(e) => exit_code_for(&e),
    }
}

async fn run_package(args: &PackageArgs) -> Result<String> {
    let config = config_from(args)?;
    let project = Project::new(project_root(&args.path)?, config)?;
    let store = open_store(&args.store, &project)?;

    let artifact = package::init(&project, args.kind.into(), &store).await?;
    let descriptor = artifact.descriptor().await?;
    project.cleanup();

    serde_json::to_string_pretty(&descriptor)
        .map_err(|e| PackError::Configuration(format!("Cannot render descriptor: {e}")))
}

async fn run_status(args: &StatusArgs) -> Result<String> {
    let project = Project::new(project_root(&args.path)?, BuildConfig::default())?;
    let store = open_store(&args.store, &project)?;
    let key = store.key_for(args.kind.into(), project.root_name(), &project.source_hash()?);

    let rendered = match store.exists(&key).await? {
        Some(head) => {
            let tags = store.provenance(&key).await?;
            json!({
                "stored": true,
                "store": store.location(),
                "key": key,
                "size": head.size,
                "version": head.version,
                "tags": tags,
            })
        }
        None => json!({ "stored": false, "store": store.location(), "key": key }),
    };
    serde_json::to_string_pretty(&rendered)
        .map_err(|e| PackError::Configuration(format!("Cannot render status: {e}")))
}

async fn run_delete(args: &StatusArgs) -> Result<String> {
    let project = Project::new(project_root(&args.path)?, BuildConfig::default())?;
    let store = open_store(&args.store, &project)?;
    let key = store.key_for(args.kind.into(), project.root_name(), &project.source_hash()?);
    store.delete(&key).await?;
    Ok(key)
}

fn config_from(args: &PackageArgs) -> Result<BuildConfig> {
    let mut config = BuildConfig::default();
    if let Some(runtime) = &args.runtime {
        config.runtime = Some(runtime.parse()?);
    }
    if let Some(manager) = &args.manager {
        config.manager = manager.parse()?;
    }
    if args.docker {
        config.docker_enabled = true;
    }
    if args.image.is_some() {
        config.image = args.image.clone();
    }
    if args.dockerfile.is_some() {
        config.dockerfile = args.dockerfile.clone();
    }
    if args.no_slim {
        config.slim = false;
    }
    Ok(config)
}

fn project_root(path: &Option<PathBuf>) -> Result<PathBuf> {
    match path {
        Some(path) => Ok(path.clone()),
        None => Ok(env::current_dir()?),
    }
}

fn open_store(arg: &Option<PathBuf>, project: &Project) -> Result<ArtifactStore> {
    let root = match arg {
        Some(dir) => dir.clone(),
        None => env::var("PACKBOX_STORE_DIR").map(PathBuf::from).map_err(|_| {
            PackError::Configuration(
                "No store configured; pass --store or set PACKBOX_STORE_DIR".to_string(),
            )
        })?,
    };
    let client = Arc::new(FsObjectClient::new(root)?);
    Ok(ArtifactStore::from_config(client, project.config()))
}

fn exit_code_for(e: &PackError) -> i32 {
    error!("{e}");
    match e {
        PackError::Configuration(_) => 2,
        _ => 1,
    }
}
