use packbox::cli::{handle_delete, handle_package, handle_status, CliArgs, Commands};
use packbox::{logging, VERSION};

use clap::Parser;
use tracing::{debug, Level};

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    init_logging_from_args(&args);

    debug!("packbox v{} starting", VERSION);
    debug!("Arguments: {:?}", args);

    let exit_code = match &args.command {
        Commands::Package(package_args) => handle_package(package_args).await,
        Commands::Status(status_args) => handle_status(status_args).await,
        Commands::Delete(delete_args) => handle_delete(delete_args).await,
    };

    std::process::exit(exit_code);
}

fn init_logging_from_args(args: &CliArgs) {
    if let Some(level_str) = &args.log_level {
        logging::init_with_level(parse_level(level_str));
    } else if args.verbose {
        logging::init_with_level(Level::DEBUG);
    } else if args.quiet {
        logging::init_with_level(Level::ERROR);
    } else {
        logging::init_from_env();
    }
}

fn parse_level(level_str: &str) -> Level {
    match level_str.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => {
            eprintln!(
                "Invalid log level '{}', defaulting to INFO. Valid levels: trace, debug, info, warn, error",
                level_str
            );
            Level::INFO
        }
    }
}
