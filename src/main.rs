mod cleaner;
mod config;
mod deleter;
mod duration;
mod error;
mod lifecycle;
mod registry;
mod report;
mod scanner;
mod system_io;
mod types;

use chrono::Local;
use clap::{Parser, Subcommand};
use config::Config;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about = "Temporary folders that clean up after themselves", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Folder expiration time when no subcommand is given (e.g. 2h, 30m, 1h30m) [default: 4h]
    #[arg(long)]
    deadtime: Option<String>,

    /// Directory new folders are created in
    #[arg(long, short = 'b', global = true, value_name = "DIR")]
    base_dir: Option<PathBuf>,

    /// Log engine decisions to stderr
    #[arg(long, short = 'v', global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a new temporary folder
    New {
        /// Folder expiration time (e.g. 2h, 30m, 1h30m) [default: 4h]
        #[arg(long)]
        deadtime: Option<String>,
    },
    /// List tracked folders and their remaining time
    List,
    /// Remove folders that expired or went idle
    Clean,
    /// Delete every tracked folder immediately
    Deletenow,
}

fn main() {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    let config = Config::from_env().with_base_dir(args.base_dir.clone());

    if let Err(e) = run(args, &config) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(args: Args, config: &Config) -> error::Result<()> {
    let remover = lifecycle::default_remover(config);
    let command = args.command.unwrap_or(Command::New {
        deadtime: args.deadtime,
    });

    // clean and deletenow reclaim on their own
    if matches!(command, Command::New { .. }) {
        lifecycle::auto_clean(config, &remover, Local::now());
    }

    match command {
        Command::New { deadtime } => {
            let deadtime = config.resolve_deadtime(deadtime.as_deref());
            let entry = lifecycle::create_folder(config, deadtime, Local::now())?;
            report::print_created(&entry);
        }
        Command::List => {
            let listings = lifecycle::list_folders(config, Local::now())?;
            report::print_listing(&listings);
        }
        Command::Clean => {
            let outcome = lifecycle::reclaim_expired(config, &remover, Local::now())?;
            report::print_reclaim(&outcome, "Cleaned", "No expired folders to clean.");
        }
        Command::Deletenow => {
            let outcome = lifecycle::delete_all(config, &remover)?;
            report::print_reclaim(&outcome, "Deleted", "No temporary folders to delete.");
        }
    }

    Ok(())
}
