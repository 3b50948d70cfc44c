use std::{env, path::PathBuf, sync::Arc};

use blok::{
    config::Config,
    is_blocked,
    notify::{NotificationSink, Silent, TracingNotifier},
    page::PageFilter,
    sink::JsonFileRuleSink,
    store::JsonFileStore,
    BlockList, BlokError,
};
use clap::{Parser, Subcommand};

// entrypoint wiring the block list to file-backed storage and rules

const DEFAULT_EXPORT_NAME: &str = "blok-blocked-sites.json";

#[derive(Debug, Parser)]
#[command(name = "blok", version, about, long_about = None)]
struct Args {
    /// configuration file (defaults to $BLOK_CONFIG, then ./config.yaml)
    #[arg(long, short = 'c', value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// block a domain
    Add { domain: String },
    /// unblock a stored entry
    Remove { domain: String },
    /// show blocked entries
    List,
    /// remove every entry
    Clear,
    /// replace the list with a JSON array file
    Import { file: PathBuf },
    /// write the list as a JSON array
    Export { file: Option<PathBuf> },
    /// print the rules generated for the current list
    Rules,
    /// regenerate and apply the rule set
    Sync,
    /// test a url against the list
    Check { url: String },
    /// block the site a page url belongs to
    BlockPage { url: String },
    /// hide blocked references in an html file, printing the result
    Filter {
        #[arg(long, value_name = "URL")]
        page_url: String,
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    init_tracing();

    let args = Args::parse();
    let config_path = args
        .config
        .clone()
        .or_else(|| env::var("BLOK_CONFIG").ok().map(PathBuf::from));

    let config = Config::load(config_path).unwrap_or_else(|err| {
        eprintln!("failed to load configuration: {err}");
        std::process::exit(1);
    });

    if let Err(err) = run(args.command, &config).await {
        tracing::debug!(error = %err, "command failed");
        eprintln!("{}", err.user_message());
        std::process::exit(1);
    }
}

async fn run(command: Command, config: &Config) -> Result<(), BlokError> {
    let notifier: Arc<dyn NotificationSink> = if config.notifications {
        Arc::new(TracingNotifier)
    } else {
        Arc::new(Silent)
    };
    let list = BlockList::open(
        Arc::new(JsonFileStore::new(&config.store_path)),
        Arc::new(JsonFileRuleSink::new(&config.rules_path)),
        notifier,
    )
    .await?;

    match command {
        Command::Add { domain } => {
            let domain = list.add(&domain).await?;
            println!("{domain} added to the block list.");
        }
        Command::Remove { domain } => {
            if list.remove(&domain).await? {
                println!("{domain} removed from the block list.");
            } else {
                println!("{domain} is not on the block list.");
            }
        }
        Command::List => {
            let entries = list.list().await?;
            if entries.is_empty() {
                println!("No blocked sites yet.");
            }
            for entry in entries {
                println!("{entry}");
            }
        }
        Command::Clear => {
            list.clear().await?;
            println!("All blocked sites removed.");
        }
        Command::Import { file } => {
            let contents = tokio::fs::read_to_string(&file).await?;
            let count = list.import(&contents).await?;
            println!("List imported ({count} entries).");
        }
        Command::Export { file } => {
            let json = list.export().await?;
            let file = file.unwrap_or_else(|| PathBuf::from(DEFAULT_EXPORT_NAME));
            tokio::fs::write(&file, json).await?;
            println!("List exported to {}.", file.display());
        }
        Command::Rules => {
            let rules = list.preview_rules().await?;
            let json = serde_json::to_string_pretty(&rules)
                .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;
            println!("{json}");
        }
        Command::Sync => {
            let count = list.sync_rules().await?;
            println!("{count} rules active.");
        }
        Command::Check { url } => {
            let verdict = if is_blocked(&list.snapshot(), &url) {
                "blocked"
            } else {
                "allowed"
            };
            println!("{verdict}");
        }
        Command::BlockPage { url } => {
            let domain = list.block_page(&url).await?;
            println!("{domain} added to the block list.");
        }
        Command::Filter { page_url, file } => {
            let html = tokio::fs::read_to_string(&file).await?;
            let page = PageFilter::from_config(&config.page).filter_html(
                &list.snapshot(),
                &page_url,
                &html,
            )?;
            print!("{}", page.html);
        }
    }

    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::prelude::*;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
