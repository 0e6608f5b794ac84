//! `satgrid` command-line entry point.

use clap::{Parser, Subcommand};
use satgrid_grid::{ImageGrid, NominatimLookup};
use satgrid_runner::{
    credentials_from_env, harvest_city, init_logging, load_cities, run_batch, BatchOptions,
    CityFilter, RunnerConfig, RunnerError,
};
use satgrid_tiles::{Coordinate, RequestQuota, StaticMapClient, TileStore};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "satgrid")]
#[command(about = "Harvest satellite tiles covering cities")]
#[command(version)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug)]
struct CityArgs {
    /// City name as understood by the geocoder
    #[arg(long)]
    name: String,

    #[arg(long)]
    country: String,

    /// Centre latitude in degrees
    #[arg(long, allow_negative_numbers = true)]
    lat: f64,

    /// Centre longitude in degrees
    #[arg(long, allow_negative_numbers = true)]
    lng: f64,

    /// Radius in km, overriding the configured value
    #[arg(long)]
    radius: Option<f64>,
}

impl CityArgs {
    fn center(&self) -> Coordinate {
        Coordinate::new(self.lat, self.lng)
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Harvest every selected city from a worldcities-style CSV
    Batch {
        /// Path to the city table
        #[arg(long)]
        cities: PathBuf,
    },

    /// Harvest a single city
    City(CityArgs),

    /// Print the grid of a city as JSON map markers
    Markers(CityArgs),

    /// Inspect or change the remaining request quota
    Quota {
        #[command(subcommand)]
        action: QuotaAction,
    },

    /// Maintain the tile index
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },
}

#[derive(Subcommand, Debug)]
enum QuotaAction {
    /// Print the remaining request count
    Show,
    /// Overwrite the remaining request count
    Set { remaining: u64 },
}

#[derive(Subcommand, Debug)]
enum IndexAction {
    /// Drop index entries whose image file is gone
    Rescan,
}

/// What a successful command asks the process to exit with.
enum Outcome {
    Done,
    QuotaExhausted,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(Outcome::Done) => ExitCode::SUCCESS,
        Ok(Outcome::QuotaExhausted) => ExitCode::from(2),
        Err(e) => {
            error!(error = %e, "satgrid failed");
            eprintln!("Error: {}", e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

fn run(cli: Cli) -> Result<Outcome, RunnerError> {
    let config = RunnerConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Batch { cities } => run_batch_command(&config, &cities),
        Command::City(args) => run_city_command(&config, &args),
        Command::Markers(args) => {
            let lookup = geocoder(&config)?;
            let params = config.grid_params(args.radius);
            let grid =
                ImageGrid::for_city(&lookup, &args.name, &args.country, args.center(), params)?;
            println!("{}", grid.markers_json());
            Ok(Outcome::Done)
        }
        Command::Quota { action } => {
            let mut quota = open_quota(&config)?;
            match action {
                QuotaAction::Show => println!("{}", quota.remaining()),
                QuotaAction::Set { remaining } => {
                    quota.set(remaining);
                    info!(remaining, "Quota updated");
                }
            }
            quota.close()?;
            Ok(Outcome::Done)
        }
        Command::Index { action } => match action {
            IndexAction::Rescan => {
                let mut store = TileStore::open(config.store_config())?;
                let report = store.rescan();
                store.close()?;
                println!("retained {}, pruned {}", report.retained, report.pruned);
                Ok(Outcome::Done)
            }
        },
    }
}

fn run_batch_command(config: &RunnerConfig, path: &Path) -> Result<Outcome, RunnerError> {
    let filter = CityFilter::from_config(&config.batch);
    let cities = filter.select(load_cities(path)?);
    info!(cities = cities.len(), path = %path.display(), "Selected cities");

    let lookup = geocoder(config)?;
    let options = BatchOptions {
        params: config.grid_params(None),
        city_delay: config.city_delay(),
    };

    let mut store = TileStore::open(config.store_config())?;
    let mut client = open_client(config)?;
    let result = run_batch(&cities, &lookup, &mut store, &mut client, &options);
    close_all(store, client)?;

    let report = result?;
    if report.quota_exhausted {
        Ok(Outcome::QuotaExhausted)
    } else {
        Ok(Outcome::Done)
    }
}

fn run_city_command(config: &RunnerConfig, args: &CityArgs) -> Result<Outcome, RunnerError> {
    let lookup = geocoder(config)?;
    let options = BatchOptions {
        params: config.grid_params(args.radius),
        city_delay: Duration::ZERO,
    };

    let mut store = TileStore::open(config.store_config())?;
    let mut client = open_client(config)?;
    let result = harvest_city(
        &lookup,
        &mut store,
        &mut client,
        &args.name,
        &args.country,
        args.center(),
        &options,
    );
    close_all(store, client)?;

    match result {
        Ok(summary) => {
            println!("saved {}, already cached {}", summary.saved, summary.skipped);
            Ok(Outcome::Done)
        }
        Err(e) if e.is_quota_exhausted() => Ok(Outcome::QuotaExhausted),
        Err(e) => Err(e.into()),
    }
}

fn geocoder(config: &RunnerConfig) -> Result<NominatimLookup, RunnerError> {
    Ok(NominatimLookup::with_endpoint(
        &config.geocoder.base_url,
        &config.geocoder.user_agent,
    )?)
}

fn open_quota(config: &RunnerConfig) -> Result<RequestQuota, RunnerError> {
    Ok(RequestQuota::open(
        &config.storage.quota_file,
        config.storage.initial_quota,
    )?)
}

fn open_client(config: &RunnerConfig) -> Result<StaticMapClient, RunnerError> {
    let credentials = credentials_from_env(&config.api)?;
    let quota = open_quota(config)?;
    info!(remaining = quota.remaining(), "Request quota loaded");
    Ok(StaticMapClient::new(config.fetch_config(), credentials, quota)?)
}

/// Close the store and the client's quota, reporting the first failure.
fn close_all(store: TileStore, client: StaticMapClient) -> Result<(), RunnerError> {
    let stats = client.stats();
    info!(
        tiles = stats.tiles_downloaded,
        bytes = stats.bytes_downloaded,
        remaining = client.quota().remaining(),
        "Download totals"
    );
    let store_result = store.close();
    let client_result = client.close();
    store_result?;
    client_result?;
    Ok(())
}
