use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use citymap::{
    core::{
        events::{City, RecvTimeoutError},
        location::FixedLocator,
    },
    Explorer, ExplorerConfig, MapEvent, MemorySurface,
};
use clap::{Parser, ValueEnum};

/// Headless explorer: fetches every enabled layer around the start position,
/// follows an optional city jump and logs what lands on the map
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// JSON explorer config; defaults are used when absent
    #[arg(long, env = "CITYMAP_CONFIG")]
    config: Option<PathBuf>,
    /// City to jump to once the map is ready
    #[arg(value_enum)]
    city: Option<CityArg>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum CityArg {
    Seattle,
    Portland,
    SanFrancisco,
    NewYork,
    Chicago,
}

impl From<CityArg> for City {
    fn from(arg: CityArg) -> Self {
        match arg {
            CityArg::Seattle => City::Seattle,
            CityArg::Portland => City::Portland,
            CityArg::SanFrancisco => City::SanFrancisco,
            CityArg::NewYork => City::NewYork,
            CityArg::Chicago => City::Chicago,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => ExplorerConfig::from_path(path)?,
        None => ExplorerConfig::default(),
    };

    let surface = Arc::new(MemorySurface::new());
    let locator = FixedLocator(config.initial_center);
    let explorer = Explorer::from_config(config, surface.clone())?;

    let events = explorer.subscribe();
    std::thread::spawn(move || loop {
        match events.recv_timeout(Duration::from_secs(60)) {
            Ok(MapEvent::LayerUpdated {
                layer,
                added,
                removed,
                total,
            }) => log::info!("{}: +{} -{} ({} shown)", layer, added, removed, total),
            Ok(MapEvent::LayerFailed { layer, error }) => log::warn!("{} failed: {}", layer, error),
            Ok(MapEvent::VehiclesUpdated {
                count,
                failed_feeds,
            }) => log::info!("vehicles: {} ({} feeds failed)", count, failed_feeds),
            Ok(event) => log::debug!("{:?}", event),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    });

    let viewport = explorer.start(&locator).await;
    log::info!("map ready at {:?} zoom {}", viewport.center(), viewport.zoom);

    if let Some(city) = args.city {
        explorer.select_city(city.into());
    }
    log::info!("{}", explorer.title());

    tokio::signal::ctrl_c().await?;
    explorer.shutdown();
    log::info!("{:?}", surface.stats());

    Ok(())
}
