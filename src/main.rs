use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use wardaff::{
    assign::Covers,
    infer::PlausibleRange,
    io::{self, OTTAWA_WARDS_URL, OTTAWA_WARD_NAMES_URL},
    names::WardNames,
    pipeline, render,
    wards::ward_polygons,
};

/// Builds the ward affordability tables from listings, ward boundaries and
/// ward income.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Raw listings CSV (latitude, longitude, price, walkScore, style).
    #[arg(long, env = "WARDAFF_LISTINGS")]
    listings: PathBuf,

    /// Ward income CSV (Ward, Average_Household_Income).
    #[arg(long, env = "WARDAFF_INCOME")]
    income: PathBuf,

    /// Ward boundaries as a GeoJSON file. Fetched from --wards-url when absent.
    #[arg(long, env = "WARDAFF_WARDS")]
    wards: Option<PathBuf>,

    #[arg(long, env = "WARDAFF_WARDS_URL", default_value = OTTAWA_WARDS_URL)]
    wards_url: String,

    /// Page listing ward numbers and names.
    #[arg(long, env = "WARDAFF_WARD_NAMES_URL", default_value = OTTAWA_WARD_NAMES_URL)]
    ward_names_url: String,

    /// Use the built-in Ottawa ward names instead of fetching them.
    #[arg(long)]
    offline_names: bool,

    /// CSV of ward names (Ward, Ward_Name) overriding the resolved names.
    #[arg(long, env = "WARDAFF_WARD_NAMES")]
    ward_names: Option<PathBuf>,

    #[arg(long, env = "WARDAFF_OUT_DIR", default_value = ".")]
    out_dir: PathBuf,

    /// Also render a PNG map of the affordability bands.
    #[arg(long, env = "WARDAFF_MAP")]
    map: Option<PathBuf>,

    #[arg(long, default_value_t = 800)]
    map_size: u32,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    run(Args::parse())
}

fn run(args: Args) -> Result<()> {
    let listings = io::load_listings(&args.listings)?;
    let incomes = io::load_income(&args.income)?;

    let features = match &args.wards {
        Some(path) => io::load_ward_features(path)?,
        None => io::fetch_ward_features(&args.wards_url)?,
    };
    let (field, wards) = ward_polygons(features, &PlausibleRange::default())?;
    info!(field = %field, wards = wards.len(), "detected ward id field");

    let mut names = if args.offline_names {
        WardNames::fallback()
    } else {
        WardNames::resolve(io::fetch_ward_names(&args.ward_names_url))
    };
    if let Some(path) = &args.ward_names {
        names.extend(io::load_ward_names(path)?);
    }

    let out = pipeline::run(&listings, &wards, &incomes, &Covers);
    io::save_outputs(&args.out_dir, &out.wards, &out.dashboard, &names)?;

    if let Some(path) = &args.map {
        render::save_map(path, &wards, &out.dashboard, &out.assigned, &Covers, args.map_size)
            .with_context(|| format!("writing map {}", path.display()))?;
        info!(path = %path.display(), "wrote map");
    }

    out.summary.log();
    Ok(())
}
