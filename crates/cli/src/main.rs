//! chimap CLI - chi-space river profile analysis

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use chimap_algorithms::chi::{
    assign_segment_ids, bin_slope_area, detect_knickpoints, extract_network,
    extract_network_chi_only, filter_knickpoints, slope_area_data, sweep_concavity,
    ChannelNetwork, SegmentParams, SweepParams, DEFAULT_SIGMA,
};
use chimap_algorithms::export::{
    write_baselevel_key_table, write_channel_table, write_chi_map, write_collinearity_stats,
    write_collinearity_summary, write_knickpoint_table, write_slope_area_binned,
    write_slope_area_raw, write_source_key_table,
};
use chimap_algorithms::flow::{decompose_network, flow_direction, ChannelTriple, FlowRouting};
use chimap_core::graph::{ChiParams, FlowGraph};
use chimap_core::io::read_dem;
use chimap_core::Raster;

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "chimap")]
#[command(author, version, about = "Chi-space river profile analysis", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Parameters of the chi coordinate and channel network shared by every
/// analysis.
#[derive(Args)]
struct ChiArgs {
    /// Concavity exponent (m/n ratio)
    #[arg(long, default_value = "0.5")]
    m_over_n: f64,

    /// Reference drainage area A_0 (m²)
    #[arg(long, default_value = "1.0")]
    a_0: f64,

    /// Contributing cells above which a cell is channelized
    #[arg(long, default_value = "1000")]
    threshold_contributing_pixels: usize,
}

/// Monte Carlo segment fitting parameters.
#[derive(Args)]
struct SegmentArgs {
    /// Window size of the segment search, in nodes
    #[arg(long, default_value = "80")]
    target_nodes: usize,

    /// Monte Carlo iterations per window
    #[arg(long, default_value = "20")]
    n_iterations: usize,

    /// Maximum boundary displacement per iteration, in nodes
    #[arg(long, default_value = "2")]
    skip: usize,

    /// Smallest admissible segment, in nodes
    #[arg(long, default_value = "10")]
    minimum_segment_length: usize,

    /// Gaussian residual scale of the segment likelihood (m)
    #[arg(long, default_value = "20.0")]
    sigma: f64,

    /// RNG seed for the boundary search
    #[arg(long, default_value = "1")]
    seed: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Chi coordinate of every node, as CSV
    ChiMap {
        /// Input DEM (GeoTIFF)
        input: PathBuf,
        /// Output CSV file
        output: PathBuf,
        #[command(flatten)]
        chi: ChiArgs,
        /// Add a basin id column
        #[arg(long)]
        basins: bool,
    },
    /// Extract the channel network and fit chi-elevation segments
    Profile {
        /// Input DEM (GeoTIFF)
        input: PathBuf,
        /// Output CSV file
        output: PathBuf,
        #[command(flatten)]
        chi: ChiArgs,
        #[command(flatten)]
        segment: SegmentArgs,
        /// Also write source-key and baselevel-key tables next to the output
        #[arg(long)]
        write_keys: bool,
    },
    /// Detect knickpoints along the fitted channel network
    Knickpoints {
        /// Input DEM (GeoTIFF)
        input: PathBuf,
        /// Output CSV file
        output: PathBuf,
        #[command(flatten)]
        chi: ChiArgs,
        #[command(flatten)]
        segment: SegmentArgs,
        /// Suppress weaker knickpoints within this radius (map units)
        #[arg(long)]
        filter_window: Option<f64>,
    },
    /// Sweep the concavity exponent and score basin collinearity
    Movern {
        /// Input DEM (GeoTIFF)
        input: PathBuf,
        /// Output prefix; writes <prefix>_movernstats_*.csv files
        output_prefix: String,
        #[command(flatten)]
        chi: ChiArgs,
        /// First exponent tested
        #[arg(long, default_value = "0.1")]
        start_movern: f64,
        /// Exponent increment between steps
        #[arg(long, default_value = "0.1")]
        delta_movern: f64,
        /// Number of exponents tested
        #[arg(long, default_value = "8")]
        n_movern: usize,
        /// Compare every channel pair instead of tributaries vs mainstem
        #[arg(long)]
        all_pairs: bool,
    },
    /// Slope-area analysis of the channel network
    SlopeArea {
        /// Input DEM (GeoTIFF)
        input: PathBuf,
        /// Output prefix; writes <prefix>_SAvertical.csv and <prefix>_SAbinned.csv
        output_prefix: String,
        #[command(flatten)]
        chi: ChiArgs,
        /// Vertical drop over which slope is measured (m)
        #[arg(long, default_value = "20.0")]
        sa_vertical_interval: f64,
        /// Bin width in log10 drainage area
        #[arg(long, default_value = "0.1")]
        log_a_bin_width: f64,
    },
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn load_dem(path: &PathBuf) -> Result<Raster<f64>> {
    let pb = spinner("Reading DEM...");
    let dem = read_dem(path).context("Failed to read DEM")?;
    pb.finish_and_clear();
    info!("Input: {} x {}", dem.cols(), dem.rows());
    Ok(dem)
}

/// Build the routing graph and the channel decomposition from a DEM.
fn build_network(
    dem: &Raster<f64>,
    chi_args: &ChiArgs,
) -> Result<(FlowRouting, Vec<ChannelTriple>, ChiParams)> {
    let pb = spinner("Routing flow...");
    let fdir = flow_direction(dem).context("Failed to compute flow direction")?;
    let routing = FlowRouting::build(dem, &fdir).context("Failed to build flow routing")?;
    pb.finish_and_clear();

    let cell_area = routing.cell_size() * routing.cell_size();
    let area_threshold = chi_args.threshold_contributing_pixels as f64 * cell_area;
    let triples = decompose_network(&routing, area_threshold);
    info!(
        "Network: {} channels, {} basins",
        triples.len(),
        routing.baselevel_nodes().len()
    );

    let params = ChiParams {
        concavity: chi_args.m_over_n,
        reference_area: chi_args.a_0,
        area_threshold,
    };
    Ok((routing, triples, params))
}

fn segment_params(args: &SegmentArgs) -> SegmentParams {
    SegmentParams {
        target_nodes: args.target_nodes,
        n_iterations: args.n_iterations,
        skip: args.skip,
        minimum_segment_length: args.minimum_segment_length,
        sigma: args.sigma,
        seed: args.seed,
    }
}

fn fit_network(
    routing: &FlowRouting,
    triples: &[ChannelTriple],
    chi_params: &ChiParams,
    segment: &SegmentArgs,
) -> Result<(ChannelNetwork, Vec<f64>)> {
    let chi = routing.chi(chi_params);
    let pb = spinner("Fitting segments...");
    let network = extract_network(routing, triples, &chi, &segment_params(segment))
        .context("Failed to extract channel network")?;
    pb.finish_and_clear();
    Ok((network, chi))
}

fn create_output(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create output file {}", path.display()))?;
    Ok(BufWriter::new(file))
}

fn done(name: &str, path: &Path, elapsed: std::time::Duration) {
    println!("{} saved to: {}", name, path.display());
    println!("  Processing time: {:.2?}", elapsed);
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::ChiMap {
            input,
            output,
            chi,
            basins,
        } => {
            let dem = load_dem(&input)?;
            let start = Instant::now();
            let (routing, _, chi_params) = build_network(&dem, &chi)?;
            let chi_values = routing.chi(&chi_params);
            let elapsed = start.elapsed();

            let mut out = create_output(&output)?;
            write_chi_map(&mut out, &routing, &chi_values, basins)
                .context("Failed to write chi map")?;
            done("Chi map", &output, elapsed);
        }

        Commands::Profile {
            input,
            output,
            chi,
            segment,
            write_keys,
        } => {
            let dem = load_dem(&input)?;
            let start = Instant::now();
            let (routing, triples, chi_params) = build_network(&dem, &chi)?;
            let (mut network, _) = fit_network(&routing, &triples, &chi_params, &segment)?;
            let segments = assign_segment_ids(&mut network)?;
            let elapsed = start.elapsed();
            info!(
                "Fitted {} segments over {} channel nodes",
                segments,
                network.len()
            );

            let mut out = create_output(&output)?;
            write_channel_table(&mut out, &network, &routing)
                .context("Failed to write channel table")?;

            if write_keys {
                let sources = output.with_extension("source_keys.csv");
                let mut out = create_output(&sources)?;
                write_source_key_table(&mut out, &network, &routing)
                    .context("Failed to write source key table")?;

                let baselevels = output.with_extension("baselevel_keys.csv");
                let mut out = create_output(&baselevels)?;
                write_baselevel_key_table(&mut out, &network, &routing)
                    .context("Failed to write baselevel key table")?;
                info!(
                    "Key tables: {} and {}",
                    sources.display(),
                    baselevels.display()
                );
            }
            done("Channel profile", &output, elapsed);
        }

        Commands::Knickpoints {
            input,
            output,
            chi,
            segment,
            filter_window,
        } => {
            let dem = load_dem(&input)?;
            let start = Instant::now();
            let (routing, triples, chi_params) = build_network(&dem, &chi)?;
            let (network, _) = fit_network(&routing, &triples, &chi_params, &segment)?;

            let knickpoints = detect_knickpoints(&network)?;
            let knickpoints = match filter_window {
                Some(window) => filter_knickpoints(&network, &routing, &knickpoints, window),
                None => knickpoints,
            };
            let elapsed = start.elapsed();
            info!("{} knickpoints", knickpoints.len());

            let mut out = create_output(&output)?;
            write_knickpoint_table(&mut out, &network, &routing, &knickpoints)
                .context("Failed to write knickpoint table")?;
            done("Knickpoints", &output, elapsed);
        }

        Commands::Movern {
            input,
            output_prefix,
            chi,
            start_movern,
            delta_movern,
            n_movern,
            all_pairs,
        } => {
            let dem = load_dem(&input)?;
            let start = Instant::now();
            let (routing, triples, chi_params) = build_network(&dem, &chi)?;

            let pb = spinner("Sweeping concavity...");
            let params = SweepParams {
                start: start_movern,
                delta: delta_movern,
                n_steps: n_movern,
                mainstem_only: !all_pairs,
                sigma: DEFAULT_SIGMA,
                chi: chi_params,
            };
            let result = sweep_concavity(&routing, &triples, &params)
                .context("Concavity sweep failed")?;
            pb.finish_and_clear();
            let elapsed = start.elapsed();

            for step in &result.steps {
                let path = PathBuf::from(format!(
                    "{}_movernstats_{:.3}_fullstats.csv",
                    output_prefix, step.concavity
                ));
                let mut out = create_output(&path)?;
                write_collinearity_stats(&mut out, step)
                    .context("Failed to write collinearity stats")?;
            }
            let summary_path = PathBuf::from(format!("{}_movernstats_basinstats.csv", output_prefix));
            let mut out = create_output(&summary_path)?;
            write_collinearity_summary(&mut out, &result)
                .context("Failed to write collinearity summary")?;

            // extraction here only reports; chi at the first exponent
            let network = extract_network_chi_only(
                &routing,
                &triples,
                &routing.chi(&chi_params.with_concavity(start_movern)),
            )?;
            for basin_key in 0..network.basin_count() {
                match result.best_concavity(basin_key) {
                    Some(best) => info!("Basin {}: best-fit m/n = {:.3}", basin_key, best),
                    None => info!("Basin {}: no finite collinearity score", basin_key),
                }
            }
            done("Concavity sweep", &summary_path, elapsed);
        }

        Commands::SlopeArea {
            input,
            output_prefix,
            chi,
            sa_vertical_interval,
            log_a_bin_width,
        } => {
            let dem = load_dem(&input)?;
            let start = Instant::now();
            let (routing, triples, chi_params) = build_network(&dem, &chi)?;
            let chi_values = routing.chi(&chi_params);
            let network = extract_network_chi_only(&routing, &triples, &chi_values)?;

            let points = slope_area_data(&network, &routing, sa_vertical_interval)?;
            let bins = bin_slope_area(&network, &points, log_a_bin_width);
            let elapsed = start.elapsed();
            info!("{} slope measurements in {} bins", points.len(), bins.len());

            let raw_path = PathBuf::from(format!("{}_SAvertical.csv", output_prefix));
            let mut out = create_output(&raw_path)?;
            write_slope_area_raw(&mut out, &network, &routing, &points)
                .context("Failed to write slope-area data")?;

            let binned_path = PathBuf::from(format!("{}_SAbinned.csv", output_prefix));
            let mut out = create_output(&binned_path)?;
            write_slope_area_binned(&mut out, &bins)
                .context("Failed to write binned slope-area data")?;
            done("Slope-area analysis", &binned_path, elapsed);
        }
    }

    Ok(())
}
