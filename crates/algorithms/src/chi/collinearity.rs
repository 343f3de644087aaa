//! Cross-tributary collinearity testing and concavity sweeps.
//!
//! At the correct concavity exponent, every tributary of a basin collapses
//! onto its mainstem in chi-elevation space. The test projects each test
//! channel's nodes onto a reference channel's profile by linear
//! interpolation in chi, scores the residuals with a Gaussian likelihood,
//! and aggregates pairwise scores per basin. Sweeping the exponent and
//! keeping the likelihood-maximizing value yields the best-fit concavity.

use crate::chi::extract::extract_network_chi_only;
use crate::chi::network::ChannelNetwork;
use crate::flow::ChannelTriple;
use crate::maybe_rayon::*;
use chimap_core::graph::{ChiParams, FlowGraph, NodeId};
use chimap_core::Result;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Residual scale (m) of the Gaussian likelihood. The scale cancels when
/// comparing exponents against each other, so a single fixed value serves
/// every sweep.
pub const DEFAULT_SIGMA: f64 = 1000.0;

/// Collinearity score of one (reference, test) channel pair.
#[derive(Debug, Clone, Copy)]
pub struct CollinearityPair {
    pub reference_source_key: usize,
    pub test_source_key: usize,
    /// Gaussian likelihood of the projection residuals
    pub mle: f64,
    /// Root mean square of the projection residuals (m)
    pub rmse: f64,
}

/// Aggregate collinearity of one basin at one concavity exponent.
#[derive(Debug, Clone)]
pub struct BasinCollinearity {
    pub basin_key: usize,
    pub pairs: Vec<CollinearityPair>,
    /// Product of the pairwise likelihoods
    pub total_mle: f64,
}

/// One exponent step of a concavity sweep.
#[derive(Debug, Clone)]
pub struct SweepStep {
    pub concavity: f64,
    pub basins: Vec<BasinCollinearity>,
}

/// Full concavity sweep over all basins.
#[derive(Debug, Clone)]
pub struct SweepResult {
    pub steps: Vec<SweepStep>,
    /// Baselevel node per basin key
    pub outlet_nodes: Vec<NodeId>,
}

impl SweepResult {
    /// Exponent with the highest aggregate likelihood for a basin, if the
    /// basin produced any finite scores.
    pub fn best_concavity(&self, basin_key: usize) -> Option<f64> {
        let mut best: Option<(f64, f64)> = None;
        for step in &self.steps {
            let basin = step.basins.iter().find(|b| b.basin_key == basin_key)?;
            if !basin.total_mle.is_finite() {
                continue;
            }
            match best {
                Some((_, mle)) if basin.total_mle <= mle => {}
                _ => best = Some((step.concavity, basin.total_mle)),
            }
        }
        best.map(|(concavity, _)| concavity)
    }
}

/// Tuning of a concavity sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepParams {
    /// First exponent tested
    pub start: f64,
    /// Exponent increment between steps
    pub delta: f64,
    /// Number of exponents tested
    pub n_steps: usize,
    /// Compare tributaries against the mainstem only, instead of all pairs
    pub mainstem_only: bool,
    /// Gaussian residual scale (m)
    pub sigma: f64,
    /// Chi transform parameters; `concavity` is overridden per step
    pub chi: ChiParams,
}

impl Default for SweepParams {
    fn default() -> Self {
        Self {
            start: 0.1,
            delta: 0.1,
            n_steps: 8,
            mainstem_only: true,
            sigma: DEFAULT_SIGMA,
            chi: ChiParams::default(),
        }
    }
}

/// Project a test profile onto a reference profile.
///
/// Both profiles run source to mouth, so chi decreases monotonically.
/// Each test node whose chi falls inside the reference range contributes
/// one residual: test elevation minus the reference elevation linearly
/// interpolated at the test node's chi. Targets outside the range are
/// skipped; fewer than two nodes on either side yields no residuals.
pub fn project_onto_reference(
    reference_chi: &[f64],
    reference_elevation: &[f64],
    test_chi: &[f64],
    test_elevation: &[f64],
) -> Vec<f64> {
    let n = reference_chi.len();
    if n < 2 || test_chi.len() < 2 {
        return Vec::new();
    }

    let mut residuals = Vec::new();
    for (&chi, &elevation) in test_chi.iter().zip(test_elevation) {
        // first index with reference chi <= target; reference is decreasing
        let mut end = reference_chi.partition_point(|&c| c > chi);
        if end == 0 {
            if chi == reference_chi[0] {
                end = 1;
            } else {
                continue;
            }
        }
        if end == n {
            continue;
        }
        let (chi_up, chi_down) = (reference_chi[end - 1], reference_chi[end]);
        let (z_up, z_down) = (reference_elevation[end - 1], reference_elevation[end]);
        let fraction = if chi_up == chi_down {
            0.0
        } else {
            (chi_up - chi) / (chi_up - chi_down)
        };
        let interpolated = z_up + fraction * (z_down - z_up);
        residuals.push(elevation - interpolated);
    }
    residuals
}

/// Gaussian likelihood of a residual vector. Empty residuals score the
/// neutral 1.0.
pub fn mle_from_residuals(residuals: &[f64], sigma: f64) -> f64 {
    let norm = sigma * (2.0 * std::f64::consts::PI).sqrt();
    residuals
        .iter()
        .map(|r| (-r * r / (2.0 * sigma * sigma)).exp() / norm)
        .product()
}

/// Root mean square of a residual vector; 0.0 when empty.
pub fn rmse_from_residuals(residuals: &[f64]) -> f64 {
    if residuals.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = residuals.iter().map(|r| r * r).sum();
    (sum_sq / residuals.len() as f64).sqrt()
}

/// Score the collinearity of one basin's channels.
///
/// With `mainstem_only` the mainstem (the basin's first source key) is the
/// reference for every tributary; otherwise every unordered channel pair
/// is scored. Pairs with no chi overlap contribute the neutral score
/// (mle 1.0, rmse 0.0). A basin with a single channel scores 1.0.
pub fn basin_collinearity<G: FlowGraph>(
    network: &ChannelNetwork,
    graph: &G,
    basin_key: usize,
    mainstem_only: bool,
    sigma: f64,
) -> Result<BasinCollinearity> {
    let ranges = network.basin_source_ranges()?;
    let range = ranges
        .get(basin_key)
        .cloned()
        .ok_or(chimap_core::Error::UnknownBasinKey(basin_key))?;
    let mut pairs = Vec::new();

    let reference_keys: Vec<usize> = if mainstem_only {
        vec![range.start]
    } else {
        range.clone().collect()
    };

    for reference_key in reference_keys {
        let (ref_chi, ref_elev) = network.channel_profile(graph, reference_key)?;
        let test_keys = if mainstem_only {
            range.start + 1..range.end
        } else {
            reference_key + 1..range.end
        };
        for test_key in test_keys {
            let (test_chi, test_elev) = network.channel_profile(graph, test_key)?;
            let residuals = project_onto_reference(&ref_chi, &ref_elev, &test_chi, &test_elev);
            let (mle, rmse) = if residuals.is_empty() {
                (1.0, 0.0)
            } else {
                (
                    mle_from_residuals(&residuals, sigma),
                    rmse_from_residuals(&residuals),
                )
            };
            pairs.push(CollinearityPair {
                reference_source_key: reference_key,
                test_source_key: test_key,
                mle,
                rmse,
            });
        }
    }

    let total_mle = pairs.iter().map(|p| p.mle).product();
    Ok(BasinCollinearity {
        basin_key,
        pairs,
        total_mle,
    })
}

/// Sweep the concavity exponent and score every basin at every step.
///
/// Each step recomputes chi at its exponent, re-extracts the network in
/// chi-only mode and scores all basins. Steps are independent and run in
/// parallel when the `parallel` feature is enabled.
pub fn sweep_concavity<G: FlowGraph + Sync>(
    graph: &G,
    triples: &[ChannelTriple],
    params: &SweepParams,
) -> Result<SweepResult> {
    let steps: Vec<Result<SweepStep>> = (0..params.n_steps)
        .collect::<Vec<_>>()
        .into_par_iter()
        .map(|i| {
            let concavity = params.start + params.delta * i as f64;
            let chi = graph.chi(&params.chi.with_concavity(concavity));
            let network = extract_network_chi_only(graph, triples, &chi)?;

            let mut basins = Vec::with_capacity(network.basin_count());
            for basin_key in 0..network.basin_count() {
                basins.push(basin_collinearity(
                    &network,
                    graph,
                    basin_key,
                    params.mainstem_only,
                    params.sigma,
                )?);
            }
            info!(concavity, basins = basins.len(), "scored concavity step");
            Ok(SweepStep { concavity, basins })
        })
        .collect();

    let steps = steps.into_iter().collect::<Result<Vec<_>>>()?;

    // outlet nodes come from any step's extraction; redo one cheaply
    let chi = graph.chi(&params.chi.with_concavity(params.start));
    let network = extract_network_chi_only(graph, triples, &chi)?;
    let outlet_nodes = network.basin_keys().nodes().to_vec();

    Ok(SweepResult {
        steps,
        outlet_nodes,
    })
}
