//! Slope-area analysis of the extracted channels.
//!
//! Classic steepness analysis without the chi transform: channel slope is
//! measured over fixed vertical drops and paired with the drainage area at
//! the midpoint of each drop. Raw measurements are then binned in log10
//! drainage area per channel, which tames the scatter inherent to
//! cell-to-cell slopes.

use crate::chi::network::ChannelNetwork;
use chimap_core::graph::{FlowGraph, NodeId};
use chimap_core::{Error, Result};

/// One slope measurement, taken at the midpoint node of a vertical drop.
#[derive(Debug, Clone, Copy)]
pub struct SlopeAreaPoint {
    /// Node halfway (in elevation) through the measured drop
    pub node: NodeId,
    /// Channel gradient over the drop (positive, dimensionless)
    pub slope: f64,
}

/// One log-area bin of a channel's slope-area data.
#[derive(Debug, Clone, Copy)]
pub struct SlopeAreaBin {
    pub basin_key: usize,
    pub source_key: usize,
    /// Midpoint of the bin in log10 drainage area
    pub midpoint_log_area: f64,
    pub mean_log_area: f64,
    pub mean_log_slope: f64,
    pub median_log_slope: f64,
    pub stderr_log_area: f64,
    pub stderr_log_slope: f64,
    pub n_observations: usize,
}

/// Measure channel slopes over fixed vertical intervals.
///
/// Walking down each channel, a measurement starts at every node: the
/// first downstream node at least `vertical_interval / 2` below it marks
/// the midpoint, the first at least `vertical_interval` below it the end.
/// Slope is drop over flow distance between start and end, recorded at the
/// midpoint node. Drops that leave the channel before completing, and
/// non-positive slopes, are discarded.
pub fn slope_area_data<G: FlowGraph>(
    network: &ChannelNetwork,
    graph: &G,
    vertical_interval: f64,
) -> Result<Vec<SlopeAreaPoint>> {
    if network.is_empty() {
        return Err(Error::EmptyNetwork {
            operation: "slope-area analysis",
        });
    }

    let mut points = Vec::new();
    for (source_key, source_node) in network.source_keys().iter() {
        let mut top = source_node;
        loop {
            let top_sample = match network.sample(top) {
                Some(s) if s.source_key == source_key => *s,
                _ => break,
            };

            let mut midpoint = None;
            let mut node = top;
            loop {
                let receiver = graph.receiver_of(node);
                if receiver == node {
                    break;
                }
                node = receiver;
                let sample = match network.sample(node) {
                    Some(s) if s.source_key == source_key => s,
                    _ => break,
                };
                let drop = top_sample.elevation - sample.elevation;
                if midpoint.is_none() && drop >= vertical_interval / 2.0 {
                    midpoint = Some(node);
                }
                if drop >= vertical_interval {
                    if let Some(mid) = midpoint {
                        let run = top_sample.flow_distance - sample.flow_distance;
                        if run > 0.0 {
                            let slope = drop / run;
                            if slope > 0.0 {
                                points.push(SlopeAreaPoint { node: mid, slope });
                            }
                        }
                    }
                    break;
                }
            }

            let next = graph.receiver_of(top);
            if next == top {
                break;
            }
            top = next;
        }
    }
    Ok(points)
}

/// Bin raw slope-area measurements in log10 drainage area, per channel.
///
/// Bin edges are aligned to multiples of `log_bin_width`; empty bins are
/// omitted. Standard errors are sample standard deviation over sqrt(n),
/// zero for single-observation bins.
pub fn bin_slope_area(
    network: &ChannelNetwork,
    points: &[SlopeAreaPoint],
    log_bin_width: f64,
) -> Vec<SlopeAreaBin> {
    let mut bins = Vec::new();

    for (source_key, _) in network.source_keys().iter() {
        let mut log_area = Vec::new();
        let mut log_slope = Vec::new();
        let mut basin_key = 0;
        for point in points {
            let sample = match network.sample(point.node) {
                Some(s) if s.source_key == source_key => s,
                _ => continue,
            };
            basin_key = sample.basin_key;
            log_area.push(sample.drainage_area.log10());
            log_slope.push(point.slope.log10());
        }
        if log_area.is_empty() {
            continue;
        }

        let min = log_area.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = log_area.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let lower = (min / log_bin_width).floor() * log_bin_width;
        let n_bins = ((max - lower) / log_bin_width).floor() as usize + 1;

        let mut bin_area: Vec<Vec<f64>> = vec![Vec::new(); n_bins];
        let mut bin_slope: Vec<Vec<f64>> = vec![Vec::new(); n_bins];
        for (&a, &s) in log_area.iter().zip(&log_slope) {
            let idx = (((a - lower) / log_bin_width).floor() as usize).min(n_bins - 1);
            bin_area[idx].push(a);
            bin_slope[idx].push(s);
        }

        for (idx, (areas, slopes)) in bin_area.iter().zip(&bin_slope).enumerate() {
            if areas.is_empty() {
                continue;
            }
            bins.push(SlopeAreaBin {
                basin_key,
                source_key,
                midpoint_log_area: lower + (idx as f64 + 0.5) * log_bin_width,
                mean_log_area: mean(areas),
                mean_log_slope: mean(slopes),
                median_log_slope: median(slopes),
                stderr_log_area: standard_error(areas),
                stderr_log_slope: standard_error(slopes),
                n_observations: areas.len(),
            });
        }
    }
    bins
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

fn standard_error(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / (n - 1) as f64;
    (variance / n as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chi::extract::extract_network_chi_only;
    use crate::flow::{decompose_network, flow_direction, FlowRouting};
    use approx::assert_relative_eq;
    use chimap_core::graph::ChiParams;
    use chimap_core::raster::{GeoTransform, Raster};

    /// Single straight channel, 10 m of relief per 100 m cell.
    fn straight_channel(rows: usize) -> (FlowRouting, ChannelNetwork) {
        let mut dem = Raster::new(rows, 1);
        dem.set_transform(GeoTransform::new(0.0, rows as f64 * 100.0, 100.0, -100.0));
        for row in 0..rows {
            dem.set(row, 0, (rows - 1 - row) as f64 * 10.0).unwrap();
        }
        let fdir = flow_direction(&dem).unwrap();
        let routing = FlowRouting::build(&dem, &fdir).unwrap();
        let triples = decompose_network(&routing, 0.0);
        let chi = routing.chi(&ChiParams::default());
        let network = extract_network_chi_only(&routing, &triples, &chi).unwrap();
        (routing, network)
    }

    #[test]
    fn uniform_channel_has_uniform_slope() {
        let (routing, network) = straight_channel(12);
        let points = slope_area_data(&network, &routing, 20.0).unwrap();
        assert!(!points.is_empty());
        for p in &points {
            assert_relative_eq!(p.slope, 0.1, epsilon = 1e-12);
        }
    }

    #[test]
    fn interval_larger_than_relief_yields_nothing() {
        let (routing, network) = straight_channel(5);
        let points = slope_area_data(&network, &routing, 1000.0).unwrap();
        assert!(points.is_empty());
    }

    #[test]
    fn empty_network_is_an_error() {
        let (routing, _) = straight_channel(5);
        let empty = ChannelNetwork::new();
        assert!(matches!(
            slope_area_data(&empty, &routing, 20.0),
            Err(Error::EmptyNetwork { .. })
        ));
    }

    #[test]
    fn binning_groups_by_log_area() {
        let (routing, network) = straight_channel(12);
        let points = slope_area_data(&network, &routing, 20.0).unwrap();
        let bins = bin_slope_area(&network, &points, 0.1);

        assert!(!bins.is_empty());
        let total: usize = bins.iter().map(|b| b.n_observations).sum();
        assert_eq!(total, points.len());
        for bin in &bins {
            assert_eq!(bin.source_key, 0);
            assert_relative_eq!(bin.median_log_slope, (0.1_f64).log10(), epsilon = 1e-9);
            assert!(bin.mean_log_area >= bin.midpoint_log_area - 0.05 - 1e-9);
            assert!(bin.mean_log_area <= bin.midpoint_log_area + 0.05 + 1e-9);
        }
    }

    #[test]
    fn median_and_stderr_basics() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[1.0, 2.0, 3.0, 4.0]), 2.5);
        assert_eq!(standard_error(&[5.0]), 0.0);
        assert!(standard_error(&[1.0, 2.0, 3.0]) > 0.0);
    }
}
