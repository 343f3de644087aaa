//! CSV writers for analysis results.
//!
//! All tables are plain comma-separated text with a header row.
//! Geographic coordinates carry nine decimal digits, derived quantities
//! five. Missing ratios print the conventional -9999 sentinel so the
//! tables stay numeric throughout.

use crate::chi::collinearity::{SweepResult, SweepStep};
use crate::chi::knickpoint::Knickpoint;
use crate::chi::network::ChannelNetwork;
use crate::chi::slope_area::{SlopeAreaBin, SlopeAreaPoint};
use chimap_core::graph::{FlowGraph, NodeId};
use chimap_core::Result;
use std::collections::BTreeMap;
use std::io::Write;

/// Per-node chi coordinates, skipping nodes without a chi value.
pub fn write_chi_map<G: FlowGraph, W: Write>(
    out: &mut W,
    graph: &G,
    chi_values: &[f64],
    include_basin: bool,
) -> Result<()> {
    if include_basin {
        writeln!(out, "latitude,longitude,chi,basin_id")?;
    } else {
        writeln!(out, "latitude,longitude,chi")?;
    }
    for node in 0..graph.node_count() {
        let chi = chi_values[node];
        if !chi.is_finite() {
            continue;
        }
        let (lat, lon) = graph.latlon_of(node);
        if include_basin {
            writeln!(
                out,
                "{:.9},{:.9},{:.5},{}",
                lat,
                lon,
                chi,
                graph.basin_of(node)
            )?;
        } else {
            writeln!(out, "{:.9},{:.9},{:.5}", lat, lon, chi)?;
        }
    }
    Ok(())
}

/// The full per-node channel table, in extraction order.
///
/// Fitted elevation and segment id columns appear when the network carries
/// them (a full extraction followed by segment id assignment); chi-only
/// networks get the base columns.
pub fn write_channel_table<G: FlowGraph, W: Write>(
    out: &mut W,
    network: &ChannelNetwork,
    graph: &G,
) -> Result<()> {
    let sequence = network.node_sequence();
    let have_fit = sequence
        .iter()
        .all(|&n| network.sample(n).is_some_and(|s| s.fitted_elevation.is_finite()));
    let have_segments = sequence
        .iter()
        .all(|&n| network.sample(n).is_some_and(|s| s.segment_id.is_some()));

    write!(
        out,
        "node,row,col,latitude,longitude,chi,elevation,flow_distance,drainage_area,m_chi,b_chi,source_key,basin_key"
    )?;
    if have_fit {
        write!(out, ",fitted_elevation")?;
    }
    if have_segments {
        write!(out, ",segment_id")?;
    }
    writeln!(out)?;

    for &node in sequence {
        let s = network.sample(node).unwrap();
        let (row, col) = graph.row_col_of(node);
        let (lat, lon) = graph.latlon_of(node);
        write!(
            out,
            "{},{},{},{:.9},{:.9},{:.5},{:.5},{:.5},{:.5},{:.5},{:.5},{},{}",
            node,
            row,
            col,
            lat,
            lon,
            s.chi,
            s.elevation,
            s.flow_distance,
            s.drainage_area,
            s.m_chi,
            s.b_chi,
            s.source_key,
            s.basin_key
        )?;
        if have_fit {
            write!(out, ",{:.5}", s.fitted_elevation)?;
        }
        if have_segments {
            write!(out, ",{}", s.segment_id.unwrap_or(0))?;
        }
        writeln!(out)?;
    }
    Ok(())
}

/// Source key table: the head node of every extracted channel.
pub fn write_source_key_table<G: FlowGraph, W: Write>(
    out: &mut W,
    network: &ChannelNetwork,
    graph: &G,
) -> Result<()> {
    writeln!(out, "node,row,col,latitude,longitude,source_key")?;
    for (key, node) in network.source_keys().iter() {
        let (row, col) = graph.row_col_of(node);
        let (lat, lon) = graph.latlon_of(node);
        writeln!(out, "{},{},{},{:.9},{:.9},{}", node, row, col, lat, lon, key)?;
    }
    Ok(())
}

/// Baselevel key table: the outlet node of every basin.
pub fn write_baselevel_key_table<G: FlowGraph, W: Write>(
    out: &mut W,
    network: &ChannelNetwork,
    graph: &G,
) -> Result<()> {
    writeln!(out, "node,row,col,latitude,longitude,basin_key")?;
    for (key, node) in network.basin_keys().iter() {
        let (row, col) = graph.row_col_of(node);
        let (lat, lon) = graph.latlon_of(node);
        writeln!(out, "{},{},{},{:.9},{:.9},{}", node, row, col, lat, lon, key)?;
    }
    Ok(())
}

/// Knickpoint table, one row per transition, in extraction order.
pub fn write_knickpoint_table<G: FlowGraph, W: Write>(
    out: &mut W,
    network: &ChannelNetwork,
    graph: &G,
    knickpoints: &BTreeMap<NodeId, Knickpoint>,
) -> Result<()> {
    writeln!(
        out,
        "latitude,longitude,elevation,flow_distance,drainage_area,diff,ratio,sign,source_key,basin_key"
    )?;
    for &node in network.node_sequence() {
        let Some(kp) = knickpoints.get(&node) else {
            continue;
        };
        let s = network.sample(node).unwrap();
        let (lat, lon) = graph.latlon_of(node);
        let ratio = match kp.ratio {
            Some(r) => format!("{:.5}", r),
            None => "-9999".to_string(),
        };
        writeln!(
            out,
            "{:.9},{:.9},{:.5},{:.5},{:.5},{:.5},{},{},{},{}",
            lat,
            lon,
            s.elevation,
            s.flow_distance,
            s.drainage_area,
            kp.magnitude,
            ratio,
            kp.sign,
            s.source_key,
            s.basin_key
        )?;
    }
    Ok(())
}

/// Pairwise collinearity scores of one concavity step.
pub fn write_collinearity_stats<W: Write>(out: &mut W, step: &SweepStep) -> Result<()> {
    writeln!(
        out,
        "basin_key,reference_source_key,test_source_key,mle,rmse"
    )?;
    for basin in &step.basins {
        for pair in &basin.pairs {
            writeln!(
                out,
                "{},{},{},{:.5e},{:.5}",
                basin.basin_key,
                pair.reference_source_key,
                pair.test_source_key,
                pair.mle,
                pair.rmse
            )?;
        }
    }
    Ok(())
}

/// Per-basin summary of a whole sweep: one column per tested exponent.
pub fn write_collinearity_summary<W: Write>(out: &mut W, result: &SweepResult) -> Result<()> {
    write!(out, "basin_key,outlet_node")?;
    for step in &result.steps {
        write!(out, ",m_over_n={:.3}", step.concavity)?;
    }
    writeln!(out)?;

    let n_basins = result.outlet_nodes.len();
    for basin_key in 0..n_basins {
        write!(out, "{},{}", basin_key, result.outlet_nodes[basin_key])?;
        for step in &result.steps {
            let mle = step
                .basins
                .iter()
                .find(|b| b.basin_key == basin_key)
                .map(|b| b.total_mle)
                .unwrap_or(f64::NAN);
            write!(out, ",{:.5e}", mle)?;
        }
        writeln!(out)?;
    }
    Ok(())
}

/// Raw slope-area measurements.
pub fn write_slope_area_raw<G: FlowGraph, W: Write>(
    out: &mut W,
    network: &ChannelNetwork,
    graph: &G,
    points: &[SlopeAreaPoint],
) -> Result<()> {
    writeln!(
        out,
        "node,latitude,longitude,elevation,drainage_area,slope,source_key,basin_key"
    )?;
    for point in points {
        let Some(s) = network.sample(point.node) else {
            continue;
        };
        let (lat, lon) = graph.latlon_of(point.node);
        writeln!(
            out,
            "{},{:.9},{:.9},{:.5},{:.5},{:.5},{},{}",
            point.node,
            lat,
            lon,
            s.elevation,
            s.drainage_area,
            point.slope,
            s.source_key,
            s.basin_key
        )?;
    }
    Ok(())
}

/// Binned slope-area statistics.
pub fn write_slope_area_binned<W: Write>(out: &mut W, bins: &[SlopeAreaBin]) -> Result<()> {
    writeln!(
        out,
        "basin_key,source_key,midpoint_log_area,mean_log_area,mean_log_slope,median_log_slope,stderr_log_area,stderr_log_slope,n_observations"
    )?;
    for bin in bins {
        writeln!(
            out,
            "{},{},{:.5},{:.5},{:.5},{:.5},{:.5},{:.5},{}",
            bin.basin_key,
            bin.source_key,
            bin.midpoint_log_area,
            bin.mean_log_area,
            bin.mean_log_slope,
            bin.median_log_slope,
            bin.stderr_log_area,
            bin.stderr_log_slope,
            bin.n_observations
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chi::extract::extract_network;
    use crate::chi::knickpoint::{assign_segment_ids, detect_knickpoints};
    use crate::chi::segment::SegmentParams;
    use crate::flow::{decompose_network, flow_direction, FlowRouting};
    use chimap_core::graph::ChiParams;
    use chimap_core::raster::{GeoTransform, Raster};

    fn tiny_setup() -> (FlowRouting, ChannelNetwork, Vec<f64>) {
        let rows = 8;
        let mut dem = Raster::new(rows, 1);
        dem.set_transform(GeoTransform::new(0.0, rows as f64, 1.0, -1.0));
        for row in 0..rows {
            dem.set(row, 0, (rows - 1 - row) as f64 * 5.0).unwrap();
        }
        let fdir = flow_direction(&dem).unwrap();
        let routing = FlowRouting::build(&dem, &fdir).unwrap();
        let triples = decompose_network(&routing, 0.0);
        let chi = routing.chi(&ChiParams::default());
        let network =
            extract_network(&routing, &triples, &chi, &SegmentParams::default()).unwrap();
        (routing, network, chi)
    }

    #[test]
    fn chi_map_has_one_row_per_valid_node() {
        let (routing, _, chi) = tiny_setup();
        let mut buf = Vec::new();
        write_chi_map(&mut buf, &routing, &chi, true).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "latitude,longitude,chi,basin_id");
        assert_eq!(lines.len(), 1 + routing.node_count());
    }

    #[test]
    fn channel_table_includes_fit_columns_after_full_extraction() {
        let (routing, mut network, _) = tiny_setup();
        assign_segment_ids(&mut network).unwrap();

        let mut buf = Vec::new();
        write_channel_table(&mut buf, &network, &routing).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let header = text.lines().next().unwrap();
        assert!(header.ends_with("fitted_elevation,segment_id"));
        assert_eq!(text.lines().count(), 1 + network.len());
    }

    #[test]
    fn knickpoint_table_prints_sentinel_for_missing_ratio() {
        let (routing, network, _) = tiny_setup();
        let mut kps = detect_knickpoints(&network).unwrap();
        // force a ratio-less entry at the first sequence node
        kps.insert(
            network.node_sequence()[0],
            Knickpoint {
                magnitude: 1.0,
                ratio: None,
                sign: 1,
            },
        );

        let mut buf = Vec::new();
        write_knickpoint_table(&mut buf, &network, &routing, &kps).unwrap();
        let text = String::from_utf8(buf).unwrap();
        // the sentinel prints bare, without a decimal tail
        assert!(text.contains(",-9999,"));
        assert!(!text.contains("-9999."));
    }

    #[test]
    fn key_tables_list_every_registered_node() {
        let (routing, network, _) = tiny_setup();

        let mut buf = Vec::new();
        write_source_key_table(&mut buf, &network, &routing).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "node,row,col,latitude,longitude,source_key");
        assert_eq!(lines.len(), 1 + network.channel_count());

        let mut buf = Vec::new();
        write_baselevel_key_table(&mut buf, &network, &routing).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "node,row,col,latitude,longitude,basin_key");
        assert_eq!(lines.len(), 1 + network.basin_count());
        // the single basin drains to the bottom cell
        assert!(lines[1].starts_with(&format!("{},7,0,", routing.node_at(7, 0).unwrap())));
    }

    #[test]
    fn collinearity_mle_prints_five_significant_digits() {
        use crate::chi::collinearity::{BasinCollinearity, CollinearityPair};

        let step = SweepStep {
            concavity: 0.45,
            basins: vec![BasinCollinearity {
                basin_key: 0,
                pairs: vec![CollinearityPair {
                    reference_source_key: 0,
                    test_source_key: 1,
                    mle: 1.234_567_89e-7,
                    rmse: 2.5,
                }],
                total_mle: 1.234_567_89e-7,
            }],
        };
        let mut buf = Vec::new();
        write_collinearity_stats(&mut buf, &step).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("1.23457e-7"));
    }
}
