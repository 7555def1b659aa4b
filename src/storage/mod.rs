//! Results persistence module

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use anyhow::Result;
use serde::Serialize;
use serde_json::{json, to_string_pretty};

use crate::anomaly::{anomaly_summary, top_anomalies, AnomalyResult};
use crate::cluster::NetworkAnalysis;
use crate::data::ClaimTable;

/// Save analysis results to the specified directory
pub fn save_results(
    table: &ClaimTable,
    anomalies: &[AnomalyResult],
    network: &NetworkAnalysis,
    top_n: usize,
    output_dir: &str,
) -> Result<()> {
    log::info!("Saving results to {}", output_dir);

    // Ensure output directory exists
    fs::create_dir_all(output_dir)?;

    write_json(output_dir, "anomalies.json", &anomalies)?;
    save_top_anomalies(table, anomalies, top_n, output_dir)?;
    write_json(output_dir, "clusters.json", &network.clusters)?;
    save_summary(table, anomalies, network, output_dir)?;

    log::info!("Results saved successfully");

    Ok(())
}

/// Top-ranked claims joined back to their source records
fn save_top_anomalies(
    table: &ClaimTable,
    anomalies: &[AnomalyResult],
    top_n: usize,
    output_dir: &str,
) -> Result<()> {
    let rows: Vec<_> = top_anomalies(anomalies, top_n)
        .into_iter()
        .map(|result| {
            json!({
                "rank": result.rank,
                "row_index": result.row_index,
                "combined_score": result.combined_score,
                "scores": result.scores,
                "claim": table.get(result.row_index),
            })
        })
        .collect();

    write_json(output_dir, "top_anomalies.json", &rows)
}

/// Save summary information
fn save_summary(
    table: &ClaimTable,
    anomalies: &[AnomalyResult],
    network: &NetworkAnalysis,
    output_dir: &str,
) -> Result<()> {
    let summary = json!({
        "claim_stats": table.statistics(),
        "anomaly_summary": anomaly_summary(table, anomalies),
        "graph_stats": network.metrics,
        "cluster_stats": {
            "cliques_found": network.cliques_found,
            "reported": network.clusters.len(),
            "truncated": network.truncated,
            "largest_cluster_size": network.clusters.iter().map(|c| c.members.len()).max().unwrap_or(0),
        }
    });

    write_json(output_dir, "summary.json", &summary)
}

fn write_json<T: Serialize + ?Sized>(output_dir: &str, name: &str, value: &T) -> Result<()> {
    let path = Path::new(output_dir).join(name);
    let mut file = File::create(&path)?;
    file.write_all(to_string_pretty(value)?.as_bytes())?;
    log::debug!("Wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::{score_anomalies, MethodConfig};
    use crate::cluster::{analyze_network, NetworkOptions};
    use crate::data::ClaimRecord;

    #[test]
    fn test_save_results_writes_files() {
        let table = ClaimTable::new(vec![
            ClaimRecord::new(1, 10, 100.0, "I10"),
            ClaimRecord::new(2, 10, 200.0, "E11"),
            ClaimRecord::new(2, 11, 900.0, "E11"),
        ])
        .unwrap();
        let anomalies = score_anomalies(&table, &[MethodConfig::threshold(500.0)]).unwrap();
        let network = analyze_network(&table, &NetworkOptions::default()).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let output_dir = dir.path().to_str().unwrap();
        save_results(&table, &anomalies, &network, 1, output_dir).unwrap();

        for name in ["anomalies.json", "top_anomalies.json", "clusters.json", "summary.json"] {
            assert!(dir.path().join(name).exists(), "{} missing", name);
        }

        let top: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("top_anomalies.json")).unwrap()).unwrap();
        let top = top.as_array().unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0]["row_index"], 2);
        assert_eq!(top[0]["claim"]["claim_amount"], 900.0);

        let summary: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("summary.json")).unwrap()).unwrap();
        assert_eq!(summary["anomaly_summary"]["anomalies_detected"], 1);
        assert_eq!(summary["graph_stats"]["node_count"], 4);
    }
}
