//! End-to-end runs from an event file to an output file.

use calo_positions::app::PositionsApp;
use calo_positions::config::PipelineConfig;
use calo_positions::error::CaloError;
use calo_positions::geometry::{BitFieldCoder, DetectorGeometry};
use serde_json::Value;
use std::f64::consts::PI;
use std::io::Write;
use std::path::Path;

const BARREL_SPEC: &str = "system:4,cryo:1,type:3,subtype:3,layer:8,eta:9,phi:10";

const GEOMETRY: &str = r#"
[[readouts]]
name = "ECalBarrelPhiEta"
id_spec = "system:4,cryo:1,type:3,subtype:3,layer:8,eta:9,phi:10"
system_id = 5

[readouts.segmentation]
grid_size_eta = 0.01
phi_bins = 704
offset_eta = -1.0
offset_phi = 0.0

[[readouts]]
name = "EMECPhiEta"
id_spec = "system:4,subsystem:1,type:3,subtype:3,layer:8,eta:-10,phi:10"
system_id = 6

[readouts.segmentation]
grid_size_eta = 0.01
phi_bins = 768
offset_eta = 0.0
offset_phi = 0.0

[readouts.disc]
z_min = 537.0
layer_thickness = 0.31
"#;

fn config(dir: &Path, parallel: bool) -> PipelineConfig {
    let text = format!(
        r#"
[application]
name = "integration"

[geometry]
path = "unused.toml"

[input]
path = "{input}"
collections = ["ECalBarrelCells", "ECalEndcapCells", "GenParticles"]

[output]
path = "{output}"
commands = ["keep *", "drop ECalBarrelCells", "drop ECalEndcapCells"]

[run]
parallel_stages = {parallel}

[[stages]]
name = "positionsEcalBarrel"
hits = "ECalBarrelCells"
positioned_hits = "ECalBarrelCellPositions"

[stages.resolver]
kind = "barrel"
readout = "ECalBarrelPhiEta"
layer_radii = [193.0, 198.5, 207.5, 216.5, 225.5, 234.5, 243.5, 252.5]

[[stages]]
name = "positionsEcalEndcap"
hits = "ECalEndcapCells"
positioned_hits = "ECalEndcapCellPositions"

[stages.resolver]
kind = "discs"
readout = "EMECPhiEta"
merged_layers = [2, 2, 4, 4]
"#,
        input = dir.join("events.jsonl").display(),
        output = dir.join("out.jsonl").display(),
    );
    PipelineConfig::from_toml_str(&text).unwrap()
}

fn barrel_id(layer: i64, eta: i64, phi: i64) -> u64 {
    BitFieldCoder::parse(BARREL_SPEC)
        .unwrap()
        .encode(&[("system", 5), ("layer", layer), ("eta", eta), ("phi", phi)])
        .unwrap()
}

fn write_events(dir: &Path, events: &[Value]) {
    let mut file = std::fs::File::create(dir.join("events.jsonl")).unwrap();
    for event in events {
        writeln!(file, "{}", event).unwrap();
    }
}

fn event(number: u64, barrel: &[u64], endcap: &[u64]) -> Value {
    let cells = |ids: &[u64]| -> Vec<Value> {
        ids.iter()
            .map(|id| serde_json::json!({"cell_id": id, "energy": 0.5}))
            .collect()
    };
    serde_json::json!({
        "number": number,
        "collections": {
            "ECalBarrelCells": {"kind": "cells", "items": cells(barrel)},
            "ECalEndcapCells": {"kind": "cells", "items": cells(endcap)},
            "GenParticles": {"kind": "opaque", "items": [{"pdg": -211}]},
        }
    })
}

fn read_output(dir: &Path) -> Vec<Value> {
    std::fs::read_to_string(dir.join("out.jsonl"))
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn app(dir: &Path, parallel: bool) -> PositionsApp {
    let geometry = DetectorGeometry::from_toml_str(GEOMETRY).unwrap();
    PositionsApp::with_geometry(config(dir, parallel), &geometry).unwrap()
}

#[tokio::test]
async fn barrel_cells_one_phi_bin_apart() {
    let dir = tempfile::tempdir().unwrap();
    let ids: Vec<u64> = (0..3).map(|phi| barrel_id(0, 0, phi)).collect();
    write_events(dir.path(), &[event(0, &ids, &[])]);

    let summary = app(dir.path(), false).run().await.unwrap();
    assert_eq!(summary.events, 1);
    assert_eq!(summary.total_cells(), 3);

    let lines = read_output(dir.path());
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["metadata"]["run_name"], "integration");

    let collections = &lines[1]["collections"];
    assert!(collections.get("ECalBarrelCells").is_none());
    assert!(collections.get("ECalEndcapCells").is_none());
    assert_eq!(collections["GenParticles"]["kind"], "opaque");
    assert_eq!(collections["ECalEndcapCellPositions"]["items"], serde_json::json!([]));

    let items = collections["ECalBarrelCellPositions"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 3);
    let expected_z = 193.0 * (-1.0f64).sinh();
    let mut phis = Vec::new();
    for (item, id) in items.iter().zip(&ids) {
        assert_eq!(item["cell"]["cell_id"], *id);
        let (x, y, z) = (
            item["position"]["x"].as_f64().unwrap(),
            item["position"]["y"].as_f64().unwrap(),
            item["position"]["z"].as_f64().unwrap(),
        );
        assert!((x.hypot(y) - 193.0).abs() < 1e-9);
        assert!((z - expected_z).abs() < 1e-9);
        phis.push(y.atan2(x));
    }
    let width = 2.0 * PI / 704.0;
    assert!((phis[1] - phis[0] - width).abs() < 1e-9);
    assert!((phis[2] - phis[1] - width).abs() < 1e-9);
}

#[tokio::test]
async fn failing_event_keeps_earlier_output() {
    let dir = tempfile::tempdir().unwrap();
    write_events(
        dir.path(),
        &[
            event(0, &[barrel_id(7, 100, 3)], &[]),
            event(1, &[barrel_id(8, 100, 3)], &[]),
            event(2, &[barrel_id(0, 100, 3)], &[]),
        ],
    );

    let err = app(dir.path(), false).run().await.unwrap_err();
    match &err {
        CaloError::EventFailed { event, source } => {
            assert_eq!(*event, 1);
            assert!(matches!(**source, CaloError::Resolution { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("positionsEcalBarrel"));

    let lines = read_output(dir.path());
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[1]["number"], 0);
}

#[tokio::test]
async fn missing_input_collection_fails_the_event() {
    let dir = tempfile::tempdir().unwrap();
    let mut broken = event(0, &[], &[]);
    broken["collections"]
        .as_object_mut()
        .unwrap()
        .remove("ECalEndcapCells");
    write_events(dir.path(), &[broken]);

    let err = app(dir.path(), false).run().await.unwrap_err();
    assert!(err.to_string().contains("ECalEndcapCells"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_and_sequential_runs_agree() {
    let events: Vec<Value> = (0..5)
        .map(|n| {
            let barrel: Vec<u64> = (0..n as i64).map(|phi| barrel_id(n as i64 % 8, 50 + phi, phi)).collect();
            let coder = BitFieldCoder::parse("system:4,subsystem:1,type:3,subtype:3,layer:8,eta:-10,phi:10").unwrap();
            let endcap = vec![coder
                .encode(&[("system", 6), ("layer", n as i64 * 2), ("eta", -150 - n as i64), ("phi", 9)])
                .unwrap()];
            event(n, &barrel, &endcap)
        })
        .collect();

    let sequential = tempfile::tempdir().unwrap();
    let parallel = tempfile::tempdir().unwrap();
    write_events(sequential.path(), &events);
    write_events(parallel.path(), &events);

    let a = app(sequential.path(), false).run().await.unwrap();
    let b = app(parallel.path(), true).run().await.unwrap();
    assert_eq!(a, b);
    assert_eq!(a.events, 5);

    // Metadata differs in its parameters and timestamp; events must be identical.
    let out_a = read_output(sequential.path());
    let out_b = read_output(parallel.path());
    assert_eq!(out_a[1..], out_b[1..]);
}

#[tokio::test]
async fn shipped_configuration_runs_on_sample_events() {
    let root = Path::new(env!("CARGO_MANIFEST_DIR"));
    let dir = tempfile::tempdir().unwrap();
    let mut config = PipelineConfig::load_from(root.join("config/pipeline.toml")).unwrap();
    config.geometry.path = root.join("config/geometry.toml");
    config.input.path = root.join("data/sample_events.jsonl");
    config.output.path = dir.path().join("out.jsonl");

    let summary = PositionsApp::new(config).unwrap().run().await.unwrap();
    assert_eq!(summary.events, 1);
    assert_eq!(summary.cells_per_stage.len(), 8);
    assert_eq!(summary.total_cells(), 10);

    let lines = read_output(dir.path());
    assert_eq!(lines.len(), 2);
    let names: Vec<&String> = lines[1]["collections"].as_object().unwrap().keys().collect();
    assert_eq!(
        names,
        vec![
            "ECalBarrelCellPositions",
            "ECalEndcapCellPositions",
            "ECalFwdCellPositions",
            "GenParticles",
            "GenVertices",
            "HCalBarrelCellPositions",
            "HCalEndcapCellPositions",
            "HCalExtBarrelCellPositions",
            "HCalFwdCellPositions",
            "TailCatcherCellPositions",
        ]
    );

    // Positions carry the geometry's cm: layer 0 of the ECal barrel sits at 193 cm.
    let barrel = &lines[1]["collections"]["ECalBarrelCellPositions"]["items"][0]["position"];
    let rho = barrel["x"].as_f64().unwrap().hypot(barrel["y"].as_f64().unwrap());
    assert!((rho - 193.0).abs() < 1e-9, "rho = {}", rho);

    let endcap = &lines[1]["collections"]["ECalEndcapCellPositions"]["items"];
    assert!(endcap[0]["position"]["z"].as_f64().unwrap() > 537.0);
    assert!(endcap[1]["position"]["z"].as_f64().unwrap() < -537.0);
}
