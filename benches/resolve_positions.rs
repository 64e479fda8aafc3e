//! Criterion benchmarks for the per-cell position resolvers.
//!
//! Resolving is the only per-cell work in the pipeline, so these numbers bound the
//! throughput of a run. Each resolver is measured over a batch of identifiers that
//! cycles through every layer and a spread of eta and phi bins.
//!
//! Run with: cargo bench --bench resolve_positions

use calo_positions::core::{CellId, CellRecord, PositionResolver};
use calo_positions::geometry::DetectorGeometry;
use calo_positions::pipeline::AssignmentStage;
use calo_positions::positions::{BarrelResolver, DiscResolver, TailCatcherResolver};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;

const GEOMETRY: &str = include_str!("../config/geometry.toml");
const BATCH: u64 = 10_000;

fn ecal_barrel_radii() -> Vec<f64> {
    vec![193.0, 198.5, 207.5, 216.5, 225.5, 234.5, 243.5, 252.5]
}

fn ecal_endcap_merge() -> Vec<u32> {
    let mut merge = vec![2, 2];
    merge.extend(std::iter::repeat(4).take(38));
    merge
}

fn cell_ids(geometry: &DetectorGeometry, readout: &str, system: i64, layers: i64, eta: (i64, i64)) -> Vec<CellId> {
    use calo_positions::geometry::GeometryProvider;

    let readout = geometry.readout(readout).unwrap();
    let coder = readout.decoder();
    (0..BATCH as i64)
        .map(|n| {
            let values = [
                ("system", system),
                ("layer", n % layers),
                ("eta", eta.0 + n % (eta.1 - eta.0)),
                ("phi", n % 256),
            ];
            CellId(coder.encode(&values).unwrap())
        })
        .collect()
}

fn bench_resolver(c: &mut Criterion, name: &str, resolver: &dyn PositionResolver, ids: &[CellId]) {
    let mut group = c.benchmark_group("resolve");
    group.throughput(Throughput::Elements(ids.len() as u64));
    group.bench_with_input(BenchmarkId::new(name, ids.len()), ids, |b, ids| {
        b.iter(|| {
            for id in ids {
                black_box(resolver.resolve(black_box(*id)).unwrap());
            }
        });
    });
    group.finish();
}

fn resolvers(c: &mut Criterion) {
    use calo_positions::geometry::GeometryProvider;

    let geometry = DetectorGeometry::from_toml_str(GEOMETRY).unwrap();

    let barrel = BarrelResolver::new(
        &geometry.readout("ECalBarrelPhiEta").unwrap(),
        Some(ecal_barrel_radii()),
    )
    .unwrap();
    let ids = cell_ids(&geometry, "ECalBarrelPhiEta", 5, 8, (0, 200));
    bench_resolver(c, "ecal_barrel", &barrel, &ids);

    let endcap = DiscResolver::merged(&geometry.readout("EMECPhiEta").unwrap(), &ecal_endcap_merge()).unwrap();
    let ids = cell_ids(&geometry, "EMECPhiEta", 6, 156, (150, 250));
    bench_resolver(c, "ecal_endcap", &endcap, &ids);

    let forward = DiscResolver::forward(&geometry.readout("EMFwdPhiEta").unwrap()).unwrap();
    let ids = cell_ids(&geometry, "EMFwdPhiEta", 10, 40, (250, 600));
    bench_resolver(c, "ecal_forward", &forward, &ids);

    let tail = TailCatcherResolver::new(&geometry.readout("Muons_Readout").unwrap(), 901.5).unwrap();
    let ids = cell_ids(&geometry, "Muons_Readout", 12, 4, (0, 200));
    bench_resolver(c, "tail_catcher", &tail, &ids);
}

/// Whole-stage cost including the output allocation.
fn stage_execution(c: &mut Criterion) {
    use calo_positions::geometry::GeometryProvider;

    let geometry = DetectorGeometry::from_toml_str(GEOMETRY).unwrap();
    let resolver = BarrelResolver::new(
        &geometry.readout("ECalBarrelPhiEta").unwrap(),
        Some(ecal_barrel_radii()),
    )
    .unwrap();
    let stage = AssignmentStage::new(
        "positionsEcalBarrel",
        "ECalBarrelCells",
        "ECalBarrelCellPositions",
        Arc::new(resolver),
    );
    let cells: Vec<CellRecord> = cell_ids(&geometry, "ECalBarrelPhiEta", 5, 8, (0, 200))
        .into_iter()
        .map(|id| CellRecord::new(id, 0.1))
        .collect();

    let mut group = c.benchmark_group("stage");
    group.throughput(Throughput::Elements(cells.len() as u64));
    group.bench_function("ecal_barrel_position_cells", |b| {
        b.iter(|| black_box(stage.position_cells(black_box(&cells)).unwrap()));
    });
    group.finish();
}

criterion_group!(benches, resolvers, stage_execution);
criterion_main!(benches);
