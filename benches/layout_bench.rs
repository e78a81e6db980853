use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use lattice_layout::geometry::coord::periodic_step;
use lattice_layout::prelude::*;

fn layout_4d(extent: &[usize; 4], nodes: usize) -> Layout<4> {
    let comms = LocalComm::universe(nodes);
    Layout::create(&comms[0], extent, &LayoutConfig::default()).unwrap()
}

// 1) coordinate -> (node, linear) over the whole lattice
fn bench_index_maps(c: &mut Criterion) {
    let mut group = c.benchmark_group("index-maps");
    for &nodes in &[1usize, 4, 16] {
        let l = layout_4d(&[8, 8, 8, 8], nodes);
        group.bench_with_input(BenchmarkId::from_parameter(nodes), &l, |b, l| {
            b.iter(|| {
                let mut acc = 0usize;
                for site in 0..l.vol() {
                    let coord = l.lexico_coords(site);
                    acc ^= l.node_number(&coord) + l.linear_site_index(&coord);
                }
                black_box(acc)
            })
        });
    }
    group.finish();
}

// 2) building the per-node tables
fn bench_map_construction(c: &mut Criterion) {
    let mut group = c.benchmark_group("map-construction");
    for &side in &[4usize, 8] {
        let l = layout_4d(&[side; 4], 2);
        let extent = *l.latt_size();
        group.bench_with_input(BenchmarkId::new("shift", side), &l, |b, l| {
            b.iter(|| black_box(NearestNeighborMap::make(l)))
        });
        group.bench_with_input(BenchmarkId::new("general", side), &l, |b, l| {
            let f = move |c: &Coord<4>, d: Direction| periodic_step(c, 3, d, &extent);
            b.iter(|| black_box(GeneralMap::make(l, &f).unwrap()))
        });
        group.bench_with_input(BenchmarkId::new("checkerboard", side), &l, |b, l| {
            b.iter(|| black_box(Set::make(l, &HypercubeCheckerboard).unwrap()))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_index_maps, bench_map_construction);
criterion_main!(benches);
