mod util;

use lattice_layout::geometry::coord::periodic_step;
use lattice_layout::prelude::*;
use std::collections::BTreeMap;
use util::{layout_on, run_ranks};

fn antipodal(c: &Coord<2>, _: Direction) -> Coord<2> {
    [(c[0] + 2) % 4, (c[1] + 2) % 4]
}

fn reflection(c: &Coord<2>, _: Direction) -> Coord<2> {
    [3 - c[0], 3 - c[1]]
}

#[test]
fn reflection_on_one_node_keeps_every_site_local() {
    let l: Layout<2> = layout_on(0, 1, &[4, 4]);
    let map = GeneralMap::make_checked(&l, &reflection).unwrap();
    let me = l.node_rank();
    assert_eq!(map.src_nodes(), &[me]);
    assert_eq!(map.dst_nodes(), &[me]);
    assert_eq!(map.src_counts(), &[l.subgrid_vol()]);
    assert_eq!(map.dst_counts(), &[l.subgrid_vol()]);
    for (i, c) in l.local_coords().enumerate() {
        assert_eq!(map.soffset(i), l.linear_site_index(&reflection(&c, Direction::Forward)));
    }
    // (0, 0) reads (3, 3)
    assert_eq!(map.soffset(0), 15);
}

#[test]
fn antipodal_map_on_one_node_is_local() {
    let l: Layout<2> = layout_on(0, 1, &[4, 4]);
    let map = GeneralMap::make_checked(&l, &antipodal).unwrap();
    assert!(map.is_local());
    for (i, c) in l.local_coords().enumerate() {
        assert_eq!(l.site_coords(0, map.soffset(i)), antipodal(&c, Direction::Forward));
    }
}

#[test]
fn antipodal_map_reads_everything_from_the_other_node() {
    for rank in 0..2 {
        let l: Layout<2> = layout_on(rank, 2, &[4, 4]);
        let map = GeneralMap::make(&l, &antipodal).unwrap();
        let other = 1 - rank;
        assert_eq!(map.src_nodes(), &[0, 1]);
        assert_eq!(map.src_count(rank), 0);
        assert_eq!(map.src_count(other), 8);
        assert_eq!(map.dst_count(other), 8);
        assert!((0..8).all(|i| map.src_node(i) == other && map.dst_node(i) == other));
    }
}

#[test]
fn general_shift_matches_nearest_neighbor_table() {
    let l: Layout<2> = layout_on(3, 4, &[4, 8]);
    let shift = NearestNeighborMap::make(&l);
    let extent = *l.latt_size();
    for dim in 0..2 {
        let f = move |c: &Coord<2>, d: Direction| periodic_step(c, dim, d, &extent);
        let map = GeneralMap::make_checked(&l, &f).unwrap();
        for i in 0..l.subgrid_vol() {
            assert_eq!(map.soffset(i), shift.offset(dim, Direction::Forward, i));
            assert_eq!(map.src_node(i), shift.neighbor_node(dim, Direction::Forward, i));
            assert_eq!(map.dst_node(i), shift.neighbor_node(dim, Direction::Backward, i));
        }
    }
}

#[test]
fn counts_agree_across_ranks() {
    let announced = run_ranks(2, |comm| {
        let l = Layout::<2>::create(&comm, &[4, 4], &LayoutConfig::default()).unwrap();
        let map = GeneralMap::make(&l, &antipodal).unwrap();
        map.exchange_counts(&comm, CommTag::MAP_COUNTS).unwrap()
    });
    assert_eq!(announced[0], BTreeMap::from([(1, 8)]));
    assert_eq!(announced[1], BTreeMap::from([(0, 8)]));
}

#[test]
fn counts_of_a_four_rank_shift() {
    let announced = run_ranks(4, |comm| {
        let l = Layout::<2>::create(&comm, &[4, 4], &LayoutConfig::default()).unwrap();
        let extent = *l.latt_size();
        let f = move |c: &Coord<2>, d: Direction| periodic_step(c, 1, d, &extent);
        let map = GeneralMap::make(&l, &f).unwrap();
        let got = map.exchange_counts(&comm, CommTag::MAP_COUNTS).unwrap();
        (l.process_grid().neighbor_rank(1, Direction::Forward).unwrap(), got)
    });
    // logical [2, 2], subgrid [2, 2]: one row of two sites crosses each y face
    for (fwd, got) in announced {
        assert_eq!(got, BTreeMap::from([(fwd, 2)]));
    }
}

#[test]
fn disagreeing_plans_are_reported() {
    let results = run_ranks(2, |comm| {
        let l = Layout::<2>::create(&comm, &[4, 4], &LayoutConfig::default()).unwrap();
        let map = if comm.rank() == 0 {
            GeneralMap::make(&l, &|c: &Coord<2>, _: Direction| *c).unwrap()
        } else {
            GeneralMap::make(&l, &antipodal).unwrap()
        };
        map.exchange_counts(&comm, CommTag::MAP_COUNTS)
    });
    for (rank, res) in results.into_iter().enumerate() {
        let err = res.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Communication);
        assert!(matches!(err, LayoutError::CommError { peer, .. } if peer == 1 - rank));
    }
}

#[test]
fn lattice_caches_named_maps() {
    let lat = Lattice::<LocalComm, 2>::create(
        LocalComm::serial(),
        &[4, 4],
        &LayoutConfig::default(),
    )
    .unwrap();
    let a = lat.map("antipodal", &antipodal).unwrap();
    let b = lat.map("antipodal", &antipodal).unwrap();
    assert!(std::sync::Arc::ptr_eq(&a, &b));
    assert!(a.exchange_counts(lat.comm(), CommTag::MAP_COUNTS).unwrap().is_empty());
}
