mod util;

use lattice_layout::prelude::*;
use proptest::prelude::*;
use util::layout_on;

fn check_bijection<const ND: usize>(l: &Layout<ND>) {
    let mut per_node = vec![0usize; l.num_nodes()];
    let mut seen = vec![false; l.num_nodes() * l.subgrid_vol()];
    for site in 0..l.vol() {
        let c = l.lexico_coords(site);
        assert_eq!(l.lexico_site_index(&c), site);
        let node = l.node_number(&c);
        let linear = l.linear_site_index(&c);
        assert!(node < l.num_nodes());
        assert!(linear < l.subgrid_vol());
        assert_eq!(l.site_coords(node, linear), c);
        let slot = node * l.subgrid_vol() + linear;
        assert!(!seen[slot], "two sites share node {node} index {linear}");
        seen[slot] = true;
        per_node[node] += 1;
    }
    assert!(per_node.iter().all(|&n| n == l.subgrid_vol()));
}

#[test]
fn four_dimensional_lattice_over_four_nodes() {
    let l: Layout<4> = layout_on(3, 4, &[8, 4, 4, 6]);
    assert_eq!(l.logical_size(), &[2, 1, 1, 2]);
    assert_eq!(l.subgrid_latt_size(), &[4, 4, 4, 3]);
    assert_eq!(l.subgrid_vol(), 192);
    assert_eq!(l.node_coord(), &[1, 0, 0, 1]);
    assert!(!l.primary_node());
    check_bijection(&l);
}

#[test]
fn every_rank_owns_its_own_sites() {
    for rank in 0..4 {
        let l: Layout<2> = layout_on(rank, 4, &[4, 8]);
        assert!(l.local_coords().all(|c| l.is_local(&c)));
        assert_eq!(l.local_coords().count(), l.subgrid_vol());
    }
}

#[test]
fn lattice_coordinate_follows_local_order() {
    let l: Layout<2> = layout_on(1, 2, &[2, 4]);
    // logical [1, 2], subgrid [2, 2], node 1 holds rows y = 2, 3
    assert_eq!(l.lattice_coordinate(0).unwrap(), vec![0, 1, 0, 1]);
    assert_eq!(l.lattice_coordinate(1).unwrap(), vec![2, 2, 3, 3]);
    assert_eq!(
        l.lattice_coordinate(2),
        Err(LayoutError::InvalidDimension { dim: 2, nd: 2 })
    );
}

#[test]
fn requested_process_grid_is_honored() {
    let comms = LocalComm::universe(4);
    let cfg = LayoutConfig {
        logical_size: Some(vec![4, 1]),
        ..LayoutConfig::default()
    };
    let l = Layout::<2>::create(&comms[2], &[8, 8], &cfg).unwrap();
    assert_eq!(l.logical_size(), &[4, 1]);
    assert_eq!(l.subgrid_latt_size(), &[2, 8]);
    check_bijection(&l);

    let bad = LayoutConfig {
        logical_size: Some(vec![3, 1]),
        ..LayoutConfig::default()
    };
    assert_eq!(
        Layout::<2>::create(&comms[0], &[8, 8], &bad),
        Err(LayoutError::ProcessGridMismatch {
            requested: 3,
            num_nodes: 4
        })
    );
}

#[test]
fn indivisible_lattice_is_a_configuration_error() {
    let comms = LocalComm::universe(2);
    let err = Layout::<2>::create(&comms[0], &[3, 5], &LayoutConfig::default()).unwrap_err();
    assert!(matches!(err, LayoutError::IndivisibleExtent { .. }));
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn finalized_transport_is_rejected() {
    let comm = LocalComm::serial();
    comm.finalize();
    assert_eq!(
        Layout::<1>::create(&comm, &[4], &LayoutConfig::default()),
        Err(LayoutError::TransportUninitialized)
    );
}

proptest! {
    #[test]
    fn index_maps_are_mutually_inverse(
        extent in prop::array::uniform3(1usize..7),
        nodes in 1usize..=6,
    ) {
        let comms = LocalComm::universe(nodes);
        match Layout::<3>::create(&comms[nodes - 1], &extent, &LayoutConfig::default()) {
            Ok(l) => {
                prop_assert_eq!(l.subgrid_vol() * l.num_nodes(), l.vol());
                check_bijection(&l);
            }
            Err(e) => prop_assert!(matches!(e, LayoutError::IndivisibleExtent { .. }), "unexpected error: {:?}", e),
        }
    }

    #[test]
    fn max_volume_caps_the_lattice(
        extent in prop::array::uniform2(1usize..10),
        cap in 1usize..100,
    ) {
        let cfg = LayoutConfig { max_volume: Some(cap), ..LayoutConfig::default() };
        let res = Layout::<2>::create(&LocalComm::serial(), &extent, &cfg);
        let vol = extent[0] * extent[1];
        if vol > cap {
            prop_assert_eq!(res, Err(LayoutError::CapacityExceeded { volume: vol, capacity: cap }));
        } else {
            prop_assert!(res.is_ok());
        }
    }
}
