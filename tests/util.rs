#![allow(dead_code)]
use lattice_layout::prelude::*;

/// Run `f` once per simulated rank of an `n`-rank universe, one thread each,
/// and collect the results in rank order.
pub fn run_ranks<T, F>(n: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(LocalComm) -> T + Sync,
{
    let comms = LocalComm::universe(n);
    let f = &f;
    std::thread::scope(|s| {
        let handles: Vec<_> = comms
            .into_iter()
            .map(|comm| s.spawn(move || f(comm)))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("rank thread panicked"))
            .collect()
    })
}

/// Layout of rank `rank` in an `n`-rank universe with default configuration.
pub fn layout_on<const ND: usize>(rank: usize, n: usize, extent: &[usize]) -> Layout<ND> {
    let comms = LocalComm::universe(n);
    Layout::create(&comms[rank], extent, &LayoutConfig::default()).unwrap()
}

/// Assert vec is a permutation of another vec (order-agnostic).
pub fn assert_permutation<T: Ord + Copy + std::fmt::Debug>(got: &[T], want: &[T]) {
    let mut a = got.to_vec();
    a.sort_unstable();
    let mut b = want.to_vec();
    b.sort_unstable();
    assert_eq!(a, b, "not a permutation\n got={:?}\nwant={:?}", got, want);
}
