//! Coordinate algebra shared by the layout, subsets and maps.
//!
//! All flattening uses one fixed digit order: axis 0 varies fastest and the
//! stride of each later axis is the product of all faster extents.

/// A site coordinate on an `ND`-dimensional lattice.
pub type Coord<const ND: usize> = [usize; ND];

/// Direction of a lattice step or relation lookup.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Direction {
    /// `-1`: towards lower coordinates; for relations, "the site this one sends to".
    Backward,
    /// `+1`: towards higher coordinates; for relations, "the site this one reads from".
    Forward,
}

impl Direction {
    /// Both directions, in table order.
    pub const BOTH: [Direction; 2] = [Direction::Backward, Direction::Forward];

    /// `+1` for any positive sign, `-1` otherwise.
    #[inline]
    pub fn from_sign(isign: i32) -> Self {
        if isign > 0 {
            Direction::Forward
        } else {
            Direction::Backward
        }
    }

    #[inline]
    pub fn sign(self) -> i32 {
        match self {
            Direction::Backward => -1,
            Direction::Forward => 1,
        }
    }

    /// Slot in `[backward, forward]` tables.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Direction::Backward => 0,
            Direction::Forward => 1,
        }
    }

    #[inline]
    pub fn reverse(self) -> Self {
        match self {
            Direction::Backward => Direction::Forward,
            Direction::Forward => Direction::Backward,
        }
    }
}

/// Product of all extents.
#[inline]
pub fn volume(extent: &[usize]) -> usize {
    extent.iter().product()
}

/// Lexicographic index of `coord` inside a box of shape `extent`.
#[inline]
pub fn flatten<const ND: usize>(coord: &Coord<ND>, extent: &[usize; ND]) -> usize {
    coord
        .iter()
        .zip(extent.iter())
        .rev()
        .fold(0, |acc, (&c, &n)| acc * n + c)
}

/// Inverse of [`flatten`]: coordinate of `index` inside a box of shape `extent`.
#[inline]
pub fn unflatten<const ND: usize>(mut index: usize, extent: &[usize; ND]) -> Coord<ND> {
    let mut coord = [0; ND];
    for (c, &n) in coord.iter_mut().zip(extent.iter()) {
        *c = index % n;
        index /= n;
    }
    coord
}

/// Periodic neighbor of `coord` one step along `dim` in direction `dir`.
#[inline]
pub fn periodic_step<const ND: usize>(
    coord: &Coord<ND>,
    dim: usize,
    dir: Direction,
    extent: &[usize; ND],
) -> Coord<ND> {
    let mut out = *coord;
    let n = extent[dim];
    out[dim] = match dir {
        Direction::Forward => (coord[dim] + 1) % n,
        Direction::Backward => (coord[dim] + n - 1) % n,
    };
    out
}
