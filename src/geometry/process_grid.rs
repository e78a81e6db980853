//! Logical process grid: how the running processes tile the lattice.
//!
//! This is the topology half of the transport contract. A transport either
//! accepts a caller-requested grid shape or derives one from the lattice
//! extent and the number of processes, then places its own rank in it.

use crate::geometry::coord::{Coord, Direction, flatten, periodic_step, unflatten, volume};
use crate::layout_error::LayoutError;

/// Shape of the process grid and this process's place in it.
///
/// # Invariants
/// - `logical_size[d] * subgrid[d] == extent[d]` on every axis.
/// - `volume(logical_size) == num_nodes` and `rank < num_nodes`.
/// - `logical_coord == unflatten(rank, logical_size)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessGrid<const ND: usize> {
    logical_size: [usize; ND],
    logical_coord: Coord<ND>,
    subgrid: [usize; ND],
    rank: usize,
    num_nodes: usize,
}

impl<const ND: usize> ProcessGrid<ND> {
    /// Lay `num_nodes` processes over a lattice of shape `extent`.
    ///
    /// With `requested = Some(shape)` the shape is validated and used as is.
    /// Otherwise prime factors of `num_nodes` (largest first) are handed out
    /// one at a time to the axis with the largest remaining subgrid extent
    /// that the factor divides; ties go to the highest axis.
    ///
    /// # Errors
    /// - `DimensionMismatch` if `requested` has the wrong length.
    /// - `ProcessGridMismatch` if `requested` does not hold `num_nodes` processes.
    /// - `IndivisibleExtent` if the lattice cannot be split evenly.
    pub fn new(
        extent: &[usize; ND],
        num_nodes: usize,
        rank: usize,
        requested: Option<&[usize]>,
    ) -> Result<Self, LayoutError> {
        if num_nodes == 0 {
            return Err(LayoutError::TransportUninitialized);
        }
        let logical_size = match requested {
            Some(shape) => Self::check_requested(extent, num_nodes, shape)?,
            None => Self::factor(extent, num_nodes)?,
        };
        let mut subgrid = [0; ND];
        for d in 0..ND {
            subgrid[d] = extent[d] / logical_size[d];
        }
        Ok(Self {
            logical_size,
            logical_coord: unflatten(rank, &logical_size),
            subgrid,
            rank,
            num_nodes,
        })
    }

    fn check_requested(
        extent: &[usize; ND],
        num_nodes: usize,
        shape: &[usize],
    ) -> Result<[usize; ND], LayoutError> {
        let logical: [usize; ND] =
            shape
                .try_into()
                .map_err(|_| LayoutError::DimensionMismatch {
                    expected: ND,
                    got: shape.len(),
                })?;
        let requested = volume(&logical);
        if requested != num_nodes {
            return Err(LayoutError::ProcessGridMismatch {
                requested,
                num_nodes,
            });
        }
        for d in 0..ND {
            if extent[d] % logical[d] != 0 {
                return Err(LayoutError::IndivisibleExtent {
                    dim: d,
                    extent: extent[d],
                    parts: logical[d],
                });
            }
        }
        Ok(logical)
    }

    fn factor(extent: &[usize; ND], num_nodes: usize) -> Result<[usize; ND], LayoutError> {
        let mut logical = [1; ND];
        for p in prime_factors(num_nodes) {
            let sub = |d: usize, logical: &[usize; ND]| extent[d] / logical[d];
            let best = (0..ND)
                .filter(|&d| sub(d, &logical) % p == 0)
                .max_by_key(|&d| (sub(d, &logical), d));
            match best {
                Some(d) => logical[d] *= p,
                None => {
                    let d = (0..ND).max_by_key(|&d| (sub(d, &logical), d)).unwrap_or(0);
                    return Err(LayoutError::IndivisibleExtent {
                        dim: d,
                        extent: extent.get(d).copied().unwrap_or(0),
                        parts: logical.get(d).copied().unwrap_or(1) * p,
                    });
                }
            }
        }
        Ok(logical)
    }

    /// Number of processes along each axis.
    #[inline]
    pub fn logical_size(&self) -> &[usize; ND] {
        &self.logical_size
    }

    /// This process's coordinate in the process grid.
    #[inline]
    pub fn logical_coord(&self) -> &Coord<ND> {
        &self.logical_coord
    }

    /// Shape of every process's subgrid.
    #[inline]
    pub fn subgrid(&self) -> &[usize; ND] {
        &self.subgrid
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.rank
    }

    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    /// Rank at a process-grid coordinate.
    #[inline]
    pub fn rank_of(&self, coord: &Coord<ND>) -> usize {
        flatten(coord, &self.logical_size)
    }

    /// Process-grid coordinate of `rank`.
    #[inline]
    pub fn coord_of(&self, rank: usize) -> Coord<ND> {
        unflatten(rank, &self.logical_size)
    }

    /// Rank of the periodic neighbor one step along `dim` in direction `dir`.
    pub fn neighbor_rank(&self, dim: usize, dir: Direction) -> Result<usize, LayoutError> {
        if dim >= ND {
            return Err(LayoutError::InvalidDimension { dim, nd: ND });
        }
        let c = periodic_step(&self.logical_coord, dim, dir, &self.logical_size);
        Ok(self.rank_of(&c))
    }
}

/// Prime factors of `n`, largest first.
fn prime_factors(mut n: usize) -> Vec<usize> {
    let mut out = Vec::new();
    let mut p = 2;
    while p * p <= n {
        while n % p == 0 {
            out.push(p);
            n /= p;
        }
        p += 1;
    }
    if n > 1 {
        out.push(n);
    }
    out.sort_unstable_by(|a, b| b.cmp(a));
    out
}
