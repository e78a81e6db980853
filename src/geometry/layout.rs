//! Layout: the authoritative description of how the lattice is distributed.
//!
//! `Layout` owns the global lattice shape, the process-grid shape and this
//! process's place in it, and the subgrid shape every process holds. It
//! provides the three mutually inverse maps between a global coordinate, the
//! owning node, and the local linear index on that node:
//!
//! - [`Layout::linear_site_index`]: coordinate → local linear index,
//! - [`Layout::node_number`]: coordinate → owning node,
//! - [`Layout::site_coords`]: (node, linear) → coordinate.
//!
//! Local sites are numbered lexicographically inside the subgrid with axis 0
//! varying fastest.

use crate::comm::communicator::Communicator;
use crate::debug_invariants::DebugInvariants;
use crate::geometry::coord::{Coord, flatten, unflatten, volume};
use crate::geometry::process_grid::ProcessGrid;
use crate::layout_error::LayoutError;
use serde::{Deserialize, Serialize};

/// Options for [`Layout::create`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Static capacity limit on the total lattice volume.
    pub max_volume: Option<usize>,
    /// Process-grid shape to use instead of the transport's own choice.
    pub logical_size: Option<Vec<usize>>,
}

/// Distributed lattice layout.
///
/// # Invariants
/// - `vol == volume(nrow)` and `subgrid_vol == volume(subgrid_nrow)`.
/// - `subgrid_nrow[d] * logical_size[d] == nrow[d]` on every axis.
/// - `node_number(site_coords(p, l)) == p` and
///   `linear_site_index(site_coords(p, l)) == l` for all valid `(p, l)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Layout<const ND: usize> {
    nrow: [usize; ND],
    vol: usize,
    grid: ProcessGrid<ND>,
    subgrid_vol: usize,
}

impl<const ND: usize> Layout<ND> {
    /// Build the layout of a lattice of shape `extent` over `comm`'s processes.
    ///
    /// # Errors
    /// - `TransportUninitialized` if `comm` is not up.
    /// - `DimensionMismatch` if `extent.len() != ND`.
    /// - `ZeroExtent` if any axis is empty.
    /// - `CapacityExceeded` if `cfg.max_volume` is set and exceeded.
    /// - Any process-grid error from [`Communicator::layout_grid`].
    pub fn create<C: Communicator>(
        comm: &C,
        extent: &[usize],
        cfg: &LayoutConfig,
    ) -> Result<Self, LayoutError> {
        if !comm.is_initialized() {
            return Err(LayoutError::TransportUninitialized);
        }
        let nrow: [usize; ND] =
            extent
                .try_into()
                .map_err(|_| LayoutError::DimensionMismatch {
                    expected: ND,
                    got: extent.len(),
                })?;
        if let Some(dim) = nrow.iter().position(|&n| n == 0) {
            return Err(LayoutError::ZeroExtent { dim });
        }
        let vol = volume(&nrow);
        if let Some(capacity) = cfg.max_volume {
            if vol > capacity {
                return Err(LayoutError::CapacityExceeded {
                    volume: vol,
                    capacity,
                });
            }
        }

        let grid = comm.layout_grid(&nrow, cfg.logical_size.as_deref())?;
        let layout = Self {
            nrow,
            vol,
            subgrid_vol: volume(grid.subgrid()),
            grid,
        };
        layout.log_banner();
        crate::debug_invariants!(layout.validate_invariants(), "Layout::create");
        Ok(layout)
    }

    fn log_banner(&self) {
        let level = if self.primary_node() {
            log::Level::Info
        } else {
            log::Level::Debug
        };
        log::log!(level, "Lattice initialized:");
        log::log!(level, "  problem size = {:?}", self.nrow);
        log::log!(level, "  logical machine size = {:?}", self.logical_size());
        log::log!(level, "  logical node coord = {:?}", self.node_coord());
        log::log!(level, "  subgrid size = {:?}", self.subgrid_latt_size());
        log::log!(level, "  total volume = {}", self.vol);
        log::log!(level, "  subgrid volume = {}", self.subgrid_vol);
    }

    /// Global lattice shape.
    #[inline]
    pub fn latt_size(&self) -> &[usize; ND] {
        &self.nrow
    }

    /// Total number of lattice sites.
    #[inline]
    pub fn vol(&self) -> usize {
        self.vol
    }

    /// Shape of the subgrid held by every node.
    #[inline]
    pub fn subgrid_latt_size(&self) -> &[usize; ND] {
        self.grid.subgrid()
    }

    /// Number of sites on each node.
    #[inline]
    pub fn subgrid_vol(&self) -> usize {
        self.subgrid_vol
    }

    /// Shape of the process grid.
    #[inline]
    pub fn logical_size(&self) -> &[usize; ND] {
        self.grid.logical_size()
    }

    /// This node's coordinate in the process grid.
    #[inline]
    pub fn node_coord(&self) -> &Coord<ND> {
        self.grid.logical_coord()
    }

    /// This node's rank.
    #[inline]
    pub fn node_rank(&self) -> usize {
        self.grid.rank()
    }

    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.grid.num_nodes()
    }

    /// Whether this is the node that performs single-writer output.
    #[inline]
    pub fn primary_node(&self) -> bool {
        self.grid.rank() == 0
    }

    /// The process grid this layout was built on.
    #[inline]
    pub fn process_grid(&self) -> &ProcessGrid<ND> {
        &self.grid
    }

    /// Local linear index of `coord` on its owning node.
    #[inline]
    pub fn linear_site_index(&self, coord: &Coord<ND>) -> usize {
        let sub = self.grid.subgrid();
        let mut local = [0; ND];
        for d in 0..ND {
            local[d] = coord[d] % sub[d];
        }
        flatten(&local, sub)
    }

    /// Rank of the node that owns `coord`.
    #[inline]
    pub fn node_number(&self, coord: &Coord<ND>) -> usize {
        let sub = self.grid.subgrid();
        let mut node = [0; ND];
        for d in 0..ND {
            node[d] = coord[d] / sub[d];
        }
        flatten(&node, self.grid.logical_size())
    }

    /// Global coordinate of local site `linear` on node `node`.
    #[inline]
    pub fn site_coords(&self, node: usize, linear: usize) -> Coord<ND> {
        debug_assert!(node < self.num_nodes() && linear < self.subgrid_vol);
        let sub = self.grid.subgrid();
        let mut coord = unflatten(node, self.grid.logical_size());
        let local = unflatten(linear, sub);
        for d in 0..ND {
            coord[d] = coord[d] * sub[d] + local[d];
        }
        coord
    }

    /// Global lexicographic index of `coord`.
    #[inline]
    pub fn lexico_site_index(&self, coord: &Coord<ND>) -> usize {
        flatten(coord, &self.nrow)
    }

    /// Coordinate of global lexicographic index `site`.
    #[inline]
    pub fn lexico_coords(&self, site: usize) -> Coord<ND> {
        unflatten(site, &self.nrow)
    }

    /// Whether `coord` lives on this node.
    #[inline]
    pub fn is_local(&self, coord: &Coord<ND>) -> bool {
        self.node_number(coord) == self.node_rank()
    }

    /// Reject coordinates outside the global lattice.
    pub fn check_coord(&self, coord: &Coord<ND>) -> Result<(), LayoutError> {
        for d in 0..ND {
            if coord[d] >= self.nrow[d] {
                return Err(LayoutError::CoordinateOutOfRange {
                    dim: d,
                    value: coord[d],
                    extent: self.nrow[d],
                });
            }
        }
        Ok(())
    }

    /// Global coordinates of this node's sites, in local linear order.
    pub fn local_coords(&self) -> impl Iterator<Item = Coord<ND>> + '_ {
        let node = self.node_rank();
        (0..self.subgrid_vol).map(move |linear| self.site_coords(node, linear))
    }

    /// Coordinate along axis `mu` of every local site, in local linear order.
    ///
    /// # Errors
    /// `InvalidDimension` if `mu >= ND`.
    pub fn lattice_coordinate(&self, mu: usize) -> Result<Vec<usize>, LayoutError> {
        if mu >= ND {
            return Err(LayoutError::InvalidDimension { dim: mu, nd: ND });
        }
        Ok(self.local_coords().map(|c| c[mu]).collect())
    }
}

impl<const ND: usize> DebugInvariants for Layout<ND> {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "Layout");
    }

    fn validate_invariants(&self) -> Result<(), LayoutError> {
        let sub = self.grid.subgrid();
        let logical = self.grid.logical_size();
        for d in 0..ND {
            if sub[d] * logical[d] != self.nrow[d] {
                return Err(LayoutError::IndivisibleExtent {
                    dim: d,
                    extent: self.nrow[d],
                    parts: logical[d],
                });
            }
        }
        if volume(logical) != self.num_nodes() {
            return Err(LayoutError::ProcessGridMismatch {
                requested: volume(logical),
                num_nodes: self.num_nodes(),
            });
        }
        // Corners of the local subgrid must map back to this node.
        let me = self.node_rank();
        for linear in [0, self.subgrid_vol.saturating_sub(1)] {
            let c = self.site_coords(me, linear);
            let node = self.node_number(&c);
            if node != me || self.linear_site_index(&c) != linear {
                return Err(LayoutError::LocalityViolation {
                    linear,
                    node,
                    expected: me,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::communicator::LocalComm;

    fn layout<const ND: usize>(rank: usize, size: usize, extent: &[usize]) -> Layout<ND> {
        let comms = LocalComm::universe(size);
        Layout::create(&comms[rank], extent, &LayoutConfig::default()).unwrap()
    }

    #[test]
    fn single_node_owns_everything() {
        let l: Layout<2> = layout(0, 1, &[4, 4]);
        assert_eq!(l.vol(), 16);
        assert_eq!(l.subgrid_vol(), 16);
        assert_eq!(l.logical_size(), &[1, 1]);
        assert!(l.primary_node());
        assert_eq!(l.linear_site_index(&[1, 2]), 9);
        assert_eq!(l.node_number(&[3, 3]), 0);
        assert_eq!(l.site_coords(0, 9), [1, 2]);
    }

    #[test]
    fn two_nodes_in_one_dimension() {
        let l: Layout<1> = layout(1, 2, &[8]);
        assert_eq!(l.subgrid_latt_size(), &[4]);
        assert_eq!(l.node_coord(), &[1]);
        assert!(!l.primary_node());
        assert_eq!(l.node_number(&[5]), 1);
        assert_eq!(l.linear_site_index(&[5]), 1);
        assert_eq!(l.site_coords(0, 3), [3]);
        assert_eq!(l.local_coords().collect::<Vec<_>>(), vec![[4], [5], [6], [7]]);
    }

    #[test]
    fn dimension_mismatch_is_fatal() {
        let comm = LocalComm::serial();
        let err = Layout::<4>::create(&comm, &[4, 4], &LayoutConfig::default()).unwrap_err();
        assert_eq!(
            err,
            LayoutError::DimensionMismatch {
                expected: 4,
                got: 2
            }
        );
    }

    #[test]
    fn uninitialized_transport_is_fatal() {
        let comm = LocalComm::serial();
        comm.finalize();
        let err = Layout::<1>::create(&comm, &[4], &LayoutConfig::default()).unwrap_err();
        assert_eq!(err, LayoutError::TransportUninitialized);
    }

    #[test]
    fn capacity_limit_is_enforced() {
        let comm = LocalComm::serial();
        let cfg = LayoutConfig {
            max_volume: Some(15),
            ..Default::default()
        };
        let err = Layout::<2>::create(&comm, &[4, 4], &cfg).unwrap_err();
        assert_eq!(
            err,
            LayoutError::CapacityExceeded {
                volume: 16,
                capacity: 15
            }
        );
    }

    #[test]
    fn zero_extent_is_rejected() {
        let comm = LocalComm::serial();
        let err = Layout::<2>::create(&comm, &[4, 0], &LayoutConfig::default()).unwrap_err();
        assert_eq!(err, LayoutError::ZeroExtent { dim: 1 });
    }

    #[test]
    fn lattice_coordinate_along_axis() {
        let l: Layout<2> = layout(0, 2, &[2, 4]);
        // logical [1, 2], subgrid [2, 2]
        assert_eq!(l.lattice_coordinate(0).unwrap(), vec![0, 1, 0, 1]);
        assert_eq!(l.lattice_coordinate(1).unwrap(), vec![0, 0, 1, 1]);
        assert!(matches!(
            l.lattice_coordinate(2),
            Err(LayoutError::InvalidDimension { dim: 2, nd: 2 })
        ));
    }

    #[test]
    fn invariants_hold_after_create() {
        let l: Layout<3> = layout(3, 4, &[4, 4, 4]);
        l.validate_invariants().unwrap();
        assert!(l.check_coord(&[3, 3, 3]).is_ok());
        assert!(l.check_coord(&[3, 4, 3]).is_err());
    }
}
