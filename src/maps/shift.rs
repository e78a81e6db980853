//! Nearest-neighbor shift tables.
//!
//! For every local site and every `(dimension, direction)` pair the table
//! records the periodic neighbor's local linear index and owning node. The
//! linear index is meaningful on the owning node because every subgrid has
//! the same shape; off-node neighbors are fetched at exchange time over the
//! matching neighbor channel (see [`crate::comm::channels::Channels`]).

use crate::geometry::coord::{Direction, periodic_step};
use crate::geometry::layout::Layout;
use crate::layout_error::LayoutError;

/// Where a neighbor lives.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct SiteRef {
    /// Linear index on `node`.
    pub linear: usize,
    /// Owning node.
    pub node: usize,
}

/// Precomputed periodic neighbors of every local site.
#[derive(Clone, Debug)]
pub struct NearestNeighborMap<const ND: usize> {
    my_node: usize,
    subgrid_vol: usize,
    /// `soffsets[dim][dir.index()][linear]`.
    soffsets: [[Vec<SiteRef>; 2]; ND],
}

impl<const ND: usize> NearestNeighborMap<ND> {
    /// Build the neighbor tables for this node.
    pub fn make(layout: &Layout<ND>) -> Self {
        let nrow = layout.latt_size();
        let nsites = layout.subgrid_vol();
        let me = layout.node_rank();
        let mut soffsets: [[Vec<SiteRef>; 2]; ND] =
            std::array::from_fn(|_| [vec![SiteRef::default(); nsites], vec![SiteRef::default(); nsites]]);

        for site in 0..layout.vol() {
            let coord = layout.lexico_coords(site);
            if layout.node_number(&coord) != me {
                continue;
            }
            let ipos = layout.linear_site_index(&coord);
            for (m, table) in soffsets.iter_mut().enumerate() {
                for dir in Direction::BOTH {
                    let nbr = periodic_step(&coord, m, dir, nrow);
                    table[dir.index()][ipos] = SiteRef {
                        linear: layout.linear_site_index(&nbr),
                        node: layout.node_number(&nbr),
                    };
                }
            }
        }
        log::debug!("NearestNeighborMap: built {ND}x2 tables of {nsites} sites");

        Self {
            my_node: me,
            subgrid_vol: nsites,
            soffsets,
        }
    }

    fn table(&self, dim: usize, dir: Direction) -> Result<&[SiteRef], LayoutError> {
        self.soffsets
            .get(dim)
            .map(|t| t[dir.index()].as_slice())
            .ok_or(LayoutError::InvalidDimension { dim, nd: ND })
    }

    /// Neighbor of local site `linear` one step along `dim` in direction `dir`.
    ///
    /// # Panics
    /// If `dim >= ND` or `linear >= subgrid_vol`.
    #[inline]
    pub fn neighbor(&self, dim: usize, dir: Direction, linear: usize) -> SiteRef {
        self.soffsets[dim][dir.index()][linear]
    }

    /// Linear index of the neighbor on its owning node.
    #[inline]
    pub fn offset(&self, dim: usize, dir: Direction, linear: usize) -> usize {
        self.neighbor(dim, dir, linear).linear
    }

    /// Linear index of the neighbor when it lives on this node.
    #[inline]
    pub fn local_offset(&self, dim: usize, dir: Direction, linear: usize) -> Option<usize> {
        let r = self.neighbor(dim, dir, linear);
        (r.node == self.my_node).then_some(r.linear)
    }

    /// Rank owning the neighbor.
    #[inline]
    pub fn neighbor_node(&self, dim: usize, dir: Direction, linear: usize) -> usize {
        self.neighbor(dim, dir, linear).node
    }

    #[inline]
    pub fn is_off_node(&self, dim: usize, dir: Direction, linear: usize) -> bool {
        self.neighbor_node(dim, dir, linear) != self.my_node
    }

    /// Local sites whose `(dim, dir)` neighbor lives on another node, ascending.
    ///
    /// These are the sites whose data must arrive over the `(dim, dir)`
    /// channel; the list sizes and orders the exchange buffers.
    pub fn face_sites(&self, dim: usize, dir: Direction) -> Result<Vec<usize>, LayoutError> {
        let table = self.table(dim, dir)?;
        Ok(table
            .iter()
            .enumerate()
            .filter(|(_, r)| r.node != self.my_node)
            .map(|(linear, _)| linear)
            .collect())
    }

    #[inline]
    pub fn subgrid_vol(&self) -> usize {
        self.subgrid_vol
    }
}
