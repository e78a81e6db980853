#![cfg_attr(docsrs, feature(doc_cfg))]
//! # lattice-layout
//!
//! lattice-layout distributes a periodic N-dimensional Cartesian lattice over
//! the processes of a parallel run. It decides which process owns each site,
//! numbers the sites each process holds, and precomputes the tables that
//! stencil and field codes need to exchange data between processes.
//!
//! ## Features
//! - [`Layout`]: process-grid factorization and the coordinate ↔ (node, index) maps
//! - [`Set`] / [`Subset`]: partitions of the local sites by a coloring function,
//!   including the even/odd and hypercube checkerboards
//! - [`NearestNeighborMap`] and [`GeneralMap`]: precomputed site relations with
//!   per-node source/destination counts
//! - [`Channels`]: per-dimension neighbor exchange and point-to-point messages
//! - Pluggable transports: an in-process [`LocalComm`] and, with the
//!   `mpi-support` feature, `MpiComm`
//!
//! ## Usage
//!
//! ```
//! use lattice_layout::prelude::*;
//!
//! let lat = Lattice::<LocalComm, 2>::create(
//!     LocalComm::serial(),
//!     &[4, 4],
//!     &LayoutConfig::default(),
//! )
//! .unwrap();
//! assert_eq!(lat.layout().subgrid_vol(), 16);
//! assert_eq!(lat.rb()[0].len(), 8);
//! ```
//!
//! ## Logging
//! The crate logs through the `log` facade and never installs a logger.
//! The layout banner is emitted at `info` on the primary node.
//!
//! ## Invariant checks
//! Structural invariants are verified in debug builds, or in release builds
//! with the `check-invariants` feature.

pub mod comm;
pub mod debug_invariants;
pub mod geometry;
pub mod lattice;
pub mod layout_error;
pub mod maps;

pub use comm::channels::Channels;
#[cfg(feature = "mpi-support")]
pub use comm::communicator::MpiComm;
pub use comm::communicator::{Communicator, LocalComm};
pub use debug_invariants::DebugInvariants;
pub use geometry::layout::{Layout, LayoutConfig};
pub use geometry::subset::{Set, Subset};
pub use lattice::Lattice;
pub use layout_error::{ErrorKind, LayoutError};
pub use maps::general::GeneralMap;
pub use maps::shift::NearestNeighborMap;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::comm::channels::Channels;
    #[cfg(feature = "mpi-support")]
    pub use crate::comm::communicator::MpiComm;
    pub use crate::comm::communicator::{CommTag, Communicator, LocalComm, Wait};
    pub use crate::debug_invariants::DebugInvariants;
    pub use crate::geometry::coord::{Coord, Direction};
    pub use crate::geometry::layout::{Layout, LayoutConfig};
    pub use crate::geometry::process_grid::ProcessGrid;
    pub use crate::geometry::subset::{
        AllSites, ColorFn, DefaultSets, HypercubeCheckerboard, RedBlack, Set, SetFunc, Subset,
    };
    pub use crate::lattice::Lattice;
    pub use crate::layout_error::{ErrorKind, LayoutError, fatal, or_abort};
    pub use crate::maps::general::{GeneralMap, MapFunc};
    pub use crate::maps::shift::{NearestNeighborMap, SiteRef};
}
