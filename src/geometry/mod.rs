//! Lattice geometry: coordinates, process grid, layout and site partitions.

pub mod coord;
pub mod layout;
pub mod process_grid;
pub mod subset;
