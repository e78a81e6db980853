//! Site-to-site relations: nearest-neighbor shifts and caller-defined maps.

pub mod general;
pub mod shift;
