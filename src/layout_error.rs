//! LayoutError: unified error type for lattice-layout public APIs
//!
//! Every fallible operation in the crate returns a [`LayoutError`]. None of
//! them is recovered locally: a geometry that diverges between processes
//! corrupts every later exchange, so the top-level setup path hands any error
//! to [`fatal`], which logs the diagnostic and terminates the process group.

use crate::comm::communicator::Communicator;
use thiserror::Error;

/// Coarse classification of a [`LayoutError`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad lattice shape, process grid, caller function or buffer.
    Configuration,
    /// A coloring disagreed with actual site ownership.
    Locality,
    /// A local site was left without a color.
    Coverage,
    /// The transport refused to start an operation.
    CommunicationPost,
    /// An operation completed with missing or malformed data.
    Communication,
    /// Channel pairing discipline was broken.
    Protocol,
}

/// Unified error type for lattice-layout operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LayoutError {
    /// Lattice (or requested process grid) has the wrong number of axes.
    #[error("dimension of lattice size not the same as the default: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    /// `Layout::create` called before the transport was initialized.
    #[error("transport is not initialized")]
    TransportUninitialized,
    /// Total volume is larger than the configured static capacity.
    #[error("lattice volume {volume} exceeds configured capacity {capacity}")]
    CapacityExceeded { volume: usize, capacity: usize },
    /// An axis of the lattice has zero extent.
    #[error("lattice extent along axis {dim} is zero")]
    ZeroExtent { dim: usize },
    /// The lattice cannot be split evenly across the process grid.
    #[error("lattice extent {extent} along axis {dim} is not divisible by {parts} processes")]
    IndivisibleExtent {
        dim: usize,
        extent: usize,
        parts: usize,
    },
    /// Requested process grid does not match the number of processes.
    #[error("requested process grid holds {requested} processes but {num_nodes} are running")]
    ProcessGridMismatch { requested: usize, num_nodes: usize },
    /// Axis index out of range.
    #[error("dimension {dim} out of bounds (lattice has {nd})")]
    InvalidDimension { dim: usize, nd: usize },
    /// A coordinate component lies outside the lattice.
    #[error("coordinate {value} along axis {dim} is outside extent {extent}")]
    CoordinateOutOfRange {
        dim: usize,
        value: usize,
        extent: usize,
    },
    /// A coloring function declared zero subsets.
    #[error("coloring declares no subsets")]
    EmptyColoring,
    /// A coloring function returned a color past `num_subsets`.
    #[error("color {color} at site {linear} is out of range (num_subsets = {num_subsets})")]
    ColorOutOfRange {
        linear: usize,
        color: usize,
        num_subsets: usize,
    },
    /// Coloring visited a site owned by another node.
    #[error("Set: found site {linear} with node {node} outside current node {expected}")]
    LocalityViolation {
        linear: usize,
        node: usize,
        expected: usize,
    },
    /// A local site was never colored.
    #[error("Set: found site {linear} with coloring not set")]
    CoverageViolation { linear: usize },
    /// A relation function is not its own inverse at a local site.
    #[error("relation is not forward/backward consistent at site {linear}")]
    RelationNotInverse { linear: usize },
    /// Send and receive buffers disagree in size.
    #[error("buffer length mismatch: expected {expected} bytes, got {got}")]
    BufferMismatch { expected: usize, got: usize },
    /// The transport failed to post an operation.
    #[error("failed to post operation with rank {peer}: {reason}")]
    CommPost { peer: usize, reason: String },
    /// An operation completed without the expected payload.
    #[error("communication with rank {peer} failed: {reason}")]
    CommError { peer: usize, reason: String },
    /// A channel was posted twice without an intervening wait.
    #[error("channel {dim} already has an outstanding operation")]
    ChannelBusy { dim: usize },
    /// A wait was issued on a channel with nothing posted.
    #[error("channel {dim} has no outstanding operation")]
    ChannelIdle { dim: usize },
}

impl LayoutError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        use LayoutError::*;
        match self {
            LocalityViolation { .. } => ErrorKind::Locality,
            CoverageViolation { .. } => ErrorKind::Coverage,
            CommPost { .. } => ErrorKind::CommunicationPost,
            CommError { .. } => ErrorKind::Communication,
            ChannelBusy { .. } | ChannelIdle { .. } => ErrorKind::Protocol,
            _ => ErrorKind::Configuration,
        }
    }
}

/// Log `err` and terminate the whole process group through `comm`.
pub fn fatal<C: Communicator>(comm: &C, err: &LayoutError) -> ! {
    log::error!("[rank {}] fatal {:?} error: {}", comm.rank(), err.kind(), err);
    comm.abort(1)
}

/// Unwrap `res`, or terminate the process group on error.
pub fn or_abort<T, C: Communicator>(comm: &C, res: Result<T, LayoutError>) -> T {
    match res {
        Ok(v) => v,
        Err(e) => fatal(comm, &e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(
            LayoutError::TransportUninitialized.kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            LayoutError::LocalityViolation {
                linear: 0,
                node: 1,
                expected: 0
            }
            .kind(),
            ErrorKind::Locality
        );
        assert_eq!(
            LayoutError::CoverageViolation { linear: 3 }.kind(),
            ErrorKind::Coverage
        );
        assert_eq!(
            LayoutError::CommPost {
                peer: 2,
                reason: "x".into()
            }
            .kind(),
            ErrorKind::CommunicationPost
        );
        assert_eq!(LayoutError::ChannelBusy { dim: 0 }.kind(), ErrorKind::Protocol);
    }

    #[test]
    fn messages_name_the_condition() {
        let e = LayoutError::IndivisibleExtent {
            dim: 2,
            extent: 6,
            parts: 4,
        };
        assert_eq!(
            e.to_string(),
            "lattice extent 6 along axis 2 is not divisible by 4 processes"
        );
        let e = LayoutError::CoverageViolation { linear: 7 };
        assert!(e.to_string().contains("coloring not set"));
    }
}
