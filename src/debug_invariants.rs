use crate::layout_error::LayoutError;

/// Structural self-checks of the lattice tables.
///
/// [`Layout`](crate::geometry::layout::Layout) checks that the process grid
/// tiles the lattice and that its subgrid corners map back to this node;
/// [`Set`](crate::geometry::subset::Set) checks that its subsets partition the
/// local sites by color.
pub trait DebugInvariants {
    /// Assert invariants in debug builds or when invariant checking is enabled.
    fn debug_assert_invariants(&self);
    /// Validate invariants and return the first error encountered.
    fn validate_invariants(&self) -> Result<(), LayoutError>;
}

/// Helper macro to run a fallible check and panic on error when invariant
/// checking is enabled.
#[macro_export]
macro_rules! debug_invariants {
    ($expr:expr, $($ctx:tt)*) => {
        #[cfg(any(debug_assertions, feature = "check-invariants"))]
        if let Err(e) = $expr {
            panic!(concat!("[invariants] ", $($ctx)*, ": {}"), e);
        }
    };
}
