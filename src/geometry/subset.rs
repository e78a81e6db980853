//! Site colorings: partitioning a node's sites into named subsets.
//!
//! A [`SetFunc`] colors every global coordinate. [`Set::make`] evaluates it on
//! this node's sites and groups them by color into [`Subset`]s. A subset whose
//! sites form one contiguous run of local indices also records that run as an
//! interval so consumers can loop without the site table.

use crate::debug_invariants::DebugInvariants;
use crate::geometry::coord::Coord;
use crate::geometry::layout::Layout;
use crate::layout_error::LayoutError;
use std::ops::Range;

/// A coloring of the lattice.
///
/// The color of a site must be computable from its coordinate alone.
pub trait SetFunc<const ND: usize> {
    /// Color of the site at `coord`, in `0..num_subsets()`.
    fn color(&self, coord: &Coord<ND>) -> usize;
    /// Number of colors this function produces.
    fn num_subsets(&self) -> usize;
}

/// Adapts a closure into a [`SetFunc`] with a fixed number of colors.
#[derive(Clone, Copy, Debug)]
pub struct ColorFn<F> {
    num_subsets: usize,
    f: F,
}

impl<F> ColorFn<F> {
    pub fn new(num_subsets: usize, f: F) -> Self {
        Self { num_subsets, f }
    }
}

impl<F, const ND: usize> SetFunc<ND> for ColorFn<F>
where
    F: Fn(&Coord<ND>) -> usize,
{
    #[inline]
    fn color(&self, coord: &Coord<ND>) -> usize {
        (self.f)(coord)
    }

    #[inline]
    fn num_subsets(&self) -> usize {
        self.num_subsets
    }
}

/// Every site gets color 0.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllSites;

impl<const ND: usize> SetFunc<ND> for AllSites {
    fn color(&self, _coord: &Coord<ND>) -> usize {
        0
    }
    fn num_subsets(&self) -> usize {
        1
    }
}

/// Even/odd checkerboard: `sum(coord) mod 2`.
#[derive(Clone, Copy, Debug, Default)]
pub struct RedBlack;

impl<const ND: usize> SetFunc<ND> for RedBlack {
    fn color(&self, coord: &Coord<ND>) -> usize {
        coord.iter().sum::<usize>() % 2
    }
    fn num_subsets(&self) -> usize {
        2
    }
}

/// Hypercube checkerboard: bit `d` of the color is `coord[d] mod 2`.
#[derive(Clone, Copy, Debug, Default)]
pub struct HypercubeCheckerboard;

impl<const ND: usize> SetFunc<ND> for HypercubeCheckerboard {
    fn color(&self, coord: &Coord<ND>) -> usize {
        coord
            .iter()
            .enumerate()
            .fold(0, |acc, (d, &c)| acc | ((c % 2) << d))
    }
    fn num_subsets(&self) -> usize {
        1 << ND
    }
}

/// The sites of one color on this node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subset {
    color: usize,
    sites: Vec<usize>,
    interval: Option<Range<usize>>,
}

impl Subset {
    fn new(color: usize, sites: Vec<usize>) -> Self {
        let interval = match (sites.first(), sites.last()) {
            (Some(&first), Some(&last)) if last - first + 1 == sites.len() => {
                Some(first..last + 1)
            }
            _ => None,
        };
        Self {
            color,
            sites,
            interval,
        }
    }

    #[inline]
    pub fn color(&self) -> usize {
        self.color
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.sites.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// Local linear indices of this subset, ascending.
    #[inline]
    pub fn site_table(&self) -> &[usize] {
        &self.sites
    }

    /// The contiguous run covered by this subset, when it is one.
    #[inline]
    pub fn interval(&self) -> Option<Range<usize>> {
        self.interval.clone()
    }

    #[inline]
    pub fn is_interval(&self) -> bool {
        self.interval.is_some()
    }

    /// Iterate the local indices, straight over the interval when known.
    pub fn iter(&self) -> SubsetIter<'_> {
        match &self.interval {
            Some(r) => SubsetIter::Interval(r.clone()),
            None => SubsetIter::Table(self.sites.iter()),
        }
    }
}

/// Iterator over the local indices of a [`Subset`].
#[derive(Clone, Debug)]
pub enum SubsetIter<'a> {
    Interval(Range<usize>),
    Table(std::slice::Iter<'a, usize>),
}

impl Iterator for SubsetIter<'_> {
    type Item = usize;

    #[inline]
    fn next(&mut self) -> Option<usize> {
        match self {
            SubsetIter::Interval(r) => r.next(),
            SubsetIter::Table(it) => it.next().copied(),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self {
            SubsetIter::Interval(r) => r.size_hint(),
            SubsetIter::Table(it) => it.size_hint(),
        }
    }
}

impl ExactSizeIterator for SubsetIter<'_> {}

impl<'a> IntoIterator for &'a Subset {
    type Item = usize;
    type IntoIter = SubsetIter<'a>;

    fn into_iter(self) -> SubsetIter<'a> {
        self.iter()
    }
}

/// A partition of this node's sites by color.
///
/// # Invariants
/// - Every local site has exactly one color, below `num_subsets`.
/// - Subset `c` holds exactly the sites of color `c`, ascending.
/// - Subset sizes sum to the subgrid volume.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Set {
    lat_color: Vec<usize>,
    subsets: Vec<Subset>,
}

impl Set {
    /// Color this node's sites with `func` and build one subset per color.
    ///
    /// # Errors
    /// - `EmptyColoring` if `func` declares no colors.
    /// - `LocalityViolation` if a visited site is owned by another node.
    /// - `ColorOutOfRange` if `func` returns a color `>= num_subsets()`.
    /// - `CoverageViolation` if a local site ends up without a color.
    pub fn make<F, const ND: usize>(layout: &Layout<ND>, func: &F) -> Result<Self, LayoutError>
    where
        F: SetFunc<ND> + ?Sized,
    {
        let nsubset = func.num_subsets();
        if nsubset == 0 {
            return Err(LayoutError::EmptyColoring);
        }
        let me = layout.node_rank();
        let nsites = layout.subgrid_vol();

        let mut lat_color: Vec<Option<usize>> = vec![None; nsites];
        for site in 0..nsites {
            let coord = layout.site_coords(me, site);
            let node = layout.node_number(&coord);
            let linear = layout.linear_site_index(&coord);
            if node != me {
                return Err(LayoutError::LocalityViolation {
                    linear,
                    node,
                    expected: me,
                });
            }
            let color = func.color(&coord);
            if color >= nsubset {
                return Err(LayoutError::ColorOutOfRange {
                    linear,
                    color,
                    num_subsets: nsubset,
                });
            }
            log::trace!("site={site} coord={coord:?} node={node} linear={linear} col={color}");
            lat_color[linear] = Some(color);
        }

        let lat_color = lat_color
            .into_iter()
            .enumerate()
            .map(|(linear, c)| c.ok_or(LayoutError::CoverageViolation { linear }))
            .collect::<Result<Vec<_>, _>>()?;

        let mut tables: Vec<Vec<usize>> = vec![Vec::new(); nsubset];
        for (linear, &c) in lat_color.iter().enumerate() {
            tables[c].push(linear);
        }
        let subsets: Vec<Subset> = tables
            .into_iter()
            .enumerate()
            .map(|(c, sites)| Subset::new(c, sites))
            .collect();
        for s in &subsets {
            log::debug!(
                "Subset({}): len={} interval={:?}",
                s.color(),
                s.len(),
                s.interval()
            );
        }

        let set = Self { lat_color, subsets };
        crate::debug_invariants!(set.validate_invariants(), "Set::make");
        Ok(set)
    }

    #[inline]
    pub fn num_subsets(&self) -> usize {
        self.subsets.len()
    }

    /// Subset of color `color`.
    #[inline]
    pub fn subset(&self, color: usize) -> Option<&Subset> {
        self.subsets.get(color)
    }

    #[inline]
    pub fn subsets(&self) -> &[Subset] {
        &self.subsets
    }

    /// Color of local site `linear`.
    #[inline]
    pub fn color_of(&self, linear: usize) -> Option<usize> {
        self.lat_color.get(linear).copied()
    }

    /// Per-site color table, indexed by local linear index.
    #[inline]
    pub fn lattice_colors(&self) -> &[usize] {
        &self.lat_color
    }
}

impl std::ops::Index<usize> for Set {
    type Output = Subset;

    fn index(&self, color: usize) -> &Subset {
        &self.subsets[color]
    }
}

impl DebugInvariants for Set {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "Set");
    }

    fn validate_invariants(&self) -> Result<(), LayoutError> {
        let total: usize = self.subsets.iter().map(Subset::len).sum();
        if total != self.lat_color.len() {
            return Err(LayoutError::CoverageViolation {
                linear: total.min(self.lat_color.len()),
            });
        }
        for s in &self.subsets {
            for linear in s.iter() {
                if self.lat_color.get(linear) != Some(&s.color()) {
                    return Err(LayoutError::CoverageViolation { linear });
                }
            }
        }
        Ok(())
    }
}

/// Partitions built for every lattice at creation.
#[derive(Clone, Debug)]
pub struct DefaultSets {
    /// One subset holding every site.
    pub all: Set,
    /// Even/odd checkerboard.
    pub rb: Set,
    /// `2^ND` hypercube checkerboard.
    pub mcb: Set,
}

impl DefaultSets {
    pub fn make<const ND: usize>(layout: &Layout<ND>) -> Result<Self, LayoutError> {
        Ok(Self {
            all: Set::make(layout, &AllSites)?,
            rb: Set::make(layout, &RedBlack)?,
            mcb: Set::make(layout, &HypercubeCheckerboard)?,
        })
    }
}
