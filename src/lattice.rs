//! Process-wide lattice context.
//!
//! A [`Lattice`] is built once per run. It holds the [`Layout`], the default
//! partitions, the neighbor channels, and lazily built or named-cached maps
//! and subsets. Everything is read-only after construction apart from the
//! channel slots, so callers pass `&Lattice` around freely.

use crate::comm::channels::Channels;
use crate::comm::communicator::Communicator;
use crate::geometry::layout::{Layout, LayoutConfig};
use crate::geometry::subset::{DefaultSets, Set, SetFunc};
use crate::layout_error::{LayoutError, or_abort};
use crate::maps::general::{GeneralMap, MapFunc};
use crate::maps::shift::NearestNeighborMap;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

pub struct Lattice<C: Communicator, const ND: usize> {
    layout: Layout<ND>,
    sets: DefaultSets,
    /// Built on first call to [`Lattice::shift`].
    shift: OnceCell<NearestNeighborMap<ND>>,
    named_sets: Mutex<HashMap<String, Arc<Set>>>,
    named_maps: Mutex<HashMap<String, Arc<GeneralMap>>>,
    channels: Channels<C, ND>,
}

impl<C: Communicator, const ND: usize> Lattice<C, ND> {
    /// Build the layout and default subsets over `comm`.
    pub fn create(comm: C, extent: &[usize], cfg: &LayoutConfig) -> Result<Self, LayoutError> {
        Self::create_with(comm, extent, cfg, |_| {})
    }

    /// Like [`create`](Self::create), then hand the finished layout to
    /// `on_ready` (e.g. to seed a per-site random number generator) before
    /// returning.
    pub fn create_with<F>(
        comm: C,
        extent: &[usize],
        cfg: &LayoutConfig,
        on_ready: F,
    ) -> Result<Self, LayoutError>
    where
        F: FnOnce(&Layout<ND>),
    {
        let (layout, sets) = Self::build(&comm, extent, cfg)?;
        Ok(Self::assemble(comm, layout, sets, on_ready))
    }

    /// Like [`create`](Self::create), but any failure is reported through
    /// `log::error!` and terminates every process via [`Communicator::abort`].
    pub fn create_or_abort(comm: C, extent: &[usize], cfg: &LayoutConfig) -> Self {
        Self::create_or_abort_with(comm, extent, cfg, |_| {})
    }

    /// [`create_with`](Self::create_with) with the failure handling of
    /// [`create_or_abort`](Self::create_or_abort).
    pub fn create_or_abort_with<F>(
        comm: C,
        extent: &[usize],
        cfg: &LayoutConfig,
        on_ready: F,
    ) -> Self
    where
        F: FnOnce(&Layout<ND>),
    {
        let (layout, sets) = or_abort(&comm, Self::build(&comm, extent, cfg));
        Self::assemble(comm, layout, sets, on_ready)
    }

    fn build(
        comm: &C,
        extent: &[usize],
        cfg: &LayoutConfig,
    ) -> Result<(Layout<ND>, DefaultSets), LayoutError> {
        let layout = Layout::create(comm, extent, cfg)?;
        let sets = DefaultSets::make(&layout)?;
        Ok((layout, sets))
    }

    fn assemble<F>(comm: C, layout: Layout<ND>, sets: DefaultSets, on_ready: F) -> Self
    where
        F: FnOnce(&Layout<ND>),
    {
        on_ready(&layout);
        log::debug!("Finished lattice layout");
        Self {
            channels: Channels::new(comm, layout.process_grid().clone()),
            layout,
            sets,
            shift: OnceCell::new(),
            named_sets: Mutex::new(HashMap::new()),
            named_maps: Mutex::new(HashMap::new()),
        }
    }

    #[inline]
    pub fn layout(&self) -> &Layout<ND> {
        &self.layout
    }

    /// Single subset holding every local site.
    #[inline]
    pub fn all(&self) -> &Set {
        &self.sets.all
    }

    /// Even/odd checkerboard.
    #[inline]
    pub fn rb(&self) -> &Set {
        &self.sets.rb
    }

    /// Hypercube checkerboard with `2^ND` colors.
    #[inline]
    pub fn mcb(&self) -> &Set {
        &self.sets.mcb
    }

    /// Nearest-neighbor map, built on first use.
    pub fn shift(&self) -> &NearestNeighborMap<ND> {
        self.shift
            .get_or_init(|| NearestNeighborMap::make(&self.layout))
    }

    /// Partition registered under `name`, built from `func` the first time.
    ///
    /// Later calls with the same name return the cached set and ignore `func`.
    pub fn set<F>(&self, name: &str, func: &F) -> Result<Arc<Set>, LayoutError>
    where
        F: SetFunc<ND> + ?Sized,
    {
        let mut cache = self.named_sets.lock();
        if let Some(set) = cache.get(name) {
            return Ok(Arc::clone(set));
        }
        let set = Arc::new(Set::make(&self.layout, func)?);
        log::debug!("cached set {name:?} with {} subsets", set.num_subsets());
        cache.insert(name.to_owned(), Arc::clone(&set));
        Ok(set)
    }

    /// General map registered under `name`, built from `func` the first time.
    ///
    /// Later calls with the same name return the cached map and ignore `func`.
    pub fn map<F>(&self, name: &str, func: &F) -> Result<Arc<GeneralMap>, LayoutError>
    where
        F: MapFunc<ND> + ?Sized,
    {
        let mut cache = self.named_maps.lock();
        if let Some(map) = cache.get(name) {
            return Ok(Arc::clone(map));
        }
        let map = Arc::new(GeneralMap::make(&self.layout, func)?);
        log::debug!("cached map {name:?}");
        cache.insert(name.to_owned(), Arc::clone(&map));
        Ok(map)
    }

    #[inline]
    pub fn comm(&self) -> &C {
        self.channels.comm()
    }

    #[inline]
    pub fn channels(&self) -> &Channels<C, ND> {
        &self.channels
    }

    #[inline]
    pub fn channels_mut(&mut self) -> &mut Channels<C, ND> {
        &mut self.channels
    }
}
