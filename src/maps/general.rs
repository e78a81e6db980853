//! General site relations and their communication plans.
//!
//! A [`MapFunc`] relates every site to another lattice site:
//! `map(c, Forward)` is the site `c` reads from and `map(c, Backward)` is the
//! site that will read from `c`. The two directions must be inverses of each
//! other over the whole lattice; [`GeneralMap::make`] trusts this, while
//! [`GeneralMap::make_checked`] verifies it on the local sites.
//!
//! The resulting plan lists, per local site, where its source lives and where
//! its data goes, plus the sorted-unique partner nodes with the number of sites
//! routed through each. Those counts size the caller's gather/scatter buffers.

use crate::comm::communicator::{CommTag, Communicator, Wait};
use crate::comm::wire::{WireCount, cast_slice, cast_slice_mut};
use crate::geometry::coord::{Coord, Direction};
use crate::geometry::layout::Layout;
use crate::layout_error::LayoutError;
use itertools::Itertools;
use std::collections::BTreeMap;

/// A relation between lattice sites.
pub trait MapFunc<const ND: usize> {
    /// The related site of `coord` in direction `dir`.
    fn map(&self, coord: &Coord<ND>, dir: Direction) -> Coord<ND>;
}

impl<F, const ND: usize> MapFunc<ND> for F
where
    F: Fn(&Coord<ND>, Direction) -> Coord<ND>,
{
    #[inline]
    fn map(&self, coord: &Coord<ND>, dir: Direction) -> Coord<ND> {
        self(coord, dir)
    }
}

/// Communication plan of one relation on this node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GeneralMap {
    my_node: usize,
    /// Source linear index, per local site.
    soffsets: Vec<usize>,
    /// Source node, per local site.
    srcnode: Vec<usize>,
    /// Destination node, per local site.
    dstnode: Vec<usize>,
    srcenodes: Vec<usize>,
    destnodes: Vec<usize>,
    srcenodes_num: Vec<usize>,
    destnodes_num: Vec<usize>,
}

impl GeneralMap {
    /// Build the plan for `func` without checking that it is invertible.
    ///
    /// # Errors
    /// `CoordinateOutOfRange` if `func` leaves the lattice.
    pub fn make<F, const ND: usize>(layout: &Layout<ND>, func: &F) -> Result<Self, LayoutError>
    where
        F: MapFunc<ND> + ?Sized,
    {
        log::debug!("GeneralMap::make");
        let me = layout.node_rank();
        let nsites = layout.subgrid_vol();
        let mut soffsets = Vec::with_capacity(nsites);
        let mut srcnode = Vec::with_capacity(nsites);
        let mut dstnode = Vec::with_capacity(nsites);

        for linear in 0..nsites {
            let coord = layout.site_coords(me, linear);
            let fcoord = func.map(&coord, Direction::Forward);
            let bcoord = func.map(&coord, Direction::Backward);
            layout.check_coord(&fcoord)?;
            layout.check_coord(&bcoord)?;

            soffsets.push(layout.linear_site_index(&fcoord));
            srcnode.push(layout.node_number(&fcoord));
            dstnode.push(layout.node_number(&bcoord));
            log::trace!(
                "soffsets({linear}) = {} srcnode = {} dstnode = {}",
                soffsets[linear],
                srcnode[linear],
                dstnode[linear]
            );
        }

        let (srcenodes, srcenodes_num) = tally(&srcnode, me);
        let (destnodes, destnodes_num) = tally(&dstnode, me);
        log::debug!(
            "GeneralMap: src nodes {:?} x {:?}, dst nodes {:?} x {:?}",
            srcenodes,
            srcenodes_num,
            destnodes,
            destnodes_num
        );

        Ok(Self {
            my_node: me,
            soffsets,
            srcnode,
            dstnode,
            srcenodes,
            destnodes,
            srcenodes_num,
            destnodes_num,
        })
    }

    /// Like [`make`](Self::make), but first verify on every local site that
    /// the backward relation undoes the forward one and vice versa.
    ///
    /// # Errors
    /// `RelationNotInverse` at the first inconsistent site, plus the errors
    /// of [`make`](Self::make).
    pub fn make_checked<F, const ND: usize>(
        layout: &Layout<ND>,
        func: &F,
    ) -> Result<Self, LayoutError>
    where
        F: MapFunc<ND> + ?Sized,
    {
        for (linear, coord) in layout.local_coords().enumerate() {
            for dir in Direction::BOTH {
                let there = func.map(&coord, dir);
                layout.check_coord(&there)?;
                if func.map(&there, dir.reverse()) != coord {
                    return Err(LayoutError::RelationNotInverse { linear });
                }
            }
        }
        Self::make(layout, func)
    }

    /// Linear index (on its node) of the site that local site `linear` reads.
    #[inline]
    pub fn soffset(&self, linear: usize) -> usize {
        self.soffsets[linear]
    }

    #[inline]
    pub fn soffsets(&self) -> &[usize] {
        &self.soffsets
    }

    /// Node holding the source of local site `linear`.
    #[inline]
    pub fn src_node(&self, linear: usize) -> usize {
        self.srcnode[linear]
    }

    /// Node that reads local site `linear`.
    #[inline]
    pub fn dst_node(&self, linear: usize) -> usize {
        self.dstnode[linear]
    }

    /// Distinct source nodes, ascending; always contains this node.
    #[inline]
    pub fn src_nodes(&self) -> &[usize] {
        &self.srcenodes
    }

    /// Distinct destination nodes, ascending; always contains this node.
    #[inline]
    pub fn dst_nodes(&self) -> &[usize] {
        &self.destnodes
    }

    /// Sites received from each entry of [`src_nodes`](Self::src_nodes).
    #[inline]
    pub fn src_counts(&self) -> &[usize] {
        &self.srcenodes_num
    }

    /// Sites sent to each entry of [`dst_nodes`](Self::dst_nodes).
    #[inline]
    pub fn dst_counts(&self) -> &[usize] {
        &self.destnodes_num
    }

    /// Sites received from `node` (0 if it is not a source).
    pub fn src_count(&self, node: usize) -> usize {
        lookup(&self.srcenodes, &self.srcenodes_num, node)
    }

    /// Sites sent to `node` (0 if it is not a destination).
    pub fn dst_count(&self, node: usize) -> usize {
        lookup(&self.destnodes, &self.destnodes_num, node)
    }

    /// Whether every source and destination is this node.
    pub fn is_local(&self) -> bool {
        self.srcenodes == [self.my_node] && self.destnodes == [self.my_node]
    }

    /// Cross-check the plan with every other node.
    ///
    /// Each node tells every other node how many of its sites that node will
    /// read, then compares what it was told with its own `src_counts`.
    /// Collective over all `comm.size()` ranks, so a plan that disagrees
    /// between nodes is reported instead of leaving a receive unmatched.
    /// Every posted handle is drained before returning, even on error.
    ///
    /// Returns the announced counts of the remote source nodes.
    ///
    /// # Errors
    /// `CommPost` if posting fails; `CommError` if a count is missing,
    /// malformed or disagrees with the local plan.
    pub fn exchange_counts<C: Communicator>(
        &self,
        comm: &C,
        tag: CommTag,
    ) -> Result<BTreeMap<usize, usize>, LayoutError> {
        let peers: Vec<usize> = (0..comm.size()).filter(|&n| n != self.my_node).collect();
        let mut maybe_err = None;

        // 1) post all receives
        let mut pending_recvs = Vec::with_capacity(peers.len());
        for &nbr in &peers {
            let mut cnt = WireCount::new(0);
            match comm.irecv(
                nbr,
                tag.as_u16(),
                cast_slice_mut(std::slice::from_mut(&mut cnt)),
            ) {
                Ok(h) => pending_recvs.push((nbr, h)),
                Err(e) => {
                    maybe_err.get_or_insert(e);
                }
            }
        }

        // 2) post all sends
        let mut pending_sends = Vec::with_capacity(peers.len());
        for &nbr in &peers {
            let count = WireCount::new(self.dst_count(nbr));
            match comm.isend(nbr, tag.as_u16(), cast_slice(std::slice::from_ref(&count))) {
                Ok(h) => pending_sends.push(h),
                Err(e) => {
                    maybe_err.get_or_insert(e);
                }
            }
        }

        // 3) wait for all recvs, check counts (but do not early-return)
        let mut announced = BTreeMap::new();
        for (nbr, h) in pending_recvs {
            let got = h.wait();
            if maybe_err.is_some() {
                continue;
            }
            let res = match got {
                Some(data) => WireCount::decode(&data).map(|c| c.get()),
                None => Err(format!("failed to receive count from rank {nbr}")),
            };
            let expected = self.src_count(nbr);
            match res {
                Ok(0) if expected == 0 => {}
                Ok(n) if n == expected => {
                    announced.insert(nbr, n);
                }
                Ok(n) => {
                    maybe_err = Some(LayoutError::CommError {
                        peer: nbr,
                        reason: format!("rank {nbr} announced {n} sites, plan expects {expected}"),
                    });
                }
                Err(reason) => {
                    maybe_err = Some(LayoutError::CommError { peer: nbr, reason });
                }
            }
        }

        // 4) always drain all send handles before returning
        for send in pending_sends {
            let _ = send.wait();
        }

        match maybe_err {
            Some(err) => Err(err),
            None => Ok(announced),
        }
    }
}

/// Sorted-unique nodes of `per_site` (plus `me`) and how often each occurs.
fn tally(per_site: &[usize], me: usize) -> (Vec<usize>, Vec<usize>) {
    let mut counts: BTreeMap<usize, usize> = per_site.iter().copied().counts().into_iter().collect();
    counts.entry(me).or_insert(0);
    counts.into_iter().unzip()
}

fn lookup(nodes: &[usize], counts: &[usize], node: usize) -> usize {
    nodes
        .binary_search(&node)
        .map(|i| counts[i])
        .unwrap_or(0)
}
