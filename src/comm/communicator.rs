//! Thin façade over the message-passing transport.
//!
//! Messages are *contiguous byte slices* (no zero-copy guarantees).
//! Posting is fallible; every posted handle is **waitable** and must be
//! waited on before its channel or buffer is reused. [`Wait::wait`] returns the
//! received bytes, and callers copy them into their own buffers.
//!
//! Two backends are provided:
//! - [`LocalComm`]: an in-process mailbox. One communicator is a serial run;
//!   [`LocalComm::universe`] hands out `n` ranks that can be driven from `n`
//!   threads to simulate a distributed run.
//! - `MpiComm` (feature `mpi-support`): the `mpi` crate's world communicator.

use crate::geometry::process_grid::ProcessGrid;
use crate::layout_error::LayoutError;
use bytes::Bytes;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Typed message tag. Each subsystem owns a disjoint tag range.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct CommTag(pub u16);

impl CommTag {
    /// Neighbor channels: `NEIGHBOR + 2 * dim + dir.index()`.
    pub const NEIGHBOR: CommTag = CommTag(0x2000);
    /// Blocking point-to-point exchange.
    pub const POINT: CommTag = CommTag(0x3000);
    /// General-map count exchange.
    pub const MAP_COUNTS: CommTag = CommTag(0x4000);

    #[inline]
    pub const fn base(self) -> u16 {
        self.0
    }

    #[inline]
    pub const fn offset(self, k: u16) -> CommTag {
        CommTag(self.0 + k)
    }

    #[inline]
    pub const fn as_u16(self) -> u16 {
        self.0
    }
}

/// Point-to-point transport between the processes of one run.
pub trait Communicator {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    /// Rank of this process.
    fn rank(&self) -> usize;
    /// Number of processes.
    fn size(&self) -> usize;

    /// Whether the transport is up and may be used.
    fn is_initialized(&self) -> bool {
        true
    }

    /// Post a send of `buf` to `peer`.
    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Result<Self::SendHandle, LayoutError>;
    /// Post a receive of `buf.len()` bytes from `peer`.
    fn irecv(
        &self,
        peer: usize,
        tag: u16,
        buf: &mut [u8],
    ) -> Result<Self::RecvHandle, LayoutError>;

    /// Lay this transport's processes over a lattice of shape `extent`.
    fn layout_grid<const ND: usize>(
        &self,
        extent: &[usize; ND],
        requested: Option<&[usize]>,
    ) -> Result<ProcessGrid<ND>, LayoutError> {
        ProcessGrid::new(extent, self.size(), self.rank(), requested)
    }

    /// Terminate the whole process group.
    fn abort(&self, code: i32) -> ! {
        std::process::exit(code)
    }
}

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;
}

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

// --- LocalComm: in-process mailbox ---
type Key = (usize, usize, u16); // (src, dst, tag)

#[derive(Debug, Default)]
struct Mailbox {
    slots: DashMap<Key, VecDeque<Bytes>>,
    finalized: AtomicBool,
}

/// In-process transport: every rank of a universe shares one mailbox.
///
/// Messages on one `(src, dst, tag)` key are delivered in post order.
#[derive(Clone, Debug)]
pub struct LocalComm {
    rank: usize,
    size: usize,
    mailbox: Arc<Mailbox>,
}

impl LocalComm {
    /// A single-rank communicator.
    pub fn serial() -> Self {
        Self {
            rank: 0,
            size: 1,
            mailbox: Arc::new(Mailbox::default()),
        }
    }

    /// `size` ranks sharing one mailbox, indexed by rank.
    pub fn universe(size: usize) -> Vec<Self> {
        let mailbox = Arc::new(Mailbox::default());
        (0..size)
            .map(|rank| Self {
                rank,
                size,
                mailbox: mailbox.clone(),
            })
            .collect()
    }

    /// Shut the transport down for every rank of the universe.
    pub fn finalize(&self) {
        self.mailbox.finalized.store(true, Ordering::Release);
    }

    fn check_peer(&self, peer: usize) -> Result<(), LayoutError> {
        if !self.is_initialized() {
            return Err(LayoutError::CommPost {
                peer,
                reason: "transport finalized".into(),
            });
        }
        if peer >= self.size {
            return Err(LayoutError::CommPost {
                peer,
                reason: format!("rank out of range (size {})", self.size),
            });
        }
        Ok(())
    }
}

/// Pending receive on a [`LocalComm`] mailbox.
pub struct LocalHandle {
    key: Key,
    len: usize,
    mailbox: Arc<Mailbox>,
}

impl Wait for LocalHandle {
    fn wait(self) -> Option<Vec<u8>> {
        loop {
            if let Some(mut queue) = self.mailbox.slots.get_mut(&self.key) {
                if let Some(bytes) = queue.pop_front() {
                    // Delivered whole; the caller rejects a size mismatch.
                    if bytes.len() != self.len {
                        log::debug!(
                            "message {:?} carries {} bytes, receive posted for {}",
                            self.key,
                            bytes.len(),
                            self.len
                        );
                    }
                    return Some(bytes.to_vec());
                }
            }
            if self.mailbox.finalized.load(Ordering::Acquire) {
                return None;
            }
            std::thread::yield_now();
        }
    }
}

impl Communicator for LocalComm {
    type SendHandle = ();
    type RecvHandle = LocalHandle;

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn is_initialized(&self) -> bool {
        !self.mailbox.finalized.load(Ordering::Acquire)
    }

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Result<(), LayoutError> {
        self.check_peer(peer)?;
        self.mailbox
            .slots
            .entry((self.rank, peer, tag))
            .or_default()
            .push_back(Bytes::copy_from_slice(buf));
        Ok(())
    }

    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Result<LocalHandle, LayoutError> {
        self.check_peer(peer)?;
        Ok(LocalHandle {
            key: (peer, self.rank, tag),
            len: buf.len(),
            mailbox: self.mailbox.clone(),
        })
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::*;
    use mpi::environment::Universe;
    use mpi::request::{Request, StaticScope};
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::{Communicator as _, Destination, Source};

    pub struct MpiComm {
        _universe: Universe,
        pub world: SimpleCommunicator,
        pub rank: usize,
        pub size: usize,
    }

    impl MpiComm {
        /// Initialize MPI and wrap the world communicator.
        pub fn new() -> Result<Self, LayoutError> {
            let universe = mpi::initialize().ok_or(LayoutError::TransportUninitialized)?;
            let world = universe.world();
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Ok(Self {
                _universe: universe,
                world,
                rank,
                size,
            })
        }
    }

    /// Outstanding MPI request plus the heap buffer it reads or fills.
    pub enum MpiHandle {
        Send {
            req: Request<'static, [u8], StaticScope>,
            data: *mut [u8],
        },
        Recv {
            req: Request<'static, [u8], StaticScope>,
            data: *mut [u8],
        },
    }

    impl Wait for MpiHandle {
        fn wait(self) -> Option<Vec<u8>> {
            match self {
                MpiHandle::Send { req, data } => {
                    req.wait();
                    // SAFETY: `data` came from `Box::leak` in `isend` and the
                    // request that borrowed it has completed.
                    drop(unsafe { Box::from_raw(data) });
                    None
                }
                MpiHandle::Recv { req, data } => {
                    req.wait();
                    // SAFETY: as above, leaked in `irecv`, request completed.
                    let bytes = unsafe { Box::from_raw(data) };
                    Some(bytes.into_vec())
                }
            }
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = MpiHandle;
        type RecvHandle = MpiHandle;

        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.size
        }

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Result<MpiHandle, LayoutError> {
            if peer >= self.size {
                return Err(LayoutError::CommPost {
                    peer,
                    reason: "rank out of range".into(),
                });
            }
            let data: &'static mut [u8] = Box::leak(buf.to_vec().into_boxed_slice());
            let ptr: *mut [u8] = data;
            // SAFETY: the leaked buffer outlives the request; reclaimed in `wait`.
            let data: &'static [u8] = unsafe { &*ptr };
            let req = self
                .world
                .process_at_rank(peer as i32)
                .immediate_send_with_tag(StaticScope, data, tag as i32);
            Ok(MpiHandle::Send { req, data: ptr })
        }

        fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Result<MpiHandle, LayoutError> {
            if peer >= self.size {
                return Err(LayoutError::CommPost {
                    peer,
                    reason: "rank out of range".into(),
                });
            }
            let data: &'static mut [u8] = Box::leak(vec![0u8; buf.len()].into_boxed_slice());
            let ptr: *mut [u8] = data;
            // SAFETY: the request is the only user until `wait` reclaims it.
            let data: &'static mut [u8] = unsafe { &mut *ptr };
            let req = self
                .world
                .process_at_rank(peer as i32)
                .immediate_receive_into_with_tag(StaticScope, data, tag as i32);
            Ok(MpiHandle::Recv { req, data: ptr })
        }

        fn abort(&self, code: i32) -> ! {
            self.world.abort(code)
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::{MpiComm, MpiHandle};
