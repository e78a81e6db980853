//! Neighbor and point-to-point exchange primitives.
//!
//! [`Channels`] owns the transport, the process grid and one channel slot per
//! lattice dimension. Blocking operations post, wait and release everything
//! before returning. The two-phase [`Channels::send_recv`] / [`Channels::wait`]
//! pair leaves exactly one outstanding operation in a slot; posting into a
//! busy slot or waiting on an idle one is a protocol violation and fails with
//! `ChannelBusy` / `ChannelIdle`.
//!
//! Along a dimension with one process the neighbor is this process itself;
//! the exchange then goes through the transport as a loopback.

use crate::comm::communicator::{CommTag, Communicator, Wait};
use crate::geometry::coord::Direction;
use crate::geometry::process_grid::ProcessGrid;
use crate::layout_error::LayoutError;

enum ChannelSlot<S, R> {
    Idle,
    Posted {
        dir: Direction,
        from: usize,
        len: usize,
        send: S,
        recv: R,
    },
}

/// Fixed set of per-dimension neighbor channels over one transport.
pub struct Channels<C: Communicator, const ND: usize> {
    comm: C,
    grid: ProcessGrid<ND>,
    slots: [ChannelSlot<C::SendHandle, C::RecvHandle>; ND],
}

impl<C: Communicator, const ND: usize> Channels<C, ND> {
    pub fn new(comm: C, grid: ProcessGrid<ND>) -> Self {
        Self {
            comm,
            grid,
            slots: std::array::from_fn(|_| ChannelSlot::Idle),
        }
    }

    #[inline]
    pub fn comm(&self) -> &C {
        &self.comm
    }

    #[inline]
    pub fn grid(&self) -> &ProcessGrid<ND> {
        &self.grid
    }

    /// Whether channel `dim` has an outstanding operation.
    pub fn is_posted(&self, dim: usize) -> bool {
        matches!(self.slots.get(dim), Some(ChannelSlot::Posted { .. }))
    }

    fn neighbor_tag(dim: usize, dir: Direction) -> u16 {
        CommTag::NEIGHBOR
            .offset((2 * dim + dir.index()) as u16)
            .as_u16()
    }

    fn check_dim(dim: usize) -> Result<(), LayoutError> {
        if dim >= ND {
            return Err(LayoutError::InvalidDimension { dim, nd: ND });
        }
        Ok(())
    }

    fn finish(data: Option<Vec<u8>>, from: usize, len: usize) -> Result<Vec<u8>, LayoutError> {
        let data = data.ok_or_else(|| LayoutError::CommError {
            peer: from,
            reason: "receive completed without data".into(),
        })?;
        if data.len() != len {
            return Err(LayoutError::CommError {
                peer: from,
                reason: format!("expected {len} bytes, got {}", data.len()),
            });
        }
        Ok(data)
    }

    /// Post the send, then the receive. If the receive cannot be posted the
    /// send is completed before the error is returned, so no request is
    /// left outstanding.
    fn post_pair(
        &self,
        to: usize,
        from: usize,
        tag: u16,
        send: &[u8],
        recv: &mut [u8],
    ) -> Result<(C::SendHandle, C::RecvHandle), LayoutError> {
        let sh = self.comm.isend(to, tag, send)?;
        match self.comm.irecv(from, tag, recv) {
            Ok(rh) => Ok((sh, rh)),
            Err(e) => {
                let _ = sh.wait();
                Err(e)
            }
        }
    }

    /// Send `send` to the neighbor one step along `dim` in direction `dir`
    /// and receive `recv.len()` bytes from the neighbor on the opposite side.
    /// Blocks until both complete.
    ///
    /// # Errors
    /// `InvalidDimension`, `BufferMismatch` if the buffers differ in length,
    /// `CommPost` if posting fails, `CommError` if the receive comes up short.
    pub fn send_recv_wait(
        &self,
        send: &[u8],
        recv: &mut [u8],
        dir: Direction,
        dim: usize,
    ) -> Result<(), LayoutError> {
        Self::check_dim(dim)?;
        if send.len() != recv.len() {
            return Err(LayoutError::BufferMismatch {
                expected: send.len(),
                got: recv.len(),
            });
        }
        log::trace!("starting a sendRecvWait, count={} dir={dir:?} dim={dim}", send.len());
        let to = self.grid.neighbor_rank(dim, dir)?;
        let from = self.grid.neighbor_rank(dim, dir.reverse())?;
        let tag = Self::neighbor_tag(dim, dir);

        let (sh, rh) = self.post_pair(to, from, tag, send, recv)?;
        let _ = sh.wait();
        let data = Self::finish(rh.wait(), from, recv.len())?;
        recv.copy_from_slice(&data);
        log::trace!("finished a sendRecvWait");
        Ok(())
    }

    /// Post a combined send/receive on channel `dim` and return immediately.
    ///
    /// The matching [`wait`](Self::wait) returns the `recv_len` received bytes.
    ///
    /// # Errors
    /// `InvalidDimension`, `ChannelBusy` if `dim` already has an outstanding
    /// operation, `BufferMismatch` if `recv_len != send.len()`, `CommPost` if
    /// posting fails.
    pub fn send_recv(
        &mut self,
        send: &[u8],
        recv_len: usize,
        dir: Direction,
        dim: usize,
    ) -> Result<(), LayoutError> {
        Self::check_dim(dim)?;
        if self.is_posted(dim) {
            return Err(LayoutError::ChannelBusy { dim });
        }
        if send.len() != recv_len {
            return Err(LayoutError::BufferMismatch {
                expected: send.len(),
                got: recv_len,
            });
        }
        log::trace!("starting a sendRecv, count={} dir={dir:?} dim={dim}", send.len());
        let to = self.grid.neighbor_rank(dim, dir)?;
        let from = self.grid.neighbor_rank(dim, dir.reverse())?;
        let tag = Self::neighbor_tag(dim, dir);

        let mut scratch = vec![0u8; recv_len];
        let (send, recv) = self.post_pair(to, from, tag, send, &mut scratch)?;
        self.slots[dim] = ChannelSlot::Posted {
            dir,
            from,
            len: recv_len,
            send,
            recv,
        };
        Ok(())
    }

    /// Block until the operation outstanding on channel `dim` completes and
    /// return the received bytes. The slot is idle afterwards.
    ///
    /// # Errors
    /// `InvalidDimension`, `ChannelIdle` if nothing was posted, `CommError`
    /// if the receive comes up short.
    pub fn wait(&mut self, dim: usize) -> Result<Vec<u8>, LayoutError> {
        Self::check_dim(dim)?;
        match std::mem::replace(&mut self.slots[dim], ChannelSlot::Idle) {
            ChannelSlot::Idle => Err(LayoutError::ChannelIdle { dim }),
            ChannelSlot::Posted {
                dir,
                from,
                len,
                send,
                recv,
            } => {
                log::trace!("starting a wait, dir={dir:?} dim={dim}");
                let _ = send.wait();
                Self::finish(recv.wait(), from, len)
            }
        }
    }

    /// Send `send` to `dest` and block until it completes.
    pub fn send_to_wait(&self, send: &[u8], dest: usize) -> Result<(), LayoutError> {
        log::trace!("starting a sendToWait, count={} destnode={dest}", send.len());
        let _ = self.comm.isend(dest, CommTag::POINT.as_u16(), send)?.wait();
        Ok(())
    }

    /// Receive `recv.len()` bytes from `src`, blocking until they arrive.
    pub fn recv_from_wait(&self, recv: &mut [u8], src: usize) -> Result<(), LayoutError> {
        log::trace!("starting a recvFromWait, count={} srcenode={src}", recv.len());
        let h = self.comm.irecv(src, CommTag::POINT.as_u16(), recv)?;
        let data = Self::finish(h.wait(), src, recv.len())?;
        recv.copy_from_slice(&data);
        Ok(())
    }
}
