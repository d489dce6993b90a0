//! Per-engine state record.
//!
//! One [`Engine`] per hardware copy engine: configuration, the optional
//! ring pair, and the registered completion callbacks. Engines live inside
//! the device registry; every method here runs with the device lock already
//! held.

use crate::driver::config::{EngineConfig, EngineState, SEND_FLAG_GATHER};
use crate::driver::device::{EngineId, RecvCallback, SendCallback};
use crate::driver::error::{DmaError, Error, IoError, IoResult, Result};
use crate::driver::sendlist::SendList;
use crate::driver::transfer::{RecvCompletion, SendCompletion, TransferContext};
use crate::hal::{CoherentDma, TargetBus};
use crate::internal::ring::{DestRing, SourceRing};
use crate::register::ce::CeRegs;

#[cfg(feature = "log")]
use log::warn;

/// State of one copy engine.
pub(crate) struct Engine<B: TargetBus, A: CoherentDma> {
    pub(crate) id: EngineId,
    pub(crate) state: EngineState,
    pub(crate) attr_flags: u32,
    pub(crate) src_sz_max: u16,
    /// MMIO control base of this engine's register block
    pub(crate) ctrl_addr: u32,
    pub(crate) src_ring: Option<SourceRing>,
    pub(crate) dest_ring: Option<DestRing>,
    pub(crate) send_cb: Option<SendCallback<B, A>>,
    pub(crate) recv_cb: Option<RecvCallback<B, A>>,
}

impl<B: TargetBus, A: CoherentDma> Engine<B, A> {
    /// Create the engine record; rings are attached separately.
    pub(crate) fn new(id: EngineId, ctrl_addr: u32, config: &EngineConfig) -> Self {
        Self {
            id,
            state: EngineState::Running,
            attr_flags: config.flags,
            src_sz_max: config.src_sz_max,
            ctrl_addr,
            src_ring: None,
            dest_ring: None,
            send_cb: None,
            recv_cb: None,
        }
    }

    fn regs<'a>(&self, bus: &'a B) -> CeRegs<'a, B> {
        CeRegs::new(bus, self.ctrl_addr)
    }

    // -------------------------------------------------------------------------
    // Send path
    // -------------------------------------------------------------------------

    /// Queue one buffer on the source ring.
    pub(crate) fn send(
        &mut self,
        bus: &B,
        context: TransferContext,
        buffer: u32,
        nbytes: u16,
        transfer_id: u16,
        send_flags: u32,
    ) -> Result<()> {
        if nbytes > self.src_sz_max {
            // Oversized sends are a caller bug; the engine will clip or
            // fault, but the queue operation itself proceeds.
            #[cfg(feature = "log")]
            warn!(
                "ce{}: send of {} bytes exceeds src_sz_max {}",
                self.id.index(),
                nbytes,
                self.src_sz_max
            );
        }

        let regs = self.regs(bus);
        let src_ring = self.src_ring.as_mut().ok_or(IoError::RingUnavailable)?;

        bus.target_access_begin();
        let ret = src_ring.send(&regs, context, buffer, nbytes, transfer_id, send_flags);
        bus.target_access_end();

        ret.map_err(Error::from)
    }

    /// Queue a sendlist as one gathered logical transfer.
    ///
    /// All-or-nothing: if the ring cannot take every fragment the ring is
    /// left untouched. Only the final fragment carries the caller context
    /// and publishes the write index.
    pub(crate) fn sendlist_send(
        &mut self,
        bus: &B,
        context: TransferContext,
        list: &SendList,
        transfer_id: u16,
    ) -> Result<()> {
        let regs = self.regs(bus);
        let src_ring = self.src_ring.as_mut().ok_or(IoError::RingUnavailable)?;

        let [head @ .., last] = list.items() else {
            return Err(DmaError::EmptySendlist.into());
        };
        if (src_ring.free_slots() as usize) < list.len() {
            return Err(DmaError::InsufficientSpace.into());
        }

        bus.target_access_begin();
        for item in head {
            let ret = src_ring.send(
                &regs,
                TransferContext::SendlistItem,
                item.buffer,
                item.nbytes,
                transfer_id,
                item.flags | SEND_FLAG_GATHER,
            );
            if ret.is_err() {
                // Cannot happen after the capacity check above.
                #[cfg(feature = "log")]
                warn!("ce{}: sendlist fragment rejected", self.id.index());
            }
        }
        let ret = src_ring.send(
            &regs,
            context,
            last.buffer,
            last.nbytes,
            transfer_id,
            last.flags,
        );
        bus.target_access_end();

        ret.map_err(Error::from)
    }

    /// Harvest the next completed send.
    pub(crate) fn completed_send_next(&mut self, bus: &B) -> IoResult<SendCompletion> {
        let regs = CeRegs::new(bus, self.ctrl_addr);
        self.src_ring
            .as_mut()
            .ok_or(IoError::RingUnavailable)?
            .completed_next(&regs)
    }

    /// Shutdown drain of posted-but-uncompleted sends. Target DMA must be
    /// stopped; no wake bracket is taken.
    pub(crate) fn cancel_send_next(&mut self) -> IoResult<SendCompletion> {
        self.src_ring
            .as_mut()
            .ok_or(IoError::RingUnavailable)?
            .cancel_next()
    }

    // -------------------------------------------------------------------------
    // Receive path
    // -------------------------------------------------------------------------

    /// Post an empty buffer on the destination ring.
    pub(crate) fn recv_buf_enqueue(
        &mut self,
        bus: &B,
        context: TransferContext,
        buffer: u32,
    ) -> Result<()> {
        let regs = self.regs(bus);
        let dest_ring = self.dest_ring.as_mut().ok_or(IoError::RingUnavailable)?;

        bus.target_access_begin();
        let ret = dest_ring.enqueue(&regs, context, buffer);
        bus.target_access_end();

        ret.map_err(Error::from)
    }

    /// Harvest the next filled receive buffer.
    pub(crate) fn completed_recv_next(&mut self) -> IoResult<RecvCompletion> {
        self.dest_ring
            .as_mut()
            .ok_or(IoError::RingUnavailable)?
            .completed_next()
    }

    /// Shutdown drain of posted-but-unfilled receive buffers. Target DMA
    /// must be stopped; no wake bracket is taken.
    pub(crate) fn revoke_recv_next(&mut self) -> IoResult<(TransferContext, u32)> {
        self.dest_ring
            .as_mut()
            .ok_or(IoError::RingUnavailable)?
            .revoke_next()
    }

    // -------------------------------------------------------------------------
    // Interrupt bookkeeping
    // -------------------------------------------------------------------------

    /// Recompute the interrupt mask for this engine.
    ///
    /// The copy-complete interrupt is wanted iff a callback is registered
    /// and the caller did not ask for a polled engine. Watermark interrupts
    /// are always masked.
    pub(crate) fn handler_adjust(&self, bus: &B, disable_copy_compl: bool) {
        let regs = self.regs(bus);

        bus.target_access_begin();
        if !disable_copy_compl && (self.send_cb.is_some() || self.recv_cb.is_some()) {
            regs.copy_complete_intr_enable();
        } else {
            regs.copy_complete_intr_disable();
        }
        regs.watermark_intr_disable();
        bus.target_access_end();
    }
}
