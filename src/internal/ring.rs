//! Source and destination ring state machines.
//!
//! A ring is a power-of-two array of descriptors in DMA-coherent memory,
//! indexed by cursors that wrap with `& mask`. The host produces at
//! `write_index` and consumes completions at `sw_index`; the target's
//! consumption progress is visible through its MMIO read index (cached in
//! `hw_index` for the source ring, observed through descriptor `nbytes`
//! writes for the destination ring).
//!
//! Cursor invariant, modulo ring size:
//!
//! ```text
//!     write_index >= hw_index >= sw_index
//! ```

use alloc::vec;
use alloc::vec::Vec;
use core::ptr::NonNull;

use crate::driver::config::{SEND_FLAG_BYTE_SWAP, SEND_FLAG_GATHER};
use crate::driver::error::{ConfigError, ConfigResult, DmaError, DmaResult, IoError, IoResult};
use crate::driver::transfer::{RecvCompletion, SendCompletion, TransferContext};
use crate::internal::descriptor::{self, CeDesc, flags};
use crate::register::ce::CeRegs;
use crate::hal::{CoherentBuffer, CoherentDma, TargetBus};

/// Descriptor rings must be aligned to this boundary
pub(crate) const DESC_RING_ALIGN: usize = 8;

/// Value the source read index register returns when the device has
/// dropped off the bus.
pub(crate) const READ_INDEX_DEVICE_GONE: u32 = 0xffff_ffff;

// =============================================================================
// Ring Arithmetic
// =============================================================================

/// Number of steps from `from` to `to`, modulo the ring size.
#[inline(always)]
pub(crate) const fn ring_delta(mask: u32, from: u32, to: u32) -> u32 {
    to.wrapping_sub(from) & mask
}

/// Advance a ring index by one, wrapping around.
#[inline(always)]
pub(crate) const fn ring_idx_incr(mask: u32, idx: u32) -> u32 {
    idx.wrapping_add(1) & mask
}

// =============================================================================
// Coherent Descriptor Array
// =============================================================================

/// The DMA-coherent descriptor array backing one ring.
///
/// The platform allocator gives no alignment guarantee, so the region is
/// over-allocated by `DESC_RING_ALIGN - 1` bytes and both the host and bus
/// base addresses are rounded up independently; the original unaligned
/// buffer is kept for the eventual free.
///
/// Descriptors are only ever accessed as volatile whole-descriptor loads
/// and stores: the target reads and writes this memory concurrently.
pub(crate) struct DescRing {
    raw: CoherentBuffer,
    base: NonNull<CeDesc>,
    base_bus: u32,
    nentries: u32,
}

impl DescRing {
    /// Allocate an aligned descriptor array of `nentries` descriptors.
    ///
    /// `zero` clears the whole region before the target ever sees it;
    /// required for destination rings, where a stale non-zero `nbytes`
    /// would read as a completed descriptor.
    pub(crate) fn alloc<A: CoherentDma>(dma: &A, nentries: u32, zero: bool) -> ConfigResult<Self> {
        let len = nentries as usize * CeDesc::SIZE + (DESC_RING_ALIGN - 1);
        let raw = dma.alloc_coherent(len).ok_or(ConfigError::AllocFailed)?;

        if zero {
            // SAFETY: the allocator guarantees `len` writable bytes at `host`.
            unsafe { core::ptr::write_bytes(raw.host().as_ptr(), 0, len) };
        }

        let host = raw.host().as_ptr() as usize;
        let aligned_host = (host + DESC_RING_ALIGN - 1) & !(DESC_RING_ALIGN - 1);
        let align_bus = DESC_RING_ALIGN as u32;
        let base_bus = (raw.bus_addr() + (align_bus - 1)) & !(align_bus - 1);

        // SAFETY: rounding up stays within the over-allocated region and the
        // result of rounding up a non-null address is non-null.
        let base = unsafe { NonNull::new_unchecked(aligned_host as *mut CeDesc) };

        Ok(Self {
            raw,
            base,
            base_bus,
            nentries,
        })
    }

    /// Return the region to the platform allocator.
    pub(crate) fn free<A: CoherentDma>(self, dma: &A) {
        dma.free_coherent(self.raw);
    }

    /// Aligned bus address of descriptor 0 (programmed into the engine).
    #[inline(always)]
    pub(crate) const fn base_bus(&self) -> u32 {
        self.base_bus
    }

    /// Snapshot the descriptor at `idx` in one volatile load.
    #[inline(always)]
    pub(crate) fn desc(&self, idx: u32) -> CeDesc {
        debug_assert!(idx < self.nentries);
        // SAFETY: idx is within the aligned array; the load is volatile
        // because the target writes this memory.
        unsafe { core::ptr::read_volatile(self.base.as_ptr().add(idx as usize)) }
    }

    /// Publish the descriptor at `idx` in one volatile store.
    #[inline(always)]
    pub(crate) fn set_desc(&self, idx: u32, desc: CeDesc) {
        debug_assert!(idx < self.nentries);
        // SAFETY: as in `desc`.
        unsafe { core::ptr::write_volatile(self.base.as_ptr().add(idx as usize), desc) };
    }

    /// Zero the `nbytes` field of the descriptor at `idx`, re-arming it for
    /// the next fill by the target.
    #[inline(always)]
    pub(crate) fn clear_nbytes(&self, idx: u32) {
        debug_assert!(idx < self.nentries);
        // SAFETY: the nbytes halfword lies within the descriptor at idx.
        unsafe {
            let desc = self.base.as_ptr().add(idx as usize) as *mut u8;
            core::ptr::write_volatile(desc.add(CeDesc::NBYTES_OFFSET) as *mut u16, 0u16);
        }
    }
}

// Safety: DescRing owns its region exclusively on the host side; the raw
// pointers move with the value. Concurrent target DMA access is handled by
// volatile accesses, not by Rust aliasing.
unsafe impl Send for DescRing {}

// =============================================================================
// Source Ring
// =============================================================================

/// Host-producer / target-consumer ring for outgoing buffers.
///
/// Descriptors are built in a host-private shadow array first and copied to
/// the coherent slot in a single store; completions are read back from the
/// shadow, never from the (uncached) coherent memory.
pub(crate) struct SourceRing {
    nentries: u32,
    mask: u32,
    /// Next completion the host will harvest
    sw_index: u32,
    /// Next slot the host will populate (mirrored to MMIO on publish)
    write_index: u32,
    /// Cached copy of the target's read index; refreshed lazily
    hw_index: u32,
    ring: DescRing,
    shadow: Vec<CeDesc>,
    per_transfer: Vec<Option<TransferContext>>,
}

impl SourceRing {
    /// Allocate and program a source ring on the engine at `ctrl_addr`.
    ///
    /// The cursors are seeded from the engine's current MMIO indices; the
    /// target side may already have been set up by firmware.
    pub(crate) fn init<B: TargetBus, A: CoherentDma>(
        bus: &B,
        dma: &A,
        ctrl_addr: u32,
        nentries: u32,
        src_sz_max: u16,
        byte_swap: bool,
    ) -> ConfigResult<Self> {
        let nentries = nentries.next_power_of_two();
        let regs = CeRegs::new(bus, ctrl_addr);

        bus.target_access_begin();
        let read_index = regs.src_ring_read_index();
        let write_index = regs.src_ring_write_index();
        bus.target_access_end();

        let ring = DescRing::alloc(dma, nentries, false)?;
        let shadow = vec![CeDesc::empty(); nentries as usize];
        let per_transfer = vec![None; nentries as usize];

        bus.target_access_begin();
        regs.set_src_ring_base_addr(ring.base_bus());
        regs.set_src_ring_size(nentries);
        regs.set_src_ring_dmax(u32::from(src_sz_max));
        regs.set_src_ring_byte_swap(byte_swap);
        regs.set_src_ring_watermarks(0, nentries);
        bus.target_access_end();

        let mask = nentries - 1;
        Ok(Self {
            nentries,
            mask,
            sw_index: read_index & mask,
            write_index: write_index & mask,
            hw_index: read_index & mask,
            ring,
            shadow,
            per_transfer,
        })
    }

    /// Entries in the ring (power of two).
    #[inline(always)]
    pub(crate) const fn nentries(&self) -> u32 {
        self.nentries
    }

    /// Current cursors `(sw, write, hw)`.
    #[inline(always)]
    pub(crate) const fn indices(&self) -> (u32, u32, u32) {
        (self.sw_index, self.write_index, self.hw_index)
    }

    /// Free descriptor slots.
    #[inline(always)]
    pub(crate) const fn free_slots(&self) -> u32 {
        ring_delta(self.mask, self.write_index, self.sw_index.wrapping_sub(1))
    }

    /// Queue one buffer to be sent to an anonymous destination buffer.
    ///
    /// Builds the descriptor in the shadow slot, publishes it to the
    /// coherent slot in one store, and - unless this is a gather
    /// continuation - publishes the new write index to the target,
    /// releasing the whole batch.
    pub(crate) fn send<B: TargetBus>(
        &mut self,
        regs: &CeRegs<'_, B>,
        context: TransferContext,
        buffer: u32,
        nbytes: u16,
        transfer_id: u16,
        send_flags: u32,
    ) -> DmaResult<()> {
        if self.free_slots() == 0 {
            return Err(DmaError::RingFull);
        }

        let mut desc_flags = descriptor::meta_data_set(transfer_id);
        if send_flags & SEND_FLAG_GATHER != 0 {
            desc_flags |= flags::GATHER;
        }
        if send_flags & SEND_FLAG_BYTE_SWAP != 0 {
            desc_flags |= flags::BYTE_SWAP;
        }

        let write_index = self.write_index;
        let desc = CeDesc::new(buffer, nbytes, desc_flags);

        self.shadow[write_index as usize] = desc;
        self.ring.set_desc(write_index, desc);
        self.per_transfer[write_index as usize] = Some(context);

        let write_index = ring_idx_incr(self.mask, write_index);

        // A gather continuation defers the publish so the target wakes once
        // per logical send, when the closing fragment lands.
        if send_flags & SEND_FLAG_GATHER == 0 {
            regs.set_src_ring_write_index(write_index);
        }
        self.write_index = write_index;

        Ok(())
    }

    /// Harvest the next completed send, if any.
    ///
    /// Refreshes the cached hardware read index from MMIO only when the
    /// software index has caught up with the cache. Descriptor fields come
    /// from the shadow.
    pub(crate) fn completed_next<B: TargetBus>(
        &mut self,
        regs: &CeRegs<'_, B>,
    ) -> IoResult<SendCompletion> {
        let sw_index = self.sw_index;

        if self.hw_index == sw_index {
            // The cached hw index may simply be stale; one MMIO read tells
            // us whether the hardware has moved on.
            regs.bus().target_access_begin();
            self.hw_index = regs.src_ring_read_index();
            regs.bus().target_access_end();
        }
        let read_index = self.hw_index;

        if read_index == READ_INDEX_DEVICE_GONE {
            return Err(IoError::DeviceGone);
        }
        if read_index == sw_index {
            return Err(IoError::NotReady);
        }

        let sdesc = self.shadow[sw_index as usize];
        let Some(context) = self.per_transfer[sw_index as usize].take() else {
            return Err(IoError::NotReady);
        };
        self.sw_index = ring_idx_incr(self.mask, sw_index);

        Ok(SendCompletion {
            context,
            buffer: sdesc.addr(),
            nbytes: sdesc.nbytes(),
            transfer_id: descriptor::meta_data_get(sdesc.flags()),
        })
    }

    /// Consume one posted-but-uncompleted entry during shutdown.
    ///
    /// Valid only after target DMA has been halted; no wake bracketing is
    /// taken and no MMIO is touched. `write_index` is deliberately not
    /// rewound - the slot is retired by advancing `sw_index` past it.
    pub(crate) fn cancel_next(&mut self) -> IoResult<SendCompletion> {
        let sw_index = self.sw_index;
        if self.write_index == sw_index {
            return Err(IoError::NotReady);
        }

        let desc = self.ring.desc(sw_index);
        let Some(context) = self.per_transfer[sw_index as usize].take() else {
            return Err(IoError::NotReady);
        };
        self.sw_index = ring_idx_incr(self.mask, sw_index);

        Ok(SendCompletion {
            context,
            buffer: desc.addr(),
            nbytes: desc.nbytes(),
            transfer_id: descriptor::meta_data_get(desc.flags()),
        })
    }

    /// Context slot at `idx` (test introspection).
    #[cfg(test)]
    pub(crate) fn context_at(&self, idx: u32) -> Option<TransferContext> {
        self.per_transfer[idx as usize]
    }

    /// Release the coherent region; host-private state drops with `self`.
    pub(crate) fn free<A: CoherentDma>(self, dma: &A) {
        self.ring.free(dma);
    }
}

// =============================================================================
// Destination Ring
// =============================================================================

/// Host-posts-empties / target-fills-them ring for inbound buffers.
///
/// There is no shadow on this side: completion is detected from the
/// target's `nbytes` write in the coherent descriptor itself, which is why
/// a zero `nbytes` gates the harvest even after the target's read index has
/// moved past the slot.
pub(crate) struct DestRing {
    nentries: u32,
    mask: u32,
    /// Next completion the host will harvest
    sw_index: u32,
    /// Next slot the host will populate (mirrored to MMIO on publish)
    write_index: u32,
    ring: DescRing,
    per_transfer: Vec<Option<TransferContext>>,
}

impl DestRing {
    /// Allocate and program a destination ring on the engine at `ctrl_addr`.
    pub(crate) fn init<B: TargetBus, A: CoherentDma>(
        bus: &B,
        dma: &A,
        ctrl_addr: u32,
        nentries: u32,
        byte_swap: bool,
    ) -> ConfigResult<Self> {
        let nentries = nentries.next_power_of_two();
        let regs = CeRegs::new(bus, ctrl_addr);

        bus.target_access_begin();
        let read_index = regs.dest_ring_read_index();
        let write_index = regs.dest_ring_write_index();
        bus.target_access_end();

        // Zeroed so no stale nbytes reads as a completion before the target
        // has written anything.
        let ring = DescRing::alloc(dma, nentries, true)?;
        let per_transfer = vec![None; nentries as usize];

        bus.target_access_begin();
        regs.set_dest_ring_base_addr(ring.base_bus());
        regs.set_dest_ring_size(nentries);
        regs.set_dest_ring_byte_swap(byte_swap);
        regs.set_dest_ring_watermarks(0, nentries);
        bus.target_access_end();

        let mask = nentries - 1;
        Ok(Self {
            nentries,
            mask,
            sw_index: read_index & mask,
            write_index: write_index & mask,
            ring,
            per_transfer,
        })
    }

    /// Entries in the ring (power of two).
    #[inline(always)]
    pub(crate) const fn nentries(&self) -> u32 {
        self.nentries
    }

    /// Current cursors `(sw, write)`.
    #[inline(always)]
    pub(crate) const fn indices(&self) -> (u32, u32) {
        (self.sw_index, self.write_index)
    }

    /// Make an empty buffer available to the target.
    ///
    /// The descriptor is published with `nbytes = 0`; the target's fill
    /// makes it non-zero. The write index is published immediately - there
    /// is no batching on the receive side.
    pub(crate) fn enqueue<B: TargetBus>(
        &mut self,
        regs: &CeRegs<'_, B>,
        context: TransferContext,
        buffer: u32,
    ) -> DmaResult<()> {
        let write_index = self.write_index;
        if ring_delta(self.mask, write_index, self.sw_index.wrapping_sub(1)) == 0 {
            return Err(DmaError::RingFull);
        }

        self.ring.set_desc(write_index, CeDesc::new(buffer, 0, 0));
        self.per_transfer[write_index as usize] = Some(context);

        let write_index = ring_idx_incr(self.mask, write_index);
        regs.set_dest_ring_write_index(write_index);
        self.write_index = write_index;

        Ok(())
    }

    /// Harvest the next filled buffer, if any.
    ///
    /// The descriptor is snapshot in one volatile load. A zero `nbytes`
    /// means the target's index update outran its descriptor write; the
    /// slot is treated as not yet done and nothing is consumed.
    pub(crate) fn completed_next(&mut self) -> IoResult<RecvCompletion> {
        let sw_index = self.sw_index;
        let sdesc = self.ring.desc(sw_index);

        let nbytes = sdesc.nbytes();
        if nbytes == 0 {
            return Err(IoError::NotReady);
        }

        let Some(context) = self.per_transfer[sw_index as usize].take() else {
            return Err(IoError::NotReady);
        };

        // Re-arm the slot for its next time around the ring.
        self.ring.clear_nbytes(sw_index);
        self.sw_index = ring_idx_incr(self.mask, sw_index);

        let desc_flags = sdesc.flags();
        Ok(RecvCompletion {
            context,
            buffer: sdesc.addr(),
            nbytes,
            transfer_id: descriptor::meta_data_get(desc_flags),
            swapped: desc_flags & flags::BYTE_SWAP != 0,
        })
    }

    /// Take back the next posted-but-unfilled buffer during shutdown.
    ///
    /// Valid only after target DMA has been halted; no wake bracketing is
    /// taken and no MMIO is touched.
    pub(crate) fn revoke_next(&mut self) -> IoResult<(TransferContext, u32)> {
        let sw_index = self.sw_index;
        if self.write_index == sw_index {
            return Err(IoError::NotReady);
        }

        let desc = self.ring.desc(sw_index);
        let Some(context) = self.per_transfer[sw_index as usize].take() else {
            return Err(IoError::NotReady);
        };
        self.sw_index = ring_idx_incr(self.mask, sw_index);

        Ok((context, desc.addr()))
    }

    /// Context slot at `idx` (test introspection).
    #[cfg(test)]
    pub(crate) fn context_at(&self, idx: u32) -> Option<TransferContext> {
        self.per_transfer[idx as usize]
    }

    /// Release the coherent region; host-private state drops with `self`.
    pub(crate) fn free<A: CoherentDma>(self, dma: &A) {
        self.ring.free(dma);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::transfer::TransferToken;
    use crate::register::ce::{
        CURRENT_SRRI_ADDRESS, DST_WR_INDEX_ADDRESS, SR_WR_INDEX_ADDRESS,
    };
    use crate::testing::{MockBus, MockDmaPool};

    const CTRL: u32 = 0x5_7400;

    fn token(v: usize) -> TransferContext {
        TransferContext::Token(TransferToken(v))
    }

    // =========================================================================
    // Ring Arithmetic
    // =========================================================================

    #[test]
    fn ring_delta_wraps() {
        assert_eq!(ring_delta(3, 0, 0), 0);
        assert_eq!(ring_delta(3, 3, 0), 1);
        assert_eq!(ring_delta(3, 1, 3), 2);
        assert_eq!(ring_delta(7, 6, 2), 4);
    }

    #[test]
    fn ring_idx_incr_wraps() {
        assert_eq!(ring_idx_incr(3, 0), 1);
        assert_eq!(ring_idx_incr(3, 3), 0);
        assert_eq!(ring_idx_incr(7, 7), 0);
    }

    #[test]
    fn occupancy_never_exceeds_capacity() {
        // (write - sw) & mask stays <= nentries - 1 across a long run of
        // posts and harvests.
        let mask = 7u32;
        let mut write = 0u32;
        let mut sw = 0u32;
        for step in 0..100u32 {
            if step % 3 != 2 && ring_delta(mask, write, sw.wrapping_sub(1)) > 0 {
                write = ring_idx_incr(mask, write);
            } else if write != sw {
                sw = ring_idx_incr(mask, sw);
            }
            assert!(ring_delta(mask, sw, write) <= mask);
        }
    }

    // =========================================================================
    // DescRing
    // =========================================================================

    #[test]
    fn desc_ring_is_aligned_from_misaligned_region() {
        let dma = MockDmaPool::with_misalignment();
        let ring = DescRing::alloc(&dma, 4, false).unwrap();

        assert_eq!(ring.base.as_ptr() as usize % DESC_RING_ALIGN, 0);
        assert_eq!(ring.base_bus() as usize % DESC_RING_ALIGN, 0);

        ring.free(&dma);
        assert_eq!(dma.live_allocations(), 0);
    }

    #[test]
    fn desc_ring_set_and_read_back() {
        let dma = MockDmaPool::new();
        let ring = DescRing::alloc(&dma, 4, false).unwrap();

        let desc = CeDesc::new(0x1000, 64, descriptor::meta_data_set(7));
        ring.set_desc(2, desc);
        assert_eq!(ring.desc(2), desc);

        ring.clear_nbytes(2);
        assert_eq!(ring.desc(2).nbytes(), 0);
        assert_eq!(ring.desc(2).addr(), 0x1000);

        ring.free(&dma);
    }

    #[test]
    fn desc_ring_zeroed_when_requested() {
        let dma = MockDmaPool::new();
        let ring = DescRing::alloc(&dma, 4, true).unwrap();

        for idx in 0..4 {
            assert_eq!(ring.desc(idx), CeDesc::empty());
        }

        ring.free(&dma);
    }

    // =========================================================================
    // SourceRing
    // =========================================================================

    fn src_ring(bus: &MockBus, dma: &MockDmaPool, nentries: u32) -> SourceRing {
        SourceRing::init(bus, dma, CTRL, nentries, 1500, false).unwrap()
    }

    #[test]
    fn source_init_rounds_to_power_of_two() {
        let bus = MockBus::new();
        let dma = MockDmaPool::new();
        let ring = SourceRing::init(&bus, &dma, CTRL, 5, 1500, false).unwrap();

        assert_eq!(ring.nentries(), 8);
        ring.free(&dma);
    }

    #[test]
    fn source_init_seeds_indices_from_mmio() {
        let bus = MockBus::new();
        bus.set_register(CTRL + CURRENT_SRRI_ADDRESS, 3);
        bus.set_register(CTRL + SR_WR_INDEX_ADDRESS, 3);
        let dma = MockDmaPool::new();

        let ring = src_ring(&bus, &dma, 8);
        assert_eq!(ring.indices(), (3, 3, 3));
        ring.free(&dma);
    }

    #[test]
    fn send_publishes_write_index() {
        let bus = MockBus::new();
        let dma = MockDmaPool::new();
        let mut ring = src_ring(&bus, &dma, 4);

        let regs = CeRegs::new(&bus, CTRL);
        ring.send(&regs, token(0xa), 0x1000, 64, 7, 0).unwrap();

        assert_eq!(ring.indices(), (0, 1, 0));
        assert_eq!(bus.writes_to(CTRL + SR_WR_INDEX_ADDRESS), alloc::vec![1]);
        assert_eq!(ring.context_at(0), Some(token(0xa)));
        ring.free(&dma);
    }

    #[test]
    fn gather_send_defers_publish() {
        let bus = MockBus::new();
        let dma = MockDmaPool::new();
        let mut ring = src_ring(&bus, &dma, 4);
        let regs = CeRegs::new(&bus, CTRL);

        ring.send(&regs, TransferContext::SendlistItem, 0x1000, 64, 7, SEND_FLAG_GATHER)
            .unwrap();
        assert!(bus.writes_to(CTRL + SR_WR_INDEX_ADDRESS).is_empty());

        ring.send(&regs, token(0xc), 0x2000, 32, 7, 0).unwrap();
        assert_eq!(bus.writes_to(CTRL + SR_WR_INDEX_ADDRESS), alloc::vec![2]);
        ring.free(&dma);
    }

    #[test]
    fn send_full_ring_is_rejected() {
        let bus = MockBus::new();
        let dma = MockDmaPool::new();
        let mut ring = src_ring(&bus, &dma, 2);
        let regs = CeRegs::new(&bus, CTRL);

        // nentries = 2, usable capacity = 1
        ring.send(&regs, token(1), 0x1000, 64, 0, 0).unwrap();
        assert_eq!(
            ring.send(&regs, token(2), 0x2000, 64, 0, 0),
            Err(DmaError::RingFull)
        );
        assert_eq!(ring.indices().1, 1);
        ring.free(&dma);
    }

    #[test]
    fn send_sets_gather_and_swap_descriptor_flags() {
        let bus = MockBus::new();
        let dma = MockDmaPool::new();
        let mut ring = src_ring(&bus, &dma, 4);
        let regs = CeRegs::new(&bus, CTRL);

        ring.send(
            &regs,
            token(1),
            0x1000,
            64,
            5,
            SEND_FLAG_GATHER | SEND_FLAG_BYTE_SWAP,
        )
        .unwrap();

        let desc = ring.shadow[0];
        assert_ne!(desc.flags() & flags::GATHER, 0);
        assert_ne!(desc.flags() & flags::BYTE_SWAP, 0);
        assert_eq!(descriptor::meta_data_get(desc.flags()), 5);
        // Shadow and coherent copies are identical.
        assert_eq!(ring.ring.desc(0), desc);
        ring.free(&dma);
    }

    #[test]
    fn completed_refreshes_hw_index_lazily() {
        let bus = MockBus::new();
        let dma = MockDmaPool::new();
        let mut ring = src_ring(&bus, &dma, 4);
        let regs = CeRegs::new(&bus, CTRL);

        ring.send(&regs, token(0xa), 0x1000, 64, 7, 0).unwrap();
        assert_eq!(ring.completed_next(&regs), Err(IoError::NotReady));

        // Target consumes the descriptor.
        bus.set_register(CTRL + CURRENT_SRRI_ADDRESS, 1);
        let done = ring.completed_next(&regs).unwrap();
        assert_eq!(done.context, token(0xa));
        assert_eq!(done.buffer, 0x1000);
        assert_eq!(done.nbytes, 64);
        assert_eq!(done.transfer_id, 7);
        assert_eq!(ring.indices().0, 1);
        assert_eq!(ring.context_at(0), None);
        ring.free(&dma);
    }

    #[test]
    fn completed_reports_device_gone() {
        let bus = MockBus::new();
        let dma = MockDmaPool::new();
        let mut ring = src_ring(&bus, &dma, 4);
        let regs = CeRegs::new(&bus, CTRL);

        ring.send(&regs, token(1), 0x1000, 64, 0, 0).unwrap();
        bus.set_register(CTRL + CURRENT_SRRI_ADDRESS, READ_INDEX_DEVICE_GONE);

        assert_eq!(ring.completed_next(&regs), Err(IoError::DeviceGone));
        assert_eq!(ring.indices().0, 0);
        ring.free(&dma);
    }

    #[test]
    fn hw_index_stays_between_sw_and_write() {
        let bus = MockBus::new();
        let dma = MockDmaPool::new();
        let mut ring = src_ring(&bus, &dma, 4);
        let regs = CeRegs::new(&bus, CTRL);

        for i in 0..3u32 {
            ring.send(&regs, token(i as usize), 0x1000 + i * 0x100, 64, 0, 0)
                .unwrap();
        }
        bus.set_register(CTRL + CURRENT_SRRI_ADDRESS, 2);
        ring.completed_next(&regs).unwrap();

        let (sw, write, hw) = ring.indices();
        let mask = ring.mask;
        assert!(ring_delta(mask, sw, hw) <= ring_delta(mask, sw, write));
        ring.free(&dma);
    }

    #[test]
    fn cancel_drains_unissued_entries() {
        let bus = MockBus::new();
        let dma = MockDmaPool::new();
        let mut ring = src_ring(&bus, &dma, 4);
        let regs = CeRegs::new(&bus, CTRL);

        ring.send(&regs, token(1), 0x1000, 64, 3, 0).unwrap();
        ring.send(&regs, token(2), 0x2000, 32, 3, 0).unwrap();
        bus.clear_writes();

        let first = ring.cancel_next().unwrap();
        assert_eq!(first.context, token(1));
        assert_eq!(first.buffer, 0x1000);
        let second = ring.cancel_next().unwrap();
        assert_eq!(second.context, token(2));
        assert_eq!(ring.cancel_next(), Err(IoError::NotReady));

        // write_index is not rewound and no MMIO was touched.
        assert_eq!(ring.indices().1, 2);
        assert!(bus.writes().is_empty());
        ring.free(&dma);
    }

    // =========================================================================
    // DestRing
    // =========================================================================

    fn dest_ring(bus: &MockBus, dma: &MockDmaPool, nentries: u32) -> DestRing {
        DestRing::init(bus, dma, CTRL, nentries, false).unwrap()
    }

    #[test]
    fn enqueue_publishes_immediately() {
        let bus = MockBus::new();
        let dma = MockDmaPool::new();
        let mut ring = dest_ring(&bus, &dma, 4);
        let regs = CeRegs::new(&bus, CTRL);

        ring.enqueue(&regs, token(0xb), 0x2000).unwrap();

        assert_eq!(bus.writes_to(CTRL + DST_WR_INDEX_ADDRESS), alloc::vec![1]);
        let desc = ring.ring.desc(0);
        assert_eq!(desc.addr(), 0x2000);
        assert_eq!(desc.nbytes(), 0);
        ring.free(&dma);
    }

    #[test]
    fn enqueue_full_ring_is_rejected() {
        let bus = MockBus::new();
        let dma = MockDmaPool::new();
        let mut ring = dest_ring(&bus, &dma, 2);
        let regs = CeRegs::new(&bus, CTRL);

        ring.enqueue(&regs, token(1), 0x2000).unwrap();
        assert_eq!(ring.enqueue(&regs, token(2), 0x3000), Err(DmaError::RingFull));
        ring.free(&dma);
    }

    #[test]
    fn completed_gated_on_nbytes() {
        let bus = MockBus::new();
        let dma = MockDmaPool::new();
        let mut ring = dest_ring(&bus, &dma, 4);
        let regs = CeRegs::new(&bus, CTRL);

        ring.enqueue(&regs, token(0xb), 0x2000).unwrap();

        // Posted but unfilled: not ready, sw untouched.
        assert_eq!(ring.completed_next(), Err(IoError::NotReady));
        assert_eq!(ring.indices().0, 0);

        // Target fills the descriptor.
        ring.ring.set_desc(
            0,
            CeDesc::new(0x2000, 100, descriptor::meta_data_set(8) | flags::BYTE_SWAP),
        );
        let done = ring.completed_next().unwrap();
        assert_eq!(done.context, token(0xb));
        assert_eq!(done.buffer, 0x2000);
        assert_eq!(done.nbytes, 100);
        assert_eq!(done.transfer_id, 8);
        assert!(done.swapped);
        assert_eq!(ring.indices().0, 1);

        // Harvest re-armed the slot.
        assert_eq!(ring.ring.desc(0).nbytes(), 0);
        assert_eq!(ring.context_at(0), None);
        ring.free(&dma);
    }

    #[test]
    fn revoke_returns_posted_buffers() {
        let bus = MockBus::new();
        let dma = MockDmaPool::new();
        let mut ring = dest_ring(&bus, &dma, 4);
        let regs = CeRegs::new(&bus, CTRL);

        ring.enqueue(&regs, token(5), 0x2000).unwrap();
        ring.enqueue(&regs, token(6), 0x3000).unwrap();

        assert_eq!(ring.revoke_next().unwrap(), (token(5), 0x2000));
        assert_eq!(ring.revoke_next().unwrap(), (token(6), 0x3000));
        assert_eq!(ring.revoke_next(), Err(IoError::NotReady));
        ring.free(&dma);
    }
}
