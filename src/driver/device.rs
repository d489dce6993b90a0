//! Device-level Copy Engine facade.
//!
//! A [`CeDevice`] owns the engine registry for one target device: up to
//! [`CE_COUNT_MAX`] engines, the bus and DMA-allocator contracts, and the
//! single per-device lock that serializes every ring manipulation across
//! all engines.
//!
//! # Locking
//!
//! The lock is a `critical-section` mutex, so acquiring it blocks delivery
//! of the device interrupt on the current CPU; the interrupt service
//! routines below take the same lock. The lock is held across a single
//! ring operation at a time and is always released before a registered
//! completion callback runs, so callbacks may re-enter the API (typically
//! to repost a receive buffer).
//!
//! # Shutdown
//!
//! There is no in-flight cancellation. To shut down an engine: halt target
//! DMA externally, drain pending sends with
//! [`cancel_send_next`](CeDevice::cancel_send_next), drain posted receive
//! buffers with [`revoke_recv_next`](CeDevice::revoke_recv_next), then call
//! [`engine_deinit`](CeDevice::engine_deinit).

use core::cell::RefCell;

use critical_section::Mutex;

use crate::driver::config::{EngineConfig, EngineState};
use crate::driver::error::{ConfigError, ConfigResult, Result};
use crate::driver::interrupt::{EngineIntStatus, MiscIntStatus};
use crate::driver::sendlist::SendList;
use crate::driver::transfer::{RecvCompletion, SendCompletion, TransferContext, TransferToken};
use crate::hal::{CoherentDma, TargetBus};
use crate::internal::engine::Engine;
use crate::internal::ring::{DestRing, SourceRing};
use crate::register::ce::{CE_ERROR_MASK, CE_WATERMARK_MASK, CeRegs, HOST_IS_COPY_COMPLETE};
use crate::register::regtable::TargetRegTable;
use crate::register::wrapper;

#[cfg(feature = "log")]
use log::warn;

/// Maximum number of engines one device can carry.
pub const CE_COUNT_MAX: usize = 8;

// =============================================================================
// Engine Handles and Callbacks
// =============================================================================

/// Validated handle to one engine of a device.
///
/// Obtained from [`CeDevice::engine_init`]; all per-engine operations are
/// keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EngineId(u8);

impl EngineId {
    /// Create a handle for `id`, if it is within [`CE_COUNT_MAX`].
    #[must_use]
    pub const fn new(id: usize) -> Option<Self> {
        if id < CE_COUNT_MAX {
            Some(Self(id as u8))
        } else {
            None
        }
    }

    /// The engine's index.
    #[inline(always)]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Callback invoked for each harvested send completion.
///
/// Runs with the device lock released; re-entering the device API from the
/// callback is allowed.
pub type SendCallback<B, A> = fn(&CeDevice<B, A>, EngineId, SendCompletion);

/// Callback invoked for each harvested receive completion.
///
/// Runs with the device lock released; re-entering the device API from the
/// callback is allowed (typically to repost the buffer).
pub type RecvCallback<B, A> = fn(&CeDevice<B, A>, EngineId, RecvCompletion);

// =============================================================================
// Engine Registry
// =============================================================================

struct Registry<B: TargetBus, A: CoherentDma> {
    engines: [Option<Engine<B, A>>; CE_COUNT_MAX],
}

impl<B: TargetBus, A: CoherentDma> Registry<B, A> {
    const fn new() -> Self {
        Self {
            engines: [const { None }; CE_COUNT_MAX],
        }
    }
}

// =============================================================================
// Device
// =============================================================================

/// The Copy Engine block of one target device.
pub struct CeDevice<B: TargetBus, A: CoherentDma> {
    bus: B,
    dma: A,
    regtable: &'static TargetRegTable,
    ce_count: u32,
    inner: Mutex<RefCell<Registry<B, A>>>,
}

impl<B: TargetBus, A: CoherentDma> CeDevice<B, A> {
    /// Create the CE block for a device described by `regtable`.
    pub fn new(bus: B, dma: A, regtable: &'static TargetRegTable) -> Self {
        Self {
            bus,
            dma,
            regtable,
            ce_count: regtable.ce_count.min(CE_COUNT_MAX as u32),
            inner: Mutex::new(RefCell::new(Registry::new())),
        }
    }

    /// The bus contract this device runs on.
    #[inline(always)]
    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Number of engines present on this device.
    #[inline(always)]
    pub fn ce_count(&self) -> u32 {
        self.ce_count
    }

    /// Run `f` on the engine with the device lock held.
    fn with_engine<R>(
        &self,
        id: EngineId,
        f: impl FnOnce(&mut Engine<B, A>) -> R,
    ) -> ConfigResult<R> {
        critical_section::with(|cs| {
            let mut registry = self.inner.borrow_ref_mut(cs);
            let engine = registry.engines[id.index()]
                .as_mut()
                .ok_or(ConfigError::NotInitialized)?;
            debug_assert_eq!(engine.id, id);
            Ok(f(engine))
        })
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Initialize the engine `ce_id` from caller-supplied attributes.
    ///
    /// May be called once to set up both rings, or twice for separate
    /// source- and destination-side initialization; a ring that already
    /// exists with a matching size is left untouched. Ring sizes are
    /// rounded up to the next power of two. The ring cursors are seeded
    /// from the engine's current MMIO indices, so an engine the firmware
    /// already set up is adopted, not reset.
    pub fn engine_init(&self, ce_id: usize, config: &EngineConfig) -> ConfigResult<EngineId> {
        let id = EngineId::new(ce_id).ok_or(ConfigError::InvalidEngineId)?;
        if ce_id as u32 >= self.ce_count {
            return Err(ConfigError::InvalidEngineId);
        }
        let ctrl_addr = self.regtable.ce_base_address(ce_id as u32);

        critical_section::with(|cs| {
            let mut registry = self.inner.borrow_ref_mut(cs);
            if registry.engines[ce_id].is_none() {
                registry.engines[ce_id] = Some(Engine::new(id, ctrl_addr, config));
            }
        });

        if config.src_nentries > 0 {
            self.init_src_ring(id, ctrl_addr, config)?;
        }
        if config.dest_nentries > 0 {
            self.init_dest_ring(id, ctrl_addr, config)?;
        }

        // Error conditions are reported from the start, even on engines
        // that never register a completion callback.
        self.bus.target_access_begin();
        CeRegs::new(&self.bus, ctrl_addr).error_intr_enable();
        self.bus.target_access_end();

        Ok(id)
    }

    fn init_src_ring(
        &self,
        id: EngineId,
        ctrl_addr: u32,
        config: &EngineConfig,
    ) -> ConfigResult<()> {
        let nentries = config.src_nentries.next_power_of_two();
        let existing = critical_section::with(|cs| {
            self.inner.borrow_ref(cs).engines[id.index()]
                .as_ref()
                .and_then(|engine| engine.src_ring.as_ref().map(SourceRing::nentries))
        });
        if let Some(current) = existing {
            return if current == nentries {
                Ok(())
            } else {
                Err(ConfigError::RingSizeMismatch)
            };
        }

        let ring = SourceRing::init(
            &self.bus,
            &self.dma,
            ctrl_addr,
            config.src_nentries,
            config.src_sz_max,
            config.byte_swap_data(),
        )?;

        let leftover = critical_section::with(|cs| {
            let mut registry = self.inner.borrow_ref_mut(cs);
            match registry.engines[id.index()].as_mut() {
                Some(engine) => {
                    engine.src_ring = Some(ring);
                    None
                }
                None => Some(ring),
            }
        });
        if let Some(ring) = leftover {
            ring.free(&self.dma);
            return Err(ConfigError::NotInitialized);
        }
        Ok(())
    }

    fn init_dest_ring(
        &self,
        id: EngineId,
        ctrl_addr: u32,
        config: &EngineConfig,
    ) -> ConfigResult<()> {
        let nentries = config.dest_nentries.next_power_of_two();
        let existing = critical_section::with(|cs| {
            self.inner.borrow_ref(cs).engines[id.index()]
                .as_ref()
                .and_then(|engine| engine.dest_ring.as_ref().map(DestRing::nentries))
        });
        if let Some(current) = existing {
            return if current == nentries {
                Ok(())
            } else {
                Err(ConfigError::RingSizeMismatch)
            };
        }

        let ring = DestRing::init(
            &self.bus,
            &self.dma,
            ctrl_addr,
            config.dest_nentries,
            config.byte_swap_data(),
        )?;

        let leftover = critical_section::with(|cs| {
            let mut registry = self.inner.borrow_ref_mut(cs);
            match registry.engines[id.index()].as_mut() {
                Some(engine) => {
                    engine.dest_ring = Some(ring);
                    None
                }
                None => Some(ring),
            }
        });
        if let Some(ring) = leftover {
            ring.free(&self.dma);
            return Err(ConfigError::NotInitialized);
        }
        Ok(())
    }

    /// Tear an engine down and release its descriptor rings.
    ///
    /// The caller is responsible for having stopped target DMA and drained
    /// the rings first (see the module docs).
    pub fn engine_deinit(&self, id: EngineId) -> ConfigResult<()> {
        let engine = critical_section::with(|cs| {
            self.inner.borrow_ref_mut(cs).engines[id.index()].take()
        });
        let Some(mut engine) = engine else {
            return Err(ConfigError::NotInitialized);
        };

        engine.state = EngineState::Unused;
        if let Some(src_ring) = engine.src_ring.take() {
            src_ring.free(&self.dma);
        }
        if let Some(dest_ring) = engine.dest_ring.take() {
            dest_ring.free(&self.dma);
        }
        Ok(())
    }

    /// Operational state of the engine in slot `id`.
    pub fn engine_state(&self, id: EngineId) -> EngineState {
        critical_section::with(|cs| {
            self.inner.borrow_ref(cs).engines[id.index()]
                .as_ref()
                .map_or(EngineState::Unused, |engine| engine.state)
        })
    }

    // -------------------------------------------------------------------------
    // Send path
    // -------------------------------------------------------------------------

    /// Queue a buffer to be sent to an anonymous destination buffer.
    ///
    /// `transfer_id` (13 bits) is reflected back on completion and to the
    /// destination side. Returns [`DmaError::RingFull`] when no descriptor
    /// slot is free.
    ///
    /// [`DmaError::RingFull`]: crate::driver::error::DmaError::RingFull
    pub fn send(
        &self,
        id: EngineId,
        token: TransferToken,
        buffer: u32,
        nbytes: u16,
        transfer_id: u16,
        flags: u32,
    ) -> Result<()> {
        self.with_engine(id, |engine| {
            engine.send(
                &self.bus,
                TransferContext::Token(token),
                buffer,
                nbytes,
                transfer_id,
                flags,
            )
        })?
    }

    /// Queue a sendlist of buffers to be gathered into a single
    /// destination buffer with a single completion.
    ///
    /// All-or-nothing: when fewer free slots remain than the list has
    /// items, [`DmaError::InsufficientSpace`] is returned and the ring is
    /// untouched. All fragments except the last complete with
    /// [`TransferContext::SendlistItem`]; the last carries `token`.
    ///
    /// [`DmaError::InsufficientSpace`]: crate::driver::error::DmaError::InsufficientSpace
    pub fn sendlist_send(
        &self,
        id: EngineId,
        token: TransferToken,
        list: &SendList,
        transfer_id: u16,
    ) -> Result<()> {
        self.with_engine(id, |engine| {
            engine.sendlist_send(
                &self.bus,
                TransferContext::Token(token),
                list,
                transfer_id,
            )
        })?
    }

    /// Harvest the next completed send from the source ring.
    pub fn completed_send_next(&self, id: EngineId) -> Result<SendCompletion> {
        Ok(self.with_engine(id, |engine| engine.completed_send_next(&self.bus))??)
    }

    /// Consume one posted-but-uncompleted send during shutdown.
    ///
    /// Target DMA must be stopped; no wake bracketing is taken. The MMIO
    /// write index is deliberately left where it is.
    pub fn cancel_send_next(&self, id: EngineId) -> Result<SendCompletion> {
        Ok(self.with_engine(id, Engine::cancel_send_next)??)
    }

    // -------------------------------------------------------------------------
    // Receive path
    // -------------------------------------------------------------------------

    /// Make an empty buffer available for the target to fill.
    ///
    /// The buffer must be at least `src_sz_max` bytes as configured on the
    /// sending side.
    pub fn recv_buf_enqueue(&self, id: EngineId, token: TransferToken, buffer: u32) -> Result<()> {
        self.with_engine(id, |engine| {
            engine.recv_buf_enqueue(&self.bus, TransferContext::Token(token), buffer)
        })?
    }

    /// Harvest the next filled receive buffer from the destination ring.
    pub fn completed_recv_next(&self, id: EngineId) -> Result<RecvCompletion> {
        Ok(self.with_engine(id, Engine::completed_recv_next)??)
    }

    /// Take back the next posted-but-unfilled receive buffer during
    /// shutdown, so the caller can free it.
    ///
    /// Target DMA must be stopped; no wake bracketing is taken.
    pub fn revoke_recv_next(&self, id: EngineId) -> Result<(TransferContext, u32)> {
        Ok(self.with_engine(id, Engine::revoke_recv_next)??)
    }

    // -------------------------------------------------------------------------
    // Callback registration
    // -------------------------------------------------------------------------

    /// Register (or clear) the send completion callback.
    ///
    /// `disable_interrupts` keeps the copy-complete interrupt masked even
    /// with a callback registered, for engines drained by polling; an
    /// engine configured with
    /// [`ATTR_DIS_INTR`](crate::driver::config::ATTR_DIS_INTR) stays
    /// masked regardless.
    pub fn send_cb_register(
        &self,
        id: EngineId,
        callback: Option<SendCallback<B, A>>,
        disable_interrupts: bool,
    ) -> ConfigResult<()> {
        self.with_engine(id, |engine| {
            engine.send_cb = callback;
            let polled = disable_interrupts
                || engine.attr_flags & crate::driver::config::ATTR_DIS_INTR != 0;
            engine.handler_adjust(&self.bus, polled);
        })
    }

    /// Register (or clear) the receive completion callback.
    pub fn recv_cb_register(
        &self,
        id: EngineId,
        callback: Option<RecvCallback<B, A>>,
    ) -> ConfigResult<()> {
        self.with_engine(id, |engine| {
            engine.recv_cb = callback;
            engine.handler_adjust(&self.bus, false);
        })
    }

    // -------------------------------------------------------------------------
    // Interrupt service
    // -------------------------------------------------------------------------

    /// Service one engine: clear its copy-complete status, drain
    /// completions through the registered callbacks, clear watermark
    /// status, and report latched errors.
    ///
    /// The status clear precedes the drain so that a completion landing
    /// mid-drain re-asserts the (level-cleared) interrupt rather than
    /// being lost. The device lock is released around every callback
    /// invocation and reacquired for the next drain step.
    pub fn per_engine_service(&self, id: EngineId) {
        self.bus.target_access_begin();

        let callbacks = critical_section::with(|cs| {
            let registry = self.inner.borrow_ref(cs);
            registry.engines[id.index()].as_ref().map(|engine| {
                CeRegs::new(&self.bus, engine.ctrl_addr).int_status_clear(HOST_IS_COPY_COMPLETE);
                (engine.send_cb, engine.recv_cb, engine.ctrl_addr)
            })
        });
        let Some((send_cb, recv_cb, ctrl_addr)) = callbacks else {
            self.bus.target_access_end();
            return;
        };

        if let Some(callback) = recv_cb {
            loop {
                let completed = critical_section::with(|cs| {
                    self.inner.borrow_ref_mut(cs).engines[id.index()]
                        .as_mut()
                        .and_then(|engine| engine.completed_recv_next().ok())
                });
                let Some(completion) = completed else { break };
                callback(self, id, completion);
            }
        }

        if let Some(callback) = send_cb {
            loop {
                let completed = critical_section::with(|cs| {
                    self.inner.borrow_ref_mut(cs).engines[id.index()]
                        .as_mut()
                        .and_then(|engine| engine.completed_send_next(&self.bus).ok())
                });
                let Some(completion) = completed else { break };
                callback(self, id, completion);
            }
        }

        critical_section::with(|_cs| {
            let regs = CeRegs::new(&self.bus, ctrl_addr);
            regs.int_status_clear(CE_WATERMARK_MASK);

            let errors = regs.misc_int_status() & CE_ERROR_MASK;
            if errors != 0 {
                #[cfg(feature = "log")]
                warn!("ce{}: error interrupt status {:#x}", id.index(), errors);
                regs.misc_int_status_clear(errors);
            }
        });

        self.bus.target_access_end();
    }

    /// Service every engine flagged in the device interrupt summary.
    ///
    /// The summary is read once; pending bits are consumed from the local
    /// copy in ascending engine order. Bits beyond this device's engine
    /// count are ignored.
    pub fn per_engine_service_any(&self) {
        self.bus.target_access_begin();
        let mut summary = wrapper::interrupt_summary(&self.bus, self.regtable);

        for ce_id in 0..self.ce_count {
            if summary == 0 {
                break;
            }
            if summary & (1 << ce_id) == 0 {
                continue;
            }
            summary &= !(1 << ce_id);

            if let Some(id) = EngineId::new(ce_id as usize) {
                self.per_engine_service(id);
            }
        }
        self.bus.target_access_end();
    }

    /// Mask the copy-complete interrupt on every engine of the device.
    pub fn disable_interrupts(&self) {
        self.bus.target_access_begin();
        critical_section::with(|cs| {
            let registry = self.inner.borrow_ref(cs);
            for engine in registry.engines.iter().take(self.ce_count as usize).flatten() {
                CeRegs::new(&self.bus, engine.ctrl_addr).copy_complete_intr_disable();
            }
        });
        self.bus.target_access_end();
    }

    // -------------------------------------------------------------------------
    // Introspection
    // -------------------------------------------------------------------------

    /// Read and parse the engine's interrupt status.
    ///
    /// For engines drained by polling; the ISR path clears status itself.
    pub fn engine_int_status(&self, id: EngineId) -> ConfigResult<EngineIntStatus> {
        self.with_engine(id, |engine| {
            self.bus.target_access_begin();
            let raw = CeRegs::new(&self.bus, engine.ctrl_addr).int_status();
            self.bus.target_access_end();
            EngineIntStatus::from_raw(raw)
        })
    }

    /// Read and parse the engine's latched error status.
    pub fn engine_misc_int_status(&self, id: EngineId) -> ConfigResult<MiscIntStatus> {
        self.with_engine(id, |engine| {
            self.bus.target_access_begin();
            let raw = CeRegs::new(&self.bus, engine.ctrl_addr).misc_int_status();
            self.bus.target_access_end();
            MiscIntStatus::from_raw(raw)
        })
    }

    /// Source ring cursors `(sw, write, hw)` (for debugging).
    pub fn src_ring_indices(&self, id: EngineId) -> Option<(u32, u32, u32)> {
        critical_section::with(|cs| {
            self.inner.borrow_ref(cs).engines[id.index()]
                .as_ref()
                .and_then(|engine| engine.src_ring.as_ref().map(SourceRing::indices))
        })
    }

    /// Destination ring cursors `(sw, write)` (for debugging).
    pub fn dest_ring_indices(&self, id: EngineId) -> Option<(u32, u32)> {
        critical_section::with(|cs| {
            self.inner.borrow_ref(cs).engines[id.index()]
                .as_ref()
                .and_then(|engine| engine.dest_ring.as_ref().map(DestRing::indices))
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
