//! Configuration types for the Copy Engine driver

// =============================================================================
// Engine Attribute Flags
// =============================================================================

/// Use non-snooping interconnect accesses for this engine's transfers
pub const ATTR_NO_SNOOP: u32 = 1 << 0;
/// Byte swap payload data words during the copy
pub const ATTR_BYTE_SWAP_DATA: u32 = 1 << 1;
/// Swizzle descriptors (big-endian targets)
pub const ATTR_SWIZZLE_DESCRIPTORS: u32 = 1 << 2;
/// Do not raise an interrupt on copy completion (polled engine)
pub const ATTR_DIS_INTR: u32 = 1 << 3;

// =============================================================================
// Send Flags
// =============================================================================

/// Byte swap this buffer during the copy
pub const SEND_FLAG_BYTE_SWAP: u32 = 1 << 0;
/// More buffers follow as part of the same logical send.
///
/// A gather continuation defers the write-index publish; the target only
/// sees the whole group once a send without this flag closes it. Normally
/// set internally by [`sendlist_send`](crate::CeDevice::sendlist_send).
pub const SEND_FLAG_GATHER: u32 = 1 << 16;

// =============================================================================
// Engine Configuration
// =============================================================================

/// Attributes of one Copy Engine instance.
///
/// Either ring may be absent: an engine used only host-to-target has no
/// destination ring and vice versa. Ring sizes are rounded up to the next
/// power of two at init.
///
/// # Example
///
/// ```ignore
/// let config = EngineConfig::new()
///     .with_src_ring(16, 2048)
///     .with_flags(ATTR_BYTE_SWAP_DATA);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EngineConfig {
    /// `ATTR_*` flag bits
    pub flags: u32,
    /// Entries in the source ring; zero means no source ring
    pub src_nentries: u32,
    /// Maximum source transfer size; also the minimum size of a posted
    /// destination buffer
    pub src_sz_max: u16,
    /// Entries in the destination ring; zero means no destination ring
    pub dest_nentries: u32,
}

impl EngineConfig {
    /// Create an empty configuration (no rings, no flags).
    #[must_use]
    pub const fn new() -> Self {
        Self {
            flags: 0,
            src_nentries: 0,
            src_sz_max: 0,
            dest_nentries: 0,
        }
    }

    /// Request a source (host-to-target) ring.
    #[must_use]
    pub const fn with_src_ring(mut self, nentries: u32, sz_max: u16) -> Self {
        self.src_nentries = nentries;
        self.src_sz_max = sz_max;
        self
    }

    /// Request a destination (target-to-host) ring.
    #[must_use]
    pub const fn with_dest_ring(mut self, nentries: u32) -> Self {
        self.dest_nentries = nentries;
        self
    }

    /// Set the `ATTR_*` flag bits.
    #[must_use]
    pub const fn with_flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    /// Whether payload byte swapping was requested.
    #[inline(always)]
    #[must_use]
    pub const fn byte_swap_data(&self) -> bool {
        self.flags & ATTR_BYTE_SWAP_DATA != 0
    }

    /// Whether copy-complete interrupts are suppressed for this engine.
    #[inline(always)]
    #[must_use]
    pub const fn interrupts_disabled(&self) -> bool {
        self.flags & ATTR_DIS_INTR != 0
    }
}

// =============================================================================
// Engine Operational State
// =============================================================================

/// Operational state of one engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EngineState {
    /// No engine present in this slot
    #[default]
    Unused,
    /// Engine present but quiesced
    Paused,
    /// Engine accepting work
    Running,
}

// =============================================================================
// Unit Tests
// =============================================================================
