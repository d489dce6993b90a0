//! Interrupt status handling for the Copy Engine.
//!
//! This module provides parsed views of the per-engine interrupt status
//! registers: [`EngineIntStatus`] for the host status register (copy
//! complete and watermarks) and [`MiscIntStatus`] for the latched error
//! conditions.

use crate::register::ce::{
    HOST_IS_COPY_COMPLETE, HOST_IS_DST_RING_HIGH_WATERMARK, HOST_IS_DST_RING_LOW_WATERMARK,
    HOST_IS_SRC_RING_HIGH_WATERMARK, HOST_IS_SRC_RING_LOW_WATERMARK, MISC_IS_AXI_ERR,
    MISC_IS_DST_ADDR_ERR, MISC_IS_DST_MAX_LEN_VIO, MISC_IS_DST_RING_OVERFLOW,
    MISC_IS_SRC_LEN_ERR, MISC_IS_SRC_RING_OVERFLOW,
};

// =============================================================================
// Engine Interrupt Status
// =============================================================================

/// Interrupt status flags parsed from the engine's host status register.
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EngineIntStatus {
    /// Copy complete - at least one descriptor finished
    pub copy_complete: bool,
    /// Source ring high watermark crossed
    pub src_high_watermark: bool,
    /// Source ring low watermark crossed
    pub src_low_watermark: bool,
    /// Destination ring high watermark crossed
    pub dst_high_watermark: bool,
    /// Destination ring low watermark crossed
    pub dst_low_watermark: bool,
}

impl EngineIntStatus {
    /// Create from the raw host interrupt status register value.
    #[inline]
    #[must_use]
    pub fn from_raw(status: u32) -> Self {
        Self {
            copy_complete: (status & HOST_IS_COPY_COMPLETE) != 0,
            src_high_watermark: (status & HOST_IS_SRC_RING_HIGH_WATERMARK) != 0,
            src_low_watermark: (status & HOST_IS_SRC_RING_LOW_WATERMARK) != 0,
            dst_high_watermark: (status & HOST_IS_DST_RING_HIGH_WATERMARK) != 0,
            dst_low_watermark: (status & HOST_IS_DST_RING_LOW_WATERMARK) != 0,
        }
    }

    /// Convert back to a raw value suitable for a status-clear write.
    #[inline]
    #[must_use]
    pub fn to_raw(&self) -> u32 {
        let mut val = 0u32;
        if self.copy_complete {
            val |= HOST_IS_COPY_COMPLETE;
        }
        if self.src_high_watermark {
            val |= HOST_IS_SRC_RING_HIGH_WATERMARK;
        }
        if self.src_low_watermark {
            val |= HOST_IS_SRC_RING_LOW_WATERMARK;
        }
        if self.dst_high_watermark {
            val |= HOST_IS_DST_RING_HIGH_WATERMARK;
        }
        if self.dst_low_watermark {
            val |= HOST_IS_DST_RING_LOW_WATERMARK;
        }
        val
    }

    /// Check if any interrupt is pending.
    #[inline]
    #[must_use]
    pub fn any(&self) -> bool {
        self.copy_complete
            || self.src_high_watermark
            || self.src_low_watermark
            || self.dst_high_watermark
            || self.dst_low_watermark
    }

    /// Check if any watermark interrupt is pending.
    #[inline]
    #[must_use]
    pub fn any_watermark(&self) -> bool {
        self.src_high_watermark
            || self.src_low_watermark
            || self.dst_high_watermark
            || self.dst_low_watermark
    }
}

// =============================================================================
// Misc (Error) Interrupt Status
// =============================================================================

/// Latched engine error conditions from the misc status register.
///
/// These are enabled at init; this core only reports and clears them, it
/// does not attempt recovery.
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MiscIntStatus {
    /// AXI bus error during a transfer
    pub axi_err: bool,
    /// Destination address error
    pub dst_addr_err: bool,
    /// Source descriptor length error
    pub src_len_err: bool,
    /// Destination buffer maximum length violation
    pub dst_max_len_vio: bool,
    /// Destination ring overflow
    pub dst_ring_overflow: bool,
    /// Source ring overflow
    pub src_ring_overflow: bool,
}

impl MiscIntStatus {
    /// Create from the raw misc interrupt status register value.
    #[inline]
    #[must_use]
    pub fn from_raw(status: u32) -> Self {
        Self {
            axi_err: (status & MISC_IS_AXI_ERR) != 0,
            dst_addr_err: (status & MISC_IS_DST_ADDR_ERR) != 0,
            src_len_err: (status & MISC_IS_SRC_LEN_ERR) != 0,
            dst_max_len_vio: (status & MISC_IS_DST_MAX_LEN_VIO) != 0,
            dst_ring_overflow: (status & MISC_IS_DST_RING_OVERFLOW) != 0,
            src_ring_overflow: (status & MISC_IS_SRC_RING_OVERFLOW) != 0,
        }
    }

    /// Convert back to a raw value suitable for a status-clear write.
    #[inline]
    #[must_use]
    pub fn to_raw(&self) -> u32 {
        let mut val = 0u32;
        if self.axi_err {
            val |= MISC_IS_AXI_ERR;
        }
        if self.dst_addr_err {
            val |= MISC_IS_DST_ADDR_ERR;
        }
        if self.src_len_err {
            val |= MISC_IS_SRC_LEN_ERR;
        }
        if self.dst_max_len_vio {
            val |= MISC_IS_DST_MAX_LEN_VIO;
        }
        if self.dst_ring_overflow {
            val |= MISC_IS_DST_RING_OVERFLOW;
        }
        if self.src_ring_overflow {
            val |= MISC_IS_SRC_RING_OVERFLOW;
        }
        val
    }

    /// Check if any error condition is latched.
    #[inline]
    #[must_use]
    pub fn any(&self) -> bool {
        self.axi_err
            || self.dst_addr_err
            || self.src_len_err
            || self.dst_max_len_vio
            || self.dst_ring_overflow
            || self.src_ring_overflow
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::register::ce::{CE_ERROR_MASK, CE_WATERMARK_MASK};

    #[test]
    fn engine_status_from_raw_zero() {
        let status = EngineIntStatus::from_raw(0);
        assert!(!status.any());
        assert!(!status.any_watermark());
    }

    #[test]
    fn engine_status_copy_complete() {
        let status = EngineIntStatus::from_raw(HOST_IS_COPY_COMPLETE);
        assert!(status.copy_complete);
        assert!(status.any());
        assert!(!status.any_watermark());
    }

    #[test]
    fn engine_status_watermarks() {
        let status = EngineIntStatus::from_raw(CE_WATERMARK_MASK);
        assert!(!status.copy_complete);
        assert!(status.src_high_watermark);
        assert!(status.src_low_watermark);
        assert!(status.dst_high_watermark);
        assert!(status.dst_low_watermark);
        assert!(status.any_watermark());
    }

    #[test]
    fn engine_status_roundtrip() {
        let raw = HOST_IS_COPY_COMPLETE | HOST_IS_SRC_RING_LOW_WATERMARK;
        assert_eq!(EngineIntStatus::from_raw(raw).to_raw(), raw);
    }

    #[test]
    fn engine_status_default_is_zero() {
        assert_eq!(EngineIntStatus::default().to_raw(), 0);
    }

    #[test]
    fn misc_status_from_raw_zero() {
        assert!(!MiscIntStatus::from_raw(0).any());
    }

    #[test]
    fn misc_status_individual_errors() {
        assert!(MiscIntStatus::from_raw(MISC_IS_AXI_ERR).axi_err);
        assert!(MiscIntStatus::from_raw(MISC_IS_SRC_LEN_ERR).src_len_err);
        assert!(MiscIntStatus::from_raw(MISC_IS_DST_RING_OVERFLOW).dst_ring_overflow);
        assert!(MiscIntStatus::from_raw(MISC_IS_SRC_RING_OVERFLOW).src_ring_overflow);
        assert!(MiscIntStatus::from_raw(MISC_IS_DST_ADDR_ERR).dst_addr_err);
        assert!(MiscIntStatus::from_raw(MISC_IS_DST_MAX_LEN_VIO).dst_max_len_vio);
    }

    #[test]
    fn misc_status_roundtrip_all() {
        assert_eq!(MiscIntStatus::from_raw(CE_ERROR_MASK).to_raw(), CE_ERROR_MASK);
    }

    #[test]
    fn misc_status_ignores_unrelated_bits() {
        let status = MiscIntStatus::from_raw(!CE_ERROR_MASK);
        assert!(!status.any());
    }
}
