//! Device-level CE wrapper register definitions.
//!
//! The wrapper block sits above the per-engine register blocks and owns the
//! interrupt summary register: a bitmap of engines with a pending host
//! interrupt, read once per ISR invocation to fan service out to the right
//! engines.

use crate::hal::TargetBus;
use crate::register::regtable::TargetRegTable;

/// Interrupt summary register offset within the wrapper block
pub const CE_WRAPPER_INTERRUPT_SUMMARY_ADDRESS: u32 = 0x0000;

/// Per-engine pending bits shift within the summary register
pub const CE_WRAPPER_INTERRUPT_SUMMARY_HOST_MSI_LSB: u32 = 8;
/// Per-engine pending bits mask within the summary register
pub const CE_WRAPPER_INTERRUPT_SUMMARY_HOST_MSI_MASK: u32 = 0x0000_ff00;

/// Read the interrupt summary and extract the per-engine pending bitmap.
///
/// Bit `n` of the result is set when engine `n` has a pending interrupt.
#[inline(always)]
pub(crate) fn interrupt_summary<B: TargetBus>(bus: &B, regs: &TargetRegTable) -> u32 {
    let raw = bus.register_read32(
        regs.ce_wrapper_base_address + CE_WRAPPER_INTERRUPT_SUMMARY_ADDRESS,
    );
    (raw & CE_WRAPPER_INTERRUPT_SUMMARY_HOST_MSI_MASK) >> CE_WRAPPER_INTERRUPT_SUMMARY_HOST_MSI_LSB
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::register::regtable::QCA988X;
    use crate::testing::MockBus;

    #[test]
    fn summary_extracts_msi_field() {
        let bus = MockBus::new();
        bus.set_register(
            QCA988X.ce_wrapper_base_address + CE_WRAPPER_INTERRUPT_SUMMARY_ADDRESS,
            0x0a00,
        );

        assert_eq!(interrupt_summary(&bus, &QCA988X), 0x0a);
    }

    #[test]
    fn summary_ignores_bits_outside_field() {
        let bus = MockBus::new();
        bus.set_register(
            QCA988X.ce_wrapper_base_address + CE_WRAPPER_INTERRUPT_SUMMARY_ADDRESS,
            0xffff_00ff,
        );

        assert_eq!(interrupt_summary(&bus, &QCA988X), 0);
    }
}
