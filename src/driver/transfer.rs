//! Per-transfer handles and completion records.
//!
//! Every posted buffer carries an opaque caller-supplied [`TransferToken`]
//! that is echoed back when the transfer completes, so the caller can
//! correlate completions with whatever bookkeeping it keeps (an index into
//! a buffer table, a queue slot, ...). The driver never interprets it.

// =============================================================================
// Transfer Contexts
// =============================================================================

/// Opaque caller-supplied per-transfer handle.
///
/// Typically an index into a caller-owned table of in-flight buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransferToken(pub usize);

/// Context attached to one ring slot, returned on completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransferContext {
    /// A caller handle supplied when the buffer was posted.
    Token(TransferToken),
    /// Marks every fragment of a gathered sendlist except the final one;
    /// only the final fragment carries the caller's token.
    SendlistItem,
}

// =============================================================================
// Completions
// =============================================================================

/// One harvested source-ring (send) completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SendCompletion {
    /// Context supplied when the buffer was posted
    pub context: TransferContext,
    /// Bus address of the sent buffer
    pub buffer: u32,
    /// Length that was sent
    pub nbytes: u16,
    /// Caller transfer id reflected from the descriptor
    pub transfer_id: u16,
}

/// One harvested destination-ring (receive) completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RecvCompletion {
    /// Context supplied when the empty buffer was posted
    pub context: TransferContext,
    /// Bus address of the filled buffer
    pub buffer: u32,
    /// Length the target wrote into the buffer
    pub nbytes: u16,
    /// Transfer id the target wrote into the descriptor
    pub transfer_id: u16,
    /// Whether the payload was byte-swapped during the copy
    pub swapped: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_roundtrips_through_context() {
        let ctx = TransferContext::Token(TransferToken(0xa));
        match ctx {
            TransferContext::Token(t) => assert_eq!(t, TransferToken(0xa)),
            TransferContext::SendlistItem => panic!("wrong variant"),
        }
    }

    #[test]
    fn sendlist_item_is_distinct_from_any_token() {
        assert_ne!(
            TransferContext::SendlistItem,
            TransferContext::Token(TransferToken(0))
        );
    }
}
