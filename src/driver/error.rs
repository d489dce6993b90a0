//! Error types for the Copy Engine driver
//!
//! Errors are organized by domain for better diagnostics:
//! - [`ConfigError`]: engine setup and ring allocation failures
//! - [`DmaError`]: ring occupancy and sendlist staging issues
//! - [`IoError`]: runtime completion/harvest failures
//!
//! The unified [`Error`] enum wraps all domain errors and is returned
//! by most driver methods.

// =============================================================================
// Configuration Errors
// =============================================================================

/// Engine setup and ring allocation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Engine id out of range for this device
    InvalidEngineId,
    /// Invalid configuration parameter
    InvalidConfig,
    /// Operation on an engine that has not been initialized
    NotInitialized,
    /// Re-initialization requested a different ring size
    RingSizeMismatch,
    /// DMA-coherent or host allocation failed
    AllocFailed,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ConfigError {
    /// Returns a human-readable description of the error
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ConfigError::InvalidEngineId => "engine id out of range",
            ConfigError::InvalidConfig => "invalid configuration",
            ConfigError::NotInitialized => "engine not initialized",
            ConfigError::RingSizeMismatch => "ring size mismatch on re-init",
            ConfigError::AllocFailed => "ring allocation failed",
        }
    }
}

// =============================================================================
// DMA Errors
// =============================================================================

/// Ring occupancy and sendlist staging errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DmaError {
    /// No free descriptor slot in the ring
    RingFull,
    /// Not enough free slots for the whole sendlist (ring untouched)
    InsufficientSpace,
    /// Sendlist staging buffer is at capacity
    SendlistFull,
    /// Sendlist contains no items
    EmptySendlist,
}

impl core::fmt::Display for DmaError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl DmaError {
    /// Returns a human-readable description of the error
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            DmaError::RingFull => "ring full",
            DmaError::InsufficientSpace => "insufficient ring space for sendlist",
            DmaError::SendlistFull => "sendlist at capacity",
            DmaError::EmptySendlist => "sendlist is empty",
        }
    }
}

// =============================================================================
// I/O Errors
// =============================================================================

/// Runtime completion/harvest errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IoError {
    /// No completed descriptor available yet (drain loops stop here)
    NotReady,
    /// The target's read index reads back as the all-ones sentinel
    DeviceGone,
    /// The engine was not configured with the requested ring
    RingUnavailable,
}

impl core::fmt::Display for IoError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl IoError {
    /// Returns a human-readable description of the error
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            IoError::NotReady => "no completion ready",
            IoError::DeviceGone => "device gone",
            IoError::RingUnavailable => "ring not configured",
        }
    }
}

// =============================================================================
// Unified Error Type
// =============================================================================

/// This enum wraps all domain-specific errors for unified error handling.
///
/// Match on the inner domain error for specific handling:
/// ```ignore
/// match result {
///     Err(Error::Dma(DmaError::RingFull)) => { /* back off and retry */ }
///     Err(Error::Io(IoError::NotReady)) => { /* drain loop done */ }
///     _ => {}
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Configuration error
    Config(ConfigError),
    /// DMA ring error
    Dma(DmaError),
    /// I/O error
    Io(IoError),
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Config(e) => write!(f, "config: {}", e.as_str()),
            Error::Dma(e) => write!(f, "dma: {}", e.as_str()),
            Error::Io(e) => write!(f, "io: {}", e.as_str()),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl From<DmaError> for Error {
    fn from(e: DmaError) -> Self {
        Error::Dma(e)
    }
}

impl From<IoError> for Error {
    fn from(e: IoError) -> Self {
        Error::Io(e)
    }
}

/// Result type alias for Copy Engine operations
pub type Result<T> = core::result::Result<T, Error>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = core::result::Result<T, ConfigError>;

/// Result type alias for DMA ring operations
pub type DmaResult<T> = core::result::Result<T, DmaError>;

/// Result type alias for I/O operations
pub type IoResult<T> = core::result::Result<T, IoError>;

// =============================================================================
// Unit Tests
// =============================================================================
