//! Error types for GPU layout operations.
//!
//! One flat enum, as in most host/GPU crates of this shape — `LayoutError`
//! groups the four kinds described by the design (config, capacity, GPU
//! context, state), with structured fields on the variants that benefit
//! from them so a caller can match on `field` without parsing a message.

use thiserror::Error;

/// Errors that can occur during GPU layout operations.
#[derive(Error, Debug)]
pub enum LayoutError {
    // ---- ConfigError ----------------------------------------------------
    /// An algorithm or simulation parameter is out of its valid range, or
    /// a combination of parameters violates a documented constraint (e.g.
    /// t-FDP's `alpha * (1 + beta) < 1`).
    #[error("invalid configuration for `{field}`: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    // ---- CapacityError ----------------------------------------------------
    /// `node_count` or `edge_count` exceeds the capacity the simulation
    /// was allocated for.
    #[error(
        "capacity exceeded: {field} actual={actual} expected<={expected} (node_count={node_count}, edge_count={edge_count})"
    )]
    CapacityExceeded {
        field: &'static str,
        expected: u32,
        actual: u32,
        node_count: u32,
        edge_count: u32,
    },

    /// A CSR pair failed validation (non-monotone offsets, wrong length,
    /// out-of-range index, or forward/inverse edge-count mismatch).
    #[error("invalid CSR `{field}`: expected {expected}, got {actual}")]
    InvalidCsr {
        field: &'static str,
        expected: String,
        actual: String,
    },

    // ---- ContextError ----------------------------------------------------
    /// Failed to initialize the GPU device or adapter.
    #[error("GPU initialization failed: {0}")]
    GpuInit(String),

    /// Failed to create a GPU resource (buffer, pipeline, bind group).
    #[error("GPU resource creation failed: {0}")]
    ResourceCreation(String),

    /// The GPU device was lost mid-simulation.
    #[error("GPU device lost: {0}")]
    DeviceLost(String),

    /// An algorithm requires data the caller did not supply (e.g. the
    /// density field needs an explicit bounding box).
    #[error("missing required context for `{0}`: {1}")]
    MissingContext(&'static str, String),

    // ---- StateError ----------------------------------------------------
    /// Failed to read back data from the GPU.
    #[error("GPU readback failed: {0}")]
    Readback(String),

    /// The graph supplied to `init`/`load_*` was invalid (empty, or
    /// internally inconsistent).
    #[error("invalid graph: {0}")]
    InvalidGraph(String),

    /// An operation was attempted before the simulation was initialized.
    #[error("simulation not initialized")]
    NotInitialized,

    /// An operation was attempted on a disposed simulation.
    #[error("simulation has been disposed")]
    Disposed,
}

impl LayoutError {
    /// True for errors that leave the controller in `Stopped` and require
    /// the caller to rebuild GPU state before continuing (device-lost class).
    pub fn is_fatal_to_device(&self) -> bool {
        matches!(self, LayoutError::DeviceLost(_) | LayoutError::GpuInit(_))
    }
}
