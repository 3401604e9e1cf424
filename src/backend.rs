//! Backend abstraction - Multi-backend support
//!
//! Supports both CUDA (GPU) and NdArray (CPU) backends. CUDA is compiled in
//! with the `cuda` feature; without it every device request resolves to CPU.

use tracing::{info, warn};

// --------------------------------------------------------------------------------
// BACKEND SELECTION: CUDA (feature) or NdArray (default)
// --------------------------------------------------------------------------------

#[cfg(feature = "cuda")]
pub type DefaultBackend = burn_cuda::Cuda;

#[cfg(not(feature = "cuda"))]
pub type DefaultBackend = burn::backend::NdArray;

/// Device type of the default backend
pub type DefaultDevice = <DefaultBackend as burn::tensor::backend::Backend>::Device;

/// Get the default device
pub fn default_device() -> DefaultDevice {
    DefaultDevice::default()
}

/// Get a human-readable name for the current backend
pub fn backend_name() -> &'static str {
    #[cfg(feature = "cuda")]
    {
        "CUDA (GPU)"
    }

    #[cfg(not(feature = "cuda"))]
    {
        "NdArray (CPU)"
    }
}

/// Whether this build can place tensors on a GPU
pub fn gpu_compiled() -> bool {
    cfg!(feature = "cuda")
}

/// Resolve the device for a model's GPU-residency flag
///
/// A GPU request on a CPU-only build falls back to the CPU device with a warning.
pub fn resolve_device(use_gpu: bool) -> DefaultDevice {
    if use_gpu && !gpu_compiled() {
        warn!("GPU requested but this build has no CUDA backend - falling back to CPU");
    } else if !use_gpu && gpu_compiled() {
        warn!("CPU requested but this build only carries the CUDA backend - using GPU 0");
    }

    let device = default_device();
    info!("Burn backend initialized: {} ({:?})", backend_name(), device);
    device
}
