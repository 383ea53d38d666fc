//! Per-call execution state for the input pipeline.
use candle_core::utils::{cuda_is_available, metal_is_available};
use candle_core::Device;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::warn;

/// The device feature preparation runs on. Always the CPU, even when an
/// accelerator is present.
pub fn pipeline_device() -> Device {
    if cuda_is_available() {
        warn!("CUDA is available but input features are prepared on the CPU");
    } else if metal_is_available() {
        warn!("Metal is available but input features are prepared on the CPU");
    }
    Device::Cpu
}

/// Owned by a single preprocessing call: the device outputs are
/// materialized on and the generator every randomized step draws from.
#[derive(Debug)]
pub struct ExecutionContext {
    device: Device,
    rng: StdRng,
}

impl ExecutionContext {
    pub fn new(seed: u64) -> Self {
        Self {
            device: pipeline_device(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// An independent generator seeded from this context's stream.
    pub fn child_rng(&mut self) -> StdRng {
        StdRng::seed_from_u64(self.rng.gen())
    }
}
