//! Kernel construction parameters.

use eventide_core::RealtimeRate;

/// Construction-time parameters for [`SimKernel`](crate::SimKernel).
///
/// ```
/// use eventide_engine::{KernelConfig, SimKernel};
///
/// let kernel = SimKernel::new(KernelConfig {
///     seed: Some(42),
///     ..KernelConfig::default()
/// });
/// assert_eq!(kernel.seed(), 42);
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct KernelConfig {
    /// Seed for the shuffle applied to simultaneous ordinary events.
    ///
    /// `None` derives a seed from the wall clock at construction; fix a
    /// seed to make the dispatch permutation reproducible across runs.
    /// The resolved value is readable via
    /// [`SimKernel::seed`](crate::SimKernel::seed).
    pub seed: Option<u64>,

    /// Pacing rate the kernel starts with. Defaults to wall speed (1x).
    pub initial_rate: RealtimeRate,
}
