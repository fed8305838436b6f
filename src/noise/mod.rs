// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Uncorrelated system-noise injection.
//!
//! Noise is zero-mean complex Gaussian, added to a combined visibility block
//! after the per-device fold. The generator is re-seeded from the configured
//! seed and the block index, so a given block's noise is reproducible
//! independent of how many blocks came before it.


use marlu::Jones;
use ndarray::prelude::*;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::vis::VisBlock;

/// System-noise configuration.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub(crate) struct NoiseParams {
    pub(crate) seed: u64,

    /// Per-polarisation noise RMS \[Jy\].
    pub(crate) rms_jy: f64,
}

/// Add system noise to all active visibilities of a combined block.
pub(crate) fn add_system_noise(block: &mut VisBlock, params: NoiseParams, block_index: usize) {
    let mut rng = block_rng(params.seed, block_index);
    let num_times = block.num_times;
    add_noise_to(
        block.cross.slice_mut(s![..num_times, .., ..]),
        params.rms_jy,
        &mut rng,
    );
    if let Some(autos) = block.autos.as_mut() {
        add_noise_to(autos.slice_mut(s![..num_times, .., ..]), params.rms_jy, &mut rng);
    }
}

fn block_rng(seed: u64, block_index: usize) -> StdRng {
    // Distinct, reproducible stream per (seed, block) pair.
    StdRng::seed_from_u64(seed ^ (block_index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

fn add_noise_to(mut vis: ArrayViewMut3<Jones<f32>>, rms_jy: f64, rng: &mut StdRng) {
    for jones in vis.iter_mut() {
        let mut noisy = *jones;
        for pol in 0..4 {
            let re: f64 = rng.sample(StandardNormal);
            let im: f64 = rng.sample(StandardNormal);
            noisy[pol] += num_complex::Complex32::new((re * rms_jy) as f32, (im * rms_jy) as f32);
        }
        *jones = noisy;
    }
}
