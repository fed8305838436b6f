// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors associated with beam calculations.

use thiserror::Error;

#[derive(Error, Debug)]
pub(crate) enum BeamError {
    #[error(
        "Gaussian beam parameters are invalid (FWHM {fwhm_rad} rad, reference frequency {ref_freq_hz} Hz)"
    )]
    InvalidGaussianBeam { fwhm_rad: f64, ref_freq_hz: f64 },

    /// Only produced by test beams that deliberately fail.
    #[cfg(test)]
    #[error("Injected beam failure on station {station_index}")]
    Injected { station_index: usize },
}
