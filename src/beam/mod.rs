// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Code to abstract station-beam calculations.
//!
//! [`Beam`] is a trait detailing how to perform beam-related tasks. By making
//! this trait, we can neatly abstract over multiple beam models, including a
//! simple [`NoBeam`] type (which just returns identity matrices).

mod error;

pub(crate) use error::BeamError;

use marlu::{AzEl, Jones};
use num_complex::Complex;

/// Supported beam types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BeamType {
    /// An analytic, circularly-symmetric Gaussian beam.
    Gaussian,

    /// a.k.a. `NoBeam`. Only returns identity matrices.
    None,
}

/// A trait abstracting beam code functions.
pub(crate) trait Beam: Sync + Send {
    /// Get the type of beam.
    fn get_beam_type(&self) -> BeamType;

    /// Calculate the beam-response Jones matrix for an [`AzEl`] direction.
    fn calc_jones(&self, azel: AzEl, freq_hz: f64, station_index: usize)
        -> Result<Jones<f64>, BeamError>;

    /// Calculate the beam-response Jones matrices for multiple [`AzEl`]
    /// directions, saving the results into the supplied slice. The slice must
    /// have the same length as `azels`.
    fn calc_jones_array_inner(
        &self,
        azels: &[AzEl],
        freq_hz: f64,
        station_index: usize,
        results: &mut [Jones<f64>],
    ) -> Result<(), BeamError> {
        for (azel, result) in azels.iter().zip(results.iter_mut()) {
            *result = self.calc_jones(*azel, freq_hz, station_index)?;
        }
        Ok(())
    }
}

/// A beam implementation that returns identity Jones matrices for all
/// directions.
pub(crate) struct NoBeam;

impl Beam for NoBeam {
    fn get_beam_type(&self) -> BeamType {
        BeamType::None
    }

    fn calc_jones(
        &self,
        _azel: AzEl,
        _freq_hz: f64,
        _station_index: usize,
    ) -> Result<Jones<f64>, BeamError> {
        Ok(Jones::identity())
    }

    fn calc_jones_array_inner(
        &self,
        _azels: &[AzEl],
        _freq_hz: f64,
        _station_index: usize,
        results: &mut [Jones<f64>],
    ) -> Result<(), BeamError> {
        results.fill(Jones::identity());
        Ok(())
    }
}

/// An analytic, circularly-symmetric Gaussian station beam, identical for
/// every station, with a full-width-half-maximum scaling inversely with
/// frequency from the given reference values.
pub(crate) struct GaussianBeam {
    /// FWHM at `ref_freq_hz` \[radians\].
    pub(crate) fwhm_rad: f64,

    pub(crate) ref_freq_hz: f64,
}

// FWHM = 2 sqrt(2 ln 2) sigma.
const FWHM_FACTOR: f64 = 2.35482004503;

impl Beam for GaussianBeam {
    fn get_beam_type(&self) -> BeamType {
        BeamType::Gaussian
    }

    fn calc_jones(
        &self,
        azel: AzEl,
        freq_hz: f64,
        _station_index: usize,
    ) -> Result<Jones<f64>, BeamError> {
        if !(self.fwhm_rad > 0.0) || !(self.ref_freq_hz > 0.0) {
            return Err(BeamError::InvalidGaussianBeam {
                fwhm_rad: self.fwhm_rad,
                ref_freq_hz: self.ref_freq_hz,
            });
        }

        // The beam is pinned to zenith; its angular size shrinks as the
        // frequency rises.
        let fwhm = self.fwhm_rad * self.ref_freq_hz / freq_hz;
        let sigma = fwhm / FWHM_FACTOR;
        let zenith_angle = std::f64::consts::FRAC_PI_2 - azel.el;
        let amp = (-(zenith_angle * zenith_angle) / (2.0 * sigma * sigma)).exp();

        Ok(Jones::from([
            Complex::new(amp, 0.0),
            Complex::new(0.0, 0.0),
            Complex::new(0.0, 0.0),
            Complex::new(amp, 0.0),
        ]))
    }
}
