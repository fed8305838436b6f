// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Sky-model handling.
//!
//! A sky model is stored as a struct-of-arrays so that per-source columns can
//! be copied, scaled and filtered without touching the others. Sources are
//! partitioned into chunks of at most `max_sources_per_chunk` sources; all
//! device buffers are sized for the largest chunk.

mod read;
#[cfg(test)]
mod tests;

pub(crate) use read::{read_source_list, ReadSourceListError};

use marlu::{AzEl, RADec};
use rayon::prelude::*;

use crate::constants::ELEVATION_LIMIT;

/// A single sky-model source.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Source {
    pub(crate) radec: RADec,

    /// Stokes I flux density at `ref_freq_hz` \[Jy\].
    pub(crate) flux_i: f64,

    pub(crate) spectral_index: f64,

    pub(crate) ref_freq_hz: f64,
}

/// A chunk of sky-model sources in struct-of-arrays form.
///
/// The `l`/`m`/`n` columns are direction cosines against the run's phase
/// centre, already prepared for the RIME (scaled by 2π, with n shifted by 1)
/// so that the phase of a source is `u*l + v*m + w*n` for (u,v,w) in
/// wavelengths.
#[derive(Debug, Clone, Default)]
pub(crate) struct SkyModel {
    pub(crate) ra: Vec<f64>,
    pub(crate) dec: Vec<f64>,
    pub(crate) l: Vec<f64>,
    pub(crate) m: Vec<f64>,
    pub(crate) n: Vec<f64>,

    /// Reference Stokes I flux densities \[Jy\].
    pub(crate) flux_i_ref: Vec<f64>,
    pub(crate) spectral_index: Vec<f64>,
    pub(crate) ref_freq_hz: Vec<f64>,

    /// Working Stokes I flux densities \[Jy\], rewritten by
    /// [`SkyModel::scale_flux_with_frequency`].
    pub(crate) flux_i: Vec<f64>,
}

impl SkyModel {
    /// An empty model with all columns' capacity reserved, so that later
    /// copies into it don't reallocate.
    pub(crate) fn with_capacity(capacity: usize) -> SkyModel {
        SkyModel {
            ra: Vec::with_capacity(capacity),
            dec: Vec::with_capacity(capacity),
            l: Vec::with_capacity(capacity),
            m: Vec::with_capacity(capacity),
            n: Vec::with_capacity(capacity),
            flux_i_ref: Vec::with_capacity(capacity),
            spectral_index: Vec::with_capacity(capacity),
            ref_freq_hz: Vec::with_capacity(capacity),
            flux_i: Vec::with_capacity(capacity),
        }
    }

    /// Partition sources into chunks of at most `max_sources_per_chunk`,
    /// precomputing RIME direction cosines against `phase_centre`.
    pub(crate) fn chunk_sources(
        sources: &[Source],
        phase_centre: RADec,
        max_sources_per_chunk: usize,
    ) -> Vec<SkyModel> {
        sources
            .chunks(max_sources_per_chunk.max(1))
            .map(|chunk| {
                let mut sky = SkyModel::with_capacity(chunk.len());
                for source in chunk {
                    let lmn = source.radec.to_lmn(phase_centre).prepare_for_rime();
                    sky.ra.push(source.radec.ra);
                    sky.dec.push(source.radec.dec);
                    sky.l.push(lmn.l);
                    sky.m.push(lmn.m);
                    sky.n.push(lmn.n);
                    sky.flux_i_ref.push(source.flux_i);
                    sky.spectral_index.push(source.spectral_index);
                    sky.ref_freq_hz.push(source.ref_freq_hz);
                    sky.flux_i.push(source.flux_i);
                }
                sky
            })
            .collect()
    }

    pub(crate) fn num_sources(&self) -> usize {
        self.ra.len()
    }

    /// Copy another model's sources into this one. Existing contents are
    /// discarded; capacity is reused.
    pub(crate) fn copy_from(&mut self, other: &SkyModel) {
        self.ra.clone_from(&other.ra);
        self.dec.clone_from(&other.dec);
        self.l.clone_from(&other.l);
        self.m.clone_from(&other.m);
        self.n.clone_from(&other.n);
        self.flux_i_ref.clone_from(&other.flux_i_ref);
        self.spectral_index.clone_from(&other.spectral_index);
        self.ref_freq_hz.clone_from(&other.ref_freq_hz);
        self.flux_i.clone_from(&other.flux_i);
    }

    /// Rewrite the working flux densities for a channel frequency. The
    /// working column is always recomputed from the reference columns, so
    /// calling this repeatedly with different frequencies is safe.
    pub(crate) fn scale_flux_with_frequency(&mut self, freq_hz: f64) {
        for ((flux, &flux_ref), (&si, &ref_freq)) in self
            .flux_i
            .iter_mut()
            .zip(self.flux_i_ref.iter())
            .zip(self.spectral_index.iter().zip(self.ref_freq_hz.iter()))
        {
            *flux = flux_ref * (freq_hz / ref_freq).powf(si);
        }
    }

    /// The azimuth/elevation of every source at the given sidereal time and
    /// array latitude, written into `azels` (cleared first).
    pub(crate) fn azels_into(&self, lst_rad: f64, latitude_rad: f64, azels: &mut Vec<AzEl>) {
        azels.clear();
        azels.par_extend(self.ra.par_iter().zip(self.dec.par_iter()).map(
            |(&ra, &dec)| {
                RADec::from_radians(ra, dec)
                    .to_hadec(lst_rad)
                    .to_azel(latitude_rad)
            },
        ));
    }

    /// Filter sources above the horizon into `clipped`, along with their
    /// azimuth/elevation coordinates in `azels`. Both outputs are rewritten.
    pub(crate) fn horizon_clip(
        &self,
        lst_rad: f64,
        latitude_rad: f64,
        clipped: &mut SkyModel,
        azels: &mut Vec<AzEl>,
    ) {
        clipped.clear();
        azels.clear();
        for i in 0..self.num_sources() {
            let azel = RADec::from_radians(self.ra[i], self.dec[i])
                .to_hadec(lst_rad)
                .to_azel(latitude_rad);
            if azel.el > ELEVATION_LIMIT {
                clipped.ra.push(self.ra[i]);
                clipped.dec.push(self.dec[i]);
                clipped.l.push(self.l[i]);
                clipped.m.push(self.m[i]);
                clipped.n.push(self.n[i]);
                clipped.flux_i_ref.push(self.flux_i_ref[i]);
                clipped.spectral_index.push(self.spectral_index[i]);
                clipped.ref_freq_hz.push(self.ref_freq_hz[i]);
                clipped.flux_i.push(self.flux_i[i]);
                azels.push(azel);
            }
        }
    }

    fn clear(&mut self) {
        self.ra.clear();
        self.dec.clear();
        self.l.clear();
        self.m.clear();
        self.n.clear();
        self.flux_i_ref.clear();
        self.spectral_index.clear();
        self.ref_freq_hz.clear();
        self.flux_i.clear();
    }
}
