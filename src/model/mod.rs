// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Physics kernels for the per-work-unit pipeline.
//!
//! All functions here are pure with respect to the buffers they're given:
//! they read sky/telescope columns and write into workspaces owned by a
//! device bundle. Sizing is the caller's responsibility; every workspace is
//! allocated for the largest chunk and sliced down to the active source
//! count.

mod error;
#[cfg(test)]
mod tests;

pub(crate) use error::ModelError;

use marlu::{c64, AzEl, HADec, Jones, XyzGeodetic, UVW};
use ndarray::{parallel::prelude::*, prelude::*};

use crate::beam::Beam;
use crate::constants::VEL_C;
use crate::math::cexp;
use crate::sky::SkyModel;

/// Rotate station positions into the (u,v,w) frame of a phase centre.
///
/// This is Equation 4.1 of: Interferometry and Synthesis in Radio Astronomy,
/// Third Edition, Section 4: Geometrical Relationships, Polarimetry, and the
/// Measurement Equation.
pub(crate) fn station_uvws_into(
    station_positions: &[XyzGeodetic],
    phase_centre: HADec,
    uvws: &mut [UVW],
) {
    let (s_ha, c_ha) = phase_centre.ha.sin_cos();
    let (s_dec, c_dec) = phase_centre.dec.sin_cos();
    for (uvw, xyz) in uvws.iter_mut().zip(station_positions.iter()) {
        *uvw = UVW {
            u: s_ha * xyz.x + c_ha * xyz.y,
            v: s_dec * s_ha * xyz.y + c_dec * xyz.z - s_dec * c_ha * xyz.x,
            w: c_dec * c_ha * xyz.x - c_dec * s_ha * xyz.y + s_dec * xyz.z,
        };
    }
}

/// Evaluate the station-beam response (Jones E) for every station and
/// source. `jones_e` has shape `[station][source]`; only the first
/// `azels.len()` source columns are written.
pub(crate) fn evaluate_jones_e(
    beam: &dyn Beam,
    azels: &[AzEl],
    freq_hz: f64,
    mut jones_e: ArrayViewMut2<Jones<f64>>,
) -> Result<(), ModelError> {
    for (station_index, mut row) in jones_e.outer_iter_mut().enumerate() {
        beam.calc_jones_array_inner(
            azels,
            freq_hz,
            station_index,
            &mut row.as_slice_mut().expect("is contiguous")[..azels.len()],
        )?;
    }
    Ok(())
}

/// Evaluate parallactic-angle rotation (Jones R) for every station and
/// source, and fold it into the beam response in place (`jones_r = R * E`).
///
/// The rotation depends only on the source direction, the sidereal time and
/// the array latitude, so each source's matrix is shared by all stations.
pub(crate) fn evaluate_jones_r(
    sky: &SkyModel,
    lst_rad: f64,
    latitude_rad: f64,
    jones_e: ArrayView2<Jones<f64>>,
    mut jones_r: ArrayViewMut2<Jones<f64>>,
) {
    let num_src = sky.num_sources();
    let (s_lat, c_lat) = latitude_rad.sin_cos();
    let rotations: Vec<Jones<f64>> = (0..num_src)
        .map(|i| {
            let ha = lst_rad - sky.ra[i];
            let (s_ha, c_ha) = ha.sin_cos();
            let (s_dec, c_dec) = sky.dec[i].sin_cos();
            let chi = (s_ha * c_lat).atan2(c_dec * s_lat - s_dec * c_lat * c_ha);
            let (s_chi, c_chi) = chi.sin_cos();
            Jones::from([
                c64::new(c_chi, 0.0),
                c64::new(-s_chi, 0.0),
                c64::new(s_chi, 0.0),
                c64::new(c_chi, 0.0),
            ])
        })
        .collect();

    for (mut r_row, e_row) in jones_r.outer_iter_mut().zip(jones_e.outer_iter()) {
        for ((r, e), rot) in r_row
            .iter_mut()
            .zip(e_row.iter())
            .zip(rotations.iter())
            .take(num_src)
        {
            *r = *rot * *e;
        }
    }
}

/// Evaluate the interferometric phase term (Jones K) for every station and
/// source. Sources whose working flux falls outside the filter window are
/// given a zero term, excluding them from correlation.
pub(crate) fn evaluate_jones_k(
    sky: &SkyModel,
    station_uvws: &[UVW],
    freq_hz: f64,
    flux_filter_min_jy: f64,
    flux_filter_max_jy: f64,
    mut jones_k: ArrayViewMut2<c64>,
) {
    let inv_lambda = freq_hz / VEL_C;
    for (uvw, mut row) in station_uvws.iter().zip(jones_k.outer_iter_mut()) {
        let u = uvw.u * inv_lambda;
        let v = uvw.v * inv_lambda;
        let w = uvw.w * inv_lambda;
        for (i_src, k) in row.iter_mut().enumerate().take(sky.num_sources()) {
            let flux = sky.flux_i[i_src];
            *k = if (flux_filter_min_jy..=flux_filter_max_jy).contains(&flux) {
                cexp(u * sky.l[i_src] + v * sky.m[i_src] + w * sky.n[i_src])
            } else {
                c64::default()
            };
        }
    }
}

/// Combine the phase term with the station response into the full Jones
/// product, `jones_j = K * ER`.
pub(crate) fn jones_join(
    jones_k: ArrayView2<c64>,
    jones_er: ArrayView2<Jones<f64>>,
    mut jones_j: ArrayViewMut2<Jones<f64>>,
    num_src: usize,
) {
    for ((mut j_row, k_row), er_row) in jones_j
        .outer_iter_mut()
        .zip(jones_k.outer_iter())
        .zip(jones_er.outer_iter())
    {
        for ((j, k), er) in j_row
            .iter_mut()
            .zip(k_row.iter())
            .zip(er_row.iter())
            .take(num_src)
        {
            *j = *er * *k;
        }
    }
}

/// Correlate the Jones products against the sky, accumulating
/// cross-correlations into `vis_b` (one element per baseline).
pub(crate) fn correlate(
    jones_j: ArrayView2<Jones<f64>>,
    sky: &SkyModel,
    baseline_pairs: &[(usize, usize)],
    mut vis_b: ArrayViewMut1<Jones<f32>>,
) {
    let num_src = sky.num_sources();
    vis_b
        .axis_iter_mut(Axis(0))
        .into_par_iter()
        .zip(baseline_pairs.par_iter())
        .for_each(|(mut vis, &(st1, st2))| {
            let jones_1 = jones_j.slice(s![st1, ..num_src]);
            let jones_2 = jones_j.slice(s![st2, ..num_src]);

            // Accumulate in double precision; demote once per visibility.
            let mut jones_accum: Jones<f64> = Jones::default();
            for ((j1, j2), &flux) in jones_1.iter().zip(jones_2.iter()).zip(sky.flux_i.iter()) {
                jones_accum += *j1 * brightness(flux) * j2.h();
            }
            let demoted = Jones::<f32>::from(jones_accum);
            vis.iter_mut().for_each(|v| *v += demoted);
        });
}

/// Correlate each station's Jones products against themselves, accumulating
/// auto-correlations into `vis_s` (one element per station).
pub(crate) fn correlate_autos(
    jones_j: ArrayView2<Jones<f64>>,
    sky: &SkyModel,
    mut vis_s: ArrayViewMut1<Jones<f32>>,
) {
    let num_src = sky.num_sources();
    for (mut vis, jones_row) in vis_s.outer_iter_mut().zip(jones_j.outer_iter()) {
        let mut jones_accum: Jones<f64> = Jones::default();
        for (j, &flux) in jones_row.iter().take(num_src).zip(sky.flux_i.iter()) {
            jones_accum += *j * brightness(flux) * j.h();
        }
        let demoted = Jones::<f32>::from(jones_accum);
        vis.iter_mut().for_each(|v| *v += demoted);
    }
}

/// The brightness matrix of an unpolarised Stokes I source.
#[inline]
fn brightness(flux_i: f64) -> Jones<f64> {
    Jones::from([
        c64::new(flux_i, 0.0),
        c64::default(),
        c64::default(),
        c64::new(flux_i, 0.0),
    ])
}
