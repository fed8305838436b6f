// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use approx::assert_abs_diff_eq;
use marlu::{Jones, RADec};
use ndarray::prelude::*;

use super::*;
use crate::beam::NoBeam;
use crate::sky::Source;

fn one_source_sky() -> SkyModel {
    // A source at the phase centre: l = m = 0, n - 1 = 0, so every phase
    // term is exactly 1 and visibilities equal the source flux.
    let phase_centre = RADec::from_degrees(0.0, -27.0);
    let sources = [Source {
        radec: phase_centre,
        flux_i: 2.0,
        spectral_index: 0.0,
        ref_freq_hz: 150e6,
    }];
    SkyModel::chunk_sources(&sources, phase_centre, 16).swap_remove(0)
}

#[test]
fn phase_centre_source_correlates_to_its_flux() {
    let sky = one_source_sky();
    let station_uvws = [
        UVW {
            u: 0.0,
            v: 0.0,
            w: 0.0,
        },
        UVW {
            u: 100.0,
            v: -50.0,
            w: 10.0,
        },
    ];

    let mut jones_e = Array2::from_elem((2, 1), Jones::identity());
    let mut jones_k = Array2::default((2, 1));
    let mut jones_j = Array2::default((2, 1));

    evaluate_jones_e(&NoBeam, &[AzEl::from_radians(0.0, 1.0)], 150e6, jones_e.view_mut()).unwrap();
    evaluate_jones_k(
        &sky,
        &station_uvws,
        150e6,
        f64::MIN,
        f64::MAX,
        jones_k.view_mut(),
    );
    jones_join(jones_k.view(), jones_e.view(), jones_j.view_mut(), 1);

    let mut vis = Array1::from_elem(1, Jones::<f32>::default());
    correlate(jones_j.view(), &sky, &[(0, 1)], vis.view_mut());

    // J_p B J_q^H with identity E and unit K is just B.
    assert_abs_diff_eq!(vis[0][0].re, 2.0, epsilon = 1e-6);
    assert_abs_diff_eq!(vis[0][0].im, 0.0, epsilon = 1e-6);
    assert_abs_diff_eq!(vis[0][3].re, 2.0, epsilon = 1e-6);
    assert_abs_diff_eq!(vis[0][1].norm(), 0.0, epsilon = 1e-6);
}

#[test]
fn flux_filter_excludes_sources() {
    let sky = one_source_sky();
    let station_uvws = [UVW::default(); 2];

    let mut jones_k = Array2::from_elem((2, 1), c64::new(9.0, 9.0));
    // The source's 2 Jy is outside [3, 10] Jy.
    evaluate_jones_k(&sky, &station_uvws, 150e6, 3.0, 10.0, jones_k.view_mut());
    for k in jones_k.iter() {
        assert_abs_diff_eq!(k.norm(), 0.0);
    }
}

#[test]
fn correlation_accumulates_across_calls() {
    let sky = one_source_sky();
    let jones_j = Array2::from_elem((2, 1), Jones::<f64>::identity());

    let mut vis = Array1::from_elem(1, Jones::<f32>::default());
    correlate(jones_j.view(), &sky, &[(0, 1)], vis.view_mut());
    correlate(jones_j.view(), &sky, &[(0, 1)], vis.view_mut());
    assert_abs_diff_eq!(vis[0][0].re, 4.0, epsilon = 1e-6);
}

#[test]
fn autos_are_real_valued_for_stokes_i() {
    let sky = one_source_sky();
    let jones_j = Array2::from_elem((2, 1), Jones::<f64>::identity() * c64::new(0.0, 1.0));

    let mut vis = Array1::from_elem(2, Jones::<f32>::default());
    correlate_autos(jones_j.view(), &sky, vis.view_mut());
    for v in vis.iter() {
        // j B j^H cancels the phase.
        assert_abs_diff_eq!(v[0].re, 2.0, epsilon = 1e-6);
        assert_abs_diff_eq!(v[0].im, 0.0, epsilon = 1e-6);
    }
}

#[test]
fn parallactic_rotation_preserves_total_power() {
    let sky = one_source_sky();
    let jones_e = Array2::from_elem((2, 1), Jones::<f64>::identity());
    let mut jones_r = Array2::default((2, 1));

    evaluate_jones_r(
        &sky,
        1.234,
        (-26.7_f64).to_radians(),
        jones_e.view(),
        jones_r.view_mut(),
    );
    // A rotation matrix: each column has unit norm.
    let r = jones_r[[0, 0]];
    assert_abs_diff_eq!(r[0].norm_sqr() + r[2].norm_sqr(), 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(r[1].norm_sqr() + r[3].norm_sqr(), 1.0, epsilon = 1e-12);
}

#[test]
fn station_uvws_match_baseline_differences() {
    let positions = [
        XyzGeodetic {
            x: 0.0,
            y: 0.0,
            z: 0.0,
        },
        XyzGeodetic {
            x: 120.0,
            y: -45.0,
            z: 10.0,
        },
    ];
    let phase_centre = RADec::from_degrees(15.0, -30.0).to_hadec(0.5);
    let mut uvws = [UVW::default(); 2];
    station_uvws_into(&positions, phase_centre, &mut uvws);

    let baselines = marlu::pos::xyz::xyzs_to_cross_uvws(&positions, phase_centre);
    assert_abs_diff_eq!(uvws[0].u - uvws[1].u, baselines[0].u, epsilon = 1e-9);
    assert_abs_diff_eq!(uvws[0].v - uvws[1].v, baselines[0].v, epsilon = 1e-9);
    assert_abs_diff_eq!(uvws[0].w - uvws[1].w, baselines[0].w, epsilon = 1e-9);
}
