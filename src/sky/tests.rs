// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::io::Write;

use approx::assert_abs_diff_eq;
use marlu::RADec;

use super::*;

fn test_sources(n: usize) -> Vec<Source> {
    (0..n)
        .map(|i| Source {
            radec: RADec::from_degrees(10.0 + i as f64, -26.0),
            flux_i: 1.0 + i as f64,
            spectral_index: -0.7,
            ref_freq_hz: 150e6,
        })
        .collect()
}

#[test]
fn chunking_respects_max_sources() {
    let sources = test_sources(10);
    let phase_centre = RADec::from_degrees(10.0, -26.0);

    let chunks = SkyModel::chunk_sources(&sources, phase_centre, 4);
    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[0].num_sources(), 4);
    assert_eq!(chunks[1].num_sources(), 4);
    assert_eq!(chunks[2].num_sources(), 2);

    // No sources, no chunks.
    let chunks = SkyModel::chunk_sources(&[], phase_centre, 4);
    assert!(chunks.is_empty());
}

#[test]
fn flux_scaling_recomputes_from_reference() {
    let sources = test_sources(1);
    let phase_centre = RADec::from_degrees(10.0, -26.0);
    let mut sky = SkyModel::chunk_sources(&sources, phase_centre, 16).swap_remove(0);

    // At the reference frequency nothing changes, no matter how many times
    // the scaling has run before.
    sky.scale_flux_with_frequency(300e6);
    sky.scale_flux_with_frequency(150e6);
    assert_abs_diff_eq!(sky.flux_i[0], 1.0, epsilon = 1e-12);

    sky.scale_flux_with_frequency(300e6);
    assert_abs_diff_eq!(sky.flux_i[0], 2.0_f64.powf(-0.7), epsilon = 1e-12);
}

#[test]
fn horizon_clip_splits_the_sky() {
    // A source at the pole is always up from a southern site; its antipode
    // never is.
    let sources = [
        Source {
            radec: RADec::from_degrees(0.0, -90.0),
            flux_i: 1.0,
            spectral_index: 0.0,
            ref_freq_hz: 150e6,
        },
        Source {
            radec: RADec::from_degrees(0.0, 90.0),
            flux_i: 2.0,
            spectral_index: 0.0,
            ref_freq_hz: 150e6,
        },
    ];
    let phase_centre = RADec::from_degrees(0.0, -90.0);
    let sky = SkyModel::chunk_sources(&sources, phase_centre, 16).swap_remove(0);

    let mut clipped = SkyModel::with_capacity(2);
    let mut azels = vec![];
    let latitude_rad = (-30.0_f64).to_radians();
    sky.horizon_clip(0.0, latitude_rad, &mut clipped, &mut azels);

    assert_eq!(clipped.num_sources(), 1);
    assert_eq!(azels.len(), 1);
    assert_abs_diff_eq!(clipped.flux_i[0], 1.0);
    assert!(azels[0].el > 0.0);
}

#[test]
fn read_source_list_handles_defaults_and_comments() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "# a comment line").unwrap();
    writeln!(file, "10.0 -26.0 3.5").unwrap();
    writeln!(file, "11.0 -27.0 1.0 -0.8").unwrap();
    writeln!(file, "12.0 -28.0 2.0 -0.7 200e6  # trailing comment").unwrap();
    file.flush().unwrap();

    let sources = read_source_list(file.path(), 150e6).unwrap();
    assert_eq!(sources.len(), 3);
    assert_abs_diff_eq!(sources[0].spectral_index, 0.0);
    assert_abs_diff_eq!(sources[0].ref_freq_hz, 150e6);
    assert_abs_diff_eq!(sources[1].spectral_index, -0.8);
    assert_abs_diff_eq!(sources[2].ref_freq_hz, 200e6);
}

#[test]
fn read_source_list_rejects_bad_lines() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "10.0 -26.0").unwrap();
    file.flush().unwrap();
    let result = read_source_list(file.path(), 150e6);
    assert!(matches!(
        result,
        Err(ReadSourceListError::MissingFields { line_num: 1, .. })
    ));

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "10.0 south 3.0").unwrap();
    file.flush().unwrap();
    let result = read_source_list(file.path(), 150e6);
    assert!(matches!(result, Err(ReadSourceListError::BadField { .. })));
}
