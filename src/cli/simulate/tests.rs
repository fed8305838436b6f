// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::io::Write;

use indoc::indoc;
use tempfile::{Builder, NamedTempFile};

use super::*;
use crate::cli::VisgenError;

fn station_layout_file() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "0.0 0.0 0.0").unwrap();
    writeln!(file, "100.0 0.0 0.0").unwrap();
    writeln!(file, "0.0 100.0 0.0").unwrap();
    file.flush().unwrap();
    file
}

fn settings_file(contents: &str) -> NamedTempFile {
    let mut file = Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn cli_args_override_the_settings_file() {
    let layout = station_layout_file();
    let settings = settings_file(indoc! {r#"
        [simulate]
        ra = 10.0
        dec = -27.0
        num_timesteps = 4
        num_channels = 2
    "#});

    let mut args = SimulateArgs {
        settings_file: Some(settings.path().to_path_buf()),
        simulate_args: SimulateCliArgs {
            station_layout: Some(layout.path().to_path_buf()),
            num_timesteps: Some(9),
            ..Default::default()
        },
    };
    args = args.merge().unwrap();

    // The CLI's 9 time steps win; the file's channel count is kept.
    assert_eq!(args.simulate_args.num_timesteps, Some(9));
    assert_eq!(args.simulate_args.num_channels, Some(2));
    assert_eq!(args.simulate_args.ra, Some(10.0));

    let dir = tempfile::tempdir().unwrap();
    args.simulate_args.outputs = Some(vec![dir.path().join("model.vis")]);
    let params = args.parse().unwrap();
    assert_eq!(params.plan.total_times, 9);
    assert_eq!(params.plan.num_channels, 2);
    assert_eq!(params.telescope.num_stations(), 3);
}

#[test]
fn missing_station_layout_is_a_config_error() {
    let args = SimulateArgs {
        settings_file: None,
        simulate_args: SimulateCliArgs {
            ra: Some(0.0),
            dec: Some(-27.0),
            ..Default::default()
        },
    };
    let result = args.parse();
    assert!(matches!(result, Err(VisgenError::Config(_))));
}

#[test]
fn phase_centre_requires_both_coordinates() {
    let layout = station_layout_file();
    let args = SimulateArgs {
        settings_file: None,
        simulate_args: SimulateCliArgs {
            station_layout: Some(layout.path().to_path_buf()),
            ra: Some(10.0),
            ..Default::default()
        },
    };
    let err = args.parse().unwrap_err();
    assert!(err.to_string().contains("RA and Dec"));
}

#[test]
fn invalid_output_extension_is_rejected() {
    let layout = station_layout_file();
    let args = SimulateArgs {
        settings_file: None,
        simulate_args: SimulateCliArgs {
            station_layout: Some(layout.path().to_path_buf()),
            ra: Some(10.0),
            dec: Some(-27.0),
            outputs: Some(vec![PathBuf::from("model.uvfits")]),
            ..Default::default()
        },
    };
    let err = args.parse().unwrap_err();
    assert!(err.to_string().contains("unrecognised output file extension"));
}

#[test]
fn single_thread_needs_one_device() {
    let layout = station_layout_file();
    let dir = tempfile::tempdir().unwrap();
    let args = SimulateArgs {
        settings_file: None,
        simulate_args: SimulateCliArgs {
            station_layout: Some(layout.path().to_path_buf()),
            ra: Some(10.0),
            dec: Some(-27.0),
            num_devices: Some(2),
            single_thread: true,
            outputs: Some(vec![dir.path().join("model.vis")]),
            ..Default::default()
        },
    };
    let err = args.parse().unwrap_err();
    assert!(err.to_string().contains("--single-thread"));
}

#[test]
fn noise_is_only_enabled_with_an_rms() {
    let layout = station_layout_file();
    let dir = tempfile::tempdir().unwrap();
    let make_args = |noise_rms| SimulateArgs {
        settings_file: None,
        simulate_args: SimulateCliArgs {
            station_layout: Some(layout.path().to_path_buf()),
            ra: Some(10.0),
            dec: Some(-27.0),
            noise_rms,
            noise_seed: Some(123),
            outputs: Some(vec![dir.path().join("model.vis")]),
            ..Default::default()
        },
    };

    let params = make_args(None).parse().unwrap();
    assert!(params.plan.noise.is_none());

    let params = make_args(Some(0.1)).parse().unwrap();
    let noise = params.plan.noise.unwrap();
    assert_eq!(noise.seed, 123);
    assert!((noise.rms_jy - 0.1).abs() < f64::EPSILON);
}

#[test]
fn bad_settings_file_extension_is_rejected() {
    let mut file = Builder::new().suffix(".yaml").tempfile().unwrap();
    writeln!(file, "simulate: {{}}").unwrap();
    let args = SimulateArgs {
        settings_file: Some(file.path().to_path_buf()),
        simulate_args: SimulateCliArgs::default(),
    };
    let err = args.merge().unwrap_err();
    assert!(err.to_string().contains("recognised extension"));
}
