// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Simulate visibilities from a sky-model source list and a station layout.

#[cfg(test)]
mod tests;

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use clap::Parser;
use console::style;
use hifitime::{Duration, Epoch};
use log::{debug, info, trace, warn};
use marlu::{LatLngHeight, RADec};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use vec1::Vec1;

use super::VisgenError;
use crate::beam::{Beam, GaussianBeam, NoBeam};
use crate::constants::{DEFAULT_BLOCK_LENGTH, DEFAULT_MAX_SOURCES_PER_CHUNK};
use crate::io::write::{can_write_to_file, VisOutputType, VIS_OUTPUT_EXTENSIONS};
use crate::noise::NoiseParams;
use crate::params::SimulateParams;
use crate::sim::SimulationPlan;
use crate::sky::{read_source_list, SkyModel};
use crate::telescope::{read_station_layout, PolMode, TelescopeModel};

const DEFAULT_OUTPUT_VIS_FILENAME: &str = "model.vis";
const DEFAULT_NUM_CHANNELS: usize = 16;
const DEFAULT_FREQ_RES_KHZ: f64 = 80.0;
const DEFAULT_START_FREQ_MHZ: f64 = 150.0;
const DEFAULT_NUM_TIMESTEPS: usize = 8;
const DEFAULT_TIME_RES_SECONDS: f64 = 8.0;
const DEFAULT_START_TIME_GPS: f64 = 1_000_000_000.0;
const DEFAULT_NOISE_SEED: u64 = 1;

lazy_static::lazy_static! {
    static ref NUM_CHANNELS_HELP: String =
        format!("The number of frequency channels to simulate. Default: {DEFAULT_NUM_CHANNELS}");

    static ref FREQ_RES_HELP: String =
        format!("The channel frequency resolution [kHz]. Default: {DEFAULT_FREQ_RES_KHZ}");

    static ref START_FREQ_HELP: String =
        format!("The first channel's centre frequency [MHz]. Default: {DEFAULT_START_FREQ_MHZ}");

    static ref NUM_TIMESTEPS_HELP: String =
        format!("The number of time steps to simulate. Default: {DEFAULT_NUM_TIMESTEPS}");

    static ref TIME_RES_HELP: String =
        format!("The time resolution [seconds]. Default: {DEFAULT_TIME_RES_SECONDS}");

    static ref START_TIME_HELP: String =
        format!("The observation start time [GPS seconds]. Default: {DEFAULT_START_TIME_GPS}");

    static ref BLOCK_LENGTH_HELP: String =
        format!("The maximum number of time samples per visibility block. Default: {DEFAULT_BLOCK_LENGTH}");

    static ref MAX_SOURCES_HELP: String =
        format!("The maximum number of sky-model sources per chunk. Default: {DEFAULT_MAX_SOURCES_PER_CHUNK}");

    static ref OUTPUTS_HELP: String =
        format!("Paths to the output visibility files. Supported formats: {}. Default: {}", *VIS_OUTPUT_EXTENSIONS, DEFAULT_OUTPUT_VIS_FILENAME);

    static ref SETTINGS_FILE_HELP: String =
        "All of the arguments to simulate may be specified in a .toml or .json file. Any CLI arguments override parameters set in the file.".to_string();
}

#[derive(Parser, Debug, Clone, Default, Serialize, Deserialize)]
pub(super) struct SimulateCliArgs {
    /// Path to the station layout file (one `x y z` offset per line,
    /// metres).
    #[clap(short = 't', long, parse(from_str), help_heading = "TELESCOPE")]
    pub(super) station_layout: Option<PathBuf>,

    #[clap(
        long, help_heading = "TELESCOPE",
        number_of_values = 3,
        allow_hyphen_values = true,
        value_names = &["LONG_DEG", "LAT_DEG", "HEIGHT_M"]
    )]
    /// The Earth position of the array. Default: the MWA site.
    pub(super) array_position: Option<Vec<f64>>,

    /// The polarisation mode, "scalar" or "full". Full polarisation
    /// evaluates and applies parallactic-angle rotation. Default: scalar.
    #[clap(long, help_heading = "TELESCOPE")]
    pub(super) pol_mode: Option<String>,

    /// Use an analytic Gaussian station beam with this full-width
    /// half-maximum [degrees]. If not specified, no beam is applied.
    #[clap(long, help_heading = "TELESCOPE")]
    pub(super) beam_fwhm_deg: Option<f64>,

    /// The phase centre right ascension [degrees].
    #[clap(short, long, help_heading = "OBSERVATION PARAMETERS")]
    pub(super) ra: Option<f64>,

    /// The phase centre declination [degrees].
    #[clap(short, long, help_heading = "OBSERVATION PARAMETERS")]
    pub(super) dec: Option<f64>,

    #[clap(
        short = 'c',
        long,
        help = NUM_CHANNELS_HELP.as_str(),
        help_heading = "OBSERVATION PARAMETERS"
    )]
    pub(super) num_channels: Option<usize>,

    #[clap(
        short,
        long,
        help = FREQ_RES_HELP.as_str(),
        help_heading = "OBSERVATION PARAMETERS"
    )]
    pub(super) freq_res: Option<f64>,

    #[clap(long, help = START_FREQ_HELP.as_str(), help_heading = "OBSERVATION PARAMETERS")]
    pub(super) start_freq: Option<f64>,

    #[clap(
        short = 'n',
        long,
        help = NUM_TIMESTEPS_HELP.as_str(),
        help_heading = "OBSERVATION PARAMETERS"
    )]
    pub(super) num_timesteps: Option<usize>,

    #[clap(long, help = TIME_RES_HELP.as_str(), help_heading = "OBSERVATION PARAMETERS")]
    pub(super) time_res: Option<f64>,

    #[clap(long, help = START_TIME_HELP.as_str(), help_heading = "OBSERVATION PARAMETERS")]
    pub(super) start_time_gps: Option<f64>,

    /// Use this value as the DUT1 [seconds]. Default: 0.
    #[clap(long, help_heading = "OBSERVATION PARAMETERS")]
    #[serde(default)]
    pub(super) dut1: Option<f64>,

    /// Path to the sky-model source list. If not specified, an empty sky is
    /// simulated.
    #[clap(short, long, parse(from_str), help_heading = "SKY MODEL")]
    pub(super) source_list: Option<PathBuf>,

    #[clap(long, help = MAX_SOURCES_HELP.as_str(), help_heading = "SKY MODEL")]
    pub(super) max_sources_per_chunk: Option<usize>,

    /// Filter sources below the horizon at each time step.
    #[clap(long, help_heading = "SKY MODEL")]
    #[serde(default)]
    pub(super) horizon_clip: bool,

    /// Exclude sources with Stokes I flux densities below this value [Jy].
    #[clap(long, help_heading = "SKY MODEL")]
    pub(super) flux_filter_min: Option<f64>,

    /// Exclude sources with Stokes I flux densities above this value [Jy].
    #[clap(long, help_heading = "SKY MODEL")]
    pub(super) flux_filter_max: Option<f64>,

    #[clap(long, help = BLOCK_LENGTH_HELP.as_str(), help_heading = "INTERFEROMETER")]
    pub(super) block_length: Option<usize>,

    /// The number of compute devices to simulate with. Default: 1.
    #[clap(long, help_heading = "INTERFEROMETER")]
    pub(super) num_devices: Option<usize>,

    /// Run compute and output sequentially on a single thread rather than in
    /// a worker pool. Requires exactly one device.
    #[clap(long, help_heading = "INTERFEROMETER")]
    #[serde(default)]
    pub(super) single_thread: bool,

    /// Include auto-correlations in the output. Default: don't include
    /// autos.
    #[clap(long, help_heading = "INTERFEROMETER")]
    #[serde(default)]
    pub(super) write_autos: bool,

    /// Add uncorrelated system noise with this per-polarisation RMS [Jy].
    #[clap(long, help_heading = "SYSTEM NOISE")]
    pub(super) noise_rms: Option<f64>,

    /// The seed for the system-noise generator. Re-running with the same
    /// seed reproduces identical noise. Default: 1.
    #[clap(long, help_heading = "SYSTEM NOISE")]
    pub(super) noise_seed: Option<u64>,

    #[clap(
        short = 'o',
        long,
        multiple_values(true),
        help = OUTPUTS_HELP.as_str(),
        help_heading = "OUTPUT FILES"
    )]
    pub(super) outputs: Option<Vec<PathBuf>>,
}

#[derive(Parser, Debug, Clone, Default, Serialize, Deserialize)]
pub(super) struct SimulateArgs {
    #[clap(name = "SETTINGS_FILE", help = SETTINGS_FILE_HELP.as_str(), parse(from_os_str))]
    #[serde(skip)]
    pub(super) settings_file: Option<PathBuf>,

    #[clap(flatten)]
    #[serde(rename = "simulate")]
    #[serde(default)]
    pub(super) simulate_args: SimulateCliArgs,
}

impl SimulateArgs {
    /// Both command-line and settings-file arguments overlap in terms of
    /// what is available; this function consolidates everything that was
    /// specified into a single struct. Where applicable, it will prefer CLI
    /// parameters over those in the file.
    ///
    /// This function should only ever merge arguments, and not try to make
    /// sense of them.
    pub(super) fn merge(self) -> Result<SimulateArgs, VisgenError> {
        debug!("Merging command-line arguments with the settings file");

        let cli_args = self;

        if let Some(settings_file) = cli_args.settings_file {
            // Read in the file arguments.
            let SimulateArgs {
                settings_file: _,
                simulate_args,
            } = unpack_settings_file(&settings_file)?;

            // Merge all the arguments, preferring the CLI args when
            // available.
            Ok(SimulateArgs {
                settings_file: None,
                simulate_args: cli_args.simulate_args.merge(simulate_args),
            })
        } else {
            Ok(cli_args)
        }
    }

    fn parse(self) -> Result<SimulateParams, VisgenError> {
        debug!("{:#?}", self);

        // Expose all the struct fields to ensure they're all used.
        let SimulateArgs {
            settings_file: _,
            simulate_args:
                SimulateCliArgs {
                    station_layout,
                    array_position,
                    pol_mode,
                    beam_fwhm_deg,
                    ra,
                    dec,
                    num_channels,
                    freq_res,
                    start_freq,
                    num_timesteps,
                    time_res,
                    start_time_gps,
                    dut1,
                    source_list,
                    max_sources_per_chunk,
                    horizon_clip,
                    flux_filter_min,
                    flux_filter_max,
                    block_length,
                    num_devices,
                    single_thread,
                    write_autos,
                    noise_rms,
                    noise_seed,
                    outputs,
                },
        } = self;

        // The telescope model.
        let station_layout = station_layout.ok_or(SimulateArgsError::NoStationLayout)?;
        let station_positions = read_station_layout(&station_layout)?;
        let array_position = match array_position {
            Some(v) => {
                if v.len() != 3 {
                    return Err(SimulateArgsError::BadArrayPosition { pos: v }.into());
                }
                LatLngHeight {
                    longitude_rad: v[0].to_radians(),
                    latitude_rad: v[1].to_radians(),
                    height_metres: v[2],
                }
            }
            None => LatLngHeight::mwa(),
        };
        let pol_mode = match pol_mode.as_deref() {
            None | Some("scalar") => PolMode::Scalar,
            Some("full") => PolMode::Full,
            Some(other) => return Err(SimulateArgsError::BadPolMode(other.to_string()).into()),
        };

        // The phase centre.
        let phase_centre = match (ra, dec) {
            (Some(ra), Some(dec)) => {
                // Verify that the input coordinates are sensible.
                if !(0.0..=360.0).contains(&ra) {
                    return Err(SimulateArgsError::RaInvalid.into());
                }
                if !(-90.0..=90.0).contains(&dec) {
                    return Err(SimulateArgsError::DecInvalid.into());
                }
                RADec::from_degrees(ra, dec)
            }
            (None, None) => return Err(SimulateArgsError::NoPhaseCentre.into()),
            _ => return Err(SimulateArgsError::OnlyOneRAOrDec.into()),
        };

        let telescope = TelescopeModel::new(station_positions, array_position, phase_centre, pol_mode);
        info!("{}", style("Telescope").bold());
        info!(
            "  {} stations ({} baselines), {:?} polarisation",
            telescope.num_stations(),
            telescope.num_baselines(),
            telescope.pol_mode
        );
        info!(
            "  Array position: {:>8.4}° {:>8.4}° {:.4}m",
            array_position.longitude_rad.to_degrees(),
            array_position.latitude_rad.to_degrees(),
            array_position.height_metres
        );
        info!(
            "  Phase centre:   {:>8.4}° {:>8.4}° (J2000)",
            phase_centre.ra.to_degrees(),
            phase_centre.dec.to_degrees()
        );

        // Time axis.
        let total_times = num_timesteps.unwrap_or(DEFAULT_NUM_TIMESTEPS);
        if total_times == 0 {
            return Err(SimulateArgsError::ZeroTimeSteps.into());
        }
        let time_res = Duration::from_seconds(time_res.unwrap_or(DEFAULT_TIME_RES_SECONDS));
        let start_time =
            Epoch::from_gpst_seconds(start_time_gps.unwrap_or(DEFAULT_START_TIME_GPS));
        let dut1 = Duration::from_seconds(dut1.unwrap_or_default());
        info!("{}", style("Observation").bold());
        info!(
            "  Time axis: {total_times} steps of {time_res}, starting GPS {:.3}",
            start_time.to_gpst_seconds()
        );

        // Frequency axis.
        let num_channels = num_channels.unwrap_or(DEFAULT_NUM_CHANNELS);
        if num_channels == 0 {
            return Err(SimulateArgsError::ZeroChannels.into());
        }
        let freq_res = freq_res.unwrap_or(DEFAULT_FREQ_RES_KHZ);
        if freq_res < f64::EPSILON {
            return Err(SimulateArgsError::ChannelWidthTooSmall.into());
        }
        let freq_start_hz = start_freq.unwrap_or(DEFAULT_START_FREQ_MHZ) * 1e6; // MHz -> Hz
        let freq_inc_hz = freq_res * 1e3; // kHz -> Hz
        info!(
            "  Frequency axis: {num_channels} channels of {:.2} kHz from {:.3} MHz",
            freq_inc_hz / 1e3,
            freq_start_hz / 1e6
        );

        // The sky model.
        let max_sources_per_chunk = NonZeroUsize::new(
            max_sources_per_chunk.unwrap_or(DEFAULT_MAX_SOURCES_PER_CHUNK),
        )
        .ok_or(SimulateArgsError::ZeroSourcesPerChunk)?;
        let sky_chunks = match source_list {
            Some(source_list) => {
                let sources = read_source_list(&source_list, freq_start_hz)?;
                info!("Sky model: {} sources", sources.len());
                SkyModel::chunk_sources(&sources, phase_centre, max_sources_per_chunk.get())
            }
            None => {
                warn!("No source list supplied; simulating an empty sky");
                vec![]
            }
        };

        // The station beam.
        let beam: Box<dyn Beam> = match beam_fwhm_deg {
            Some(fwhm_deg) => {
                info!("Station beam: Gaussian, FWHM {fwhm_deg}° at {:.3} MHz", freq_start_hz / 1e6);
                Box::new(GaussianBeam {
                    fwhm_rad: fwhm_deg.to_radians(),
                    ref_freq_hz: freq_start_hz,
                })
            }
            None => {
                info!("Station beam: none");
                Box::new(NoBeam)
            }
        };

        // Scheduling.
        let block_length = NonZeroUsize::new(block_length.unwrap_or(DEFAULT_BLOCK_LENGTH))
            .ok_or(SimulateArgsError::ZeroBlockLength)?;
        let num_devices =
            NonZeroUsize::new(num_devices.unwrap_or(1)).ok_or(SimulateArgsError::ZeroDevices)?;
        if single_thread && num_devices.get() != 1 {
            return Err(SimulateArgsError::SingleThreadNeedsOneDevice {
                num_devices: num_devices.get(),
            }
            .into());
        }

        // System noise.
        let noise = noise_rms.map(|rms_jy| NoiseParams {
            seed: noise_seed.unwrap_or(DEFAULT_NOISE_SEED),
            rms_jy,
        });

        // Work out the output formats from the file extensions, and whether
        // we can write to them.
        let outputs = outputs
            .unwrap_or_else(|| vec![PathBuf::from(DEFAULT_OUTPUT_VIS_FILENAME)])
            .into_iter()
            .map(|path| {
                let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
                match VisOutputType::from_str(ext) {
                    Ok(vis_type) => {
                        trace!("{} is a {vis_type} output", path.display());
                        can_write_to_file(&path)?;
                        Ok((path, vis_type))
                    }
                    Err(_) => {
                        Err(VisgenError::from(SimulateArgsError::InvalidOutputFormat(path)))
                    }
                }
            })
            .collect::<Result<Vec<_>, VisgenError>>()?;
        let outputs =
            Vec1::try_from_vec(outputs).map_err(|_| SimulateArgsError::NoOutputSpecified)?;

        let plan = SimulationPlan {
            total_times,
            block_length,
            num_channels,
            start_time,
            time_res,
            dut1,
            freq_start_hz,
            freq_inc_hz,
            num_devices,
            single_thread,
            horizon_clip,
            flux_filter_min_jy: flux_filter_min.unwrap_or(f64::MIN),
            flux_filter_max_jy: flux_filter_max.unwrap_or(f64::MAX),
            write_autos,
            max_sources_per_chunk,
            noise,
        };
        info!(
            "Simulating {} visibility block(s) on {} device(s)",
            plan.num_vis_blocks(),
            plan.num_devices
        );

        Ok(SimulateParams {
            plan,
            sky_chunks,
            telescope,
            beam,
            outputs,
        })
    }

    pub(super) fn run(self, dry_run: bool) -> Result<(), VisgenError> {
        debug!("Converting arguments into parameters");
        trace!("{:#?}", self);
        let params = self.parse()?;

        if dry_run {
            info!("Dry run -- exiting now.");
            return Ok(());
        }

        params.run()?;
        Ok(())
    }
}

impl SimulateCliArgs {
    fn merge(self, other: Self) -> Self {
        Self {
            station_layout: self.station_layout.or(other.station_layout),
            array_position: self.array_position.or(other.array_position),
            pol_mode: self.pol_mode.or(other.pol_mode),
            beam_fwhm_deg: self.beam_fwhm_deg.or(other.beam_fwhm_deg),
            ra: self.ra.or(other.ra),
            dec: self.dec.or(other.dec),
            num_channels: self.num_channels.or(other.num_channels),
            freq_res: self.freq_res.or(other.freq_res),
            start_freq: self.start_freq.or(other.start_freq),
            num_timesteps: self.num_timesteps.or(other.num_timesteps),
            time_res: self.time_res.or(other.time_res),
            start_time_gps: self.start_time_gps.or(other.start_time_gps),
            dut1: self.dut1.or(other.dut1),
            source_list: self.source_list.or(other.source_list),
            max_sources_per_chunk: self.max_sources_per_chunk.or(other.max_sources_per_chunk),
            horizon_clip: self.horizon_clip || other.horizon_clip,
            flux_filter_min: self.flux_filter_min.or(other.flux_filter_min),
            flux_filter_max: self.flux_filter_max.or(other.flux_filter_max),
            block_length: self.block_length.or(other.block_length),
            num_devices: self.num_devices.or(other.num_devices),
            single_thread: self.single_thread || other.single_thread,
            write_autos: self.write_autos || other.write_autos,
            noise_rms: self.noise_rms.or(other.noise_rms),
            noise_seed: self.noise_seed.or(other.noise_seed),
            outputs: self.outputs.or(other.outputs),
        }
    }
}

/// Read a settings file into the same structure the CLI arguments use.
fn unpack_settings_file(path: &Path) -> Result<SimulateArgs, SimulateArgsError> {
    if !path.exists() {
        return Err(SimulateArgsError::SettingsFileDoesntExist(
            path.to_path_buf().into_boxed_path(),
        ));
    }
    debug!("Reading settings file {}", path.display());
    let contents = std::fs::read_to_string(path)?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => {
            trace!("Parsing toml settings file");
            toml::from_str(&contents).map_err(|err| SimulateArgsError::TomlParse {
                file: path.display().to_string(),
                err,
            })
        }
        Some("json") => {
            trace!("Parsing json settings file");
            serde_json::from_str(&contents).map_err(|err| SimulateArgsError::JsonParse {
                file: path.display().to_string(),
                err,
            })
        }
        _ => Err(SimulateArgsError::UnhandledSettingsFileExt(
            path.display().to_string(),
        )),
    }
}

#[derive(Error, Debug)]
pub(crate) enum SimulateArgsError {
    #[error("No station layout file was supplied")]
    NoStationLayout,

    #[error("Settings file '{0}' doesn't exist")]
    SettingsFileDoesntExist(Box<Path>),

    #[error("Settings file '{0}' doesn't have a recognised extension (.toml or .json)")]
    UnhandledSettingsFileExt(String),

    #[error("Couldn't parse toml settings file '{file}': {err}")]
    TomlParse {
        file: String,
        err: toml::de::Error,
    },

    #[error("Couldn't parse json settings file '{file}': {err}")]
    JsonParse {
        file: String,
        err: serde_json::Error,
    },

    #[error("Unrecognised polarisation mode '{0}'; expected 'scalar' or 'full'")]
    BadPolMode(String),

    #[error("No phase centre was supplied; use --ra and --dec")]
    NoPhaseCentre,

    #[error("Right Ascension was not within 0 to 360!")]
    RaInvalid,

    #[error("Declination was not within -90 to 90!")]
    DecInvalid,

    #[error("One of RA and Dec was specified, but none or both are required!")]
    OnlyOneRAOrDec,

    #[error("Number of time steps cannot be 0!")]
    ZeroTimeSteps,

    #[error("Number of channels cannot be 0!")]
    ZeroChannels,

    #[error("The channel frequency resolution cannot be 0 or negative!")]
    ChannelWidthTooSmall,

    #[error("The maximum number of sources per chunk cannot be 0!")]
    ZeroSourcesPerChunk,

    #[error("The block length cannot be 0!")]
    ZeroBlockLength,

    #[error("The number of devices cannot be 0!")]
    ZeroDevices,

    #[error("--single-thread requires exactly one device, but {num_devices} were requested")]
    SingleThreadNeedsOneDevice { num_devices: usize },

    #[error("Array position specified as {pos:?}, not [<Longitude>, <Latitude>, <Height>]")]
    BadArrayPosition { pos: Vec<f64> },

    #[error("'{0}' has an unrecognised output file extension")]
    InvalidOutputFormat(PathBuf),

    #[error("No output file specified")]
    NoOutputSpecified,

    #[error(transparent)]
    IO(#[from] std::io::Error),
}
