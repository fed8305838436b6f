// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Code to handle writing out visibilities.

mod binary;
mod error;
mod ms;

pub(crate) use binary::{read_binary, BinaryFileSink};
pub(crate) use error::{FileWriteError, VisWriteError};
pub(crate) use ms::MeasurementSetSink;

use std::path::{Path, PathBuf};

use hifitime::{Duration, Epoch};
use itertools::Itertools;
use log::{debug, trace, warn};
use marlu::{LatLngHeight, RADec, XyzGeodetic, UVW};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};
use vec1::Vec1;

use crate::vis::VisBlock;

/// All write-supported visibility formats.
#[derive(Debug, Display, EnumIter, EnumString, Clone, Copy, PartialEq, Eq)]
pub(crate) enum VisOutputType {
    #[strum(serialize = "vis")]
    Binary,
    #[strum(serialize = "ms")]
    MeasurementSet,
}

lazy_static::lazy_static! {
    pub(crate) static ref VIS_OUTPUT_EXTENSIONS: String = VisOutputType::iter().join(", ");
}

/// Observation metadata the sinks need in order to lay out their headers.
#[derive(Debug, Clone)]
pub(crate) struct ObsMeta {
    pub(crate) num_channels: usize,
    pub(crate) total_times: usize,
    pub(crate) block_capacity: usize,

    /// The leading edge of the first time sample.
    pub(crate) start_time: Epoch,
    pub(crate) time_res: Duration,
    pub(crate) dut1: Duration,

    pub(crate) freq_start_hz: f64,
    pub(crate) freq_inc_hz: f64,

    pub(crate) write_autos: bool,

    pub(crate) phase_centre: RADec,
    pub(crate) array_position: LatLngHeight,
    pub(crate) station_positions: Vec<XyzGeodetic>,
    pub(crate) station_names: Vec<String>,
    pub(crate) baseline_pairs: Vec<(usize, usize)>,
}

impl ObsMeta {
    pub(crate) fn num_stations(&self) -> usize {
        self.station_positions.len()
    }

    pub(crate) fn num_baselines(&self) -> usize {
        self.baseline_pairs.len()
    }
}

/// A sink accepting completed, combined visibility blocks in block-index
/// order. Implementations create their header structures when the first
/// block arrives and must be finalised exactly once.
pub(crate) trait BlockSink: Send {
    fn write_block(&mut self, block: &VisBlock, block_index: usize) -> Result<(), VisWriteError>;

    /// Flush and close the sink, embedding the run's log text where the
    /// format supports it.
    fn finalise(&mut self, run_log: &str) -> Result<(), VisWriteError>;
}

/// Owns the lifetime of all output sinks plus a scratch buffer for
/// station-coordinate computation.
pub(crate) struct OutputHandles {
    pub(crate) writers: Vec<(PathBuf, Box<dyn BlockSink>)>,

    /// Station (u,v,w) scratch, used when computing baseline coordinates for
    /// a block.
    pub(crate) station_uvws: Vec<UVW>,
}

impl OutputHandles {
    pub(crate) fn new(
        outputs: &Vec1<(PathBuf, VisOutputType)>,
        meta: &ObsMeta,
    ) -> Result<OutputHandles, VisWriteError> {
        let mut writers: Vec<(PathBuf, Box<dyn BlockSink>)> = vec![];
        for (output, vis_type) in outputs {
            debug!("Setting up {} ({vis_type})", output.display());
            let writer: Box<dyn BlockSink> = match vis_type {
                VisOutputType::Binary => Box::new(BinaryFileSink::new(output, meta)?),
                VisOutputType::MeasurementSet => Box::new(MeasurementSetSink::new(output, meta)),
            };
            writers.push((output.clone(), writer));
        }

        Ok(OutputHandles {
            writers,
            station_uvws: vec![UVW::default(); meta.num_stations()],
        })
    }

    pub(crate) fn write_block(
        &mut self,
        block: &VisBlock,
        block_index: usize,
    ) -> Result<(), VisWriteError> {
        for (_, writer) in self.writers.iter_mut() {
            writer.write_block(block, block_index)?;
        }
        Ok(())
    }

    /// Finalise all sinks and return a neatly-formatted message reporting
    /// what was written.
    pub(crate) fn finalise(&mut self, run_log: &str) -> Result<String, VisWriteError> {
        for (_, writer) in self.writers.iter_mut() {
            writer.finalise(run_log)?;
        }
        debug!("Finished writing");

        Ok(if self.writers.len() == 1 {
            format!("Visibilities written to {}", self.writers[0].0.display())
        } else {
            format!(
                "Visibilities written to: {}",
                self.writers.iter().map(|(o, _)| o.display()).join(", ")
            )
        })
    }
}

/// Check if we are able to write to a file path. If we aren't able to write
/// to the file, it's either because the directory containing the file doesn't
/// exist, or there's another issue (probably bad permissions). In the former
/// case, create the parent directories, otherwise return an error.
/// Additionally, if the file exists, emit a warning that it will be
/// overwritten.
///
/// With this approach, we potentially avoid doing a whole simulation only to
/// be unable to write to a file at the end. This code _doesn't_ alter the
/// file if it exists.
pub(crate) fn can_write_to_file(file: &Path) -> Result<(), FileWriteError> {
    trace!("Testing whether we can write to {}", file.display());

    if file.is_dir() {
        let exists = can_write_to_dir(file)?;
        if exists {
            warn!("Will overwrite the existing directory '{}'", file.display());
        }
    } else {
        let exists = can_write_to_file_inner(file)?;
        if exists {
            warn!("Will overwrite the existing file '{}'", file.display());
        }
    }

    Ok(())
}

/// Iterate over all of the files and subdirectories of a directory and test
/// whether we can write to them. Note that testing whether directories are
/// writable is very weak; there's not even a reliable way of checking if
/// *your* user is able to write to a directory. Files are much more
/// rigorously tested.
fn can_write_to_dir(dir: &Path) -> Result<bool, FileWriteError> {
    let exists = dir.exists();

    let metadata = std::fs::metadata(dir)?;
    let permissions = metadata.permissions();
    if permissions.readonly() {
        return Err(FileWriteError::FileNotWritable {
            file: dir.display().to_string(),
        });
    }

    // Test whether every single entry in `dir` is writable.
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?.path();
        if entry.is_file() {
            can_write_to_file_inner(&entry)?;
        } else if entry.is_dir() {
            can_write_to_dir(&entry)?;
        }
    }

    Ok(exists)
}

fn can_write_to_file_inner(file: &Path) -> Result<bool, FileWriteError> {
    let file_exists = file.exists();

    match std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(file)
        .map_err(|e| e.kind())
    {
        // File is writable.
        Ok(_) => {
            // If the file in question didn't already exist, `OpenOptions::new`
            // creates it as part of its work. We don't want to keep the
            // 0-sized file; remove it if it didn't exist before.
            if !file_exists {
                std::fs::remove_file(file).map_err(FileWriteError::IO)?;
            }
        }

        // File doesn't exist. Attempt to make the directories leading up to
        // the file; if this fails, then we can't write the file anyway.
        Err(std::io::ErrorKind::NotFound) => {
            if let Some(p) = file.parent() {
                match std::fs::DirBuilder::new()
                    .recursive(true)
                    .create(p)
                    .map_err(|e| e.kind())
                {
                    Ok(()) => (),
                    Err(std::io::ErrorKind::PermissionDenied) => {
                        return Err(FileWriteError::NewDirectory(p.to_path_buf()))
                    }
                    Err(e) => return Err(FileWriteError::IO(e.into())),
                }
            }
        }

        Err(std::io::ErrorKind::PermissionDenied) => {
            return Err(FileWriteError::FileNotWritable {
                file: file.display().to_string(),
            })
        }

        Err(e) => {
            return Err(FileWriteError::IO(e.into()));
        }
    }

    Ok(file_exists)
}
