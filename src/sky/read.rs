// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Reading in sky-model source lists.
//!
//! The source-list format is plain text: one source per line as
//! `ra_deg dec_deg stokes_I_jy [spectral_index [ref_freq_hz]]`, with `#`
//! starting a comment. The default spectral index is 0 (flat spectrum) and
//! the default reference frequency is the run's first channel frequency.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use log::debug;
use marlu::RADec;
use thiserror::Error;

use super::Source;

pub(crate) fn read_source_list(
    path: &Path,
    default_ref_freq_hz: f64,
) -> Result<Vec<Source>, ReadSourceListError> {
    debug!("Reading source list {}", path.display());
    let file = File::open(path).map_err(|e| ReadSourceListError::Io {
        path: path.to_path_buf(),
        err: e,
    })?;

    let mut sources = vec![];
    for (i_line, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| ReadSourceListError::Io {
            path: path.to_path_buf(),
            err: e,
        })?;
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 {
            return Err(ReadSourceListError::MissingFields {
                line_num: i_line + 1,
                num: fields.len(),
            });
        }
        let parse = |field: &str| {
            field
                .parse::<f64>()
                .map_err(|_| ReadSourceListError::BadField {
                    line_num: i_line + 1,
                    field: field.to_string(),
                })
        };

        let ra_deg = parse(fields[0])?;
        let dec_deg = parse(fields[1])?;
        let flux_i = parse(fields[2])?;
        let spectral_index = fields.get(3).map(|f| parse(f)).transpose()?.unwrap_or(0.0);
        let ref_freq_hz = fields
            .get(4)
            .map(|f| parse(f))
            .transpose()?
            .unwrap_or(default_ref_freq_hz);

        if !(0.0..=360.0).contains(&ra_deg) {
            return Err(ReadSourceListError::RaInvalid {
                line_num: i_line + 1,
            });
        }
        if !(-90.0..=90.0).contains(&dec_deg) {
            return Err(ReadSourceListError::DecInvalid {
                line_num: i_line + 1,
            });
        }

        sources.push(Source {
            radec: RADec::from_degrees(ra_deg, dec_deg),
            flux_i,
            spectral_index,
            ref_freq_hz,
        });
    }

    debug!("Read {} sources", sources.len());
    Ok(sources)
}

#[derive(Error, Debug)]
pub(crate) enum ReadSourceListError {
    #[error("Source list line {line_num}: couldn't parse '{field}' as a number")]
    BadField { line_num: usize, field: String },

    #[error("Source list line {line_num}: expected at least 3 fields, found {num}")]
    MissingFields { line_num: usize, num: usize },

    #[error("Source list line {line_num}: Right Ascension was not within 0 to 360!")]
    RaInvalid { line_num: usize },

    #[error("Source list line {line_num}: Declination was not within -90 to 90!")]
    DecInvalid { line_num: usize },

    #[error("Couldn't read source list {path}: {err}")]
    Io {
        path: PathBuf,
        err: std::io::Error,
    },
}
