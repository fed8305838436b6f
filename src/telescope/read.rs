// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Reading in station layouts.
//!
//! A station layout is plain text: one station per line as local-geodetic
//! `x y z` offsets from the array centre \[metres\], with `#` starting a
//! comment.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use log::debug;
use marlu::XyzGeodetic;
use thiserror::Error;

pub(crate) fn read_station_layout(path: &Path) -> Result<Vec<XyzGeodetic>, ReadTelescopeError> {
    debug!("Reading station layout {}", path.display());
    let file = File::open(path).map_err(|e| ReadTelescopeError::Io {
        path: path.to_path_buf(),
        err: e,
    })?;

    let mut stations = vec![];
    for (i_line, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| ReadTelescopeError::Io {
            path: path.to_path_buf(),
            err: e,
        })?;
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 3 {
            return Err(ReadTelescopeError::WrongFieldCount {
                line_num: i_line + 1,
                num: fields.len(),
            });
        }
        let parse = |field: &str| {
            field
                .parse::<f64>()
                .map_err(|_| ReadTelescopeError::BadField {
                    line_num: i_line + 1,
                    field: field.to_string(),
                })
        };
        stations.push(XyzGeodetic {
            x: parse(fields[0])?,
            y: parse(fields[1])?,
            z: parse(fields[2])?,
        });
    }

    if stations.len() < 2 {
        return Err(ReadTelescopeError::TooFewStations {
            num: stations.len(),
        });
    }
    debug!("Read {} stations", stations.len());
    Ok(stations)
}

#[derive(Error, Debug)]
pub(crate) enum ReadTelescopeError {
    #[error("Station layout line {line_num}: expected 3 fields, found {num}")]
    WrongFieldCount { line_num: usize, num: usize },

    #[error("Station layout line {line_num}: couldn't parse '{field}' as a number")]
    BadField { line_num: usize, field: String },

    #[error("A station layout needs at least 2 stations; found {num}")]
    TooFewStations { num: usize },

    #[error("Couldn't read station layout {path}: {err}")]
    Io {
        path: PathBuf,
        err: std::io::Error,
    },
}
