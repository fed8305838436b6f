// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error type for all visgen-related errors. This should be the *only* error
//! enum that is publicly visible.

use thiserror::Error;

use super::simulate::SimulateArgsError;
use crate::io::write::{FileWriteError, VisWriteError};
use crate::sim::SimulateError;
use crate::sky::ReadSourceListError;
use crate::telescope::ReadTelescopeError;

/// The *only* publicly visible error from visgen.
#[derive(Error, Debug)]
pub enum VisgenError {
    /// An error while interpreting arguments or the settings file.
    #[error("{0}")]
    Config(String),

    /// An error while reading the sky model.
    #[error("{0}")]
    SourceList(String),

    /// An error while reading the telescope model.
    #[error("{0}")]
    Telescope(String),

    /// An error during the simulation itself.
    #[error("{0}")]
    Simulate(String),

    /// A generic error.
    #[error("{0}")]
    Generic(String),
}

impl From<SimulateArgsError> for VisgenError {
    fn from(e: SimulateArgsError) -> Self {
        Self::Config(e.to_string())
    }
}

impl From<ReadSourceListError> for VisgenError {
    fn from(e: ReadSourceListError) -> Self {
        Self::SourceList(e.to_string())
    }
}

impl From<ReadTelescopeError> for VisgenError {
    fn from(e: ReadTelescopeError) -> Self {
        Self::Telescope(e.to_string())
    }
}

impl From<SimulateError> for VisgenError {
    fn from(e: SimulateError) -> Self {
        Self::Simulate(e.to_string())
    }
}

impl From<VisWriteError> for VisgenError {
    fn from(e: VisWriteError) -> Self {
        Self::Simulate(e.to_string())
    }
}

impl From<FileWriteError> for VisgenError {
    fn from(e: FileWriteError) -> Self {
        Self::Config(e.to_string())
    }
}

impl From<std::io::Error> for VisgenError {
    fn from(e: std::io::Error) -> Self {
        Self::Generic(e.to_string())
    }
}
