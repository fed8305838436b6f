// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub(crate) enum VisWriteError {
    #[error("The binary visibility file is corrupted: {0}")]
    CorruptBinaryFile(&'static str),

    #[error(transparent)]
    FileWrite(#[from] FileWriteError),

    #[error(transparent)]
    MsWrite(#[from] marlu::io::MeasurementSetWriteError),

    #[error(transparent)]
    MarluIO(#[from] marlu::io::error::IOError),

    #[error(transparent)]
    IO(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub(crate) enum FileWriteError {
    #[error("Cannot write to the specified file '{file}'. Do you have write permissions set?")]
    FileNotWritable { file: String },

    #[error(
        "Couldn't create directory '{0}' for output files. Do you have write permissions set?"
    )]
    NewDirectory(PathBuf),

    #[error(transparent)]
    IO(#[from] std::io::Error),
}
