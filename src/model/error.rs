// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors from the per-work-unit pipeline.

use thiserror::Error;

use crate::beam::BeamError;

#[derive(Error, Debug)]
pub(crate) enum ModelError {
    #[error(transparent)]
    Beam(#[from] BeamError),
}
