// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Useful constants.

All constants *must* be double precision. `visgen` should do as many
calculations as possible in double precision before demoting results to a
lower precision, if that is ever required.
 */

pub(crate) use marlu::constants::VEL_C;

/// The default number of sources per sky chunk.
pub(crate) const DEFAULT_MAX_SOURCES_PER_CHUNK: usize = 16384;

/// The default number of time samples per visibility block.
pub(crate) const DEFAULT_BLOCK_LENGTH: usize = 8;

/// Sources with elevations below this value \[radians\] are excluded by the
/// horizon clip.
pub(crate) const ELEVATION_LIMIT: f64 = 0.0;
