// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Block-pipelined visibility simulator for aperture-synthesis radio telescopes.

Observation time is processed in blocks: a pool of worker threads (one per
compute device, plus one dedicated writer) drains a shared work-unit index to
fill per-device visibility blocks, while the writer combines and persists the
previously completed block. See the `sim` module for the scheduler.
 */

mod beam;
mod cli;
mod constants;
mod io;
mod math;
mod model;
mod noise;
mod params;
mod sim;
mod sky;
mod telescope;
mod vis;

pub use cli::{Visgen, VisgenError};

use crossbeam_utils::atomic::AtomicCell;

lazy_static::lazy_static! {
    /// Are progress bars displayed?
    static ref PROGRESS_BARS: AtomicCell<bool> = AtomicCell::new(false);
}
