// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Some helper mathematics.

#[cfg(test)]
mod tests;

use marlu::c64;

/// Complex exponential. The argument is assumed to be purely imaginary.
///
/// This function doesn't actually use complex numbers; it just returns the
/// real and imag components from Euler's formula (i.e. e^{ix} = cos{x} + i
/// sin{x}).
#[inline]
pub(crate) fn cexp(x: f64) -> c64 {
    let (im, re) = x.sin_cos();
    c64::new(re, im)
}

/// The number of cross-correlation baselines for a number of stations.
#[inline]
pub(crate) fn num_cross_baselines(num_stations: usize) -> usize {
    num_stations * num_stations.saturating_sub(1) / 2
}

/// Ceiling division of non-negative integers.
#[inline]
pub(crate) fn div_ceil(numerator: usize, denominator: usize) -> usize {
    (numerator + denominator - 1) / denominator
}
