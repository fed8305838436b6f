// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::f64::consts::PI;

use approx::assert_abs_diff_eq;

use super::*;

#[test]
fn test_cexp() {
    assert_abs_diff_eq!(cexp(0.0).re, 1.0);
    assert_abs_diff_eq!(cexp(0.0).im, 0.0);
    assert_abs_diff_eq!(cexp(PI).re, -1.0, epsilon = 1e-15);
    assert_abs_diff_eq!(cexp(PI).im, 0.0, epsilon = 1e-15);
    assert_abs_diff_eq!(cexp(PI / 2.0).re, 0.0, epsilon = 1e-15);
    assert_abs_diff_eq!(cexp(PI / 2.0).im, 1.0, epsilon = 1e-15);
}

#[test]
fn test_num_cross_baselines() {
    assert_eq!(num_cross_baselines(0), 0);
    assert_eq!(num_cross_baselines(1), 0);
    assert_eq!(num_cross_baselines(2), 1);
    assert_eq!(num_cross_baselines(128), 8128);
}

#[test]
fn test_div_ceil() {
    assert_eq!(div_ceil(10, 2), 5);
    assert_eq!(div_ceil(11, 2), 6);
    assert_eq!(div_ceil(1, 8), 1);
    assert_eq!(div_ceil(8, 8), 1);
    assert_eq!(div_ceil(9, 8), 2);
}
