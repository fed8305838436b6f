// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Parameters for running `visgen` functions. These structs are paired with
//! the structs in the `cli` module; a valid set of CLI/settings-file
//! arguments is parsed into one of these.

mod simulate;

pub(crate) use simulate::SimulateParams;
