// Author: Eshan Roy
// SPDX-License-Identifier: MIT

//! A shared library that exports no module symbols.

#[no_mangle]
pub extern "C" fn answer() -> u32 {
    42
}
