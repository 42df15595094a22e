// Author: Eshan Roy
// SPDX-License-Identifier: MIT

use vergen::EmitBuilder;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Modules must be built with the same compiler as the host, so the
    // compiler version is reported alongside the git metadata.
    EmitBuilder::builder()
        .git_sha(true)
        .git_commit_date()
        .rustc_semver()
        .emit()?;
    Ok(())
}
