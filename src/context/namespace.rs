// Author: Eshan Roy
// SPDX-License-Identifier: MIT

//! glibc link-map namespaces.
//!
//! The first library a context opens creates a fresh namespace; every later
//! one joins it. `NEEDED` entries are matched against what is already loaded
//! in the same namespace, so a module sees its own private dependencies and
//! never another module's copy. Shared identifiers are resolved by the
//! system search path inside the namespace.
//!
//! glibc supports a small fixed number of namespaces (16, minus the base
//! one), so only contexts with private dependencies use one.

use libc::{c_void, Lmid_t};
use libloading::os::unix::Library as UnixLibrary;
use libloading::Library;
use std::ffi::{CStr, CString};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use tracing::debug;

use super::library_error;
use crate::error::LoadError;

#[derive(Debug, Default)]
pub(super) struct Namespace {
    id: Option<Lmid_t>,
}

impl Namespace {
    pub(super) fn open(&mut self, path: &Path) -> Result<Library, LoadError> {
        let filename = CString::new(path.as_os_str().as_bytes())
            .map_err(|_| library_error(path, "path contains a NUL byte"))?;
        let lmid = self.id.unwrap_or(libc::LM_ID_NEWLM);

        let handle =
            unsafe { libc::dlmopen(lmid, filename.as_ptr(), libc::RTLD_NOW | libc::RTLD_LOCAL) };
        if handle.is_null() {
            return Err(library_error(path, last_dl_error()));
        }

        if self.id.is_none() {
            let mut id: Lmid_t = 0;
            let rc = unsafe {
                libc::dlinfo(handle, libc::RTLD_DI_LMID, &mut id as *mut Lmid_t as *mut c_void)
            };
            if rc != 0 {
                let message = last_dl_error();
                unsafe { libc::dlclose(handle) };
                return Err(library_error(path, message));
            }
            debug!("Created link-map namespace {} for {:?}", id, path);
            self.id = Some(id);
        }

        Ok(Library::from(unsafe { UnixLibrary::from_raw(handle) }))
    }
}

fn last_dl_error() -> String {
    let message = unsafe { libc::dlerror() };
    if message.is_null() {
        "unknown dynamic loader error".to_string()
    } else {
        unsafe { CStr::from_ptr(message) }
            .to_string_lossy()
            .into_owned()
    }
}
