// Author: Eshan Roy
// SPDX-License-Identifier: MIT

//! Exported-symbol ABI between the host and module libraries.
//!
//! A module library exports four unmangled functions, normally generated by
//! [`declare_module!`](crate::declare_module). Host and modules must be built
//! with the same compiler and the same `modhost` version, since entry points
//! cross the boundary as Rust trait objects.

/// Module ABI version. Bumped whenever the exported signatures change.
pub const ABI_VERSION: u32 = 1;

/// Names of the symbols a module exports.
pub mod exports {
    /// `extern "C" fn() -> u32`
    pub const API_VERSION: &[u8] = b"_modhost_api_version\0";
    /// `extern "C" fn() -> *const c_char`, NUL-terminated manifest TOML.
    pub const MANIFEST: &[u8] = b"_modhost_manifest\0";
    /// `extern "C" fn() -> *mut dyn ModuleEntryPoint`
    pub const CREATE: &[u8] = b"_modhost_create\0";
    /// `extern "C" fn(*mut dyn ModuleEntryPoint)`
    pub const DESTROY: &[u8] = b"_modhost_destroy\0";

    /// Printable form of a symbol name.
    pub fn display(symbol: &[u8]) -> String {
        String::from_utf8_lossy(symbol.strip_suffix(b"\0").unwrap_or(symbol)).into_owned()
    }
}

/// Export a module entry point and its manifest from a `cdylib`.
///
/// ```ignore
/// modhost::declare_module!(
///     EchoModule::default(),
///     modhost::ModuleManifest {
///         id: "com.example.echo".into(),
///         name: "Echo".into(),
///         version: env!("CARGO_PKG_VERSION").into(),
///         author: "Example".into(),
///         description: "Echoes captured entries".into(),
///     }
/// );
/// ```
#[macro_export]
macro_rules! declare_module {
    ($constructor:expr, $manifest:expr $(,)?) => {
        #[no_mangle]
        pub extern "C" fn _modhost_api_version() -> u32 {
            $crate::entry::ABI_VERSION
        }

        #[no_mangle]
        pub extern "C" fn _modhost_manifest() -> *const ::std::os::raw::c_char {
            static MANIFEST: ::std::sync::OnceLock<::std::ffi::CString> =
                ::std::sync::OnceLock::new();
            MANIFEST
                .get_or_init(|| {
                    let manifest: $crate::manifest::ModuleManifest = $manifest;
                    ::std::ffi::CString::new(manifest.to_toml()).unwrap_or_default()
                })
                .as_ptr()
        }

        #[no_mangle]
        #[allow(improper_ctypes_definitions)]
        pub extern "C" fn _modhost_create() -> *mut dyn $crate::entry::ModuleEntryPoint {
            let module: ::std::boxed::Box<dyn $crate::entry::ModuleEntryPoint> =
                ::std::boxed::Box::new($constructor);
            ::std::boxed::Box::into_raw(module)
        }

        #[no_mangle]
        #[allow(improper_ctypes_definitions)]
        pub unsafe extern "C" fn _modhost_destroy(
            module: *mut dyn $crate::entry::ModuleEntryPoint,
        ) {
            if !module.is_null() {
                drop(unsafe { ::std::boxed::Box::from_raw(module) });
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbols_are_nul_terminated() {
        for symbol in [
            exports::API_VERSION,
            exports::MANIFEST,
            exports::CREATE,
            exports::DESTROY,
        ] {
            assert_eq!(symbol.last(), Some(&0));
            assert!(exports::display(symbol).starts_with("_modhost_"));
        }
    }

    #[test]
    fn test_display_strips_nul() {
        assert_eq!(exports::display(exports::CREATE), "_modhost_create");
    }
}
