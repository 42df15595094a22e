// Author: Eshan Roy
// SPDX-License-Identifier: MIT

//! Owned handle to a live entry point.

use std::fmt;
use std::mem::ManuallyDrop;

use super::ModuleEntryPoint;

/// Destructor exported by a module library.
#[allow(improper_ctypes_definitions)]
pub(crate) type DestroyFn = unsafe extern "C" fn(*mut dyn ModuleEntryPoint);

/// An instantiated entry point.
///
/// Instances created by a module library are handed back to that library's
/// destructor on drop, so the library must outlive the instance. The
/// registry record enforces this by declaring the instance before the
/// isolation context that owns the library.
pub struct ModuleInstance {
    inner: ManuallyDrop<Box<dyn ModuleEntryPoint>>,
    destroy: Option<DestroyFn>,
}

impl ModuleInstance {
    /// Wrap an entry point allocated by the host itself.
    pub fn new(entry_point: Box<dyn ModuleEntryPoint>) -> Self {
        Self {
            inner: ManuallyDrop::new(entry_point),
            destroy: None,
        }
    }

    /// Take ownership of an entry point returned by a module's factory.
    ///
    /// # Safety
    /// `raw` must be non-null and produced by the factory of the library that
    /// also exported `destroy`, and that library must stay loaded until this
    /// instance is dropped.
    pub(crate) unsafe fn from_raw(raw: *mut dyn ModuleEntryPoint, destroy: DestroyFn) -> Self {
        Self {
            inner: ManuallyDrop::new(unsafe { Box::from_raw(raw) }),
            destroy: Some(destroy),
        }
    }

    pub fn entry_point(&mut self) -> &mut dyn ModuleEntryPoint {
        &mut **self.inner
    }
}

impl Drop for ModuleInstance {
    fn drop(&mut self) {
        let entry_point = unsafe { ManuallyDrop::take(&mut self.inner) };
        match self.destroy {
            Some(destroy) => unsafe { destroy(Box::into_raw(entry_point)) },
            None => drop(entry_point),
        }
    }
}

impl fmt::Debug for ModuleInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleInstance")
            .field("foreign", &self.destroy.is_some())
            .finish()
    }
}
