// SPDX-License-Identifier: CEPL-1.0
use std::ffi::CStr;

use raw_window_handle::HasDisplayHandle;

use crate::error::{BootstrapError, Result, Stage};

/// The windowing side of instance creation: which instance extensions the
/// platform needs for its presentation surfaces.
pub trait WindowSystem {
    fn required_instance_extensions(&self) -> Result<Vec<&'static CStr>>;
}

/// No window, no surface extensions. Compute-only and test setups.
#[derive(Clone, Copy, Debug, Default)]
pub struct Headless;

impl WindowSystem for Headless {
    fn required_instance_extensions(&self) -> Result<Vec<&'static CStr>> {
        Ok(Vec::new())
    }
}

/// Surface extensions for whatever display server `display` lives on.
pub struct DisplayExtensions<'a>(pub &'a dyn HasDisplayHandle);

impl WindowSystem for DisplayExtensions<'_> {
    fn required_instance_extensions(&self) -> Result<Vec<&'static CStr>> {
        let raw = self.0.display_handle()?.as_raw();
        let names = ash_window::enumerate_required_extensions(raw)
            .map_err(|result| BootstrapError::vulkan(Stage::InstanceCreation, result))?;
        // ash-window hands out pointers to its own 'static name constants.
        Ok(names
            .iter()
            .map(|&p| unsafe { CStr::from_ptr(p) })
            .collect())
    }
}
