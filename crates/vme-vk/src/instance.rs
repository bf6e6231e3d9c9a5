// SPDX-License-Identifier: CEPL-1.0
use std::ffi::{c_void, CStr, CString};

use ash::ext::debug_utils as ext_debug;
use ash::khr::{get_physical_device_properties2, portability_enumeration};
use ash::vk;
use tracing::{debug, error, info, trace, warn};

use crate::context::Context;
use crate::driver::Driver;
use crate::error::{BootstrapError, Fatal, Result, Stage};
use crate::names::{dedup_names, name_array, name_ptrs, VALIDATION_LAYER};
use crate::surface::WindowSystem;

const ENGINE_NAME: &CStr = c"vme";

/// Application metadata, extensions and layers for the Vulkan instance.
///
/// Accumulates with consuming setters, then [`build`](Self::build) writes
/// the instance into a [`Context`].
#[derive(Clone, Debug)]
pub struct InstanceBuilder {
    app_name: Option<CString>,
    app_version: u32,
    engine_name: CString,
    engine_version: u32,
    api_version: u32,
    extensions: Vec<CString>,
    layers: Vec<CString>,
    validation: bool,
    portability: bool,
}

impl Default for InstanceBuilder {
    fn default() -> Self {
        Self {
            app_name: None,
            app_version: 0,
            engine_name: ENGINE_NAME.to_owned(),
            engine_version: vk::make_api_version(0, 0, 1, 0),
            api_version: vk::API_VERSION_1_3,
            extensions: Vec::new(),
            layers: Vec::new(),
            validation: cfg!(debug_assertions),
            portability: cfg!(any(target_os = "macos", target_os = "ios")),
        }
    }
}

impl InstanceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn app_name(mut self, name: impl AsRef<CStr>) -> Self {
        self.app_name = Some(name.as_ref().to_owned());
        self
    }

    pub fn app_version(mut self, major: u32, minor: u32, patch: u32) -> Self {
        self.app_version = vk::make_api_version(0, major, minor, patch);
        self
    }

    pub fn engine_name(mut self, name: impl AsRef<CStr>) -> Self {
        self.engine_name = name.as_ref().to_owned();
        self
    }

    /// Vulkan API version to request. Vulkan 1.3 when never called.
    pub fn api_version(mut self, major: u32, minor: u32) -> Self {
        self.api_version = vk::make_api_version(0, major, minor, 0);
        self
    }

    pub fn extension(mut self, name: impl AsRef<CStr>) -> Self {
        self.extensions.push(name.as_ref().to_owned());
        self
    }

    pub fn layer(mut self, name: impl AsRef<CStr>) -> Self {
        self.layers.push(name.as_ref().to_owned());
        self
    }

    /// Khronos validation layer plus a debug messenger feeding `tracing`.
    pub fn validation(mut self, on: bool) -> Self {
        self.validation = on;
        self
    }

    /// Portability enumeration opt-in, needed for MoltenVK-style drivers.
    pub fn portability(mut self, on: bool) -> Self {
        self.portability = on;
        self
    }

    pub fn validation_enabled(&self) -> bool {
        self.validation
    }

    pub fn requested_api_version(&self) -> u32 {
        self.api_version
    }

    /// Creates the instance and stores it in `ctx`.
    ///
    /// On failure `ctx` is untouched. `ERROR_INCOMPATIBLE_DRIVER` is reported
    /// as unrecoverable; every other native failure can be retried.
    pub fn build<D: Driver>(
        &self,
        ctx: &mut Context<D>,
        window: &dyn WindowSystem,
    ) -> Result<vk::Instance> {
        if ctx.has_instance() {
            return Err(BootstrapError::fatal(
                Stage::InstanceCreation,
                Fatal::InstanceAlreadyCreated,
            ));
        }

        let mut extensions: Vec<&CStr> = window.required_instance_extensions()?;
        extensions.extend(self.extensions.iter().map(CString::as_c_str));

        let mut flags = vk::InstanceCreateFlags::empty();
        if self.portability {
            extensions.push(portability_enumeration::NAME);
            extensions.push(get_physical_device_properties2::NAME);
            flags |= vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
        }

        let mut layers: Vec<&CStr> = self.layers.iter().map(CString::as_c_str).collect();
        if self.validation {
            layers.push(VALIDATION_LAYER);
            extensions.push(ext_debug::NAME);
        }

        let extensions = dedup_names(extensions);
        let layers = dedup_names(layers);
        debug!(?extensions, ?layers, "instance request");

        let ext_ptrs = name_ptrs(&extensions);
        let layer_ptrs = name_ptrs(&layers);
        let (enabled_extension_count, pp_enabled_extension_names) = name_array(&ext_ptrs);
        let (enabled_layer_count, pp_enabled_layer_names) = name_array(&layer_ptrs);

        let app_info = vk::ApplicationInfo {
            s_type: vk::StructureType::APPLICATION_INFO,
            p_application_name: self
                .app_name
                .as_ref()
                .map_or(std::ptr::null(), |n| n.as_ptr()),
            application_version: self.app_version,
            p_engine_name: self.engine_name.as_ptr(),
            engine_version: self.engine_version,
            api_version: self.api_version,
            ..Default::default()
        };

        let create_info = vk::InstanceCreateInfo {
            s_type: vk::StructureType::INSTANCE_CREATE_INFO,
            flags,
            p_application_info: &app_info,
            enabled_extension_count,
            pp_enabled_extension_names,
            enabled_layer_count,
            pp_enabled_layer_names,
            ..Default::default()
        };

        let instance = match ctx
            .driver
            .create_instance(&create_info, ctx.allocation_callbacks.as_ref())
        {
            Ok(instance) => instance,
            Err(vk::Result::ERROR_INCOMPATIBLE_DRIVER) => {
                return Err(BootstrapError::fatal(
                    Stage::InstanceCreation,
                    Fatal::IncompatibleDriver,
                ))
            }
            Err(result) => return Err(BootstrapError::vulkan(Stage::InstanceCreation, result)),
        };
        ctx.instance = instance;
        info!(
            "Vulkan instance ready (api {}.{}, {} extensions, {} layers)",
            vk::api_version_major(self.api_version),
            vk::api_version_minor(self.api_version),
            extensions.len(),
            layers.len()
        );

        if self.validation {
            let messenger_info = debug_messenger_info();
            match ctx.driver.create_debug_messenger(
                instance,
                &messenger_info,
                ctx.allocation_callbacks.as_ref(),
            ) {
                Ok(messenger) => ctx.debug_messenger = messenger,
                Err(result) => warn!("debug messenger unavailable: {result}"),
            }
        }

        Ok(instance)
    }
}

fn debug_messenger_info() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
    vk::DebugUtilsMessengerCreateInfoEXT {
        s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
        message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
            | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
            | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        pfn_user_callback: Some(debug_callback),
        ..Default::default()
    }
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user: *mut c_void,
) -> vk::Bool32 {
    if data.is_null() {
        return vk::FALSE;
    }
    let p_message = unsafe { (*data).p_message };
    if p_message.is_null() {
        return vk::FALSE;
    }
    let msg = unsafe { CStr::from_ptr(p_message) }.to_string_lossy();
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!(target: "vulkan", ?types, "{msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!(target: "vulkan", ?types, "{msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        info!(target: "vulkan", ?types, "{msg}");
    } else {
        trace!(target: "vulkan", ?types, "{msg}");
    }
    vk::FALSE
}
