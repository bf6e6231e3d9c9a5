// SPDX-License-Identifier: CEPL-1.0
//! The native-call seam. Everything the bootstrap asks of Vulkan goes
//! through [`Driver`]; [`AshDriver`] is the real one.

use std::ffi::CString;

use ash::ext::debug_utils as ext_debug;
use ash::khr::surface;
use ash::prelude::VkResult;
use ash::{vk, Entry};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use tracing::{debug, info};

use crate::error::{BootstrapError, Fatal, Result, Stage};

/// Native operations used by the bootstrap stages.
///
/// The two enumeration calls keep Vulkan's in/out count convention: with
/// `out == None` they store the available count, with `Some(buf)` they write
/// at most `*count` entries (callers pass `*count == buf.len()`) and store
/// how many were written.
pub trait Driver {
    fn create_instance(
        &mut self,
        info: &vk::InstanceCreateInfo<'_>,
        alloc: Option<&vk::AllocationCallbacks<'_>>,
    ) -> VkResult<vk::Instance>;

    fn create_debug_messenger(
        &mut self,
        instance: vk::Instance,
        info: &vk::DebugUtilsMessengerCreateInfoEXT<'_>,
        alloc: Option<&vk::AllocationCallbacks<'_>>,
    ) -> VkResult<vk::DebugUtilsMessengerEXT>;

    fn enumerate_physical_devices(
        &self,
        instance: vk::Instance,
        count: &mut u32,
        out: Option<&mut [vk::PhysicalDevice]>,
    ) -> vk::Result;

    fn physical_device_properties(&self, gpu: vk::PhysicalDevice) -> vk::PhysicalDeviceProperties;

    fn queue_family_properties(
        &self,
        gpu: vk::PhysicalDevice,
        count: &mut u32,
        out: Option<&mut [vk::QueueFamilyProperties]>,
    ) -> vk::Result;

    fn device_extension_names(&self, gpu: vk::PhysicalDevice) -> VkResult<Vec<CString>>;

    fn surface_support(
        &self,
        gpu: vk::PhysicalDevice,
        family: u32,
        surface: vk::SurfaceKHR,
    ) -> VkResult<bool>;

    fn create_device(
        &mut self,
        gpu: vk::PhysicalDevice,
        info: &vk::DeviceCreateInfo<'_>,
        alloc: Option<&vk::AllocationCallbacks<'_>>,
    ) -> VkResult<vk::Device>;

    fn get_device_queue(&self, device: vk::Device, family: u32, index: u32) -> vk::Queue;

    fn device_wait_idle(&self, device: vk::Device);

    fn destroy_device(&mut self, device: vk::Device, alloc: Option<&vk::AllocationCallbacks<'_>>);

    fn destroy_debug_messenger(
        &mut self,
        instance: vk::Instance,
        messenger: vk::DebugUtilsMessengerEXT,
        alloc: Option<&vk::AllocationCallbacks<'_>>,
    );

    fn destroy_surface(
        &mut self,
        instance: vk::Instance,
        surface: vk::SurfaceKHR,
        alloc: Option<&vk::AllocationCallbacks<'_>>,
    );

    fn destroy_instance(
        &mut self,
        instance: vk::Instance,
        alloc: Option<&vk::AllocationCallbacks<'_>>,
    );
}

/// [`Driver`] over the system Vulkan loader.
///
/// Holds the function tables for the one instance and one device a
/// [`Context`](crate::Context) can own.
pub struct AshDriver {
    entry: Entry,
    instance: Option<ash::Instance>,
    surface_loader: Option<surface::Instance>,
    debug_loader: Option<ext_debug::Instance>,
    device: Option<ash::Device>,
}

impl AshDriver {
    /// Probes for a usable Vulkan loader. No loader means no GPU path at all.
    pub fn load() -> Result<Self> {
        let entry = unsafe { Entry::load() }.map_err(|e| {
            BootstrapError::fatal(Stage::DriverProbe, Fatal::NoDriver(e.to_string()))
        })?;

        match unsafe { entry.try_enumerate_instance_version() } {
            Ok(Some(v)) => info!(
                "Vulkan loader {}.{}.{}",
                vk::api_version_major(v),
                vk::api_version_minor(v),
                vk::api_version_patch(v)
            ),
            Ok(None) => info!("Vulkan loader 1.0"),
            Err(result) => {
                return Err(BootstrapError::fatal(
                    Stage::DriverProbe,
                    Fatal::NoDriver(result.to_string()),
                ))
            }
        }

        Ok(Self {
            entry,
            instance: None,
            surface_loader: None,
            debug_loader: None,
            device: None,
        })
    }

    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Function table for the live instance, for layers built on top.
    pub fn instance(&self) -> Option<&ash::Instance> {
        self.instance.as_ref()
    }

    /// Function table for the live logical device.
    pub fn device(&self) -> Option<&ash::Device> {
        self.device.as_ref()
    }

    pub fn surface_loader(&self) -> Option<&surface::Instance> {
        self.surface_loader.as_ref()
    }

    fn instance_for(&self, handle: vk::Instance) -> VkResult<&ash::Instance> {
        match &self.instance {
            Some(i) if i.handle() == handle => Ok(i),
            _ => Err(vk::Result::ERROR_INITIALIZATION_FAILED),
        }
    }

    fn live_instance(&self) -> VkResult<&ash::Instance> {
        self.instance
            .as_ref()
            .ok_or(vk::Result::ERROR_INITIALIZATION_FAILED)
    }

    pub(crate) fn create_surface(
        &self,
        instance: vk::Instance,
        display: RawDisplayHandle,
        window: RawWindowHandle,
        alloc: Option<&vk::AllocationCallbacks<'_>>,
    ) -> VkResult<vk::SurfaceKHR> {
        let inst = self.instance_for(instance)?;
        unsafe { ash_window::create_surface(&self.entry, inst, display, window, alloc) }
    }
}

impl Driver for AshDriver {
    fn create_instance(
        &mut self,
        info: &vk::InstanceCreateInfo<'_>,
        alloc: Option<&vk::AllocationCallbacks<'_>>,
    ) -> VkResult<vk::Instance> {
        let instance = unsafe { self.entry.create_instance(info, alloc)? };
        let handle = instance.handle();
        self.surface_loader = Some(surface::Instance::new(&self.entry, &instance));
        self.debug_loader = Some(ext_debug::Instance::new(&self.entry, &instance));
        self.instance = Some(instance);
        Ok(handle)
    }

    fn create_debug_messenger(
        &mut self,
        instance: vk::Instance,
        info: &vk::DebugUtilsMessengerCreateInfoEXT<'_>,
        alloc: Option<&vk::AllocationCallbacks<'_>>,
    ) -> VkResult<vk::DebugUtilsMessengerEXT> {
        self.instance_for(instance)?;
        let loader = self
            .debug_loader
            .as_ref()
            .ok_or(vk::Result::ERROR_INITIALIZATION_FAILED)?;
        unsafe { loader.create_debug_utils_messenger(info, alloc) }
    }

    fn enumerate_physical_devices(
        &self,
        instance: vk::Instance,
        count: &mut u32,
        out: Option<&mut [vk::PhysicalDevice]>,
    ) -> vk::Result {
        let inst = match self.instance_for(instance) {
            Ok(i) => i,
            Err(result) => return result,
        };
        let ptr = match out {
            Some(buf) => {
                *count = (*count).min(buf.len() as u32);
                buf.as_mut_ptr()
            }
            None => std::ptr::null_mut(),
        };
        unsafe { (inst.fp_v1_0().enumerate_physical_devices)(instance, count, ptr) }
    }

    fn physical_device_properties(&self, gpu: vk::PhysicalDevice) -> vk::PhysicalDeviceProperties {
        match &self.instance {
            Some(inst) => unsafe { inst.get_physical_device_properties(gpu) },
            None => vk::PhysicalDeviceProperties::default(),
        }
    }

    fn queue_family_properties(
        &self,
        gpu: vk::PhysicalDevice,
        count: &mut u32,
        out: Option<&mut [vk::QueueFamilyProperties]>,
    ) -> vk::Result {
        let inst = match self.live_instance() {
            Ok(i) => i,
            Err(result) => return result,
        };
        let ptr = match out {
            Some(buf) => {
                *count = (*count).min(buf.len() as u32);
                buf.as_mut_ptr()
            }
            None => std::ptr::null_mut(),
        };
        unsafe { (inst.fp_v1_0().get_physical_device_queue_family_properties)(gpu, count, ptr) };
        vk::Result::SUCCESS
    }

    fn device_extension_names(&self, gpu: vk::PhysicalDevice) -> VkResult<Vec<CString>> {
        let inst = self.live_instance()?;
        let props = unsafe { inst.enumerate_device_extension_properties(gpu)? };
        Ok(props
            .iter()
            .filter_map(|p| p.extension_name_as_c_str().ok())
            .map(|n| n.to_owned())
            .collect())
    }

    fn surface_support(
        &self,
        gpu: vk::PhysicalDevice,
        family: u32,
        surface: vk::SurfaceKHR,
    ) -> VkResult<bool> {
        let loader = self
            .surface_loader
            .as_ref()
            .ok_or(vk::Result::ERROR_INITIALIZATION_FAILED)?;
        unsafe { loader.get_physical_device_surface_support(gpu, family, surface) }
    }

    fn create_device(
        &mut self,
        gpu: vk::PhysicalDevice,
        info: &vk::DeviceCreateInfo<'_>,
        alloc: Option<&vk::AllocationCallbacks<'_>>,
    ) -> VkResult<vk::Device> {
        let inst = self.live_instance()?;
        let device = unsafe { inst.create_device(gpu, info, alloc)? };
        let handle = device.handle();
        self.device = Some(device);
        Ok(handle)
    }

    fn get_device_queue(&self, device: vk::Device, family: u32, index: u32) -> vk::Queue {
        match &self.device {
            Some(d) if d.handle() == device => unsafe { d.get_device_queue(family, index) },
            _ => vk::Queue::null(),
        }
    }

    fn device_wait_idle(&self, device: vk::Device) {
        if let Some(d) = self.device.as_ref().filter(|d| d.handle() == device) {
            unsafe { d.device_wait_idle().ok() };
        }
    }

    fn destroy_device(&mut self, device: vk::Device, alloc: Option<&vk::AllocationCallbacks<'_>>) {
        if let Some(d) = self.device.take() {
            debug_assert_eq!(d.handle(), device);
            unsafe { d.destroy_device(alloc) };
            debug!("device destroyed");
        }
    }

    fn destroy_debug_messenger(
        &mut self,
        instance: vk::Instance,
        messenger: vk::DebugUtilsMessengerEXT,
        alloc: Option<&vk::AllocationCallbacks<'_>>,
    ) {
        if self.instance_for(instance).is_err() {
            return;
        }
        if let Some(loader) = &self.debug_loader {
            unsafe { loader.destroy_debug_utils_messenger(messenger, alloc) };
        }
    }

    fn destroy_surface(
        &mut self,
        instance: vk::Instance,
        surface: vk::SurfaceKHR,
        alloc: Option<&vk::AllocationCallbacks<'_>>,
    ) {
        if self.instance_for(instance).is_err() {
            return;
        }
        if let Some(loader) = &self.surface_loader {
            unsafe { loader.destroy_surface(surface, alloc) };
        }
    }

    fn destroy_instance(
        &mut self,
        instance: vk::Instance,
        alloc: Option<&vk::AllocationCallbacks<'_>>,
    ) {
        self.debug_loader = None;
        self.surface_loader = None;
        if let Some(inst) = self.instance.take() {
            debug_assert_eq!(inst.handle(), instance);
            unsafe { inst.destroy_instance(alloc) };
            debug!("instance destroyed");
        }
    }
}
