// SPDX-License-Identifier: CEPL-1.0
use std::fmt;

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, info};

use crate::driver::{AshDriver, Driver};
use crate::error::{BootstrapError, Fatal, Result, Stage};

/// What a queue is used for. Each role maps to at most one family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QueueRole {
    Graphics,
    Compute,
    Transfer,
}

impl fmt::Display for QueueRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            QueueRole::Graphics => "graphics",
            QueueRole::Compute => "compute",
            QueueRole::Transfer => "transfer",
        })
    }
}

/// A queue fetched from the logical device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceQueue {
    pub role: QueueRole,
    pub family_index: u32,
    pub queue: vk::Queue,
    /// The family can present to the attached surface. Always `false` when
    /// no surface was attached at device creation.
    pub presents: bool,
}

/// The physical device picked by [`GpuSelector`](crate::GpuSelector).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GpuInfo {
    pub index: usize,
    pub handle: vk::PhysicalDevice,
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub api_version: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SurfaceOwnership {
    /// The Context destroys it, before the instance.
    Owned,
    /// Someone else destroys it; the Context only references it.
    Borrowed,
}

/// Every GPU handle of one running application.
///
/// Filled strictly in the order instance -> gpu -> device by the builders.
/// Dropping (or [`destroy`](Self::destroy)) tears down in reverse: device,
/// debug messenger, owned surface, instance. Null handles mark stages that
/// never ran and are skipped.
pub struct Context<D: Driver> {
    pub(crate) driver: D,
    pub(crate) allocation_callbacks: Option<vk::AllocationCallbacks<'static>>,
    pub(crate) instance: vk::Instance,
    pub(crate) debug_messenger: vk::DebugUtilsMessengerEXT,
    pub(crate) chosen_gpu: vk::PhysicalDevice,
    pub(crate) gpu_info: Option<GpuInfo>,
    pub(crate) device: vk::Device,
    pub(crate) surface: vk::SurfaceKHR,
    pub(crate) surface_ownership: SurfaceOwnership,
    pub(crate) queues: Vec<DeviceQueue>,
}

impl<D: Driver> Context<D> {
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            allocation_callbacks: None,
            instance: vk::Instance::null(),
            debug_messenger: vk::DebugUtilsMessengerEXT::null(),
            chosen_gpu: vk::PhysicalDevice::null(),
            gpu_info: None,
            device: vk::Device::null(),
            surface: vk::SurfaceKHR::null(),
            surface_ownership: SurfaceOwnership::Borrowed,
            queues: Vec::new(),
        }
    }

    /// Host allocation callbacks used for every create and destroy call made
    /// through this Context. Set before anything is created.
    pub fn with_allocation_callbacks(
        mut self,
        callbacks: vk::AllocationCallbacks<'static>,
    ) -> Self {
        debug_assert!(self.instance == vk::Instance::null());
        self.allocation_callbacks = Some(callbacks);
        self
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn instance(&self) -> vk::Instance {
        self.instance
    }

    pub fn debug_messenger(&self) -> vk::DebugUtilsMessengerEXT {
        self.debug_messenger
    }

    pub fn chosen_gpu(&self) -> vk::PhysicalDevice {
        self.chosen_gpu
    }

    pub fn gpu_info(&self) -> Option<&GpuInfo> {
        self.gpu_info.as_ref()
    }

    pub fn device(&self) -> vk::Device {
        self.device
    }

    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }

    pub fn queues(&self) -> &[DeviceQueue] {
        &self.queues
    }

    pub fn queue(&self, role: QueueRole) -> Option<&DeviceQueue> {
        self.queues.iter().find(|q| q.role == role)
    }

    pub fn has_instance(&self) -> bool {
        self.instance != vk::Instance::null()
    }

    pub fn has_device(&self) -> bool {
        self.device != vk::Device::null()
    }

    /// References a presentation surface for device compatibility checks.
    /// Must happen after instance creation and before device creation.
    pub fn attach_surface(
        &mut self,
        surface: vk::SurfaceKHR,
        ownership: SurfaceOwnership,
    ) -> Result<()> {
        self.check_surface_slot()?;
        self.surface = surface;
        self.surface_ownership = ownership;
        Ok(())
    }

    fn check_surface_slot(&self) -> Result<()> {
        let fatal = if !self.has_instance() {
            Fatal::InstanceMissing
        } else if self.has_device() {
            // The device was built without swapchain or present checks.
            Fatal::DeviceAlreadyCreated
        } else if self.surface != vk::SurfaceKHR::null() {
            Fatal::SurfaceAlreadyAttached
        } else {
            return Ok(());
        };
        Err(BootstrapError::fatal(Stage::SurfaceCreation, fatal))
    }

    /// Tears everything down in reverse creation order. Safe to call more
    /// than once and on a partially built Context.
    pub fn destroy(&mut self) {
        let alloc = self.allocation_callbacks.as_ref();

        if self.device != vk::Device::null() {
            self.driver.device_wait_idle(self.device);
            self.driver.destroy_device(self.device, alloc);
            self.device = vk::Device::null();
            self.queues.clear();
        }

        if self.debug_messenger != vk::DebugUtilsMessengerEXT::null() {
            self.driver
                .destroy_debug_messenger(self.instance, self.debug_messenger, alloc);
            self.debug_messenger = vk::DebugUtilsMessengerEXT::null();
        }

        if self.surface != vk::SurfaceKHR::null() {
            if self.surface_ownership == SurfaceOwnership::Owned {
                self.driver.destroy_surface(self.instance, self.surface, alloc);
            }
            self.surface = vk::SurfaceKHR::null();
        }

        // Physical devices belong to the instance; nothing to destroy.
        self.chosen_gpu = vk::PhysicalDevice::null();
        self.gpu_info = None;

        if self.instance != vk::Instance::null() {
            self.driver.destroy_instance(self.instance, alloc);
            self.instance = vk::Instance::null();
            debug!("context torn down");
        }
    }
}

impl Context<AshDriver> {
    /// Creates a window surface through `ash-window` and attaches it as owned.
    pub fn create_surface(
        &mut self,
        display: &dyn HasDisplayHandle,
        window: &dyn HasWindowHandle,
    ) -> Result<vk::SurfaceKHR> {
        self.check_surface_slot()?;
        let dh = display.display_handle()?.as_raw();
        let wh = window.window_handle()?.as_raw();
        let surface = self
            .driver
            .create_surface(self.instance, dh, wh, self.allocation_callbacks.as_ref())
            .map_err(|result| BootstrapError::vulkan(Stage::SurfaceCreation, result))?;
        self.attach_surface(surface, SurfaceOwnership::Owned)?;
        info!("surface created");
        Ok(surface)
    }
}

impl<D: Driver> Drop for Context<D> {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, MockDriver};
    use ash::vk::Handle;

    fn populated(mock: MockDriver) -> Context<MockDriver> {
        populated_with_surface(mock, None)
    }

    fn populated_with_surface(
        mock: MockDriver,
        surface: Option<SurfaceOwnership>,
    ) -> Context<MockDriver> {
        let mut ctx = Context::new(mock);
        ctx.instance = vk::Instance::from_raw(1);
        ctx.debug_messenger = vk::DebugUtilsMessengerEXT::from_raw(2);
        if let Some(ownership) = surface {
            ctx.attach_surface(vk::SurfaceKHR::from_raw(9), ownership)
                .unwrap();
        }
        ctx.chosen_gpu = vk::PhysicalDevice::from_raw(100);
        ctx.device = vk::Device::from_raw(3);
        ctx
    }

    #[test]
    fn device_is_destroyed_before_instance() {
        let mock = MockDriver::default();
        let log = mock.log();
        drop(populated(mock));

        let calls = log.borrow();
        let device = calls.iter().position(|c| matches!(c, Call::DestroyDevice)).unwrap();
        let messenger = calls
            .iter()
            .position(|c| matches!(c, Call::DestroyDebugMessenger))
            .unwrap();
        let instance = calls.iter().position(|c| matches!(c, Call::DestroyInstance)).unwrap();
        assert!(device < messenger);
        assert!(messenger < instance);
        assert_eq!(calls.last(), Some(&Call::DestroyInstance));
    }

    #[test]
    fn destroy_is_idempotent() {
        let mock = MockDriver::default();
        let log = mock.log();
        let mut ctx = populated(mock);
        ctx.destroy();
        let after_first = log.borrow().len();
        ctx.destroy();
        drop(ctx);
        assert_eq!(log.borrow().len(), after_first);
        assert!(!log.borrow().is_empty());
    }

    #[test]
    fn empty_context_destroys_nothing() {
        let mock = MockDriver::default();
        let log = mock.log();
        drop(Context::new(mock));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn instance_only_context_skips_device() {
        let mock = MockDriver::default();
        let log = mock.log();
        let mut ctx = Context::new(mock);
        ctx.instance = vk::Instance::from_raw(1);
        drop(ctx);
        assert_eq!(*log.borrow(), vec![Call::DestroyInstance]);
    }

    #[test]
    fn owned_surface_is_destroyed_between_messenger_and_instance() {
        let mock = MockDriver::default();
        let log = mock.log();
        drop(populated_with_surface(mock, Some(SurfaceOwnership::Owned)));
        let calls = log.borrow();
        let tail: Vec<_> = calls.iter().skip_while(|c| **c != Call::DestroyDevice).collect();
        assert_eq!(
            tail,
            vec![
                &Call::DestroyDevice,
                &Call::DestroyDebugMessenger,
                &Call::DestroySurface,
                &Call::DestroyInstance,
            ]
        );
    }

    #[test]
    fn borrowed_surface_is_left_alone() {
        let mock = MockDriver::default();
        let log = mock.log();
        drop(populated_with_surface(mock, Some(SurfaceOwnership::Borrowed)));
        assert!(!log.borrow().contains(&Call::DestroySurface));
    }

    #[test]
    fn surface_needs_instance_and_attaches_once() {
        let mut ctx = Context::new(MockDriver::default());
        let err = ctx
            .attach_surface(vk::SurfaceKHR::from_raw(9), SurfaceOwnership::Borrowed)
            .unwrap_err();
        assert_eq!(err.fatal_kind(), Some(&Fatal::InstanceMissing));

        ctx.instance = vk::Instance::from_raw(1);
        ctx.attach_surface(vk::SurfaceKHR::from_raw(9), SurfaceOwnership::Borrowed)
            .unwrap();
        let err = ctx
            .attach_surface(vk::SurfaceKHR::from_raw(10), SurfaceOwnership::Borrowed)
            .unwrap_err();
        assert_eq!(err.fatal_kind(), Some(&Fatal::SurfaceAlreadyAttached));
    }

    #[test]
    fn surface_after_device_is_rejected() {
        let mock = MockDriver::default();
        let log = mock.log();
        let mut ctx = populated(mock);
        let err = ctx
            .attach_surface(vk::SurfaceKHR::from_raw(9), SurfaceOwnership::Owned)
            .unwrap_err();
        assert!(err.is_unrecoverable());
        assert_eq!(err.stage(), Some(Stage::SurfaceCreation));
        assert_eq!(err.fatal_kind(), Some(&Fatal::DeviceAlreadyCreated));
        assert_eq!(ctx.surface(), vk::SurfaceKHR::null());
        drop(ctx);
        assert!(!log.borrow().contains(&Call::DestroySurface));
    }
}
