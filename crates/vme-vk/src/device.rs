// SPDX-License-Identifier: CEPL-1.0
use std::ffi::{CStr, CString};

use ash::khr::swapchain;
use ash::vk;
use tracing::{debug, info, warn};

use crate::context::{Context, DeviceQueue, QueueRole};
use crate::driver::Driver;
use crate::enumerate::two_step;
use crate::error::{BootstrapError, Fatal, Result, Stage};
use crate::names::{dedup_names, name_array, name_ptrs, PORTABILITY_SUBSET};

static QUEUE_PRIORITIES: [f32; 1] = [1.0];

/// Queue family chosen for each role, if any.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueAssignment {
    pub graphics: Option<u32>,
    pub compute: Option<u32>,
    pub transfer: Option<u32>,
}

impl QueueAssignment {
    /// Greedy single pass over the families, in order:
    /// - graphics: first family with the graphics bit;
    /// - compute: first family with the compute bit whose index is not the
    ///   graphics family's (a graphics-capable family still qualifies);
    /// - transfer: first family with the transfer bit and neither graphics
    ///   nor compute, i.e. a dedicated copy queue.
    pub fn select(families: &[vk::QueueFlags]) -> Self {
        let mut out = Self::default();
        for (i, &flags) in families.iter().enumerate() {
            let i = i as u32;
            if out.graphics.is_none() && flags.contains(vk::QueueFlags::GRAPHICS) {
                out.graphics = Some(i);
            }
            if out.compute.is_none()
                && flags.contains(vk::QueueFlags::COMPUTE)
                && out.graphics != Some(i)
            {
                out.compute = Some(i);
            }
            if out.transfer.is_none()
                && flags.contains(vk::QueueFlags::TRANSFER)
                && !flags.intersects(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)
            {
                out.transfer = Some(i);
            }
        }
        out
    }

    pub fn family(&self, role: QueueRole) -> Option<u32> {
        match role {
            QueueRole::Graphics => self.graphics,
            QueueRole::Compute => self.compute,
            QueueRole::Transfer => self.transfer,
        }
    }

    /// Assigned `(role, family)` pairs in graphics, compute, transfer order.
    pub fn roles(&self) -> impl Iterator<Item = (QueueRole, u32)> + '_ {
        [QueueRole::Graphics, QueueRole::Compute, QueueRole::Transfer]
            .into_iter()
            .filter_map(|role| self.family(role).map(|f| (role, f)))
    }

    pub fn is_empty(&self) -> bool {
        self.roles().next().is_none()
    }
}

/// Extensions, layers and features for the logical device.
#[derive(Clone, Debug, Default)]
pub struct DeviceBuilder {
    extensions: Vec<CString>,
    layers: Vec<CString>,
    features: vk::PhysicalDeviceFeatures,
}

impl DeviceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extension(mut self, name: impl AsRef<CStr>) -> Self {
        self.extensions.push(name.as_ref().to_owned());
        self
    }

    /// Device layers are ignored by current loaders but still passed along.
    pub fn layer(mut self, name: impl AsRef<CStr>) -> Self {
        self.layers.push(name.as_ref().to_owned());
        self
    }

    pub fn features(mut self, features: vk::PhysicalDeviceFeatures) -> Self {
        self.features = features;
        self
    }

    /// Creates the logical device on the selected GPU, one queue per
    /// assigned family, and stores device and queues in `ctx`.
    ///
    /// Building before a GPU is selected, or a second time, is unrecoverable.
    /// A native failure leaves `ctx` untouched.
    pub fn build<D: Driver>(&self, ctx: &mut Context<D>) -> Result<vk::Device> {
        if ctx.chosen_gpu == vk::PhysicalDevice::null() {
            return Err(BootstrapError::fatal(
                Stage::DeviceCreation,
                Fatal::GpuNotSelected,
            ));
        }
        if ctx.has_device() {
            return Err(BootstrapError::fatal(
                Stage::DeviceCreation,
                Fatal::DeviceAlreadyCreated,
            ));
        }
        let gpu = ctx.chosen_gpu;

        let families = two_step(
            Stage::QueueEnumeration,
            vk::QueueFamilyProperties::default(),
            |count, out| ctx.driver.queue_family_properties(gpu, count, out),
        )?;
        let flags: Vec<vk::QueueFlags> = families.iter().map(|f| f.queue_flags).collect();
        let assignment = QueueAssignment::select(&flags);
        if assignment.is_empty() {
            return Err(BootstrapError::fatal(
                Stage::DeviceCreation,
                Fatal::NoUsableQueueFamily,
            ));
        }
        for (role, family) in assignment.roles() {
            debug!("{role} queue -> family {family} ({:?})", flags[family as usize]);
        }

        // One entry per assigned family; the roles never share an index.
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = assignment
            .roles()
            .map(|(_, family)| vk::DeviceQueueCreateInfo {
                s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
                queue_family_index: family,
                queue_count: 1,
                p_queue_priorities: QUEUE_PRIORITIES.as_ptr(),
                ..Default::default()
            })
            .collect();

        let available = ctx
            .driver
            .device_extension_names(gpu)
            .map_err(|result| BootstrapError::vulkan(Stage::DeviceCreation, result))?;
        let has = |name: &CStr| available.iter().any(|a| a.as_c_str() == name);

        let has_surface = ctx.surface != vk::SurfaceKHR::null();
        let mut extensions: Vec<&CStr> = self.extensions.iter().map(CString::as_c_str).collect();
        if has_surface {
            extensions.push(swapchain::NAME);
        }
        if has(PORTABILITY_SUBSET) {
            extensions.push(PORTABILITY_SUBSET);
        }
        let extensions = dedup_names(extensions);
        let layers = dedup_names(self.layers.iter().map(CString::as_c_str));
        for missing in extensions.iter().filter(|&&e| !has(e)) {
            warn!("device does not advertise {missing:?}");
        }

        let graphics_presents = match (assignment.graphics, has_surface) {
            (Some(family), true) => match ctx.driver.surface_support(gpu, family, ctx.surface) {
                Ok(true) => true,
                Ok(false) => {
                    warn!("graphics family {family} cannot present to the attached surface");
                    false
                }
                Err(result) => {
                    warn!("present support query for family {family} failed: {result}");
                    false
                }
            },
            _ => false,
        };

        let ext_ptrs = name_ptrs(&extensions);
        let layer_ptrs = name_ptrs(&layers);
        let (enabled_extension_count, pp_enabled_extension_names) = name_array(&ext_ptrs);
        let (enabled_layer_count, pp_enabled_layer_names) = name_array(&layer_ptrs);

        let create_info = vk::DeviceCreateInfo {
            s_type: vk::StructureType::DEVICE_CREATE_INFO,
            queue_create_info_count: queue_infos.len() as u32,
            p_queue_create_infos: queue_infos.as_ptr(),
            enabled_extension_count,
            pp_enabled_extension_names,
            enabled_layer_count,
            pp_enabled_layer_names,
            p_enabled_features: &self.features,
            ..Default::default()
        };

        let device = ctx
            .driver
            .create_device(gpu, &create_info, ctx.allocation_callbacks.as_ref())
            .map_err(|result| BootstrapError::vulkan(Stage::DeviceCreation, result))?;

        let queues: Vec<DeviceQueue> = assignment
            .roles()
            .map(|(role, family)| DeviceQueue {
                role,
                family_index: family,
                queue: ctx.driver.get_device_queue(device, family, 0),
                presents: role == QueueRole::Graphics && graphics_presents,
            })
            .collect();

        ctx.device = device;
        ctx.queues = queues;
        info!(
            "logical device ready ({} queues, {} extensions)",
            ctx.queues.len(),
            extensions.len()
        );
        Ok(device)
    }
}
