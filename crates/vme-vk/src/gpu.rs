// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use tracing::{debug, info, warn};

use crate::context::{Context, GpuInfo};
use crate::driver::Driver;
use crate::enumerate::two_step;
use crate::error::{BootstrapError, Fatal, Result, Stage};

/// Picks the physical device a [`Context`] will build its logical device on.
///
/// The policy is first-match: the first device (in enumeration order) of the
/// preferred type wins, otherwise device 0. Devices are never ranked by
/// memory size, queue depth or feature bits.
#[derive(Clone, Copy, Debug)]
pub struct GpuSelector {
    preferred: vk::PhysicalDeviceType,
}

impl Default for GpuSelector {
    fn default() -> Self {
        Self {
            preferred: vk::PhysicalDeviceType::DISCRETE_GPU,
        }
    }
}

impl GpuSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Device type to look for first. `DISCRETE_GPU` unless changed.
    pub fn prefer(mut self, device_type: vk::PhysicalDeviceType) -> Self {
        self.preferred = device_type;
        self
    }

    /// Enumerates every physical device of the instance and records the pick
    /// in `ctx`. Zero devices is unrecoverable, and so is selecting twice.
    pub fn select<D: Driver>(&self, ctx: &mut Context<D>) -> Result<GpuInfo> {
        if !ctx.has_instance() {
            return Err(BootstrapError::fatal(
                Stage::DeviceEnumeration,
                Fatal::InstanceMissing,
            ));
        }
        if ctx.chosen_gpu != vk::PhysicalDevice::null() {
            return Err(BootstrapError::fatal(
                Stage::DeviceEnumeration,
                Fatal::GpuAlreadySelected,
            ));
        }

        let instance = ctx.instance;
        let gpus = two_step(
            Stage::DeviceEnumeration,
            vk::PhysicalDevice::null(),
            |count, out| ctx.driver.enumerate_physical_devices(instance, count, out),
        )?;
        if gpus.is_empty() {
            return Err(BootstrapError::fatal(
                Stage::DeviceEnumeration,
                Fatal::NoPhysicalDevices,
            ));
        }

        let props: Vec<vk::PhysicalDeviceProperties> = gpus
            .iter()
            .map(|&gpu| ctx.driver.physical_device_properties(gpu))
            .collect();
        for (i, p) in props.iter().enumerate() {
            debug!("gpu[{i}] {} ({:?})", device_name(p), p.device_type);
        }

        let types: Vec<vk::PhysicalDeviceType> = props.iter().map(|p| p.device_type).collect();
        let index = first_of_type(&types, self.preferred);
        let chosen = &props[index];
        if chosen.device_type != self.preferred {
            warn!(
                "no {:?} device among {}; falling back to gpu[0]",
                self.preferred,
                gpus.len()
            );
        }

        let info = GpuInfo {
            index,
            handle: gpus[index],
            name: device_name(chosen),
            device_type: chosen.device_type,
            api_version: chosen.api_version,
        };
        info!(
            "selected gpu[{}] {} ({:?}, api {}.{})",
            info.index,
            info.name,
            info.device_type,
            vk::api_version_major(info.api_version),
            vk::api_version_minor(info.api_version)
        );
        ctx.chosen_gpu = info.handle;
        ctx.gpu_info = Some(info.clone());
        Ok(info)
    }
}

/// Index of the first `preferred` entry, or 0 when none matches.
pub fn first_of_type(
    types: &[vk::PhysicalDeviceType],
    preferred: vk::PhysicalDeviceType,
) -> usize {
    types.iter().position(|&t| t == preferred).unwrap_or(0)
}

fn device_name(props: &vk::PhysicalDeviceProperties) -> String {
    props
        .device_name_as_c_str()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|_| String::from("<unnamed>"))
}
