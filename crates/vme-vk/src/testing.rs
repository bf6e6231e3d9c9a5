// SPDX-License-Identifier: CEPL-1.0
//! Recording driver for unit tests.

use std::cell::RefCell;
use std::ffi::{c_char, CStr, CString};
use std::rc::Rc;

use ash::prelude::VkResult;
use ash::vk::{self, Handle};

use crate::driver::Driver;

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Call {
    CreateInstance,
    CreateDebugMessenger,
    EnumeratePhysicalDevices,
    QueueFamilyProperties,
    CreateDevice,
    GetDeviceQueue(u32),
    WaitIdle,
    DestroyDevice,
    DestroyDebugMessenger,
    DestroySurface,
    DestroyInstance,
}

pub(crate) struct MockGpu {
    pub device_type: vk::PhysicalDeviceType,
    pub name: &'static str,
    pub families: Vec<vk::QueueFlags>,
    pub extensions: Vec<&'static CStr>,
    pub presents: bool,
}

impl MockGpu {
    pub fn of_type(device_type: vk::PhysicalDeviceType) -> Self {
        Self {
            device_type,
            name: "mock gpu",
            families: vec![
                vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER,
            ],
            extensions: Vec::new(),
            presents: true,
        }
    }

    pub fn with_families(mut self, families: Vec<vk::QueueFlags>) -> Self {
        self.families = families;
        self
    }
}

/// What a create call was handed, decoded from the raw pointers.
#[derive(Clone, Debug, Default)]
pub(crate) struct Recorded {
    pub extensions: Vec<String>,
    pub layers: Vec<String>,
    pub extension_count: u32,
    pub extensions_null: bool,
    pub layers_null: bool,
    pub flags: u32,
    pub api_version: u32,
    pub app_name: Option<String>,
    /// (family index, queue count) per queue create info.
    pub queue_infos: Vec<(u32, u32)>,
}

#[derive(Default)]
pub(crate) struct MockDriver {
    pub gpus: Vec<MockGpu>,
    pub instance_error: Option<vk::Result>,
    pub messenger_error: Option<vk::Result>,
    pub device_error: Option<vk::Result>,
    pub surface_error: Option<vk::Result>,
    /// Second physical-device query reports this many fewer devices.
    pub vanish_on_fill: u32,
    pub instance_info: Option<Recorded>,
    pub device_info: Option<Recorded>,
    log: Rc<RefCell<Vec<Call>>>,
}

impl MockDriver {
    pub fn with_gpus(gpus: Vec<MockGpu>) -> Self {
        Self {
            gpus,
            ..Self::default()
        }
    }

    /// Shared call log that outlives the driver (and the Context owning it).
    pub fn log(&self) -> Rc<RefCell<Vec<Call>>> {
        self.log.clone()
    }

    fn record(&self, call: Call) {
        self.log.borrow_mut().push(call);
    }

    fn gpu(&self, handle: vk::PhysicalDevice) -> Option<&MockGpu> {
        let raw = handle.as_raw();
        raw.checked_sub(100).and_then(|i| self.gpus.get(i as usize))
    }
}

unsafe fn read_names(count: u32, ptr: *const *const c_char) -> Vec<String> {
    if ptr.is_null() {
        return Vec::new();
    }
    unsafe {
        std::slice::from_raw_parts(ptr, count as usize)
            .iter()
            .map(|&p| CStr::from_ptr(p).to_string_lossy().into_owned())
            .collect()
    }
}

fn fill<T: Copy>(src: &[T], count: &mut u32, out: Option<&mut [T]>) -> vk::Result {
    match out {
        None => {
            *count = src.len() as u32;
            vk::Result::SUCCESS
        }
        Some(buf) => {
            let n = (*count as usize).min(buf.len()).min(src.len());
            buf[..n].copy_from_slice(&src[..n]);
            *count = n as u32;
            if n < src.len() {
                vk::Result::INCOMPLETE
            } else {
                vk::Result::SUCCESS
            }
        }
    }
}

impl Driver for MockDriver {
    fn create_instance(
        &mut self,
        info: &vk::InstanceCreateInfo<'_>,
        _alloc: Option<&vk::AllocationCallbacks<'_>>,
    ) -> VkResult<vk::Instance> {
        self.record(Call::CreateInstance);
        let app = unsafe { &*info.p_application_info };
        let app_name = (!app.p_application_name.is_null()).then(|| unsafe {
            CStr::from_ptr(app.p_application_name)
                .to_string_lossy()
                .into_owned()
        });
        self.instance_info = Some(Recorded {
            extensions: unsafe {
                read_names(info.enabled_extension_count, info.pp_enabled_extension_names)
            },
            layers: unsafe { read_names(info.enabled_layer_count, info.pp_enabled_layer_names) },
            extension_count: info.enabled_extension_count,
            extensions_null: info.pp_enabled_extension_names.is_null(),
            layers_null: info.pp_enabled_layer_names.is_null(),
            flags: info.flags.as_raw(),
            api_version: app.api_version,
            app_name,
            queue_infos: Vec::new(),
        });
        match self.instance_error {
            Some(result) => Err(result),
            None => Ok(vk::Instance::from_raw(1)),
        }
    }

    fn create_debug_messenger(
        &mut self,
        _instance: vk::Instance,
        _info: &vk::DebugUtilsMessengerCreateInfoEXT<'_>,
        _alloc: Option<&vk::AllocationCallbacks<'_>>,
    ) -> VkResult<vk::DebugUtilsMessengerEXT> {
        self.record(Call::CreateDebugMessenger);
        match self.messenger_error {
            Some(result) => Err(result),
            None => Ok(vk::DebugUtilsMessengerEXT::from_raw(2)),
        }
    }

    fn enumerate_physical_devices(
        &self,
        _instance: vk::Instance,
        count: &mut u32,
        out: Option<&mut [vk::PhysicalDevice]>,
    ) -> vk::Result {
        self.record(Call::EnumeratePhysicalDevices);
        let mut handles: Vec<vk::PhysicalDevice> = (0..self.gpus.len())
            .map(|i| vk::PhysicalDevice::from_raw(100 + i as u64))
            .collect();
        if out.is_some() {
            let keep = handles.len().saturating_sub(self.vanish_on_fill as usize);
            handles.truncate(keep);
        }
        fill(&handles, count, out)
    }

    fn physical_device_properties(
        &self,
        gpu: vk::PhysicalDevice,
    ) -> vk::PhysicalDeviceProperties {
        let mut props = vk::PhysicalDeviceProperties::default();
        if let Some(g) = self.gpu(gpu) {
            props.device_type = g.device_type;
            props.api_version = vk::API_VERSION_1_3;
            for (dst, src) in props.device_name.iter_mut().zip(g.name.bytes()) {
                *dst = src as c_char;
            }
        }
        props
    }

    fn queue_family_properties(
        &self,
        gpu: vk::PhysicalDevice,
        count: &mut u32,
        out: Option<&mut [vk::QueueFamilyProperties]>,
    ) -> vk::Result {
        self.record(Call::QueueFamilyProperties);
        let families: Vec<vk::QueueFamilyProperties> = self
            .gpu(gpu)
            .map(|g| {
                g.families
                    .iter()
                    .map(|&queue_flags| vk::QueueFamilyProperties {
                        queue_flags,
                        queue_count: 4,
                        ..Default::default()
                    })
                    .collect()
            })
            .unwrap_or_default();
        fill(&families, count, out)
    }

    fn device_extension_names(&self, gpu: vk::PhysicalDevice) -> VkResult<Vec<CString>> {
        Ok(self
            .gpu(gpu)
            .map(|g| g.extensions.iter().map(|&n| n.to_owned()).collect())
            .unwrap_or_default())
    }

    fn surface_support(
        &self,
        gpu: vk::PhysicalDevice,
        _family: u32,
        _surface: vk::SurfaceKHR,
    ) -> VkResult<bool> {
        match self.surface_error {
            Some(result) => Err(result),
            None => Ok(self.gpu(gpu).is_some_and(|g| g.presents)),
        }
    }

    fn create_device(
        &mut self,
        _gpu: vk::PhysicalDevice,
        info: &vk::DeviceCreateInfo<'_>,
        _alloc: Option<&vk::AllocationCallbacks<'_>>,
    ) -> VkResult<vk::Device> {
        self.record(Call::CreateDevice);
        let queue_infos = if info.p_queue_create_infos.is_null() {
            Vec::new()
        } else {
            unsafe {
                std::slice::from_raw_parts(
                    info.p_queue_create_infos,
                    info.queue_create_info_count as usize,
                )
            }
            .iter()
            .map(|q| (q.queue_family_index, q.queue_count))
            .collect()
        };
        self.device_info = Some(Recorded {
            extensions: unsafe {
                read_names(info.enabled_extension_count, info.pp_enabled_extension_names)
            },
            layers: unsafe { read_names(info.enabled_layer_count, info.pp_enabled_layer_names) },
            extension_count: info.enabled_extension_count,
            extensions_null: info.pp_enabled_extension_names.is_null(),
            layers_null: info.pp_enabled_layer_names.is_null(),
            queue_infos,
            ..Recorded::default()
        });
        match self.device_error {
            Some(result) => Err(result),
            None => Ok(vk::Device::from_raw(3)),
        }
    }

    fn get_device_queue(&self, _device: vk::Device, family: u32, _index: u32) -> vk::Queue {
        self.record(Call::GetDeviceQueue(family));
        vk::Queue::from_raw(1000 + family as u64)
    }

    fn device_wait_idle(&self, _device: vk::Device) {
        self.record(Call::WaitIdle);
    }

    fn destroy_device(
        &mut self,
        _device: vk::Device,
        _alloc: Option<&vk::AllocationCallbacks<'_>>,
    ) {
        self.record(Call::DestroyDevice);
    }

    fn destroy_debug_messenger(
        &mut self,
        _instance: vk::Instance,
        _messenger: vk::DebugUtilsMessengerEXT,
        _alloc: Option<&vk::AllocationCallbacks<'_>>,
    ) {
        self.record(Call::DestroyDebugMessenger);
    }

    fn destroy_surface(
        &mut self,
        _instance: vk::Instance,
        _surface: vk::SurfaceKHR,
        _alloc: Option<&vk::AllocationCallbacks<'_>>,
    ) {
        self.record(Call::DestroySurface);
    }

    fn destroy_instance(
        &mut self,
        _instance: vk::Instance,
        _alloc: Option<&vk::AllocationCallbacks<'_>>,
    ) {
        self.record(Call::DestroyInstance);
    }
}
