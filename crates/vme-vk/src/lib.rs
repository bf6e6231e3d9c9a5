// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
//! Vulkan execution-context bootstrap.
//!
//! Stages run strictly in order, each writing into one [`Context`]:
//!
//! 1. [`InstanceBuilder::build`] creates the instance (and debug messenger).
//! 2. [`GpuSelector::select`] picks a physical device.
//! 3. [`DeviceBuilder::build`] assigns queue families and creates the device.
//!
//! Dropping the [`Context`] destroys everything in reverse.

mod context;
mod device;
mod driver;
mod enumerate;
mod error;
mod gpu;
mod instance;
mod names;
mod surface;

#[cfg(test)]
mod testing;

pub use ash::vk;

pub use context::{Context, DeviceQueue, GpuInfo, QueueRole, SurfaceOwnership};
pub use device::{DeviceBuilder, QueueAssignment};
pub use driver::{AshDriver, Driver};
pub use error::{BootstrapError, Fatal, Result, Stage};
pub use gpu::{first_of_type, GpuSelector};
pub use instance::InstanceBuilder;
pub use names::{PORTABILITY_SUBSET, VALIDATION_LAYER};
pub use surface::{DisplayExtensions, Headless, WindowSystem};
