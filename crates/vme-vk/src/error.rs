// SPDX-License-Identifier: CEPL-1.0
use std::fmt;

use ash::vk;
use thiserror::Error;

/// Bootstrap stage a failure is attributed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    DriverProbe,
    InstanceCreation,
    DeviceEnumeration,
    QueueEnumeration,
    SurfaceCreation,
    DeviceCreation,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::DriverProbe => "driver probe",
            Stage::InstanceCreation => "instance creation",
            Stage::DeviceEnumeration => "device enumeration",
            Stage::QueueEnumeration => "queue family enumeration",
            Stage::SurfaceCreation => "surface creation",
            Stage::DeviceCreation => "device creation",
        })
    }
}

/// Conditions with no recovery path. The binary terminates on these.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Fatal {
    #[error("no Vulkan driver could be loaded: {0}")]
    NoDriver(String),
    #[error("the installed driver is incompatible with the requested API")]
    IncompatibleDriver,
    #[error("no physical devices were enumerated")]
    NoPhysicalDevices,
    #[error("no queue family offers graphics, compute or transfer")]
    NoUsableQueueFamily,
    #[error("instance has not been created")]
    InstanceMissing,
    #[error("instance was already created")]
    InstanceAlreadyCreated,
    #[error("no GPU has been selected")]
    GpuNotSelected,
    #[error("a GPU was already selected")]
    GpuAlreadySelected,
    #[error("logical device was already created")]
    DeviceAlreadyCreated,
    #[error("a surface is already attached")]
    SurfaceAlreadyAttached,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("{stage}: unrecoverable: {fatal}")]
    Unrecoverable { stage: Stage, fatal: Fatal },

    #[error("{stage} failed: {result}")]
    Vulkan { stage: Stage, result: vk::Result },

    /// `incomplete` is set when the driver had more entries than counted.
    #[error(
        "{stage}: count changed between queries (counted {expected}, filled {written}{})",
        more_available(.incomplete)
    )]
    TopologyChanged {
        stage: Stage,
        expected: u32,
        written: u32,
        incomplete: bool,
    },

    #[error("window handle unavailable: {0}")]
    WindowHandle(#[from] raw_window_handle::HandleError),
}

impl BootstrapError {
    pub(crate) fn fatal(stage: Stage, fatal: Fatal) -> Self {
        BootstrapError::Unrecoverable { stage, fatal }
    }

    pub(crate) fn vulkan(stage: Stage, result: vk::Result) -> Self {
        BootstrapError::Vulkan { stage, result }
    }

    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, BootstrapError::Unrecoverable { .. })
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            BootstrapError::Unrecoverable { stage, .. }
            | BootstrapError::Vulkan { stage, .. }
            | BootstrapError::TopologyChanged { stage, .. } => Some(*stage),
            BootstrapError::WindowHandle(_) => None,
        }
    }

    /// Native result code, when the failure came straight from the driver.
    pub fn result(&self) -> Option<vk::Result> {
        match self {
            BootstrapError::Vulkan { result, .. } => Some(*result),
            _ => None,
        }
    }

    pub fn fatal_kind(&self) -> Option<&Fatal> {
        match self {
            BootstrapError::Unrecoverable { fatal, .. } => Some(fatal),
            _ => None,
        }
    }
}

fn more_available(incomplete: &bool) -> &'static str {
    if *incomplete {
        ", more available"
    } else {
        ""
    }
}

pub type Result<T, E = BootstrapError> = std::result::Result<T, E>;
