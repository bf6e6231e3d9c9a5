// SPDX-License-Identifier: CEPL-1.0
use std::ffi::CString;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{info, warn};
use vme_vk::{vk, DeviceBuilder, GpuSelector, InstanceBuilder};

#[derive(Debug, Deserialize, Default)]
pub struct AppCfg {
    #[serde(default)]
    pub instance: InstanceCfg,
    #[serde(default)]
    pub gpu: GpuCfg,
    #[serde(default)]
    pub device: DeviceCfg,
    #[serde(default)]
    pub window: WindowCfg,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InstanceCfg {
    #[serde(default = "default_app_name")]
    pub app_name: String,
    #[serde(default = "default_api_version")]
    pub api_version: [u32; 2],
    /// Unset: on in debug builds.
    #[serde(default)]
    pub validation: Option<bool>,
    /// Unset: on for macOS/iOS.
    #[serde(default)]
    pub portability: Option<bool>,
    #[serde(default)]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub layers: Vec<String>,
}

impl Default for InstanceCfg {
    fn default() -> Self {
        InstanceCfg {
            app_name: default_app_name(),
            api_version: default_api_version(),
            validation: None,
            portability: None,
            extensions: Vec::new(),
            layers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum GpuPreference {
    #[default]
    Discrete,
    Integrated,
    Virtual,
    Cpu,
}

impl GpuPreference {
    pub fn device_type(self) -> vk::PhysicalDeviceType {
        match self {
            GpuPreference::Discrete => vk::PhysicalDeviceType::DISCRETE_GPU,
            GpuPreference::Integrated => vk::PhysicalDeviceType::INTEGRATED_GPU,
            GpuPreference::Virtual => vk::PhysicalDeviceType::VIRTUAL_GPU,
            GpuPreference::Cpu => vk::PhysicalDeviceType::CPU,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone, Copy)]
pub struct GpuCfg {
    #[serde(default)]
    pub prefer: GpuPreference,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct DeviceCfg {
    #[serde(default)]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub layers: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WindowCfg {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default)]
    pub headless: bool,
}

impl Default for WindowCfg {
    fn default() -> Self {
        WindowCfg {
            title: default_title(),
            width: default_width(),
            height: default_height(),
            headless: false,
        }
    }
}

fn default_app_name() -> String {
    "vme".into()
}
fn default_api_version() -> [u32; 2] {
    [1, 3]
}
fn default_title() -> String {
    "vme".into()
}
fn default_width() -> u32 {
    1280
}
fn default_height() -> u32 {
    720
}

pub fn parse_cfg(s: &str) -> Result<AppCfg, toml::de::Error> {
    toml::from_str::<AppCfg>(s)
}

/// Missing file means defaults; a malformed one is reported and ignored.
pub fn load_cfg(path: &Path) -> AppCfg {
    match fs::read_to_string(path) {
        Ok(s) => match parse_cfg(&s) {
            Ok(cfg) => {
                info!("config loaded from {}", path.display());
                cfg
            }
            Err(e) => {
                warn!("ignoring {}: {e}", path.display());
                AppCfg::default()
            }
        },
        Err(_) => AppCfg::default(),
    }
}

fn c_name(s: &str) -> Result<CString> {
    CString::new(s).with_context(|| format!("name {s:?} contains a NUL byte"))
}

impl InstanceCfg {
    pub fn builder(&self) -> Result<InstanceBuilder> {
        let [major, minor] = self.api_version;
        let mut b = InstanceBuilder::new()
            .app_name(c_name(&self.app_name)?)
            .api_version(major, minor);
        if let Some(on) = self.validation {
            b = b.validation(on);
        }
        if let Some(on) = self.portability {
            b = b.portability(on);
        }
        for e in &self.extensions {
            b = b.extension(c_name(e)?);
        }
        for l in &self.layers {
            b = b.layer(c_name(l)?);
        }
        Ok(b)
    }
}

impl GpuCfg {
    pub fn selector(&self) -> GpuSelector {
        GpuSelector::new().prefer(self.prefer.device_type())
    }
}

impl DeviceCfg {
    pub fn builder(&self) -> Result<DeviceBuilder> {
        let mut b = DeviceBuilder::new();
        for e in &self.extensions {
            b = b.extension(c_name(e)?);
        }
        for l in &self.layers {
            b = b.layer(c_name(l)?);
        }
        Ok(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg = parse_cfg("").unwrap();
        assert_eq!(cfg.instance.app_name, "vme");
        assert_eq!(cfg.instance.api_version, [1, 3]);
        assert_eq!(cfg.instance.validation, None);
        assert_eq!(cfg.gpu.prefer, GpuPreference::Discrete);
        assert_eq!((cfg.window.width, cfg.window.height), (1280, 720));
        assert!(!cfg.window.headless);
    }

    #[test]
    fn sections_override_defaults() {
        let cfg = parse_cfg(
            r#"
            [instance]
            app_name = "sandbox"
            api_version = [1, 2]
            validation = false
            extensions = ["VK_EXT_swapchain_colorspace"]

            [gpu]
            prefer = "integrated"

            [device]
            extensions = ["VK_KHR_synchronization2"]

            [window]
            headless = true
            "#,
        )
        .unwrap();
        assert_eq!(cfg.instance.app_name, "sandbox");
        assert_eq!(cfg.instance.api_version, [1, 2]);
        assert_eq!(cfg.instance.validation, Some(false));
        assert_eq!(cfg.gpu.prefer, GpuPreference::Integrated);
        assert_eq!(cfg.device.extensions, vec!["VK_KHR_synchronization2"]);
        assert!(cfg.window.headless);
        assert_eq!(cfg.window.title, "vme");
    }

    #[test]
    fn unknown_preference_is_rejected() {
        assert!(parse_cfg("[gpu]\nprefer = \"fastest\"").is_err());
    }

    #[test]
    fn builders_carry_config() {
        let cfg = parse_cfg("[instance]\napi_version = [1, 1]\nvalidation = true").unwrap();
        let b = cfg.instance.builder().unwrap();
        assert_eq!(b.requested_api_version(), vk::API_VERSION_1_1);
        assert!(b.validation_enabled());
        assert!(cfg.device.builder().is_ok());
    }

    #[test]
    fn nul_in_name_is_an_error() {
        let cfg = InstanceCfg {
            extensions: vec!["VK_\0bad".into()],
            ..InstanceCfg::default()
        };
        assert!(cfg.builder().is_err());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = load_cfg(Path::new("definitely/not/here/vme.toml"));
        assert_eq!(cfg.instance.app_name, "vme");
    }
}
