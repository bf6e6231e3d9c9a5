// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
//! Windowing glue. The GPU core only needs a display handle for extension
//! queries and, optionally, a window handle for a presentation surface.

pub use winit;

use anyhow::{Context, Result};
use tracing::info;
use winit::{dpi::LogicalSize, event_loop::ActiveEventLoop, window::Window};

/// Owns at most one native window.
///
/// `open` and `close` pair up: a window is torn down only if it was actually
/// created, and only once, no matter how many times `close` runs.
pub struct WindowHost {
    title: String,
    width: u32,
    height: u32,
    window: Option<Window>,
}

impl WindowHost {
    pub fn new(title: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            title: title.into(),
            width: width.max(1),
            height: height.max(1),
            window: None,
        }
    }

    /// Creates the window on first call; later calls return the existing one.
    pub fn open(&mut self, event_loop: &ActiveEventLoop) -> Result<&Window> {
        if self.window.is_none() {
            let attrs = Window::default_attributes()
                .with_title(self.title.clone())
                .with_inner_size(LogicalSize::new(self.width, self.height));
            let window = event_loop
                .create_window(attrs)
                .context("create_window")?;
            info!("window opened ({}x{})", self.width, self.height);
            self.window = Some(window);
        }
        self.window.as_ref().context("window missing after open")
    }

    pub fn window(&self) -> Option<&Window> {
        self.window.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.window.is_some()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Returns `true` only when a live window was torn down by this call.
    pub fn close(&mut self) -> bool {
        match self.window.take() {
            Some(window) => {
                drop(window);
                info!("window closed");
                true
            }
            None => false,
        }
    }
}

impl Drop for WindowHost {
    fn drop(&mut self) {
        self.close();
    }
}
