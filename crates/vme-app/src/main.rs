// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
mod bootstrap;
mod config;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{debug, info};
use vme_core::init_tracing;
use vme_platform::WindowHost;
use vme_vk::{AshDriver, Context};

use vme_platform::winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::WindowId,
};

use crate::bootstrap::{bootstrap, report};
use crate::config::{load_cfg, AppCfg, GpuPreference};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file
    #[arg(long, default_value = "vme.toml")]
    config: PathBuf,
    /// Application name reported to the driver
    #[arg(long)]
    app_name: Option<String>,
    /// Bootstrap without opening a window
    #[arg(long)]
    headless: bool,
    /// Force the validation layer on or off
    #[arg(long)]
    validation: Option<bool>,
    /// Device type to pick first
    #[arg(long, value_enum)]
    prefer: Option<GpuPreference>,
}

impl Args {
    fn apply(&self, cfg: &mut AppCfg) {
        if let Some(name) = &self.app_name {
            cfg.instance.app_name = name.clone();
        }
        if self.headless {
            cfg.window.headless = true;
        }
        if self.validation.is_some() {
            cfg.instance.validation = self.validation;
        }
        if let Some(prefer) = self.prefer {
            cfg.gpu.prefer = prefer;
        }
    }
}

struct App {
    cfg: AppCfg,
    // Declared before `host`: the surface must go before its window.
    gpu: Option<Context<AshDriver>>,
    host: WindowHost,
    failure: Option<anyhow::Error>,
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        event_loop.set_control_flow(ControlFlow::Wait);
        if self.gpu.is_some() || self.failure.is_some() {
            return;
        }

        let result = self
            .host
            .open(event_loop)
            .and_then(|w| bootstrap(&self.cfg, Some(w)));
        match result {
            Ok(ctx) => {
                info!("GPU context ready");
                self.gpu = Some(ctx);
            }
            Err(e) => {
                report(&e);
                self.failure = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Some(window) = self.host.window() {
            if window_id != window.id() {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.gpu = None;
                self.host.close();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                debug!("Resized → {}x{}", size.width, size.height);
            }
            _ => {}
        }
    }
}

fn run_headless(cfg: &AppCfg) -> Result<()> {
    let ctx = bootstrap(cfg, None).inspect_err(report)?;
    info!("headless GPU context ready");
    drop(ctx);
    Ok(())
}

fn main() -> Result<()> {
    init_tracing("info");
    let args = Args::parse();
    let mut cfg = load_cfg(&args.config);
    args.apply(&mut cfg);

    if cfg.window.headless {
        return run_headless(&cfg);
    }

    let event_loop: EventLoop<()> = EventLoop::new()?;
    let host = WindowHost::new(cfg.window.title.clone(), cfg.window.width, cfg.window.height);
    let mut app = App {
        cfg,
        gpu: None,
        host,
        failure: None,
    };

    event_loop.run_app(&mut app)?;
    match app.failure.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
