// SPDX-License-Identifier: CEPL-1.0
use anyhow::Result;
use tracing::{error, info, warn};
use vme_platform::winit::window::Window;
use vme_vk::{
    vk, AshDriver, BootstrapError, Context, DisplayExtensions, Driver, Headless, InstanceBuilder,
    WindowSystem,
};

use crate::config::AppCfg;

/// Runs driver probe -> instance -> (surface) -> gpu -> device.
pub fn bootstrap(cfg: &AppCfg, window: Option<&Window>) -> Result<Context<AshDriver>> {
    let mut ctx = Context::new(AshDriver::load()?);

    let instance = cfg.instance.builder()?;
    match window {
        Some(w) => create_instance(&mut ctx, &instance, &DisplayExtensions(w))?,
        None => create_instance(&mut ctx, &instance, &Headless)?,
    }

    if let Some(w) = window {
        ctx.create_surface(w, w)?;
    }

    cfg.gpu.selector().select(&mut ctx)?;
    cfg.device.builder()?.build(&mut ctx)?;

    for q in ctx.queues() {
        info!(
            "{} queue: family {}{}",
            q.role,
            q.family_index,
            if q.presents { " (presents)" } else { "" }
        );
    }
    Ok(ctx)
}

/// A missing validation layer shouldn't keep the app from starting.
fn create_instance<D: Driver>(
    ctx: &mut Context<D>,
    builder: &InstanceBuilder,
    window: &dyn WindowSystem,
) -> Result<(), BootstrapError> {
    match builder.build(ctx, window) {
        Err(e)
            if builder.validation_enabled()
                && matches!(
                    e.result(),
                    Some(vk::Result::ERROR_LAYER_NOT_PRESENT)
                        | Some(vk::Result::ERROR_EXTENSION_NOT_PRESENT)
                ) =>
        {
            warn!("{e}; retrying without validation");
            builder.clone().validation(false).build(ctx, window)?;
            Ok(())
        }
        other => other.map(|_| ()),
    }
}

/// Logs a bootstrap failure; fatal ones carry their stage in the message.
pub fn report(err: &anyhow::Error) {
    error!("{}", describe(err));
}

fn describe(err: &anyhow::Error) -> String {
    match err.downcast_ref::<BootstrapError>() {
        Some(e) if e.is_unrecoverable() => format!("fatal: {e}"),
        Some(e) => format!("GPU bootstrap failed: {e}"),
        None => format!("{err:#}"),
    }
}
