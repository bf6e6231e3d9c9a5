// SPDX-License-Identifier: CEPL-1.0
use ash::vk;

use crate::error::{BootstrapError, Result, Stage};

/// Count-then-fill enumeration.
///
/// Both native calls are always made. The fill call gets a buffer of exactly
/// the counted size; if it reports `INCOMPLETE` or writes fewer entries the
/// device topology moved underneath us and the caller gets
/// [`BootstrapError::TopologyChanged`].
pub(crate) fn two_step<T: Copy>(
    stage: Stage,
    empty: T,
    mut query: impl FnMut(&mut u32, Option<&mut [T]>) -> vk::Result,
) -> Result<Vec<T>> {
    let mut expected = 0u32;
    match query(&mut expected, None) {
        vk::Result::SUCCESS => {}
        result => return Err(BootstrapError::vulkan(stage, result)),
    }

    let mut items = vec![empty; expected as usize];
    let mut written = expected;
    match query(&mut written, Some(&mut items)) {
        vk::Result::SUCCESS if written == expected => Ok(items),
        vk::Result::SUCCESS => Err(BootstrapError::TopologyChanged {
            stage,
            expected,
            written,
            incomplete: false,
        }),
        vk::Result::INCOMPLETE => Err(BootstrapError::TopologyChanged {
            stage,
            expected,
            written,
            incomplete: true,
        }),
        result => Err(BootstrapError::vulkan(stage, result)),
    }
}
