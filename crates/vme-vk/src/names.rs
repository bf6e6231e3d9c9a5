// SPDX-License-Identifier: CEPL-1.0
//! Extension/layer name lists as handed to the create-info structs.

use std::ffi::{c_char, CStr};

pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";
pub const PORTABILITY_SUBSET: &CStr = c"VK_KHR_portability_subset";

/// Drops repeated names, keeping the first occurrence and the original order.
/// The loader rejects create infos that name an extension twice.
pub(crate) fn dedup_names<'a>(names: impl IntoIterator<Item = &'a CStr>) -> Vec<&'a CStr> {
    let mut out: Vec<&CStr> = Vec::new();
    for name in names {
        if !out.contains(&name) {
            out.push(name);
        }
    }
    out
}

pub(crate) fn name_ptrs(names: &[&CStr]) -> Vec<*const c_char> {
    names.iter().map(|n| n.as_ptr()).collect()
}

/// `(count, pointer)` for a create-info name array; null when empty.
pub(crate) fn name_array(ptrs: &[*const c_char]) -> (u32, *const *const c_char) {
    if ptrs.is_empty() {
        (0, std::ptr::null())
    } else {
        (ptrs.len() as u32, ptrs.as_ptr())
    }
}
