//! Vulkan instance management.
//!
//! Creates the VkInstance with the platform's surface extensions and,
//! optionally, the Khronos validation layer plus a debug messenger that
//! routes validation output into tracing. A requested but missing
//! validation layer is an initialization failure; there is no fallback
//! path.

use std::ffi::CStr;

use ash::{Entry, vk};
use tracing::{error, info, warn};

use crate::error::RhiError;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Vulkan instance wrapper with optional validation support.
pub struct Instance {
    entry: Entry,
    instance: ash::Instance,
    debug_utils: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
}

impl Instance {
    /// Creates the Vulkan instance.
    ///
    /// # Arguments
    ///
    /// * `enable_validation` - Enable the validation layer and debug
    ///   messenger
    ///
    /// # Errors
    ///
    /// Returns an error if the Vulkan library cannot be loaded, the
    /// validation layer was requested but is not installed, or instance
    /// creation fails.
    pub fn new(enable_validation: bool) -> Result<Self, RhiError> {
        let entry = unsafe { Entry::load()? };

        if enable_validation && !validation_layer_present(&entry)? {
            error!("Validation layer requested but not installed");
            return Err(RhiError::InvalidHandle(
                "validation layer requested but not available".to_string(),
            ));
        }

        let app_info = vk::ApplicationInfo::default()
            .application_name(c"Smalt")
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(c"Smalt")
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_1);

        let mut extensions = surface_extensions();
        if enable_validation {
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        }

        let layers: Vec<*const i8> = if enable_validation {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            Vec::new()
        };

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);

        let instance = unsafe { entry.create_instance(&create_info, None)? };
        info!("Vulkan instance created");

        let debug_utils = if enable_validation {
            let loader = ash::ext::debug_utils::Instance::new(&entry, &instance);

            let messenger_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
                .message_severity(
                    vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                        | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
                )
                .message_type(
                    vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                        | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                        | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
                )
                .pfn_user_callback(Some(debug_callback));

            let messenger =
                unsafe { loader.create_debug_utils_messenger(&messenger_info, None)? };

            info!("Validation layer enabled");
            Some((loader, messenger))
        } else {
            None
        };

        Ok(Self {
            entry,
            instance,
            debug_utils,
        })
    }

    /// Returns the Vulkan instance handle.
    #[inline]
    pub fn handle(&self) -> &ash::Instance {
        &self.instance
    }

    /// Returns the Vulkan entry point loader.
    #[inline]
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// True when the validation layer is active.
    #[inline]
    pub fn has_validation(&self) -> bool {
        self.debug_utils.is_some()
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            if let Some((loader, messenger)) = self.debug_utils.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
        info!("Vulkan instance destroyed");
    }
}

/// The surface extensions the current platform needs.
fn surface_extensions() -> Vec<*const i8> {
    let mut extensions = vec![ash::khr::surface::NAME.as_ptr()];

    #[cfg(target_os = "windows")]
    extensions.push(ash::khr::win32_surface::NAME.as_ptr());

    #[cfg(target_os = "linux")]
    {
        // X11 and Wayland both
        extensions.push(ash::khr::xlib_surface::NAME.as_ptr());
        extensions.push(ash::khr::wayland_surface::NAME.as_ptr());
    }

    #[cfg(target_os = "macos")]
    extensions.push(ash::ext::metal_surface::NAME.as_ptr());

    extensions
}

/// Checks whether the Khronos validation layer is installed.
fn validation_layer_present(entry: &Entry) -> Result<bool, RhiError> {
    let layers = unsafe { entry.enumerate_instance_layer_properties()? };

    Ok(layers.iter().any(|layer| {
        let name = unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) };
        name == VALIDATION_LAYER
    }))
}

/// Routes validation layer messages into tracing.
///
/// # Safety
///
/// Called from the Vulkan loader; must follow the debug-callback contract.
unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if callback_data.is_null() {
        return vk::FALSE;
    }

    let data = unsafe { &*callback_data };
    let message = if data.p_message.is_null() {
        std::borrow::Cow::Borrowed("(no message)")
    } else {
        unsafe { CStr::from_ptr(data.p_message).to_string_lossy() }
    };

    match severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            error!("[vulkan {:?}] {}", message_type, message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            warn!("[vulkan {:?}] {}", message_type, message);
        }
        _ => {
            info!("[vulkan {:?}] {}", message_type, message);
        }
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_surface_extensions_include_base() {
        let extensions = surface_extensions();
        assert!(!extensions.is_empty());

        let first = unsafe { CStr::from_ptr(extensions[0]) };
        assert_eq!(first, ash::khr::surface::NAME);
    }

    #[test]
    fn test_instance_creation_without_validation() {
        // Requires a Vulkan loader on the machine
        match Instance::new(false) {
            Ok(instance) => assert!(!instance.has_validation()),
            Err(RhiError::LoadingError(_)) => {
                eprintln!("Skipping test: Vulkan not available");
            }
            Err(e) => panic!("Unexpected error: {:?}", e),
        }
    }
}
