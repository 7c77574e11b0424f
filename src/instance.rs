// Vulkan rendering instance
//
// This holds all of the common instance code for the Vulkan context
//
// Austin Shafer - 2024
use ash::extensions::ext;
use ash::{vk, Entry};

use crate::deletion_queue::DeletionQueue;
use crate::display::Display;
use crate::{CreateFlags, CreateInfo, Result, StratusError};
use utils::log;

use std::ffi::{CStr, CString};
use std::os::raw::c_void;
use std::sync::Arc;

// this happy little debug callback is from the ash examples
// all it does is print any errors/warnings thrown.
//
// It must never panic or abort the offending call, it is pure
// observability.
unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_types: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut c_void,
) -> u32 {
    let data = match p_callback_data.as_ref() {
        Some(d) => d,
        None => return vk::FALSE,
    };
    let message = CStr::from_ptr(data.p_message);

    if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        log::error!("[VK][{:?}] {:?}", message_types, message);
    } else {
        log::info!("[VK][{:?}][{:?}] {:?}", message_severity, message_types, message);
    }

    vk::FALSE
}

/// A Vulkan Instance
///
/// This holds our basic vulkan session data. We use this to probe
/// for devices and create everything else in the crate.
pub struct Instance {
    /// the entry just loads function pointers from the dynamic library
    /// I am calling it a loader, because that's what it does
    pub(crate) loader: Entry,
    /// the big vulkan instance.
    pub(crate) inst: ash::Instance,
}

impl Instance {
    /// Verify that every requested instance layer is present on this
    /// host.
    ///
    /// A missing diagnostic layer is a hard error, not something to
    /// silently run without. The error names the offending layer.
    fn check_layer_support(entry: &Entry, layers: &[CString]) -> Result<()> {
        let available = entry
            .enumerate_instance_layer_properties()
            .or(Err(StratusError::INSTANCE_CREATION_FAILED))?;

        for req in layers.iter() {
            let found = available.iter().any(|layer| {
                let name = unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) };
                name == req.as_c_str()
            });

            if !found {
                return Err(StratusError::LAYER_NOT_AVAILABLE(
                    req.to_string_lossy().into_owned(),
                ));
            }
        }

        Ok(())
    }

    /// Creates a new debug reporter and registers our function
    /// for debug callbacks so we get nice error messages
    fn setup_debug(
        entry: &Entry,
        instance: &ash::Instance,
        ledger: &mut DeletionQueue,
    ) -> Result<()> {
        let debug_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION,
            )
            .pfn_user_callback(Some(vulkan_debug_callback));

        let dr_loader = ext::DebugUtils::new(entry, instance);
        let callback = unsafe {
            dr_loader
                .create_debug_utils_messenger(&debug_info, None)
                .or(Err(StratusError::INSTANCE_CREATION_FAILED))?
        };

        // The callback belongs to the instance, so it is pushed after
        // it and replay destroys it first.
        ledger.push(move || unsafe {
            dr_loader.destroy_debug_utils_messenger(callback, None);
        });

        Ok(())
    }

    /// Create a vkInstance
    ///
    /// The layer precondition check runs before anything is created:
    /// requested diagnostic layers must all be present. Extension
    /// names come from the window system plus the debug-output
    /// extension when a callback was requested.
    pub fn new(info: &CreateInfo, ledger: &mut DeletionQueue) -> Result<Arc<Self>> {
        let entry =
            unsafe { Entry::load().or(Err(StratusError::INSTANCE_CREATION_FAILED))? };
        let app_name =
            CString::new(info.app_name.clone()).or(Err(StratusError::INSTANCE_CREATION_FAILED))?;

        let request_layers = info.flags.contains(CreateFlags::REQUEST_DEBUG_LAYERS);
        let request_callback = info.flags.contains(CreateFlags::REQUEST_DEBUG_CALLBACK);

        if request_layers {
            Self::check_layer_support(&entry, &info.debug_layers)?;
        }
        let layer_names_raw: Vec<*const i8> = match request_layers {
            true => info.debug_layers.iter().map(|name| name.as_ptr()).collect(),
            false => Vec::new(),
        };

        let mut extension_names_raw = Vec::new();
        if info.flags.contains(CreateFlags::REQUEST_DEFAULT_EXTENSIONS) {
            extension_names_raw.extend(Display::extension_names(info));
        }
        if request_callback {
            extension_names_raw.push(ext::DebugUtils::name().as_ptr());
        }

        let appinfo = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(info.app_version)
            .engine_name(&app_name)
            .engine_version(0)
            .api_version(info.api_version)
            .build();

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&appinfo)
            .enabled_layer_names(&layer_names_raw)
            .enabled_extension_names(&extension_names_raw)
            .build();

        let instance: ash::Instance = unsafe {
            entry
                .create_instance(&create_info, None)
                .or(Err(StratusError::INSTANCE_CREATION_FAILED))?
        };

        {
            let inst = instance.clone();
            ledger.push(move || unsafe {
                inst.destroy_instance(None);
            });
        }

        if request_callback {
            Self::setup_debug(&entry, &instance, ledger)?;
        }

        Ok(Arc::new(Self {
            loader: entry,
            inst: instance,
        }))
    }

    /// The raw instance, for consumers doing their own queries.
    pub fn vk_instance(&self) -> &ash::Instance {
        &self.inst
    }
}
