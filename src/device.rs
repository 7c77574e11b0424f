// Vulkan device representation
//
// This stores per-GPU state: the capability record the device was
// selected on, the logical vkDevice created from it, and the resolved
// queue handles for each role.
//
// Austin Shafer - 2024
use ash::vk;

use crate::deletion_queue::DeletionQueue;
use crate::instance::Instance;
use crate::platform::CapabilityRecord;
use crate::{CreateFlags, CreateInfo, Result, StratusError};
use utils::log;

use std::sync::Arc;

/// The logical execution context for the selected device.
pub struct Device {
    pub(crate) inst: Arc<Instance>,
    /// the logical device we are using
    pub(crate) dev: ash::Device,
    /// What the selected device/surface pair supports
    pub d_record: CapabilityRecord,
    /// Resolved queue handles. These are the same queue object when
    /// both roles live in one family.
    d_graphics_queue: vk::Queue,
    d_present_queue: vk::Queue,
}

impl Device {
    /// Apply the suitability policy over probed records.
    ///
    /// The first suitable record in enumeration order wins; records
    /// are never ranked against each other. If nothing is suitable
    /// this fails rather than fall back to a partially suitable
    /// device.
    pub fn select(records: Vec<CapabilityRecord>, info: &CreateInfo) -> Result<CapabilityRecord> {
        for record in records.into_iter() {
            if !record.cr_roles.is_complete() {
                log::debug!("Skipping {}: missing a queue family role", record.cr_name);
                continue;
            }
            if let Some(missing) = record.missing_extension(&info.required_extensions) {
                log::debug!(
                    "Skipping {}: missing required extension {:?}",
                    record.cr_name,
                    missing
                );
                continue;
            }
            if record.cr_formats.is_empty() || record.cr_present_modes.is_empty() {
                log::debug!(
                    "Skipping {}: no surface formats or present modes",
                    record.cr_name
                );
                continue;
            }
            if info.require_discrete_gpu
                && record.cr_dev_type != vk::PhysicalDeviceType::DISCRETE_GPU
            {
                log::debug!("Skipping {}: not a discrete gpu", record.cr_name);
                continue;
            }

            log::info!("Selected device {}", record.cr_name);
            return Ok(record);
        }

        Err(StratusError::NO_SUITABLE_DEVICE)
    }

    /// Create a vkDevice from the selected record
    ///
    /// Create a logical device for interfacing with the physical
    /// device. Once again we specify any device extensions we need,
    /// the swapchain being the most important one.
    ///
    /// One queue is requested per unique family; nothing in this
    /// crate submits from more than one queue per family.
    pub fn new(
        instance: Arc<Instance>,
        record: CapabilityRecord,
        info: &CreateInfo,
        ledger: &mut DeletionQueue,
    ) -> Result<Arc<Self>> {
        let gfx_family = record
            .cr_roles
            .qf_graphics
            .ok_or(StratusError::NO_SUITABLE_DEVICE)?;
        let present_family = record
            .cr_roles
            .qf_present
            .ok_or(StratusError::NO_SUITABLE_DEVICE)?;

        let dev_extension_names: Vec<*const i8> = info
            .required_extensions
            .iter()
            .map(|name| name.as_ptr())
            .collect();

        let features = vk::PhysicalDeviceFeatures::builder().build();

        // for now we only have one queue per family, so one priority
        let priorities = [1.0];
        let mut queue_infos = Vec::new();
        for i in record.cr_roles.unique_families() {
            queue_infos.push(
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(i)
                    .queue_priorities(&priorities)
                    .build(),
            );
        }

        // Device level layers are ignored by current runtimes, but
        // older loaders still read them, so pass ours through when
        // debug layers were requested.
        let layer_names_raw: Vec<*const i8> =
            match info.flags.contains(CreateFlags::REQUEST_DEBUG_LAYERS) {
                true => info.debug_layers.iter().map(|name| name.as_ptr()).collect(),
                false => Vec::new(),
            };

        let dev_create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(queue_infos.as_ref())
            .enabled_layer_names(&layer_names_raw)
            .enabled_extension_names(dev_extension_names.as_slice())
            .enabled_features(&features)
            .build();

        let dev = unsafe {
            instance
                .inst
                .create_device(record.cr_pdev, &dev_create_info, None)
                .or(Err(StratusError::DEVICE_CREATION_FAILED))?
        };

        {
            let dev = dev.clone();
            ledger.push(move || unsafe {
                dev.destroy_device(None);
            });
        }

        let graphics_queue = unsafe { dev.get_device_queue(gfx_family, 0) };
        let present_queue = unsafe { dev.get_device_queue(present_family, 0) };

        Ok(Arc::new(Self {
            inst: instance,
            dev: dev,
            d_record: record,
            d_graphics_queue: graphics_queue,
            d_present_queue: present_queue,
        }))
    }

    /// queue that executes draw submissions
    pub fn graphics_queue(&self) -> vk::Queue {
        self.d_graphics_queue
    }

    /// queue that presentation is submitted on. May be the same
    /// object as the graphics queue.
    pub fn present_queue(&self) -> vk::Queue {
        self.d_present_queue
    }

    /// The raw logical device, for consumers creating their own
    /// resources on top of this context.
    pub fn vk_device(&self) -> &ash::Device {
        &self.dev
    }
}
