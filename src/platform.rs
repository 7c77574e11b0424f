// This module handles flagging the available behaviors supported
// by each device/surface pair: queue family roles, device extensions,
// and the surface capability ranges the swapchain will be negotiated
// against.
//
// Austin Shafer - 2024
use ash::vk;

use crate::display::Display;
use crate::instance::Instance;
use crate::{Result, StratusError};
use utils::log;

use std::ffi::{CStr, CString};

/// The queue family index filling each role we need.
///
/// A family may fill neither role, either one, or both at once, so
/// both entries are optional and may alias the same index.
#[derive(Debug, Clone, Default)]
pub struct QueueFamilyRoles {
    /// family that can execute graphics work
    pub qf_graphics: Option<u32>,
    /// family that can present to the target surface
    pub qf_present: Option<u32>,
}

impl QueueFamilyRoles {
    /// Both roles are filled. They may still share one family.
    pub fn is_complete(&self) -> bool {
        self.qf_graphics.is_some() && self.qf_present.is_some()
    }

    /// The deduplicated set of families the logical device needs
    /// queues from.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut ret = Vec::new();

        if let Some(g) = self.qf_graphics {
            ret.push(g);
        }
        if let Some(p) = self.qf_present {
            if !ret.contains(&p) {
                ret.push(p);
            }
        }

        ret
    }
}

/// Everything probed about one candidate device.
///
/// Immutable once constructed: selection and swapchain negotiation
/// read from this but never write back.
#[derive(Debug)]
pub struct CapabilityRecord {
    /// marketing name, only for log messages
    pub cr_name: String,
    /// the device this record describes
    pub cr_pdev: vk::PhysicalDevice,
    /// discrete/integrated/software, for the dedicated-gpu policy
    pub cr_dev_type: vk::PhysicalDeviceType,
    pub cr_roles: QueueFamilyRoles,
    /// every device extension this device advertises
    pub cr_extensions: Vec<CString>,
    /// surface limits: image counts, extent ranges, transforms
    pub cr_surface_caps: vk::SurfaceCapabilitiesKHR,
    /// supported (format, color space) pairs, in platform order
    pub cr_formats: Vec<vk::SurfaceFormatKHR>,
    pub cr_present_modes: Vec<vk::PresentModeKHR>,
}

impl CapabilityRecord {
    /// The first extension in `req` this device does not advertise,
    /// for naming the unmet requirement in messages.
    pub fn missing_extension<'a>(&self, req: &'a [CString]) -> Option<&'a CString> {
        for r in req.iter() {
            if !self.cr_extensions.iter().any(|e| e == r) {
                return Some(r);
            }
        }

        None
    }

    /// Check that every extension in `req` appears in this record's
    /// extension set.
    pub fn supports_extensions(&self, req: &[CString]) -> bool {
        self.missing_extension(req).is_none()
    }

    /// Find the queue family for each role.
    ///
    /// Presentation support is a per-family query against this exact
    /// surface, not a device-wide capability bit.
    fn probe_queue_roles(
        inst: &Instance,
        pdev: vk::PhysicalDevice,
        display: &Display,
    ) -> Result<QueueFamilyRoles> {
        let mut roles = QueueFamilyRoles::default();

        // get the properties per queue family
        let family_props =
            unsafe { inst.inst.get_physical_device_queue_family_properties(pdev) };

        for (i, info) in family_props.iter().enumerate() {
            let index = i as u32;

            if roles.qf_graphics.is_none()
                && info.queue_flags.contains(vk::QueueFlags::GRAPHICS)
            {
                roles.qf_graphics = Some(index);
            }

            let can_present = unsafe {
                display
                    .d_surface_loader
                    .get_physical_device_surface_support(pdev, index, display.d_surface)
                    .or(Err(StratusError::SURFACE_QUERY_FAILED))?
            };
            if roles.qf_present.is_none() && can_present {
                roles.qf_present = Some(index);
            }
        }

        Ok(roles)
    }

    /// Probe one device against the surface.
    fn probe(inst: &Instance, display: &Display, pdev: vk::PhysicalDevice) -> Result<Self> {
        unsafe {
            let props = inst.inst.get_physical_device_properties(pdev);
            let name = CStr::from_ptr(props.device_name.as_ptr())
                .to_string_lossy()
                .into_owned();

            let roles = Self::probe_queue_roles(inst, pdev, display)?;

            let ext_props = inst
                .inst
                .enumerate_device_extension_properties(pdev)
                .or(Err(StratusError::SURFACE_QUERY_FAILED))?;
            let extensions = ext_props
                .iter()
                .map(|e| CStr::from_ptr(e.extension_name.as_ptr()).to_owned())
                .collect();

            let surface_caps = display
                .d_surface_loader
                .get_physical_device_surface_capabilities(pdev, display.d_surface)
                .or(Err(StratusError::SURFACE_QUERY_FAILED))?;
            let formats = display
                .d_surface_loader
                .get_physical_device_surface_formats(pdev, display.d_surface)
                .or(Err(StratusError::SURFACE_QUERY_FAILED))?;
            let present_modes = display
                .d_surface_loader
                .get_physical_device_surface_present_modes(pdev, display.d_surface)
                .or(Err(StratusError::SURFACE_QUERY_FAILED))?;

            Ok(Self {
                cr_name: name,
                cr_pdev: pdev,
                cr_dev_type: props.device_type,
                cr_roles: roles,
                cr_extensions: extensions,
                cr_surface_caps: surface_caps,
                cr_formats: formats,
                cr_present_modes: present_modes,
            })
        }
    }

    /// Probe every device visible to the instance.
    ///
    /// Records come back in enumeration order. That order is platform
    /// defined and means nothing on its own; selection only relies on
    /// it for the first-suitable-wins rule.
    pub fn probe_all(inst: &Instance, display: &Display) -> Result<Vec<Self>> {
        let pdevs = unsafe {
            inst.inst
                .enumerate_physical_devices()
                .or(Err(StratusError::NO_DEVICES_FOUND))?
        };
        // an empty enumeration is different from "nothing suitable",
        // which only selection can decide
        if pdevs.is_empty() {
            return Err(StratusError::NO_DEVICES_FOUND);
        }

        let mut records = Vec::with_capacity(pdevs.len());
        for pdev in pdevs.iter() {
            let record = Self::probe(inst, display, *pdev)?;
            log::debug!(
                "Probed {}: graphics family {:?}, present family {:?}, {} format(s), {} present mode(s)",
                record.cr_name,
                record.cr_roles.qf_graphics,
                record.cr_roles.qf_present,
                record.cr_formats.len(),
                record.cr_present_modes.len()
            );
            records.push(record);
        }

        Ok(records)
    }
}
