// The presentation surface and the window system behind it
//
// Austin Shafer - 2024
#![allow(dead_code)]

use ash::extensions::khr;
use ash::vk;

use crate::deletion_queue::DeletionQueue;
use crate::instance::Instance;
use crate::{CreateInfo, Result, StratusError, SurfaceType};
use utils::log;

/// A display represents a presentable screen region
///
/// The window (or bare monitor) behind it belongs to the caller; this
/// only owns what the window system hands over: the vkSurfaceKHR, the
/// loader for surface queries, and a backend that can answer for the
/// live framebuffer size.
pub struct Display {
    // the actual surface (KHR extension)
    pub d_surface: vk::SurfaceKHR,
    // function pointer loaders
    pub d_surface_loader: khr::Surface,
    d_back: Box<dyn Backend>,
}

trait Backend {
    /// Helper for getting the drawable size according to the
    /// window system.
    /// Returns None if not supported and the display should
    /// get the size from vulkan
    fn get_framebuffer_size(&self) -> Option<vk::Extent2D>;
}

impl Display {
    pub fn new(info: &CreateInfo, inst: &Instance, ledger: &mut DeletionQueue) -> Result<Self> {
        let s_loader = khr::Surface::new(&inst.loader, &inst.inst);

        let (back, surf) = match &info.surface_type {
            SurfaceType::Display(index) => PhysicalDisplay::new(inst, *index)?,
            #[cfg(feature = "sdl")]
            SurfaceType::SDL2(vid, win) => SDL2DisplayBackend::new(inst, vid, win)?,
        };

        {
            let loader = s_loader.clone();
            ledger.push(move || unsafe {
                loader.destroy_surface(surf, None);
            });
        }

        Ok(Self {
            d_surface: surf,
            d_surface_loader: s_loader,
            d_back: back,
        })
    }

    /// The instance extensions this window system requires.
    pub fn extension_names(info: &CreateInfo) -> Vec<*const i8> {
        match &info.surface_type {
            SurfaceType::Display(_) => PhysicalDisplay::extension_names(),
            #[cfg(feature = "sdl")]
            SurfaceType::SDL2(_, win) => SDL2DisplayBackend::extension_names(win),
        }
    }

    /// The live framebuffer size in pixels.
    ///
    /// Swapchain negotiation asks for this when the surface leaves
    /// its extent undefined.
    pub fn get_framebuffer_size(&self, pdev: vk::PhysicalDevice) -> Result<vk::Extent2D> {
        match self.d_back.get_framebuffer_size() {
            Some(size) => Ok(size),
            None => {
                // If the backend doesn't support this then just get the
                // value from vulkan
                let caps = unsafe {
                    self.d_surface_loader
                        .get_physical_device_surface_capabilities(pdev, self.d_surface)
                        .or(Err(StratusError::SURFACE_QUERY_FAILED))?
                };
                Ok(caps.current_extent)
            }
        }
    }
}

/// This Display backend represents a physical monitor sitting
/// on the user's desk. It corresponds to the VK_KHR_display extension.
struct PhysicalDisplay {
    // The native resolution of the display mode in use
    pd_native_res: vk::Extent2D,
}

impl PhysicalDisplay {
    /// Create an on-screen surface.
    ///
    /// Bare display surfaces have to be created against a physical
    /// device, before any device has been selected. The first device
    /// exposing enough displays is used for the surface; capability
    /// probing still runs over every device afterwards.
    fn new(inst: &Instance, index: usize) -> Result<(Box<dyn Backend>, vk::SurfaceKHR)> {
        unsafe {
            let d_loader = khr::Display::new(&inst.loader, &inst.inst);

            let pdevs = inst
                .inst
                .enumerate_physical_devices()
                .or(Err(StratusError::NO_DEVICES_FOUND))?;

            let mut target = None;
            for pdev in pdevs.iter() {
                let props = d_loader
                    .get_physical_device_display_properties(*pdev)
                    .unwrap_or_default();
                if props.len() > index {
                    target = Some((*pdev, props[index]));
                    break;
                }
            }
            let (pdev, disp_props) = target.ok_or(StratusError::SURFACE_CREATION_FAILED)?;

            // The available modes for the display. This holds
            // the resolution.
            let mode_props = d_loader
                .get_display_mode_properties(pdev, disp_props.display)
                .or(Err(StratusError::SURFACE_QUERY_FAILED))?;
            if mode_props.is_empty() {
                return Err(StratusError::SURFACE_CREATION_FAILED);
            }

            // create a display mode from the parameters we got earlier
            let mode_info =
                vk::DisplayModeCreateInfoKHR::builder().parameters(mode_props[0].parameters);
            let mode = d_loader
                .create_display_mode(pdev, disp_props.display, &mode_info, None)
                .or(Err(StratusError::SURFACE_CREATION_FAILED))?;

            let native_res = mode_props[0].parameters.visible_region;
            log::info!(
                "Using display {} at {}x{}",
                index,
                native_res.width,
                native_res.height
            );

            // Finally we can create our surface to render to. From this
            // point on everything is normal
            let surf_info = vk::DisplaySurfaceCreateInfoKHR::builder()
                .display_mode(mode)
                // TODO: Don't just chose the first plane
                .plane_index(0)
                .transform(vk::SurfaceTransformFlagsKHR::IDENTITY)
                .alpha_mode(vk::DisplayPlaneAlphaFlagsKHR::OPAQUE)
                .image_extent(native_res);

            let surface = d_loader
                .create_display_plane_surface(&surf_info, None)
                .or(Err(StratusError::SURFACE_CREATION_FAILED))?;

            let ret = Box::new(PhysicalDisplay {
                pd_native_res: native_res,
            });

            Ok((ret, surface))
        }
    }

    /// The two most important extensions are Surface and Display.
    /// Without them we cannot present anything.
    fn extension_names() -> Vec<*const i8> {
        vec![khr::Surface::name().as_ptr(), khr::Display::name().as_ptr()]
    }
}

impl Backend for PhysicalDisplay {
    fn get_framebuffer_size(&self) -> Option<vk::Extent2D> {
        Some(self.pd_native_res)
    }
}

#[cfg(feature = "sdl")]
struct SDL2DisplayBackend {
    sdl_window: sdl2::video::Window,
}

#[cfg(feature = "sdl")]
impl SDL2DisplayBackend {
    /// Create a surface for an SDL2 window.
    ///
    /// The window was created by the caller with vulkan support; we
    /// only wrap it. The wrapper window shares the caller's window
    /// context, it does not open a second one.
    fn new(
        inst: &Instance,
        _vid: &sdl2::VideoSubsystem,
        win: &sdl2::video::Window,
    ) -> Result<(Box<dyn Backend>, vk::SurfaceKHR)> {
        use vk::Handle;

        // we need to convert our ash instance into the pointer to the raw vk instance
        let raw_surf = match win.vulkan_create_surface(inst.inst.handle().as_raw() as usize) {
            Ok(s) => s,
            Err(msg) => {
                log::error!("SDL2 vulkan_create_surface failed: {}", msg);
                return Err(StratusError::SURFACE_CREATION_FAILED);
            }
        };

        let ret = Box::new(Self {
            // create a new window wrapper by cloning the Rc pointer
            sdl_window: sdl2::video::Window::from_ref(win.context()),
        });

        Ok((ret, vk::SurfaceKHR::from_raw(raw_surf)))
    }

    /// The instance extensions SDL needs for this window.
    fn extension_names(win: &sdl2::video::Window) -> Vec<*const i8> {
        win.vulkan_instance_extensions()
            .expect("SDL could not report its required vulkan extensions")
            .iter()
            .map(|s| {
                // we need to turn a Vec<&str> into a Vec<*const i8>
                s.as_ptr() as *const i8
            })
            .collect()
    }
}

#[cfg(feature = "sdl")]
impl Backend for SDL2DisplayBackend {
    fn get_framebuffer_size(&self) -> Option<vk::Extent2D> {
        let res = self.sdl_window.vulkan_drawable_size();
        Some(vk::Extent2D {
            width: res.0,
            height: res.1,
        })
    }
}
