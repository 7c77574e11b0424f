// Presentable image chain negotiation
//
// Swapchains contain images that can be used for WSI presentation.
// They take a vkSurfaceKHR and provide a way to manage swapping
// effects such as double/triple buffering. The created swapchain is
// dependent on the characteristics and format of the surface it is
// created for.
//
// Austin Shafer - 2024
use ash::extensions::khr;
use ash::vk;

use crate::deletion_queue::DeletionQueue;
use crate::device::Device;
use crate::display::Display;
use crate::{Result, StratusError};
use utils::log;
use utils::{partial_max, partial_min};

/// Caller desires for the image chain.
///
/// Every field has a workable default, and negotiation treats all of
/// them as preferences: a desire the surface cannot satisfy falls
/// back to a capability-driven value instead of failing.
pub struct SwapchainInfo {
    pub format: vk::Format,
    pub color_space: vk::ColorSpaceKHR,
    pub present_mode: vk::PresentModeKHR,
    /// Stands in for the live framebuffer size when the surface
    /// leaves its extent undefined. Ignored when the platform has
    /// already fixed the extent.
    pub extent: Option<vk::Extent2D>,
    /// how many images we want the swapchain to contain
    pub img_count: Option<u32>,
    pub layer_count: u32,
    pub usage: vk::ImageUsageFlags,
}

impl SwapchainInfo {
    pub fn builder() -> SwapchainInfoBuilder {
        SwapchainInfoBuilder {
            si: SwapchainInfo {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                present_mode: vk::PresentModeKHR::MAILBOX,
                extent: None,
                img_count: None,
                layer_count: 1,
                usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            },
        }
    }
}

/// Implements the builder pattern for easier swapchain creation
pub struct SwapchainInfoBuilder {
    si: SwapchainInfo,
}

impl SwapchainInfoBuilder {
    pub fn format(mut self, format: vk::Format) -> Self {
        self.si.format = format;
        self
    }

    pub fn color_space(mut self, color_space: vk::ColorSpaceKHR) -> Self {
        self.si.color_space = color_space;
        self
    }

    pub fn present_mode(mut self, mode: vk::PresentModeKHR) -> Self {
        self.si.present_mode = mode;
        self
    }

    pub fn extent(mut self, extent: vk::Extent2D) -> Self {
        self.si.extent = Some(extent);
        self
    }

    pub fn img_count(mut self, count: u32) -> Self {
        self.si.img_count = Some(count);
        self
    }

    pub fn layer_count(mut self, count: u32) -> Self {
        self.si.layer_count = count;
        self
    }

    pub fn usage(mut self, usage: vk::ImageUsageFlags) -> Self {
        self.si.usage = usage;
        self
    }

    pub fn build(self) -> SwapchainInfo {
        self.si
    }
}

/// The negotiated image chain.
///
/// All fields hold the resolved values after negotiation against the
/// selected device's capability record. They may differ from what the
/// caller asked for.
pub struct Swapchain {
    /// loads swapchain extension
    s_loader: khr::Swapchain,
    /// the actual swapchain
    s_swapchain: vk::SwapchainKHR,
    pub s_surface_format: vk::SurfaceFormatKHR,
    pub s_present_mode: vk::PresentModeKHR,
    pub s_resolution: vk::Extent2D,
    pub s_sharing_mode: vk::SharingMode,
    /// a set of images belonging to swapchain
    s_images: Vec<vk::Image>,
    /// views describing how to access the images
    s_views: Vec<vk::ImageView>,
}

impl Swapchain {
    /// choose a vkSurfaceFormatKHR for the vkSurfaceKHR
    ///
    /// An exact match of the desired (format, color space) pair is
    /// used when the surface lists it. Any other desire falls back to
    /// the first listed pair, which selection already verified
    /// exists.
    pub(crate) fn select_surface_format(
        formats: &[vk::SurfaceFormatKHR],
        desired_format: vk::Format,
        desired_color_space: vk::ColorSpaceKHR,
    ) -> vk::SurfaceFormatKHR {
        formats
            .iter()
            .find(|fmt| fmt.format == desired_format && fmt.color_space == desired_color_space)
            .copied()
            .unwrap_or(formats[0])
    }

    /// choose a presentation mode
    ///
    /// FIFO is the one mode every conformant surface must support, so
    /// it is the fallback whenever the desired mode is missing.
    pub(crate) fn select_present_mode(
        modes: &[vk::PresentModeKHR],
        desired: vk::PresentModeKHR,
    ) -> vk::PresentModeKHR {
        modes
            .iter()
            .cloned()
            .find(|&mode| mode == desired)
            .unwrap_or(vk::PresentModeKHR::FIFO)
    }

    /// Selects a resolution for the chain
    ///
    /// If the surface capabilities fix a current extent we have to
    /// use it verbatim. Only when the width holds the undefined
    /// marker does the framebuffer size apply, with each axis clamped
    /// into the supported range on its own.
    pub(crate) fn select_resolution(
        caps: &vk::SurfaceCapabilitiesKHR,
        framebuffer: vk::Extent2D,
    ) -> vk::Extent2D {
        match caps.current_extent.width {
            std::u32::MAX => vk::Extent2D {
                width: partial_max(
                    caps.min_image_extent.width,
                    partial_min(caps.max_image_extent.width, framebuffer.width),
                ),
                height: partial_max(
                    caps.min_image_extent.height,
                    partial_min(caps.max_image_extent.height, framebuffer.height),
                ),
            },
            _ => caps.current_extent,
        }
    }

    /// choose how many images the chain should hold
    ///
    /// The desired count is raised to the surface minimum and capped
    /// at the surface maximum. A maximum of zero means the surface
    /// sets no upper bound.
    pub(crate) fn select_image_count(
        caps: &vk::SurfaceCapabilitiesKHR,
        desired: Option<u32>,
    ) -> u32 {
        let mut count = partial_max(
            desired.unwrap_or(caps.min_image_count + 1),
            caps.min_image_count,
        );

        if caps.max_image_count > 0 && count > caps.max_image_count {
            count = caps.max_image_count;
        }

        count
    }

    /// choose how the chain's images are shared between families
    ///
    /// Concurrent sharing with a single family index is invalid, so
    /// exclusive mode is required when both roles live in one family.
    pub(crate) fn select_sharing_mode(
        graphics_family: u32,
        present_family: u32,
    ) -> (vk::SharingMode, Vec<u32>) {
        if graphics_family != present_family {
            (
                vk::SharingMode::CONCURRENT,
                vec![graphics_family, present_family],
            )
        } else {
            (vk::SharingMode::EXCLUSIVE, Vec::new())
        }
    }

    /// create a new vkSwapchain
    ///
    /// Negotiates every parameter of the chain against the selected
    /// device's capability record and builds one view per produced
    /// image. The chain and each view register their own teardown on
    /// the deletion queue; replay destroys the views before the chain.
    pub fn new(
        info: &SwapchainInfo,
        dev: &Device,
        display: &Display,
        ledger: &mut DeletionQueue,
    ) -> Result<Self> {
        let record = &dev.d_record;
        let caps = &record.cr_surface_caps;

        let surface_format =
            Self::select_surface_format(&record.cr_formats, info.format, info.color_space);
        let present_mode =
            Self::select_present_mode(&record.cr_present_modes, info.present_mode);

        let framebuffer = match info.extent {
            Some(e) => e,
            None => display.get_framebuffer_size(record.cr_pdev)?,
        };
        let resolution = Self::select_resolution(caps, framebuffer);

        let image_count = Self::select_image_count(caps, info.img_count);

        let gfx_family = record
            .cr_roles
            .qf_graphics
            .ok_or(StratusError::NO_SUITABLE_DEVICE)?;
        let present_family = record
            .cr_roles
            .qf_present
            .ok_or(StratusError::NO_SUITABLE_DEVICE)?;
        let (sharing_mode, family_indices) =
            Self::select_sharing_mode(gfx_family, present_family);

        let transform = if caps
            .supported_transforms
            .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
        {
            vk::SurfaceTransformFlagsKHR::IDENTITY
        } else {
            caps.current_transform
        };

        log::info!(
            "Negotiated {:?}/{:?} chain: {} image(s) at {}x{}, {:?} presentation",
            surface_format.format,
            surface_format.color_space,
            image_count,
            resolution.width,
            resolution.height,
            present_mode
        );

        let swapchain_loader = khr::Swapchain::new(&dev.inst.inst, &dev.dev);

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(display.d_surface)
            .min_image_count(image_count)
            .image_color_space(surface_format.color_space)
            .image_format(surface_format.format)
            .image_extent(resolution)
            .image_usage(info.usage)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(family_indices.as_slice())
            .pre_transform(transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .image_array_layers(info.layer_count);

        let swapchain = unsafe {
            swapchain_loader
                .create_swapchain(&create_info, None)
                .or(Err(StratusError::SWAPCHAIN_CREATION_FAILED))?
        };

        {
            let loader = swapchain_loader.clone();
            ledger.push(move || unsafe {
                loader.destroy_swapchain(swapchain, None);
            });
        }

        // The platform may produce more images than we asked for. The
        // view list has to match what actually came back.
        let images = unsafe {
            swapchain_loader
                .get_swapchain_images(swapchain)
                .or(Err(StratusError::SWAPCHAIN_CREATION_FAILED))?
        };
        if images.is_empty() {
            // a chain with zero images can never present anything
            return Err(StratusError::EMPTY_SWAPCHAIN);
        }

        let views = Self::create_image_views(dev, &images, surface_format.format, ledger)?;

        Ok(Self {
            s_loader: swapchain_loader,
            s_swapchain: swapchain,
            s_surface_format: surface_format,
            s_present_mode: present_mode,
            s_resolution: resolution,
            s_sharing_mode: sharing_mode,
            s_images: images,
            s_views: views,
        })
    }

    /// create vkImageViews for the chain's images
    ///
    /// get all the presentation images for the swapchain
    /// specify the image views, which specify how we want
    /// to access our images
    fn create_image_views(
        dev: &Device,
        images: &[vk::Image],
        format: vk::Format,
        ledger: &mut DeletionQueue,
    ) -> Result<Vec<vk::ImageView>> {
        let mut views = Vec::with_capacity(images.len());

        for image in images.iter() {
            // we want to interact with this image as a 2D
            // array of RGBA pixels (i.e. the "normal" way)
            let create_info = vk::ImageViewCreateInfo::builder()
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format)
                // select the normal RGBA type
                .components(vk::ComponentMapping {
                    r: vk::ComponentSwizzle::R,
                    g: vk::ComponentSwizzle::G,
                    b: vk::ComponentSwizzle::B,
                    a: vk::ComponentSwizzle::A,
                })
                // this view pertains to the entire image
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                })
                .image(*image);

            let view = unsafe {
                dev.dev
                    .create_image_view(&create_info, None)
                    .or(Err(StratusError::SWAPCHAIN_CREATION_FAILED))?
            };
            views.push(view);

            // each view gets its own teardown entry so replay kills
            // them one by one before reaching the chain itself
            let view_dev = dev.dev.clone();
            ledger.push(move || unsafe {
                view_dev.destroy_image_view(view, None);
            });
        }

        Ok(views)
    }

    /// number of images actually produced (2 is double buffering)
    pub fn image_count(&self) -> usize {
        self.s_images.len()
    }

    pub fn images(&self) -> &[vk::Image] {
        self.s_images.as_slice()
    }

    pub fn views(&self) -> &[vk::ImageView] {
        self.s_views.as_slice()
    }

    /// The raw swapchain, for consumers recording acquire/present.
    pub fn vk_handle(&self) -> vk::SwapchainKHR {
        self.s_swapchain
    }

    /// The extension loader matching `vk_handle`.
    pub fn loader(&self) -> &khr::Swapchain {
        &self.s_loader
    }
}
