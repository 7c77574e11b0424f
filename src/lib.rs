//! # Stratus
//!
//! Stratus is the device negotiation layer a rendering application
//! runs before it can draw a single frame. You hand it a capability
//! contract (which diagnostics you want, what kind of gpu you will
//! accept, what the image chain should look like) and it picks a
//! device, builds the logical context and queues, and negotiates a
//! presentable swapchain against what the device/surface pair
//! actually supports.
//!
//! Everything created along the way registers a teardown action on a
//! single deletion queue owned by the top level [`Stratus`] object.
//! The queue replays in reverse push order at shutdown, so the object
//! graph is destroyed in exact reverse creation order even when
//! initialization aborted partway through.
//!
//! ```no_run
//! use stratus as st;
//!
//! let info = st::CreateInfo::builder()
//!     .app_name("demo")
//!     .surface_type(st::SurfaceType::Display(0))
//!     .build();
//! let mut stratus = st::Stratus::new(&info).unwrap();
//!
//! let chain = stratus
//!     .create_swapchain(&st::SwapchainInfo::builder().build())
//!     .unwrap();
//!
//! println!(
//!     "presenting {} images at {}x{}",
//!     chain.image_count(),
//!     chain.s_resolution.width,
//!     chain.s_resolution.height,
//! );
//! ```
//!
//! ## Requirements
//!
//! Stratus requires a system with vulkan 1.2+ installed. The following
//! extensions are used:
//! * VK_KHR_surface
//! * VK_KHR_display (or the window system's surface extension)
//! * VK_KHR_swapchain
//! * VK_EXT_debug_utils (only when a debug callback is requested)

// Austin Shafer - 2024

#![allow(non_camel_case_types)]

mod deletion_queue;
mod device;
mod display;
mod instance;
mod platform;
mod swapchain;
#[cfg(test)]
mod tests;

pub use deletion_queue::DeletionQueue;
pub use device::Device;
pub use display::Display;
pub use instance::Instance;
pub use platform::{CapabilityRecord, QueueFamilyRoles};
pub use swapchain::{Swapchain, SwapchainInfo, SwapchainInfoBuilder};

extern crate utils;

use ash::extensions::khr;
use ash::vk;

use std::ffi::CString;
use std::sync::Arc;

/// Everything that can go wrong while negotiating.
///
/// All of these are fatal and none are retried internally: the
/// environment decides suitability, so rerunning a negotiation with
/// the same inputs cannot change its outcome.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum StratusError {
    #[error("Instance layer {0} is not available on this host")]
    LAYER_NOT_AVAILABLE(String),
    #[error("Could not create a vulkan instance")]
    INSTANCE_CREATION_FAILED,
    #[error("Could not create a surface for the requested window system")]
    SURFACE_CREATION_FAILED,
    #[error("A capability query was rejected by the platform")]
    SURFACE_QUERY_FAILED,
    #[error("No vulkan devices are visible to this instance")]
    NO_DEVICES_FOUND,
    #[error("No device satisfies the selection policy")]
    NO_SUITABLE_DEVICE,
    #[error("Could not create a logical device")]
    DEVICE_CREATION_FAILED,
    #[error("Could not create a swapchain")]
    SWAPCHAIN_CREATION_FAILED,
    #[error("The swapchain produced zero presentable images")]
    EMPTY_SWAPCHAIN,
}

pub type Result<T> = std::result::Result<T, StratusError>;

bitflags::bitflags! {
    /// What to request from the instance on top of the baseline.
    pub struct CreateFlags: u32 {
        /// Require the diagnostic layers named in
        /// `CreateInfo::debug_layers`. A missing layer fails
        /// negotiation, it is never silently skipped.
        const REQUEST_DEBUG_LAYERS = 1;
        /// Enable the instance extensions the window system requires.
        const REQUEST_DEFAULT_EXTENSIONS = 1 << 1;
        /// Install a debug callback that forwards driver messages to
        /// the log.
        const REQUEST_DEBUG_CALLBACK = 1 << 2;
    }
}

/// Which window system the presentation surface comes from.
///
/// Window creation itself belongs to the caller. Stratus only turns
/// what the caller made into a vkSurfaceKHR.
pub enum SurfaceType {
    /// Present directly to a physical display through VK_KHR_display,
    /// with no window system involved. The payload is the index of
    /// the display to use.
    Display(usize),
    /// Present to an sdl2 window the caller created with vulkan
    /// support enabled.
    #[cfg(feature = "sdl")]
    SDL2(sdl2::VideoSubsystem, sdl2::video::Window),
}

/// Parameters for negotiation.
///
/// These spell out the capability contract: which diagnostics to
/// insist on, what a device must support to be selectable, and where
/// presentation goes.
pub struct CreateInfo {
    /// informational only, passed through to the driver
    pub app_name: String,
    pub app_version: u32,
    /// vulkan api version to request
    pub api_version: u32,
    pub flags: CreateFlags,
    /// layers checked and enabled under REQUEST_DEBUG_LAYERS
    pub debug_layers: Vec<CString>,
    /// refuse integrated or software devices
    pub require_discrete_gpu: bool,
    /// device extensions a candidate must advertise to be selectable
    pub required_extensions: Vec<CString>,
    pub surface_type: SurfaceType,
}

impl CreateInfo {
    pub fn builder() -> CreateInfoBuilder {
        CreateInfoBuilder {
            ci: CreateInfo {
                app_name: "stratus".to_string(),
                app_version: 0,
                api_version: vk::API_VERSION_1_2,
                flags: CreateFlags::REQUEST_DEFAULT_EXTENSIONS,
                debug_layers: vec![CString::new("VK_LAYER_KHRONOS_validation").unwrap()],
                require_discrete_gpu: false,
                required_extensions: vec![khr::Swapchain::name().to_owned()],
                surface_type: SurfaceType::Display(0),
            },
        }
    }
}

/// Implements the builder pattern for easier stratus creation
pub struct CreateInfoBuilder {
    ci: CreateInfo,
}

impl CreateInfoBuilder {
    pub fn app_name(mut self, name: &str) -> Self {
        self.ci.app_name = name.to_string();
        self
    }

    pub fn app_version(mut self, version: u32) -> Self {
        self.ci.app_version = version;
        self
    }

    pub fn api_version(mut self, version: u32) -> Self {
        self.ci.api_version = version;
        self
    }

    pub fn flags(mut self, flags: CreateFlags) -> Self {
        self.ci.flags = flags;
        self
    }

    pub fn debug_layers(mut self, layers: Vec<CString>) -> Self {
        self.ci.debug_layers = layers;
        self
    }

    pub fn require_discrete_gpu(mut self) -> Self {
        self.ci.require_discrete_gpu = true;
        self
    }

    pub fn required_extensions(mut self, extensions: Vec<CString>) -> Self {
        self.ci.required_extensions = extensions;
        self
    }

    pub fn surface_type(mut self, ty: SurfaceType) -> Self {
        self.ci.surface_type = ty;
        self
    }

    pub fn build(self) -> CreateInfo {
        self.ci
    }
}

/// The negotiated context.
///
/// Owns the deletion queue every stage registered into. Dropping this
/// waits for the device to go idle and replays the queue back to
/// front, tearing the whole object graph down in reverse creation
/// order.
pub struct Stratus {
    st_ledger: DeletionQueue,
    st_inst: Arc<Instance>,
    st_display: Display,
    st_dev: Arc<Device>,
}

impl Stratus {
    /// Run the negotiation sequence.
    ///
    /// The stages run in strict dependency order: instance, surface,
    /// capability probe, device selection, logical device. A failing
    /// stage reports its error untouched; whatever the earlier stages
    /// created is unwound before this returns.
    pub fn new(info: &CreateInfo) -> Result<Self> {
        let mut ledger = DeletionQueue::new();

        let inst = Instance::new(info, &mut ledger)?;
        let display = Display::new(info, &inst, &mut ledger)?;
        let records = CapabilityRecord::probe_all(&inst, &display)?;
        let record = Device::select(records, info)?;
        let dev = Device::new(inst.clone(), record, info, &mut ledger)?;

        Ok(Self {
            st_ledger: ledger,
            st_inst: inst,
            st_display: display,
            st_dev: dev,
        })
    }

    /// Negotiate the presentable image chain.
    pub fn create_swapchain(&mut self, info: &SwapchainInfo) -> Result<Swapchain> {
        Swapchain::new(info, &self.st_dev, &self.st_display, &mut self.st_ledger)
    }

    /// What the selected device/surface pair supports.
    pub fn capabilities(&self) -> &CapabilityRecord {
        &self.st_dev.d_record
    }

    pub fn instance(&self) -> &Instance {
        &self.st_inst
    }

    pub fn device(&self) -> &Device {
        &self.st_dev
    }

    pub fn display(&self) -> &Display {
        &self.st_display
    }

    /// Register a teardown action for a resource created downstream.
    ///
    /// Anything that allocates its own GPU objects on top of this
    /// context (buffers, pipelines, framebuffers) should push their
    /// destruction here so the single flush at shutdown reaches them
    /// too.
    pub fn push_teardown<F: FnOnce() + Send + 'static>(&mut self, action: F) {
        self.st_ledger.push(action);
    }
}

impl Drop for Stratus {
    fn drop(&mut self) {
        unsafe {
            // first wait for the device to finish working
            self.st_dev.dev.device_wait_idle().unwrap();
        }
        self.st_ledger.flush();
    }
}
