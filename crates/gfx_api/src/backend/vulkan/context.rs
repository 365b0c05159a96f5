//! Vulkan instance, device and queue setup
//!
//! The context is headless: presentation surfaces belong to the host, which
//! passes any surface instance extensions through the backend factory.

use std::ffi::{CStr, CString};

use ash::{vk, Device, Entry, Instance};

use super::{VulkanError, VulkanResult};
use crate::backend::BackendLimits;
use crate::format::{FormatMatrix, FormatTarget, PixelFormat, PixelFormatUsage};

struct DeviceParts {
    physical_device: vk::PhysicalDevice,
    queue_family: u32,
    device: Device,
    queue: vk::Queue,
    command_pool: vk::CommandPool,
}

/// Instance, device, graphics queue and a transient command pool
pub struct VulkanContext {
    /// Kept alive for the lifetime of the instance
    _entry: Entry,
    /// Vulkan instance
    pub instance: Instance,
    /// Selected physical device
    pub physical_device: vk::PhysicalDevice,
    /// Properties of the selected device
    pub properties: vk::PhysicalDeviceProperties,
    /// Memory heaps and types of the selected device
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Logical device
    pub device: Device,
    /// Graphics queue
    pub queue: vk::Queue,
    /// Family of `queue`
    pub queue_family: u32,
    /// Pool for one-time command buffers
    pub command_pool: vk::CommandPool,
}

impl VulkanContext {
    /// Load the loader, create an instance and pick the first graphics-capable device
    pub fn new(app_name: &str, instance_extensions: &[String]) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to load Vulkan: {e:?}")))?;

        let app_name_cstr = CString::new(app_name)
            .map_err(|_| VulkanError::InitializationFailed("application name contains NUL".to_string()))?;
        let engine_name_cstr = CString::new("gfx_api")
            .map_err(|_| VulkanError::InitializationFailed("engine name contains NUL".to_string()))?;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(&engine_name_cstr)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        let cstr_extensions = instance_extensions
            .iter()
            .map(|ext| CString::new(ext.as_str()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| VulkanError::InitializationFailed("extension name contains NUL".to_string()))?;
        let extension_ptrs: Vec<*const std::os::raw::c_char> = cstr_extensions.iter().map(|e| e.as_ptr()).collect();

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extension_ptrs);
        let instance = unsafe { entry.create_instance(&create_info, None) }.map_err(VulkanError::Api)?;

        let parts = match Self::create_device(&instance) {
            Ok(parts) => parts,
            Err(e) => {
                unsafe { instance.destroy_instance(None) };
                return Err(e);
            }
        };
        let properties = unsafe { instance.get_physical_device_properties(parts.physical_device) };
        let memory_properties = unsafe { instance.get_physical_device_memory_properties(parts.physical_device) };
        log::info!("Selected GPU: {}", unsafe {
            CStr::from_ptr(properties.device_name.as_ptr()).to_string_lossy()
        });

        Ok(Self {
            _entry: entry,
            instance,
            physical_device: parts.physical_device,
            properties,
            memory_properties,
            device: parts.device,
            queue: parts.queue,
            queue_family: parts.queue_family,
            command_pool: parts.command_pool,
        })
    }

    fn create_device(instance: &Instance) -> VulkanResult<DeviceParts> {
        let (physical_device, queue_family) = Self::select_device(instance)?;

        let priorities = [1.0];
        let queue_infos = [vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(queue_family)
            .queue_priorities(&priorities)
            .build()];
        let device_info = vk::DeviceCreateInfo::builder().queue_create_infos(&queue_infos);
        let device =
            unsafe { instance.create_device(physical_device, &device_info, None) }.map_err(VulkanError::Api)?;
        let queue = unsafe { device.get_device_queue(queue_family, 0) };

        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(queue_family)
            .flags(vk::CommandPoolCreateFlags::TRANSIENT | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let command_pool = match unsafe { device.create_command_pool(&pool_info, None) } {
            Ok(pool) => pool,
            Err(e) => {
                unsafe { device.destroy_device(None) };
                return Err(VulkanError::Api(e));
            }
        };

        Ok(DeviceParts {
            physical_device,
            queue_family,
            device,
            queue,
            command_pool,
        })
    }

    fn select_device(instance: &Instance) -> VulkanResult<(vk::PhysicalDevice, u32)> {
        let devices = unsafe { instance.enumerate_physical_devices() }.map_err(VulkanError::Api)?;
        devices
            .into_iter()
            .find_map(|device| {
                let families = unsafe { instance.get_physical_device_queue_family_properties(device) };
                families
                    .iter()
                    .position(|f| f.queue_flags.contains(vk::QueueFlags::GRAPHICS))
                    .map(|index| (device, index as u32))
            })
            .ok_or_else(|| VulkanError::InitializationFailed("No suitable GPU found".to_string()))
    }

    /// Implementation limits of the selected device
    pub fn limits(&self) -> BackendLimits {
        let limits = &self.properties.limits;
        BackendLimits {
            max_texture_size: limits.max_image_dimension2_d,
            max_array_layers: limits.max_image_array_layers,
            max_samples: max_sample_count(limits.framebuffer_color_sample_counts),
        }
    }

    /// Capability matrix from optimal-tiling format features
    pub fn format_matrix(&self) -> FormatMatrix {
        let mut matrix = FormatMatrix::new();
        for format in PixelFormat::ALL {
            let properties = unsafe {
                self.instance
                    .get_physical_device_format_properties(self.physical_device, format.vk_format())
            };
            let usage = usage_from_features(properties.optimal_tiling_features);
            for target in FormatTarget::ALL {
                matrix.set(target, format, usage);
            }
        }
        matrix.apply_etc_fallback_rule();
        matrix
    }

    /// Index of a memory type allowed by `type_filter` with `properties`
    pub fn find_memory_type(&self, type_filter: u32, properties: vk::MemoryPropertyFlags) -> VulkanResult<u32> {
        find_memory_type(&self.memory_properties, type_filter, properties)
    }

    /// Record and synchronously submit a one-time command buffer
    pub fn one_time_commands<F>(&self, record: F) -> VulkanResult<()>
    where
        F: FnOnce(&Device, vk::CommandBuffer),
    {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_pool(self.command_pool)
            .command_buffer_count(1);
        let command_buffer = unsafe { self.device.allocate_command_buffers(&alloc_info) }
            .map_err(VulkanError::Api)?
            .into_iter()
            .next()
            .ok_or(VulkanError::InvalidOperation {
                reason: "no command buffer allocated".to_string(),
            })?;

        let result = (|| {
            let begin_info =
                vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            unsafe { self.device.begin_command_buffer(command_buffer, &begin_info) }.map_err(VulkanError::Api)?;
            record(&self.device, command_buffer);
            unsafe { self.device.end_command_buffer(command_buffer) }.map_err(VulkanError::Api)?;

            let command_buffers = [command_buffer];
            let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers).build();
            unsafe {
                self.device
                    .queue_submit(self.queue, &[submit_info], vk::Fence::null())
                    .map_err(VulkanError::Api)?;
                self.device.queue_wait_idle(self.queue).map_err(VulkanError::Api)
            }
        })();

        unsafe { self.device.free_command_buffers(self.command_pool, &[command_buffer]) };
        result
    }

    /// Block until the device is idle
    pub fn wait_idle(&self) {
        if let Err(e) = unsafe { self.device.device_wait_idle() } {
            log::warn!("device_wait_idle failed: {:?}", e);
        }
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_command_pool(self.command_pool, None);
            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}

/// Index of a memory type allowed by `type_filter` with `properties`
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> VulkanResult<u32> {
    (0..memory_properties.memory_type_count)
        .find(|&i| {
            type_filter & (1 << i) != 0
                && memory_properties.memory_types[i as usize]
                    .property_flags
                    .contains(properties)
        })
        .ok_or(VulkanError::NoSuitableMemoryType)
}

/// Usage mask for a set of format features
pub fn usage_from_features(features: vk::FormatFeatureFlags) -> PixelFormatUsage {
    let mut usage = PixelFormatUsage::empty();
    if features.contains(vk::FormatFeatureFlags::SAMPLED_IMAGE) {
        usage |= PixelFormatUsage::SAMPLED_IMAGE;
    }
    if features.contains(vk::FormatFeatureFlags::STORAGE_IMAGE) {
        usage |= PixelFormatUsage::STORAGE_IMAGE;
    }
    if features.contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT) {
        usage |= PixelFormatUsage::DEPTH_STENCIL_ATTACHMENT;
    }
    usage
}

/// Highest sample count in a sample-count mask
pub fn max_sample_count(counts: vk::SampleCountFlags) -> u32 {
    [64, 32, 16, 8, 4, 2]
        .into_iter()
        .find(|&n| counts.contains(vk::SampleCountFlags::from_raw(n)))
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_from_features() {
        let usage = usage_from_features(vk::FormatFeatureFlags::SAMPLED_IMAGE | vk::FormatFeatureFlags::TRANSFER_DST);
        assert_eq!(usage, PixelFormatUsage::SAMPLED_IMAGE);
        let depth = usage_from_features(
            vk::FormatFeatureFlags::SAMPLED_IMAGE | vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
        );
        assert!(depth.contains(PixelFormatUsage::DEPTH_STENCIL_ATTACHMENT));
        assert!(usage_from_features(vk::FormatFeatureFlags::empty()).is_empty());
    }

    #[test]
    fn test_max_sample_count() {
        let counts = vk::SampleCountFlags::TYPE_1 | vk::SampleCountFlags::TYPE_4 | vk::SampleCountFlags::TYPE_8;
        assert_eq!(max_sample_count(counts), 8);
        assert_eq!(max_sample_count(vk::SampleCountFlags::TYPE_1), 1);
    }

    #[test]
    fn test_find_memory_type() {
        let mut properties = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: 2,
            ..Default::default()
        };
        properties.memory_types[0].property_flags = vk::MemoryPropertyFlags::DEVICE_LOCAL;
        properties.memory_types[1].property_flags =
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        assert_eq!(
            find_memory_type(&properties, 0b11, vk::MemoryPropertyFlags::HOST_VISIBLE).unwrap(),
            1
        );
        assert!(find_memory_type(&properties, 0b01, vk::MemoryPropertyFlags::HOST_VISIBLE).is_err());
    }
}
