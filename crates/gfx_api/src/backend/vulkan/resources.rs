//! Vulkan images and buffers
//!
//! Images live in device-local memory and are filled through a staging
//! buffer one (layer, level) at a time. Every subresource is kept in
//! `SHADER_READ_ONLY_OPTIMAL` between uploads. Vertex and index buffers are
//! host-visible and coherent so updates are plain memory writes.

use ash::vk;

use super::context::VulkanContext;
use super::{VulkanError, VulkanResult};
use crate::backend::TextureDesc;
use crate::buffer::BufferUsage;
use crate::format::FormatTarget;

/// Device-local image with its view
pub struct VkImage {
    /// Image handle
    pub image: vk::Image,
    /// Backing memory
    pub memory: vk::DeviceMemory,
    /// View covering every level and layer
    pub view: vk::ImageView,
    /// Allocation parameters
    pub desc: TextureDesc,
}

fn color_range(level: u32, level_count: u32, layer: u32, layer_count: u32) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: level,
        level_count,
        base_array_layer: layer,
        layer_count,
    }
}

fn transition(
    device: &ash::Device,
    command_buffer: vk::CommandBuffer,
    image: vk::Image,
    range: vk::ImageSubresourceRange,
    (old_layout, new_layout): (vk::ImageLayout, vk::ImageLayout),
) {
    let (src_access, dst_access, src_stage, dst_stage) = match (old_layout, new_layout) {
        (vk::ImageLayout::UNDEFINED, _) => (
            vk::AccessFlags::empty(),
            vk::AccessFlags::SHADER_READ,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
        ),
        (_, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => (
            vk::AccessFlags::SHADER_READ,
            vk::AccessFlags::TRANSFER_WRITE,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            vk::PipelineStageFlags::TRANSFER,
        ),
        _ => (
            vk::AccessFlags::TRANSFER_WRITE,
            vk::AccessFlags::SHADER_READ,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
        ),
    };
    let barrier = vk::ImageMemoryBarrier::builder()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(range)
        .src_access_mask(src_access)
        .dst_access_mask(dst_access)
        .build();
    unsafe {
        device.cmd_pipeline_barrier(
            command_buffer,
            src_stage,
            dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
    }
}

impl VkImage {
    /// Allocate an image with every level and layer, ready for sampling
    pub fn create(ctx: &VulkanContext, desc: &TextureDesc) -> VulkanResult<Self> {
        let device = &ctx.device;
        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: desc.width,
                height: desc.height,
                depth: 1,
            })
            .mip_levels(desc.mip_count)
            .array_layers(desc.layers)
            .format(desc.format.vk_format())
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED)
            .samples(vk::SampleCountFlags::TYPE_1)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let image = unsafe { device.create_image(&image_info, None) }.map_err(VulkanError::Api)?;

        let requirements = unsafe { device.get_image_memory_requirements(image) };
        let memory = match ctx
            .find_memory_type(requirements.memory_type_bits, vk::MemoryPropertyFlags::DEVICE_LOCAL)
            .and_then(|memory_type| {
                let alloc_info = vk::MemoryAllocateInfo::builder()
                    .allocation_size(requirements.size)
                    .memory_type_index(memory_type);
                unsafe { device.allocate_memory(&alloc_info, None) }.map_err(|_| VulkanError::OutOfMemory {
                    requested: requirements.size as usize,
                })
            }) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_image(image, None) };
                return Err(e);
            }
        };

        let mut created = Self {
            image,
            memory,
            view: vk::ImageView::null(),
            desc: desc.clone(),
        };
        if let Err(e) = created.finish(ctx) {
            created.destroy(device);
            return Err(e);
        }
        Ok(created)
    }

    fn finish(&mut self, ctx: &VulkanContext) -> VulkanResult<()> {
        let device = &ctx.device;
        unsafe { device.bind_image_memory(self.image, self.memory, 0) }.map_err(VulkanError::Api)?;

        let view_type = match self.desc.target {
            FormatTarget::Texture2D => vk::ImageViewType::TYPE_2D,
            FormatTarget::Texture2DArray => vk::ImageViewType::TYPE_2D_ARRAY,
        };
        let full = color_range(0, self.desc.mip_count, 0, self.desc.layers);
        let view_info = vk::ImageViewCreateInfo::builder()
            .image(self.image)
            .view_type(view_type)
            .format(self.desc.format.vk_format())
            .subresource_range(full);
        self.view = unsafe { device.create_image_view(&view_info, None) }.map_err(VulkanError::Api)?;

        let image = self.image;
        ctx.one_time_commands(|device, command_buffer| {
            transition(
                device,
                command_buffer,
                image,
                full,
                (vk::ImageLayout::UNDEFINED, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
            );
        })
    }

    /// Copy one level of one layer through a staging buffer
    pub fn upload(&self, ctx: &VulkanContext, layer: u32, level: u32, width: u32, height: u32, data: &[u8]) -> VulkanResult<()> {
        let staging = VkBuffer::create(ctx, BufferUsage::Vertex, data.len(), vk::BufferUsageFlags::TRANSFER_SRC)?;
        let result = staging.write(&ctx.device, 0, data).and_then(|()| {
            let image = self.image;
            let range = color_range(level, 1, layer, 1);
            let region = vk::BufferImageCopy::builder()
                .image_subresource(vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: level,
                    base_array_layer: layer,
                    layer_count: 1,
                })
                .image_extent(vk::Extent3D { width, height, depth: 1 })
                .build();
            let buffer = staging.buffer;
            ctx.one_time_commands(|device, command_buffer| {
                transition(
                    device,
                    command_buffer,
                    image,
                    range,
                    (vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL, vk::ImageLayout::TRANSFER_DST_OPTIMAL),
                );
                unsafe {
                    device.cmd_copy_buffer_to_image(
                        command_buffer,
                        buffer,
                        image,
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        &[region],
                    );
                }
                transition(
                    device,
                    command_buffer,
                    image,
                    range,
                    (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
                );
            })
        });
        staging.destroy(&ctx.device);
        result
    }

    /// Free the view, image and memory
    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            if self.view != vk::ImageView::null() {
                device.destroy_image_view(self.view, None);
            }
            device.destroy_image(self.image, None);
            device.free_memory(self.memory, None);
        }
    }
}

/// Host-visible, coherent buffer
pub struct VkBuffer {
    /// Buffer handle
    pub buffer: vk::Buffer,
    /// Backing memory
    pub memory: vk::DeviceMemory,
    /// Allocated size in bytes (at least 1)
    pub capacity: usize,
    /// Bytes in use
    pub size: usize,
    /// What the buffer holds
    pub usage: BufferUsage,
}

/// Vulkan usage flags for a buffer kind
pub fn buffer_usage_flags(usage: BufferUsage) -> vk::BufferUsageFlags {
    match usage {
        BufferUsage::Vertex => vk::BufferUsageFlags::VERTEX_BUFFER,
        BufferUsage::Index => vk::BufferUsageFlags::INDEX_BUFFER,
    }
}

impl VkBuffer {
    /// Allocate `size` bytes (zero-sized requests get one byte)
    pub fn create(ctx: &VulkanContext, usage: BufferUsage, size: usize, flags: vk::BufferUsageFlags) -> VulkanResult<Self> {
        let device = &ctx.device;
        let capacity = size.max(1);
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(capacity as vk::DeviceSize)
            .usage(flags)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe { device.create_buffer(&buffer_info, None) }.map_err(VulkanError::Api)?;

        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };
        let memory = ctx
            .find_memory_type(
                requirements.memory_type_bits,
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            )
            .and_then(|memory_type| {
                let alloc_info = vk::MemoryAllocateInfo::builder()
                    .allocation_size(requirements.size)
                    .memory_type_index(memory_type);
                unsafe { device.allocate_memory(&alloc_info, None) }.map_err(|_| VulkanError::OutOfMemory {
                    requested: requirements.size as usize,
                })
            })
            .and_then(|memory| match unsafe { device.bind_buffer_memory(buffer, memory, 0) } {
                Ok(()) => Ok(memory),
                Err(e) => {
                    unsafe { device.free_memory(memory, None) };
                    Err(VulkanError::Api(e))
                }
            });
        let memory = match memory {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        Ok(Self {
            buffer,
            memory,
            capacity,
            size,
            usage,
        })
    }

    /// Copy `data` into the buffer at `offset`
    pub fn write(&self, device: &ash::Device, offset: usize, data: &[u8]) -> VulkanResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        if offset + data.len() > self.capacity {
            return Err(VulkanError::InvalidOperation {
                reason: format!("write of {} bytes at {} exceeds {}", data.len(), offset, self.capacity),
            });
        }
        unsafe {
            let mapped = device
                .map_memory(
                    self.memory,
                    offset as vk::DeviceSize,
                    data.len() as vk::DeviceSize,
                    vk::MemoryMapFlags::empty(),
                )
                .map_err(VulkanError::Api)?;
            std::ptr::copy_nonoverlapping(data.as_ptr(), mapped.cast::<u8>(), data.len());
            device.unmap_memory(self.memory);
        }
        Ok(())
    }

    /// Free the buffer and its memory
    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_buffer(self.buffer, None);
            device.free_memory(self.memory, None);
        }
    }
}
