use anyhow::{Context, Result};

use super::gpu::GpuContext;

/// Linear RGBA8, matching the `rgba` raw input handed to ffmpeg.
pub const TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Offscreen color target plus a mappable buffer to copy it into.
pub struct FrameTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    output_buffer: wgpu::Buffer,
    width: u32,
    height: u32,
    padded_bytes_per_row: u32,
    unpadded_bytes_per_row: u32,
}

impl FrameTarget {
    pub fn new(gpu: &GpuContext, width: u32, height: u32) -> Self {
        let width = width.max(1);
        let height = height.max(1);

        let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("frame_target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TEXTURE_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let unpadded_bytes_per_row = width * 4;
        let padded_bytes_per_row = padded_row_bytes(width);

        let output_buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("frame_readback"),
            size: (padded_bytes_per_row * height) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        Self {
            texture,
            view,
            output_buffer,
            width,
            height,
            padded_bytes_per_row,
            unpadded_bytes_per_row,
        }
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Copies the last rendered image out as tightly packed RGBA rows.
    pub fn readback(&self, gpu: &GpuContext) -> Result<Vec<u8>> {
        let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("readback_encoder"),
        });

        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &self.output_buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(self.padded_bytes_per_row),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
        gpu.queue.submit(std::iter::once(encoder.finish()));

        let buffer_slice = self.output_buffer.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        gpu.device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .context("Readback channel closed before mapping finished")?
            .context("Failed to map readback buffer")?;

        let data = buffer_slice.get_mapped_range();
        let pixels = strip_row_padding(
            &data,
            self.padded_bytes_per_row as usize,
            self.unpadded_bytes_per_row as usize,
            self.height as usize,
        );
        drop(data);
        self.output_buffer.unmap();

        Ok(pixels)
    }
}

fn padded_row_bytes(width: u32) -> u32 {
    let unpadded = width * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

fn strip_row_padding(data: &[u8], padded: usize, unpadded: usize, rows: usize) -> Vec<u8> {
    let mut pixels = Vec::with_capacity(unpadded * rows);
    for row in data.chunks(padded).take(rows) {
        pixels.extend_from_slice(&row[..unpadded]);
    }
    pixels
}
