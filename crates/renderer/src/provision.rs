//! One-time construction of the Vulkan objects the frame loop draws with.
//!
//! [`ProvisionedResources::new`] builds, in order: instance (with the debug
//! messenger when validation is on), surface, physical device, logical device,
//! swapchain, render pass, shaders, pipeline layout and pipeline,
//! framebuffers, and the command pool. Any failure is fatal.
//!
//! Fields are declared in teardown order, so dropping the struct releases
//! everything in reverse dependency order. The frame slots are not part of it;
//! they must be destroyed first, after the device is idle.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use trigon_core::{RendererConfig, ShaderSource};
use trigon_platform::{Surface, Window};
use trigon_rhi::command::CommandPool;
use trigon_rhi::device::Device;
use trigon_rhi::framebuffer::Framebuffer;
use trigon_rhi::instance::{Instance, InstanceDesc};
use trigon_rhi::physical_device::select_physical_device;
use trigon_rhi::pipeline::{
    ColorBlendAttachment, CullMode, FrontFace, GraphicsPipelineBuilder, Pipeline, PipelineLayout,
    PolygonMode, PrimitiveTopology,
};
use trigon_rhi::render_pass::RenderPass;
use trigon_rhi::shader::{Shader, ShaderStage};
use trigon_rhi::swapchain::Swapchain;
use trigon_rhi::{RhiError, RhiResult, to_cstrings};

use crate::error::RenderError;

/// The triangle shader compiled into the binary.
pub const TRIANGLE_WGSL: &str = include_str!("../shaders/triangle.wgsl");

const WGSL_VERTEX_ENTRY: &str = "vs_main";
const WGSL_FRAGMENT_ENTRY: &str = "fs_main";

const SPIRV_VERTEX_FILE: &str = "vert.spv";
const SPIRV_FRAGMENT_FILE: &str = "frag.spv";
const SPIRV_ENTRY: &str = "main";

/// Device, swapchain and pipeline objects, owned for the renderer's lifetime.
pub struct ProvisionedResources {
    pipeline: Pipeline,
    pipeline_layout: PipelineLayout,
    framebuffers: Vec<Framebuffer>,
    render_pass: RenderPass,
    command_pool: CommandPool,
    swapchain: Swapchain,
    device: Arc<Device>,
    surface: Surface,
    instance: Instance,
}

impl ProvisionedResources {
    /// Build every resource for `window` from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Platform`] if the window cannot provide a
    /// surface, and [`RenderError::Setup`] for any Vulkan failure (no loader,
    /// missing validation layer, no suitable GPU, shader errors, ...).
    pub fn new(window: &Window, config: &RendererConfig) -> Result<Self, RenderError> {
        let surface_extensions = window.required_surface_extensions()?;
        let instance = Instance::new(&InstanceDesc {
            application_name: &config.application_name,
            surface_extensions: &surface_extensions,
            validation_layers: config
                .validation
                .enabled
                .then_some(config.validation.layers.as_slice()),
        })?;

        let surface = window.create_surface(instance.entry(), instance.handle())?;

        let device_extensions = to_cstrings(&config.device_extensions)?;
        let physical_device = select_physical_device(
            instance.handle(),
            surface.handle(),
            surface.loader(),
            &device_extensions,
        )?;
        let device = Device::new(&instance, &physical_device, device_extensions)?;

        let (width, height) = window.framebuffer_size();
        let swapchain = Swapchain::new(&instance, device.clone(), surface.handle(), width, height)?;

        let render_pass = RenderPass::new(device.clone(), swapchain.format())?;

        let pipeline_layout = PipelineLayout::new(device.clone(), &[], &[])?;
        let pipeline = {
            let (vertex, fragment) = load_shaders(&device, &config.shaders)?;
            build_pipeline(&device, &render_pass, &pipeline_layout, &vertex, &fragment)?
        };

        let framebuffers = Framebuffer::for_swapchain(&device, &render_pass, &swapchain)?;

        let graphics_family = device
            .queue_families()
            .graphics_family
            .ok_or(RhiError::NoSuitableGpu)?;
        let command_pool = CommandPool::new(device.clone(), graphics_family)?;

        info!(
            "Renderer resources ready on {}: {}x{}, {} swapchain images",
            physical_device.device_name(),
            swapchain.extent().width,
            swapchain.extent().height,
            swapchain.image_count()
        );

        Ok(Self {
            pipeline,
            pipeline_layout,
            framebuffers,
            render_pass,
            command_pool,
            swapchain,
            device,
            surface,
            instance,
        })
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    #[inline]
    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    #[inline]
    pub fn render_pass(&self) -> &RenderPass {
        &self.render_pass
    }

    #[inline]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    #[inline]
    pub fn framebuffers(&self) -> &[Framebuffer] {
        &self.framebuffers
    }

    #[inline]
    pub fn command_pool(&self) -> &CommandPool {
        &self.command_pool
    }
}

/// Load the vertex and fragment shader from the configured source.
fn load_shaders(device: &Arc<Device>, source: &ShaderSource) -> RhiResult<(Shader, Shader)> {
    match source {
        ShaderSource::EmbeddedWgsl => {
            debug!("Compiling embedded WGSL triangle shader");
            let vertex = Shader::from_wgsl(
                device.clone(),
                TRIANGLE_WGSL,
                ShaderStage::Vertex,
                WGSL_VERTEX_ENTRY,
            )?;
            let fragment = Shader::from_wgsl(
                device.clone(),
                TRIANGLE_WGSL,
                ShaderStage::Fragment,
                WGSL_FRAGMENT_ENTRY,
            )?;
            Ok((vertex, fragment))
        }
        ShaderSource::SpirvDir(dir) => {
            let vertex = Shader::from_spirv_file(
                device.clone(),
                &dir.join(SPIRV_VERTEX_FILE),
                ShaderStage::Vertex,
                SPIRV_ENTRY,
            )?;
            let fragment = Shader::from_spirv_file(
                device.clone(),
                &dir.join(SPIRV_FRAGMENT_FILE),
                ShaderStage::Fragment,
                SPIRV_ENTRY,
            )?;
            Ok((vertex, fragment))
        }
    }
}

fn build_pipeline(
    device: &Arc<Device>,
    render_pass: &RenderPass,
    layout: &PipelineLayout,
    vertex: &Shader,
    fragment: &Shader,
) -> RhiResult<Pipeline> {
    GraphicsPipelineBuilder::new()
        .vertex_shader(vertex)
        .fragment_shader(fragment)
        .topology(PrimitiveTopology::TriangleList)
        .polygon_mode(PolygonMode::Fill)
        .line_width(1.0)
        .cull_mode(CullMode::Back)
        .front_face(FrontFace::Clockwise)
        .color_blend_attachment(ColorBlendAttachment::alpha_blend())
        .dynamic_state(vk::DynamicState::VIEWPORT)
        .dynamic_state(vk::DynamicState::SCISSOR)
        .render_pass(render_pass.handle(), 0)
        .build(device.clone(), layout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use trigon_rhi::shader::{SPIRV_MAGIC, compile_wgsl};

    #[test]
    fn test_embedded_shader_compiles() {
        let vertex = compile_wgsl(TRIANGLE_WGSL, ShaderStage::Vertex, WGSL_VERTEX_ENTRY).unwrap();
        assert_eq!(vertex[0], SPIRV_MAGIC);

        let fragment =
            compile_wgsl(TRIANGLE_WGSL, ShaderStage::Fragment, WGSL_FRAGMENT_ENTRY).unwrap();
        assert_eq!(fragment[0], SPIRV_MAGIC);
    }

    #[test]
    fn test_embedded_shader_entry_points_are_stage_specific() {
        assert!(compile_wgsl(TRIANGLE_WGSL, ShaderStage::Vertex, WGSL_FRAGMENT_ENTRY).is_err());
        assert!(compile_wgsl(TRIANGLE_WGSL, ShaderStage::Fragment, WGSL_VERTEX_ENTRY).is_err());
    }
}
