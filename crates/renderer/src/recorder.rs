//! Command recording for one frame.
//!
//! [`CommandRecorder`] writes the frame's commands through the
//! [`CommandEncoder`] trait, which the RHI [`CommandBuffer`] implements. The
//! trait keeps the recorder testable without a GPU.

use ash::vk;
use trigon_rhi::RhiResult;
use trigon_rhi::command::CommandBuffer;

use crate::backend::RenderTarget;

/// Vertices in the triangle. Positions and colors live in the vertex shader.
pub const TRIANGLE_VERTEX_COUNT: u32 = 3;

/// Opaque black.
pub const DEFAULT_CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// The subset of command buffer operations a frame needs.
pub trait CommandEncoder {
    /// Begin recording. The buffer must already be reset.
    fn begin(&self) -> RhiResult<()>;

    /// Begin `render_pass` on `framebuffer`, clearing the color attachment.
    fn begin_render_pass(
        &self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        render_area: vk::Rect2D,
        clear_color: [f32; 4],
    );

    fn bind_pipeline(&self, pipeline: vk::Pipeline);

    fn set_viewport(&self, viewport: vk::Viewport);

    fn set_scissor(&self, scissor: vk::Rect2D);

    fn draw(&self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32);

    fn end_render_pass(&self);

    /// Finish recording.
    fn end(&self) -> RhiResult<()>;
}

impl CommandEncoder for CommandBuffer {
    fn begin(&self) -> RhiResult<()> {
        CommandBuffer::begin(self)
    }

    fn begin_render_pass(
        &self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        render_area: vk::Rect2D,
        clear_color: [f32; 4],
    ) {
        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: clear_color,
            },
        }];

        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(render_area)
            .clear_values(&clear_values);

        CommandBuffer::begin_render_pass(self, &begin_info);
    }

    fn bind_pipeline(&self, pipeline: vk::Pipeline) {
        CommandBuffer::bind_pipeline(self, vk::PipelineBindPoint::GRAPHICS, pipeline);
    }

    fn set_viewport(&self, viewport: vk::Viewport) {
        CommandBuffer::set_viewport(self, &viewport);
    }

    fn set_scissor(&self, scissor: vk::Rect2D) {
        CommandBuffer::set_scissor(self, &scissor);
    }

    fn draw(&self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        CommandBuffer::draw(self, vertex_count, instance_count, first_vertex, first_instance);
    }

    fn end_render_pass(&self) {
        CommandBuffer::end_render_pass(self);
    }

    fn end(&self) -> RhiResult<()> {
        CommandBuffer::end(self)
    }
}

/// Records the triangle draw into a frame's command buffer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CommandRecorder {
    clear_color: [f32; 4],
}

impl Default for CommandRecorder {
    fn default() -> Self {
        Self::new(DEFAULT_CLEAR_COLOR)
    }
}

impl CommandRecorder {
    pub fn new(clear_color: [f32; 4]) -> Self {
        Self { clear_color }
    }

    #[inline]
    pub fn clear_color(&self) -> [f32; 4] {
        self.clear_color
    }

    /// Record one frame into `encoder`, drawing into `target`.
    ///
    /// Viewport and scissor are dynamic pipeline state, so both are set on
    /// every recording.
    ///
    /// # Errors
    ///
    /// Returns the error of beginning or ending the buffer. Nothing is retried.
    pub fn record<E: CommandEncoder + ?Sized>(
        &self,
        encoder: &E,
        target: &RenderTarget,
    ) -> RhiResult<()> {
        let render_area = full_scissor(target.extent);

        encoder.begin()?;
        encoder.begin_render_pass(
            target.render_pass,
            target.framebuffer,
            render_area,
            self.clear_color,
        );
        encoder.bind_pipeline(target.pipeline);
        encoder.set_viewport(full_viewport(target.extent));
        encoder.set_scissor(render_area);
        encoder.draw(TRIANGLE_VERTEX_COUNT, 1, 0, 0);
        encoder.end_render_pass();
        encoder.end()
    }
}

/// Viewport covering the whole of `extent`, depth range `[0, 1]`.
pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

/// Scissor rectangle covering the whole of `extent`.
pub fn full_scissor(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}
