//! Simulated device used by the submission cycle and recorder tests.
//!
//! Fences retire instantly unless the device is marked busy, in which case
//! fence waits and `wait_idle` time out. Acquire and present failures can be
//! injected by call number. Every operation is appended to a shared event log,
//! and anything destroyed while work is outstanding is recorded as a violation.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::time::Duration;

use ash::vk;
use ash::vk::Handle;
use trigon_rhi::sync::FenceStatus;
use trigon_rhi::{RhiError, RhiResult};

use crate::backend::{AcquiredImage, DeviceIdle, FrameBackend, RenderTarget};
use crate::recorder::CommandEncoder;

pub const RENDER_PASS: u64 = 1;
pub const PIPELINE: u64 = 2;
const FRAMEBUFFER_BASE: u64 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    Wait { slot: usize },
    Reset { slot: usize },
    Acquire { slot: usize },
    Record { slot: usize },
    Submit { slot: usize },
    Present { slot: usize, image: u32 },
    /// A pending submission of the slot completed.
    Retire { slot: usize },
    Idle,
    /// Frame slots destroyed.
    Destroy,
    /// Swapchain, pipeline and the rest of the provisioned resources destroyed.
    DestroyResources,
    /// Teardown gave up and leaked everything still alive.
    Abandon,
}

#[derive(Clone, Debug, PartialEq)]
pub enum RecordedCommand {
    Begin,
    BeginRenderPass {
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        offset: (i32, i32),
        extent: (u32, u32),
        clear_color: [f32; 4],
    },
    BindPipeline(vk::Pipeline),
    SetViewport {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        min_depth: f32,
        max_depth: f32,
    },
    SetScissor {
        offset: (i32, i32),
        extent: (u32, u32),
    },
    Draw {
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
    EndRenderPass,
    End,
}

type EventLog = Rc<RefCell<Vec<Event>>>;

/// Encoder that keeps the commands it was given.
pub struct RecordingEncoder {
    slot: usize,
    log: EventLog,
    current: RefCell<Vec<RecordedCommand>>,
    recordings: RefCell<Vec<Vec<RecordedCommand>>>,
    fail_begin: Cell<Option<vk::Result>>,
}

impl RecordingEncoder {
    fn new(slot: usize, log: EventLog) -> Self {
        Self {
            slot,
            log,
            current: RefCell::default(),
            recordings: RefCell::default(),
            fail_begin: Cell::new(None),
        }
    }

    /// An encoder with its own event log.
    pub fn standalone() -> Self {
        Self::new(0, EventLog::default())
    }

    /// Completed recordings, oldest first.
    pub fn recordings(&self) -> Vec<Vec<RecordedCommand>> {
        self.recordings.borrow().clone()
    }

    pub fn last_recording(&self) -> Option<Vec<RecordedCommand>> {
        self.recordings.borrow().last().cloned()
    }

    /// Make the next `begin` fail with `result`.
    pub fn fail_next_begin(&self, result: vk::Result) {
        self.fail_begin.set(Some(result));
    }

    fn push(&self, command: RecordedCommand) {
        self.current.borrow_mut().push(command);
    }

    fn clear(&self) {
        self.current.borrow_mut().clear();
    }
}

impl CommandEncoder for RecordingEncoder {
    fn begin(&self) -> RhiResult<()> {
        if let Some(result) = self.fail_begin.take() {
            return Err(RhiError::VulkanError(result));
        }
        self.log.borrow_mut().push(Event::Record { slot: self.slot });
        self.clear();
        self.push(RecordedCommand::Begin);
        Ok(())
    }

    fn begin_render_pass(
        &self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        render_area: vk::Rect2D,
        clear_color: [f32; 4],
    ) {
        self.push(RecordedCommand::BeginRenderPass {
            render_pass,
            framebuffer,
            offset: (render_area.offset.x, render_area.offset.y),
            extent: (render_area.extent.width, render_area.extent.height),
            clear_color,
        });
    }

    fn bind_pipeline(&self, pipeline: vk::Pipeline) {
        self.push(RecordedCommand::BindPipeline(pipeline));
    }

    fn set_viewport(&self, viewport: vk::Viewport) {
        self.push(RecordedCommand::SetViewport {
            x: viewport.x,
            y: viewport.y,
            width: viewport.width,
            height: viewport.height,
            min_depth: viewport.min_depth,
            max_depth: viewport.max_depth,
        });
    }

    fn set_scissor(&self, scissor: vk::Rect2D) {
        self.push(RecordedCommand::SetScissor {
            offset: (scissor.offset.x, scissor.offset.y),
            extent: (scissor.extent.width, scissor.extent.height),
        });
    }

    fn draw(&self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        self.push(RecordedCommand::Draw {
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
        });
    }

    fn end_render_pass(&self) {
        self.push(RecordedCommand::EndRenderPass);
    }

    fn end(&self) -> RhiResult<()> {
        self.push(RecordedCommand::End);
        let recording = self.current.take();
        self.recordings.borrow_mut().push(recording);
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FenceState {
    Signaled,
    Unsignaled,
    Pending,
}

/// In-memory stand-in for the Vulkan frame backend.
pub struct SimulatedDevice {
    log: EventLog,
    fences: RefCell<Vec<FenceState>>,
    encoders: Vec<RecordingEncoder>,
    image_count: usize,
    extent: vk::Extent2D,
    busy: Cell<bool>,
    acquire_calls: Cell<usize>,
    present_calls: Cell<usize>,
    acquire_failures: HashMap<usize, vk::Result>,
    present_failures: HashMap<usize, vk::Result>,
    suboptimal_acquires: HashSet<usize>,
    image_overrides: HashMap<usize, u32>,
    max_in_flight: Cell<usize>,
    violations: RefCell<Vec<String>>,
    idle_failure: Option<vk::Result>,
    destroyed: Cell<bool>,
    resources_destroyed: Cell<bool>,
    abandoned: Cell<bool>,
}

impl SimulatedDevice {
    pub fn new(slots: usize, image_count: usize) -> Self {
        let log = EventLog::default();
        Self {
            fences: RefCell::new(vec![FenceState::Signaled; slots]),
            encoders: (0..slots)
                .map(|slot| RecordingEncoder::new(slot, log.clone()))
                .collect(),
            log,
            image_count,
            extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
            busy: Cell::new(false),
            acquire_calls: Cell::new(0),
            present_calls: Cell::new(0),
            acquire_failures: HashMap::new(),
            present_failures: HashMap::new(),
            suboptimal_acquires: HashSet::new(),
            image_overrides: HashMap::new(),
            max_in_flight: Cell::new(0),
            violations: RefCell::default(),
            idle_failure: None,
            destroyed: Cell::new(false),
            resources_destroyed: Cell::new(false),
            abandoned: Cell::new(false),
        }
    }

    /// Fail the `call`-th acquire (0-based) with `result`.
    pub fn fail_acquire(mut self, call: usize, result: vk::Result) -> Self {
        self.acquire_failures.insert(call, result);
        self
    }

    /// Fail the `call`-th present (0-based) with `result`.
    pub fn fail_present(mut self, call: usize, result: vk::Result) -> Self {
        self.present_failures.insert(call, result);
        self
    }

    /// Report the `call`-th acquire as suboptimal.
    pub fn suboptimal_acquire(mut self, call: usize) -> Self {
        self.suboptimal_acquires.insert(call);
        self
    }

    /// Make the `call`-th acquire return `image_index`.
    pub fn acquire_returns(mut self, call: usize, image_index: u32) -> Self {
        self.image_overrides.insert(call, image_index);
        self
    }

    /// Fail every `wait_idle` with `result`. `ERROR_DEVICE_LOST` also drops
    /// all outstanding work.
    pub fn fail_wait_idle(mut self, result: vk::Result) -> Self {
        self.idle_failure = Some(result);
        self
    }

    /// While busy, submitted work never completes.
    pub fn set_busy(&self, busy: bool) {
        self.busy.set(busy);
    }

    pub fn events(&self) -> Vec<Event> {
        self.log.borrow().clone()
    }

    /// Slots in the order they were submitted.
    pub fn submitted_slots(&self) -> Vec<usize> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Submit { slot } => Some(slot),
                _ => None,
            })
            .collect()
    }

    pub fn recorder(&self, slot: usize) -> &RecordingEncoder {
        &self.encoders[slot]
    }

    /// Largest number of submissions that were pending at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.get()
    }

    /// Slot protocol violations seen so far.
    pub fn violations(&self) -> Vec<String> {
        self.violations.borrow().clone()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }

    pub fn resources_destroyed(&self) -> bool {
        self.resources_destroyed.get()
    }

    fn push_event(&self, event: Event) {
        self.log.borrow_mut().push(event);
    }

    fn violation(&self, message: String) {
        self.violations.borrow_mut().push(message);
    }

    fn pending(&self) -> usize {
        self.fences
            .borrow()
            .iter()
            .filter(|&&state| state == FenceState::Pending)
            .count()
    }
}

impl FrameBackend for SimulatedDevice {
    type Encoder = RecordingEncoder;

    fn slot_count(&self) -> usize {
        self.encoders.len()
    }

    fn image_count(&self) -> usize {
        self.image_count
    }

    fn wait_for_slot(&self, slot: usize, _timeout: Duration) -> Result<FenceStatus, vk::Result> {
        self.push_event(Event::Wait { slot });
        let state = self.fences.borrow()[slot];
        match state {
            FenceState::Signaled => Ok(FenceStatus::Signaled),
            FenceState::Pending if !self.busy.get() => {
                self.fences.borrow_mut()[slot] = FenceState::Signaled;
                self.push_event(Event::Retire { slot });
                Ok(FenceStatus::Signaled)
            }
            FenceState::Pending => Ok(FenceStatus::TimedOut),
            FenceState::Unsignaled => {
                self.violation(format!("slot {} waited on a fence that was never submitted", slot));
                Ok(FenceStatus::TimedOut)
            }
        }
    }

    fn acquire_image(&self, slot: usize, _timeout: Duration) -> Result<AcquiredImage, vk::Result> {
        let call = self.acquire_calls.get();
        self.acquire_calls.set(call + 1);
        self.push_event(Event::Acquire { slot });

        if let Some(&result) = self.acquire_failures.get(&call) {
            return Err(result);
        }

        let image_index = self
            .image_overrides
            .get(&call)
            .copied()
            .unwrap_or((call % self.image_count) as u32);

        Ok(AcquiredImage {
            image_index,
            suboptimal: self.suboptimal_acquires.contains(&call),
        })
    }

    fn reset_slot(&self, slot: usize) -> Result<(), vk::Result> {
        self.push_event(Event::Reset { slot });
        let mut fences = self.fences.borrow_mut();
        if fences[slot] != FenceState::Signaled {
            self.violation(format!("slot {} reset while its fence was {:?}", slot, fences[slot]));
        }
        fences[slot] = FenceState::Unsignaled;
        self.encoders[slot].clear();
        Ok(())
    }

    fn encoder(&self, slot: usize) -> Option<&Self::Encoder> {
        if self.destroyed.get() {
            return None;
        }
        self.encoders.get(slot)
    }

    fn render_target(&self, image_index: u32) -> Option<RenderTarget> {
        ((image_index as usize) < self.image_count).then(|| RenderTarget {
            render_pass: vk::RenderPass::from_raw(RENDER_PASS),
            framebuffer: vk::Framebuffer::from_raw(FRAMEBUFFER_BASE + u64::from(image_index)),
            pipeline: vk::Pipeline::from_raw(PIPELINE),
            extent: self.extent,
        })
    }

    fn submit(&self, slot: usize) -> Result<(), vk::Result> {
        self.push_event(Event::Submit { slot });
        {
            let mut fences = self.fences.borrow_mut();
            if fences[slot] != FenceState::Unsignaled {
                self.violation(format!("slot {} submitted with fence {:?}", slot, fences[slot]));
            }
            fences[slot] = FenceState::Pending;
        }
        let pending = self.pending();
        if pending > self.max_in_flight.get() {
            self.max_in_flight.set(pending);
        }
        Ok(())
    }

    fn present(&self, slot: usize, image_index: u32) -> Result<bool, vk::Result> {
        let call = self.present_calls.get();
        self.present_calls.set(call + 1);
        self.push_event(Event::Present {
            slot,
            image: image_index,
        });

        match self.present_failures.get(&call) {
            Some(&result) => Err(result),
            None => Ok(false),
        }
    }

    fn wait_idle(&self, _timeout: Duration) -> Result<DeviceIdle, vk::Result> {
        if let Some(result) = self.idle_failure {
            if result == vk::Result::ERROR_DEVICE_LOST {
                for state in self.fences.borrow_mut().iter_mut() {
                    if *state == FenceState::Pending {
                        *state = FenceState::Signaled;
                    }
                }
            }
            return Err(result);
        }
        if self.busy.get() && self.pending() > 0 {
            return Err(vk::Result::TIMEOUT);
        }
        let mut fences = self.fences.borrow_mut();
        for (slot, state) in fences.iter_mut().enumerate() {
            if *state == FenceState::Pending {
                *state = FenceState::Signaled;
                self.push_event(Event::Retire { slot });
            }
        }
        self.push_event(Event::Idle);
        Ok(DeviceIdle::confirmed())
    }

    fn destroy_slots(&mut self, _idle: &DeviceIdle) {
        if self.destroyed.get() || self.abandoned.get() {
            return;
        }
        if self.pending() > 0 {
            self.violation("slots destroyed with work outstanding".to_string());
        }
        self.destroyed.set(true);
        self.push_event(Event::Destroy);
    }

    fn destroy_resources(&mut self, idle: &DeviceIdle) {
        if self.resources_destroyed.get() || self.abandoned.get() {
            return;
        }
        self.destroy_slots(idle);
        if self.pending() > 0 {
            self.violation("resources destroyed with work outstanding".to_string());
        }
        self.resources_destroyed.set(true);
        self.push_event(Event::DestroyResources);
    }

    fn abandon(&mut self) {
        self.abandoned.set(true);
        self.push_event(Event::Abandon);
    }
}
