//! Per-frame ordering bookkeeping.
//!
//! The frame loop's safety rests on one rule: uniform regions for a
//! backbuffer index may only be written after the fence of that image's
//! previous submission has been waited on. [`FrameTimeline`] models that
//! discipline as a pure state machine so the orchestrator enforces it at
//! runtime and tests can exercise it against a simulated GPU.
//!
//! Per swapchain image, a frame walks:
//!
//! ```text
//! acquire -> wait -> update -> submit -> present
//! ```
//!
//! with `wait` covering whatever submission last used the image.

use thiserror::Error;

/// A frame-loop step was taken out of order.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("frame step {step:?} out of order for image {image}: image is {state:?}")]
pub struct FrameOrderViolation {
    /// The swapchain image index involved.
    pub image: u32,
    /// The step that was attempted.
    pub step: FrameStep,
    /// The image's state when the step was attempted.
    pub state: ImageState,
}

/// Steps of the per-frame loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStep {
    /// Swapchain image acquisition.
    Acquire,
    /// Waiting out the image's previous GPU work.
    Wait,
    /// CPU writes into the image's uniform regions.
    Update,
    /// Queue submission of the image's command buffer.
    Submit,
    /// Presentation of the image.
    Present,
}

/// Tracked state of one swapchain image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageState {
    /// Never used, no GPU work outstanding.
    Idle,
    /// Acquired this frame; previous GPU work may still be running.
    Acquired,
    /// Previous GPU work known complete; CPU may touch its resources.
    Waited,
    /// Uniform regions written for this frame.
    Updated,
    /// Command buffer submitted; the GPU owns the image's resources.
    Submitted,
}

/// Pure state machine enforcing the per-image frame ordering.
#[derive(Debug)]
pub struct FrameTimeline {
    states: Vec<ImageState>,
}

impl FrameTimeline {
    /// Creates a timeline for `image_count` swapchain images.
    pub fn new(image_count: usize) -> Self {
        Self {
            states: vec![ImageState::Idle; image_count],
        }
    }

    /// Records acquisition of `image`.
    ///
    /// Valid when the image is idle, or when its last frame was submitted
    /// and presented (the GPU may still be executing it).
    pub fn acquire(&mut self, image: u32) -> Result<(), FrameOrderViolation> {
        match self.state(image) {
            ImageState::Idle | ImageState::Submitted => {
                self.states[image as usize] = ImageState::Acquired;
                Ok(())
            }
            state => Err(FrameOrderViolation {
                image,
                step: FrameStep::Acquire,
                state,
            }),
        }
    }

    /// Records that the image's completion fence has been waited on and
    /// reset.
    pub fn wait_complete(&mut self, image: u32) -> Result<(), FrameOrderViolation> {
        match self.state(image) {
            ImageState::Acquired => {
                self.states[image as usize] = ImageState::Waited;
                Ok(())
            }
            state => Err(FrameOrderViolation {
                image,
                step: FrameStep::Wait,
                state,
            }),
        }
    }

    /// Records a CPU write into the image's uniform regions.
    ///
    /// This is the non-overlap guarantee: updating is only legal once the
    /// image's previous GPU work has been waited out.
    pub fn begin_update(&mut self, image: u32) -> Result<(), FrameOrderViolation> {
        match self.state(image) {
            ImageState::Waited | ImageState::Updated => {
                self.states[image as usize] = ImageState::Updated;
                Ok(())
            }
            state => Err(FrameOrderViolation {
                image,
                step: FrameStep::Update,
                state,
            }),
        }
    }

    /// Records submission of the image's command buffer.
    pub fn submit(&mut self, image: u32) -> Result<(), FrameOrderViolation> {
        match self.state(image) {
            ImageState::Waited | ImageState::Updated => {
                self.states[image as usize] = ImageState::Submitted;
                Ok(())
            }
            state => Err(FrameOrderViolation {
                image,
                step: FrameStep::Submit,
                state,
            }),
        }
    }

    /// Records presentation of the image.
    pub fn present(&self, image: u32) -> Result<(), FrameOrderViolation> {
        match self.state(image) {
            // The image stays Submitted: the GPU still owns it until the
            // next wait on its fence.
            ImageState::Submitted => Ok(()),
            state => Err(FrameOrderViolation {
                image,
                step: FrameStep::Present,
                state,
            }),
        }
    }

    /// Current state of `image`.
    #[inline]
    pub fn state(&self, image: u32) -> ImageState {
        self.states[image as usize]
    }

    /// Number of tracked images.
    #[inline]
    pub fn image_count(&self) -> usize {
        self.states.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    #[test]
    fn test_full_frame_walks_in_order() {
        let mut timeline = FrameTimeline::new(3);

        timeline.acquire(0).unwrap();
        timeline.wait_complete(0).unwrap();
        timeline.begin_update(0).unwrap();
        timeline.submit(0).unwrap();
        timeline.present(0).unwrap();

        assert_eq!(timeline.state(0), ImageState::Submitted);
    }

    #[test]
    fn test_update_without_wait_is_rejected() {
        let mut timeline = FrameTimeline::new(2);

        timeline.acquire(1).unwrap();
        let err = timeline.begin_update(1).unwrap_err();
        assert_eq!(err.step, FrameStep::Update);
        assert_eq!(err.state, ImageState::Acquired);
    }

    #[test]
    fn test_reacquire_requires_submission() {
        let mut timeline = FrameTimeline::new(2);

        timeline.acquire(0).unwrap();
        timeline.wait_complete(0).unwrap();

        // Acquiring again while the frame is mid-flight on the CPU is a bug
        let err = timeline.acquire(0).unwrap_err();
        assert_eq!(err.step, FrameStep::Acquire);
    }

    #[test]
    fn test_multiple_updates_per_frame_allowed() {
        let mut timeline = FrameTimeline::new(1);

        timeline.acquire(0).unwrap();
        timeline.wait_complete(0).unwrap();
        // One write per scene object
        timeline.begin_update(0).unwrap();
        timeline.begin_update(0).unwrap();
        timeline.submit(0).unwrap();
    }

    /// Simulated GPU: submissions complete a fixed number of steps after
    /// they are made; `wait` blocks (here: drains) until the submission
    /// for that image has completed.
    struct SimulatedGpu {
        /// (image, remaining steps until completion)
        in_flight: VecDeque<(u32, u32)>,
        latency: u32,
    }

    impl SimulatedGpu {
        fn new(latency: u32) -> Self {
            Self {
                in_flight: VecDeque::new(),
                latency,
            }
        }

        fn submit(&mut self, image: u32) {
            self.in_flight.push_back((image, self.latency));
        }

        fn step(&mut self) {
            for entry in &mut self.in_flight {
                entry.1 = entry.1.saturating_sub(1);
            }
        }

        /// Blocks until the submission for `image` has completed.
        fn wait(&mut self, image: u32) {
            while self.in_flight.iter().any(|&(i, _)| i == image) {
                self.step();
                self.in_flight.retain(|&(_, remaining)| remaining > 0);
            }
        }
    }

    #[test]
    fn test_wait_precedes_update_under_gpu_latency() {
        // Drive many frames through a 3-image swapchain against a slow
        // simulated GPU. The wait step must always be legal before the
        // update step for the same backbuffer index; any ordering bug
        // surfaces as a FrameOrderViolation.
        let image_count = 3u32;
        let mut timeline = FrameTimeline::new(image_count as usize);
        let mut gpu = SimulatedGpu::new(5);

        for frame in 0..64u32 {
            // Round-robin acquisition, like a FIFO swapchain
            let image = frame % image_count;

            timeline.acquire(image).unwrap();

            // Wait must cover the image's previous submission before any
            // CPU-side reuse of its resources
            gpu.wait(image);
            timeline.wait_complete(image).unwrap();

            timeline
                .begin_update(image)
                .expect("update must only happen after wait");

            timeline.submit(image).unwrap();
            gpu.submit(image);

            timeline.present(image).unwrap();

            // The GPU makes some progress while the CPU preps the next frame
            gpu.step();
        }
    }

    #[test]
    fn test_skipping_wait_is_caught() {
        let mut timeline = FrameTimeline::new(2);
        let mut gpu = SimulatedGpu::new(4);

        // Frame 0 on image 0, completed properly
        timeline.acquire(0).unwrap();
        gpu.wait(0);
        timeline.wait_complete(0).unwrap();
        timeline.begin_update(0).unwrap();
        timeline.submit(0).unwrap();
        gpu.submit(0);
        timeline.present(0).unwrap();

        // Frame 1 on image 0 again, but the wait step is skipped: the GPU
        // may still be reading image 0's uniform region
        timeline.acquire(0).unwrap();
        let err = timeline.begin_update(0).unwrap_err();
        assert_eq!(err.step, FrameStep::Update);
        assert_eq!(err.state, ImageState::Acquired);
    }
}
