//! Live preview: a schedule-after-completion detection loop and camera
//! stream ownership.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::frame::Frame;
use crate::pipeline::{FrameAnalysis, SelectionPipeline};

/// Consecutive frame-grab failures tolerated before the loop stops.
pub const MAX_CONSECUTIVE_FRAME_ERRORS: u32 = 3;

/// Cooperative cancellation flag, checked at the top of every loop iteration.
#[derive(Clone, Debug, Default)]
pub struct RunFlag(Arc<AtomicBool>);

impl RunFlag {
    pub fn running() -> Self {
        let flag = Self::default();
        flag.start();
        flag
    }

    pub fn start(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn stop(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Anything that yields frames: camera, video file, a still image.
pub trait FrameSource: Send {
    /// Next frame; `Ok(None)` ends the stream.
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// Repeats one frame forever.
pub struct StillFrameSource {
    frame: Frame,
}

impl StillFrameSource {
    pub fn new(frame: Frame) -> Self {
        Self { frame }
    }
}

impl FrameSource for StillFrameSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        Ok(Some(self.frame.clone()))
    }
}

/// Solid frames in random colours, for demos without a camera.
pub struct SyntheticFrameSource {
    width: u32,
    height: u32,
    rng: StdRng,
    remaining: Option<u64>,
}

impl SyntheticFrameSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            rng: StdRng::from_entropy(),
            remaining: None,
        }
    }

    pub fn seeded(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn limit(mut self, frames: u64) -> Self {
        self.remaining = Some(frames);
        self
    }
}

impl FrameSource for SyntheticFrameSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                return Ok(None);
            }
            *remaining -= 1;
        }
        let color = [self.rng.gen(), self.rng.gen(), self.rng.gen(), 255];
        Ok(Some(Frame::solid(self.width, self.height, color)))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub iterations: u64,
    pub frame_errors: u64,
    /// Analyses handed to the callback; never more than `iterations`.
    pub delivered: u64,
}

/// Runs live detection until the flag drops or the source ends.
///
/// A new inference starts only after the previous one returned. Clearing the
/// flag lets the in-flight iteration finish but suppresses its callback.
pub struct DetectionLoop<'a, S: FrameSource> {
    pipeline: &'a SelectionPipeline,
    source: S,
    flag: RunFlag,
    pause: Option<Duration>,
    max_iterations: Option<u64>,
}

impl<'a, S: FrameSource> DetectionLoop<'a, S> {
    pub fn new(pipeline: &'a SelectionPipeline, source: S, flag: RunFlag) -> Self {
        Self {
            pipeline,
            source,
            flag,
            pause: None,
            max_iterations: None,
        }
    }

    /// Sleep between the end of one iteration and the start of the next.
    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = Some(pause);
        self
    }

    pub fn with_max_iterations(mut self, max: u64) -> Self {
        self.max_iterations = Some(max);
        self
    }

    pub fn run<F>(&mut self, mut on_analysis: F) -> LoopStats
    where
        F: FnMut(&Frame, &FrameAnalysis),
    {
        let mut stats = LoopStats::default();
        let mut consecutive_errors = 0;
        while self.flag.is_running() {
            if self.max_iterations.map_or(false, |max| stats.iterations >= max) {
                break;
            }
            stats.iterations += 1;
            let frame = match self.source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    log::info!("frame source ended after {} iterations", stats.iterations - 1);
                    break;
                }
                Err(e) => {
                    stats.frame_errors += 1;
                    consecutive_errors += 1;
                    log::warn!("failed to grab frame: {:#}", e);
                    if consecutive_errors >= MAX_CONSECUTIVE_FRAME_ERRORS {
                        log::warn!(
                            "stopping live detection after {} frame errors",
                            consecutive_errors
                        );
                        break;
                    }
                    continue;
                }
            };
            consecutive_errors = 0;
            let analysis = self.pipeline.live_detections(&frame);
            if !self.flag.is_running() {
                log::debug!("loop stopped during inference, dropping result");
                break;
            }
            on_analysis(&frame, &analysis);
            stats.delivered += 1;
            if let Some(pause) = self.pause {
                std::thread::sleep(pause);
            }
        }
        stats
    }
}

/// A live camera handle whose tracks must be stopped explicitly.
pub trait CameraStream: Send {
    fn id(&self) -> &str;

    fn stop_all_tracks(&mut self);
}

/// Owns at most one camera stream; replacing or dropping stops the old one.
#[derive(Default)]
pub struct StreamSlot {
    current: Option<Box<dyn CameraStream>>,
}

impl StreamSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&mut self, stream: Box<dyn CameraStream>) {
        self.stop();
        log::debug!("camera stream {} attached", stream.id());
        self.current = Some(stream);
    }

    pub fn stop(&mut self) {
        if let Some(mut stream) = self.current.take() {
            log::debug!("stopping camera stream {}", stream.id());
            stream.stop_all_tracks();
        }
    }

    pub fn is_active(&self) -> bool {
        self.current.is_some()
    }

    pub fn current_id(&self) -> Option<&str> {
        self.current.as_deref().map(|s| s.id())
    }
}

impl Drop for StreamSlot {
    fn drop(&mut self) {
        self.stop();
    }
}
