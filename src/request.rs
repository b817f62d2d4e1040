use crate::settings::{FlashMode, FocusMode, SceneMode};
use crate::surface::SurfaceId;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Integer rectangle with exclusive right/bottom edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }
}

/// A weighted region in sensor (active array) coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeteringRectangle {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub weight: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestTemplate {
    Preview,
    StillCapture,
    Record,
}

/// Autofocus mode as understood by the capture pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfMode {
    Off,
    Auto,
    Macro,
    ContinuousVideo,
    ContinuousPicture,
    Edof,
}

impl From<FocusMode> for AfMode {
    fn from(mode: FocusMode) -> Self {
        match mode {
            FocusMode::Auto => AfMode::Auto,
            FocusMode::ContinuousPicture => AfMode::ContinuousPicture,
            FocusMode::ContinuousVideo => AfMode::ContinuousVideo,
            FocusMode::ExtendedDof => AfMode::Edof,
            FocusMode::Macro => AfMode::Macro,
            FocusMode::Fixed | FocusMode::Infinity => AfMode::Off,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AfTrigger {
    #[default]
    Idle,
    Start,
    Cancel,
}

/// Long-lived, mutable capture parameters. Edited in place and snapshotted
/// with [`CaptureRequestBuilder::build`] whenever a request is submitted.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureRequestBuilder {
    template: RequestTemplate,
    targets: Vec<SurfaceId>,
    pub af_mode: Option<AfMode>,
    pub af_trigger: AfTrigger,
    pub af_regions: Vec<MeteringRectangle>,
    pub ae_regions: Vec<MeteringRectangle>,
    pub flash_mode: Option<FlashMode>,
    pub scene_mode: Option<SceneMode>,
}

impl CaptureRequestBuilder {
    pub fn new(template: RequestTemplate) -> Self {
        Self {
            template,
            targets: Vec::new(),
            af_mode: None,
            af_trigger: AfTrigger::Idle,
            af_regions: Vec::new(),
            ae_regions: Vec::new(),
            flash_mode: None,
            scene_mode: None,
        }
    }

    pub fn template(&self) -> RequestTemplate {
        self.template
    }

    pub fn add_target(&mut self, surface: SurfaceId) {
        if !self.targets.contains(&surface) {
            self.targets.push(surface);
        }
    }

    pub fn remove_target(&mut self, surface: SurfaceId) {
        self.targets.retain(|target| *target != surface);
    }

    pub fn targets(&self) -> &[SurfaceId] {
        &self.targets
    }

    pub fn build(&self) -> CaptureRequest {
        CaptureRequest {
            template: self.template,
            targets: self.targets.clone(),
            af_mode: self.af_mode,
            af_trigger: self.af_trigger,
            af_regions: self.af_regions.clone(),
            ae_regions: self.ae_regions.clone(),
            flash_mode: self.flash_mode,
            scene_mode: self.scene_mode,
        }
    }
}

/// Immutable snapshot of a [`CaptureRequestBuilder`].
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureRequest {
    pub template: RequestTemplate,
    pub targets: Vec<SurfaceId>,
    pub af_mode: Option<AfMode>,
    pub af_trigger: AfTrigger,
    pub af_regions: Vec<MeteringRectangle>,
    pub ae_regions: Vec<MeteringRectangle>,
    pub flash_mode: Option<FlashMode>,
    pub scene_mode: Option<SceneMode>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_targets_are_deduplicated() {
        let mut builder = CaptureRequestBuilder::new(RequestTemplate::Preview);
        builder.add_target(SurfaceId(3));
        builder.add_target(SurfaceId(3));
        builder.add_target(SurfaceId(4));
        assert_eq!(builder.targets(), &[SurfaceId(3), SurfaceId(4)]);

        builder.remove_target(SurfaceId(3));
        assert_eq!(builder.targets(), &[SurfaceId(4)]);
    }

    #[test]
    fn test_build_snapshots_current_values() {
        let mut builder = CaptureRequestBuilder::new(RequestTemplate::Preview);
        builder.af_trigger = AfTrigger::Start;
        let triggered = builder.build();

        builder.af_trigger = AfTrigger::Idle;
        assert_eq!(triggered.af_trigger, AfTrigger::Start);
        assert_eq!(builder.build().af_trigger, AfTrigger::Idle);
    }

    #[test]
    fn test_focus_mode_conversion() {
        assert_eq!(AfMode::from(FocusMode::Fixed), AfMode::Off);
        assert_eq!(AfMode::from(FocusMode::Infinity), AfMode::Off);
        assert_eq!(
            AfMode::from(FocusMode::ContinuousPicture),
            AfMode::ContinuousPicture
        );
    }
}
