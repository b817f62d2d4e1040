use crate::callbacks::{AutoFocusCallback, AutoFocusMoveCallback, OpenCallback, PreviewStartedCallback};
use crate::settings::CameraSettings;
use crate::surface::PreviewTexture;
use crossbeam::channel::Sender;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// A typed request for the handler thread.
pub enum CameraAction {
    OpenCamera {
        index: usize,
        callback: Arc<dyn OpenCallback>,
    },
    Reconnect {
        index: usize,
        callback: Arc<dyn OpenCallback>,
    },
    Release,
    SetPreviewTexture(Arc<PreviewTexture>),
    StartPreview(Option<PreviewStartedCallback>),
    StopPreview,
    ApplySettings(CameraSettings),
    AutoFocus(Option<AutoFocusCallback>),
    CancelAutoFocus,
    SetAutoFocusMoveCallback(Option<AutoFocusMoveCallback>),
    /// Reply with the most recently applied settings.
    QuerySettings(Sender<Option<CameraSettings>>),

    // Part of the action vocabulary, but the handler has no implementation
    // for them; processing one is a fatal error.
    Lock,
    Unlock,
    CapturePhoto,
    SetDisplayOrientation(u32),
    StartFaceDetection,
    StopFaceDetection,
}

impl CameraAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            CameraAction::OpenCamera { .. } => ActionKind::OpenCamera,
            CameraAction::Reconnect { .. } => ActionKind::Reconnect,
            CameraAction::Release => ActionKind::Release,
            CameraAction::SetPreviewTexture(_) => ActionKind::SetPreviewTexture,
            CameraAction::StartPreview(_) => ActionKind::StartPreview,
            CameraAction::StopPreview => ActionKind::StopPreview,
            CameraAction::ApplySettings(_) => ActionKind::ApplySettings,
            CameraAction::AutoFocus(_) => ActionKind::AutoFocus,
            CameraAction::CancelAutoFocus => ActionKind::CancelAutoFocus,
            CameraAction::SetAutoFocusMoveCallback(_) => ActionKind::SetAutoFocusMoveCallback,
            CameraAction::QuerySettings(_) => ActionKind::QuerySettings,
            CameraAction::Lock => ActionKind::Lock,
            CameraAction::Unlock => ActionKind::Unlock,
            CameraAction::CapturePhoto => ActionKind::CapturePhoto,
            CameraAction::SetDisplayOrientation(_) => ActionKind::SetDisplayOrientation,
            CameraAction::StartFaceDetection => ActionKind::StartFaceDetection,
            CameraAction::StopFaceDetection => ActionKind::StopFaceDetection,
        }
    }
}

impl fmt::Debug for CameraAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraAction::OpenCamera { index, .. } | CameraAction::Reconnect { index, .. } => {
                write!(f, "{}({})", self.kind(), index)
            }
            CameraAction::SetDisplayOrientation(degrees) => {
                write!(f, "{}({})", self.kind(), degrees)
            }
            _ => write!(f, "{}", self.kind()),
        }
    }
}

/// Payload-free identity of a [`CameraAction`], used for logs and history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ActionKind {
    OpenCamera,
    Reconnect,
    Release,
    SetPreviewTexture,
    StartPreview,
    StopPreview,
    ApplySettings,
    AutoFocus,
    CancelAutoFocus,
    SetAutoFocusMoveCallback,
    QuerySettings,
    Lock,
    Unlock,
    CapturePhoto,
    SetDisplayOrientation,
    StartFaceDetection,
    StopFaceDetection,
}

impl ActionKind {
    pub fn is_open(self) -> bool {
        matches!(self, ActionKind::OpenCamera | ActionKind::Reconnect)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::OpenCamera => "open_camera",
            ActionKind::Reconnect => "reconnect",
            ActionKind::Release => "release",
            ActionKind::SetPreviewTexture => "set_preview_texture",
            ActionKind::StartPreview => "start_preview",
            ActionKind::StopPreview => "stop_preview",
            ActionKind::ApplySettings => "apply_settings",
            ActionKind::AutoFocus => "auto_focus",
            ActionKind::CancelAutoFocus => "cancel_auto_focus",
            ActionKind::SetAutoFocusMoveCallback => "set_auto_focus_move_callback",
            ActionKind::QuerySettings => "query_settings",
            ActionKind::Lock => "lock",
            ActionKind::Unlock => "unlock",
            ActionKind::CapturePhoto => "capture_photo",
            ActionKind::SetDisplayOrientation => "set_display_orientation",
            ActionKind::StartFaceDetection => "start_face_detection",
            ActionKind::StopFaceDetection => "stop_face_detection",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
