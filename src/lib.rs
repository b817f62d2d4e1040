pub mod agent;
pub mod callbacks;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod handler;
pub mod proxy;
pub mod registry;
pub mod request;
pub mod settings;
pub mod sim;
pub mod state;
pub mod subsystem;
pub mod surface;

pub use agent::CameraAgent;
pub use callbacks::{
    AutoFocusCallback, AutoFocusMoveCallback, ExceptionCallback, ForwardingOpenCallback,
    OpenCallback, PreviewStartedCallback,
};
pub use config::{AgentConfig, DispatchConfig, HandlerConfig};
pub use dispatch::DispatchThread;
pub use error::{AgentError, Result, SubsystemError};
pub use executor::{CallbackExecutor, Job, ThreadExecutor, TokioExecutor};
pub use handler::{ActionKind, CameraAction, HandlerStats, HandlerStatsSnapshot};
pub use proxy::CameraProxy;
pub use registry::{CameraDeviceInfo, CameraRegistry};
pub use request::{
    AfMode, AfTrigger, CaptureRequest, CaptureRequestBuilder, MeteringRectangle, Rect,
    RequestTemplate, Size,
};
pub use settings::{Area, CameraSettings, FlashMode, FocusMode, SceneMode};
pub use sim::{SimCall, SimOp, SimulatedSubsystem};
pub use state::{CameraState, CameraStateHolder, StateSet};
pub use subsystem::{
    AfState, CameraCharacteristics, CameraDevice, CameraSubsystem, CaptureEvent, CaptureListener,
    CaptureResult, CaptureSession, DeviceEvent, EventSink, HardwareEvent, LensFacing,
    SessionEvent,
};
pub use surface::{PreviewTexture, Surface, SurfaceId};
