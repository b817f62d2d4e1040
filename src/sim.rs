//! In-process camera subsystem for tests and `camctl`.
//!
//! Devices open instantly and sessions configure instantly, but every
//! outcome is still reported through the [`EventSink`], so the handler sees
//! the same message ordering it would see from real hardware. Frames only
//! flow when [`SimulatedSubsystem::emit_frame`] is called.

use crate::error::SubsystemError;
use crate::request::{CaptureRequest, CaptureRequestBuilder, Rect, RequestTemplate};
use crate::subsystem::{
    AfState, CameraCharacteristics, CameraDevice, CameraSubsystem, CaptureEvent, CaptureFailure,
    CaptureListener, CaptureResult, CaptureSession, DeviceEvent, EventSink, FailureReason,
    LensFacing, SessionEvent, SubsystemResult,
};
use crate::surface::{Surface, SurfaceId};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Operations that can be made to fail once with [`SimulatedSubsystem::fail_next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimOp {
    OpenDevice,
    CreateRequestBuilder,
    CreateSession,
    /// Session creation is accepted but configuration is reported as failed.
    ConfigureSession,
    SetRepeatingRequest,
    StopRepeating,
    Capture,
    /// The capture is accepted but its result is reported as failed.
    CaptureResult,
    AbortCaptures,
}

/// A call the handler made into the subsystem.
#[derive(Debug, Clone, PartialEq)]
pub enum SimCall {
    OpenDevice(String),
    CloseDevice(String),
    CreateSession {
        device: String,
        surfaces: Vec<SurfaceId>,
    },
    SetRepeatingRequest(CaptureRequest),
    StopRepeating,
    Capture(CaptureRequest, CaptureListener),
    AbortCaptures,
}

struct SimInner {
    devices: Vec<(String, CameraCharacteristics)>,
    failures: HashSet<SimOp>,
    af_state: AfState,
    open_device: Option<String>,
    events: Option<EventSink>,
    session_generation: u64,
    repeating: Option<(u64, CaptureListener)>,
    frame_number: u64,
    journal: Vec<SimCall>,
}

impl SimInner {
    fn take_failure(&mut self, op: SimOp) -> bool {
        self.failures.remove(&op)
    }

    fn next_frame(&mut self) -> u64 {
        self.frame_number += 1;
        self.frame_number
    }
}

#[derive(Clone)]
pub struct SimulatedSubsystem {
    inner: Arc<Mutex<SimInner>>,
}

impl SimulatedSubsystem {
    /// The first id faces back, the rest face front.
    pub fn new(ids: &[&str]) -> Self {
        let sim = Self {
            inner: Arc::new(Mutex::new(SimInner {
                devices: Vec::new(),
                failures: HashSet::new(),
                af_state: AfState::Inactive,
                open_device: None,
                events: None,
                session_generation: 0,
                repeating: None,
                frame_number: 0,
                journal: Vec::new(),
            })),
        };
        for (i, id) in ids.iter().enumerate() {
            let facing = if i == 0 {
                LensFacing::Back
            } else {
                LensFacing::Front
            };
            sim.add_device_with(id, default_characteristics(facing));
        }
        sim
    }

    pub fn add_device(&self, id: &str) {
        self.add_device_with(id, default_characteristics(LensFacing::Front));
    }

    pub fn add_device_with(&self, id: &str, characteristics: CameraCharacteristics) {
        let mut inner = self.inner.lock();
        inner.devices.retain(|(known, _)| known != id);
        inner.devices.push((id.to_string(), characteristics));
    }

    pub fn remove_device(&self, id: &str) {
        self.inner.lock().devices.retain(|(known, _)| known != id);
    }

    /// Make the next `op` fail.
    pub fn fail_next(&self, op: SimOp) {
        self.inner.lock().failures.insert(op);
    }

    /// Autofocus state reported by subsequent capture results.
    pub fn set_af_state(&self, state: AfState) {
        self.inner.lock().af_state = state;
    }

    /// Deliver one repeating-request result, failed if [`SimOp::CaptureResult`]
    /// is armed. Returns `false` when no repeating request is active.
    pub fn emit_frame(&self) -> bool {
        let mut inner = self.inner.lock();
        let Some((_, listener)) = inner.repeating else {
            return false;
        };
        let Some(events) = inner.events.clone() else {
            return false;
        };
        let frame_number = inner.next_frame();
        let event = if inner.take_failure(SimOp::CaptureResult) {
            CaptureEvent::Failed(CaptureFailure {
                frame_number,
                reason: FailureReason::Error,
            })
        } else {
            CaptureEvent::Completed(CaptureResult {
                frame_number,
                af_state: Some(inner.af_state),
            })
        };
        events.capture(listener, event);
        true
    }

    pub fn emit_device_error(&self, code: i32) {
        if let Some(events) = self.inner.lock().events.clone() {
            events.device(DeviceEvent::Error(code));
        }
    }

    /// Report the open device as disconnected and forget it.
    pub fn disconnect(&self) {
        let mut inner = self.inner.lock();
        if let Some(id) = inner.open_device.take() {
            inner.devices.retain(|(known, _)| *known != id);
        }
        inner.repeating = None;
        if let Some(events) = inner.events.take() {
            events.device(DeviceEvent::Disconnected);
        }
    }

    pub fn is_repeating(&self) -> bool {
        self.inner.lock().repeating.is_some()
    }

    pub fn journal(&self) -> Vec<SimCall> {
        self.inner.lock().journal.clone()
    }

    pub fn clear_journal(&self) {
        self.inner.lock().journal.clear();
    }
}

fn default_characteristics(lens_facing: LensFacing) -> CameraCharacteristics {
    CameraCharacteristics {
        lens_facing,
        sensor_orientation: 90,
        active_array: Rect::new(0, 0, 4000, 3000),
    }
}

impl CameraSubsystem for SimulatedSubsystem {
    fn list_device_ids(&self) -> SubsystemResult<Vec<String>> {
        Ok(self
            .inner
            .lock()
            .devices
            .iter()
            .map(|(id, _)| id.clone())
            .collect())
    }

    fn characteristics(&self, id: &str) -> SubsystemResult<CameraCharacteristics> {
        self.inner
            .lock()
            .devices
            .iter()
            .find(|(known, _)| known == id)
            .map(|(_, characteristics)| characteristics.clone())
            .ok_or_else(|| SubsystemError::Disconnected { id: id.to_string() })
    }

    fn open_device(&self, id: &str, events: EventSink) -> SubsystemResult<()> {
        let mut inner = self.inner.lock();
        inner.journal.push(SimCall::OpenDevice(id.to_string()));
        if inner.take_failure(SimOp::OpenDevice) {
            return Err(SubsystemError::InUse { id: id.to_string() });
        }
        if !inner.devices.iter().any(|(known, _)| known == id) {
            return Err(SubsystemError::Disconnected { id: id.to_string() });
        }

        debug!("Simulated camera {} opened", id);
        inner.open_device = Some(id.to_string());
        inner.events = Some(events.clone());
        let device = SimDevice {
            id: id.to_string(),
            sim: self.clone(),
            events: events.clone(),
        };
        events.device(DeviceEvent::Opened(Box::new(device)));
        Ok(())
    }
}

struct SimDevice {
    id: String,
    sim: SimulatedSubsystem,
    events: EventSink,
}

impl CameraDevice for SimDevice {
    fn id(&self) -> &str {
        &self.id
    }

    fn create_request_builder(
        &mut self,
        template: RequestTemplate,
    ) -> SubsystemResult<CaptureRequestBuilder> {
        if self.sim.inner.lock().take_failure(SimOp::CreateRequestBuilder) {
            return Err(SubsystemError::device("request template unavailable"));
        }
        Ok(CaptureRequestBuilder::new(template))
    }

    fn create_session(&mut self, surfaces: Vec<Surface>) -> SubsystemResult<()> {
        let mut inner = self.sim.inner.lock();
        inner.journal.push(SimCall::CreateSession {
            device: self.id.clone(),
            surfaces: surfaces.iter().map(Surface::id).collect(),
        });
        if inner.take_failure(SimOp::CreateSession) {
            return Err(SubsystemError::device("session creation refused"));
        }
        if inner.take_failure(SimOp::ConfigureSession) {
            self.events.session(SessionEvent::ConfigureFailed);
            return Ok(());
        }

        inner.session_generation += 1;
        let session = SimSession {
            generation: inner.session_generation,
            sim: self.sim.clone(),
            events: self.events.clone(),
            started: false,
        };
        self.events
            .session(SessionEvent::Configured(Box::new(session)));
        Ok(())
    }

    fn close(&mut self) {
        let mut inner = self.sim.inner.lock();
        inner.journal.push(SimCall::CloseDevice(self.id.clone()));
        if inner.open_device.as_deref() == Some(self.id.as_str()) {
            inner.open_device = None;
            inner.events = None;
            inner.repeating = None;
        }
    }
}

struct SimSession {
    generation: u64,
    sim: SimulatedSubsystem,
    events: EventSink,
    started: bool,
}

impl SimSession {
    fn check_current(&self, inner: &SimInner) -> SubsystemResult<()> {
        if inner.open_device.is_none() || inner.session_generation != self.generation {
            return Err(SubsystemError::SessionClosed);
        }
        Ok(())
    }
}

impl CaptureSession for SimSession {
    fn set_repeating_request(
        &mut self,
        request: CaptureRequest,
        listener: CaptureListener,
    ) -> SubsystemResult<()> {
        let mut inner = self.sim.inner.lock();
        self.check_current(&inner)?;
        if inner.take_failure(SimOp::SetRepeatingRequest) {
            return Err(SubsystemError::device("repeating request rejected"));
        }
        inner.journal.push(SimCall::SetRepeatingRequest(request));
        inner.repeating = Some((self.generation, listener));
        if !self.started {
            self.started = true;
            self.events.session(SessionEvent::Active);
        }
        Ok(())
    }

    fn stop_repeating(&mut self) -> SubsystemResult<()> {
        let mut inner = self.sim.inner.lock();
        self.check_current(&inner)?;
        if inner.take_failure(SimOp::StopRepeating) {
            return Err(SubsystemError::device("stop repeating rejected"));
        }
        inner.journal.push(SimCall::StopRepeating);
        inner.repeating = None;
        Ok(())
    }

    fn capture(
        &mut self,
        request: CaptureRequest,
        listener: CaptureListener,
    ) -> SubsystemResult<()> {
        let mut inner = self.sim.inner.lock();
        self.check_current(&inner)?;
        if inner.take_failure(SimOp::Capture) {
            return Err(SubsystemError::device("capture rejected"));
        }
        inner.journal.push(SimCall::Capture(request, listener));

        let frame_number = inner.next_frame();
        let event = if inner.take_failure(SimOp::CaptureResult) {
            CaptureEvent::Failed(CaptureFailure {
                frame_number,
                reason: FailureReason::Error,
            })
        } else {
            CaptureEvent::Completed(CaptureResult {
                frame_number,
                af_state: Some(inner.af_state),
            })
        };
        self.events.capture(listener, event);
        Ok(())
    }

    fn abort_captures(&mut self) -> SubsystemResult<()> {
        let mut inner = self.sim.inner.lock();
        inner.journal.push(SimCall::AbortCaptures);
        if inner.take_failure(SimOp::AbortCaptures) {
            return Err(SubsystemError::device("abort rejected"));
        }
        if matches!(inner.repeating, Some((generation, _)) if generation == self.generation) {
            inner.repeating = None;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{HandlerHandle, HandlerMessage};
    use crate::subsystem::HardwareEvent;

    fn next_event(rx: &crossbeam::channel::Receiver<HandlerMessage>) -> HardwareEvent {
        match rx.try_recv().unwrap() {
            HandlerMessage::Hardware(event) => event,
            _ => panic!("Expected a hardware event"),
        }
    }

    #[test]
    fn test_open_reports_device_through_sink() {
        let sim = SimulatedSubsystem::new(&["0"]);
        let (handle, rx) = HandlerHandle::channel();

        sim.open_device("0", handle.event_sink()).unwrap();
        match next_event(&rx) {
            HardwareEvent::Device(DeviceEvent::Opened(device)) => assert_eq!(device.id(), "0"),
            other => panic!("Unexpected event {}", other.name()),
        }
        assert_eq!(sim.journal(), vec![SimCall::OpenDevice("0".to_string())]);
    }

    #[test]
    fn test_open_unknown_device_fails() {
        let sim = SimulatedSubsystem::new(&["0"]);
        let (handle, _rx) = HandlerHandle::channel();
        assert!(matches!(
            sim.open_device("9", handle.event_sink()),
            Err(SubsystemError::Disconnected { .. })
        ));
    }

    #[test]
    fn test_injected_failure_applies_once() {
        let sim = SimulatedSubsystem::new(&["0"]);
        let (handle, rx) = HandlerHandle::channel();
        sim.fail_next(SimOp::OpenDevice);

        assert!(sim.open_device("0", handle.event_sink()).is_err());
        assert!(sim.open_device("0", handle.event_sink()).is_ok());
        assert_eq!(next_event(&rx).name(), "device_opened");
    }

    #[test]
    fn test_frames_only_flow_while_repeating() {
        let sim = SimulatedSubsystem::new(&["0"]);
        let (handle, rx) = HandlerHandle::channel();
        sim.open_device("0", handle.event_sink()).unwrap();
        let HardwareEvent::Device(DeviceEvent::Opened(mut device)) = next_event(&rx) else {
            panic!("Expected an opened device");
        };

        assert!(!sim.emit_frame());
        device.create_session(Vec::new()).unwrap();
        let HardwareEvent::Session(SessionEvent::Configured(mut session)) = next_event(&rx) else {
            panic!("Expected a configured session");
        };

        let request = CaptureRequestBuilder::new(RequestTemplate::Preview).build();
        session
            .set_repeating_request(request, CaptureListener::FocusState)
            .unwrap();
        assert_eq!(next_event(&rx).name(), "session_active");

        sim.set_af_state(AfState::PassiveScan);
        assert!(sim.emit_frame());
        match next_event(&rx) {
            HardwareEvent::Capture {
                listener: CaptureListener::FocusState,
                event: CaptureEvent::Completed(result),
            } => assert_eq!(result.af_state, Some(AfState::PassiveScan)),
            other => panic!("Unexpected event {}", other.name()),
        }

        device.close();
        assert!(!sim.emit_frame());
        assert!(matches!(
            session.stop_repeating(),
            Err(SubsystemError::SessionClosed)
        ));
    }
}
