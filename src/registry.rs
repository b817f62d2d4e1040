use crate::error::{AgentError, Result};
use crate::subsystem::{CameraCharacteristics, CameraSubsystem, LensFacing};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Index-stable mapping from small integer camera indices to device ids.
///
/// An index, once assigned, never refers to a different device. Devices that
/// disappear leave a tombstone (`None`) in their slot; new devices are
/// appended and receive the lowest index never used before.
#[derive(Debug, Clone, Default)]
pub struct CameraRegistry {
    slots: Vec<Option<String>>,
    live_count: usize,
}

impl CameraRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconcile the registry with the subsystem's current device listing.
    pub fn update(&mut self, current: &[String]) {
        let present: HashSet<&str> = current.iter().map(String::as_str).collect();

        for slot in self.slots.iter_mut() {
            let gone = matches!(slot, Some(id) if !present.contains(id.as_str()));
            if gone {
                debug!("Camera device {:?} disappeared, tombstoning its index", slot);
                *slot = None;
                self.live_count -= 1;
            }
        }

        for id in current {
            let known = self.slots.iter().flatten().any(|known| known == id);
            if !known {
                debug!("Assigning index {} to camera device {}", self.slots.len(), id);
                self.slots.push(Some(id.clone()));
                self.live_count += 1;
            }
        }
    }

    /// Resolve an index. `Ok(None)` is a tombstone; an index that was never
    /// assigned is an error.
    pub fn device_id(&self, index: usize) -> Result<Option<&str>> {
        self.slots
            .get(index)
            .map(|slot| slot.as_deref())
            .ok_or(AgentError::UnknownCameraIndex { index })
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.as_deref() == Some(id))
    }

    pub fn slots(&self) -> &[Option<String>] {
        &self.slots
    }

    pub fn live_count(&self) -> usize {
        self.live_count
    }
}

/// Snapshot of the registry together with each live device's characteristics.
#[derive(Debug, Clone, Serialize)]
pub struct CameraDeviceInfo {
    camera_ids: Vec<Option<String>>,
    characteristics: Vec<Option<CameraCharacteristics>>,
    number_of_cameras: usize,
    first_back_camera: Option<usize>,
    first_front_camera: Option<usize>,
}

impl CameraDeviceInfo {
    pub fn snapshot(registry: &CameraRegistry, subsystem: &dyn CameraSubsystem) -> Self {
        let characteristics: Vec<Option<CameraCharacteristics>> = registry
            .slots()
            .iter()
            .map(|slot| {
                let id = slot.as_deref()?;
                match subsystem.characteristics(id) {
                    Ok(characteristics) => Some(characteristics),
                    Err(e) => {
                        warn!("Couldn't get characteristics of camera '{}': {}", id, e);
                        None
                    }
                }
            })
            .collect();

        let first_facing = |facing: LensFacing| {
            characteristics
                .iter()
                .position(|c| matches!(c, Some(c) if c.lens_facing == facing))
        };

        Self {
            camera_ids: registry.slots().to_vec(),
            number_of_cameras: registry.live_count(),
            first_back_camera: first_facing(LensFacing::Back),
            first_front_camera: first_facing(LensFacing::Front),
            characteristics,
        }
    }

    pub fn characteristics(&self, index: usize) -> Option<&CameraCharacteristics> {
        self.characteristics.get(index)?.as_ref()
    }

    pub fn camera_ids(&self) -> &[Option<String>] {
        &self.camera_ids
    }

    pub fn number_of_cameras(&self) -> usize {
        self.number_of_cameras
    }

    pub fn first_back_camera(&self) -> Option<usize> {
        self.first_back_camera
    }

    pub fn first_front_camera(&self) -> Option<usize> {
        self.first_front_camera
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Rect;
    use crate::sim::SimulatedSubsystem;

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_removal_leaves_tombstone_and_append_uses_fresh_index() {
        let mut registry = CameraRegistry::new();
        registry.update(&ids(&["0", "1"]));
        assert_eq!(registry.slots(), &[Some("0".to_string()), Some("1".to_string())]);
        assert_eq!(registry.live_count(), 2);

        registry.update(&ids(&["1"]));
        assert_eq!(registry.slots(), &[None, Some("1".to_string())]);
        assert_eq!(registry.live_count(), 1);

        registry.update(&ids(&["1", "2"]));
        assert_eq!(
            registry.slots(),
            &[None, Some("1".to_string()), Some("2".to_string())]
        );
        assert_eq!(registry.live_count(), 2);
        assert_eq!(registry.index_of("2"), Some(2));
    }

    #[test]
    fn test_assigned_indices_never_change_meaning() {
        let mut registry = CameraRegistry::new();
        let rounds: [&[&str]; 6] = [
            &["a", "b"],
            &["b", "c"],
            &["a", "c", "d"],
            &[],
            &["d", "e", "b"],
            &["e"],
        ];

        let mut seen: Vec<Option<String>> = Vec::new();
        for round in rounds {
            registry.update(&ids(round));

            for (index, previous) in seen.iter().enumerate() {
                let current = registry.device_id(index).unwrap();
                match previous {
                    Some(id) => assert!(current.is_none() || current == Some(id.as_str())),
                    None => assert!(current.is_none()),
                }
            }
            let live = registry.slots().iter().filter(|s| s.is_some()).count();
            assert_eq!(live, registry.live_count());
            seen = registry.slots().to_vec();
        }

        // "a" came back after removal and was given a fresh index
        assert_eq!(registry.device_id(0).unwrap(), None);
        assert_eq!(registry.slots().len(), 8);
        assert_eq!(registry.index_of("e"), Some(6));
        assert_eq!(registry.live_count(), 1);
    }

    #[test]
    fn test_unknown_index_is_an_error() {
        let mut registry = CameraRegistry::new();
        registry.update(&ids(&["0"]));
        assert!(matches!(
            registry.device_id(3),
            Err(AgentError::UnknownCameraIndex { index: 3 })
        ));
    }

    #[test]
    fn test_device_info_snapshot() {
        let sim = SimulatedSubsystem::new(&["back", "front"]);
        sim.add_device_with(
            "ext",
            CameraCharacteristics {
                lens_facing: LensFacing::External,
                sensor_orientation: 0,
                active_array: Rect::new(0, 0, 640, 480),
            },
        );

        let mut registry = CameraRegistry::new();
        registry.update(&sim.list_device_ids().unwrap());
        sim.remove_device("back");
        registry.update(&sim.list_device_ids().unwrap());

        let info = CameraDeviceInfo::snapshot(&registry, &sim);
        assert_eq!(info.number_of_cameras(), 2);
        assert!(info.characteristics(0).is_none());
        assert!(info.characteristics(1).unwrap().is_facing_front());
        assert_eq!(info.first_back_camera(), None);
        assert_eq!(info.first_front_camera(), Some(1));
        assert!(!info.characteristics(2).unwrap().can_disable_shutter_sound());
    }
}
