use crate::error::{AgentError, Result};
use crate::request::{MeteringRectangle, Rect, Size};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusMode {
    Auto,
    ContinuousPicture,
    ContinuousVideo,
    ExtendedDof,
    Fixed,
    Infinity,
    Macro,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashMode {
    /// Sentinel: leave the request's flash mode untouched.
    NoFlash,
    Auto,
    Off,
    On,
    Torch,
    RedEye,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneMode {
    /// Sentinel: leave the request's scene mode untouched.
    NoSceneMode,
    Auto,
    Action,
    Hdr,
    Landscape,
    Night,
    Portrait,
    Sports,
}

/// A weighted region in legacy coordinates, where both axes span [-1000, 1000].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Area {
    pub rect: Rect,
    pub weight: u32,
}

impl Area {
    pub const fn new(rect: Rect, weight: u32) -> Self {
        Self { rect, weight }
    }
}

/// Caller-facing camera settings, merged into the persistent request.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraSettings {
    pub preview_size: Size,
    pub photo_size: Size,
    pub focus_mode: FocusMode,
    pub focus_areas: Vec<Area>,
    pub metering_areas: Vec<Area>,
    pub flash_mode: FlashMode,
    pub scene_mode: SceneMode,
}

impl CameraSettings {
    pub fn new(preview_size: Size, photo_size: Size) -> Self {
        Self {
            preview_size,
            photo_size,
            focus_mode: FocusMode::ContinuousPicture,
            focus_areas: Vec::new(),
            metering_areas: Vec::new(),
            flash_mode: FlashMode::NoFlash,
            scene_mode: SceneMode::NoSceneMode,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.preview_size.width == 0 || self.preview_size.height == 0 {
            return Err(AgentError::invalid_settings(
                "preview size must be greater than 0",
            ));
        }
        if self.photo_size.width == 0 || self.photo_size.height == 0 {
            return Err(AgentError::invalid_settings(
                "photo size must be greater than 0",
            ));
        }

        for area in self.focus_areas.iter().chain(&self.metering_areas) {
            let r = area.rect;
            let in_range = |v: i32| (-1000..=1000).contains(&v);
            if !(in_range(r.left) && in_range(r.top) && in_range(r.right) && in_range(r.bottom)) {
                return Err(AgentError::invalid_settings(format!(
                    "area {:?} lies outside [-1000, 1000]",
                    r
                )));
            }
            if r.left > r.right || r.top > r.bottom {
                return Err(AgentError::invalid_settings(format!(
                    "area {:?} is inverted",
                    r
                )));
            }
        }

        Ok(())
    }
}

/// Remap legacy areas onto the sensor's active array.
///
/// Coordinates are clamped to `[0, width - 1]` and `[0, height - 1]` of the
/// active array; an empty input produces no regions.
pub fn legacy_areas_to_metering(areas: &[Area], active_array: Rect) -> Vec<MeteringRectangle> {
    let width = active_array.width();
    let height = active_array.height();

    areas
        .iter()
        .map(|area| {
            let normalize = |v: i32| (v as f64 + 1000.0) / 2000.0;
            let project_x = |v: i32| {
                constrain(
                    width as f64 * normalize(v) + active_array.left as f64,
                    0,
                    width - 1,
                )
            };
            let project_y = |v: i32| {
                constrain(
                    height as f64 * normalize(v) + active_array.top as f64,
                    0,
                    height - 1,
                )
            };

            let left = project_x(area.rect.left);
            let top = project_y(area.rect.top);
            let right = project_x(area.rect.right);
            let bottom = project_y(area.rect.bottom);

            MeteringRectangle {
                x: left,
                y: top,
                width: right - left,
                height: bottom - top,
                weight: area.weight,
            }
        })
        .collect()
}

fn constrain(value: f64, min: i32, max: i32) -> i32 {
    value.max(min as f64).min(max as f64) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACTIVE_ARRAY: Rect = Rect::new(0, 0, 4000, 3000);

    #[test]
    fn test_full_frame_area_covers_active_array() {
        let areas = [Area::new(Rect::new(-1000, -1000, 1000, 1000), 1)];
        let regions = legacy_areas_to_metering(&areas, ACTIVE_ARRAY);

        assert_eq!(
            regions,
            vec![MeteringRectangle {
                x: 0,
                y: 0,
                width: 3999,
                height: 2999,
                weight: 1,
            }]
        );
    }

    #[test]
    fn test_centered_area() {
        let areas = [Area::new(Rect::new(-500, -500, 500, 500), 600)];
        let regions = legacy_areas_to_metering(&areas, ACTIVE_ARRAY);

        assert_eq!(regions[0].x, 1000);
        assert_eq!(regions[0].y, 750);
        assert_eq!(regions[0].width, 2000);
        assert_eq!(regions[0].height, 1500);
        assert_eq!(regions[0].weight, 600);
    }

    #[test]
    fn test_offset_active_array_is_clamped() {
        let active = Rect::new(100, 50, 1100, 1050);
        let areas = [Area::new(Rect::new(0, 0, 1000, 1000), 10)];
        let regions = legacy_areas_to_metering(&areas, active);

        // 1000 * 0.5 + 100 = 600, right edge 1000 * 1.0 + 100 clamps to 999
        assert_eq!(regions[0].x, 600);
        assert_eq!(regions[0].y, 550);
        assert_eq!(regions[0].width, 399);
        assert_eq!(regions[0].height, 449);
    }

    #[test]
    fn test_empty_areas_produce_no_regions() {
        assert!(legacy_areas_to_metering(&[], ACTIVE_ARRAY).is_empty());
    }

    #[test]
    fn test_settings_validation() {
        let mut settings = CameraSettings::new(Size::new(1280, 720), Size::new(4000, 3000));
        assert!(settings.validate().is_ok());

        settings.focus_areas.push(Area::new(Rect::new(-1200, 0, 0, 100), 1));
        assert!(settings.validate().is_err());

        settings.focus_areas.clear();
        settings.preview_size = Size::new(0, 720);
        assert!(matches!(
            settings.validate(),
            Err(AgentError::InvalidSettings { .. })
        ));
    }
}
