use crate::request::Size;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_SURFACE_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_TEXTURE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceId(pub u64);

/// Caller-owned image consumer that preview frames are streamed into.
///
/// Identity matters: setting the same `Arc<PreviewTexture>` twice is a no-op.
#[derive(Debug)]
pub struct PreviewTexture {
    id: u64,
    default_buffer_size: Mutex<Option<Size>>,
}

impl PreviewTexture {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_TEXTURE_ID.fetch_add(1, Ordering::Relaxed),
            default_buffer_size: Mutex::new(None),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn set_default_buffer_size(&self, size: Size) {
        *self.default_buffer_size.lock() = Some(size);
    }

    pub fn default_buffer_size(&self) -> Option<Size> {
        *self.default_buffer_size.lock()
    }
}

/// Producer endpoint bound to a [`PreviewTexture`]; the capture pipeline's
/// output target.
#[derive(Debug, Clone)]
pub struct Surface {
    inner: Arc<SurfaceInner>,
}

#[derive(Debug)]
struct SurfaceInner {
    id: SurfaceId,
    texture_id: u64,
    released: AtomicBool,
}

impl Surface {
    pub fn new(texture: &PreviewTexture) -> Self {
        Self {
            inner: Arc::new(SurfaceInner {
                id: SurfaceId(NEXT_SURFACE_ID.fetch_add(1, Ordering::Relaxed)),
                texture_id: texture.id(),
                released: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> SurfaceId {
        self.inner.id
    }

    pub fn texture_id(&self) -> u64 {
        self.inner.texture_id
    }

    pub fn release(&self) {
        self.inner.released.store(true, Ordering::Release);
    }

    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_surface_binds_texture() {
        let texture = PreviewTexture::new();
        let surface = Surface::new(&texture);
        let copy = surface.clone();

        assert_eq!(surface.texture_id(), texture.id());
        assert!(!copy.is_released());
        surface.release();
        assert!(copy.is_released());
    }

    #[test]
    fn test_unique_ids() {
        let texture = PreviewTexture::new();
        let a = Surface::new(&texture);
        let b = Surface::new(&texture);
        assert_ne!(a.id(), b.id());
        assert_ne!(texture.id(), PreviewTexture::new().id());
    }
}
