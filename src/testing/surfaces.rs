//! In-memory sinks and a presentation layer that hands them out

use crate::errors::HardwareError;
use crate::hardware::{SinkId, SinkResource};
use crate::presentation::{Surface, SurfaceProvider};
use crate::types::Size;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

static NEXT_SINK_ID: AtomicU64 = AtomicU64::new(1);

/// Sink with a process-unique id that its creator can invalidate
#[derive(Debug)]
pub struct SimulatedSink {
    id: SinkId,
    size: Size,
    valid: AtomicBool,
}

impl SimulatedSink {
    pub fn new(size: Size) -> Arc<Self> {
        Arc::new(Self {
            id: SinkId(NEXT_SINK_ID.fetch_add(1, Ordering::Relaxed)),
            size,
            valid: AtomicBool::new(true),
        })
    }

    /// Mark the sink destroyed by its owner
    pub fn invalidate(&self) {
        self.valid.store(false, Ordering::SeqCst);
    }
}

impl SinkResource for SimulatedSink {
    fn id(&self) -> SinkId {
        self.id
    }

    fn size(&self) -> Size {
        self.size
    }

    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }
}

/// Presentation layer that creates a fresh surface per request
#[derive(Debug, Clone, Default)]
pub struct StaticSurfaceProvider {
    surfaces: Arc<Mutex<Vec<Arc<SimulatedSink>>>>,
    unavailable: Arc<AtomicBool>,
}

impl StaticSurfaceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later request fail, as if no display were attached
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Destroy every surface handed out so far
    pub fn invalidate_all(&self) {
        for surface in self.surfaces.lock().unwrap_or_else(|e| e.into_inner()).iter() {
            surface.invalidate();
        }
    }

    pub fn surfaces(&self) -> Vec<Arc<SimulatedSink>> {
        self.surfaces
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl SurfaceProvider for StaticSurfaceProvider {
    fn request_output_surface(&self, size: Size) -> Result<Surface, HardwareError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(HardwareError::Unavailable("no display surface".to_string()));
        }
        let surface = SimulatedSink::new(size);
        self.surfaces
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(surface.clone());
        Ok(surface)
    }
}
