//! Boundary to the rendering backend

use crate::particle::ParticleKind;
use spark_core::ParticleSystemId;
use std::cell::RefCell;
use std::rc::Rc;

/// One system's particles for one draw call
pub struct DrawBatch<'a, P> {
    pub system_id: ParticleSystemId,
    pub texture: Option<&'a str>,
    /// Every active particle, visible or not
    pub particles: &'a [P],
}

impl<'a, P: ParticleKind> DrawBatch<'a, P> {
    /// Active particles that want to be drawn
    pub fn visible(&self) -> impl Iterator<Item = &'a P> + 'a {
        let particles: &'a [P] = self.particles;
        particles.iter().filter(|p| p.base().visible)
    }

    pub fn visible_count(&self) -> usize {
        self.visible().count()
    }
}

/// Implemented by whatever turns particles into pixels. Systems only read
/// particle state while drawing.
pub trait ParticleRenderer<P> {
    /// Draw a batch, returning how many particles were drawn
    fn draw(&mut self, batch: DrawBatch<'_, P>) -> usize;
}

/// Renderer for headless runs: counts visible particles and draws nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRenderer;

impl<P: ParticleKind> ParticleRenderer<P> for NullRenderer {
    fn draw(&mut self, batch: DrawBatch<'_, P>) -> usize {
        batch.visible_count()
    }
}

/// What a [`RecordingRenderer`] saw in one draw call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawRecord {
    pub system_id: ParticleSystemId,
    pub texture: Option<String>,
    pub active: usize,
    pub visible: usize,
}

/// Shared log a [`RecordingRenderer`] appends to
pub type DrawLog = Rc<RefCell<Vec<DrawRecord>>>;

/// Renderer that records every draw call, for tests and diagnostics
#[derive(Debug, Default, Clone)]
pub struct RecordingRenderer {
    log: DrawLog,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle to the records, still readable after the renderer is boxed
    /// into a system
    pub fn log(&self) -> DrawLog {
        self.log.clone()
    }
}

impl<P: ParticleKind> ParticleRenderer<P> for RecordingRenderer {
    fn draw(&mut self, batch: DrawBatch<'_, P>) -> usize {
        let visible = batch.visible_count();
        self.log.borrow_mut().push(DrawRecord {
            system_id: batch.system_id,
            texture: batch.texture.map(str::to_string),
            active: batch.particles.len(),
            visible,
        });
        visible
    }
}
