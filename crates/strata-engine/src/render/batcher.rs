//! Shared batcher plumbing.
//!
//! A batcher accumulates the geometry of one primitive family for the whole
//! frame, uploads it once, then emits one draw per recorded task in task
//! order. The frame orchestrator interleaves `draw_next` calls across
//! batchers to reproduce the recorded paint order.

use crate::device::{GraphicsDevice, UniformValue};
use crate::error::{GraphicError, Result};
use crate::gpu::ShaderProgram;

/// Uniform every program declares.
pub const PROJECTION_UNIFORM: &str = "projection";

pub trait Batcher {
    /// Name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Uploads the frame's accumulated vertices. Called once per frame,
    /// before the first `draw_next`.
    fn upload_to_device(&mut self, device: &mut dyn GraphicsDevice) -> Result<()>;

    /// Emits the draw for the next task.
    ///
    /// Fails with [`GraphicError::OutOfRange`] once every task was drawn.
    fn draw_next(&mut self, device: &mut dyn GraphicsDevice) -> Result<()>;

    /// Resets for the next frame. Device capacity is kept.
    fn clear(&mut self);

    /// Recorded tasks this frame.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn program_mut(&mut self) -> &mut ShaderProgram;

    fn set_projection(
        &mut self,
        device: &mut dyn GraphicsDevice,
        projection: [f32; 16],
    ) -> Result<()> {
        self.program_mut()
            .set_uniform(device, PROJECTION_UNIFORM, UniformValue::Mat4(projection))
    }

    /// Releases device resources owned by tasks that were never drawn.
    fn release_undrawn(&mut self, _device: &mut dyn GraphicsDevice) {}
}

/// Growable vertex arena reused across frames.
///
/// `clear` keeps the allocation, so steady-state frames do not allocate.
#[derive(Debug, Clone)]
pub struct ScratchBuffer<T> {
    items: Vec<T>,
}

impl<T> Default for ScratchBuffer<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: Copy> ScratchBuffer<T> {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.items.capacity()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    /// Appends `items`, returning the span they occupy.
    pub fn extend(&mut self, items: &[T]) -> TaskSpan {
        let first = self.items.len() as u32;
        self.items.extend_from_slice(items);
        TaskSpan {
            first,
            count: items.len() as u32,
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

/// Vertex range of one task.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct TaskSpan {
    pub first: u32,
    pub count: u32,
}

/// Recorded tasks plus the replay cursor.
#[derive(Debug, Clone)]
pub(crate) struct TaskQueue<T> {
    tasks: Vec<T>,
    cursor: usize,
}

impl<T> Default for TaskQueue<T> {
    fn default() -> Self {
        Self {
            tasks: Vec::new(),
            cursor: 0,
        }
    }
}

impl<T: Clone> TaskQueue<T> {
    pub fn push(&mut self, task: T) {
        self.tasks.push(task);
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Returns the task under the cursor and moves past it.
    pub fn advance(&mut self, batcher: &'static str) -> Result<T> {
        let task = self
            .tasks
            .get(self.cursor)
            .cloned()
            .ok_or(GraphicError::OutOfRange {
                batcher,
                cursor: self.cursor,
                tasks: self.tasks.len(),
            })?;
        self.cursor += 1;
        Ok(task)
    }

    /// Tasks not yet drawn.
    pub fn remaining(&self) -> &[T] {
        &self.tasks[self.cursor.min(self.tasks.len())..]
    }

    pub fn clear(&mut self) {
        self.tasks.clear();
        self.cursor = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scratch_keeps_capacity() {
        let mut scratch = ScratchBuffer::new();
        let span = scratch.extend(&[1u32, 2, 3]);
        assert_eq!(span, TaskSpan { first: 0, count: 3 });
        let span = scratch.extend(&[4u32]);
        assert_eq!(span, TaskSpan { first: 3, count: 1 });
        let cap = scratch.capacity();
        scratch.clear();
        assert!(scratch.is_empty());
        assert_eq!(scratch.capacity(), cap);
    }

    #[test]
    fn queue_cursor_is_monotonic() {
        let mut queue = TaskQueue::default();
        queue.push('a');
        queue.push('b');
        assert_eq!(queue.advance("test").unwrap(), 'a');
        assert_eq!(queue.remaining(), &['b']);
        assert_eq!(queue.advance("test").unwrap(), 'b');
        let err = queue.advance("test").unwrap_err();
        assert!(matches!(err, GraphicError::OutOfRange { batcher: "test", cursor: 2, tasks: 2 }));
        queue.clear();
        assert_eq!(queue.cursor(), 0);
        assert_eq!(queue.len(), 0);
    }
}
