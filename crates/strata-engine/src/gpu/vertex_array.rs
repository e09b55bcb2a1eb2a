use std::collections::BTreeMap;

use bytemuck::Pod;

use super::GpuBuffer;
use crate::device::{BufferRole, BufferUsage, GraphicsDevice, VertexArrayId};
use crate::error::{GraphicError, Result};

/// A device vertex array plus the buffers it reads from, keyed by role.
///
/// Buffers are created on first upload (or reserve) and owned by the
/// binding; `destroy` releases all of them.
#[derive(Debug)]
pub struct VertexArrayBinding {
    id: VertexArrayId,
    buffers: BTreeMap<BufferRole, GpuBuffer>,
    usage: BufferUsage,
    initial_bytes: usize,
    bound: bool,
}

impl VertexArrayBinding {
    pub fn new(
        device: &mut dyn GraphicsDevice,
        usage: BufferUsage,
        initial_bytes: usize,
    ) -> Result<Self> {
        let id = device.create_vertex_array()?;
        Ok(Self {
            id,
            buffers: BTreeMap::new(),
            usage,
            initial_bytes,
            bound: false,
        })
    }

    #[inline]
    pub fn id(&self) -> VertexArrayId {
        self.id
    }

    #[inline]
    pub fn is_bound(&self) -> bool {
        self.bound
    }

    pub fn buffer(&self, role: BufferRole) -> Option<&GpuBuffer> {
        self.buffers.get(&role)
    }

    pub fn bind(&mut self, device: &mut dyn GraphicsDevice) -> Result<()> {
        debug_assert!(!self.bound, "vertex array bound twice without unbind");
        device.bind_vertex_array(Some(self.id))?;
        self.bound = true;
        Ok(())
    }

    pub fn unbind(&mut self, device: &mut dyn GraphicsDevice) -> Result<()> {
        self.bound = false;
        device.bind_vertex_array(None)?;
        Ok(())
    }

    /// Binds the buffer registered under `role`.
    pub fn bind_buffer(&self, device: &mut dyn GraphicsDevice, role: BufferRole) -> Result<()> {
        self.buffers
            .get(&role)
            .ok_or_else(|| GraphicError::Config(format!("vertex array has no {role:?} buffer")))?
            .bind(device)
    }

    pub fn unbind_buffer(&self, device: &mut dyn GraphicsDevice, role: BufferRole) -> Result<()> {
        self.buffers
            .get(&role)
            .ok_or_else(|| GraphicError::Config(format!("vertex array has no {role:?} buffer")))?
            .unbind(device)
    }

    /// Ensures the `role` buffer exists with at least `bytes` capacity.
    pub fn reserve(
        &mut self,
        device: &mut dyn GraphicsDevice,
        role: BufferRole,
        bytes: usize,
    ) -> Result<bool> {
        match self.buffers.get_mut(&role) {
            Some(buffer) => buffer.resize(device, bytes),
            None => {
                let size = bytes.max(self.initial_bytes);
                let buffer = GpuBuffer::new(device, role, self.usage, size)?;
                self.buffers.insert(role, buffer);
                Ok(true)
            }
        }
    }

    /// Replaces the contents of the `role` buffer with `data`.
    ///
    /// A missing buffer is created to fit; an existing one grows the way
    /// [`GpuBuffer::upload`] does. Returns `true` when the buffer was created
    /// or reallocated, in which case attribute pointers into it must be set
    /// again.
    pub fn upload<T: Pod>(
        &mut self,
        device: &mut dyn GraphicsDevice,
        role: BufferRole,
        data: &[T],
    ) -> Result<bool> {
        let created = !self.buffers.contains_key(&role)
            && self.reserve(device, role, std::mem::size_of_val(data))?;
        let grew = match self.buffers.get_mut(&role) {
            Some(buffer) => buffer.upload(device, data, 0)?,
            None => false,
        };
        Ok(created || grew)
    }

    pub fn destroy(self, device: &mut dyn GraphicsDevice) {
        for (_, buffer) in self.buffers {
            buffer.destroy(device);
        }
        device.destroy_vertex_array(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::RecordingDevice;

    #[test]
    fn buffers_are_created_lazily() {
        let mut dev = RecordingDevice::new();
        let mut vao = VertexArrayBinding::new(&mut dev, BufferUsage::Dynamic, 256).unwrap();
        assert_eq!(dev.live_buffers(), 0);

        let err = vao.bind_buffer(&mut dev, BufferRole::Color).unwrap_err();
        assert!(matches!(err, GraphicError::Config(_)));
        assert_eq!(dev.live_buffers(), 0);

        assert!(vao.upload(&mut dev, BufferRole::Color, &[1.0f32; 4]).unwrap());
        assert_eq!(vao.buffer(BufferRole::Color).map(|b| b.capacity()), Some(256));
        assert!(!vao.upload(&mut dev, BufferRole::Color, &[1.0f32; 4]).unwrap());
        vao.bind_buffer(&mut dev, BufferRole::Color).unwrap();
    }

    #[test]
    fn upload_growth_is_amortized() {
        let mut dev = RecordingDevice::new();
        let mut vao = VertexArrayBinding::new(&mut dev, BufferUsage::Dynamic, 0).unwrap();
        let capacity =
            |vao: &VertexArrayBinding| vao.buffer(BufferRole::Position).map(|b| b.capacity());

        assert!(vao.upload(&mut dev, BufferRole::Position, &[0u8; 400]).unwrap());
        assert_eq!(capacity(&vao), Some(400));
        assert!(vao.upload(&mut dev, BufferRole::Position, &[0u8; 404]).unwrap());
        assert_eq!(capacity(&vao), Some(800));
        assert!(!vao.upload(&mut dev, BufferRole::Position, &[0u8; 408]).unwrap());
        assert_eq!(capacity(&vao), Some(800));
        assert_eq!(dev.live_buffers(), 1);
    }

    #[test]
    fn destroy_releases_every_buffer() {
        let mut dev = RecordingDevice::new();
        let mut vao = VertexArrayBinding::new(&mut dev, BufferUsage::Stream, 16).unwrap();
        vao.reserve(&mut dev, BufferRole::Position, 32).unwrap();
        vao.reserve(&mut dev, BufferRole::TexCoord, 32).unwrap();
        assert_eq!(dev.live_buffers(), 2);
        vao.destroy(&mut dev);
        assert_eq!(dev.live_buffers(), 0);
    }

    #[test]
    fn bind_tracks_state() {
        let mut dev = RecordingDevice::new();
        let mut vao = VertexArrayBinding::new(&mut dev, BufferUsage::Stream, 16).unwrap();
        vao.bind(&mut dev).unwrap();
        assert!(vao.is_bound());
        vao.unbind(&mut dev).unwrap();
        assert!(!vao.is_bound());
    }
}
