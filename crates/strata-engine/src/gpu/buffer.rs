use bytemuck::Pod;

use crate::device::{BufferId, BufferRole, BufferUsage, GraphicsDevice};
use crate::error::Result;

/// Device buffer with a grow-only capacity.
///
/// Growing reallocates: the old allocation is released and its contents are
/// lost, so callers re-upload everything after a grow.
#[derive(Debug)]
pub struct GpuBuffer {
    id: BufferId,
    role: BufferRole,
    usage: BufferUsage,
    capacity: usize,
}

impl GpuBuffer {
    pub fn new(
        device: &mut dyn GraphicsDevice,
        role: BufferRole,
        usage: BufferUsage,
        size: usize,
    ) -> Result<Self> {
        let id = device.create_buffer(role, usage, size)?;
        Ok(Self { id, role, usage, capacity: size })
    }

    #[inline]
    pub fn id(&self) -> BufferId {
        self.id
    }

    #[inline]
    pub fn role(&self) -> BufferRole {
        self.role
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Ensures at least `size` bytes. Returns `true` if the buffer was reallocated.
    pub fn resize(&mut self, device: &mut dyn GraphicsDevice, size: usize) -> Result<bool> {
        if size <= self.capacity {
            return Ok(false);
        }
        let id = device.create_buffer(self.role, self.usage, size)?;
        device.destroy_buffer(self.id);
        log::debug!(
            "{:?} buffer grown {} -> {} bytes",
            self.role,
            self.capacity,
            size
        );
        self.id = id;
        self.capacity = size;
        Ok(true)
    }

    /// Writes `data` at `byte_offset`, growing first when it does not fit.
    ///
    /// Growth target is `max(required, 2 × capacity)`. Returns `true` if the
    /// buffer was reallocated.
    pub fn upload<T: Pod>(
        &mut self,
        device: &mut dyn GraphicsDevice,
        data: &[T],
        byte_offset: usize,
    ) -> Result<bool> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let required = byte_offset + bytes.len();
        let grew = if required > self.capacity {
            self.resize(device, required.max(self.capacity * 2))?
        } else {
            false
        };
        device.write_buffer(self.id, byte_offset, bytes)?;
        Ok(grew)
    }

    pub fn bind(&self, device: &mut dyn GraphicsDevice) -> Result<()> {
        device.bind_buffer(self.role, Some(self.id))?;
        Ok(())
    }

    pub fn unbind(&self, device: &mut dyn GraphicsDevice) -> Result<()> {
        device.bind_buffer(self.role, None)?;
        Ok(())
    }

    pub fn destroy(self, device: &mut dyn GraphicsDevice) {
        device.destroy_buffer(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceCall, RecordingDevice};

    fn buffer(dev: &mut RecordingDevice, size: usize) -> GpuBuffer {
        GpuBuffer::new(dev, BufferRole::Position, BufferUsage::Dynamic, size).unwrap()
    }

    // ── resize ───────────────────────────────────────────────────────────

    #[test]
    fn resize_within_capacity_is_a_noop() {
        let mut dev = RecordingDevice::new();
        let mut buf = buffer(&mut dev, 64);
        let id = buf.id();
        assert!(!buf.resize(&mut dev, 64).unwrap());
        assert_eq!(buf.id(), id);
        assert_eq!(dev.live_buffers(), 1);
    }

    #[test]
    fn resize_never_shrinks() {
        let mut dev = RecordingDevice::new();
        let mut buf = buffer(&mut dev, 16);
        assert!(buf.resize(&mut dev, 128).unwrap());
        let id = buf.id();
        dev.clear_calls();

        assert!(!buf.resize(&mut dev, 32).unwrap());
        assert_eq!(buf.capacity(), 128);
        assert_eq!(buf.id(), id);
        assert_eq!(dev.buffer_size(id), Some(128));
        assert_eq!(dev.count_calls(|c| matches!(c, DeviceCall::CreateBuffer { .. })), 0);
    }

    #[test]
    fn resize_reallocates_exactly() {
        let mut dev = RecordingDevice::new();
        let mut buf = buffer(&mut dev, 64);
        let old = buf.id();
        assert!(buf.resize(&mut dev, 100).unwrap());
        assert_ne!(buf.id(), old);
        assert_eq!(buf.capacity(), 100);
        assert_eq!(dev.buffer_size(buf.id()), Some(100));
        assert_eq!(dev.live_buffers(), 1);
    }

    // ── upload ───────────────────────────────────────────────────────────

    #[test]
    fn upload_grows_to_double_capacity() {
        let mut dev = RecordingDevice::new();
        let mut buf = buffer(&mut dev, 16);
        assert!(buf.upload(&mut dev, &[0.0f32; 5], 0).unwrap());
        assert_eq!(buf.capacity(), 32);
        assert!(buf.upload(&mut dev, &[0.0f32; 20], 0).unwrap());
        assert_eq!(buf.capacity(), 80);
    }

    #[test]
    fn upload_in_place_writes_once() {
        let mut dev = RecordingDevice::new();
        let mut buf = buffer(&mut dev, 64);
        dev.clear_calls();
        assert!(!buf.upload(&mut dev, &[1.0f32, 2.0], 8).unwrap());
        assert_eq!(
            dev.calls(),
            &[DeviceCall::WriteBuffer { id: buf.id(), offset: 8, len: 8 }]
        );
    }

    #[test]
    fn write_failure_surfaces_as_device_error() {
        let mut dev = RecordingDevice::new();
        let mut buf = buffer(&mut dev, 64);
        dev.set_fail_writes(true);
        let err = buf.upload(&mut dev, &[0u32; 2], 0).unwrap_err();
        assert!(matches!(err, crate::error::GraphicError::Device(_)));
    }
}
