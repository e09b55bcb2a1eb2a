use rustc_hash::FxHashMap;

use crate::device::{GraphicsDevice, TextureId};
use crate::error::Result;
use crate::paint::{Bitmap, ImageKey};

/// Device texture handle plus the metadata batchers need.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TextureResource {
    id: TextureId,
    width: u32,
    height: u32,
    one_shot: bool,
}

impl TextureResource {
    /// Uploads `bitmap` as a new device texture.
    ///
    /// A `one_shot` texture is destroyed by the batcher right after it is drawn.
    pub fn upload(
        device: &mut dyn GraphicsDevice,
        bitmap: &Bitmap,
        one_shot: bool,
    ) -> Result<Self> {
        let id = device.create_texture(bitmap.width(), bitmap.height(), bitmap.pixels())?;
        Ok(Self {
            id,
            width: bitmap.width(),
            height: bitmap.height(),
            one_shot,
        })
    }

    #[inline]
    pub fn id(&self) -> TextureId {
        self.id
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn is_one_shot(&self) -> bool {
        self.one_shot
    }

    pub fn bind(&self, device: &mut dyn GraphicsDevice, unit: u32) -> Result<()> {
        device.bind_texture(unit, Some(self.id))?;
        Ok(())
    }

    pub fn destroy(self, device: &mut dyn GraphicsDevice) {
        device.destroy_texture(self.id);
    }
}

#[derive(Debug)]
struct CachedTexture {
    texture: TextureResource,
    generation: u64,
    instance: u64,
}

impl CachedTexture {
    /// Unedited bitmaps under one key hold the same pixels. Once edited, only
    /// the bitmap that built the texture at that generation may reuse it.
    fn serves(&self, bitmap: &Bitmap) -> bool {
        self.generation == bitmap.generation()
            && (bitmap.generation() == 0 || self.instance == bitmap.instance())
    }
}

/// Device textures keyed by [`ImageKey`].
///
/// A bitmap whose generation moved on since its texture was built, or an
/// edited bitmap other than the one that built it, gets a fresh texture. Replaced and evicted textures may still be referenced by
/// recorded draws, so they are parked until [`TextureCache::release_retired`].
#[derive(Debug, Default)]
pub struct TextureCache {
    entries: FxHashMap<ImageKey, CachedTexture>,
    retired: Vec<TextureResource>,
}

impl TextureCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: ImageKey) -> bool {
        self.entries.contains_key(&key)
    }

    /// Textures waiting to be released.
    pub fn retired_len(&self) -> usize {
        self.retired.len()
    }

    /// Returns the texture for `bitmap`, uploading it on a miss or when stale.
    pub fn get_or_create(
        &mut self,
        device: &mut dyn GraphicsDevice,
        bitmap: &Bitmap,
    ) -> Result<TextureResource> {
        let key = bitmap.key();
        if let Some(cached) = self.entries.get(&key) {
            if cached.serves(bitmap) {
                return Ok(cached.texture);
            }
        }

        let texture = TextureResource::upload(device, bitmap, false)?;
        let previous = self.entries.insert(
            key,
            CachedTexture {
                texture,
                generation: bitmap.generation(),
                instance: bitmap.instance(),
            },
        );
        if let Some(stale) = previous {
            log::debug!("texture {key:?} rebuilt at generation {}", bitmap.generation());
            self.retired.push(stale.texture);
        }
        Ok(texture)
    }

    /// Drops the entry for `key`. The texture is released with the next
    /// [`TextureCache::release_retired`].
    pub fn evict(&mut self, key: ImageKey) -> bool {
        match self.entries.remove(&key) {
            Some(cached) => {
                self.retired.push(cached.texture);
                true
            }
            None => false,
        }
    }

    /// Evicts every entry.
    pub fn clear(&mut self) {
        self.retired
            .extend(self.entries.drain().map(|(_, cached)| cached.texture));
    }

    /// Destroys every retired texture.
    pub fn release_retired(&mut self, device: &mut dyn GraphicsDevice) {
        for texture in self.retired.drain(..) {
            texture.destroy(device);
        }
    }

    /// Destroys everything, cached and retired.
    pub fn destroy(mut self, device: &mut dyn GraphicsDevice) {
        self.clear();
        self.release_retired(device);
    }
}
