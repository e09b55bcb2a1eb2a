use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use rustc_hash::FxHasher;

use crate::coords::Vec2;
use crate::error::{GraphicError, Result};

/// Texture-cache identity of a [`Bitmap`].
///
/// Either derived from the pixel content when the bitmap is built, or issued
/// by the caller ([`ImageKey::new`]) when it already has a stable resource id.
/// The key never changes when pixels are edited; edits bump
/// [`Bitmap::generation`] instead. Two bitmaps that started from the same
/// content share a key, so an edited bitmap is told apart from its twins by
/// [`Bitmap::instance`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ImageKey(u64);

impl ImageKey {
    #[inline]
    pub const fn new(token: u64) -> Self {
        Self(token)
    }

    /// Content hash over dimensions and RGBA bytes.
    pub fn from_content(width: u32, height: u32, rgba: &[u8]) -> Self {
        let mut hasher = FxHasher::default();
        width.hash(&mut hasher);
        height.hash(&mut hasher);
        rgba.hash(&mut hasher);
        Self(hasher.finish())
    }

    #[inline]
    pub const fn value(self) -> u64 {
        self.0
    }
}

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

fn next_instance() -> u64 {
    NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed)
}

/// CPU-side RGBA8 image (straight alpha, row-major, top row first).
#[derive(Debug)]
pub struct Bitmap {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    key: ImageKey,
    generation: u64,
    instance: u64,
}

// A clone is edited independently of its source, so it needs its own instance.
impl Clone for Bitmap {
    fn clone(&self) -> Self {
        Self {
            width: self.width,
            height: self.height,
            pixels: self.pixels.clone(),
            key: self.key,
            generation: self.generation,
            instance: next_instance(),
        }
    }
}

impl PartialEq for Bitmap {
    fn eq(&self, other: &Self) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.key == other.key
            && self.generation == other.generation
            && self.pixels == other.pixels
    }
}

impl Bitmap {
    /// Wraps raw RGBA8 pixels, keyed by their content hash.
    pub fn from_rgba8(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let key = ImageKey::from_content(width, height, &pixels);
        Self::with_key(key, width, height, pixels)
    }

    /// Wraps raw RGBA8 pixels under a caller-issued key.
    pub fn with_key(key: ImageKey, width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(GraphicError::Image(format!(
                "{width}x{height} RGBA8 bitmap needs {expected} bytes, got {}",
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
            key,
            generation: 0,
            instance: next_instance(),
        })
    }

    /// A single-color bitmap.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels = rgba.repeat(width as usize * height as usize);
        let key = ImageKey::from_content(width, height, &pixels);
        Self {
            width,
            height,
            pixels,
            key,
            generation: 0,
            instance: next_instance(),
        }
    }

    /// Decodes an encoded image (PNG, BMP) from memory.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let img = image::load_from_memory(bytes)?.to_rgba8();
        let (w, h) = img.dimensions();
        Self::from_rgba8(w, h, img.into_raw())
    }

    /// Loads and decodes an image file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let img = image::open(path.as_ref())?.to_rgba8();
        let (w, h) = img.dimensions();
        Self::from_rgba8(w, h, img.into_raw())
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
    pub fn size(&self) -> Vec2 {
        Vec2::new(self.width as f32, self.height as f32)
    }

    #[inline]
    pub fn key(&self) -> ImageKey {
        self.key
    }

    /// Edit counter. Cached textures built from an older generation are stale.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Process-unique id of this value. Clones get a fresh one.
    #[inline]
    pub fn instance(&self) -> u64 {
        self.instance
    }

    #[inline]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Mutable pixel access. Marks the bitmap dirty.
    pub fn pixels_mut(&mut self) -> &mut [u8] {
        self.mark_dirty();
        &mut self.pixels
    }

    /// Forces cached device copies to be rebuilt on next use.
    #[inline]
    pub fn mark_dirty(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }
}
