use std::fs;
use std::path::Path;

use crate::error::{GraphicError, Result};
use crate::paint::Bitmap;

use super::fnt::FntFile;
use super::{FontDescriptor, FontFace, FontMetricsProvider};

/// Loaded faces, matched against requests by [`FontFace::score`].
#[derive(Debug, Default)]
pub struct FontLibrary {
    faces: Vec<FontFace>,
}

impl FontLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_faces(faces: Vec<FontFace>) -> Self {
        Self { faces }
    }

    pub fn push(&mut self, face: FontFace) {
        self.faces.push(face);
    }

    pub fn faces(&self) -> &[FontFace] {
        &self.faces
    }

    pub fn len(&self) -> usize {
        self.faces.len()
    }

    /// Loads every `*.fnt` file in `dir`, in file-name order.
    ///
    /// A file that fails to parse, or whose atlas fails to load, is logged and
    /// skipped. Fails with `FontNotFound` when nothing loads.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut paths: Vec<_> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "fnt"))
            .collect();
        paths.sort();

        let mut library = Self::new();
        for path in &paths {
            match library.load_file(path) {
                Ok(n) => log::debug!("loaded {n} font face(s) from {}", path.display()),
                Err(e) => log::error!("skipping font file {}: {e}", path.display()),
            }
        }

        if library.faces.is_empty() {
            return Err(GraphicError::FontNotFound(format!(
                "no valid font files in {}",
                dir.display()
            )));
        }
        Ok(library)
    }

    /// Loads one `.fnt` file; its atlas path is relative to the file.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let file = FntFile::parse(&fs::read_to_string(path)?)?;
        let atlas_path = path
            .parent()
            .map_or_else(|| file.atlas.clone().into(), |p| p.join(&file.atlas));
        let atlas = Bitmap::open(&atlas_path)?;
        let faces = file.into_faces(atlas);
        let n = faces.len();
        self.faces.extend(faces);
        Ok(n)
    }
}

impl FontMetricsProvider for FontLibrary {
    fn resolve(&self, request: &FontDescriptor) -> Result<&FontFace> {
        let mut best: Option<(&FontFace, u8)> = None;
        for face in &self.faces {
            let score = face.score(request);
            if score == 4 {
                return Ok(face);
            }
            if best.is_none_or(|(_, s)| score > s) {
                best = Some((face, score));
            }
        }
        best.map(|(face, _)| face)
            .ok_or_else(|| GraphicError::FontNotFound(request.family.clone()))
    }

    fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }
}
