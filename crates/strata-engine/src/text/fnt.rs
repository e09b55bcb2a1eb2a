//! Glyph-metrics text format.
//!
//! ```text
//! textures: atlas.png
//! Sans Serif 12pt bold
//! 65	0	0	7	9	0	2	8	14
//! kerning pairs:
//! 65	86	-1
//! Sans Serif 12pt
//! ...
//! ```
//!
//! Glyph rows are `code x y w h xoffset yoffset advance line_height`, with
//! the atlas rectangle in pixels. Kerning rows are `left right delta`. All
//! numbers use `.` as decimal separator regardless of locale.

use std::sync::Arc;

use crate::coords::{Rect, Vec2};
use crate::error::{GraphicError, Result};
use crate::paint::Bitmap;

use super::{FontDescriptor, FontFace, GlyphMetrics};

const ATLAS_PREFIX: &str = "textures:";
const KERNING_HEADER: &str = "kerning pairs:";

#[derive(Debug, Clone, PartialEq)]
pub struct FntGlyph {
    pub code: char,
    /// Atlas rectangle in pixels.
    pub atlas_rect: Rect,
    pub offset: Vec2,
    pub advance: f32,
    pub line_height: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FntFace {
    pub descriptor: FontDescriptor,
    pub glyphs: Vec<FntGlyph>,
    pub kerning: Vec<(char, char, f32)>,
}

/// A parsed file, before its atlas is loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct FntFile {
    pub atlas: String,
    pub faces: Vec<FntFace>,
}

impl FntFile {
    pub fn parse(source: &str) -> Result<Self> {
        let mut lines = source.lines().enumerate().map(|(i, l)| (i + 1, l.trim_end_matches('\r')));

        let (_, first) = lines.next().ok_or_else(|| parse_err(1, "empty file"))?;
        let atlas = first
            .strip_prefix(ATLAS_PREFIX)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| parse_err(1, "expected `textures: <file>`"))?
            .to_string();

        let mut faces = Vec::new();
        let mut header = lines.next();

        while let Some((header_no, header_line)) = header.take() {
            if header_line.trim().is_empty() {
                break;
            }
            let mut face = FntFace {
                descriptor: parse_header(header_no, header_line)?,
                glyphs: Vec::new(),
                kerning: Vec::new(),
            };

            let mut in_kerning = false;
            for (no, line) in lines.by_ref() {
                if line.trim().is_empty() {
                    break;
                }
                if line.trim() == KERNING_HEADER {
                    in_kerning = true;
                    continue;
                }
                if in_kerning {
                    let fields: Vec<&str> = line.split_whitespace().collect();
                    // A row that does not start with a code is the next face.
                    if fields.first().and_then(|f| f.parse::<u32>().ok()).is_none() {
                        header = Some((no, line));
                        break;
                    }
                    face.kerning.push(parse_kerning(no, &fields)?);
                } else {
                    face.glyphs.push(parse_glyph(no, line)?);
                }
            }
            faces.push(face);
        }

        if faces.is_empty() {
            return Err(parse_err(2, "no font face"));
        }
        Ok(Self { atlas, faces })
    }

    /// Builds faces that share `atlas`, normalizing glyph rectangles by its size.
    pub fn into_faces(self, atlas: Bitmap) -> Vec<FontFace> {
        let extent = atlas.size();
        let atlas = Arc::new(atlas);
        self.faces
            .into_iter()
            .map(|parsed| {
                let line_height = parsed
                    .glyphs
                    .last()
                    .map_or(parsed.descriptor.size, |g| g.line_height);
                let mut face = FontFace::new(parsed.descriptor, line_height, Arc::clone(&atlas));
                for g in parsed.glyphs {
                    face.insert_glyph(
                        g.code,
                        GlyphMetrics {
                            uv: g.atlas_rect.normalized_in(extent),
                            size: g.atlas_rect.size,
                            offset: g.offset,
                            advance: g.advance,
                        },
                    );
                }
                for (left, right, delta) in parsed.kerning {
                    face.insert_kerning(left, right, delta);
                }
                face
            })
            .collect()
    }
}

fn parse_err(line: usize, message: impl Into<String>) -> GraphicError {
    GraphicError::FontParse {
        line,
        message: message.into(),
    }
}

/// `<family words...> <N>pt [bold] [italic]`
fn parse_header(no: usize, line: &str) -> Result<FontDescriptor> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let pt_at = words
        .iter()
        .rposition(|w| w.ends_with("pt"))
        .ok_or_else(|| parse_err(no, "face header has no `<N>pt` size"))?;

    let size_text = &words[pt_at][..words[pt_at].len() - 2];
    let size = parse_number(no, size_text)?;
    if size <= 0.0 {
        return Err(parse_err(no, format!("font size must be positive, got {size}")));
    }

    let mut descriptor = FontDescriptor::new(words[..pt_at].join(" "), size);
    for flag in &words[pt_at + 1..] {
        match *flag {
            "bold" => descriptor.bold = true,
            "italic" => descriptor.italic = true,
            other => return Err(parse_err(no, format!("unknown face flag `{other}`"))),
        }
    }
    if descriptor.family.is_empty() {
        return Err(parse_err(no, "face header has no family name"));
    }
    Ok(descriptor)
}

fn parse_glyph(no: usize, line: &str) -> Result<FntGlyph> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() != 9 {
        return Err(parse_err(no, format!("glyph row needs 9 fields, got {}", fields.len())));
    }
    let code = parse_char(no, fields[0])?;
    let mut n = [0.0f32; 8];
    for (slot, field) in n.iter_mut().zip(&fields[1..]) {
        *slot = parse_number(no, field)?;
    }
    Ok(FntGlyph {
        code,
        atlas_rect: Rect::new(n[0], n[1], n[2], n[3]),
        offset: Vec2::new(n[4], n[5]),
        advance: n[6],
        line_height: n[7],
    })
}

fn parse_kerning(no: usize, fields: &[&str]) -> Result<(char, char, f32)> {
    if fields.len() != 3 {
        return Err(parse_err(no, format!("kerning row needs 3 fields, got {}", fields.len())));
    }
    Ok((
        parse_char(no, fields[0])?,
        parse_char(no, fields[1])?,
        parse_number(no, fields[2])?,
    ))
}

fn parse_char(no: usize, field: &str) -> Result<char> {
    field
        .parse::<u32>()
        .ok()
        .and_then(char::from_u32)
        .ok_or_else(|| parse_err(no, format!("`{field}` is not a character code")))
}

fn parse_number(no: usize, field: &str) -> Result<f32> {
    match field.parse::<f32>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(parse_err(no, format!("`{field}` is not a number"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_FACES: &str = "textures: atlas.png\n\
Sans Serif 12pt\n\
65\t0\t0\t8\t10\t0\t2\t9\t14\n\
86\t8\t0\t8\t10\t0\t2\t9.5\t14\n\
kerning pairs:\n\
65\t86\t-1.5\n\
Sans Serif 12pt bold italic\n\
65\t16\t0\t9\t10\t0\t2\t10\t15\n\
\n";

    #[test]
    fn parses_faces_and_kerning() {
        let file = FntFile::parse(TWO_FACES).unwrap();
        assert_eq!(file.atlas, "atlas.png");
        assert_eq!(file.faces.len(), 2);

        let regular = &file.faces[0];
        assert_eq!(regular.descriptor, FontDescriptor::new("Sans Serif", 12.0));
        assert_eq!(regular.glyphs.len(), 2);
        assert_eq!(regular.glyphs[1].advance, 9.5);
        assert_eq!(regular.kerning, vec![('A', 'V', -1.5)]);

        let bold = &file.faces[1];
        assert!(bold.descriptor.bold && bold.descriptor.italic);
        assert!(bold.kerning.is_empty());
    }

    #[test]
    fn faces_share_the_atlas_and_normalize_uv() {
        let file = FntFile::parse(TWO_FACES).unwrap();
        let faces = file.into_faces(Bitmap::solid(32, 16, [255; 4]));
        assert!(Arc::ptr_eq(faces[0].shared_atlas(), faces[1].shared_atlas()));

        let v = faces[0].glyph('V').unwrap();
        assert_eq!(v.uv, Rect::new(0.25, 0.0, 0.25, 0.625));
        assert_eq!(v.size, Vec2::new(8.0, 10.0));
        assert_eq!(faces[0].line_height(), 14.0);
        assert_eq!(faces[1].line_height(), 15.0);
        assert_eq!(faces[0].kerning('A', 'V'), -1.5);
    }

    // ── rejects ──────────────────────────────────────────────────────────

    #[test]
    fn comma_decimals_are_rejected() {
        let src = "textures: a.png\nMono 10pt\n65\t0\t0\t8\t10\t0\t2\t9,5\t14\n";
        let err = FntFile::parse(src).unwrap_err();
        assert!(matches!(err, GraphicError::FontParse { line: 3, .. }));
    }

    #[test]
    fn missing_atlas_line_is_rejected() {
        let err = FntFile::parse("Mono 10pt\n").unwrap_err();
        assert!(matches!(err, GraphicError::FontParse { line: 1, .. }));
    }

    #[test]
    fn header_without_size_is_rejected() {
        let err = FntFile::parse("textures: a.png\nMono bold\n").unwrap_err();
        assert!(matches!(err, GraphicError::FontParse { line: 2, .. }));
    }
}
