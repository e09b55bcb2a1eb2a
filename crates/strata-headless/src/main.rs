//! Renders a few frames offscreen through wgpu and optionally saves the last
//! one as PNG.
//!
//! Usage: `strata-headless [out.png]`

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use strata_engine::coords::{Rect, Vec2};
use strata_engine::device::{WgpuDevice, WgpuInit};
use strata_engine::logging::{init_logging, LoggingConfig};
use strata_engine::paint::{Bitmap, Color, Pen};
use strata_engine::text::{FontDescriptor, FontFace, FontLibrary, GlyphMetrics};
use strata_engine::{Graphic, GraphicConfig};

const FRAMES: usize = 3;

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());
    let out: Option<PathBuf> = std::env::args_os().nth(1).map(PathBuf::from);

    let device = WgpuDevice::new_headless_blocking(WgpuInit::default())
        .context("no usable GPU adapter")?;
    let config = GraphicConfig::default().with_surface(320.0, 200.0, 1.0);
    let mut graphic = Graphic::new(device, Box::new(block_font()), config)
        .context("building the drawing surface")?;

    let checker = checkerboard(8)?;
    let font = FontDescriptor::new("Block", 12.0);

    for frame in 0..FRAMES {
        let t = frame as f32 * 10.0;
        graphic.fill_rectangle(Color::rgb(30, 30, 40), Rect::new(0.0, 0.0, 320.0, 200.0))?;
        graphic.fill_rectangle(Color::rgb(200, 60, 60), Rect::new(20.0 + t, 20.0, 80.0, 50.0))?;
        graphic.draw_rectangle(Pen::new(Color::WHITE, 2.0), Rect::new(20.0, 20.0, 120.0, 60.0))?;
        graphic.fill_ellipse(Color::rgb(60, 160, 220), Rect::new(160.0, 20.0, 100.0, 60.0))?;
        graphic.draw_ellipse(Pen::new(Color::WHITE, 3.0), Rect::new(160.0, 20.0, 100.0, 60.0))?;
        graphic.draw_line(
            Pen::new(Color::rgb(240, 200, 80), 3.0),
            Vec2::new(20.0, 100.0),
            Vec2::new(300.0, 140.0),
        )?;
        graphic.set_clip(Rect::new(0.0, 110.0, 160.0, 90.0))?;
        graphic.draw_image(&checker, Rect::new(100.0, 120.0, 64.0, 64.0))?;
        graphic.draw_string("STRATA\nFRAME", &font, Color::WHITE, Vec2::new(20.0, 150.0))?;

        let stats = graphic.render()?;
        log::info!("frame {frame}: {stats:?}");
    }

    if let Some(path) = out {
        let (w, h, pixels) = graphic.device().read_target_rgba()?;
        let img = image::RgbaImage::from_raw(w, h, pixels)
            .context("readback size does not match the target")?;
        img.save(&path)
            .with_context(|| format!("writing {}", path.display()))?;
        log::info!("wrote {}", path.display());
    }

    graphic.destroy();
    Ok(())
}

/// A face whose every printable ASCII glyph is a solid block.
fn block_font() -> FontLibrary {
    let atlas = Arc::new(Bitmap::solid(8, 8, [255, 255, 255, 255]));
    let mut face = FontFace::new(FontDescriptor::new("Block", 12.0), 14.0, atlas);
    let block = GlyphMetrics {
        uv: Rect::new(0.0, 0.0, 1.0, 1.0),
        size: Vec2::new(7.0, 10.0),
        offset: Vec2::new(0.0, 2.0),
        advance: 9.0,
    };
    for c in '!'..='~' {
        face.insert_glyph(c, block);
    }
    face.insert_glyph(' ', GlyphMetrics { size: Vec2::zero(), ..block });
    FontLibrary::from_faces(vec![face])
}

fn checkerboard(cells: u32) -> Result<Bitmap> {
    let size = cells * 4;
    let mut pixels = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let on = ((x / 4) + (y / 4)) % 2 == 0;
            pixels.extend_from_slice(if on { &[240, 240, 240, 255] } else { &[40, 40, 40, 255] });
        }
    }
    Ok(Bitmap::from_rgba8(size, size, pixels)?)
}
