//! Frame orchestrator.
//!
//! `Graphic` records draw commands into an [`ActionLog`] and replays them at
//! `render`. Replay feeds every action to its batcher, uploads each batcher's
//! vertices once, then walks the log again calling `draw_next` on the owning
//! batcher, so paint order across primitive kinds is exactly recording order.

use crate::config::GraphicConfig;
use crate::coords::{Rect, Vec2, Viewport};
use crate::device::{GraphicsDevice, ScissorRect};
use crate::error::{GraphicError, Result};
use crate::gpu::{TextureCache, TextureResource};
use crate::paint::{Bitmap, Color, ImageKey, Pen};
use crate::render::{
    line_quad, stroke_sides, Batcher, EllipseBatcher, ImageBatcher, PolygonBatcher, TextBatcher,
};
use crate::scene::{
    Action, ActionLog, ActionRef, Ellipse, FillRect, Image, Line, StrokeRect, Text,
};
use crate::text::{layout_text, measure_text, FontDescriptor, FontMetricsProvider, GlyphRun};

/// Pen widths this close to the ellipse's smaller diameter fill it.
const FILL_TOLERANCE: f32 = 0.1;

const FULL_UV: Rect = Rect::new(0.0, 0.0, 1.0, 1.0);

/// Outcome of one [`Graphic::render`].
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Actions replayed.
    pub actions: usize,
    /// Batcher draws that succeeded.
    pub draws: usize,
    /// Batcher draws the device rejected. Replay continued past them.
    pub failed_draws: usize,
}

/// Batched 2D drawing over a [`GraphicsDevice`].
pub struct Graphic<D: GraphicsDevice> {
    device: D,
    fonts: Box<dyn FontMetricsProvider>,
    viewport: Viewport,

    polygons: PolygonBatcher,
    images: ImageBatcher,
    ellipses: EllipseBatcher,
    text: TextBatcher,

    textures: TextureCache,
    log: ActionLog,
}

impl<D: GraphicsDevice> Graphic<D> {
    /// Builds every program and sizes the surface.
    ///
    /// Fails with `FontNotFound` when `fonts` has no face, and with
    /// `Compile`/`Link` when a built-in program does not build. On failure
    /// the device is dropped.
    pub fn new(
        mut device: D,
        fonts: Box<dyn FontMetricsProvider>,
        config: GraphicConfig,
    ) -> Result<Self> {
        if fonts.is_empty() {
            return Err(GraphicError::FontNotFound("no font face loaded".to_string()));
        }

        let bytes = config.initial_buffer_bytes;
        let polygons = PolygonBatcher::new(&mut device, bytes)?;
        let images = ImageBatcher::new(&mut device, bytes)?;
        let ellipses = EllipseBatcher::new(&mut device, bytes, config.ellipse_aa_margin)?;
        let text = TextBatcher::new(&mut device, bytes)?;
        log::debug!("graphic programs built");

        let mut graphic = Self {
            device,
            fonts,
            viewport: config.surface,
            polygons,
            images,
            ellipses,
            text,
            textures: TextureCache::new(),
            log: ActionLog::new(),
        };
        let Viewport { width, height, scale } = config.surface;
        graphic.resize(width, height, scale)?;
        Ok(graphic)
    }

    #[inline]
    pub fn device(&self) -> &D {
        &self.device
    }

    #[inline]
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    #[inline]
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Actions recorded since the last `render`.
    #[inline]
    pub fn actions(&self) -> &ActionLog {
        &self.log
    }

    #[inline]
    pub fn texture_cache(&self) -> &TextureCache {
        &self.textures
    }

    /// Resizes the surface to `round(width * scale) × round(height * scale)`
    /// device pixels and re-projects every program over the logical size.
    ///
    /// Clip rectangles recorded before the resize are converted with the new
    /// surface height at replay; callers usually set a new clip afterwards.
    pub fn resize(&mut self, width: f32, height: f32, scale: f32) -> Result<()> {
        let viewport = Viewport::new(width, height, scale);
        if !(width.is_finite() && height.is_finite() && scale.is_finite()) {
            return Err(GraphicError::NonFiniteGeometry("resize"));
        }
        self.device
            .resize_surface(viewport.physical_width(), viewport.physical_height())?;
        self.viewport = viewport;

        let projection = viewport.projection();
        let Self { device, polygons, images, ellipses, text, .. } = self;
        for batcher in [
            polygons as &mut dyn Batcher,
            images as &mut dyn Batcher,
            &mut *ellipses as &mut dyn Batcher,
            text as &mut dyn Batcher,
        ] {
            batcher.set_projection(device, projection)?;
        }
        ellipses.set_scale(device, scale)?;
        log::debug!(
            "surface resized to {}x{} ({width}x{height} @ {scale})",
            viewport.physical_width(),
            viewport.physical_height()
        );
        Ok(())
    }

    // ── recording ─────────────────────────────────────────────────────────

    /// Restricts subsequent draws to `rect` (logical pixels).
    pub fn set_clip(&mut self, rect: Rect) -> Result<()> {
        ensure_finite(rect.is_finite(), "set_clip")?;
        self.log.push(Action::ClipArea(rect));
        Ok(())
    }

    pub fn fill_rectangle(&mut self, color: Color, rect: Rect) -> Result<()> {
        ensure_finite(color.is_finite() && rect.is_finite(), "fill_rectangle")?;
        self.log.push(Action::FillRectangle(FillRect { rect, color }));
        Ok(())
    }

    pub fn fill_ellipse(&mut self, color: Color, rect: Rect) -> Result<()> {
        ensure_finite(color.is_finite() && rect.is_finite(), "fill_ellipse")?;
        self.log.push(Action::FillEllipse(Ellipse { bounds: rect, color, border: 0.0 }));
        Ok(())
    }

    pub fn draw_line(&mut self, pen: Pen, from: Vec2, to: Vec2) -> Result<()> {
        ensure_finite(pen.is_finite() && from.is_finite() && to.is_finite(), "draw_line")?;
        self.log.push(Action::DrawLine(Line { from, to, pen }));
        Ok(())
    }

    /// Outlines `rect`; the pen is centred on its edges.
    pub fn draw_rectangle(&mut self, pen: Pen, rect: Rect) -> Result<()> {
        ensure_finite(pen.is_finite() && rect.is_finite(), "draw_rectangle")?;
        self.log.push(Action::DrawRectangle(StrokeRect { rect, pen }));
        Ok(())
    }

    /// Outlines the ellipse inscribed in `rect`. A pen as wide as the smaller
    /// diameter fills it instead; thinner pens draw at least one pixel.
    pub fn draw_ellipse(&mut self, pen: Pen, rect: Rect) -> Result<()> {
        ensure_finite(pen.is_finite() && rect.is_finite(), "draw_ellipse")?;
        let diameter = rect.width().min(rect.height());
        let border = if (pen.width - diameter).abs() < FILL_TOLERANCE {
            0.0
        } else {
            pen.width.max(1.0)
        };
        self.log.push(Action::DrawEllipse(Ellipse { bounds: rect, color: pen.color, border }));
        Ok(())
    }

    /// Draws `bitmap` stretched over `dst`, through the texture cache.
    pub fn draw_image(&mut self, bitmap: &Bitmap, dst: Rect) -> Result<()> {
        ensure_finite(dst.is_finite(), "draw_image")?;
        let texture = self.textures.get_or_create(&mut self.device, bitmap)?;
        self.push_image(texture, dst, FULL_UV);
        Ok(())
    }

    /// Draws the `src` region (pixels of `bitmap`) over `dst`.
    pub fn draw_image_part(&mut self, bitmap: &Bitmap, dst: Rect, src: Rect) -> Result<()> {
        ensure_finite(dst.is_finite() && src.is_finite(), "draw_image_part")?;
        let texture = self.textures.get_or_create(&mut self.device, bitmap)?;
        self.push_image(texture, dst, src.normalized_in(bitmap.size()));
        Ok(())
    }

    /// Draws `bitmap` through a texture that bypasses the cache and is
    /// destroyed right after its draw.
    pub fn draw_image_once(&mut self, bitmap: &Bitmap, dst: Rect) -> Result<()> {
        ensure_finite(dst.is_finite(), "draw_image_once")?;
        let texture = TextureResource::upload(&mut self.device, bitmap, true)?;
        self.push_image(texture, dst, FULL_UV);
        Ok(())
    }

    fn push_image(&mut self, texture: TextureResource, dst: Rect, uv: Rect) {
        self.log.push(Action::DrawImage(Image { texture, dst, uv }));
    }

    /// Lays `text` out now, with its top-left at `origin`, in the face that
    /// best matches `font`.
    pub fn draw_string(
        &mut self,
        text: &str,
        font: &FontDescriptor,
        color: Color,
        origin: Vec2,
    ) -> Result<()> {
        ensure_finite(
            color.is_finite() && origin.is_finite() && font.size.is_finite(),
            "draw_string",
        )?;
        let face = self.fonts.resolve(font)?;
        let quads = layout_text(face, font.size, text, origin);
        let atlas = self.textures.get_or_create(&mut self.device, face.atlas())?;
        self.log.push(Action::DrawString(Text {
            run: GlyphRun { quads, color },
            atlas,
        }));
        Ok(())
    }

    /// Size `draw_string` would cover for `text`.
    pub fn measure_string(&self, text: &str, font: &FontDescriptor) -> Result<Vec2> {
        ensure_finite(font.size.is_finite(), "measure_string")?;
        let face = self.fonts.resolve(font)?;
        Ok(measure_text(face, font.size, text))
    }

    // ── texture cache ─────────────────────────────────────────────────────

    /// Drops every cached texture. Textures still referenced by recorded
    /// actions are released after the next `render`.
    pub fn clear_texture_cache(&mut self) {
        self.textures.clear();
        self.release_if_idle();
    }

    /// Drops the cached texture of `key`, if any.
    pub fn evict_texture(&mut self, key: ImageKey) -> bool {
        let evicted = self.textures.evict(key);
        self.release_if_idle();
        evicted
    }

    fn release_if_idle(&mut self) {
        if self.log.is_empty() {
            self.textures.release_retired(&mut self.device);
        }
    }

    // ── replay ────────────────────────────────────────────────────────────

    /// Replays the recorded actions into one device frame.
    ///
    /// Device failures of single draws are logged and skipped. A programming
    /// error (batcher desync, missing uniform) aborts the replay; the frame
    /// is still closed and all recorded state cleared before it is returned.
    pub fn render(&mut self) -> Result<FrameStats> {
        self.feed_batchers();

        if let Err(e) = self.device.begin_frame() {
            log::error!("dropping frame of {} actions: {e}", self.log.len());
            self.finish_frame();
            return Err(e.into());
        }

        let result = self.upload_all().and_then(|()| self.replay());
        let stats = match result {
            Ok(stats) => stats,
            Err(e) => {
                log::error!("frame replay aborted: {e}");
                self.finish_frame();
                if let Err(end) = self.device.end_frame() {
                    log::warn!("end_frame after aborted replay: {end}");
                }
                return Err(e);
            }
        };

        self.finish_frame();
        self.device.end_frame()?;
        log::trace!("frame: {stats:?}");
        Ok(stats)
    }

    /// Turns recorded actions into batcher tasks.
    fn feed_batchers(&mut self) {
        for action in self.log.replay() {
            match action {
                ActionRef::FillRectangle(p) => self.polygons.add_rect(p.rect, p.color),
                ActionRef::DrawRectangle(p) => {
                    for side in stroke_sides(p.rect, p.pen.width) {
                        self.polygons.add_rect(side, p.pen.color);
                    }
                }
                ActionRef::DrawLine(p) => {
                    self.polygons
                        .add_quad(line_quad(p.from, p.to, p.pen.width), p.pen.color);
                }
                ActionRef::FillEllipse(p) | ActionRef::DrawEllipse(p) => {
                    self.ellipses.add(p.bounds, p.color, p.border);
                }
                ActionRef::DrawImage(p) => self.images.add(p.texture, p.dst, p.uv),
                ActionRef::DrawString(p) => {
                    self.text.add_run(&p.run.quads, p.run.color, p.atlas);
                }
                ActionRef::ClipArea(_) => {}
            }
        }
    }

    fn upload_all(&mut self) -> Result<()> {
        let Self { device, polygons, images, ellipses, text, .. } = self;
        for batcher in [
            polygons as &mut dyn Batcher,
            images as &mut dyn Batcher,
            ellipses as &mut dyn Batcher,
            text as &mut dyn Batcher,
        ] {
            if let Err(e) = batcher.upload_to_device(device) {
                if e.is_programming_error() {
                    return Err(e);
                }
                log::warn!("{}: upload failed: {e}", batcher.name());
            }
        }
        Ok(())
    }

    fn replay(&mut self) -> Result<FrameStats> {
        let mut stats = FrameStats::default();
        let surface_height = self.viewport.physical_height() as f32;
        let scale = self.viewport.scale;

        let Self { device, polygons, images, ellipses, text, log: actions, .. } = self;
        for action in actions.replay() {
            stats.actions += 1;
            let tag = action.tag();
            log::trace!("replay {tag:?}");

            let batcher: &mut dyn Batcher = match action {
                ActionRef::ClipArea(rect) => {
                    device.set_scissor(Some(scissor_for(*rect, surface_height, scale)));
                    continue;
                }
                ActionRef::FillRectangle(_)
                | ActionRef::DrawRectangle(_)
                | ActionRef::DrawLine(_) => &mut *polygons,
                ActionRef::FillEllipse(_) | ActionRef::DrawEllipse(_) => &mut *ellipses,
                ActionRef::DrawImage(_) => &mut *images,
                ActionRef::DrawString(_) => &mut *text,
            };

            for _ in 0..tag.draw_count() {
                match batcher.draw_next(device) {
                    Ok(()) => stats.draws += 1,
                    Err(e) if e.is_programming_error() => return Err(e),
                    Err(e) => {
                        stats.failed_draws += 1;
                        log::warn!("{}: draw for {tag:?} failed: {e}", batcher.name());
                    }
                }
            }
        }
        Ok(stats)
    }

    /// Clears per-frame state and releases one-shot textures left undrawn
    /// and textures retired during the frame.
    fn finish_frame(&mut self) {
        self.images.release_undrawn(&mut self.device);
        self.polygons.clear();
        self.images.clear();
        self.ellipses.clear();
        self.text.clear();
        self.log.clear();
        self.textures.release_retired(&mut self.device);
    }

    /// Releases every device resource and hands the device back.
    pub fn destroy(self) -> D {
        let Self {
            mut device,
            polygons,
            images,
            ellipses,
            text,
            textures,
            log: actions,
            ..
        } = self;
        for image in actions.images() {
            if image.texture.is_one_shot() {
                image.texture.destroy(&mut device);
            }
        }
        polygons.destroy(&mut device);
        images.destroy(&mut device);
        ellipses.destroy(&mut device);
        text.destroy(&mut device);
        textures.destroy(&mut device);
        device
    }
}

#[inline]
fn ensure_finite(ok: bool, op: &'static str) -> Result<()> {
    if ok { Ok(()) } else { Err(GraphicError::NonFiniteGeometry(op)) }
}

/// Logical clip rectangle to a bottom-left-origin device scissor box.
fn scissor_for(rect: Rect, surface_height: f32, scale: f32) -> ScissorRect {
    ScissorRect {
        x: (rect.x() * scale).round() as i32,
        y: (surface_height - (rect.height() + rect.y()) * scale).round() as i32,
        width: (rect.width() * scale).round().max(0.0) as i32,
        height: (rect.height() * scale).round().max(0.0) as i32,
    }
}

impl<D: GraphicsDevice> std::fmt::Debug for Graphic<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graphic")
            .field("viewport", &self.viewport)
            .field("pending_actions", &self.log.len())
            .field("cached_textures", &self.textures.len())
            .finish_non_exhaustive()
    }
}
