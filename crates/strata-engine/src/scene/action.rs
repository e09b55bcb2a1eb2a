use crate::coords::{Rect, Vec2};
use crate::gpu::TextureResource;
use crate::paint::{Color, Pen};
use crate::text::GlyphRun;

/// Kind tag of a recorded action.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum DrawAction {
    FillRectangle,
    FillEllipse,
    DrawRectangle,
    DrawEllipse,
    DrawImage,
    DrawLine,
    DrawString,
    ClipArea,
}

impl DrawAction {
    pub const COUNT: usize = 8;

    #[inline]
    pub(crate) fn index(self) -> usize {
        self as usize
    }

    /// Batcher draws this action replays to. A stroked rectangle is four
    /// filled sides; a clip change draws nothing.
    #[inline]
    pub fn draw_count(self) -> usize {
        match self {
            DrawAction::DrawRectangle => 4,
            DrawAction::ClipArea => 0,
            _ => 1,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FillRect {
    pub rect: Rect,
    pub color: Color,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct StrokeRect {
    pub rect: Rect,
    pub pen: Pen,
}

/// Fill or ring. `border == 0` fills.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ellipse {
    pub bounds: Rect,
    pub color: Color,
    pub border: f32,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Line {
    pub from: Vec2,
    pub to: Vec2,
    pub pen: Pen,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Image {
    pub texture: TextureResource,
    pub dst: Rect,
    /// Normalized source rectangle.
    pub uv: Rect,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Text {
    pub run: GlyphRun,
    pub atlas: TextureResource,
}

/// An action with its parameters, as recorded.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    FillRectangle(FillRect),
    FillEllipse(Ellipse),
    DrawRectangle(StrokeRect),
    DrawEllipse(Ellipse),
    DrawImage(Image),
    DrawLine(Line),
    DrawString(Text),
    /// Clip rectangle in logical pixels.
    ClipArea(Rect),
}

/// Borrowed view of a recorded action, as replayed.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum ActionRef<'a> {
    FillRectangle(&'a FillRect),
    FillEllipse(&'a Ellipse),
    DrawRectangle(&'a StrokeRect),
    DrawEllipse(&'a Ellipse),
    DrawImage(&'a Image),
    DrawLine(&'a Line),
    DrawString(&'a Text),
    ClipArea(&'a Rect),
}

impl Action {
    pub fn tag(&self) -> DrawAction {
        match self {
            Action::FillRectangle(_) => DrawAction::FillRectangle,
            Action::FillEllipse(_) => DrawAction::FillEllipse,
            Action::DrawRectangle(_) => DrawAction::DrawRectangle,
            Action::DrawEllipse(_) => DrawAction::DrawEllipse,
            Action::DrawImage(_) => DrawAction::DrawImage,
            Action::DrawLine(_) => DrawAction::DrawLine,
            Action::DrawString(_) => DrawAction::DrawString,
            Action::ClipArea(_) => DrawAction::ClipArea,
        }
    }
}

impl ActionRef<'_> {
    pub fn tag(&self) -> DrawAction {
        match self {
            ActionRef::FillRectangle(_) => DrawAction::FillRectangle,
            ActionRef::FillEllipse(_) => DrawAction::FillEllipse,
            ActionRef::DrawRectangle(_) => DrawAction::DrawRectangle,
            ActionRef::DrawEllipse(_) => DrawAction::DrawEllipse,
            ActionRef::DrawImage(_) => DrawAction::DrawImage,
            ActionRef::DrawLine(_) => DrawAction::DrawLine,
            ActionRef::DrawString(_) => DrawAction::DrawString,
            ActionRef::ClipArea(_) => DrawAction::ClipArea,
        }
    }
}
