use super::action::{
    Action, ActionRef, DrawAction, Ellipse, FillRect, Image, Line, StrokeRect, Text,
};
use crate::coords::Rect;

/// Recorded actions for a frame.
///
/// One ordered tag sequence plus one FIFO parameter list per tag: the Nth
/// occurrence of tag K pairs with the Nth record of K's list. Replay walks
/// the tags and advances a per-kind cursor.
///
/// Performance characteristics:
/// - `push()` is O(1)
/// - `clear()` keeps every list's capacity, so steady-state frames do not allocate
#[derive(Debug, Default)]
pub struct ActionLog {
    tags: Vec<DrawAction>,
    fill_rects: Vec<FillRect>,
    fill_ellipses: Vec<Ellipse>,
    stroke_rects: Vec<StrokeRect>,
    stroke_ellipses: Vec<Ellipse>,
    images: Vec<Image>,
    lines: Vec<Line>,
    strings: Vec<Text>,
    clips: Vec<Rect>,
}

impl ActionLog {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, action: Action) {
        self.tags.push(action.tag());
        match action {
            Action::FillRectangle(p) => self.fill_rects.push(p),
            Action::FillEllipse(p) => self.fill_ellipses.push(p),
            Action::DrawRectangle(p) => self.stroke_rects.push(p),
            Action::DrawEllipse(p) => self.stroke_ellipses.push(p),
            Action::DrawImage(p) => self.images.push(p),
            Action::DrawLine(p) => self.lines.push(p),
            Action::DrawString(p) => self.strings.push(p),
            Action::ClipArea(p) => self.clips.push(p),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Tags in recording order.
    #[inline]
    pub fn tags(&self) -> &[DrawAction] {
        &self.tags
    }

    /// Recorded actions of one kind.
    pub fn count(&self, tag: DrawAction) -> usize {
        match tag {
            DrawAction::FillRectangle => self.fill_rects.len(),
            DrawAction::FillEllipse => self.fill_ellipses.len(),
            DrawAction::DrawRectangle => self.stroke_rects.len(),
            DrawAction::DrawEllipse => self.stroke_ellipses.len(),
            DrawAction::DrawImage => self.images.len(),
            DrawAction::DrawLine => self.lines.len(),
            DrawAction::DrawString => self.strings.len(),
            DrawAction::ClipArea => self.clips.len(),
        }
    }

    /// Image records in recording order.
    pub fn images(&self) -> &[Image] {
        &self.images
    }

    /// Pairs every tag with its parameter record, in recording order.
    pub fn replay(&self) -> Replay<'_> {
        Replay {
            log: self,
            next: 0,
            cursors: [0; DrawAction::COUNT],
        }
    }

    /// Empties the log. Allocated capacity is kept.
    pub fn clear(&mut self) {
        self.tags.clear();
        self.fill_rects.clear();
        self.fill_ellipses.clear();
        self.stroke_rects.clear();
        self.stroke_ellipses.clear();
        self.images.clear();
        self.lines.clear();
        self.strings.clear();
        self.clips.clear();
    }

    fn record(&self, tag: DrawAction, n: usize) -> Option<ActionRef<'_>> {
        Some(match tag {
            DrawAction::FillRectangle => ActionRef::FillRectangle(self.fill_rects.get(n)?),
            DrawAction::FillEllipse => ActionRef::FillEllipse(self.fill_ellipses.get(n)?),
            DrawAction::DrawRectangle => ActionRef::DrawRectangle(self.stroke_rects.get(n)?),
            DrawAction::DrawEllipse => ActionRef::DrawEllipse(self.stroke_ellipses.get(n)?),
            DrawAction::DrawImage => ActionRef::DrawImage(self.images.get(n)?),
            DrawAction::DrawLine => ActionRef::DrawLine(self.lines.get(n)?),
            DrawAction::DrawString => ActionRef::DrawString(self.strings.get(n)?),
            DrawAction::ClipArea => ActionRef::ClipArea(self.clips.get(n)?),
        })
    }
}

/// Iterator returned by [`ActionLog::replay`].
#[derive(Debug, Clone)]
pub struct Replay<'a> {
    log: &'a ActionLog,
    next: usize,
    cursors: [usize; DrawAction::COUNT],
}

impl<'a> Iterator for Replay<'a> {
    type Item = ActionRef<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let tag = *self.log.tags.get(self.next)?;
        let cursor = &mut self.cursors[tag.index()];
        let record = self.log.record(tag, *cursor);
        debug_assert!(record.is_some(), "{tag:?} #{} has no parameter record", *cursor);
        *cursor += 1;
        self.next += 1;
        record
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.log.tags.len() - self.next;
        (n, Some(n))
    }
}

impl ExactSizeIterator for Replay<'_> {}
