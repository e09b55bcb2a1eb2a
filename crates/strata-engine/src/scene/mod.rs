//! Recorded frame actions.
//!
//! Responsibilities:
//! - keep the frame's paint order as one tag sequence
//! - keep each action kind's parameters in its own FIFO list
//! - replay both in lockstep

mod action;
mod list;

pub use action::{
    Action, ActionRef, DrawAction, Ellipse, FillRect, Image, Line, StrokeRect, Text,
};
pub use list::{ActionLog, Replay};
