// src/frames/catalog.rs
//
// Frames confirmed to exist for one probe run. Built once, then read-only;
// a new run replaces it wholesale.

use serde::Serialize;
use std::collections::BTreeMap;

use super::address::FrameAddress;

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct FrameCatalog {
    /// Size of the full candidate range, occupied or not
    total_frames: usize,
    frames: BTreeMap<usize, FrameAddress>,
}

impl FrameCatalog {
    pub fn empty(total_frames: usize) -> Self {
        Self {
            total_frames,
            frames: BTreeMap::new(),
        }
    }

    /// Build from surviving frames. Indices outside `0..total_frames` are dropped.
    pub fn from_frames(total_frames: usize, frames: Vec<FrameAddress>) -> Self {
        let frames = frames
            .into_iter()
            .filter(|f| f.index < total_frames)
            .map(|f| (f.index, f))
            .collect();
        Self {
            total_frames,
            frames,
        }
    }

    pub fn get(&self, index: usize) -> Option<&FrameAddress> {
        self.frames.get(&index)
    }

    pub fn contains(&self, index: usize) -> bool {
        self.frames.contains_key(&index)
    }

    /// Number of occupied indices.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn total_frames(&self) -> usize {
        self.total_frames
    }

    pub fn indices_in_order(&self) -> Vec<usize> {
        self.frames.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FrameAddress> {
        self.frames.values()
    }

    /// Index 0 if present, otherwise the smallest occupied index.
    pub fn recommended_start(&self) -> Option<usize> {
        self.frames.keys().next().copied()
    }

    /// Next occupied index after `current`, wrapping modulo `total_frames`.
    ///
    /// Tries `current + 1, current + 2, ...` for at most `total_frames`
    /// candidates, so the last candidate is `current` itself. A singleton
    /// catalog therefore returns its own index. `None` only when nothing in
    /// the range is occupied.
    pub fn next_occupied_after(&self, current: usize) -> Option<usize> {
        if self.total_frames == 0 {
            return None;
        }
        let mut next = (current + 1) % self.total_frames;
        for _ in 0..self.total_frames {
            if self.contains(next) {
                return Some(next);
            }
            next = (next + 1) % self.total_frames;
        }
        None
    }
}
