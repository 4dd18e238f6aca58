use std::collections::VecDeque;

use crate::cascade::Detection;

/// Raw detections of the last `depth` frames.
///
/// Output is deliberately not deduplicated; the clusterer merges repeated
/// hits, and a face missed for one frame keeps contributing its history.
#[derive(Debug, Clone)]
pub struct DetectionMemory {
    depth: usize,
    frames: VecDeque<Vec<Detection>>,
}

impl DetectionMemory {
    pub fn new(depth: usize) -> Self {
        let depth = depth.max(1);
        Self {
            depth,
            frames: VecDeque::with_capacity(depth),
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Number of frames currently buffered.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Store this frame's detections and return every buffered detection,
    /// oldest frame first.
    pub fn update(&mut self, detections: Vec<Detection>) -> Vec<Detection> {
        if self.frames.len() == self.depth {
            self.frames.pop_front();
        }
        self.frames.push_back(detections);
        self.frames.iter().flatten().copied().collect()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

impl Default for DetectionMemory {
    fn default() -> Self {
        Self::new(5)
    }
}
