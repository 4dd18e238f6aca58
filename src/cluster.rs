use std::cmp::Ordering;

use tracing::trace;

use crate::cascade::Detection;

/// Overlap ratio of two detections treated as axis-aligned squares of side
/// `size` around their centres.
pub fn overlap_ratio(a: &Detection, b: &Detection) -> f64 {
    let span = |p1: f64, s1: f64, p2: f64, s2: f64| {
        ((p1 + s1 / 2.0).min(p2 + s2 / 2.0) - (p1 - s1 / 2.0).max(p2 - s2 / 2.0)).max(0.0)
    };
    let over_r = span(a.row, a.size, b.row, b.size);
    let over_c = span(a.col, a.size, b.col, b.size);
    let intersection = over_r * over_c;
    let union = a.size * a.size + b.size * b.size - intersection;
    if union <= 0.0 {
        return 0.0;
    }
    intersection / union
}

/// Merge detections whose overlap exceeds `iou_threshold`, transitively.
///
/// Each connected component becomes one detection at the score-weighted mean
/// position and size, carrying the summed score. Merged means can overlap
/// each other, so passes repeat until the cluster count settles and no two
/// outputs overlap above the threshold. Output is sorted by descending score.
pub fn cluster_detections(detections: &[Detection], iou_threshold: f64) -> Vec<Detection> {
    let mut clusters = merge_components(detections, iou_threshold);
    loop {
        let next = merge_components(&clusters, iou_threshold);
        if next.len() == clusters.len() {
            break;
        }
        clusters = next;
    }

    trace!(
        input = detections.len(),
        output = clusters.len(),
        "clustered detections"
    );
    clusters
}

/// One union-find pass over `detections`.
fn merge_components(detections: &[Detection], iou_threshold: f64) -> Vec<Detection> {
    let mut sorted = detections.to_vec();
    sorted.sort_by(by_score_then_position);

    let mut sets = DisjointSets::new(sorted.len());
    for i in 0..sorted.len() {
        for j in i + 1..sorted.len() {
            if overlap_ratio(&sorted[i], &sorted[j]) > iou_threshold {
                sets.union(i, j);
            }
        }
    }

    let mut members: Vec<Vec<usize>> = vec![Vec::new(); sorted.len()];
    for i in 0..sorted.len() {
        members[sets.find(i)].push(i);
    }

    let mut clusters: Vec<Detection> = members
        .iter()
        .filter(|group| !group.is_empty())
        .map(|group| merge(group.iter().map(|&i| &sorted[i])))
        .collect();
    clusters.sort_by(by_score_then_position);
    clusters
}

fn merge<'a>(group: impl Iterator<Item = &'a Detection> + Clone) -> Detection {
    let mut items = group.clone();
    if let (Some(only), None) = (items.next(), items.next()) {
        return *only;
    }

    let total: f64 = group.clone().map(|d| d.score).sum();
    let count = group.clone().count() as f64;
    // Uniform weights when the scores cannot act as weights.
    let weight = |d: &Detection| {
        if total > 0.0 {
            d.score / total
        } else {
            1.0 / count
        }
    };

    let mut merged = Detection::new(0.0, 0.0, 0.0, total);
    for d in group {
        let w = weight(d);
        merged.row += w * d.row;
        merged.col += w * d.col;
        merged.size += w * d.size;
    }
    merged
}

fn by_score_then_position(a: &Detection, b: &Detection) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then(a.row.total_cmp(&b.row))
        .then(a.col.total_cmp(&b.col))
        .then(a.size.total_cmp(&b.size))
}

struct DisjointSets {
    parent: Vec<usize>,
}

impl DisjointSets {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    /// The lower index, i.e. the higher score, stays the root.
    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            let (root, child) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[child] = root;
        }
    }
}
