use crate::shapes::Rect;

/// Cluster overlapping detections and average each cluster.
///
/// Clusters with `group_threshold` or fewer members are dropped, as are
/// weak clusters sitting inside a stronger one. A threshold of 0 returns
/// the raw detections.
pub fn group_rectangles(rects: Vec<Rect>, group_threshold: u32, eps: f32) -> Vec<Rect> {
    if group_threshold == 0 || rects.is_empty() {
        return rects;
    }

    let labels = partition(&rects, |a, b| similar(a, b, eps));
    let n_classes = labels.iter().copied().max().map_or(0, |m| m + 1);

    let mut sums = vec![(0i64, 0i64, 0i64, 0i64); n_classes];
    let mut counts = vec![0u32; n_classes];
    for (rect, &label) in rects.iter().zip(labels.iter()) {
        let s = &mut sums[label];
        s.0 += rect.x as i64;
        s.1 += rect.y as i64;
        s.2 += rect.w as i64;
        s.3 += rect.h as i64;
        counts[label] += 1;
    }

    let averaged: Vec<Rect> = sums
        .iter()
        .zip(counts.iter())
        .map(|(s, &n)| {
            let n = n as f64;
            Rect::new(
                (s.0 as f64 / n).round() as u32,
                (s.1 as f64 / n).round() as u32,
                (s.2 as f64 / n).round() as u32,
                (s.3 as f64 / n).round() as u32,
            )
        })
        .collect();

    let mut grouped = Vec::new();
    for (i, r1) in averaged.iter().enumerate() {
        let n1 = counts[i];
        if n1 <= group_threshold {
            continue;
        }

        let swallowed = averaged.iter().enumerate().any(|(j, r2)| {
            let n2 = counts[j];
            if j == i || n2 <= group_threshold {
                return false;
            }
            let dx = (r2.w as f32 * eps).round() as i64;
            let dy = (r2.h as f32 * eps).round() as i64;
            r1.inside(r2, dx, dy) && (n2 > n1.max(3) || n1 < 3)
        });

        if !swallowed {
            grouped.push(*r1);
        }
    }

    grouped
}

fn similar(a: &Rect, b: &Rect, eps: f32) -> bool {
    let delta = eps as f64 * (a.w.min(b.w) + a.h.min(b.h)) as f64 * 0.5;
    let (ax, ay, ar, ab) = a.edges();
    let (bx, by, br, bb) = b.edges();

    ((ax - bx).abs() as f64) <= delta
        && ((ay - by).abs() as f64) <= delta
        && ((ar - br).abs() as f64) <= delta
        && ((ab - bb).abs() as f64) <= delta
}

/// Label equivalence classes of `items` under `same`, closing transitively.
/// Labels are dense and ordered by first appearance.
fn partition<T>(items: &[T], same: impl Fn(&T, &T) -> bool) -> Vec<usize> {
    let mut parent: Vec<usize> = (0..items.len()).collect();

    fn root(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }

    for i in 0..items.len() {
        for j in (i + 1)..items.len() {
            if same(&items[i], &items[j]) {
                let (ri, rj) = (root(&mut parent, i), root(&mut parent, j));
                if ri != rj {
                    parent[rj] = ri;
                }
            }
        }
    }

    let mut labels = vec![usize::MAX; items.len()];
    let mut roots: Vec<usize> = Vec::new();
    for i in 0..items.len() {
        let r = root(&mut parent, i);
        let label = match roots.iter().position(|&known| known == r) {
            Some(label) => label,
            None => {
                roots.push(r);
                roots.len() - 1
            }
        };
        labels[i] = label;
    }

    labels
}
