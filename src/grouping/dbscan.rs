//! Feature standardisation and density-based clustering.

/// Scale every dimension to zero mean and unit (population) variance over the
/// given points. Constant dimensions become zero.
pub fn standardize(points: &[Vec<f32>]) -> Vec<Vec<f32>> {
    let Some(dims) = points.first().map(Vec::len) else {
        return Vec::new();
    };
    let n = points.len() as f64;

    let mut mean = vec![0.0f64; dims];
    for p in points {
        for (m, v) in mean.iter_mut().zip(p) {
            *m += *v as f64;
        }
    }
    mean.iter_mut().for_each(|m| *m /= n);

    let mut std = vec![0.0f64; dims];
    for p in points {
        for ((s, v), m) in std.iter_mut().zip(p).zip(&mean) {
            let d = *v as f64 - m;
            *s += d * d;
        }
    }
    for s in std.iter_mut() {
        *s = (*s / n).sqrt();
        if *s == 0.0 {
            *s = 1.0;
        }
    }

    points
        .iter()
        .map(|p| {
            p.iter()
                .zip(&mean)
                .zip(&std)
                .map(|((v, m), s)| ((*v as f64 - m) / s) as f32)
                .collect()
        })
        .collect()
}

fn distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// DBSCAN over Euclidean distance.
///
/// A point is a core point when at least `min_samples` points (itself
/// included) lie within `eps`. Returns one label per point; clusters are
/// numbered from 0 in the order their first core point appears, noise is `None`.
pub fn dbscan(points: &[Vec<f32>], eps: f32, min_samples: usize) -> Vec<Option<usize>> {
    let neighbours: Vec<Vec<usize>> = points
        .iter()
        .map(|p| {
            points
                .iter()
                .enumerate()
                .filter(|(_, q)| distance(p, q) <= eps)
                .map(|(j, _)| j)
                .collect()
        })
        .collect();
    let core: Vec<bool> = neighbours.iter().map(|n| n.len() >= min_samples).collect();

    let mut labels: Vec<Option<usize>> = vec![None; points.len()];
    let mut next_label = 0;

    for start in 0..points.len() {
        if labels[start].is_some() || !core[start] {
            continue;
        }

        labels[start] = Some(next_label);
        let mut stack = vec![start];
        while let Some(p) = stack.pop() {
            for &q in &neighbours[p] {
                if labels[q].is_none() {
                    labels[q] = Some(next_label);
                    if core[q] {
                        stack.push(q);
                    }
                }
            }
        }
        next_label += 1;
    }

    labels
}
