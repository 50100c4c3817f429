use crate::geometry::BBox;
use crate::raster::Mask;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Four,
    Eight,
}

#[derive(Debug, Clone)]
pub struct Component {
    pub bbox: BBox,
    pub area: usize,
    /// Raster index of the first pixel met in scan order; always on the outer boundary.
    pub seed: usize,
    pub pixels: Vec<usize>,
}

const N4: [(i64, i64); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];
const N8: [(i64, i64); 8] = [(-1, 0), (1, 0), (0, -1), (0, 1), (-1, -1), (1, -1), (-1, 1), (1, 1)];

/// Label the foreground of `mask` into connected components, in scan order of their seeds.
pub fn label(mask: &Mask, connectivity: Connectivity) -> Vec<Component> {
    let (w, h) = (mask.width as i64, mask.height as i64);
    let neighbours: &[(i64, i64)] = match connectivity {
        Connectivity::Four => &N4,
        Connectivity::Eight => &N8,
    };
    let mut seen = vec![false; mask.data.len()];
    let mut out = Vec::new();
    let mut stack = Vec::new();
    for start in 0..mask.data.len() {
        if !mask.data[start] || seen[start] {
            continue;
        }
        seen[start] = true;
        stack.push(start);
        let mut pixels = Vec::new();
        let (mut x0, mut y0, mut x1, mut y1) = (i64::MAX, i64::MAX, 0i64, 0i64);
        while let Some(idx) = stack.pop() {
            pixels.push(idx);
            let (x, y) = (idx as i64 % w, idx as i64 / w);
            x0 = x0.min(x);
            y0 = y0.min(y);
            x1 = x1.max(x);
            y1 = y1.max(y);
            for (dx, dy) in neighbours {
                let (nx, ny) = (x + dx, y + dy);
                if nx < 0 || ny < 0 || nx >= w || ny >= h {
                    continue;
                }
                let n = (ny * w + nx) as usize;
                if mask.data[n] && !seen[n] {
                    seen[n] = true;
                    stack.push(n);
                }
            }
        }
        out.push(Component {
            bbox: BBox::from_corners(x0 as u32, y0 as u32, x1 as u32, y1 as u32),
            area: pixels.len(),
            seed: start,
            pixels,
        });
    }
    out
}

// Clockwise from west, image coordinates (y grows downwards).
const MOORE: [(i64, i64); 8] = [(-1, 0), (-1, -1), (0, -1), (1, -1), (1, 0), (1, 1), (0, 1), (-1, 1)];

/// Trace the outer boundary of the 8-connected component containing `seed`
/// with Moore-neighbour tracing. `seed` must be the component's first pixel
/// in raster order, so its west neighbour is background.
pub fn trace_outer_contour(mask: &Mask, seed: usize) -> Vec<(i64, i64)> {
    let w = mask.width as i64;
    let start = (seed as i64 % w, seed as i64 / w);
    let mut contour = vec![start];
    let mut current = start;
    // direction index pointing from `current` to the background pixel we came from
    let mut back = 0usize;
    let limit = mask.data.len() * 4 + 8;
    for _ in 0..limit {
        let mut next = None;
        for i in 1..=8 {
            let d = (back + i) % 8;
            let cand = (current.0 + MOORE[d].0, current.1 + MOORE[d].1);
            if mask.get_signed(cand.0, cand.1) {
                let prev_d = (back + i - 1) % 8;
                let prev = (current.0 + MOORE[prev_d].0, current.1 + MOORE[prev_d].1);
                next = Some((cand, prev));
                break;
            }
        }
        let Some((cand, prev)) = next else {
            break;
        };
        if current == start && contour.len() > 1 && cand == contour[1] {
            break;
        }
        back = direction_between(cand, prev);
        current = cand;
        contour.push(cand);
    }
    if contour.len() > 1 && contour.last() == Some(&start) {
        contour.pop();
    }
    contour
}

fn direction_between(from: (i64, i64), to: (i64, i64)) -> usize {
    let delta = (to.0 - from.0, to.1 - from.1);
    MOORE.iter().position(|d| *d == delta).unwrap_or(0)
}

/// Drop intermediate points of straight runs, keeping only direction changes.
pub fn simplify_chain(points: &[(i64, i64)]) -> Vec<(i64, i64)> {
    let n = points.len();
    if n < 3 {
        return points.to_vec();
    }
    let step = |a: (i64, i64), b: (i64, i64)| (b.0 - a.0, b.1 - a.1);
    (0..n)
        .filter(|&i| {
            let prev = points[(i + n - 1) % n];
            let next = points[(i + 1) % n];
            step(prev, points[i]) != step(points[i], next)
        })
        .map(|i| points[i])
        .collect()
}

/// Components of `mask` that are not enclosed by another component, i.e.
/// those touching the background region connected to the image border.
pub fn external_components(mask: &Mask) -> Vec<Component> {
    let (w, h) = (mask.width as i64, mask.height as i64);
    let mut outside = vec![false; mask.data.len()];
    let mut stack = Vec::new();
    for y in 0..h {
        for x in 0..w {
            if (x == 0 || y == 0 || x == w - 1 || y == h - 1) && !mask.data[(y * w + x) as usize] {
                let i = (y * w + x) as usize;
                if !outside[i] {
                    outside[i] = true;
                    stack.push(i);
                }
            }
        }
    }
    while let Some(i) = stack.pop() {
        let (x, y) = (i as i64 % w, i as i64 / w);
        for (dx, dy) in N4 {
            let (nx, ny) = (x + dx, y + dy);
            if nx < 0 || ny < 0 || nx >= w || ny >= h {
                continue;
            }
            let n = (ny * w + nx) as usize;
            if !mask.data[n] && !outside[n] {
                outside[n] = true;
                stack.push(n);
            }
        }
    }
    label(mask, Connectivity::Eight)
        .into_iter()
        .filter(|c| {
            c.pixels.iter().any(|&i| {
                let (x, y) = (i as i64 % w, i as i64 / w);
                if x == 0 || y == 0 || x == w - 1 || y == h - 1 {
                    return true;
                }
                N4.iter().any(|(dx, dy)| outside[((y + dy) * w + x + dx) as usize])
            })
        })
        .collect()
}

/// Shoelace area of a closed polygon.
pub fn polygon_area(points: &[(i64, i64)]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut acc = 0i64;
    for i in 0..points.len() {
        let (x0, y0) = points[i];
        let (x1, y1) = points[(i + 1) % points.len()];
        acc += x0 * y1 - x1 * y0;
    }
    (acc as f64 / 2.0).abs()
}

/// Perimeter of the closed polygon.
pub fn polygon_perimeter(points: &[(i64, i64)]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    let mut acc = 0.0;
    for i in 0..points.len() {
        let (x0, y0) = points[i];
        let (x1, y1) = points[(i + 1) % points.len()];
        acc += (((x1 - x0).pow(2) + (y1 - y0).pow(2)) as f64).sqrt();
    }
    acc
}
