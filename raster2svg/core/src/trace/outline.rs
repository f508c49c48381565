//! Boundary tracing and outline shaping.
//!
//! Outlines run along pixel edges, clockwise around filled area. Holes come
//! out counter-clockwise; layers are filled with the even-odd rule so the
//! winding of individual loops never matters.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn midpoint(self, other: Self) -> Self {
        Self::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }

    fn distance(self, other: Self) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Segment {
    Line(Point),
    /// Control point, end point.
    Quad(Point, Point),
}

/// A closed path: `start` followed by `segments`, implicitly closed.
#[derive(Debug, Clone, PartialEq)]
pub struct Outline {
    pub start: Point,
    pub segments: Vec<Segment>,
}

const RIGHT: u8 = 0;
const DOWN: u8 = 1;
const LEFT: u8 = 2;
const UP: u8 = 3;

/// Trace every closed boundary of the pixels equal to `color`.
///
/// Returned polygons list pixel-corner vertices with collinear runs merged.
pub fn trace_layer(indexed: &[usize], width: usize, height: usize, color: usize) -> Vec<Vec<(i32, i32)>> {
    let stride = width + 1;
    let mut edges = vec![0u8; stride * (height + 1)];
    let at = |x: usize, y: usize| y * stride + x;
    let is_color = |x: usize, y: usize| indexed[y * width + x] == color;

    for y in 0..height {
        for x in 0..width {
            if !is_color(x, y) {
                continue;
            }
            if y == 0 || !is_color(x, y - 1) {
                edges[at(x, y)] |= 1 << RIGHT;
            }
            if x + 1 == width || !is_color(x + 1, y) {
                edges[at(x + 1, y)] |= 1 << DOWN;
            }
            if y + 1 == height || !is_color(x, y + 1) {
                edges[at(x + 1, y + 1)] |= 1 << LEFT;
            }
            if x == 0 || !is_color(x - 1, y) {
                edges[at(x, y + 1)] |= 1 << UP;
            }
        }
    }

    let mut loops = Vec::new();
    for start in 0..edges.len() {
        while edges[start] != 0 {
            let mut vertex = start;
            let mut dir = edges[start].trailing_zeros() as u8;
            let mut points = Vec::new();
            loop {
                points.push(((vertex % stride) as i32, (vertex / stride) as i32));
                edges[vertex] &= !(1 << dir);
                vertex = match dir {
                    RIGHT => vertex + 1,
                    DOWN => vertex + stride,
                    LEFT => vertex - 1,
                    _ => vertex - stride,
                };
                if vertex == start {
                    break;
                }
                match next_direction(edges[vertex], dir) {
                    Some(next) => dir = next,
                    None => break,
                }
            }
            let merged = merge_collinear(&points);
            if merged.len() >= 3 {
                loops.push(merged);
            }
        }
    }
    loops
}

/// Prefer turning right, then straight on, then left.
fn next_direction(mask: u8, dir: u8) -> Option<u8> {
    [(dir + 1) % 4, dir, (dir + 3) % 4]
        .into_iter()
        .find(|&d| mask & (1 << d) != 0)
}

/// Drop vertices that lie on a straight run.
pub fn merge_collinear(points: &[(i32, i32)]) -> Vec<(i32, i32)> {
    let n = points.len();
    (0..n)
        .filter(|&i| {
            let (px, py) = points[(i + n - 1) % n];
            let (cx, cy) = points[i];
            let (nx, ny) = points[(i + 1) % n];
            (cx - px) * (ny - cy) - (cy - py) * (nx - cx) != 0
        })
        .map(|i| points[i])
        .collect()
}

/// Ramer-Douglas-Peucker on a closed polygon. Vertices closer than
/// `epsilon` to the simplified outline are removed.
pub fn simplify(points: &[Point], epsilon: f64) -> Vec<Point> {
    let n = points.len();
    if n <= 3 || epsilon <= 0.0 {
        return points.to_vec();
    }
    let far = (1..n)
        .max_by(|&a, &b| points[0].distance(points[a]).total_cmp(&points[0].distance(points[b])))
        .unwrap_or(n / 2);

    let mut ring: Vec<Point> = points.to_vec();
    ring.push(points[0]);
    let mut keep = vec![false; ring.len()];
    keep[0] = true;
    keep[far] = true;
    keep[n] = true;

    let mut stack = vec![(0, far), (far, n)];
    while let Some((first, last)) = stack.pop() {
        if last <= first + 1 {
            continue;
        }
        let (index, dist) = (first + 1..last)
            .map(|i| (i, segment_distance(ring[i], ring[first], ring[last])))
            .fold((first, 0.0), |best, cur| if cur.1 > best.1 { cur } else { best });
        if dist > epsilon {
            keep[index] = true;
            stack.push((first, index));
            stack.push((index, last));
        }
    }

    ring.truncate(n);
    ring.into_iter()
        .zip(keep)
        .filter_map(|(p, k)| k.then_some(p))
        .collect()
}

fn segment_distance(p: Point, a: Point, b: Point) -> f64 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len2 = dx * dx + dy * dy;
    if len2 == 0.0 {
        return p.distance(a);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len2).clamp(0.0, 1.0);
    p.distance(Point::new(a.x + t * dx, a.y + t * dy))
}

/// Turn a polygon into a path through its edge midpoints.
///
/// Corners whose quadratic rounding stays within `quad_threshold` pixels are
/// rounded; larger turns stay sharp. With `right_angle_enhance`, right
/// angles between edges longer than one pixel are always kept sharp.
pub fn smooth(points: &[Point], right_angle_enhance: bool, quad_threshold: f64) -> Outline {
    let n = points.len();
    let mid = |i: usize| points[i % n].midpoint(points[(i + 1) % n]);
    let mut segments = Vec::with_capacity(n * 2);

    for i in 0..n {
        let prev = points[(i + n - 1) % n];
        let corner = points[i];
        let next = points[(i + 1) % n];
        let m_in = mid(i + n - 1);
        let m_out = mid(i);

        let sharp = right_angle_enhance && is_right_angle(prev, corner, next);
        let rounding = segment_distance(corner, m_in, m_out) / 2.0;
        if !sharp && rounding <= quad_threshold {
            segments.push(Segment::Quad(corner, m_out));
        } else {
            segments.push(Segment::Line(corner));
            segments.push(Segment::Line(m_out));
        }
    }

    Outline {
        start: mid(n - 1),
        segments,
    }
}

fn is_right_angle(prev: Point, corner: Point, next: Point) -> bool {
    let (ux, uy) = (corner.x - prev.x, corner.y - prev.y);
    let (vx, vy) = (next.x - corner.x, next.y - corner.y);
    let (lu, lv) = (ux.hypot(uy), vx.hypot(vy));
    lu > 1.5 && lv > 1.5 && (ux * vx + uy * vy).abs() <= 0.1 * lu * lv
}
