//! Delaunay triangulation of scattered planar points (Bowyer-Watson).
//!
//! Points are shifted and scaled into a unit box before triangulating so the
//! circumcircle tests are well conditioned regardless of whether the input is
//! in metres or kilometres. Tie-breaking rules:
//! - duplicate points: the first occurrence is kept, later ones are dropped
//! - cocircular points: a point exactly on a circumcircle is treated as
//!   outside it, so the earlier-inserted diagonal of a square is kept
//! - collinear input: no triangle has positive area, the triangulation is
//!   empty and every query is outside it

use crate::types::PlanarPoint;
use std::collections::{HashMap, HashSet};

/// Half-width of the enclosing super-triangle in normalized units
const SUPER_EXTENT: f64 = 1.0e3;
/// Relative slack on the circumcircle test (ties count as outside)
const CIRCLE_TOL: f64 = 1.0e-12;
/// Barycentric slack so points on shared edges are located
const BARY_TOL: f64 = 1.0e-12;
/// Triangles with smaller normalized doubled area are dropped
const MIN_AREA: f64 = 1.0e-14;

#[derive(Debug, Clone, Copy)]
struct Triangle {
    v: [usize; 3],
    cx: f64,
    cy: f64,
    r2: f64,
}

impl Triangle {
    fn new(v: [usize; 3], pts: &[[f64; 2]]) -> Self {
        let [a, b, c] = [pts[v[0]], pts[v[1]], pts[v[2]]];
        let d = 2.0 * (a[0] * (b[1] - c[1]) + b[0] * (c[1] - a[1]) + c[0] * (a[1] - b[1]));
        if d.abs() < f64::MIN_POSITIVE {
            // Degenerate: infinite circumcircle, swallowed by the next insertion
            return Self {
                v,
                cx: 0.0,
                cy: 0.0,
                r2: f64::INFINITY,
            };
        }
        let a2 = a[0] * a[0] + a[1] * a[1];
        let b2 = b[0] * b[0] + b[1] * b[1];
        let c2 = c[0] * c[0] + c[1] * c[1];
        let cx = (a2 * (b[1] - c[1]) + b2 * (c[1] - a[1]) + c2 * (a[1] - b[1])) / d;
        let cy = (a2 * (c[0] - b[0]) + b2 * (a[0] - c[0]) + c2 * (b[0] - a[0])) / d;
        let r2 = (a[0] - cx).powi(2) + (a[1] - cy).powi(2);
        Self { v, cx, cy, r2 }
    }

    fn circumcircle_contains(&self, p: [f64; 2]) -> bool {
        if self.r2.is_infinite() {
            return true;
        }
        let d2 = (p[0] - self.cx).powi(2) + (p[1] - self.cy).powi(2);
        d2 < self.r2 * (1.0 - CIRCLE_TOL)
    }
}

/// Twice the signed area of (a, b, c); positive when counter-clockwise
fn orient(a: [f64; 2], b: [f64; 2], c: [f64; 2]) -> f64 {
    (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0])
}

/// Uniform-grid bucket index over triangle bounding boxes
#[derive(Debug, Clone)]
struct Locator {
    min: [f64; 2],
    cell: [f64; 2],
    nx: usize,
    ny: usize,
    buckets: Vec<Vec<usize>>,
}

impl Locator {
    fn empty() -> Self {
        Self {
            min: [0.0, 0.0],
            cell: [1.0, 1.0],
            nx: 0,
            ny: 0,
            buckets: Vec::new(),
        }
    }

    fn build(pts: &[[f64; 2]], triangles: &[[usize; 3]]) -> Self {
        if triangles.is_empty() {
            return Self::empty();
        }
        let (mut min, mut max) = ([f64::INFINITY; 2], [f64::NEG_INFINITY; 2]);
        for p in pts {
            for k in 0..2 {
                min[k] = min[k].min(p[k]);
                max[k] = max[k].max(p[k]);
            }
        }
        let side = ((triangles.len() as f64 / 2.0).sqrt().ceil() as usize).max(1);
        let (nx, ny) = (side, side);
        let cell = [
            ((max[0] - min[0]) / nx as f64).max(f64::MIN_POSITIVE),
            ((max[1] - min[1]) / ny as f64).max(f64::MIN_POSITIVE),
        ];
        let mut locator = Self {
            min,
            cell,
            nx,
            ny,
            buckets: vec![Vec::new(); nx * ny],
        };

        for (t, tri) in triangles.iter().enumerate() {
            let (mut lo, mut hi) = ([f64::INFINITY; 2], [f64::NEG_INFINITY; 2]);
            for &v in tri {
                for k in 0..2 {
                    lo[k] = lo[k].min(pts[v][k]);
                    hi[k] = hi[k].max(pts[v][k]);
                }
            }
            let (i0, j0) = locator.cell_of(lo[0], lo[1]);
            let (i1, j1) = locator.cell_of(hi[0], hi[1]);
            for j in j0..=j1 {
                for i in i0..=i1 {
                    locator.buckets[j * nx + i].push(t);
                }
            }
        }
        locator
    }

    fn cell_of(&self, x: f64, y: f64) -> (usize, usize) {
        let i = ((x - self.min[0]) / self.cell[0]).floor().max(0.0) as usize;
        let j = ((y - self.min[1]) / self.cell[1]).floor().max(0.0) as usize;
        (i.min(self.nx - 1), j.min(self.ny - 1))
    }

    fn candidates(&self, x: f64, y: f64) -> &[usize] {
        if self.buckets.is_empty() {
            return &[];
        }
        let slack = [self.cell[0] * 1e-9, self.cell[1] * 1e-9];
        let max_x = self.min[0] + self.cell[0] * self.nx as f64;
        let max_y = self.min[1] + self.cell[1] * self.ny as f64;
        if x < self.min[0] - slack[0]
            || x > max_x + slack[0]
            || y < self.min[1] - slack[1]
            || y > max_y + slack[1]
        {
            return &[];
        }
        let (i, j) = self.cell_of(x, y);
        &self.buckets[j * self.nx + i]
    }
}

/// Location of a query point inside the triangulation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriangleHit {
    /// Indices into the point slice the triangulation was built from
    pub vertices: [usize; 3],
    /// Barycentric weights, summing to one
    pub weights: [f64; 3],
}

/// Delaunay triangulation with a point locator
#[derive(Debug, Clone)]
pub struct Triangulation {
    origin: [f64; 2],
    scale: f64,
    points: Vec<[f64; 2]>,
    source_index: Vec<usize>,
    triangles: Vec<[usize; 3]>,
    locator: Locator,
}

impl Triangulation {
    /// Triangulate `points`; invalid (missing) coordinates are skipped
    pub fn new(points: &[PlanarPoint]) -> Self {
        let mut seen = HashSet::new();
        let mut source_index = Vec::with_capacity(points.len());
        for (i, p) in points.iter().enumerate() {
            if p.is_valid() && seen.insert((p.x.to_bits(), p.y.to_bits())) {
                source_index.push(i);
            }
        }
        let dropped = points.len() - source_index.len();
        if dropped > 0 {
            log::debug!("Triangulation skipped {} missing or duplicate points", dropped);
        }

        let mut triangulation = Self {
            origin: [0.0, 0.0],
            scale: 1.0,
            points: Vec::new(),
            source_index,
            triangles: Vec::new(),
            locator: Locator::empty(),
        };
        if triangulation.source_index.len() < 3 {
            return triangulation;
        }

        let valid: Vec<&PlanarPoint> = triangulation.source_index.iter().map(|&i| &points[i]).collect();
        let (mut min, mut max) = ([f64::INFINITY; 2], [f64::NEG_INFINITY; 2]);
        for p in &valid {
            min = [min[0].min(p.x), min[1].min(p.y)];
            max = [max[0].max(p.x), max[1].max(p.y)];
        }
        let scale = (max[0] - min[0]).max(max[1] - min[1]);
        if !(scale > 0.0) {
            return triangulation;
        }
        let origin = [(min[0] + max[0]) / 2.0, (min[1] + max[1]) / 2.0];
        triangulation.origin = origin;
        triangulation.scale = scale;
        triangulation.points = valid
            .iter()
            .map(|p| [(p.x - origin[0]) / scale, (p.y - origin[1]) / scale])
            .collect();

        triangulation.triangles = bowyer_watson(&triangulation.points);
        triangulation.locator = Locator::build(&triangulation.points, &triangulation.triangles);

        log::debug!(
            "Triangulated {} points into {} triangles",
            triangulation.points.len(),
            triangulation.triangles.len()
        );
        triangulation
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// Number of distinct valid points used as vertices
    pub fn vertex_count(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Triangles as indices into the input point slice
    pub fn triangles(&self) -> impl Iterator<Item = [usize; 3]> + '_ {
        self.triangles.iter().map(move |t| t.map(|v| self.source_index[v]))
    }

    /// Find the triangle containing `query`, `None` outside the convex hull
    pub fn locate(&self, query: PlanarPoint) -> Option<TriangleHit> {
        if !query.is_valid() || self.triangles.is_empty() {
            return None;
        }
        let p = [
            (query.x - self.origin[0]) / self.scale,
            (query.y - self.origin[1]) / self.scale,
        ];
        for &t in self.locator.candidates(p[0], p[1]) {
            let [ia, ib, ic] = self.triangles[t];
            let (a, b, c) = (self.points[ia], self.points[ib], self.points[ic]);
            let area = orient(a, b, c);
            let w0 = orient(p, b, c) / area;
            let w1 = orient(a, p, c) / area;
            let w2 = 1.0 - w0 - w1;
            if w0 >= -BARY_TOL && w1 >= -BARY_TOL && w2 >= -BARY_TOL {
                return Some(TriangleHit {
                    vertices: [self.source_index[ia], self.source_index[ib], self.source_index[ic]],
                    weights: [w0, w1, w2],
                });
            }
        }
        None
    }
}

fn bowyer_watson(points: &[[f64; 2]]) -> Vec<[usize; 3]> {
    let n = points.len();
    let mut pts = points.to_vec();
    pts.push([-SUPER_EXTENT, -SUPER_EXTENT]);
    pts.push([SUPER_EXTENT, -SUPER_EXTENT]);
    pts.push([0.0, SUPER_EXTENT]);

    let mut triangles = vec![Triangle::new([n, n + 1, n + 2], &pts)];
    let mut skipped = 0usize;

    for i in 0..n {
        let p = pts[i];
        let bad: Vec<usize> = triangles
            .iter()
            .enumerate()
            .filter(|(_, t)| t.circumcircle_contains(p))
            .map(|(k, _)| k)
            .collect();
        if bad.is_empty() {
            skipped += 1;
            continue;
        }

        // Cavity boundary: edges of bad triangles not shared with another bad triangle
        let mut edge_count: HashMap<(usize, usize), usize> = HashMap::new();
        for &k in &bad {
            let v = triangles[k].v;
            for e in 0..3 {
                let (a, b) = (v[e], v[(e + 1) % 3]);
                *edge_count.entry((a.min(b), a.max(b))).or_insert(0) += 1;
            }
        }
        let mut boundary = Vec::new();
        for &k in &bad {
            let v = triangles[k].v;
            for e in 0..3 {
                let (a, b) = (v[e], v[(e + 1) % 3]);
                if edge_count[&(a.min(b), a.max(b))] == 1 {
                    boundary.push((a, b));
                }
            }
        }

        for &k in bad.iter().rev() {
            triangles.swap_remove(k);
        }
        for (a, b) in boundary {
            triangles.push(Triangle::new([a, b, i], &pts));
        }
    }

    if skipped > 0 {
        log::warn!("Triangulation could not insert {} points", skipped);
    }

    triangles
        .into_iter()
        .map(|t| t.v)
        .filter(|v| v.iter().all(|&k| k < n))
        .filter(|v| orient(pts[v[0]], pts[v[1]], pts[v[2]]).abs() > MIN_AREA)
        .collect()
}
