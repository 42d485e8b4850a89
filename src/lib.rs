use glam::Vec2;
use itertools::Itertools;
use thiserror::Error;

/// Tolerance for the circumcircle containment test and the near-equal-y
/// branches of the circumcenter solve.
const EPSILON: f32 = 1.0e-4;

/// How far the supertriangle vertices sit beyond the point cloud's bounding
/// box, as a multiple of the box's larger side.
const SUPERTRIANGLE_SCALE: f32 = 20.0;

#[derive(Debug, Error)]
pub enum MeshError {
    #[error("triangle index list length {0} is not a multiple of 3")]
    RaggedIndexList(usize),
    #[error("vertex index {index} is out of bounds for {point_count} points")]
    IndexOutOfBounds { index: u32, point_count: usize },
    #[error("no triangles to build a hierarchy over")]
    NoTriangles,
}

// =============================================================================

/// Build a triangle that strictly encloses every point in `points`.
///
/// The apex sits high above the bounding box midpoint and the two base
/// vertices far below and to either side, each offset by
/// [`SUPERTRIANGLE_SCALE`] times the box's larger side. Oversizing keeps
/// every input point well clear of the triangle's edges.
fn build_supertriangle(points: &[Vec2]) -> [Vec2; 3] {
    let mut lo = Vec2::splat(f32::MAX);
    let mut hi = Vec2::splat(f32::MIN);

    for &p in points {
        lo = lo.min(p);
        hi = hi.max(p);
    }

    let extent = hi - lo;
    let d_max = extent.x.max(extent.y);
    let mid = lo + extent * 0.5;

    [
        Vec2::new(mid.x - SUPERTRIANGLE_SCALE * d_max, mid.y - d_max),
        Vec2::new(mid.x, mid.y + SUPERTRIANGLE_SCALE * d_max),
        Vec2::new(mid.x + SUPERTRIANGLE_SCALE * d_max, mid.y - d_max),
    ]
}

// =============================================================================

/// A triangulation candidate: three indices into the augmented point array
/// plus the precomputed circumcircle through them.
#[derive(Debug, Clone, Copy)]
struct TriangleCircle {
    vertices: [u32; 3],
    center: Vec2,
    radius_sq: f32,
}

/// Compute the circle through points `i`, `j`, `k` of `points`.
///
/// The center is the intersection of two perpendicular edge bisectors. When
/// an edge is horizontal (its endpoints share a y-coordinate within
/// [`EPSILON`]) its bisector is vertical and the center's x-coordinate is
/// that edge's midpoint x; otherwise both bisector lines are intersected and
/// the center's y is recovered from whichever bisector's source edge spans
/// the larger y-range.
fn circumcircle(points: &[Vec2], i: u32, j: u32, k: u32) -> TriangleCircle {
    let p1 = points[i as usize];
    let p2 = points[j as usize];
    let p3 = points[k as usize];

    let y1_y2 = (p1.y - p2.y).abs();
    let y2_y3 = (p2.y - p3.y).abs();

    let center = if y1_y2 < EPSILON {
        let m2 = -(p3.x - p2.x) / (p3.y - p2.y);
        let mid23 = (p2 + p3) * 0.5;
        let cx = (p2.x + p1.x) * 0.5;
        Vec2::new(cx, m2 * (cx - mid23.x) + mid23.y)
    } else if y2_y3 < EPSILON {
        let m1 = -(p2.x - p1.x) / (p2.y - p1.y);
        let mid12 = (p1 + p2) * 0.5;
        let cx = (p3.x + p2.x) * 0.5;
        Vec2::new(cx, m1 * (cx - mid12.x) + mid12.y)
    } else {
        let m1 = -(p2.x - p1.x) / (p2.y - p1.y);
        let m2 = -(p3.x - p2.x) / (p3.y - p2.y);
        let mid12 = (p1 + p2) * 0.5;
        let mid23 = (p2 + p3) * 0.5;
        let cx = (m1 * mid12.x - m2 * mid23.x + mid23.y - mid12.y) / (m1 - m2);
        let cy = if y1_y2 > y2_y3 {
            m1 * (cx - mid12.x) + mid12.y
        } else {
            m2 * (cx - mid23.x) + mid23.y
        };
        Vec2::new(cx, cy)
    };

    TriangleCircle {
        vertices: [i, j, k],
        center,
        radius_sq: p2.distance_squared(center),
    }
}

// =============================================================================

/// An edge of a candidate triangle, as an unordered pair of indices into the
/// augmented point array.
#[derive(Debug, Clone, Copy)]
struct Edge {
    vtx: [u32; 2],
}

impl Edge {
    fn new(mut idx: [u32; 2]) -> Self {
        idx.sort();
        Self { vtx: idx }
    }
}

impl PartialEq for Edge {
    fn eq(&self, other: &Self) -> bool {
        self.vtx == other.vtx
    }
}

// =============================================================================

/// Working state for one triangulation run: the augmented point array, the
/// live ("open") and finalized ("closed") candidate sets, and the cavity
/// edge buffer reused across insertions.
#[derive(Debug)]
struct SweepState {
    points: Vec<Vec2>,
    open: Vec<TriangleCircle>,
    closed: Vec<TriangleCircle>,
    edges: Vec<Edge>,
}

impl SweepState {
    /// Augment `input` with the three supertriangle vertices and seed the
    /// open set with their circumcircle.
    fn new(input: &[Vec2]) -> Self {
        let n = input.len() as u32;

        let mut points = input.to_vec();
        points.extend(build_supertriangle(input));

        let seed = circumcircle(&points, n, n + 1, n + 2);

        Self {
            points,
            open: vec![seed],
            closed: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Insert the point at augmented index `c`, carving out every candidate
    /// whose circumcircle contains it and re-triangulating the cavity.
    ///
    /// Points arrive in ascending-x order, so any candidate whose
    /// circumcircle lies entirely left of `p.x` can never be invalidated
    /// again and is finalized on the spot.
    fn insert(&mut self, c: u32) {
        let p = self.points[c as usize];

        self.edges.clear();

        let mut j = self.open.len();
        while j > 0 {
            j -= 1;
            let t = self.open[j];

            let dx = p.x - t.center.x;
            if dx > EPSILON && dx * dx > t.radius_sq {
                self.open.remove(j);
                self.closed.push(t);
                continue;
            }

            if p.distance_squared(t.center) - t.radius_sq > EPSILON {
                // strictly outside, candidate survives
                continue;
            }

            self.open.remove(j);

            let [a, b, k] = t.vertices;
            self.push_cavity_edge(Edge::new([a, b]));
            self.push_cavity_edge(Edge::new([b, k]));
            self.push_cavity_edge(Edge::new([k, a]));
        }

        for edge in &self.edges {
            let t = circumcircle(&self.points, edge.vtx[0], edge.vtx[1], c);
            self.open.push(t);
        }
    }

    /// An edge shared by two carved-out candidates is interior to the cavity
    /// and cancels; the survivors bound the star-shaped hole around the new
    /// point.
    fn push_cavity_edge(&mut self, edge: Edge) {
        let is_shared = self.edges.iter().any(|e| e == &edge);
        if is_shared {
            self.edges.retain(|e| e != &edge);
        } else {
            self.edges.push(edge);
        }
    }

    /// Finalize every remaining open candidate and emit the triangles that
    /// do not touch the supertriangle (all three indices below `n`).
    fn into_triangles(mut self, n: u32) -> Vec<u32> {
        self.closed.append(&mut self.open);

        let mut out = Vec::with_capacity(self.closed.len() * 3);
        for t in &self.closed {
            if t.vertices.iter().all(|&v| v < n) {
                out.extend_from_slice(&t.vertices);
            }
        }
        out
    }
}

/// Compute the Delaunay triangulation of `points`.
///
/// Returns vertex indices into `points`, three per triangle, as a flat
/// buffer. Triangles appear in completion order, which is not meaningful;
/// treat the result as a set. Fewer than 3 points yields an empty buffer.
///
/// Points are inserted in ascending-x order; the sort is stable, so points
/// sharing an x-coordinate keep their input order. Duplicate points are not
/// filtered and can produce zero-area triangles.
pub fn triangulate(points: &[Vec2]) -> Vec<u32> {
    if points.len() < 3 {
        return Vec::new();
    }

    let mut order: Vec<u32> = (0..points.len() as u32).collect();
    order.sort_by(|&a, &b| points[a as usize].x.total_cmp(&points[b as usize].x));

    let mut state = SweepState::new(points);
    for c in order {
        state.insert(c);
    }

    let triangles = state.into_triangles(points.len() as u32);

    log::debug!(
        "triangulated {} points into {} triangles",
        points.len(),
        triangles.len() / 3
    );

    triangles
}

// =============================================================================

/// An axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    min: Vec2,
    max: Vec2,
}

impl Aabb {
    pub fn min(&self) -> Vec2 {
        self.min
    }

    pub fn max(&self) -> Vec2 {
        self.max
    }

    fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Strict containment: points exactly on the boundary are outside.
    fn contains_strict(&self, point: Vec2) -> bool {
        self.min.cmplt(point).all() && point.cmplt(self.max).all()
    }
}

// =============================================================================

/// A triangle realized as three vertex positions, with its bounding box and
/// centroid precomputed at construction.
#[derive(Debug, Clone, Copy)]
pub struct Triangle {
    vertices: [Vec2; 3],
    aabb: Aabb,
    center: Vec2,
}

impl Triangle {
    pub fn new(vertices: [Vec2; 3]) -> Self {
        let [a, b, c] = vertices;
        Self {
            vertices,
            aabb: Aabb {
                min: a.min(b).min(c),
                max: a.max(b).max(c),
            },
            center: (a + b + c) / 3.0,
        }
    }

    pub fn vertices(&self) -> [Vec2; 3] {
        self.vertices
    }

    pub fn aabb(&self) -> &Aabb {
        &self.aabb
    }

    /// The arithmetic mean of the three vertices.
    pub fn center(&self) -> Vec2 {
        self.center
    }

    /// Test whether `point` lies strictly inside this [`Triangle`].
    ///
    /// Checks that `point` falls on a consistent side of all three edges via
    /// cross-product signs. Comparisons are strict, so a point exactly on an
    /// edge or vertex is classified as outside.
    pub fn contains(&self, point: Vec2) -> bool {
        let [a, b, c] = self.vertices;
        let ap = point - a;

        let s_ab = (b - a).perp_dot(ap) > 0.0;

        if ((c - a).perp_dot(ap) > 0.0) == s_ab {
            return false;
        }
        if ((c - b).perp_dot(point - b) > 0.0) != s_ab {
            return false;
        }
        true
    }
}

// =============================================================================

/// A bounding-volume hierarchy over a set of [`Triangle`]s.
///
/// Binary tree with one triangle per leaf; every internal node's box is the
/// union of its children's boxes. Immutable once built, so shared read-only
/// access from multiple threads needs no locking.
#[derive(Debug)]
pub enum Bvh {
    Leaf(Triangle),
    Node {
        aabb: Aabb,
        left: Box<Bvh>,
        right: Box<Bvh>,
    },
}

impl Bvh {
    /// Build a hierarchy over `triangles`, splitting recursively on the axis
    /// with the larger centroid extent at the mean centroid coordinate.
    pub fn build(triangles: Vec<Triangle>) -> Result<Bvh, MeshError> {
        if triangles.is_empty() {
            return Err(MeshError::NoTriangles);
        }

        let count = triangles.len();
        let root = Self::build_node(triangles);

        log::debug!("built bvh over {count} triangles");

        Ok(root)
    }

    fn build_node(triangles: Vec<Triangle>) -> Bvh {
        if let [t] = triangles.as_slice() {
            return Bvh::Leaf(*t);
        }

        let mut lo = Vec2::splat(f32::MAX);
        let mut hi = Vec2::splat(f32::MIN);
        let mut sum = Vec2::ZERO;

        for t in &triangles {
            let c = t.center();
            lo = lo.min(c);
            hi = hi.max(c);
            sum += c;
        }

        let extent = hi - lo;
        let axis = if extent.x > extent.y { 0 } else { 1 };
        let split = sum[axis] / triangles.len() as f32;

        let (mut left, mut right): (Vec<_>, Vec<_>) = triangles
            .into_iter()
            .partition(|t| t.center()[axis] < split);

        // A mean split can land every centroid on one side (e.g. all
        // coincident on the split axis); hand one triangle across so both
        // subtrees are non-empty.
        if left.is_empty() {
            if let Some(t) = right.pop() {
                left.push(t);
            }
        } else if right.is_empty() {
            if let Some(t) = left.pop() {
                right.push(t);
            }
        }

        let left = Box::new(Self::build_node(left));
        let right = Box::new(Self::build_node(right));
        let aabb = left.aabb().union(right.aabb());

        Bvh::Node { aabb, left, right }
    }

    pub fn aabb(&self) -> &Aabb {
        match self {
            Bvh::Leaf(t) => t.aabb(),
            Bvh::Node { aabb, .. } => aabb,
        }
    }

    /// Find the triangle that owns `point`, or `None`.
    ///
    /// Descends only into nodes whose box strictly contains the point. Both
    /// children of an internal node are queried, since their boxes may
    /// overlap near the split; if both yield a triangle, the one with the
    /// nearer centroid wins. `None` is a normal outcome for points outside
    /// the triangulated region, and, because edge classification is strict,
    /// for points exactly on a shared interior edge.
    pub fn sample(&self, point: Vec2) -> Option<&Triangle> {
        if !self.aabb().contains_strict(point) {
            return None;
        }

        match self {
            Bvh::Leaf(t) => t.contains(point).then_some(t),
            Bvh::Node { left, right, .. } => {
                match (left.sample(point), right.sample(point)) {
                    (Some(l), Some(r)) => {
                        let l_dist = l.center().distance_squared(point);
                        let r_dist = r.center().distance_squared(point);
                        if l_dist < r_dist {
                            Some(l)
                        } else {
                            Some(r)
                        }
                    }
                    (l, r) => l.or(r),
                }
            }
        }
    }
}

/// Build a [`Bvh`] over `points`.
///
/// `triangles`, when supplied, is a flat buffer of vertex-index triples into
/// `points` (as produced by [`triangulate`]); when `None`, the triangulation
/// is computed here first.
pub fn build_bvh(points: &[Vec2], triangles: Option<&[u32]>) -> Result<Bvh, MeshError> {
    let computed;
    let indices = match triangles {
        Some(indices) => indices,
        None => {
            computed = triangulate(points);
            &computed
        }
    };

    if indices.len() % 3 != 0 {
        return Err(MeshError::RaggedIndexList(indices.len()));
    }

    let vertex = |index: u32| {
        points
            .get(index as usize)
            .copied()
            .ok_or(MeshError::IndexOutOfBounds {
                index,
                point_count: points.len(),
            })
    };

    let mut realized = Vec::with_capacity(indices.len() / 3);
    for (a, b, c) in indices.iter().copied().tuples() {
        realized.push(Triangle::new([vertex(a)?, vertex(b)?, vertex(c)?]));
    }

    Bvh::build(realized)
}

// =============================================================================
