use delaunay_bvh::*;
use glam::Vec2;

fn main() {
    let points = vec![
        Vec2::new(0.0, 0.0),
        Vec2::new(1.0, 0.0),
        Vec2::new(0.0, 1.0),
        Vec2::new(1.0, 1.0),
        Vec2::new(0.4, 0.6),
    ];

    let indices = triangulate(&points);
    println!("{indices:?}");

    let bvh = build_bvh(&points, Some(&indices)).expect("build bvh");

    for query in [Vec2::new(0.5, 0.25), Vec2::new(2.0, 2.0)] {
        match bvh.sample(query) {
            Some(triangle) => println!("{query} -> {:?}", triangle.vertices()),
            None => println!("{query} -> no match"),
        }
    }
}
