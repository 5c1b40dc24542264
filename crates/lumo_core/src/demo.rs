//! Built-in scenes for the CLI and tests.

use lumo_math::{Color, Vec3};

use crate::{Camera, Material, Scene};

/// Names accepted by [`by_name`].
pub const SCENE_NAMES: [&str; 3] = ["cornell", "spheres", "triangle"];

/// Look up a demo scene by name.
pub fn by_name(name: &str) -> Option<Scene> {
    match name {
        "cornell" => Some(cornell_box()),
        "spheres" => Some(spheres()),
        "triangle" => Some(single_triangle()),
        _ => None,
    }
}

/// Closed box with red/green side walls, a ceiling light, a mirror sphere
/// and a glass sphere.
pub fn cornell_box() -> Scene {
    let camera = Camera::perspective(Vec3::new(0.0, 0.0, 3.4), Vec3::ZERO, Vec3::Y, 45.0);
    let mut builder = Scene::builder().camera(camera);

    let white = builder.add_material(Material::diffuse(Color::splat(0.73)));
    let red = builder.add_material(Material::diffuse(Color::new(0.65, 0.05, 0.05)));
    let green = builder.add_material(Material::diffuse(Color::new(0.12, 0.45, 0.15)));
    let mirror = builder.add_material(Material::mirror(Color::splat(0.9)));
    let glass = builder.add_material(Material::glass(1.5));

    let (lo, hi) = (-1.0, 1.0);
    // floor, ceiling, back wall, left wall, right wall
    let walls = [
        ([(lo, lo, hi), (hi, lo, hi), (hi, lo, lo), (lo, lo, lo)], white),
        ([(lo, hi, lo), (hi, hi, lo), (hi, hi, hi), (lo, hi, hi)], white),
        ([(lo, lo, lo), (hi, lo, lo), (hi, hi, lo), (lo, hi, lo)], white),
        ([(lo, lo, hi), (lo, lo, lo), (lo, hi, lo), (lo, hi, hi)], red),
        ([(hi, lo, lo), (hi, lo, hi), (hi, hi, hi), (hi, hi, lo)], green),
    ];
    for (corners, material) in walls {
        let [a, b, c, d] = corners.map(|(x, y, z)| Vec3::new(x, y, z));
        builder.add_quad(a, b, c, d, material);
    }

    builder.add_sphere(Vec3::new(-0.45, -0.65, -0.3), 0.35, mirror);
    builder.add_sphere(Vec3::new(0.45, -0.65, 0.25), 0.35, glass);

    // Ceiling light just below the ceiling, split into two triangles
    let y = hi - 0.01;
    let s = 0.3;
    let radiance = Color::splat(12.0);
    builder.add_area_light(Vec3::new(-s, y, -s), Vec3::new(s, y, -s), Vec3::new(s, y, s), radiance);
    builder.add_area_light(Vec3::new(-s, y, -s), Vec3::new(s, y, s), Vec3::new(-s, y, s), radiance);

    builder.build()
}

/// A ground plane with a few spheres under a point light.
pub fn spheres() -> Scene {
    let camera = Camera::perspective(
        Vec3::new(0.0, 1.5, 6.0),
        Vec3::new(0.0, 0.5, 0.0),
        Vec3::Y,
        40.0,
    );
    let mut builder = Scene::builder()
        .camera(camera)
        .background(Color::new(0.5, 0.7, 1.0));

    let ground = builder.add_material(Material::diffuse(Color::splat(0.5)));
    let blue = builder.add_material(Material::diffuse(Color::new(0.1, 0.2, 0.5)));
    let mirror = builder.add_material(Material::mirror(Color::new(0.8, 0.6, 0.2)));
    let glass = builder.add_material(Material::glass(1.5));

    builder.add_plane(Vec3::ZERO, Vec3::Y, ground);
    builder.add_sphere(Vec3::new(0.0, 1.0, 0.0), 1.0, blue);
    builder.add_sphere(Vec3::new(-2.1, 1.0, 0.0), 1.0, mirror);
    builder.add_sphere(Vec3::new(2.1, 1.0, 0.0), 1.0, glass);
    builder.add_point_light(Vec3::new(0.0, 5.0, 3.0), Color::splat(30.0));

    builder.build()
}

/// One diffuse triangle in front of the camera and one point light.
pub fn single_triangle() -> Scene {
    let camera = Camera::perspective(Vec3::new(0.0, 0.0, 3.0), Vec3::ZERO, Vec3::Y, 45.0);
    let mut builder = Scene::builder().camera(camera);

    let white = builder.add_material(Material::diffuse(Color::ONE));
    builder.add_triangle(
        Vec3::new(-0.5, -0.5, 0.0),
        Vec3::new(0.5, -0.5, 0.0),
        Vec3::new(0.0, 0.5, 0.0),
        white,
    );
    builder.add_point_light(Vec3::new(0.0, 0.0, 2.0), Color::splat(4.0));

    builder.build()
}
