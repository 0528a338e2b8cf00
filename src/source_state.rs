//! Per-particle attribute distributions used when emitting new particles.

use glam::Vec3;

use crate::domain::Domain;
use crate::particle::Particle;
use crate::rng::Prng;

/// The set of domains and scalars a newly-created particle draws from,
/// everything but its position (which `Source`/`Vertex` supply directly).
#[derive(Clone)]
pub struct SourceState {
    pub up_dom: Domain,
    pub vel_dom: Domain,
    pub rvel_dom: Domain,
    pub size_dom: Domain,
    pub color_dom: Domain,
    pub alpha_dom: Domain,
    pub vertex_b_dom: Domain,
    /// When true, `posB` is copied from `pos` instead of sampled from `vertex_b_dom`.
    pub vertex_b_tracks_pos: bool,
    pub age_mean: f32,
    pub age_sigma: f32,
    pub mass: f32,
    pub data: u32,
}

impl Default for SourceState {
    fn default() -> Self {
        Self {
            up_dom: Domain::point(Vec3::Z),
            vel_dom: Domain::point(Vec3::ZERO),
            rvel_dom: Domain::point(Vec3::ZERO),
            size_dom: Domain::point(Vec3::ONE),
            color_dom: Domain::point(Vec3::ONE),
            alpha_dom: Domain::point(Vec3::ONE),
            vertex_b_dom: Domain::point(Vec3::ZERO),
            vertex_b_tracks_pos: true,
            age_mean: 0.0,
            age_sigma: 0.0,
            mass: 1.0,
            data: 0,
        }
    }
}

/// Builds one particle at `pos`, sampling every other field from `src`.
///
/// Field order matches `PASource_Impl` exactly: pos, up, vel, rvel, size,
/// color, alpha, posB, age, mass, data. `up_b`/`vel_b` are left at zero —
/// the original source never assigns them here.
pub fn emit_particle(pos: Vec3, src: &SourceState, rng: &mut Prng) -> Particle {
    let up = src.up_dom.generate(rng);
    let vel = src.vel_dom.generate(rng);
    let rvel = src.rvel_dom.generate(rng);
    let size = src.size_dom.generate(rng);
    let color = src.color_dom.generate(rng);
    let alpha = src.alpha_dom.generate(rng).x;
    let pos_b = if src.vertex_b_tracks_pos {
        pos
    } else {
        src.vertex_b_dom.generate(rng)
    };
    let age = src.age_mean + rng.normal(src.age_sigma);

    Particle {
        pos,
        pos_b,
        up,
        up_b: Vec3::ZERO,
        vel,
        vel_b: Vec3::ZERO,
        rvel,
        size,
        color,
        alpha,
        age,
        mass: src.mass,
        tmp0: 0.0,
        data: src.data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn up_b_and_vel_b_are_left_zero() {
        let mut rng = Prng::seed(11);
        let src = SourceState {
            up_dom: Domain::point(Vec3::new(1.0, 2.0, 3.0)),
            vel_dom: Domain::point(Vec3::new(4.0, 5.0, 6.0)),
            ..Default::default()
        };
        let p = emit_particle(Vec3::ZERO, &src, &mut rng);
        assert_eq!(p.up_b, Vec3::ZERO);
        assert_eq!(p.vel_b, Vec3::ZERO);
    }

    #[test]
    fn vertex_b_tracks_pos_copies_pos() {
        let mut rng = Prng::seed(12);
        let src = SourceState {
            vertex_b_tracks_pos: true,
            ..Default::default()
        };
        let pos = Vec3::new(7.0, 8.0, 9.0);
        let p = emit_particle(pos, &src, &mut rng);
        assert_eq!(p.pos_b, pos);
    }

    #[test]
    fn data_and_mass_are_copied_verbatim() {
        let mut rng = Prng::seed(13);
        let src = SourceState {
            mass: 2.5,
            data: 99,
            ..Default::default()
        };
        let p = emit_particle(Vec3::ZERO, &src, &mut rng);
        assert_eq!(p.mass, 2.5);
        assert_eq!(p.data, 99);
    }
}
