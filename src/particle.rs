//! The fixed particle record.
//!
//! Layout is part of the public contract via [`crate::group::ParticleGroup::raw_particles`]:
//! `color` must stay immediately before `alpha` so a 4-float RGBA read is
//! valid, and the record's overall size is asserted at compile time.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

/// One particle. 128 bytes, `repr(C)`, `Pod`-safe for raw vertex-array access.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Particle {
    pub pos: Vec3,
    pub pos_b: Vec3,
    pub up: Vec3,
    pub up_b: Vec3,
    pub vel: Vec3,
    pub vel_b: Vec3,
    pub rvel: Vec3,
    pub size: Vec3,
    pub color: Vec3,
    pub alpha: f32,
    pub age: f32,
    pub mass: f32,
    /// Scratch: `Sort` writes its key here; `CommitKills` reads it as a
    /// boolean-as-float kill flag. The two uses never overlap within one list.
    pub tmp0: f32,
    pub data: u32,
}

const _: () = assert!(std::mem::size_of::<Particle>() == 128);

impl Default for Particle {
    fn default() -> Self {
        Zeroable::zeroed()
    }
}
