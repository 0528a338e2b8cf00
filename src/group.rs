//! A capacity-bounded store of particles plus birth/death callbacks.

use crate::particle::Particle;

/// Invoked once per particle, in list order, whenever it is added or removed.
pub type BirthCallback = fn(&mut Particle, data: u64);
pub type DeathCallback = fn(&mut Particle, data: u64);

pub struct ParticleGroup {
    particles: Vec<Particle>,
    capacity: usize,
    birth_callback: Option<(BirthCallback, u64)>,
    death_callback: Option<(DeathCallback, u64)>,
}

impl ParticleGroup {
    pub fn new(capacity: usize) -> Self {
        Self {
            particles: Vec::with_capacity(capacity),
            capacity,
            birth_callback: None,
            death_callback: None,
        }
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn particles_mut(&mut self) -> &mut [Particle] {
        &mut self.particles
    }

    /// Raw byte view for a compiled kernel or GPU upload; `Particle` is `Pod`.
    pub fn raw_particles(&self) -> &[u8] {
        bytemuck::cast_slice(&self.particles)
    }

    pub fn set_birth_callback(&mut self, cb: BirthCallback, data: u64) {
        self.birth_callback = Some((cb, data));
    }

    pub fn set_death_callback(&mut self, cb: DeathCallback, data: u64) {
        self.death_callback = Some((cb, data));
    }

    pub fn clear_birth_callback(&mut self) {
        self.birth_callback = None;
    }

    pub fn clear_death_callback(&mut self) {
        self.death_callback = None;
    }

    /// Appends a particle if there is spare capacity, firing the birth
    /// callback. Returns `false` (and drops the particle) if the group is full.
    pub fn add(&mut self, mut p: Particle) -> bool {
        if self.particles.len() >= self.capacity {
            return false;
        }
        if let Some((cb, data)) = self.birth_callback {
            cb(&mut p, data);
        }
        self.particles.push(p);
        true
    }

    /// Removes the particle at `idx` by swapping in the last particle,
    /// firing the death callback on the removed one first.
    pub fn remove(&mut self, idx: usize) {
        if idx >= self.particles.len() {
            return;
        }
        if let Some((cb, data)) = self.death_callback {
            cb(&mut self.particles[idx], data);
        }
        self.particles.swap_remove(idx);
    }

    /// Removes every particle from `start` to the end of the list, firing
    /// death callbacks in list order before truncating. Mirrors
    /// `ParticleGroup::RemoveRange`'s trailing-range-only contract.
    pub fn remove_range_from(&mut self, start: usize) {
        if start >= self.particles.len() {
            return;
        }
        if let Some((cb, data)) = self.death_callback {
            for p in &mut self.particles[start..] {
                cb(p, data);
            }
        }
        self.particles.truncate(start);
    }

    /// Shrinks capacity, firing death callbacks on any particles evicted
    /// from the tail.
    pub fn set_max_particles(&mut self, cap: usize) {
        self.capacity = cap;
        if self.particles.len() > cap {
            self.remove_range_from(cap);
        }
    }
}

impl Drop for ParticleGroup {
    fn drop(&mut self) {
        if let Some((cb, data)) = self.death_callback {
            for p in &mut self.particles {
                cb(p, data);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_respects_capacity() {
        let mut g = ParticleGroup::new(2);
        assert!(g.add(Particle::default()));
        assert!(g.add(Particle::default()));
        assert!(!g.add(Particle::default()));
        assert_eq!(g.len(), 2);
    }

    #[test]
    fn remove_is_swap_with_last() {
        let mut g = ParticleGroup::new(4);
        for i in 0..3 {
            let mut p = Particle::default();
            p.data = i;
            g.add(p);
        }
        g.remove(0);
        assert_eq!(g.len(), 2);
        assert_eq!(g.particles()[0].data, 2);
        assert_eq!(g.particles()[1].data, 1);
    }

    #[test]
    fn death_callback_fires_on_drop() {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNT: AtomicU64 = AtomicU64::new(0);
        fn on_death(_p: &mut Particle, _data: u64) {
            COUNT.fetch_add(1, Ordering::SeqCst);
        }
        {
            let mut g = ParticleGroup::new(4);
            g.set_death_callback(on_death, 0);
            g.add(Particle::default());
            g.add(Particle::default());
        }
        assert_eq!(COUNT.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn set_max_particles_evicts_tail() {
        let mut g = ParticleGroup::new(4);
        for _ in 0..4 {
            g.add(Particle::default());
        }
        g.set_max_particles(2);
        assert_eq!(g.len(), 2);
        assert_eq!(g.capacity(), 2);
    }
}
