//! The action library: per-step particle mutations.
//!
//! A single tagged enum rather than a `dyn Action` trait object hierarchy —
//! the closed set of ~30 variants fits comfortably in one match, keeps every
//! action inlinable by value into an [`crate::action_list::ActionList`], and
//! avoids the original engine's heap-allocated polymorphic action records.

use glam::Vec3;

use crate::domain::Domain;
use crate::error::{EngineError, EngineResult};
use crate::group::ParticleGroup;
use crate::particle::Particle;
use crate::rng::Prng;

/// User callback for the `Callback` action: `(particle, user_data, dt)`.
pub type ParticleCallback = fn(&mut Particle, data: u64, dt: f32);

#[derive(Clone)]
pub enum Action {
    Source {
        rate: f32,
        position_dom: Domain,
        state: std::rc::Rc<crate::source_state::SourceState>,
    },
    Vertex {
        p: Vec3,
        state: std::rc::Rc<crate::source_state::SourceState>,
        data: u32,
    },
    Gravity {
        dir: Vec3,
    },
    OrbitPoint {
        center: Vec3,
        magnitude: f32,
        epsilon: f32,
        max_radius: f32,
    },
    OrbitLine {
        point: Vec3,
        axis: Vec3,
        magnitude: f32,
        epsilon: f32,
        max_radius: f32,
    },
    Explosion {
        center: Vec3,
        radius: f32,
        magnitude: f32,
        sigma: f32,
        epsilon: f32,
    },
    Vortex {
        tip: Vec3,
        axis: Vec3,
        tightness: f32,
        max_radius: f32,
        in_speed: f32,
        up_speed: f32,
        around_speed: f32,
    },
    Jet {
        shape_dom: Domain,
        accel_dom: Domain,
    },
    RandomAccel {
        dom: Domain,
    },
    RandomDisplace {
        dom: Domain,
    },
    RandomVelocity {
        dom: Domain,
    },
    RandomRotVelocity {
        dom: Domain,
    },
    Gravitate {
        magnitude: f32,
        epsilon: f32,
        max_radius: f32,
    },
    Follow {
        magnitude: f32,
        epsilon: f32,
        max_radius: f32,
    },
    MatchVelocity {
        magnitude: f32,
        epsilon: f32,
        max_radius: f32,
    },
    MatchRotVelocity {
        magnitude: f32,
        epsilon: f32,
        max_radius: f32,
    },
    Damping {
        damping: Vec3,
        v_low: f32,
        v_high: f32,
    },
    RotDamping {
        damping: Vec3,
        v_low: f32,
        v_high: f32,
    },
    SpeedClamp {
        min_speed: f32,
        max_speed: f32,
    },
    TargetColor {
        target: Vec3,
        scale: f32,
    },
    TargetSize {
        target: Vec3,
        scale: Vec3,
    },
    TargetVelocity {
        target: Vec3,
        scale: f32,
    },
    TargetRotVelocity {
        target: Vec3,
        scale: f32,
    },
    Avoid {
        dom: Domain,
        magnitude: f32,
        epsilon: f32,
        look_ahead: f32,
    },
    Bounce {
        friction: f32,
        resilience: f32,
        fric_min_vel: f32,
        dom: Domain,
    },
    Move {
        move_vel: bool,
        move_rvel: bool,
    },
    CopyVertexB {
        copy_pos: bool,
        copy_vel: bool,
    },
    Restore {
        time_left: f32,
        restore_pos: bool,
        restore_rot: bool,
    },
    KillOld {
        age_limit: f32,
        kill_less_than: bool,
    },
    Sink {
        kill_inside: bool,
        dom: Domain,
    },
    SinkVelocity {
        kill_inside: bool,
        vel_dom: Domain,
    },
    CommitKills,
    Callback {
        func: ParticleCallback,
        data: u64,
    },
    Sort {
        eye: Vec3,
        look: Vec3,
        front_to_back: bool,
        clamp_negative: bool,
    },
    CallActionList {
        id: usize,
    },
}

impl Action {
    /// O(n^2) and single-pass whole-array actions can't be split into
    /// cache-sized windows without changing their result.
    pub fn do_not_segment(&self) -> bool {
        matches!(
            self,
            Action::Source { .. }
                | Action::Follow { .. }
                | Action::Gravitate { .. }
                | Action::MatchVelocity { .. }
                | Action::MatchRotVelocity { .. }
                | Action::Sort { .. }
        )
    }

    pub fn kills_particles(&self) -> bool {
        matches!(
            self,
            Action::KillOld { .. }
                | Action::Sink { .. }
                | Action::SinkVelocity { .. }
                | Action::CommitKills
        )
    }

    /// Executes this action against `group.particles()[begin..end]`.
    ///
    /// `call_list` lets `CallActionList` recurse back into the owning
    /// context without this module depending on `Context` directly.
    pub fn execute(
        &self,
        group: &mut ParticleGroup,
        begin: usize,
        end: usize,
        dt: f32,
        rng: &mut Prng,
        call_list: &mut dyn FnMut(usize, &mut ParticleGroup, f32, &mut Prng) -> EngineResult<()>,
    ) -> EngineResult<()> {
        match self {
            Action::Source {
                rate,
                position_dom,
                state,
            } => {
                // No accumulator: exactly floor(rate*dt) plus one more with
                // probability frac(rate*dt), per call. Carrying a fractional
                // remainder across calls would double-count it in list mode,
                // where the same Action (and any Cell-based state) persists
                // across every `call_action_list`.
                let exact = rate * dt;
                let whole = exact.floor();
                let mut count = whole as i64;
                if rng.uniform() < (exact - whole) {
                    count += 1;
                }
                for _ in 0..count {
                    let pos = position_dom.generate(rng);
                    let p = crate::source_state::emit_particle(pos, state, rng);
                    if !group.add(p) {
                        break;
                    }
                }
                Ok(())
            }
            Action::Vertex { p, state, data } => {
                let mut particle = crate::source_state::emit_particle(*p, state, rng);
                particle.data = *data;
                group.add(particle);
                Ok(())
            }
            Action::Gravity { dir } => {
                for p in &mut group.particles_mut()[begin..end] {
                    p.vel += *dir * dt;
                }
                Ok(())
            }
            Action::OrbitPoint {
                center,
                magnitude,
                epsilon,
                max_radius,
            } => {
                for p in &mut group.particles_mut()[begin..end] {
                    let to_c = *center - p.pos;
                    let r_sqr = to_c.length_squared();
                    if r_sqr >= max_radius * max_radius {
                        continue;
                    }
                    let r = r_sqr.sqrt();
                    p.vel += to_c * (*magnitude * dt / (r * (r_sqr + epsilon)));
                }
                Ok(())
            }
            Action::OrbitLine {
                point,
                axis,
                magnitude,
                epsilon,
                max_radius,
            } => {
                let axis_n = axis.normalize();
                for p in &mut group.particles_mut()[begin..end] {
                    let rel = p.pos - *point;
                    let along = axis_n * axis_n.dot(rel);
                    let closest = *point + along;
                    let to_c = closest - p.pos;
                    let r_sqr = to_c.length_squared();
                    if r_sqr >= max_radius * max_radius {
                        continue;
                    }
                    let r = r_sqr.sqrt();
                    p.vel += to_c * (*magnitude * dt / (r * (r_sqr + epsilon)));
                }
                Ok(())
            }
            Action::Explosion {
                center,
                radius,
                magnitude,
                sigma,
                epsilon,
            } => {
                let scale1 = -0.5 / (sigma * sigma);
                let scale2 = (1.0 / (2.0 * std::f32::consts::PI).sqrt()) / sigma;
                for p in &mut group.particles_mut()[begin..end] {
                    let to_p = p.pos - *center;
                    let dist = to_p.length();
                    if dist < 1e-8 {
                        continue;
                    }
                    let x = radius - dist;
                    let g = (x * x * scale1).exp() * scale2;
                    let a = magnitude * g / (dist * dist + epsilon);
                    p.vel += (to_p / dist) * (a * dt);
                }
                Ok(())
            }
            Action::Vortex {
                tip,
                axis,
                tightness,
                max_radius,
                in_speed,
                up_speed,
                around_speed,
            } => {
                let len = axis.length();
                let axis_n = *axis / len;
                for p in &mut group.particles_mut()[begin..end] {
                    let rel = p.pos - *tip;
                    let along = axis_n.dot(rel);
                    let alpha = along / len;
                    if !(0.0..=1.0).contains(&alpha) {
                        continue;
                    }
                    let axial = axis_n * along;
                    let radial = rel - axial;
                    let r = radial.length();
                    if r >= *max_radius {
                        continue;
                    }
                    let silhouette_r = alpha.max(0.0).powf(*tightness) * max_radius;
                    // Direction from the particle to the nearest point on the
                    // axis (inward), not the outward radial direction.
                    let par_to_axis = if r > 1e-8 { -radial / r } else { Vec3::ZERO };
                    let dt_over_mass = dt / p.mass.max(1e-8);
                    if r > silhouette_r {
                        // Outside the cone silhouette: accelerate toward the
                        // axis. Not affected by 1/r^2.
                        p.vel += par_to_axis * (*in_speed * dt_over_mass);
                    } else {
                        // Inside the cone: velocity is replaced, not
                        // accumulated, to stop its inward travel.
                        let accel_up = axis_n * (*up_speed * dt_over_mass);
                        let rot_dir = axis_n.cross(par_to_axis);
                        let accel_around = rot_dir * (*around_speed * dt_over_mass);
                        p.vel = accel_up + accel_around;
                    }
                }
                Ok(())
            }
            Action::Jet {
                shape_dom,
                accel_dom,
            } => {
                for p in &mut group.particles_mut()[begin..end] {
                    if shape_dom.within(p.pos) {
                        p.vel += accel_dom.generate(rng) * dt;
                    }
                }
                Ok(())
            }
            Action::RandomAccel { dom } => {
                for p in &mut group.particles_mut()[begin..end] {
                    p.vel += dom.generate(rng) * dt;
                }
                Ok(())
            }
            Action::RandomDisplace { dom } => {
                for p in &mut group.particles_mut()[begin..end] {
                    p.pos += dom.generate(rng) * dt;
                }
                Ok(())
            }
            Action::RandomVelocity { dom } => {
                for p in &mut group.particles_mut()[begin..end] {
                    p.vel = dom.generate(rng);
                }
                Ok(())
            }
            Action::RandomRotVelocity { dom } => {
                for p in &mut group.particles_mut()[begin..end] {
                    p.rvel = dom.generate(rng);
                }
                Ok(())
            }
            Action::Gravitate {
                magnitude,
                epsilon,
                max_radius,
            } => {
                pairwise_force(group, begin, end, dt, *magnitude, *epsilon, *max_radius, true);
                Ok(())
            }
            Action::Follow {
                magnitude,
                epsilon,
                max_radius,
            } => {
                let snapshot: Vec<Particle> = group.particles()[begin..end].to_vec();
                let particles = &mut group.particles_mut()[begin..end];
                let n = snapshot.len();
                for i in 0..n {
                    if i + 1 >= n {
                        continue;
                    }
                    let to_other = snapshot[i + 1].pos - snapshot[i].pos;
                    let r_sqr = to_other.length_squared();
                    if r_sqr >= max_radius * max_radius || r_sqr < 1e-12 {
                        continue;
                    }
                    let r = r_sqr.sqrt();
                    particles[i].vel +=
                        to_other * (*magnitude * dt / (r * (r_sqr + epsilon)));
                }
                Ok(())
            }
            Action::MatchVelocity {
                magnitude,
                epsilon,
                max_radius,
            } => {
                match_field(group, begin, end, dt, *magnitude, *epsilon, *max_radius, false);
                Ok(())
            }
            Action::MatchRotVelocity {
                magnitude,
                epsilon,
                max_radius,
            } => {
                match_field(group, begin, end, dt, *magnitude, *epsilon, *max_radius, true);
                Ok(())
            }
            Action::Damping {
                damping,
                v_low,
                v_high,
            } => {
                for p in &mut group.particles_mut()[begin..end] {
                    let speed = p.vel.length();
                    if speed < *v_low || speed > *v_high {
                        continue;
                    }
                    p.vel = Vec3::new(
                        p.vel.x * (1.0 - (1.0 - damping.x) * dt),
                        p.vel.y * (1.0 - (1.0 - damping.y) * dt),
                        p.vel.z * (1.0 - (1.0 - damping.z) * dt),
                    );
                }
                Ok(())
            }
            Action::RotDamping {
                damping,
                v_low,
                v_high,
            } => {
                for p in &mut group.particles_mut()[begin..end] {
                    let speed = p.rvel.length();
                    if speed < *v_low || speed > *v_high {
                        continue;
                    }
                    p.rvel = Vec3::new(
                        p.rvel.x * (1.0 - (1.0 - damping.x) * dt),
                        p.rvel.y * (1.0 - (1.0 - damping.y) * dt),
                        p.rvel.z * (1.0 - (1.0 - damping.z) * dt),
                    );
                }
                Ok(())
            }
            Action::SpeedClamp { min_speed, max_speed } => {
                for p in &mut group.particles_mut()[begin..end] {
                    let speed = p.vel.length();
                    if speed < 1e-12 {
                        continue;
                    }
                    let clamped = speed.clamp(*min_speed, *max_speed);
                    if clamped != speed {
                        p.vel = p.vel * (clamped / speed);
                    }
                }
                Ok(())
            }
            Action::TargetColor { target, scale } => {
                for p in &mut group.particles_mut()[begin..end] {
                    p.color += (*target - p.color) * (*scale * dt);
                }
                Ok(())
            }
            Action::TargetSize { target, scale } => {
                for p in &mut group.particles_mut()[begin..end] {
                    let delta = *target - p.size;
                    p.size += Vec3::new(delta.x * scale.x, delta.y * scale.y, delta.z * scale.z) * dt;
                }
                Ok(())
            }
            Action::TargetVelocity { target, scale } => {
                for p in &mut group.particles_mut()[begin..end] {
                    p.vel += (*target - p.vel) * (*scale * dt);
                }
                Ok(())
            }
            Action::TargetRotVelocity { target, scale } => {
                for p in &mut group.particles_mut()[begin..end] {
                    p.rvel += (*target - p.rvel) * (*scale * dt);
                }
                Ok(())
            }
            Action::Avoid {
                dom,
                magnitude,
                epsilon,
                look_ahead,
            } => {
                for p in &mut group.particles_mut()[begin..end] {
                    avoid_one(p, dom, *magnitude, *epsilon, *look_ahead, dt)?;
                }
                Ok(())
            }
            Action::Bounce {
                friction,
                resilience,
                fric_min_vel,
                dom,
            } => {
                for p in &mut group.particles_mut()[begin..end] {
                    bounce_one(p, dom, *friction, *resilience, *fric_min_vel, dt)?;
                }
                Ok(())
            }
            Action::Move { move_vel, move_rvel } => {
                for p in &mut group.particles_mut()[begin..end] {
                    p.age += dt;
                    if *move_vel {
                        p.pos += p.vel * dt;
                    }
                    if *move_rvel {
                        p.up += p.rvel * dt;
                    }
                }
                Ok(())
            }
            Action::CopyVertexB { copy_pos, copy_vel } => {
                for p in &mut group.particles_mut()[begin..end] {
                    if *copy_pos {
                        p.pos_b = p.pos;
                        p.up_b = p.up;
                    }
                    if *copy_vel {
                        p.vel_b = p.vel;
                    }
                }
                Ok(())
            }
            Action::Restore {
                time_left,
                restore_pos,
                restore_rot,
            } => {
                for p in &mut group.particles_mut()[begin..end] {
                    restore_one(p, *time_left, *restore_pos, *restore_rot, dt);
                }
                Ok(())
            }
            Action::KillOld {
                age_limit,
                kill_less_than,
            } => {
                kill_where(group, begin, end, |p| {
                    if *kill_less_than {
                        p.age < *age_limit
                    } else {
                        p.age >= *age_limit
                    }
                });
                Ok(())
            }
            Action::Sink { kill_inside, dom } => {
                kill_where(group, begin, end, |p| dom.within(p.pos) == *kill_inside);
                Ok(())
            }
            Action::SinkVelocity { kill_inside, vel_dom } => {
                kill_where(group, begin, end, |p| vel_dom.within(p.vel) == *kill_inside);
                Ok(())
            }
            Action::CommitKills => {
                kill_where(group, begin, end, |p| p.tmp0 != 0.0);
                Ok(())
            }
            Action::Callback { func, data } => {
                for p in &mut group.particles_mut()[begin..end] {
                    func(p, *data, dt);
                }
                Ok(())
            }
            Action::Sort {
                eye,
                look,
                front_to_back,
                clamp_negative,
            } => {
                let sign = if *front_to_back { -1.0 } else { 1.0 };
                let look_n = look.normalize();
                for p in &mut group.particles_mut()[begin..end] {
                    let mut key = sign * (p.pos - *eye).dot(look_n);
                    if *clamp_negative {
                        key = key.max(0.0);
                    }
                    p.tmp0 = key;
                }
                group.particles_mut()[begin..end]
                    .sort_by(|a, b| a.tmp0.partial_cmp(&b.tmp0).unwrap());
                Ok(())
            }
            Action::CallActionList { id } => call_list(*id, group, dt, rng),
        }
    }
}

fn pairwise_force(
    group: &mut ParticleGroup,
    begin: usize,
    end: usize,
    dt: f32,
    magnitude: f32,
    epsilon: f32,
    max_radius: f32,
    extra_sqrt: bool,
) {
    let snapshot: Vec<Particle> = group.particles()[begin..end].to_vec();
    let n = snapshot.len();
    let particles = &mut group.particles_mut()[begin..end];
    let max_r_sqr = max_radius * max_radius;
    for i in 0..n {
        let mut accum = Vec3::ZERO;
        for j in 0..n {
            if i == j {
                continue;
            }
            let to_other = snapshot[j].pos - snapshot[i].pos;
            let r_sqr = to_other.length_squared();
            if r_sqr >= max_r_sqr || r_sqr < 1e-12 {
                continue;
            }
            let denom = if extra_sqrt {
                r_sqr.sqrt() * (r_sqr + epsilon)
            } else {
                r_sqr + epsilon
            };
            accum += to_other * (magnitude / denom);
        }
        particles[i].vel += accum * dt;
    }
}

/// MatchVelocity/MatchRotVelocity nudge toward the neighborhood-weighted
/// average field value. The weighting omits the extra `sqrt` factor that
/// `pairwise_force` applies for Gravitate/Follow — preserved intentionally.
fn match_field(
    group: &mut ParticleGroup,
    begin: usize,
    end: usize,
    dt: f32,
    magnitude: f32,
    epsilon: f32,
    max_radius: f32,
    rotational: bool,
) {
    let snapshot: Vec<Particle> = group.particles()[begin..end].to_vec();
    let n = snapshot.len();
    let particles = &mut group.particles_mut()[begin..end];
    let max_r_sqr = max_radius * max_radius;
    for i in 0..n {
        let mut weighted = Vec3::ZERO;
        let mut weight_sum = 0.0f32;
        for j in 0..n {
            if i == j {
                continue;
            }
            let r_sqr = (snapshot[j].pos - snapshot[i].pos).length_squared();
            if r_sqr >= max_r_sqr {
                continue;
            }
            let w = 1.0 / (r_sqr + epsilon);
            let field = if rotational { snapshot[j].rvel } else { snapshot[j].vel };
            weighted += field * w;
            weight_sum += w;
        }
        if weight_sum <= 0.0 {
            continue;
        }
        let avg = weighted / weight_sum;
        if rotational {
            particles[i].rvel += (avg - particles[i].rvel) * (magnitude * dt);
        } else {
            particles[i].vel += (avg - particles[i].vel) * (magnitude * dt);
        }
    }
}

fn kill_where(group: &mut ParticleGroup, begin: usize, end: usize, pred: impl Fn(&Particle) -> bool) {
    let mut i = end;
    while i > begin {
        i -= 1;
        if pred(&group.particles()[i]) {
            group.remove(i);
        }
    }
}

/// `vel += a + b` where `b` pulls toward the target over the remaining time
/// and `a` corrects for the velocity's own contribution, so position and
/// velocity both reach `target`/`0` smoothly as `time_left` runs out.
fn do_restore(vel: Vec3, target: Vec3, pos: Vec3, t: f32, tt_inv_6dt: f32, ttt_inv_3dt_sqr: f32) -> Vec3 {
    let b = (vel * -0.6667 * t + target - pos) * tt_inv_6dt;
    let a = (vel * t - target - target + pos + pos) * ttt_inv_3dt_sqr;
    vel + a + b
}

fn restore_one(p: &mut Particle, time_left: f32, restore_pos: bool, restore_rot: bool, dt: f32) {
    if time_left <= 0.0 {
        if restore_pos {
            p.pos = p.pos_b;
            p.vel = Vec3::ZERO;
        }
        if restore_rot {
            p.up = p.up_b;
            p.rvel = Vec3::ZERO;
        }
        return;
    }
    let t = time_left;
    let tt_inv_6dt = dt * 6.0 / (t * t);
    let ttt_inv_3dt_sqr = dt * dt * 3.0 / (t * t * t);
    if restore_pos {
        p.vel = do_restore(p.vel, p.pos_b, p.pos, t, tt_inv_6dt, ttt_inv_3dt_sqr);
    }
    if restore_rot {
        p.rvel = do_restore(p.rvel, p.up_b, p.up, t, tt_inv_6dt, ttt_inv_3dt_sqr);
    }
}

fn avoid_one(
    p: &mut Particle,
    dom: &Domain,
    magnitude: f32,
    epsilon: f32,
    look_ahead: f32,
    dt: f32,
) -> EngineResult<()> {
    let pnext = p.pos + p.vel * look_ahead;
    let (hit, normal, t) = match dom {
        Domain::Disc { p: cp, nrm, .. }
        | Domain::Plane { p: cp, nrm, .. }
        | Domain::Rectangle { p: cp, nrm, .. } => {
            plane_crossing(p.pos, pnext, *cp, *nrm).map(|t| (true, *nrm, t)).unwrap_or((false, Vec3::ZERO, 0.0))
        }
        Domain::Sphere { ctr, rad_out, .. } => {
            sphere_crossing(p.pos, pnext, *ctr, *rad_out)
        }
        Domain::Triangle { p: cp, nrm, .. } => {
            plane_crossing(p.pos, pnext, *cp, *nrm).map(|t| (true, *nrm, t)).unwrap_or((false, Vec3::ZERO, 0.0))
        }
        _ => {
            return Err(EngineError::NotImplemented(
                "Avoid is only implemented for Disc, Plane, Rectangle, Sphere, Triangle".into(),
            ))
        }
    };
    if !hit {
        return Ok(());
    }
    let speed = p.vel.length();
    if speed < 1e-12 {
        return Ok(());
    }
    let s = normal.normalize();
    let blended = (p.vel / speed) + s * (magnitude * dt / (t * t + epsilon));
    let len = blended.length();
    if len > 1e-12 {
        p.vel = (blended / len) * speed;
    }
    Ok(())
}

/// True when `da` and `db` (signed distances at the segment endpoints) bracket
/// zero, i.e. the segment crosses (or touches) the surface. Using a sign
/// product rather than `f32::signum` equality avoids `signum(0.0) == 1.0`
/// silently swallowing the exactly-touching case.
fn brackets_zero(da: f32, db: f32) -> bool {
    da * db <= 0.0 && (da != 0.0 || db != 0.0)
}

fn plane_crossing(a: Vec3, b: Vec3, p: Vec3, n: Vec3) -> Option<f32> {
    let da = (a - p).dot(n);
    let db = (b - p).dot(n);
    if !brackets_zero(da, db) {
        return None;
    }
    Some((a - b).length() * (da.abs() / (da - db).abs().max(1e-12)))
}

fn sphere_crossing(a: Vec3, b: Vec3, ctr: Vec3, rad: f32) -> (bool, Vec3, f32) {
    let da = (a - ctr).length() - rad;
    let db = (b - ctr).length() - rad;
    if !brackets_zero(da, db) {
        return (false, Vec3::ZERO, 0.0);
    }
    let n = (a - ctr).normalize();
    let t = (a - b).length() * (da.abs() / (da - db).abs().max(1e-12));
    (true, n, t)
}

/// Like [`sphere_crossing`] but also reports the signed distance at `a`, so
/// the caller can tell which side of the surface the particle started on.
fn sphere_crossing_signed(a: Vec3, b: Vec3, ctr: Vec3, rad: f32) -> (bool, Vec3, f32, f32) {
    let (hit, n, t) = sphere_crossing(a, b, ctr, rad);
    (hit, n, t, (a - ctr).length() - rad)
}

fn bounce_one(
    p: &mut Particle,
    dom: &Domain,
    friction: f32,
    resilience: f32,
    fric_min_vel: f32,
    dt: f32,
) -> EngineResult<()> {
    let pnext = p.pos + p.vel * dt;
    match dom {
        Domain::Box { p0, p1, .. } => {
            let mut normal = None;
            for (axis, lo, hi) in [
                (Vec3::X, p0.x, p1.x),
                (Vec3::Y, p0.y, p1.y),
                (Vec3::Z, p0.z, p1.z),
            ] {
                let coord = axis.dot(pnext);
                if coord < lo {
                    normal = Some(axis);
                } else if coord > hi {
                    normal = Some(-axis);
                }
            }
            if let Some(n) = normal {
                apply_bounce(p, n, friction, resilience, fric_min_vel);
            }
            Ok(())
        }
        Domain::Disc { p: cp, nrm, .. } | Domain::Plane { p: cp, nrm, .. } | Domain::Rectangle { p: cp, nrm, .. } => {
            if plane_crossing(p.pos, pnext, *cp, *nrm).is_some() {
                apply_bounce(p, *nrm, friction, resilience, fric_min_vel);
            }
            Ok(())
        }
        Domain::Triangle { p: cp, nrm, .. } => {
            if plane_crossing(p.pos, pnext, *cp, *nrm).is_some() {
                apply_bounce(p, *nrm, friction, resilience, fric_min_vel);
            }
            Ok(())
        }
        Domain::Sphere {
            ctr,
            rad_out,
            rad_in,
            thin_shell,
            ..
        } => {
            if !*thin_shell {
                return Err(EngineError::NotImplemented(
                    "Bounce against a thick Sphere shell is not supported".into(),
                ));
            }
            let _ = rad_in;
            let (hit, n, _, da) = sphere_crossing_signed(p.pos, pnext, *ctr, *rad_out);
            if hit {
                let was_outside = da >= 0.0;
                apply_bounce(p, n, friction, resilience, fric_min_vel);
                // The tangent-plane approximation above can leave the particle
                // on the wrong side of the surface for steep approach angles;
                // guarantee it lands just inside the correct side instead.
                let predicted = p.pos + p.vel * dt;
                let dist = (predicted - *ctr).length();
                let wrong_side = if was_outside {
                    dist < *rad_out
                } else {
                    dist > *rad_out
                };
                if wrong_side && (p.pos - *ctr).length() > 1e-8 {
                    let to_ctr = (p.pos - *ctr).normalize();
                    let sign = if was_outside { 1.0 } else { -1.0 };
                    let pwish = *ctr + to_ctr * (sign * 0.999 * *rad_out);
                    if dt > 1e-12 {
                        p.vel = (pwish - p.pos) / dt;
                    }
                }
            }
            Ok(())
        }
        _ => Err(EngineError::NotImplemented(format!(
            "Bounce is not implemented for this domain kind"
        ))),
    }
}

fn apply_bounce(p: &mut Particle, normal: Vec3, friction: f32, resilience: f32, fric_min_vel: f32) {
    let n = normal.normalize();
    let vn = n * n.dot(p.vel);
    let vt = p.vel - vn;
    let new_vt = if vt.length_squared() > fric_min_vel * fric_min_vel {
        vt * (1.0 - friction)
    } else {
        vt
    };
    p.vel = new_vt - vn * resilience;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::Prng;

    fn noop_call_list(
        _id: usize,
        _g: &mut ParticleGroup,
        _dt: f32,
        _rng: &mut Prng,
    ) -> EngineResult<()> {
        Ok(())
    }

    #[test]
    fn move_advances_position_and_age() {
        let mut g = ParticleGroup::new(1);
        let mut p = Particle::default();
        p.vel = Vec3::new(1.0, 0.0, 0.0);
        g.add(p);
        let mut rng = Prng::seed(1);
        Action::Move {
            move_vel: true,
            move_rvel: false,
        }
        .execute(&mut g, 0, 1, 2.0, &mut rng, &mut noop_call_list)
        .unwrap();
        assert_eq!(g.particles()[0].pos, Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(g.particles()[0].age, 2.0);
    }

    #[test]
    fn bounce_plane_negates_normal_component() {
        let mut g = ParticleGroup::new(1);
        let mut p = Particle::default();
        p.pos = Vec3::new(0.0, 0.0, 0.5);
        p.vel = Vec3::new(1.0, 0.0, -1.0);
        g.add(p);
        let mut rng = Prng::seed(1);
        let dom = Domain::plane(Vec3::ZERO, Vec3::Z);
        Action::Bounce {
            friction: 0.0,
            resilience: 1.0,
            fric_min_vel: 0.0,
            dom,
        }
        .execute(&mut g, 0, 1, 1.0, &mut rng, &mut noop_call_list)
        .unwrap();
        let v = g.particles()[0].vel;
        assert!((v.x - 1.0).abs() < 1e-5);
        assert!((v.z - 1.0).abs() < 1e-5);
    }

    #[test]
    fn kill_old_removes_only_past_limit() {
        let mut g = ParticleGroup::new(2);
        let mut young = Particle::default();
        young.age = 1.0;
        let mut old = Particle::default();
        old.age = 10.0;
        g.add(young);
        g.add(old);
        let mut rng = Prng::seed(1);
        Action::KillOld {
            age_limit: 5.0,
            kill_less_than: false,
        }
        .execute(&mut g, 0, 2, 0.1, &mut rng, &mut noop_call_list)
        .unwrap();
        assert_eq!(g.len(), 1);
        assert_eq!(g.particles()[0].age, 1.0);
    }

    #[test]
    fn sort_orders_by_projection() {
        let mut g = ParticleGroup::new(3);
        for x in [3.0, 1.0, 2.0] {
            let mut p = Particle::default();
            p.pos = Vec3::new(x, 0.0, 0.0);
            g.add(p);
        }
        let mut rng = Prng::seed(1);
        Action::Sort {
            eye: Vec3::ZERO,
            look: Vec3::X,
            front_to_back: false,
            clamp_negative: false,
        }
        .execute(&mut g, 0, 3, 0.1, &mut rng, &mut noop_call_list)
        .unwrap();
        let xs: Vec<f32> = g.particles().iter().map(|p| p.pos.x).collect();
        assert_eq!(xs, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn vortex_replaces_velocity_inside_silhouette() {
        let mut g = ParticleGroup::new(1);
        let mut p = Particle::default();
        // tip at origin, axis along +Y with length 10; particle halfway up
        // the axis (alongAxis = 0.5) and barely off-axis, well inside the
        // cone silhouette for tightness = 1, max_radius = 10.
        p.pos = Vec3::new(0.1, 5.0, 0.0);
        p.vel = Vec3::new(5.0, 5.0, 5.0);
        p.mass = 1.0;
        g.add(p);
        let mut rng = Prng::seed(1);
        Action::Vortex {
            tip: Vec3::ZERO,
            axis: Vec3::new(0.0, 10.0, 0.0),
            tightness: 1.0,
            max_radius: 10.0,
            in_speed: 0.0,
            up_speed: 2.0,
            around_speed: 3.0,
        }
        .execute(&mut g, 0, 1, 1.0, &mut rng, &mut noop_call_list)
        .unwrap();
        let v = g.particles()[0].vel;
        // Velocity is replaced (not blended with the old (5,5,5)): up
        // component from up_speed, around component from Cross(axisN, parToAxis).
        assert!((v.x - 0.0).abs() < 1e-4);
        assert!((v.y - 2.0).abs() < 1e-4);
        assert!((v.z - 3.0).abs() < 1e-4);
    }

    #[test]
    fn restore_pulls_toward_vertex_b_as_time_runs_out() {
        let mut g = ParticleGroup::new(1);
        let mut p = Particle::default();
        p.pos = Vec3::ZERO;
        p.pos_b = Vec3::new(10.0, 0.0, 0.0);
        p.vel = Vec3::ZERO;
        g.add(p);
        let mut rng = Prng::seed(1);
        // Integrate several steps with a shrinking time_left; position
        // should end up much closer to pos_b than it started.
        let dt = 0.1;
        let mut time_left = 2.0;
        while time_left > 0.0 {
            Action::Restore {
                time_left,
                restore_pos: true,
                restore_rot: false,
            }
            .execute(&mut g, 0, 1, dt, &mut rng, &mut noop_call_list)
            .unwrap();
            Action::Move {
                move_vel: true,
                move_rvel: false,
            }
            .execute(&mut g, 0, 1, dt, &mut rng, &mut noop_call_list)
            .unwrap();
            time_left -= dt;
        }
        let final_pos = g.particles()[0].pos;
        assert!(
            (final_pos - Vec3::new(10.0, 0.0, 0.0)).length() < 1.0,
            "expected to land near pos_b, got {final_pos:?}"
        );
    }
}
