//! The domain library: ~12 geometric shapes used to sample points, test
//! membership, and weight mixtures.
//!
//! Represented as a single tagged enum rather than a class hierarchy with
//! virtual dispatch — this keeps every domain value inlinable by value into
//! action parameters and removes the downcasts the original engine's
//! per-action fast paths needed.

use glam::Vec3;
use std::f32::consts::PI;

use crate::error::{EngineError, EngineResult};
use crate::rng::Prng;

/// How close a point must be to a plane to count as "in" a 2-D surface domain.
pub const PLANAR_EPSILON: f32 = 1e-3;

#[derive(Clone, Debug)]
pub enum Domain {
    Point {
        p: Vec3,
    },
    Line {
        p0: Vec3,
        vec: Vec3,
        vec_nrm: Vec3,
        len: f32,
    },
    Triangle {
        p: Vec3,
        u: Vec3,
        v: Vec3,
        nrm: Vec3,
        s1: Vec3,
        s2: Vec3,
        d: f32,
        area: f32,
    },
    Rectangle {
        p: Vec3,
        u: Vec3,
        v: Vec3,
        nrm: Vec3,
        s1: Vec3,
        s2: Vec3,
        d: f32,
        area: f32,
    },
    Disc {
        p: Vec3,
        nrm: Vec3,
        u: Vec3,
        v: Vec3,
        rad_in: f32,
        rad_out: f32,
        rad_in_sqr: f32,
        rad_out_sqr: f32,
        dif: f32,
        d: f32,
    },
    Plane {
        p: Vec3,
        nrm: Vec3,
        d: f32,
    },
    Box {
        p0: Vec3,
        p1: Vec3,
        dif: Vec3,
    },
    Cylinder {
        apex: Vec3,
        axis: Vec3,
        u: Vec3,
        v: Vec3,
        rad_in: f32,
        rad_out: f32,
        rad_in_sqr: f32,
        rad_out_sqr: f32,
        rad_dif: f32,
        axis_len_inv_sqr: f32,
        vol: f32,
        thin_shell: bool,
    },
    Cone {
        apex: Vec3,
        axis: Vec3,
        u: Vec3,
        v: Vec3,
        rad_in: f32,
        rad_out: f32,
        rad_in_sqr: f32,
        rad_out_sqr: f32,
        rad_dif: f32,
        axis_len_inv_sqr: f32,
        vol: f32,
        thin_shell: bool,
    },
    Sphere {
        ctr: Vec3,
        rad_in: f32,
        rad_out: f32,
        rad_in_sqr: f32,
        rad_out_sqr: f32,
        rad_dif: f32,
        vol: f32,
        thin_shell: bool,
    },
    Blob {
        ctr: Vec3,
        stdev: f32,
        scale1: f32,
        scale2: f32,
    },
    Union {
        domains: Vec<Domain>,
        total_size: f32,
    },
}

/// Inverse matrix of a plane's (u, v) basis, used by `Triangle` and
/// `Rectangle` to turn a hit point back into (u, v) coordinates.
fn new_basis(u: Vec3, v: Vec3) -> (Vec3, Vec3) {
    let w = u.cross(v);
    let det = 1.0
        / (w.z * u.x * v.y - w.z * u.y * v.x - u.z * w.x * v.y - u.x * v.z * w.y
            + v.z * w.x * u.y
            + u.z * v.x * w.y);
    let s1 = Vec3::new(
        v.y * w.z - v.z * w.y,
        v.z * w.x - v.x * w.z,
        v.x * w.y - v.y * w.x,
    ) * det;
    let s2 = Vec3::new(
        u.y * w.z - u.z * w.y,
        u.z * w.x - u.x * w.z,
        u.x * w.y - u.y * w.x,
    ) * -det;
    (s1, s2)
}

/// A vector orthogonal to `n`, used to build an orthonormal frame for shapes
/// with a single axis (Disc, Cylinder, Cone).
fn orthonormal_frame(n: Vec3) -> (Vec3, Vec3) {
    let mut basis = Vec3::new(1.0, 0.0, 0.0);
    if basis.dot(n).abs() > 0.999 {
        basis = Vec3::new(0.0, 1.0, 0.0);
    }
    let u = (basis - n * basis.dot(n)).normalize();
    let v = n.cross(u);
    (u, v)
}

fn check_radii(r_out: f32, r_in: f32) -> EngineResult<()> {
    if r_in < 0.0 || r_out < 0.0 {
        return Err(EngineError::InvalidValue(
            "domain radius must be non-negative".into(),
        ));
    }
    Ok(())
}

impl Domain {
    pub fn point(p: Vec3) -> Self {
        Domain::Point { p }
    }

    pub fn line(p0: Vec3, p1: Vec3) -> Self {
        let vec = p1 - p0;
        let len = vec.length();
        Domain::Line {
            p0,
            vec,
            vec_nrm: vec.normalize(),
            len,
        }
    }

    pub fn triangle(p0: Vec3, p1: Vec3, p2: Vec3) -> Self {
        let u = p1 - p0;
        let v = p2 - p0;
        let u_len = u.length();
        let u_nrm = u / u_len;
        let nrm = u_nrm.cross((v / v.length())).normalize();
        let d = -p0.dot(nrm);
        let (s1, s2) = new_basis(u, v);
        let hgt = v - u_nrm * u_nrm.dot(v);
        let area = 0.5 * u_len * hgt.length();
        Domain::Triangle {
            p: p0,
            u,
            v,
            nrm,
            s1,
            s2,
            d,
            area,
        }
    }

    pub fn rectangle(p0: Vec3, u: Vec3, v: Vec3) -> Self {
        let u_len = u.length();
        let u_nrm = u / u_len;
        let nrm = u_nrm.cross((v / v.length())).normalize();
        let d = -p0.dot(nrm);
        let (s1, s2) = new_basis(u, v);
        let hgt = v - u_nrm * u_nrm.dot(v);
        let area = u_len * hgt.length();
        Domain::Rectangle {
            p: p0,
            u,
            v,
            nrm,
            s1,
            s2,
            d,
            area,
        }
    }

    pub fn disc(center: Vec3, normal: Vec3, r_out: f32, r_in: f32) -> EngineResult<Self> {
        check_radii(r_out, r_in)?;
        let (rad_out, rad_in) = if r_out > r_in { (r_out, r_in) } else { (r_in, r_out) };
        let nrm = normal.normalize();
        let (u, v) = orthonormal_frame(nrm);
        let d = -center.dot(nrm);
        Ok(Domain::Disc {
            p: center,
            nrm,
            u,
            v,
            rad_in,
            rad_out,
            rad_in_sqr: rad_in * rad_in,
            rad_out_sqr: rad_out * rad_out,
            dif: rad_out - rad_in,
            d,
        })
    }

    pub fn plane(p0: Vec3, normal: Vec3) -> Self {
        let nrm = normal.normalize();
        let d = -p0.dot(nrm);
        Domain::Plane { p: p0, nrm, d }
    }

    pub fn bbox(c0: Vec3, c1: Vec3) -> Self {
        let p0 = c0.min(c1);
        let p1 = c0.max(c1);
        Domain::Box {
            p0,
            p1,
            dif: p1 - p0,
        }
    }

    pub fn cylinder(p0: Vec3, p1: Vec3, r_out: f32, r_in: f32) -> EngineResult<Self> {
        check_radii(r_out, r_in)?;
        let (rad_out, rad_in) = if r_out < r_in { (r_in, r_out) } else { (r_out, r_in) };
        let axis = p1 - p0;
        let axis_len_sqr = axis.length_squared();
        let axis_len_inv_sqr = if axis_len_sqr != 0.0 { 1.0 / axis_len_sqr } else { 0.0 };
        let n = axis * axis_len_inv_sqr.sqrt();
        let (u, v) = orthonormal_frame(n);
        let thin_shell = rad_in == rad_out;
        let rad_out_sqr = rad_out * rad_out;
        let rad_in_sqr = rad_in * rad_in;
        let end_cap_area = PI * rad_out_sqr - PI * rad_in_sqr;
        let len = axis_len_sqr.sqrt();
        let vol = if thin_shell {
            len * 2.0 * PI * rad_out
        } else {
            end_cap_area * len
        };
        Ok(Domain::Cylinder {
            apex: p0,
            axis,
            u,
            v,
            rad_in,
            rad_out,
            rad_in_sqr,
            rad_out_sqr,
            rad_dif: rad_out - rad_in,
            axis_len_inv_sqr,
            vol,
            thin_shell,
        })
    }

    pub fn cone(apex: Vec3, base: Vec3, r_out: f32, r_in: f32) -> EngineResult<Self> {
        check_radii(r_out, r_in)?;
        let (rad_out, rad_in) = if r_out < r_in { (r_in, r_out) } else { (r_out, r_in) };
        let axis = base - apex;
        let axis_len_sqr = axis.length_squared();
        let axis_len_inv_sqr = if axis_len_sqr != 0.0 { 1.0 / axis_len_sqr } else { 0.0 };
        let n = axis * axis_len_inv_sqr.sqrt();
        let (u, v) = orthonormal_frame(n);
        let thin_shell = rad_in == rad_out;
        let rad_out_sqr = rad_out * rad_out;
        let rad_in_sqr = rad_in * rad_in;
        let len = axis_len_sqr.sqrt();
        let vol = if thin_shell {
            (axis_len_sqr + rad_out_sqr).sqrt() * PI * rad_out
        } else {
            let outer_vol = 0.333_333_34 * PI * rad_out_sqr * len;
            let inner_vol = 0.333_333_34 * PI * rad_in_sqr * len;
            outer_vol - inner_vol
        };
        Ok(Domain::Cone {
            apex,
            axis,
            u,
            v,
            rad_in,
            rad_out,
            rad_in_sqr,
            rad_out_sqr,
            rad_dif: rad_out - rad_in,
            axis_len_inv_sqr,
            vol,
            thin_shell,
        })
    }

    pub fn sphere(center: Vec3, r_out: f32, r_in: f32) -> EngineResult<Self> {
        check_radii(r_out, r_in)?;
        let (rad_out, rad_in) = if r_out < r_in { (r_in, r_out) } else { (r_out, r_in) };
        let thin_shell = rad_in == rad_out;
        let rad_out_sqr = rad_out * rad_out;
        let rad_in_sqr = rad_in * rad_in;
        let vol = if thin_shell {
            4.0 * PI * rad_out_sqr
        } else {
            let outer_vol = 1.333_333_3 * PI * rad_out_sqr * rad_out;
            let inner_vol = 1.333_333_3 * PI * rad_in_sqr * rad_in;
            outer_vol - inner_vol
        };
        Ok(Domain::Sphere {
            ctr: center,
            rad_in,
            rad_out,
            rad_in_sqr,
            rad_out_sqr,
            rad_dif: rad_out - rad_in,
            vol,
            thin_shell,
        })
    }

    pub fn blob(center: Vec3, stdev: f32) -> Self {
        let one_over_sigma = 1.0 / (stdev + 1e-12);
        Domain::Blob {
            ctr: center,
            stdev,
            scale1: -0.5 * one_over_sigma * one_over_sigma,
            scale2: (1.0 / (2.0 * PI).sqrt()) * one_over_sigma,
        }
    }

    pub fn union(domains: Vec<Domain>) -> Self {
        let total_size = domains.iter().map(Domain::size).sum();
        Domain::Union {
            domains,
            total_size,
        }
    }

    pub fn within(&self, pos: Vec3) -> bool {
        match self {
            Domain::Point { p } => *p == pos,
            Domain::Line { p0, vec_nrm, len, .. } => {
                let to = pos - *p0;
                let d = vec_nrm.dot(to);
                let dif = (d - to.length()).abs() / len;
                dif < 1e-7
            }
            Domain::Triangle { p, nrm, s1, s2, d, .. } => {
                let offset = pos - *p;
                let dist = offset.dot(*nrm);
                if dist > PLANAR_EPSILON {
                    return false;
                }
                let _ = d;
                let upos = offset.dot(*s1);
                let vpos = offset.dot(*s2);
                !(upos < 0.0 || vpos < 0.0 || (upos + vpos) > 1.0)
            }
            Domain::Rectangle { p, nrm, s1, s2, .. } => {
                let offset = pos - *p;
                let dist = offset.dot(*nrm);
                if dist > PLANAR_EPSILON {
                    return false;
                }
                let upos = offset.dot(*s1);
                let vpos = offset.dot(*s2);
                !(upos < 0.0 || upos > 1.0 || vpos < 0.0 || vpos > 1.0)
            }
            Domain::Disc {
                p,
                nrm,
                rad_in_sqr,
                rad_out_sqr,
                ..
            } => {
                let offset = pos - *p;
                if offset.dot(*nrm) > PLANAR_EPSILON {
                    return false;
                }
                let len = offset.length_squared();
                len >= *rad_in_sqr && len <= *rad_out_sqr
            }
            Domain::Plane { nrm, d, .. } => nrm.dot(pos) >= -*d,
            Domain::Box { p0, p1, .. } => {
                !(pos.x < p0.x
                    || pos.x > p1.x
                    || pos.y < p0.y
                    || pos.y > p1.y
                    || pos.z < p0.z
                    || pos.z > p1.z)
            }
            Domain::Cylinder {
                apex,
                axis,
                rad_in_sqr,
                rad_out_sqr,
                axis_len_inv_sqr,
                ..
            } => {
                let x = pos - *apex;
                let dist = axis.dot(x) * axis_len_inv_sqr;
                if !(0.0..=1.0).contains(&dist) {
                    return false;
                }
                let xrad = x - *axis * dist;
                let r_sqr = xrad.length_squared();
                r_sqr >= *rad_in_sqr && r_sqr <= *rad_out_sqr
            }
            Domain::Cone {
                apex,
                axis,
                rad_in,
                rad_out,
                axis_len_inv_sqr,
                ..
            } => {
                let x = pos - *apex;
                let dist = axis.dot(x) * axis_len_inv_sqr;
                if !(0.0..=1.0).contains(&dist) {
                    return false;
                }
                let xrad = x - *axis * dist;
                let r_sqr = xrad.length_squared();
                r_sqr >= (dist * rad_in).powi(2) && r_sqr <= (dist * rad_out).powi(2)
            }
            Domain::Sphere {
                ctr,
                rad_in_sqr,
                rad_out_sqr,
                ..
            } => {
                let r_sqr = (pos - *ctr).length_squared();
                r_sqr <= *rad_out_sqr && r_sqr >= *rad_in_sqr
            }
            Domain::Blob { ctr, scale1, scale2, .. } => {
                // Callers needing determinism should treat Within as a property
                // test, not a sampler; it consumes no engine-owned RNG here.
                let x = pos - *ctr;
                let gx = (x.length_squared() * scale1).exp() * scale2;
                gx >= 1.0
            }
            Domain::Union { domains, .. } => domains.iter().any(|d| d.within(pos)),
        }
    }

    /// Probabilistic membership test for domains (currently only `Blob`) whose
    /// `within` is defined as "true with probability proportional to density".
    /// `within` above returns the deterministic threshold form; actions that
    /// need the stochastic form call this instead.
    pub fn within_stochastic(&self, pos: Vec3, rng: &mut Prng) -> bool {
        match self {
            Domain::Blob { ctr, scale1, scale2, .. } => {
                let x = pos - *ctr;
                let gx = (x.length_squared() * scale1).exp() * scale2;
                rng.uniform() < gx
            }
            _ => self.within(pos),
        }
    }

    pub fn generate(&self, rng: &mut Prng) -> Vec3 {
        match self {
            Domain::Point { p } => *p,
            Domain::Line { p0, vec, .. } => *p0 + *vec * rng.uniform(),
            Domain::Triangle { p, u, v, .. } => {
                let r1 = rng.uniform();
                let r2 = rng.uniform();
                if r1 + r2 < 1.0 {
                    *p + *u * r1 + *v * r2
                } else {
                    *p + *u * (1.0 - r1) + *v * (1.0 - r2)
                }
            }
            Domain::Rectangle { p, u, v, .. } => *p + *u * rng.uniform() + *v * rng.uniform(),
            Domain::Disc { p, u, v, rad_in, dif, .. } => {
                let theta = rng.uniform() * 2.0 * PI;
                let r = rad_in + rng.uniform() * dif;
                *p + *u * (r * theta.cos()) + *v * (r * theta.sin())
            }
            Domain::Plane { p, .. } => *p,
            Domain::Box { p0, dif, .. } => *p0 + rng.uniform_vec3() * *dif,
            Domain::Cylinder {
                apex,
                axis,
                u,
                v,
                rad_in,
                rad_dif,
                ..
            } => {
                let dist = rng.uniform();
                let theta = rng.uniform() * 2.0 * PI;
                let r = rad_in + rng.uniform() * rad_dif;
                *apex + *axis * dist + *u * (r * theta.cos()) + *v * (r * theta.sin())
            }
            Domain::Cone {
                apex,
                axis,
                u,
                v,
                rad_in,
                rad_dif,
                ..
            } => {
                let dist = rng.uniform();
                let theta = rng.uniform() * 2.0 * PI;
                let r = rad_in + rng.uniform() * rad_dif;
                let x = r * theta.cos() * dist;
                let y = r * theta.sin() * dist;
                *apex + *axis * dist + *u * x + *v * y
            }
            Domain::Sphere {
                ctr,
                rad_in,
                rad_out,
                rad_dif,
                thin_shell,
                ..
            } => {
                let mut pos;
                loop {
                    pos = rng.uniform_vec3() - Vec3::splat(0.5);
                    if pos.length_squared() <= 0.25 {
                        break;
                    }
                }
                let pos = pos.normalize();
                if *thin_shell {
                    *ctr + pos * *rad_out
                } else {
                    *ctr + pos * (rad_in + rng.uniform() * rad_dif)
                }
            }
            Domain::Blob { ctr, stdev, .. } => *ctr + rng.normal_vec3(*stdev),
            Domain::Union { domains, total_size } => {
                let choose = rng.uniform() * total_size;
                let mut past = 0.0;
                for d in domains {
                    past += d.size();
                    if choose <= past {
                        return d.generate(rng);
                    }
                }
                // Floating-point rounding can leave `choose` a hair above the
                // running sum; fall back to the last domain.
                domains.last().map(|d| d.generate(rng)).unwrap_or(Vec3::ZERO)
            }
        }
    }

    pub fn size(&self) -> f32 {
        match self {
            Domain::Point { .. } => 1.0,
            Domain::Line { len, .. } => *len,
            Domain::Triangle { area, .. } => *area,
            Domain::Rectangle { area, .. } => *area,
            Domain::Disc { dif, rad_out, rad_out_sqr, rad_in_sqr, .. } => {
                if *dif == 0.0 {
                    2.0 * PI * rad_out
                } else {
                    PI * rad_out_sqr - PI * rad_in_sqr
                }
            }
            Domain::Plane { .. } => 1.0,
            Domain::Box { dif, .. } => dif.x * dif.y * dif.z,
            Domain::Cylinder { vol, .. } => *vol,
            Domain::Cone { vol, .. } => *vol,
            Domain::Sphere { vol, .. } => *vol,
            Domain::Blob { .. } => 1.0,
            Domain::Union { total_size, .. } => *total_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_size_is_sum_of_parts() {
        let a = Domain::sphere(Vec3::ZERO, 1.0, 1.0).unwrap();
        let b = Domain::sphere(Vec3::new(5.0, 0.0, 0.0), 2.0, 2.0).unwrap();
        let asz = a.size();
        let bsz = b.size();
        let u = Domain::union(vec![a, b]);
        assert!((u.size() - (asz + bsz)).abs() < 1e-4);
    }

    #[test]
    fn negative_radius_rejected() {
        assert!(Domain::sphere(Vec3::ZERO, -1.0, 0.0).is_err());
        assert!(Domain::disc(Vec3::ZERO, Vec3::Z, -1.0, 0.0).is_err());
    }

    #[test]
    fn box_sorts_corners() {
        let d = Domain::bbox(Vec3::new(1.0, 1.0, 1.0), Vec3::new(-1.0, -1.0, -1.0));
        assert!(d.within(Vec3::ZERO));
        assert!(!d.within(Vec3::new(2.0, 0.0, 0.0)));
    }

    #[test]
    fn domain_round_trip_sphere() {
        let mut rng = Prng::seed(3);
        let d = Domain::sphere(Vec3::new(1.0, -2.0, 3.0), 10.0, 4.0).unwrap();
        let mut ok = 0;
        let trials = 20_000;
        for _ in 0..trials {
            let p = d.generate(&mut rng);
            if d.within(p) {
                ok += 1;
            }
        }
        assert!(ok as f32 / trials as f32 > 0.999);
    }

    #[test]
    fn thin_shell_flag_switches_size_to_area() {
        let thick = Domain::sphere(Vec3::ZERO, 2.0, 1.0).unwrap();
        let thin = Domain::sphere(Vec3::ZERO, 2.0, 2.0).unwrap();
        // Thin shell surface area (4*pi*r^2) is far less than thick shell volume
        // difference for these radii only incidentally; check the branch directly.
        match thin {
            Domain::Sphere { thin_shell, .. } => assert!(thin_shell),
            _ => unreachable!(),
        }
        match thick {
            Domain::Sphere { thin_shell, .. } => assert!(!thin_shell),
            _ => unreachable!(),
        }
    }
}
