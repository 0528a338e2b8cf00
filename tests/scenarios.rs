//! Scenario and invariant tests against the public `Context` API.

use particle_engine::{Context, Domain, EngineError, Vec3};

// ==== invariants ====================================================

#[test]
fn test_group_never_exceeds_capacity() {
    let mut ctx = Context::new();
    ctx.gen_particle_groups(1, 50).unwrap();
    ctx.set_current_group(0).unwrap();
    ctx.set_time_step(1.0);
    for _ in 0..200 {
        ctx.source(1000.0, Domain::point(Vec3::ZERO)).unwrap();
    }
    assert!(ctx.current_group_len().unwrap() <= 50);
    assert_eq!(ctx.current_group_len().unwrap(), 50);
}

#[test]
fn test_domain_generate_satisfies_within() {
    let mut ctx = Context::new();
    ctx.gen_particle_groups(1, 1).unwrap();
    ctx.set_current_group(0).unwrap();
    ctx.seed(99);

    let domains = vec![
        Domain::sphere(Vec3::new(3.0, -1.0, 2.0), 10.0, 0.0).unwrap(),
        Domain::bbox(Vec3::new(-5.0, -5.0, -5.0), Vec3::new(5.0, 5.0, 5.0)),
        Domain::disc(Vec3::ZERO, Vec3::Z, 4.0, 1.0).unwrap(),
    ];
    let mut rng = particle_engine::Prng::seed(1);
    for dom in &domains {
        let mut ok = 0;
        let trials = 5000;
        for _ in 0..trials {
            let p = dom.generate(&mut rng);
            if dom.within(p) {
                ok += 1;
            }
        }
        assert!(ok as f32 / trials as f32 > 0.99);
    }
}

#[test]
fn test_union_size_is_sum_of_components() {
    let a = Domain::sphere(Vec3::ZERO, 1.0, 1.0).unwrap();
    let b = Domain::sphere(Vec3::new(10.0, 0.0, 0.0), 2.0, 2.0).unwrap();
    let (sa, sb) = (a.size(), b.size());
    let u = Domain::union(vec![a, b]);
    assert!((u.size() - (sa + sb)).abs() < 1e-3);
}

#[test]
fn test_move_advances_position_velocity_and_age() {
    let mut ctx = Context::new();
    ctx.gen_particle_groups(1, 1).unwrap();
    ctx.set_current_group(0).unwrap();
    ctx.set_time_step(2.0);
    ctx.set_velocity(Domain::point(Vec3::new(1.0, 0.0, 0.0)));
    ctx.vertex(Vec3::ZERO, 0).unwrap();
    ctx.move_particles(true, false).unwrap();
    let p = &ctx.current_group_particles().unwrap()[0];
    assert_eq!(p.pos, Vec3::new(2.0, 0.0, 0.0));
    assert_eq!(p.age, 2.0);
}

#[test]
fn test_kill_old_removes_only_particles_past_limit() {
    let mut ctx = Context::new();
    ctx.gen_particle_groups(1, 10).unwrap();
    ctx.set_current_group(0).unwrap();
    ctx.set_time_step(1.0);
    for _ in 0..5 {
        ctx.source(1.0, Domain::point(Vec3::ZERO)).unwrap();
    }
    ctx.move_particles(false, false).unwrap(); // age += dt for everyone
    let before = ctx.current_group_len().unwrap();
    ctx.kill_old(0.5, false).unwrap();
    assert_eq!(before, 5);
    assert_eq!(ctx.current_group_len().unwrap(), 0);
}

// ==== scenarios ======================================================

#[test]
fn test_fountain_stays_above_sink_plane() {
    let mut ctx = Context::new();
    ctx.gen_particle_groups(1, 200_000).unwrap();
    ctx.set_current_group(0).unwrap();
    ctx.seed(1);
    ctx.set_time_step(1.0);

    ctx.set_velocity(Domain::cylinder(
        Vec3::new(0.0, -0.01, 0.35),
        Vec3::new(0.0, -0.01, 0.37),
        0.021,
        0.019,
    ).unwrap());

    let source_dom = Domain::line(Vec3::new(0.0, 0.0, 0.0), Vec3::new(0.0, 0.0, 0.405));
    let sink_plane = Domain::plane(Vec3::new(0.0, 0.0, -3.0), Vec3::Z);
    let bounce_disc = Domain::disc(Vec3::ZERO, Vec3::Z, 5.0, 0.0).unwrap();

    for _ in 0..2000 {
        ctx.source(1000.0, source_dom.clone()).unwrap();
        ctx.gravity(Vec3::new(0.0, 0.0, -0.01)).unwrap();
        ctx.bounce(-0.05, 0.35, 0.0, bounce_disc.clone()).unwrap();
        ctx.move_particles(true, false).unwrap();
        ctx.sink(false, sink_plane.clone()).unwrap();
    }
    assert!(ctx.current_group_len().unwrap() > 0);
    for p in ctx.current_group_particles().unwrap() {
        assert!(p.pos.z >= -3.0);
    }
}

#[test]
fn test_explosion_containment_with_bounding_sink() {
    let mut ctx = Context::new();
    ctx.gen_particle_groups(1, 20_000).unwrap();
    ctx.set_current_group(0).unwrap();
    ctx.seed(2);
    ctx.set_time_step(1.0);

    let start_dom = Domain::sphere(Vec3::ZERO, 1.0, 0.0).unwrap();
    let mut seed_rng = particle_engine::Prng::seed(3);
    for _ in 0..10_000 {
        ctx.vertex(start_dom.generate(&mut seed_rng), 0).unwrap();
    }

    let outer = Domain::sphere(Vec3::ZERO, 30.0, 0.0).unwrap();
    for step in 0..50 {
        let radius = step as f32 + 1.0;
        ctx.explosion(Vec3::ZERO, radius, 2.0, 3.0, 0.1).unwrap();
        ctx.move_particles(true, false).unwrap();
        ctx.sink(false, outer.clone()).unwrap();
    }

    for p in ctx.current_group_particles().unwrap() {
        assert!(p.pos.length() <= 30.0 + 1e-3);
    }
}

#[test]
fn test_sphere_bounce_reflects_radial_velocity() {
    let mut ctx = Context::new();
    ctx.gen_particle_groups(1, 1).unwrap();
    ctx.set_current_group(0).unwrap();
    ctx.set_time_step(1.0);
    ctx.set_velocity(Domain::point(Vec3::new(0.0, 0.0, -1.0)));
    ctx.vertex(Vec3::new(0.0, 0.0, 2.0), 0).unwrap();

    let sphere = Domain::sphere(Vec3::ZERO, 1.0, 1.0).unwrap();
    ctx.bounce(0.0, 1.0, 0.0, sphere).unwrap();

    let p = &ctx.current_group_particles().unwrap()[0];
    assert!(p.pos.z > 0.0, "Bounce must not move position, only velocity");
    assert!(p.vel.z > 0.0, "inbound radial velocity should reverse outward");
}

#[test]
fn test_union_weighting_favors_larger_component() {
    let mut rng = particle_engine::Prng::seed(5);
    let a = Domain::sphere(Vec3::new(-10.0, 0.0, 0.0), 1.0, 1.0).unwrap();
    let b = Domain::sphere(Vec3::new(10.0, 0.0, 0.0), 2.0, 2.0).unwrap();
    let u = Domain::union(vec![a, b]);
    let trials = 20_000;
    let mut in_b = 0;
    for _ in 0..trials {
        let p = u.generate(&mut rng);
        if p.x > 0.0 {
            in_b += 1;
        }
    }
    let frac = in_b as f32 / trials as f32;
    assert!((frac - 8.0 / 9.0).abs() < 0.05, "fraction in b was {frac}");
}

#[test]
fn test_list_mode_matches_immediate_mode_for_seeded_run() {
    let mut list_ctx = Context::new();
    list_ctx.gen_particle_groups(1, 5000).unwrap();
    list_ctx.set_current_group(0).unwrap();
    list_ctx.seed(42);
    list_ctx.set_time_step(0.1);
    list_ctx.gen_action_lists(1).unwrap();
    list_ctx.new_action_list(0).unwrap();
    list_ctx.source(20.0, Domain::point(Vec3::ZERO)).unwrap();
    list_ctx.gravity(Vec3::new(0.0, -1.0, 0.0)).unwrap();
    list_ctx.move_particles(true, false).unwrap();
    list_ctx.end_action_list().unwrap();
    for _ in 0..100 {
        list_ctx.call_action_list(0).unwrap();
    }

    let mut imm_ctx = Context::new();
    imm_ctx.gen_particle_groups(1, 5000).unwrap();
    imm_ctx.set_current_group(0).unwrap();
    imm_ctx.seed(42);
    imm_ctx.set_time_step(0.1);
    for _ in 0..100 {
        imm_ctx.source(20.0, Domain::point(Vec3::ZERO)).unwrap();
        imm_ctx.gravity(Vec3::new(0.0, -1.0, 0.0)).unwrap();
        imm_ctx.move_particles(true, false).unwrap();
    }

    assert_eq!(
        list_ctx.current_group_len().unwrap(),
        imm_ctx.current_group_len().unwrap()
    );
}

// ==== error taxonomy =================================================

#[test]
fn test_bad_handle_on_stale_group() {
    let mut ctx = Context::new();
    ctx.gen_particle_groups(1, 4).unwrap();
    ctx.delete_particle_groups(0, 1).unwrap();
    assert!(matches!(ctx.set_current_group(0), Err(EngineError::BadHandle(_))));
}

#[test]
fn test_negative_radius_is_invalid_value() {
    assert!(matches!(
        Domain::sphere(Vec3::ZERO, -1.0, 0.0),
        Err(EngineError::InvalidValue(_))
    ));
}

#[test]
fn test_bounce_against_thick_sphere_is_not_implemented() {
    let mut ctx = Context::new();
    ctx.gen_particle_groups(1, 1).unwrap();
    ctx.set_current_group(0).unwrap();
    ctx.set_time_step(1.0);
    ctx.vertex(Vec3::new(0.0, 0.0, 5.0), 0).unwrap();
    let shell = Domain::sphere(Vec3::ZERO, 5.0, 1.0).unwrap();
    let err = ctx.bounce(0.0, 1.0, 0.0, shell);
    assert!(matches!(err, Err(EngineError::NotImplemented(_))));
}
