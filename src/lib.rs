//! # particle-engine
//!
//! A CPU-resident, renderer-agnostic particle-system simulation core:
//! domains, per-step actions, and a cache-aware scheduler.
//!
//! ## Quick Start
//!
//! ```
//! use particle_engine::{Context, Domain, Vec3};
//!
//! let mut ctx = Context::new();
//! ctx.gen_particle_groups(1, 10_000).unwrap();
//! ctx.set_current_group(0).unwrap();
//! ctx.set_time_step(1.0 / 60.0);
//!
//! ctx.source(1000.0, Domain::point(Vec3::ZERO)).unwrap();
//! ctx.gravity(Vec3::new(0.0, -9.8, 0.0)).unwrap();
//! ctx.move_particles(true, false).unwrap();
//! ```
//!
//! ## Core concepts
//!
//! - **Domain** ([`Domain`]): a geometric shape used to sample points, test
//!   membership, and weight mixtures. Twelve variants from `Point` to `Union`.
//! - **Particle** ([`Particle`]): a fixed 128-byte record. Its layout is part
//!   of the public contract via [`group::ParticleGroup::raw_particles`].
//! - **Action** ([`Action`]): one step's worth of per-particle or whole-group
//!   mutation — forces, damping, boundary response, emission, death.
//! - **Context** ([`Context`]): owns every group and action list, and is the
//!   sole entry point for recording or immediately running actions.
//!
//! ## Execution modes
//!
//! Actions issued outside `new_action_list`/`end_action_list` run immediately
//! against the whole current group. Actions recorded into a list run later,
//! in order, via `call_action_list`, which segments contiguous segmentable
//! actions into cache-sized windows (see [`context`] module docs).

pub mod action;
pub mod action_list;
pub mod context;
pub mod domain;
pub mod error;
pub mod group;
pub mod particle;
pub mod rng;
pub mod source_state;

pub use action::{Action, ParticleCallback};
pub use action_list::{ActionList, Binding, BindingKind, CompiledFn};
pub use context::Context;
pub use domain::Domain;
pub use error::{EngineError, EngineResult};
pub use glam::Vec3;
pub use group::{BirthCallback, DeathCallback, ParticleGroup};
pub use particle::Particle;
pub use rng::Prng;
pub use source_state::SourceState;
