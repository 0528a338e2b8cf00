//! The engine entry point: owns groups and lists, and runs the scheduler.

use std::rc::Rc;

use glam::Vec3;

use crate::action::{Action, ParticleCallback};
use crate::action_list::{ActionList, Binding, BindingKind, CompiledFn};
use crate::domain::Domain;
use crate::error::{EngineError, EngineResult};
use crate::group::{BirthCallback, DeathCallback, ParticleGroup};
use crate::rng::Prng;
use crate::source_state::SourceState;

/// `0x40000` bytes of particles, matching the original engine's default
/// working-set size exactly rather than picking a round particle count.
const DEFAULT_WORKING_SET_BYTES: usize = 0x40000;

pub struct Context {
    groups: Vec<Option<ParticleGroup>>,
    lists: Vec<Option<ActionList>>,
    current_group: Option<usize>,
    current_list: Option<usize>,
    dt: f32,
    rng: Prng,
    working_set_particles: usize,
    source_state: SourceState,
    /// Set while `new_action_list` is recording and not yet `end_action_list`ed.
    in_new_list: bool,
    /// Set while executing an action list reached via `call_action_list`
    /// from within another list's recording — mirrors the source's
    /// recursive-recording guard.
    in_call_list: bool,
}

impl Context {
    pub fn new() -> Self {
        Self {
            groups: Vec::new(),
            lists: Vec::new(),
            current_group: None,
            current_list: None,
            dt: 1.0,
            rng: Prng::seed(0),
            working_set_particles: (DEFAULT_WORKING_SET_BYTES
                / std::mem::size_of::<crate::particle::Particle>())
            .max(1),
            source_state: SourceState::default(),
            in_new_list: false,
            in_call_list: false,
        }
    }

    pub fn seed(&mut self, seed: u32) {
        self.rng = Prng::seed(seed);
    }

    pub fn set_time_step(&mut self, dt: f32) {
        self.dt = dt;
    }

    pub fn get_time_step(&self) -> f32 {
        self.dt
    }

    pub fn set_working_set_size(&mut self, bytes: usize) {
        self.working_set_particles =
            (bytes / std::mem::size_of::<crate::particle::Particle>()).max(1);
    }

    // ---- groups ----------------------------------------------------

    pub fn gen_particle_groups(&mut self, count: usize, capacity: usize) -> EngineResult<usize> {
        let first = self.groups.len();
        for _ in 0..count {
            self.groups.push(Some(ParticleGroup::new(capacity)));
        }
        Ok(first)
    }

    pub fn set_current_group(&mut self, id: usize) -> EngineResult<()> {
        self.group_ref(id)?;
        self.current_group = Some(id);
        Ok(())
    }

    pub fn delete_particle_groups(&mut self, id: usize, count: usize) -> EngineResult<()> {
        for i in id..id + count {
            let slot = self
                .groups
                .get_mut(i)
                .ok_or_else(|| EngineError::BadHandle(format!("group {i} out of range")))?;
            *slot = None;
        }
        if self.current_group.map(|c| (id..id + count).contains(&c)) == Some(true) {
            self.current_group = None;
        }
        Ok(())
    }

    pub fn get_group_count(&self) -> usize {
        self.groups.iter().filter(|g| g.is_some()).count()
    }

    pub fn get_max_particles(&self) -> EngineResult<usize> {
        Ok(self.current_group()?.capacity())
    }

    pub fn current_group_len(&self) -> EngineResult<usize> {
        Ok(self.current_group()?.len())
    }

    /// Borrows the current group's particles directly. A simplified,
    /// safe stand-in for `get_particles`/`get_particle_pointer`'s bulk
    /// attribute-channel copy, sufficient for read-only inspection; callers
    /// needing a raw stride-and-offset view should use
    /// [`ParticleGroup::raw_particles`] instead.
    pub fn current_group_particles(&self) -> EngineResult<&[crate::particle::Particle]> {
        Ok(self.current_group()?.particles())
    }

    pub fn set_max_particles(&mut self, cap: usize) -> EngineResult<()> {
        self.current_group_mut()?.set_max_particles(cap);
        Ok(())
    }

    pub fn copy_group(&mut self, src_id: usize, start: usize, count: usize) -> EngineResult<()> {
        let current = self
            .current_group
            .ok_or_else(|| EngineError::WrongMode("no current group set".into()))?;
        if src_id == current {
            return Err(EngineError::InvalidValue(
                "copy_group source and destination must differ".into(),
            ));
        }
        let src_particles: Vec<_> = {
            let src = self.group_ref(src_id)?;
            let end = (start + count).min(src.len());
            if start >= end {
                Vec::new()
            } else {
                src.particles()[start..end].to_vec()
            }
        };
        let dst = self.current_group_mut()?;
        for p in src_particles {
            dst.add(p);
        }
        Ok(())
    }

    pub fn birth_callback(&mut self, cb: BirthCallback, data: u64) -> EngineResult<()> {
        self.current_group_mut()?.set_birth_callback(cb, data);
        Ok(())
    }

    pub fn death_callback(&mut self, cb: DeathCallback, data: u64) -> EngineResult<()> {
        self.current_group_mut()?.set_death_callback(cb, data);
        Ok(())
    }

    fn group_ref(&self, id: usize) -> EngineResult<&ParticleGroup> {
        self.groups
            .get(id)
            .and_then(|g| g.as_ref())
            .ok_or_else(|| EngineError::BadHandle(format!("group {id} is invalid or deleted")))
    }

    fn current_group(&self) -> EngineResult<&ParticleGroup> {
        let id = self
            .current_group
            .ok_or_else(|| EngineError::WrongMode("no current group set".into()))?;
        self.group_ref(id)
    }

    fn current_group_mut(&mut self) -> EngineResult<&mut ParticleGroup> {
        let id = self
            .current_group
            .ok_or_else(|| EngineError::WrongMode("no current group set".into()))?;
        self.groups
            .get_mut(id)
            .and_then(|g| g.as_mut())
            .ok_or_else(|| EngineError::BadHandle(format!("group {id} is invalid or deleted")))
    }

    // ---- action lists ------------------------------------------------

    pub fn gen_action_lists(&mut self, count: usize) -> EngineResult<usize> {
        let first = self.lists.len();
        for _ in 0..count {
            self.lists.push(Some(ActionList::new()));
        }
        Ok(first)
    }

    pub fn new_action_list(&mut self, id: usize) -> EngineResult<()> {
        if self.in_new_list {
            return Err(EngineError::WrongMode(
                "new_action_list called while already recording".into(),
            ));
        }
        self.list_ref(id)?;
        self.current_list = Some(id);
        self.in_new_list = true;
        Ok(())
    }

    pub fn end_action_list(&mut self) -> EngineResult<()> {
        if !self.in_new_list {
            return Err(EngineError::WrongMode(
                "end_action_list called while not recording".into(),
            ));
        }
        self.in_new_list = false;
        self.current_list = None;
        Ok(())
    }

    pub fn delete_action_lists(&mut self, id: usize, count: usize) -> EngineResult<()> {
        for i in id..id + count {
            let slot = self
                .lists
                .get_mut(i)
                .ok_or_else(|| EngineError::BadHandle(format!("list {i} out of range")))?;
            *slot = None;
        }
        Ok(())
    }

    pub fn bind_emitted_action_list(
        &mut self,
        id: usize,
        func: Option<CompiledFn>,
        kind: BindingKind,
    ) -> EngineResult<()> {
        let list = self.list_mut(id)?;
        list.binding = match (kind, func) {
            (BindingKind::Internal, _) => Binding::default(),
            (k, Some(f)) => Binding {
                kind: k,
                func: Some(f),
            },
            (_, None) => {
                return Err(EngineError::InvalidValue(
                    "a non-Internal binding requires a function pointer".into(),
                ))
            }
        };
        Ok(())
    }

    fn list_ref(&self, id: usize) -> EngineResult<&ActionList> {
        self.lists
            .get(id)
            .and_then(|l| l.as_ref())
            .ok_or_else(|| EngineError::BadHandle(format!("list {id} is invalid or deleted")))
    }

    fn list_mut(&mut self, id: usize) -> EngineResult<&mut ActionList> {
        self.lists
            .get_mut(id)
            .and_then(|l| l.as_mut())
            .ok_or_else(|| EngineError::BadHandle(format!("list {id} is invalid or deleted")))
    }

    /// Appends a recursive-call action if currently recording another list,
    /// otherwise executes `id` against the current group immediately.
    pub fn call_action_list(&mut self, id: usize) -> EngineResult<()> {
        self.list_ref(id)?;
        if self.in_new_list {
            self.issue(Action::CallActionList { id })
        } else {
            let group = self
                .current_group
                .ok_or_else(|| EngineError::WrongMode("no current group set".into()))?;
            self.in_call_list = true;
            let result = self.run_list_by_id(id, group);
            self.in_call_list = false;
            result
        }
    }

    /// Runs `id` through the Internal (segmented) scheduler even if it is
    /// bound to a compiled function: the binding is temporarily taken out
    /// and restored afterwards, per the mode-transition contract for bound
    /// lists.
    pub fn call_action_list_internal(&mut self, id: usize) -> EngineResult<()> {
        self.list_ref(id)?;
        if self.in_new_list {
            return self.issue(Action::CallActionList { id });
        }
        let group_id = self
            .current_group
            .ok_or_else(|| EngineError::WrongMode("no current group set".into()))?;
        let saved = self.list_mut(id)?.take_binding();
        self.in_call_list = true;
        let result = self.run_list_by_id(id, group_id);
        self.in_call_list = false;
        if let Ok(list) = self.list_mut(id) {
            list.rebind(saved);
        }
        result
    }

    fn run_list_by_id(&mut self, id: usize, group_id: usize) -> EngineResult<()> {
        let dt = self.dt;
        let working_set = self.working_set_particles;
        let lists = std::mem::take(&mut self.lists);
        let group = self
            .groups
            .get_mut(group_id)
            .and_then(|g| g.as_mut())
            .ok_or_else(|| EngineError::BadHandle(format!("group {group_id} is invalid or deleted")));
        let result = match group {
            Ok(group) => run_list(&lists, id, group, dt, &mut self.rng, working_set),
            Err(e) => Err(e),
        };
        self.lists = lists;
        result
    }

    /// Appends `action` to the recording list, or runs it immediately
    /// against the whole current group as a one-action segment.
    fn issue(&mut self, action: Action) -> EngineResult<()> {
        if self.in_new_list {
            let id = self.current_list.expect("in_new_list implies a current list");
            self.list_mut(id)?.actions.push(action);
            return Ok(());
        }
        let dt = self.dt;
        let group = self.current_group_mut()?;
        let len = group.len();
        let mut no_call = |_id: usize, _g: &mut ParticleGroup, _dt: f32, _rng: &mut Prng| {
            Err(EngineError::WrongMode(
                "CallActionList is not valid outside list recording/execution".into(),
            ))
        };
        action.execute(group, 0, len, dt, &mut self.rng, &mut no_call)
    }

    // ---- source state --------------------------------------------------

    pub fn reset_source_state(&mut self) {
        self.source_state = SourceState::default();
    }
    pub fn set_up_vec(&mut self, dom: Domain) {
        self.source_state.up_dom = dom;
    }
    pub fn set_velocity(&mut self, dom: Domain) {
        self.source_state.vel_dom = dom;
    }
    pub fn set_rot_velocity(&mut self, dom: Domain) {
        self.source_state.rvel_dom = dom;
    }
    pub fn set_size(&mut self, dom: Domain) {
        self.source_state.size_dom = dom;
    }
    pub fn set_color(&mut self, dom: Domain) {
        self.source_state.color_dom = dom;
    }
    pub fn set_alpha(&mut self, dom: Domain) {
        self.source_state.alpha_dom = dom;
    }
    pub fn set_vertex_b(&mut self, dom: Domain) {
        self.source_state.vertex_b_dom = dom;
    }
    pub fn set_vertex_b_tracks(&mut self, tracks: bool) {
        self.source_state.vertex_b_tracks_pos = tracks;
    }
    pub fn set_starting_age(&mut self, mean: f32, sigma: f32) {
        self.source_state.age_mean = mean;
        self.source_state.age_sigma = sigma;
    }
    pub fn set_mass(&mut self, mass: f32) {
        self.source_state.mass = mass;
    }
    pub fn set_data(&mut self, data: u32) {
        self.source_state.data = data;
    }

    // ---- actions -------------------------------------------------------

    pub fn source(&mut self, rate: f32, position_dom: Domain) -> EngineResult<()> {
        let state = Rc::new(self.source_state.clone());
        self.issue(Action::Source {
            rate,
            position_dom,
            state,
        })
    }

    pub fn vertex(&mut self, p: Vec3, data: u32) -> EngineResult<()> {
        let state = Rc::new(self.source_state.clone());
        self.issue(Action::Vertex { p, state, data })
    }

    pub fn gravity(&mut self, dir: Vec3) -> EngineResult<()> {
        self.issue(Action::Gravity { dir })
    }

    pub fn orbit_point(&mut self, center: Vec3, magnitude: f32, epsilon: f32, max_radius: f32) -> EngineResult<()> {
        self.issue(Action::OrbitPoint {
            center,
            magnitude,
            epsilon,
            max_radius,
        })
    }

    pub fn orbit_line(
        &mut self,
        point: Vec3,
        axis: Vec3,
        magnitude: f32,
        epsilon: f32,
        max_radius: f32,
    ) -> EngineResult<()> {
        self.issue(Action::OrbitLine {
            point,
            axis,
            magnitude,
            epsilon,
            max_radius,
        })
    }

    pub fn explosion(&mut self, center: Vec3, radius: f32, magnitude: f32, sigma: f32, epsilon: f32) -> EngineResult<()> {
        self.issue(Action::Explosion {
            center,
            radius,
            magnitude,
            sigma,
            epsilon,
        })
    }

    pub fn vortex(
        &mut self,
        tip: Vec3,
        axis: Vec3,
        tightness: f32,
        max_radius: f32,
        in_speed: f32,
        up_speed: f32,
        around_speed: f32,
    ) -> EngineResult<()> {
        self.issue(Action::Vortex {
            tip,
            axis,
            tightness,
            max_radius,
            in_speed,
            up_speed,
            around_speed,
        })
    }

    pub fn jet(&mut self, shape_dom: Domain, accel_dom: Domain) -> EngineResult<()> {
        self.issue(Action::Jet { shape_dom, accel_dom })
    }

    pub fn random_accel(&mut self, dom: Domain) -> EngineResult<()> {
        self.issue(Action::RandomAccel { dom })
    }
    pub fn random_displace(&mut self, dom: Domain) -> EngineResult<()> {
        self.issue(Action::RandomDisplace { dom })
    }
    pub fn random_velocity(&mut self, dom: Domain) -> EngineResult<()> {
        self.issue(Action::RandomVelocity { dom })
    }
    pub fn random_rot_velocity(&mut self, dom: Domain) -> EngineResult<()> {
        self.issue(Action::RandomRotVelocity { dom })
    }

    pub fn gravitate(&mut self, magnitude: f32, epsilon: f32, max_radius: f32) -> EngineResult<()> {
        self.issue(Action::Gravitate {
            magnitude,
            epsilon,
            max_radius,
        })
    }
    pub fn follow(&mut self, magnitude: f32, epsilon: f32, max_radius: f32) -> EngineResult<()> {
        self.issue(Action::Follow {
            magnitude,
            epsilon,
            max_radius,
        })
    }
    pub fn match_velocity(&mut self, magnitude: f32, epsilon: f32, max_radius: f32) -> EngineResult<()> {
        self.issue(Action::MatchVelocity {
            magnitude,
            epsilon,
            max_radius,
        })
    }
    pub fn match_rot_velocity(&mut self, magnitude: f32, epsilon: f32, max_radius: f32) -> EngineResult<()> {
        self.issue(Action::MatchRotVelocity {
            magnitude,
            epsilon,
            max_radius,
        })
    }

    pub fn damping(&mut self, damping: Vec3, v_low: f32, v_high: f32) -> EngineResult<()> {
        self.issue(Action::Damping {
            damping,
            v_low,
            v_high,
        })
    }
    pub fn rot_damping(&mut self, damping: Vec3, v_low: f32, v_high: f32) -> EngineResult<()> {
        self.issue(Action::RotDamping {
            damping,
            v_low,
            v_high,
        })
    }
    pub fn speed_clamp(&mut self, min_speed: f32, max_speed: f32) -> EngineResult<()> {
        self.issue(Action::SpeedClamp { min_speed, max_speed })
    }

    pub fn target_color(&mut self, target: Vec3, scale: f32) -> EngineResult<()> {
        self.issue(Action::TargetColor { target, scale })
    }
    pub fn target_size(&mut self, target: Vec3, scale: Vec3) -> EngineResult<()> {
        self.issue(Action::TargetSize { target, scale })
    }
    pub fn target_velocity(&mut self, target: Vec3, scale: f32) -> EngineResult<()> {
        self.issue(Action::TargetVelocity { target, scale })
    }
    pub fn target_rot_velocity(&mut self, target: Vec3, scale: f32) -> EngineResult<()> {
        self.issue(Action::TargetRotVelocity { target, scale })
    }

    pub fn avoid(&mut self, dom: Domain, magnitude: f32, epsilon: f32, look_ahead: f32) -> EngineResult<()> {
        self.issue(Action::Avoid {
            dom,
            magnitude,
            epsilon,
            look_ahead,
        })
    }
    pub fn bounce(&mut self, friction: f32, resilience: f32, fric_min_vel: f32, dom: Domain) -> EngineResult<()> {
        self.issue(Action::Bounce {
            friction,
            resilience,
            fric_min_vel,
            dom,
        })
    }

    pub fn move_particles(&mut self, move_vel: bool, move_rvel: bool) -> EngineResult<()> {
        self.issue(Action::Move { move_vel, move_rvel })
    }
    pub fn copy_vertex_b(&mut self, copy_pos: bool, copy_vel: bool) -> EngineResult<()> {
        self.issue(Action::CopyVertexB { copy_pos, copy_vel })
    }
    pub fn restore(&mut self, time_left: f32, restore_pos: bool, restore_rot: bool) -> EngineResult<()> {
        self.issue(Action::Restore {
            time_left,
            restore_pos,
            restore_rot,
        })
    }

    pub fn kill_old(&mut self, age_limit: f32, kill_less_than: bool) -> EngineResult<()> {
        self.issue(Action::KillOld {
            age_limit,
            kill_less_than,
        })
    }
    pub fn sink(&mut self, kill_inside: bool, dom: Domain) -> EngineResult<()> {
        self.issue(Action::Sink { kill_inside, dom })
    }
    pub fn sink_velocity(&mut self, kill_inside: bool, vel_dom: Domain) -> EngineResult<()> {
        self.issue(Action::SinkVelocity { kill_inside, vel_dom })
    }
    pub fn commit_kills(&mut self) -> EngineResult<()> {
        self.issue(Action::CommitKills)
    }

    pub fn callback(&mut self, func: ParticleCallback, data: u64) -> EngineResult<()> {
        self.issue(Action::Callback { func, data })
    }
    pub fn sort(&mut self, eye: Vec3, look: Vec3, front_to_back: bool, clamp_negative: bool) -> EngineResult<()> {
        self.issue(Action::Sort {
            eye,
            look,
            front_to_back,
            clamp_negative,
        })
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs `lists[list_id]` against `group`, applying the segmentation rule:
/// a run of actions that are all segmentable executes as a nested loop over
/// working-set-sized windows; a `kills_particles`/`do_not_segment` action
/// always runs alone against the whole group.
fn run_list(
    lists: &[Option<ActionList>],
    list_id: usize,
    group: &mut ParticleGroup,
    dt: f32,
    rng: &mut Prng,
    working_set_particles: usize,
) -> EngineResult<()> {
    let list = lists
        .get(list_id)
        .and_then(|l| l.as_ref())
        .ok_or_else(|| EngineError::BadHandle(format!("list {list_id} is invalid or deleted")))?;

    if list.is_bound() {
        let f = list.binding.func.expect("is_bound checked func is Some");
        f(list, group, dt, working_set_particles);
        return Ok(());
    }

    let actions = &list.actions;
    let n = actions.len();
    let mut i = 0;
    while i < n {
        let mut j = i;
        if !(actions[i].kills_particles() || actions[i].do_not_segment()) {
            while j + 1 < n {
                let cur = &actions[j];
                let next = &actions[j + 1];
                if cur.kills_particles() || cur.do_not_segment() || next.kills_particles() || next.do_not_segment() {
                    break;
                }
                j += 1;
            }
        }

        if i == j {
            let len = group.len();
            let mut call = |id: usize, g: &mut ParticleGroup, dt: f32, rng: &mut Prng| {
                run_list(lists, id, g, dt, rng, working_set_particles)
            };
            actions[i].execute(group, 0, len, dt, rng, &mut call)?;
        } else {
            let window = working_set_particles.max(1);
            let mut start = 0;
            let total = group.len();
            while start < total {
                let end = (start + window).min(total);
                for k in i..=j {
                    let mut call = |id: usize, g: &mut ParticleGroup, dt: f32, rng: &mut Prng| {
                        run_list(lists, id, g, dt, rng, working_set_particles)
                    };
                    actions[k].execute(group, start, end, dt, rng, &mut call)?;
                }
                start = end;
            }
        }
        i = j + 1;
    }
    Ok(())
}
