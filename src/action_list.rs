//! Recorded action sequences and their optional compiled binding.

use crate::action::Action;
use crate::group::ParticleGroup;

/// Calling convention for a pre-compiled function bound to a list.
///
/// The signature is part of the public contract: list, group, dt, block size.
pub type CompiledFn = fn(&ActionList, &mut ParticleGroup, f32, usize);

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BindingKind {
    Internal,
    CpuCompiled,
    GpuCompiled,
}

#[derive(Clone)]
pub struct Binding {
    pub kind: BindingKind,
    pub func: Option<CompiledFn>,
}

impl Default for Binding {
    fn default() -> Self {
        Self {
            kind: BindingKind::Internal,
            func: None,
        }
    }
}

#[derive(Clone, Default)]
pub struct ActionList {
    pub actions: Vec<Action>,
    pub binding: Binding,
}

impl ActionList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_bound(&self) -> bool {
        self.binding.kind != BindingKind::Internal && self.binding.func.is_some()
    }

    /// Takes the binding out, leaving `Internal`/unbound in its place. Pair
    /// with [`ActionList::rebind`] around an Internal-mode run of a bound
    /// list: the scheduler temporarily unbinds, runs internally, then
    /// re-binds.
    pub fn take_binding(&mut self) -> Binding {
        std::mem::take(&mut self.binding)
    }

    pub fn rebind(&mut self, binding: Binding) {
        self.binding = binding;
    }
}
