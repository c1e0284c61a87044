use std::cell::Cell;

use crate::effects::EffectId;

thread_local! {
    static ACTIVE_EFFECT: Cell<Option<EffectId>> = const { Cell::new(None) };
}

/// The effect that owns anything created right now.
pub fn current_effect() -> Option<EffectId> {
    ACTIVE_EFFECT.with(|a| a.get())
}

pub(crate) struct OwnerGuard(Option<EffectId>);

impl OwnerGuard {
    pub(crate) fn enter(owner: Option<EffectId>) -> Self {
        OwnerGuard(ACTIVE_EFFECT.with(|a| a.replace(owner)))
    }
}

impl Drop for OwnerGuard {
    fn drop(&mut self) {
        let prev = self.0;
        let _ = ACTIVE_EFFECT.try_with(|a| a.set(prev));
    }
}

/// Runs `f` with `owner` as the parent of effects it creates.
pub fn with_owner<R>(owner: Option<EffectId>, f: impl FnOnce() -> R) -> R {
    let _guard = OwnerGuard::enter(owner);
    f()
}
