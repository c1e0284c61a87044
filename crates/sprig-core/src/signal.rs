use std::cell::RefCell;
use std::rc::Rc;

use crate::reactive::{self, SignalId};

/// Observable value. Reads inside an effect subscribe that effect; writes
/// re-run it.
pub struct Signal<T: 'static>(Rc<SignalInner<T>>);

struct SignalInner<T> {
    id: SignalId,
    value: RefCell<T>,
}

impl<T> Drop for SignalInner<T> {
    fn drop(&mut self) {
        reactive::release_signal(self.id);
    }
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Signal<T> {
    pub fn new(value: T) -> Self {
        Self(Rc::new(SignalInner {
            id: reactive::new_signal(),
            value: RefCell::new(value),
        }))
    }

    pub fn id(&self) -> SignalId {
        self.0.id
    }

    pub fn get(&self) -> T
    where
        T: Clone,
    {
        reactive::read_tracked(self.0.id);
        self.0.value.borrow().clone()
    }

    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        self.0.value.borrow().clone()
    }

    /// Tracked read by reference.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        reactive::read_tracked(self.0.id);
        f(&self.0.value.borrow())
    }

    /// Stores `v` and notifies dependents, even if the value is unchanged.
    pub fn set(&self, v: T) {
        *self.0.value.borrow_mut() = v;
        reactive::notify_dependents(self.0.id);
    }

    /// Stores `v` and notifies only when it differs from the current value.
    pub fn set_if_changed(&self, v: T) -> bool
    where
        T: PartialEq,
    {
        {
            let mut cur = self.0.value.borrow_mut();
            if *cur == v {
                return false;
            }
            *cur = v;
        }
        reactive::notify_dependents(self.0.id);
        true
    }

    pub fn update(&self, f: impl FnOnce(&mut T)) {
        f(&mut self.0.value.borrow_mut());
        reactive::notify_dependents(self.0.id);
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0.value.try_borrow() {
            Ok(v) => f.debug_tuple("Signal").field(&*v).finish(),
            Err(_) => f.write_str("Signal(<borrowed>)"),
        }
    }
}

pub fn signal<T>(t: T) -> Signal<T> {
    Signal::new(t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::{destroy, effect};
    use std::cell::Cell;

    #[test]
    fn set_if_changed_skips_equal_values() {
        let s = signal(1);
        let runs = Rc::new(Cell::new(0));
        let e = effect({
            let s = s.clone();
            let runs = runs.clone();
            move || {
                s.get();
                runs.set(runs.get() + 1);
            }
        });
        assert!(!s.set_if_changed(1));
        assert_eq!(runs.get(), 1);
        assert!(s.set_if_changed(2));
        assert_eq!(runs.get(), 2);
        s.set(2);
        assert_eq!(runs.get(), 3);
        destroy(e);
    }

    #[test]
    fn untracked_reads_do_not_subscribe() {
        let s = signal(0);
        let runs = Rc::new(Cell::new(0));
        let e = effect({
            let s = s.clone();
            let runs = runs.clone();
            move || {
                s.get_untracked();
                runs.set(runs.get() + 1);
            }
        });
        s.set(5);
        assert_eq!(runs.get(), 1);
        assert_eq!(reactive::dependency_count(e), 0);
        destroy(e);
    }
}
