//! Poison tolerant mutex used around every sink.
//!
//! A panic while a sink is locked must not take logging down with it, so
//! a poisoned lock is recovered instead of unwrapped. Debug builds also
//! report locks held for longer than [`OVERHELD`] together with the call
//! site that acquired them.

pub struct Mutex<T: ?Sized> {
    inner: std::sync::Mutex<T>,
}

#[cfg(debug_assertions)]
const OVERHELD: std::time::Duration = std::time::Duration::from_secs(1);

#[cfg(debug_assertions)]
struct DropTracker {
    acquired: std::time::Instant,
    caller: &'static std::panic::Location<'static>,
}

#[cfg(debug_assertions)]
impl DropTracker {
    fn new(caller: &'static std::panic::Location<'static>) -> Self {
        Self {
            acquired: std::time::Instant::now(),
            caller,
        }
    }
    #[inline(never)]
    fn report_overheld_if_needed(&self, type_name: &'static str) {
        let held = self.acquired.elapsed();
        if held < OVERHELD {
            return;
        }
        // Can't log through the logger here, the sink may be the very thing
        // that is locked.
        eprintln!(
            "logline: {} held for {:.3}s, acquired at {}:{}",
            type_name,
            held.as_secs_f32(),
            self.caller.file(),
            self.caller.line()
        );
    }
}

pub struct MutexGuard<'a, T: ?Sized + 'a> {
    inner: std::sync::MutexGuard<'a, T>,
    #[cfg(debug_assertions)]
    tracker: DropTracker,
}

impl<T> Mutex<T> {
    pub const fn new(t: T) -> Mutex<T> {
        Mutex {
            inner: std::sync::Mutex::new(t),
        }
    }
}

impl<T: ?Sized> Mutex<T> {
    #[cfg_attr(debug_assertions, track_caller)]
    pub fn lock(&self) -> MutexGuard<'_, T> {
        let inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        MutexGuard {
            inner,
            #[cfg(debug_assertions)]
            tracker: DropTracker::new(std::panic::Location::caller()),
        }
    }
}

impl<T: ?Sized> std::ops::Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<T: ?Sized> std::ops::DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

#[cfg(debug_assertions)]
impl<'a, T: ?Sized + 'a> Drop for MutexGuard<'a, T> {
    fn drop(&mut self) {
        self.tracker
            .report_overheld_if_needed(std::any::type_name::<T>());
    }
}
