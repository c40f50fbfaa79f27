//! Live host instances

use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use std::any::Any;
use std::fmt;
use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use super::identity::InstanceBinding;
use crate::engine::ObjectPtr;
use crate::register::{ExtensionClass, Forwarder};

static NEXT_THREAD_TOKEN: AtomicUsize = AtomicUsize::new(1);

thread_local! {
    static THREAD_TOKEN: usize = NEXT_THREAD_TOKEN.fetch_add(1, Ordering::Relaxed);
}

/// Nonzero id of the calling thread
fn thread_token() -> usize {
    THREAD_TOKEN.with(|token| *token)
}

/// Teardown of a freed value, run once the value is no longer borrowed
pub(crate) type Teardown<T> = Box<dyn FnOnce(T) + Send>;

/// What [`InstanceCell::retire`] did with the host value
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Retired {
    /// Torn down before returning
    Now,
    /// Borrowed further up this thread's stack; torn down when that borrow ends
    Deferred,
    /// Already retired
    Empty,
}

/// Storage behind one engine object of an extension class
pub struct InstanceCell<T: ExtensionClass> {
    object: ObjectPtr,
    class: String,
    base: T::Base,
    value: Mutex<Option<T>>,
    /// Thread token of the current borrower, 0 when unborrowed
    owner: AtomicUsize,
    freed: AtomicBool,
    deferred: Mutex<Option<Teardown<T>>>,
    children_bound: AtomicBool,
    forwarders: Mutex<Vec<Forwarder>>,
}

impl<T: ExtensionClass> InstanceCell<T> {
    pub(crate) fn new(object: ObjectPtr, class: String, base: T::Base, value: T) -> Self {
        Self {
            object,
            class,
            base,
            value: Mutex::new(Some(value)),
            owner: AtomicUsize::new(0),
            freed: AtomicBool::new(false),
            deferred: Mutex::new(None),
            children_bound: AtomicBool::new(false),
            forwarders: Mutex::new(Vec::new()),
        }
    }

    #[inline]
    pub(crate) fn base(&self) -> &T::Base {
        &self.base
    }

    fn held_by_current_thread(&self) -> bool {
        self.owner.load(Ordering::Acquire) == thread_token()
    }

    fn guard<'a>(&'a self, slot: MutexGuard<'a, Option<T>>) -> Option<InstanceGuard<'a, T>> {
        let value = MutexGuard::try_map(slot, Option::as_mut).ok()?;
        self.owner.store(thread_token(), Ordering::Release);
        Some(InstanceGuard {
            value: ManuallyDrop::new(value),
            cell: self,
        })
    }

    /// Exclusive borrow; waits while another thread holds the value
    pub(crate) fn bind(&self) -> InstanceGuard<'_, T> {
        let slot = match self.value.try_lock() {
            Some(slot) => slot,
            None if self.held_by_current_thread() => panic!(
                "re-entrant bind of `{}` instance {}: the value is already borrowed",
                self.class, self.object
            ),
            None => self.value.lock(),
        };
        match self.guard(slot) {
            Some(guard) => guard,
            None => panic!("`{}` instance {} used after free", self.class, self.object),
        }
    }

    pub(crate) fn try_bind(&self) -> Option<InstanceGuard<'_, T>> {
        self.guard(self.value.try_lock()?)
    }

    /// First caller wins; later calls return `false`
    pub(crate) fn begin_child_binding(&self) -> bool {
        !self.children_bound.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn add_forwarder(&self, forwarder: Forwarder) {
        self.forwarders.lock().push(forwarder);
    }

    pub(crate) fn take_forwarders(&self) -> Vec<Forwarder> {
        std::mem::take(&mut *self.forwarders.lock())
    }

    /// Move the host value out and run `teardown` on it
    ///
    /// Waits for a borrow held by another thread. A borrow held further up
    /// the calling thread's stack defers the teardown to the end of that
    /// borrow. The cell stays behind as a tombstone for stale handles.
    pub(crate) fn retire(&self, teardown: Teardown<T>) -> Retired {
        if self.freed.swap(true, Ordering::AcqRel) {
            return Retired::Empty;
        }
        if self.held_by_current_thread() {
            *self.deferred.lock() = Some(teardown);
            return Retired::Deferred;
        }
        let value = self.value.lock().take();
        match value {
            Some(value) => {
                teardown(value);
                Retired::Now
            }
            None => Retired::Empty,
        }
    }

    fn run_deferred(&self) {
        let Some(teardown) = self.deferred.lock().take() else {
            return;
        };
        let value = self.value.lock().take();
        if let Some(value) = value {
            teardown(value);
        }
    }
}

/// Exclusive access to a host value, held for the duration of one call
pub struct InstanceGuard<'a, T: ExtensionClass> {
    value: ManuallyDrop<MappedMutexGuard<'a, T>>,
    cell: &'a InstanceCell<T>,
}

impl<T: ExtensionClass> Deref for InstanceGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: ExtensionClass> DerefMut for InstanceGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T: ExtensionClass> Drop for InstanceGuard<'_, T> {
    fn drop(&mut self) {
        self.cell.owner.store(0, Ordering::Release);
        // SAFETY: dropped exactly once, and `value` is not used afterwards
        unsafe { ManuallyDrop::drop(&mut self.value) };
        self.cell.run_deferred();
    }
}

impl<T: ExtensionClass> InstanceBinding for InstanceCell<T> {
    fn object(&self) -> ObjectPtr {
        self.object
    }

    fn class_name(&self) -> &str {
        &self.class
    }

    fn is_alive(&self) -> bool {
        !self.freed.load(Ordering::Acquire)
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Shared typed handle to a live instance
pub struct Instance<T: ExtensionClass> {
    cell: Arc<InstanceCell<T>>,
}

impl<T: ExtensionClass> Instance<T> {
    pub(crate) fn from_cell(cell: Arc<InstanceCell<T>>) -> Self {
        Self { cell }
    }

    pub(crate) fn cell(&self) -> &Arc<InstanceCell<T>> {
        &self.cell
    }

    #[inline]
    pub fn object(&self) -> ObjectPtr {
        self.cell.object
    }

    /// Engine wrapper of the parent class
    #[inline]
    pub fn base(&self) -> &T::Base {
        self.cell.base()
    }

    pub fn class_name(&self) -> &str {
        &self.cell.class
    }

    /// Borrow the host value exclusively
    ///
    /// Blocks while another thread holds the value.
    ///
    /// # Panics
    /// When this thread already holds the value (re-entrant call into the
    /// same instance) or the instance has been freed.
    pub fn bind(&self) -> InstanceGuard<'_, T> {
        self.cell.bind()
    }

    /// Borrow without panicking; `None` when busy or freed
    pub fn try_bind(&self) -> Option<InstanceGuard<'_, T>> {
        self.cell.try_bind()
    }

    pub fn is_alive(&self) -> bool {
        self.cell.is_alive()
    }
}

impl<T: ExtensionClass> Clone for Instance<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T: ExtensionClass> PartialEq for Instance<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }
}

impl<T: ExtensionClass> fmt::Debug for Instance<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("class", &self.cell.class)
            .field("object", &self.cell.object)
            .finish()
    }
}
