use crate::{Arena, Heap, Payload};

/// Heap lock: wrapper struct containing a mutex-locked [`Heap`].
///
/// Each call locks the mutex for the duration of one operation.
/// Use [`HeapLock::heap`] to hold the lock across several.
#[derive(Debug)]
pub struct HeapLock<R: lock_api::RawMutex, A: Arena>(pub lock_api::Mutex<R, Heap<A>>);

impl<R: lock_api::RawMutex, A: Arena> HeapLock<R, A> {
    pub fn new(heap: Heap<A>) -> Self {
        Self(lock_api::Mutex::new(heap))
    }

    /// Lock the mutex and access the inner [`Heap`].
    pub fn lock(&self) -> lock_api::MutexGuard<'_, R, Heap<A>> {
        self.0.lock()
    }

    pub fn into_inner(self) -> Heap<A> {
        self.0.into_inner()
    }

    /// See [`Heap::malloc`].
    pub fn malloc(&self, size: usize) -> Option<Payload> {
        self.0.lock().malloc(size)
    }

    /// See [`Heap::free`].
    pub fn free(&self, ptr: Payload) {
        self.0.lock().free(ptr)
    }

    /// See [`Heap::realloc`].
    pub fn realloc(&self, ptr: Option<Payload>, size: usize) -> Option<Payload> {
        self.0.lock().realloc(ptr, size)
    }
}
