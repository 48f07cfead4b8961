//! Bounded pool of playback handles.

use std::collections::HashSet;

use tracing::{debug, trace, warn};

use crate::video::handle::{HandleFactory, PlaybackHandle};

/// Hands out at most `max_size` handles, reusing released ones first.
///
/// Running dry is not an error: `request_handle` returns `None` and the
/// caller shows the item without a handle.
pub struct ResourcePool<F: HandleFactory> {
    factory: F,
    free: Vec<F::Handle>,
    checked_out: HashSet<u64>,
    created: usize,
    max_size: usize,
}

impl<F: HandleFactory> ResourcePool<F> {
    pub fn new(factory: F, max_size: usize) -> Self {
        debug!(max_size, "Creating resource pool");
        Self {
            factory,
            free: Vec::new(),
            checked_out: HashSet::new(),
            created: 0,
            max_size,
        }
    }

    /// Most recently released handle, or a new one while under the cap.
    pub fn request_handle(&mut self) -> Option<F::Handle> {
        if let Some(handle) = self.free.pop() {
            self.checked_out.insert(handle.id());
            trace!(handle = handle.id(), "Reusing handle");
            return Some(handle);
        }
        if self.created < self.max_size {
            let id = self.created as u64;
            self.created += 1;
            let handle = self.factory.create(id);
            self.checked_out.insert(id);
            return Some(handle);
        }
        trace!(max_size = self.max_size, "Pool exhausted");
        None
    }

    /// Resets `handle` and makes it available again. Handles this pool did
    /// not hand out are logged and dropped.
    pub fn release_handle(&mut self, mut handle: F::Handle) {
        if !self.checked_out.remove(&handle.id()) {
            warn!(handle = handle.id(), "Release of a handle that is not checked out");
            return;
        }
        handle.reset();
        trace!(handle = handle.id(), "Released handle");
        self.free.push(handle);
    }

    pub fn created(&self) -> usize {
        self.created
    }

    pub fn checked_out(&self) -> usize {
        self.checked_out.len()
    }

    pub fn free(&self) -> usize {
        self.free.len()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::handle::{VideoHandle, VideoHandleFactory};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_reuses_most_recently_released() {
        let mut pool = ResourcePool::new(VideoHandleFactory, 3);
        let a = pool.request_handle().unwrap();
        let b = pool.request_handle().unwrap();
        assert_eq!((a.id(), b.id()), (0, 1));

        pool.release_handle(a);
        pool.release_handle(b);
        assert_eq!(pool.request_handle().map(|h| h.id()), Some(1));
        assert_eq!(pool.created(), 2);
    }

    #[test]
    fn test_exhausted_pool_returns_none() {
        let mut pool = ResourcePool::new(VideoHandleFactory, 2);
        let _a = pool.request_handle().unwrap();
        let _b = pool.request_handle().unwrap();
        assert!(pool.request_handle().is_none());
        assert_eq!(pool.created(), 2);
    }

    #[test]
    fn test_released_handles_are_reset() {
        let mut pool = ResourcePool::new(VideoHandleFactory, 1);
        let mut handle = pool.request_handle().unwrap();
        handle.load("file:///a.mp4");
        handle.play();
        pool.release_handle(handle);

        let handle = pool.request_handle().unwrap();
        assert_eq!(handle.source(), None);
        assert!(!handle.is_playing());
    }

    #[test]
    fn test_foreign_handle_is_ignored() {
        let mut pool = ResourcePool::new(VideoHandleFactory, 2);
        pool.release_handle(VideoHandle::new(7));
        assert_eq!(pool.free(), 0);
        assert_eq!(pool.checked_out(), 0);
    }

    #[test]
    fn test_random_checkouts_stay_within_cap() {
        let max_size = 5;
        let mut pool = ResourcePool::new(VideoHandleFactory, max_size);
        let mut held: Vec<VideoHandle> = Vec::new();
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..2_000 {
            if rng.gen_bool(0.55) {
                match pool.request_handle() {
                    Some(handle) => held.push(handle),
                    None => assert_eq!(held.len(), max_size),
                }
            } else if !held.is_empty() {
                let index = rng.gen_range(0..held.len());
                pool.release_handle(held.swap_remove(index));
            }

            assert!(pool.created() <= max_size);
            assert_eq!(pool.checked_out(), held.len());
            assert_eq!(pool.free() + pool.checked_out(), pool.created());

            let mut ids: Vec<u64> = held.iter().map(|h| h.id()).collect();
            ids.sort_unstable();
            ids.dedup();
            assert_eq!(ids.len(), held.len());
        }
    }
}
