//! Synchronization layer on top of [`BuddyAllocator`], mirroring the
//! teacher's `Tallock`: a thin `spin::Mutex` wrapper implementing the
//! stable [`GlobalAlloc`] trait, since `BuddyAllocator` itself is not
//! internally synchronized (see its concurrency model notes).

use core::alloc::{GlobalAlloc, Layout};
use core::ptr::{self, NonNull};

use super::allocator::BuddyAllocator;

/// A `#[global_allocator]`-installable wrapper around a [`BuddyAllocator`].
#[derive(Debug)]
pub struct Lock(pub spin::Mutex<BuddyAllocator>);

impl Lock {
    pub fn new(alloc: BuddyAllocator) -> Self {
        Self(spin::Mutex::new(alloc))
    }

    #[inline]
    pub fn lock(&self) -> spin::MutexGuard<BuddyAllocator> {
        self.0.lock()
    }
}

unsafe impl GlobalAlloc for Lock {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        match self.lock().allocate(layout.size()) {
            Ok(ptr) => ptr.as_ptr(),
            Err(_) => ptr::null_mut(),
        }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        // SAFETY: caller guaranteed ptr was returned by a prior alloc call,
        // so it is non-null.
        self.lock().deallocate_sized(NonNull::new_unchecked(ptr), layout.size());
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        match self.lock().allocate(layout.size()) {
            Ok(ptr) => {
                ptr.as_ptr().write_bytes(0, layout.size());
                ptr.as_ptr()
            }
            Err(_) => ptr::null_mut(),
        }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let mut guard = self.lock();
        let old_size = layout.size();

        if new_size <= old_size {
            if new_size > 0 {
                guard.deallocate_range(
                    NonNull::new_unchecked(ptr.add(new_size)),
                    old_size - new_size,
                );
            }
            return ptr;
        }

        match guard.allocate(new_size) {
            Ok(new_ptr) => {
                core::ptr::copy_nonoverlapping(ptr, new_ptr.as_ptr(), old_size);
                guard.deallocate_sized(NonNull::new_unchecked(ptr), old_size);
                new_ptr.as_ptr()
            }
            Err(_) => ptr::null_mut(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buddy::config::{BuddyConfig, SizeEncoding};

    #[test]
    #[cfg(feature = "std")]
    fn global_alloc_round_trips_through_layout() {
        let cfg = BuddyConfig::new(4, 8, 1, SizeEncoding::SplitBitmap, 0).unwrap();
        let lock = Lock::new(BuddyAllocator::create(cfg, None, None, false).unwrap());
        let layout = Layout::from_size_align(32, 8).unwrap();
        unsafe {
            let ptr = lock.alloc(layout);
            assert!(!ptr.is_null());
            lock.dealloc(ptr, layout);
        }
    }
}
