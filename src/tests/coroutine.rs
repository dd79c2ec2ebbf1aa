use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::rc::Rc;

use crate::coroutine::CoroutineHandle;
use crate::error::{Error, State};
use crate::{current, raw, yield_now, Coroutine, StackSize, StorageSize, MIN_STACK_SIZE};

#[test]
fn smoke() {
    let hit = Rc::new(Cell::new(false));
    let hit2 = hit.clone();
    let mut coroutine = Coroutine::new(move |_| {
        hit2.set(true);
    })
    .unwrap();
    assert!(!hit.get());
    assert!(coroutine.valid());
    assert!(coroutine.suspended());
    assert!(!coroutine.done());
    coroutine.resume().unwrap();
    assert!(hit.get());
    assert!(coroutine.done());
}

#[test]
fn sequential_yields() {
    let step = Rc::new(Cell::new(usize::MAX));
    let step2 = step.clone();
    let mut coroutine = Coroutine::new(move |co| {
        for i in 0..5 {
            step2.set(i);
            co.suspend().unwrap();
        }
    })
    .unwrap();

    for _ in 0..5 {
        coroutine.resume().unwrap();
    }
    assert_eq!(step.get(), 4);
    assert!(coroutine.suspended());

    coroutine.resume().unwrap();
    assert!(coroutine.done());
    assert_eq!(coroutine.resume(), Err(Error::NotSuspended));
}

#[test]
fn status_before_any_resume_is_suspended() {
    let coroutine = Coroutine::new(|_| {}).unwrap();
    assert_eq!(coroutine.status(), State::Suspended);
}

#[test]
fn create_then_drop_without_resume() {
    let coroutine = Coroutine::new(|co| {
        co.suspend().unwrap();
    })
    .unwrap();
    drop(coroutine);
}

#[test]
fn drop_while_suspended_reclaims_memory() {
    let mut coroutine = Coroutine::new(|co| loop {
        co.suspend().unwrap();
    })
    .unwrap();
    coroutine.resume().unwrap();
    assert!(coroutine.suspended());
    drop(coroutine);
}

#[test]
fn nested_resume_restores_current() {
    assert!(!current().valid());

    let mut outer = Coroutine::new(|co| {
        assert_eq!(current().status(), State::Running);
        let outer_handle = current();

        let mut inner = Coroutine::new(move |ico| {
            // While the inner body runs, the outer coroutine is waiting on
            // it and must report normal.
            assert_eq!(outer_handle.status(), State::Normal);
            assert_eq!(current().status(), State::Running);
            ico.suspend().unwrap();
        })
        .unwrap();

        inner.resume().unwrap();
        // Inner yielded: the current pointer must be back on us.
        assert_eq!(current().status(), State::Running);
        assert!(inner.suspended());

        inner.resume().unwrap();
        assert!(inner.done());
        co.suspend().unwrap();
    })
    .unwrap();

    outer.resume().unwrap();
    assert!(!current().valid());
    assert!(outer.suspended());
    outer.resume().unwrap();
    assert!(outer.done());
}

#[test]
fn deep_nested_yields() {
    fn plunge(co: CoroutineHandle, depth: usize) {
        if depth == 0 {
            for _ in 0..1000 {
                co.suspend().unwrap();
            }
        } else {
            plunge(co, depth - 1);
        }
    }

    let mut coroutine = Coroutine::new(|co| plunge(co, 16)).unwrap();
    for _ in 0..1000 {
        coroutine.resume().unwrap();
        assert!(coroutine.suspended());
    }
    coroutine.resume().unwrap();
    assert!(coroutine.done());
}

#[test]
fn stack_size_below_floor_is_clamped() {
    // A 1 KiB request must be silently raised to the 32 KiB floor; this
    // recursion would not survive 1 KiB of stack.
    let mut coroutine = Coroutine::with_sizes(
        |co| {
            fn recurse(i: u32, p: &mut [u8; 256]) {
                unsafe {
                    // Ensure the stack allocation isn't optimized away.
                    ptr::read_volatile(&p);
                }
                if i > 0 {
                    recurse(i - 1, &mut [0; 256]);
                }
            }
            recurse(16, &mut [0; 256]);
            co.suspend().unwrap();
        },
        StackSize(1024),
        StorageSize::default(),
    )
    .unwrap();
    coroutine.resume().unwrap();
    assert!(coroutine.suspended());
    coroutine.resume().unwrap();
    assert!(coroutine.done());
}

#[test]
#[should_panic(expected = "ran out of spaghetti")]
fn panics_propagated() {
    // The panic hook formats its report on the coroutine stack, so give
    // these tests more room than the default.
    let mut coroutine = Coroutine::with_sizes(
        |_| {
            panic!("ran out of spaghetti");
        },
        StackSize(256 * 1024),
        StorageSize::default(),
    )
    .unwrap();
    coroutine.resume().unwrap();
}

#[test]
fn panic_leaves_coroutine_dead() {
    let mut coroutine = Coroutine::with_sizes(
        |co| {
            co.suspend().unwrap();
            panic!("boom");
        },
        StackSize(256 * 1024),
        StorageSize::default(),
    )
    .unwrap();
    coroutine.resume().unwrap();
    assert!(coroutine.suspended());

    let result = panic::catch_unwind(AssertUnwindSafe(|| coroutine.resume()));
    assert!(result.is_err());
    assert!(coroutine.done());
    assert_eq!(coroutine.resume(), Err(Error::NotSuspended));
}

#[test]
fn current_is_invalid_outside_any_body() {
    assert!(!current().valid());
    assert_eq!(current().status(), State::Dead);
    assert_eq!(yield_now(), Err(Error::InvalidCoroutine));
}

#[test]
fn invalid_handle_operations_fail() {
    let handle = CoroutineHandle::invalid();
    assert!(!handle.valid());
    assert_eq!(handle.status(), State::Dead);
    assert_eq!(handle.suspend(), Err(Error::InvalidCoroutine));
    assert_eq!(handle.push(1u8), Err(Error::InvalidCoroutine));
    assert_eq!(handle.pop::<u8>(), Err(Error::InvalidCoroutine));
    assert_eq!(handle.bytes_stored(), 0);
    assert_eq!(handle.storage_capacity(), 0);
}

#[test]
fn unchecked_fast_paths() {
    let mut coroutine = Coroutine::new(|co| unsafe {
        let n: u32 = co.pop_unchecked();
        co.push_unchecked(n * 2);
        co.suspend_unchecked();
    })
    .unwrap();
    unsafe {
        coroutine.push_unchecked(21u32);
        coroutine.resume_unchecked();
        assert_eq!(coroutine.pop_unchecked::<u32>(), 42);
    }
    coroutine.resume().unwrap();
    assert!(coroutine.done());
}

#[test]
fn allocation_accounts_for_all_regions() {
    let coroutine =
        Coroutine::with_sizes(|_| {}, StackSize(64 * 1024), StorageSize(256)).unwrap();
    assert!(coroutine.allocation_size() >= 64 * 1024 + 256);
}

#[test]
fn raw_create_rejects_missing_entry_function() {
    let desc = raw::Desc {
        func: None,
        user_data: ptr::null_mut(),
        stack_size: MIN_STACK_SIZE,
        storage_size: 0,
    };
    assert_eq!(raw::create(&desc).err(), Some(Error::InvalidArguments));
}

#[test]
fn raw_create_rejects_sub_minimum_stack() {
    unsafe fn nop(_co: *mut raw::RawCoro) {}

    let desc = raw::Desc {
        func: Some(nop),
        user_data: ptr::null_mut(),
        stack_size: MIN_STACK_SIZE - 16,
        storage_size: 0,
    };
    assert_eq!(raw::create(&desc).err(), Some(Error::InvalidArguments));
}
