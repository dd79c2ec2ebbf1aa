use std::cell::Cell;
use std::rc::Rc;

use crate::error::Error;
use crate::{Coroutine, StackSize, StorageSize, DEFAULT_STORAGE_SIZE};

#[test]
fn values_pushed_before_resume_are_seen_in_lifo_order() {
    let seen = Rc::new(Cell::new([0i32; 3]));
    let seen2 = seen.clone();
    let mut coroutine = Coroutine::new(move |co| {
        let a: i32 = co.pop().unwrap();
        let b: i32 = co.pop().unwrap();
        let c: i32 = co.pop().unwrap();
        seen2.set([a, b, c]);
    })
    .unwrap();

    coroutine.push(1i32).unwrap();
    coroutine.push(2i32).unwrap();
    coroutine.push(3i32).unwrap();
    assert_eq!(coroutine.bytes_stored(), 12);

    coroutine.resume().unwrap();
    assert_eq!(seen.get(), [3, 2, 1]);
    assert_eq!(coroutine.bytes_stored(), 0);
}

#[test]
fn small_struct_round_trip() {
    #[derive(Clone, Copy, Debug, PartialEq)]
    struct Sample {
        a: i32,
        b: f32,
        c: u8,
    }

    let sent = Sample {
        a: 123,
        b: 3.14,
        c: b'X',
    };

    let mut coroutine = Coroutine::new(move |co| {
        let got: Sample = co.pop().unwrap();
        assert_eq!(got, sent);
        // Send a reply back across the switch.
        co.push(got.a + 1).unwrap();
    })
    .unwrap();

    coroutine.push(sent).unwrap();
    coroutine.resume().unwrap();
    assert_eq!(coroutine.pop::<i32>().unwrap(), 124);
}

#[test]
fn pop_from_empty_channel_fails() {
    let coroutine = Coroutine::new(|_| {}).unwrap();
    assert_eq!(coroutine.pop::<u8>(), Err(Error::NotEnoughSpace));
    assert_eq!(coroutine.peek::<u8>(), Err(Error::NotEnoughSpace));
}

#[test]
fn push_beyond_capacity_fails_without_partial_write() {
    let coroutine = Coroutine::new(|_| {}).unwrap();
    assert_eq!(coroutine.storage_capacity(), DEFAULT_STORAGE_SIZE);

    coroutine.push([0u8; 1024]).unwrap();
    assert_eq!(coroutine.bytes_stored(), 1024);

    assert_eq!(coroutine.push(1u8), Err(Error::NotEnoughSpace));
    assert_eq!(coroutine.bytes_stored(), 1024);
}

#[test]
fn peek_is_idempotent_and_leaves_cursor_alone() {
    let coroutine = Coroutine::new(|_| {}).unwrap();
    coroutine.push(0xfeed_beef_u64).unwrap();

    assert_eq!(coroutine.peek::<u64>().unwrap(), 0xfeed_beef_u64);
    assert_eq!(coroutine.peek::<u64>().unwrap(), 0xfeed_beef_u64);
    assert_eq!(coroutine.bytes_stored(), 8);

    assert_eq!(coroutine.pop::<u64>().unwrap(), 0xfeed_beef_u64);
    assert_eq!(coroutine.bytes_stored(), 0);
}

#[test]
fn zero_length_operations_are_noop_successes() {
    let coroutine = Coroutine::new(|_| {}).unwrap();
    let handle = coroutine.handle();

    handle.push_bytes(&[]).unwrap();
    handle.pop_bytes(&mut []).unwrap();
    handle.peek_bytes(&mut []).unwrap();
    handle.discard(0).unwrap();
    assert_eq!(handle.bytes_stored(), 0);
}

#[test]
fn byte_level_channel_round_trip() {
    let coroutine = Coroutine::new(|_| {}).unwrap();
    let handle = coroutine.handle();

    handle.push_bytes(b"abcdef").unwrap();
    assert_eq!(handle.bytes_stored(), 6);

    let mut top = [0u8; 2];
    handle.peek_bytes(&mut top).unwrap();
    assert_eq!(&top, b"ef");
    assert_eq!(handle.bytes_stored(), 6);

    handle.pop_bytes(&mut top).unwrap();
    assert_eq!(&top, b"ef");
    assert_eq!(handle.bytes_stored(), 4);

    handle.discard(4).unwrap();
    assert_eq!(handle.bytes_stored(), 0);
    assert_eq!(handle.discard(1), Err(Error::NotEnoughSpace));
}

#[test]
fn custom_storage_capacity_is_honored() {
    let coroutine = Coroutine::with_sizes(|_| {}, StackSize::default(), StorageSize(16)).unwrap();
    assert_eq!(coroutine.storage_capacity(), 16);

    coroutine.push([0u8; 16]).unwrap();
    assert_eq!(coroutine.push(0u8), Err(Error::NotEnoughSpace));
}

#[test]
fn values_pushed_by_body_are_visible_after_resume() {
    let mut coroutine = Coroutine::new(|co| {
        co.push(7u16).unwrap();
        co.suspend().unwrap();
        co.push(8u16).unwrap();
    })
    .unwrap();

    coroutine.resume().unwrap();
    assert_eq!(coroutine.pop::<u16>().unwrap(), 7);
    coroutine.resume().unwrap();
    assert_eq!(coroutine.pop::<u16>().unwrap(), 8);
    assert!(coroutine.done());
}
