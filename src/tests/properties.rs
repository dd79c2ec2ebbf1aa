use proptest::prelude::*;

use crate::Coroutine;

proptest! {
    // Pushing any sequence and popping it back always yields the reverse
    // sequence, and the cursor returns to zero.
    #[test]
    fn lifo_round_trip(values in prop::collection::vec(any::<u64>(), 0..64)) {
        let coroutine = Coroutine::new(|_| {}).unwrap();
        let handle = coroutine.handle();

        for v in &values {
            handle.push(*v).unwrap();
        }
        prop_assert_eq!(handle.bytes_stored(), values.len() * 8);

        for v in values.iter().rev() {
            prop_assert_eq!(handle.pop::<u64>().unwrap(), *v);
        }
        prop_assert_eq!(handle.bytes_stored(), 0);
    }

    // No interleaving of pushes and pops can drive the cursor beyond the
    // capacity or below zero.
    #[test]
    fn cursor_stays_within_capacity(ops in prop::collection::vec(any::<(bool, u8)>(), 0..256)) {
        let coroutine = Coroutine::new(|_| {}).unwrap();
        let handle = coroutine.handle();
        let capacity = handle.storage_capacity();

        for (is_push, value) in ops {
            if is_push {
                let _ = handle.push(value);
            } else {
                let _ = handle.pop::<u8>();
            }
            prop_assert!(handle.bytes_stored() <= capacity);
        }
    }

    // Peek never observes anything but the top of the channel and never
    // disturbs it.
    #[test]
    fn peek_preserves_contents(bytes in prop::collection::vec(any::<u8>(), 1..512)) {
        let coroutine = Coroutine::new(|_| {}).unwrap();
        let handle = coroutine.handle();

        handle.push_bytes(&bytes).unwrap();
        let stored = handle.bytes_stored();

        let mut first = vec![0u8; bytes.len()];
        let mut second = vec![0u8; bytes.len()];
        handle.peek_bytes(&mut first).unwrap();
        handle.peek_bytes(&mut second).unwrap();

        prop_assert_eq!(&first, &bytes);
        prop_assert_eq!(first, second);
        prop_assert_eq!(handle.bytes_stored(), stored);
    }

    // A value of any storable scalar round-trips through the channel
    // unchanged, across an actual context switch.
    #[test]
    fn round_trip_across_a_switch(value in any::<i64>()) {
        let mut coroutine = Coroutine::new(move |co| {
            let n: i64 = co.pop().unwrap();
            co.push(n).unwrap();
        })
        .unwrap();

        coroutine.push(value).unwrap();
        coroutine.resume().unwrap();
        prop_assert_eq!(coroutine.pop::<i64>().unwrap(), value);
    }
}
