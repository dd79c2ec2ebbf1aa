use crate::error::{Error, State};

#[test]
fn error_texts_are_stable() {
    assert_eq!(Error::Generic.to_string(), "generic error");
    assert_eq!(Error::InvalidPointer.to_string(), "invalid pointer");
    assert_eq!(Error::InvalidCoroutine.to_string(), "invalid coroutine");
    assert_eq!(Error::NotSuspended.to_string(), "coroutine not suspended");
    assert_eq!(Error::NotRunning.to_string(), "coroutine not running");
    assert_eq!(Error::MakeContext.to_string(), "make context error");
    assert_eq!(Error::SwitchContext.to_string(), "switch context error");
    assert_eq!(Error::NotEnoughSpace.to_string(), "not enough space");
    assert_eq!(Error::OutOfMemory.to_string(), "out of memory");
    assert_eq!(Error::InvalidArguments.to_string(), "invalid arguments");
    assert_eq!(Error::InvalidOperation.to_string(), "invalid operation");
    assert_eq!(Error::StackOverflow.to_string(), "stack overflow");
}

#[test]
fn state_texts_are_stable() {
    assert_eq!(State::Dead.to_string(), "dead");
    assert_eq!(State::Normal.to_string(), "normal");
    assert_eq!(State::Running.to_string(), "running");
    assert_eq!(State::Suspended.to_string(), "suspended");

    assert_eq!(State::Dead.as_str(), "dead");
    assert_eq!(State::Suspended.as_str(), "suspended");
}

#[test]
fn error_is_a_std_error() {
    let boxed: Box<dyn std::error::Error> = Box::new(Error::StackOverflow);
    assert_eq!(boxed.to_string(), "stack overflow");
}

#[test]
fn enums_compare_and_copy() {
    let e = Error::NotEnoughSpace;
    let e2 = e;
    assert_eq!(e, e2);
    assert_ne!(Error::Generic, Error::OutOfMemory);

    let s = State::Running;
    let s2 = s;
    assert_eq!(s, s2);
    assert_ne!(State::Running, State::Suspended);
}
