/// Type-state markers for the builder pattern
///
/// These types track at compile time whether the target address and the
/// transport have been set, so `build()` only exists once both are known.
use std::marker::PhantomData;

/// Marker trait for target state
pub trait TargetState {}

/// Target address has not been set
pub struct NoTarget;
impl TargetState for NoTarget {}

/// Target address has been set
pub struct HasTarget;
impl TargetState for HasTarget {}

/// Marker trait for transport state
pub trait TransportState {}

/// Transport has not been set
pub struct NoTransport;
impl TransportState for NoTransport {}

/// Transport has been set
pub struct HasTransport;
impl TransportState for HasTransport {}

/// Phantom marker to prevent direct construction
#[derive(Debug, Clone, Copy)]
pub struct TypeState<A, T> {
    _target: PhantomData<A>,
    _transport: PhantomData<T>,
}

impl<A, T> TypeState<A, T> {
    pub(crate) fn new() -> Self {
        Self {
            _target: PhantomData,
            _transport: PhantomData,
        }
    }
}

impl<A, T> Default for TypeState<A, T> {
    fn default() -> Self {
        Self::new()
    }
}
