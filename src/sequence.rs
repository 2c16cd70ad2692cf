//! Sequence numbers and the strategies that allocate them.
//!
//! Every stored value is addressed by a dense, 0-based [`Sequence`]. Engines
//! differ in how they produce the next one:
//!
//! - **Counter key**: the last assigned sequence lives under a well-known key
//!   and is rewritten in the same transaction as the value ([`CounterKey`]).
//! - **Native counter**: the engine owns an atomic 1-based counter that
//!   advances as a side effect of appending ([`NativeCounter`]).
//!
//! Both implement [`SequenceAllocator`], so adapters never expose native
//! indexing to callers.

use crate::error::{Error, Result};
use std::fmt;

/// Address of an appended value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Sequence(u64);

/// Size of an encoded sequence in bytes.
pub const SEQUENCE_SIZE: usize = 8;

impl Sequence {
    /// The first sequence assigned in any storage instance.
    pub const ZERO: Sequence = Sequence(0);

    /// The largest representable sequence.
    pub const MAX: Sequence = Sequence(u64::MAX);

    /// Creates a sequence from its numeric value.
    pub const fn new(value: u64) -> Self {
        Sequence(value)
    }

    /// Returns the numeric value.
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Returns the sequence after this one.
    pub fn next(self) -> Result<Sequence> {
        self.0
            .checked_add(1)
            .map(Sequence)
            .ok_or_else(|| Error::SequenceAllocation("sequence space exhausted".to_string()))
    }

    /// Encodes the sequence big-endian, so byte order matches numeric order.
    pub fn to_be_bytes(self) -> [u8; SEQUENCE_SIZE] {
        self.0.to_be_bytes()
    }

    /// Decodes a big-endian sequence.
    pub fn from_be_bytes(bytes: &[u8]) -> Result<Self> {
        let raw: [u8; SEQUENCE_SIZE] = bytes.try_into().map_err(|_| {
            Error::corruption(format!("invalid sequence length: {} bytes", bytes.len()))
        })?;
        Ok(Sequence(u64::from_be_bytes(raw)))
    }
}

impl From<u64> for Sequence {
    fn from(value: u64) -> Self {
        Sequence(value)
    }
}

impl From<Sequence> for u64 {
    fn from(seq: Sequence) -> Self {
        seq.0
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Produces sequences inside one transaction.
pub trait SequenceAllocator {
    /// Assigns the next sequence.
    ///
    /// The assignment becomes durable only when the enclosing transaction
    /// commits.
    fn allocate_next(&mut self) -> Result<Sequence>;

    /// Number of sequences assigned so far, including this transaction's.
    fn current_count(&self) -> u64;
}

/// Transactional storage for the "last assigned sequence" key.
pub trait CounterStore {
    /// Reads the last assigned sequence, `None` if nothing was assigned yet.
    fn load(&self) -> Result<Option<Sequence>>;

    /// Records `seq` as the last assigned sequence.
    fn store(&mut self, seq: Sequence) -> Result<()>;
}

/// Counter-key strategy.
///
/// The stored counter is read once per transaction and cached; every
/// allocation writes the new value back through the store, which must be
/// the same transaction that persists the value itself.
pub struct CounterKey<S> {
    store: S,
    last: Option<Option<Sequence>>,
}

impl<S: CounterStore> CounterKey<S> {
    /// Creates an allocator over a transaction-bound store.
    pub fn new(store: S) -> Self {
        Self { store, last: None }
    }

    /// Returns the underlying store, for writes that share its transaction.
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Consumes the allocator and returns the store.
    pub fn into_store(self) -> S {
        self.store
    }

    fn last(&mut self) -> Result<Option<Sequence>> {
        match self.last {
            Some(last) => Ok(last),
            None => {
                let last = self.store.load().map_err(|e| {
                    Error::SequenceAllocation(format!("reading counter: {}", e))
                })?;
                self.last = Some(last);
                Ok(last)
            }
        }
    }
}

impl<S: CounterStore> SequenceAllocator for CounterKey<S> {
    fn allocate_next(&mut self) -> Result<Sequence> {
        let next = match self.last()? {
            Some(last) => last.next()?,
            None => Sequence::ZERO,
        };

        self.store
            .store(next)
            .map_err(|e| Error::SequenceAllocation(format!("writing counter: {}", e)))?;
        self.last = Some(Some(next));

        Ok(next)
    }

    fn current_count(&self) -> u64 {
        match self.last {
            Some(Some(last)) => last.value() + 1,
            _ => 0,
        }
    }
}

/// An engine-owned atomic counter that starts at 1.
pub trait AutoIncrement {
    /// Advances the counter and returns its new value.
    fn increment(&mut self) -> Result<u64>;

    /// Current counter value, 0 when nothing was assigned.
    fn count(&self) -> u64;
}

/// Native-counter strategy.
///
/// Delegates to the engine's 1-based counter and converts each value to a
/// 0-based sequence.
pub struct NativeCounter<I> {
    inner: I,
}

impl<I: AutoIncrement> NativeCounter<I> {
    /// Wraps an engine counter.
    pub fn new(inner: I) -> Self {
        Self { inner }
    }

    /// Returns the wrapped counter.
    pub fn into_inner(self) -> I {
        self.inner
    }
}

impl<I: AutoIncrement> SequenceAllocator for NativeCounter<I> {
    fn allocate_next(&mut self) -> Result<Sequence> {
        let before = self.inner.count();
        let native = self.inner.increment()?;

        if native == 0 {
            return Err(Error::SequenceAllocation(
                "native counter returned 0".to_string(),
            ));
        }
        if native != before + 1 {
            return Err(Error::SequenceAllocation(format!(
                "native counter jumped from {} to {}",
                before, native
            )));
        }

        Ok(Sequence(native - 1))
    }

    fn current_count(&self) -> u64 {
        self.inner.count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// In-memory counter store with an explicit commit step.
    #[derive(Default)]
    struct MemoryStore {
        committed: Option<Sequence>,
        pending: Option<Sequence>,
        fail_loads: bool,
    }

    impl CounterStore for MemoryStore {
        fn load(&self) -> Result<Option<Sequence>> {
            if self.fail_loads {
                return Err(Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "boom")));
            }
            Ok(self.committed)
        }

        fn store(&mut self, seq: Sequence) -> Result<()> {
            self.pending = Some(seq);
            Ok(())
        }
    }

    struct FakeEngine {
        counter: u64,
        step: u64,
    }

    impl AutoIncrement for FakeEngine {
        fn increment(&mut self) -> Result<u64> {
            self.counter += self.step;
            Ok(self.counter)
        }

        fn count(&self) -> u64 {
            self.counter
        }
    }

    #[test]
    fn test_sequence_encoding_orders_numerically() {
        let mut encoded: Vec<[u8; 8]> =
            [256u64, 1, 0, u64::MAX, 255].iter().map(|v| Sequence::new(*v).to_be_bytes()).collect();
        encoded.sort();

        let decoded: Vec<u64> =
            encoded.iter().map(|b| Sequence::from_be_bytes(b).unwrap().value()).collect();
        assert_eq!(decoded, vec![0, 1, 255, 256, u64::MAX]);
    }

    #[test]
    fn test_sequence_decode_rejects_bad_length() {
        assert!(matches!(Sequence::from_be_bytes(&[1, 2, 3]), Err(Error::Corruption(_))));
    }

    #[test]
    fn test_sequence_next_overflow() {
        assert!(Sequence::MAX.next().is_err());
        assert_eq!(Sequence::new(9).next().unwrap(), Sequence::new(10));
    }

    #[test]
    fn test_counter_key_starts_at_zero() {
        let mut alloc = CounterKey::new(MemoryStore::default());
        assert_eq!(alloc.current_count(), 0);

        let seqs: Vec<u64> = (0..5).map(|_| alloc.allocate_next().unwrap().value()).collect();
        assert_eq!(seqs, vec![0, 1, 2, 3, 4]);
        assert_eq!(alloc.current_count(), 5);
        assert_eq!(alloc.into_store().pending, Some(Sequence::new(4)));
    }

    #[test]
    fn test_counter_key_continues_from_committed() {
        let store = MemoryStore { committed: Some(Sequence::new(41)), ..Default::default() };
        let mut alloc = CounterKey::new(store);
        assert_eq!(alloc.allocate_next().unwrap(), Sequence::new(42));
    }

    #[test]
    fn test_counter_key_load_failure() {
        let store = MemoryStore { fail_loads: true, ..Default::default() };
        let mut alloc = CounterKey::new(store);
        let err = alloc.allocate_next().unwrap_err();
        assert!(matches!(err, Error::SequenceAllocation(_)));
        assert_eq!(alloc.store_mut().pending, None);
    }

    #[test]
    fn test_native_counter_is_converted_to_zero_based() {
        let mut alloc = NativeCounter::new(FakeEngine { counter: 0, step: 1 });
        let seqs: Vec<u64> = (0..4).map(|_| alloc.allocate_next().unwrap().value()).collect();
        assert_eq!(seqs, vec![0, 1, 2, 3]);
        assert_eq!(alloc.current_count(), 4);
    }

    #[test]
    fn test_native_counter_rejects_gaps() {
        let mut alloc = NativeCounter::new(FakeEngine { counter: 0, step: 2 });
        assert!(matches!(alloc.allocate_next(), Err(Error::SequenceAllocation(_))));
    }

    #[test]
    fn test_sequences_are_unique() {
        let mut alloc = CounterKey::new(MemoryStore::default());
        let mut seen = HashMap::new();
        for i in 0..1000u64 {
            let seq = alloc.allocate_next().unwrap();
            assert!(seen.insert(seq, i).is_none());
        }
    }
}
