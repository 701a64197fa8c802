// ============================================================================
// Sequencer
// Pre-allocated multi-producer / single-consumer ring buffer that assigns
// every accepted event its sequence number
// ============================================================================
//
// Each slot carries a stamp. For the event at position `pos` (sequence
// `pos + 1`) living in slot `pos & mask`:
//
//   stamp == pos             slot free for this lap, producers may claim it
//   stamp == pos + 1         event published, consumer may take it
//   stamp == pos + capacity  consumed, slot free for the next lap
//
// Producers claim a position with one CAS on the write cursor. The position
// is the sequence, so the consumer (which walks positions in order) sees
// events in exactly sequence order no matter which thread published first.

use crossbeam::utils::{Backoff, CachePadded};
use std::cell::UnsafeCell;
use std::fmt;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// The ring is full; the rejected event is handed back
pub struct SequencerFull<T>(pub T);

impl<T> fmt::Debug for SequencerFull<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SequencerFull(..)")
    }
}

impl<T> fmt::Display for SequencerFull<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("sequencer full")
    }
}

impl<T> std::error::Error for SequencerFull<T> {}

/// An event together with the sequence it was assigned on publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequenced<T> {
    pub sequence: u64,
    pub event: T,
}

struct Slot<T> {
    stamp: AtomicU64,
    value: UnsafeCell<MaybeUninit<T>>,
}

struct Ring<T> {
    slots: Box<[Slot<T>]>,
    mask: u64,
    capacity: u64,
    write_cursor: CachePadded<AtomicU64>,
    read_cursor: CachePadded<AtomicU64>,
}

// Slot access is arbitrated by the stamps: a producer writes a slot only
// after winning its position, the consumer reads it only after the stamp
// says it was published.
unsafe impl<T: Send> Send for Ring<T> {}
unsafe impl<T: Send> Sync for Ring<T> {}

impl<T> Drop for Ring<T> {
    fn drop(&mut self) {
        let read = *self.read_cursor.get_mut();
        let write = *self.write_cursor.get_mut();

        for pos in read..write {
            let slot = &mut self.slots[(pos & self.mask) as usize];
            if *slot.stamp.get_mut() == pos + 1 {
                // SAFETY: published and never consumed, so initialized.
                unsafe { slot.value.get_mut().assume_init_drop() };
            }
        }
    }
}

/// Create a sequencer with `capacity` pre-allocated slots.
///
/// `capacity` must be a power of two (checked by `EngineConfig::validate`);
/// other values are rounded up.
pub fn sequencer<T: Send>(capacity: usize) -> (Sequencer<T>, SequenceConsumer<T>) {
    let capacity = capacity.max(2).next_power_of_two();
    let slots = (0..capacity as u64)
        .map(|i| Slot {
            stamp: AtomicU64::new(i),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        })
        .collect::<Vec<_>>()
        .into_boxed_slice();

    let ring = Arc::new(Ring {
        slots,
        mask: capacity as u64 - 1,
        capacity: capacity as u64,
        write_cursor: CachePadded::new(AtomicU64::new(0)),
        read_cursor: CachePadded::new(AtomicU64::new(0)),
    });

    (
        Sequencer {
            ring: Arc::clone(&ring),
        },
        SequenceConsumer { ring },
    )
}

// ============================================================================
// Producer half
// ============================================================================

/// Producer handle; cheap to clone and share across submitting threads
pub struct Sequencer<T> {
    ring: Arc<Ring<T>>,
}

impl<T> Clone for Sequencer<T> {
    fn clone(&self) -> Self {
        Self {
            ring: Arc::clone(&self.ring),
        }
    }
}

impl<T: Send> Sequencer<T> {
    /// Claim the next sequence and publish `event` under it.
    ///
    /// Never blocks: when the consumer is a full lap behind, the event is
    /// returned in `SequencerFull`.
    pub fn publish(&self, event: T) -> Result<u64, SequencerFull<T>> {
        let ring = &*self.ring;
        let backoff = Backoff::new();
        let mut pos = ring.write_cursor.load(Ordering::Relaxed);

        loop {
            let slot = &ring.slots[(pos & ring.mask) as usize];
            let stamp = slot.stamp.load(Ordering::Acquire);

            if stamp == pos {
                match ring.write_cursor.compare_exchange_weak(
                    pos,
                    pos + 1,
                    Ordering::SeqCst,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        // SAFETY: winning the CAS gives exclusive write access
                        // to this slot until the stamp is released below.
                        unsafe { (*slot.value.get()).write(event) };
                        slot.stamp.store(pos + 1, Ordering::Release);
                        return Ok(pos + 1);
                    },
                    Err(current) => {
                        pos = current;
                        backoff.spin();
                    },
                }
            } else if stamp < pos {
                // Slot still belongs to the previous lap.
                let current = ring.write_cursor.load(Ordering::Relaxed);
                if current == pos {
                    return Err(SequencerFull(event));
                }
                pos = current;
            } else {
                // Another producer already took this position.
                backoff.spin();
                pos = ring.write_cursor.load(Ordering::Relaxed);
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity as usize
    }

    /// Events claimed but not yet consumed (approximate under contention)
    pub fn len(&self) -> usize {
        let write = self.ring.write_cursor.load(Ordering::Acquire);
        let read = self.ring.read_cursor.load(Ordering::Acquire);
        write.saturating_sub(read) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Highest sequence handed out so far (0 before the first publish)
    pub fn last_claimed(&self) -> u64 {
        self.ring.write_cursor.load(Ordering::Acquire)
    }
}

// ============================================================================
// Consumer half
// ============================================================================

/// The single consumer; not `Clone`, so only one thread can drain the ring
pub struct SequenceConsumer<T> {
    ring: Arc<Ring<T>>,
}

impl<T: Send> SequenceConsumer<T> {
    /// Take the next event in sequence order, if it has been published.
    ///
    /// Returns `None` when the ring is empty or when the next position was
    /// claimed but its producer has not finished writing yet.
    pub fn try_consume(&mut self) -> Option<Sequenced<T>> {
        let ring = &*self.ring;
        let pos = ring.read_cursor.load(Ordering::Relaxed);
        let slot = &ring.slots[(pos & ring.mask) as usize];

        if slot.stamp.load(Ordering::Acquire) != pos + 1 {
            return None;
        }

        // SAFETY: the stamp says a producer finished writing this slot and
        // only this consumer reads it.
        let event = unsafe { (*slot.value.get()).assume_init_read() };
        slot.stamp.store(pos + ring.capacity, Ordering::Release);
        ring.read_cursor.store(pos + 1, Ordering::Release);

        Some(Sequenced {
            sequence: pos + 1,
            event,
        })
    }

    /// Sequence the next `try_consume` will yield
    pub fn next_sequence(&self) -> u64 {
        self.ring.read_cursor.load(Ordering::Relaxed) + 1
    }

    /// Whether any claimed event is still waiting
    pub fn has_pending(&self) -> bool {
        self.ring.write_cursor.load(Ordering::Acquire) > self.ring.read_cursor.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::quickcheck;
    use std::collections::VecDeque;
    use std::thread;

    #[test]
    fn test_sequences_start_at_one_and_are_gapless() {
        let (producer, mut consumer) = sequencer::<&str>(4);

        assert_eq!(producer.publish("a").unwrap(), 1);
        assert_eq!(producer.publish("b").unwrap(), 2);

        assert_eq!(
            consumer.try_consume(),
            Some(Sequenced {
                sequence: 1,
                event: "a"
            })
        );
        assert_eq!(consumer.next_sequence(), 2);
        assert_eq!(consumer.try_consume().unwrap().sequence, 2);
        assert!(consumer.try_consume().is_none());
    }

    #[test]
    fn test_full_ring_fails_fast_and_returns_event() {
        let (producer, mut consumer) = sequencer::<u32>(4);
        for i in 0..4 {
            producer.publish(i).unwrap();
        }

        let rejected = producer.publish(99).unwrap_err();
        assert_eq!(rejected.0, 99);
        assert_eq!(producer.len(), 4);

        // Freeing one slot admits exactly one more event.
        consumer.try_consume().unwrap();
        assert_eq!(producer.publish(4).unwrap(), 5);
        assert!(producer.publish(5).is_err());
    }

    #[test]
    fn test_capacity_rounds_to_power_of_two() {
        let (producer, _consumer) = sequencer::<u8>(5);
        assert_eq!(producer.capacity(), 8);
    }

    #[test]
    fn test_unconsumed_events_dropped_with_ring() {
        let marker = Arc::new(());
        {
            let (producer, _consumer) = sequencer::<Arc<()>>(4);
            producer.publish(Arc::clone(&marker)).unwrap();
            producer.publish(Arc::clone(&marker)).unwrap();
            assert_eq!(Arc::strong_count(&marker), 3);
        }
        assert_eq!(Arc::strong_count(&marker), 1);
    }

    #[test]
    fn test_concurrent_producers_keep_per_thread_order() {
        const PRODUCERS: usize = 4;
        const PER_PRODUCER: usize = 2_000;

        let (producer, mut consumer) = sequencer::<(usize, usize)>(64);

        let handles: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let producer = producer.clone();
                thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        let mut event = (p, i);
                        loop {
                            match producer.publish(event) {
                                Ok(_) => break,
                                Err(SequencerFull(back)) => {
                                    event = back;
                                    thread::yield_now();
                                },
                            }
                        }
                    }
                })
            })
            .collect();

        let mut expected_sequence = 1;
        let mut next_per_producer = [0usize; PRODUCERS];
        while expected_sequence <= (PRODUCERS * PER_PRODUCER) as u64 {
            if let Some(Sequenced { sequence, event }) = consumer.try_consume() {
                assert_eq!(sequence, expected_sequence);
                assert_eq!(event.1, next_per_producer[event.0]);
                next_per_producer[event.0] += 1;
                expected_sequence += 1;
            } else {
                thread::yield_now();
            }
        }

        for handle in handles {
            handle.join().unwrap();
        }
        assert!(!consumer.has_pending());
    }

    quickcheck! {
        fn prop_behaves_like_bounded_fifo(ops: Vec<Option<u8>>) -> bool {
            let (producer, mut consumer) = sequencer::<u8>(8);
            let mut model: VecDeque<(u64, u8)> = VecDeque::new();
            let mut next_sequence = 1u64;

            for op in ops {
                match op {
                    Some(value) => match producer.publish(value) {
                        Ok(sequence) => {
                            if model.len() == 8 || sequence != next_sequence {
                                return false;
                            }
                            model.push_back((sequence, value));
                            next_sequence += 1;
                        },
                        Err(SequencerFull(back)) => {
                            if model.len() != 8 || back != value {
                                return false;
                            }
                        },
                    },
                    None => {
                        let got = consumer
                            .try_consume()
                            .map(|s| (s.sequence, s.event));
                        if got != model.pop_front() {
                            return false;
                        }
                    },
                }
            }
            true
        }
    }
}
