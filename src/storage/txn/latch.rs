// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

use std::collections::hash_map::DefaultHasher;
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};

use parking_lot::Mutex;

/// One latch slot: the queue of command ids waiting for it, front first.
#[derive(Default)]
struct Latch {
    waiting: VecDeque<u64>,
}

/// The latch state of one command.
///
/// `required_slots` is sorted and deduplicated, so two conflicting commands
/// always claim their shared slots in the same order and cannot deadlock.
#[derive(Clone)]
pub struct Lock {
    pub required_slots: Vec<usize>,
    /// How many of `required_slots` are currently held, counted from the
    /// front.
    pub owned_count: usize,
}

impl Lock {
    pub fn new(required_slots: Vec<usize>) -> Lock {
        Lock {
            required_slots,
            owned_count: 0,
        }
    }

    pub fn acquired(&self) -> bool {
        self.required_slots.len() == self.owned_count
    }

    pub fn is_write_lock(&self) -> bool {
        !self.required_slots.is_empty()
    }
}

/// A fixed table of per-key mutual exclusion slots.
///
/// A command hashes every key it will write into a slot index and must be
/// at the front of the wait queue of every slot before it may run.
/// Releasing pops the command from each queue and reports which commands
/// have become the new front, i.e. candidates to retry acquisition.
pub struct Latches {
    slots: Vec<Mutex<Latch>>,
    size: usize,
}

impl Latches {
    /// Creates latches with `size` slots. The size should comfortably
    /// exceed the number of concurrent commands, otherwise unrelated keys
    /// hash onto the same slot and serialize needlessly.
    pub fn new(size: usize) -> Latches {
        let mut slots = Vec::with_capacity(size);
        slots.resize_with(size, Default::default);
        Latches { slots, size }
    }

    /// Computes the latch lock of a command from the keys it declares.
    pub fn gen_lock<H: Hash>(&self, keys: &[H]) -> Lock {
        let mut slots: Vec<usize> = keys.iter().map(|x| self.calc_slot(x)).collect();
        slots.sort_unstable();
        slots.dedup();
        Lock::new(slots)
    }

    /// Tries to acquire every required slot of `lock` for command `who`.
    ///
    /// Acquisition is incremental: slots already owned stay owned, and on
    /// the first busy slot the command is enqueued there and `false` is
    /// returned. The command will be reported by `release` of the current
    /// holder once it reaches the front.
    pub fn acquire(&self, lock: &mut Lock, who: u64) -> bool {
        while lock.owned_count < lock.required_slots.len() {
            let slot_index = lock.required_slots[lock.owned_count];
            let mut latch = self.slots[slot_index].lock();
            match latch.waiting.front() {
                Some(&cid) if cid == who => {
                    lock.owned_count += 1;
                }
                Some(_) => {
                    if !latch.waiting.contains(&who) {
                        latch.waiting.push_back(who);
                    }
                    return false;
                }
                None => {
                    latch.waiting.push_back(who);
                    lock.owned_count += 1;
                }
            }
        }
        true
    }

    /// Releases all slots of `lock` and returns the commands now at the
    /// front of the freed queues.
    pub fn release(&self, lock: &Lock, who: u64) -> Vec<u64> {
        let mut wakeup_list = Vec::with_capacity(lock.owned_count);
        for &slot_index in &lock.required_slots[..lock.owned_count] {
            let mut latch = self.slots[slot_index].lock();
            let front = latch.waiting.pop_front().unwrap();
            assert_eq!(front, who);
            if let Some(&wakeup) = latch.waiting.front() {
                wakeup_list.push(wakeup);
            }
        }
        wakeup_list
    }

    fn calc_slot<H: Hash>(&self, key: &H) -> usize {
        let mut s = DefaultHasher::new();
        key.hash(&mut s);
        (s.finish() as usize) % self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wakeup() {
        let latches = Latches::new(256);

        let slots_a = vec![1, 3, 5];
        let mut lock_a = Lock::new(slots_a);
        let slots_b = vec![4, 5, 6];
        let mut lock_b = Lock::new(slots_b);
        let cid_a: u64 = 1;
        let cid_b: u64 = 2;

        // A acquires all of its slots.
        assert!(latches.acquire(&mut lock_a, cid_a));

        // B stops at slot 5, which A holds.
        assert!(!latches.acquire(&mut lock_b, cid_b));
        assert_eq!(lock_b.owned_count, 1);

        // Releasing A wakes up B.
        let wakeup = latches.release(&lock_a, cid_a);
        assert_eq!(wakeup, vec![cid_b]);

        assert!(latches.acquire(&mut lock_b, cid_b));
        assert!(latches.release(&lock_b, cid_b).is_empty());
    }

    #[test]
    fn test_partial_acquire_keeps_position() {
        let latches = Latches::new(256);

        let mut lock_a = Lock::new(vec![3, 4]);
        let mut lock_b = Lock::new(vec![4, 5]);
        let mut lock_c = Lock::new(vec![4]);

        assert!(latches.acquire(&mut lock_a, 1));
        assert!(!latches.acquire(&mut lock_b, 2));
        assert!(!latches.acquire(&mut lock_c, 3));

        // A retried acquire must not enqueue a second time.
        assert!(!latches.acquire(&mut lock_b, 2));

        let wakeup = latches.release(&lock_a, 1);
        assert_eq!(wakeup, vec![2]);
        assert!(latches.acquire(&mut lock_b, 2));

        // C is still queued behind B on slot 4.
        let wakeup = latches.release(&lock_b, 2);
        assert_eq!(wakeup, vec![3]);
        assert!(latches.acquire(&mut lock_c, 3));
        assert!(latches.release(&lock_c, 3).is_empty());
    }

    #[test]
    fn test_gen_lock_sorts_and_dedups() {
        let latches = Latches::new(256);
        let keys: Vec<&[u8]> = vec![b"k2", b"k1", b"k2", b"k3"];
        let lock = latches.gen_lock(&keys);
        assert!(lock.required_slots.len() <= 3);
        let mut sorted = lock.required_slots.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(lock.required_slots, sorted);
        assert!(lock.is_write_lock());
        assert!(!latches.gen_lock::<Vec<u8>>(&[]).is_write_lock());
    }

    #[test]
    fn test_disjoint_commands_do_not_block() {
        let latches = Latches::new(256);
        let mut lock_a = Lock::new(vec![1, 2]);
        let mut lock_b = Lock::new(vec![3, 4]);
        assert!(latches.acquire(&mut lock_a, 1));
        assert!(latches.acquire(&mut lock_b, 2));
        assert!(latches.release(&lock_a, 1).is_empty());
        assert!(latches.release(&lock_b, 2).is_empty());
    }
}
