//! Process-group communication for distributed solves
//!
//! The solver core runs single-threaded per process; parallelism comes from
//! domain decomposition across cooperating processes. This module models
//! that process group behind the [`Communicator`] trait:
//!
//! - global reductions (`sum`, `sum_batch`) are blocking collectives: every
//!   rank must reach the call before any rank proceeds
//! - `send`/`recv` are the point-to-point pair behind coupled-boundary
//!   interfaces: sends are buffered (non-blocking), receives block
//!
//! Two implementations are provided: [`SerialComm`] for single-process runs
//! and [`ThreadComm`], which runs a rank group on in-process threads over
//! `std::sync::mpsc` channels. The latter stands in for whatever transport
//! the deployment environment provides; solver code never sees the
//! difference.

use crate::traits::Scalar;
use ndarray::Array1;
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex};

/// The cooperating process group.
///
/// Every reduction a solver uses in a convergence decision must go through
/// this trait; a locally computed norm is a correctness bug, not an
/// optimization.
pub trait Communicator<S: Scalar>: Send + Sync {
    /// This process's rank in `0..size()`.
    fn rank(&self) -> usize;

    /// Number of cooperating processes.
    fn size(&self) -> usize;

    /// Globally sum one value across all ranks (blocking collective).
    fn sum(&self, local: S) -> S {
        let mut batch = [local];
        self.sum_batch(&mut batch);
        batch[0]
    }

    /// Globally sum several values in one collective (blocking).
    ///
    /// Each entry is reduced independently; fusing quantities into one call
    /// reduces the number of synchronization points, not the result.
    fn sum_batch(&self, locals: &mut [S]);

    /// Buffered point-to-point send; never blocks on the receiver.
    fn send(&self, to: usize, tag: usize, data: Vec<S>);

    /// Blocking point-to-point receive matching `(from, tag)`.
    ///
    /// Messages from the same sender with the same tag are delivered in
    /// send order.
    fn recv(&self, from: usize, tag: usize) -> Vec<S>;
}

/// Single-process communicator: reductions are the identity and there are
/// no remote ranks to exchange with.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialComm;

impl<S: Scalar> Communicator<S> for SerialComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn sum_batch(&self, _locals: &mut [S]) {}

    fn send(&self, to: usize, _tag: usize, _data: Vec<S>) {
        panic!("SerialComm: send to rank {to} in a single-process run");
    }

    fn recv(&self, from: usize, _tag: usize) -> Vec<S> {
        panic!("SerialComm: receive from rank {from} in a single-process run");
    }
}

struct Message<S> {
    from: usize,
    tag: usize,
    data: Vec<S>,
}

struct Inbox<S> {
    rx: mpsc::Receiver<Message<S>>,
    // Messages drained while waiting for a different (from, tag), kept in
    // arrival order so per-sender FIFO delivery is preserved.
    stash: Vec<Message<S>>,
}

struct ReduceSlot<S> {
    generation: u64,
    arrived: usize,
    parts: Vec<Option<Vec<S>>>,
    result: Vec<S>,
}

struct ReduceState<S> {
    slot: Mutex<ReduceSlot<S>>,
    cv: Condvar,
}

/// Rank group running on in-process threads.
///
/// Collectives combine contributions in rank order, so reduction results
/// are deterministic across runs regardless of thread scheduling.
pub struct ThreadComm<S: Scalar> {
    rank: usize,
    size: usize,
    reduce: Arc<ReduceState<S>>,
    senders: Vec<mpsc::Sender<Message<S>>>,
    inbox: Mutex<Inbox<S>>,
}

impl<S: Scalar> ThreadComm<S> {
    /// Create a group of `size` communicators, one per rank. Each is moved
    /// onto the thread that plays its rank.
    pub fn group(size: usize) -> Vec<ThreadComm<S>> {
        assert!(size > 0, "ThreadComm: group size must be at least 1");

        let reduce = Arc::new(ReduceState {
            slot: Mutex::new(ReduceSlot {
                generation: 0,
                arrived: 0,
                parts: vec![None; size],
                result: Vec::new(),
            }),
            cv: Condvar::new(),
        });

        let mut senders = Vec::with_capacity(size);
        let mut receivers = Vec::with_capacity(size);
        for _ in 0..size {
            let (tx, rx) = mpsc::channel();
            senders.push(tx);
            receivers.push(rx);
        }

        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, rx)| ThreadComm {
                rank,
                size,
                reduce: Arc::clone(&reduce),
                senders: senders.clone(),
                inbox: Mutex::new(Inbox {
                    rx,
                    stash: Vec::new(),
                }),
            })
            .collect()
    }
}

impl<S: Scalar> Communicator<S> for ThreadComm<S> {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn sum_batch(&self, locals: &mut [S]) {
        if self.size == 1 {
            return;
        }

        let mut slot = self
            .reduce
            .slot
            .lock()
            .expect("ThreadComm: reduction state poisoned");
        let generation = slot.generation;

        slot.parts[self.rank] = Some(locals.to_vec());
        slot.arrived += 1;

        if slot.arrived == self.size {
            // Last rank in combines everything in rank order.
            let mut acc = vec![S::zero(); locals.len()];
            for part in slot.parts.iter_mut() {
                let contribution = part
                    .take()
                    .expect("ThreadComm: missing rank contribution in collective");
                assert_eq!(
                    contribution.len(),
                    acc.len(),
                    "ThreadComm: ranks called sum_batch with different batch sizes"
                );
                for (a, v) in acc.iter_mut().zip(contribution) {
                    *a += v;
                }
            }
            slot.result = acc;
            slot.arrived = 0;
            slot.generation += 1;
            self.reduce.cv.notify_all();
        } else {
            while slot.generation == generation {
                slot = self
                    .reduce
                    .cv
                    .wait(slot)
                    .expect("ThreadComm: reduction state poisoned");
            }
        }

        locals.copy_from_slice(&slot.result);
    }

    fn send(&self, to: usize, tag: usize, data: Vec<S>) {
        assert!(
            to < self.size,
            "ThreadComm: send to rank {} outside group of {}",
            to,
            self.size
        );
        self.senders[to]
            .send(Message {
                from: self.rank,
                tag,
                data,
            })
            .expect("ThreadComm: receiving rank has exited");
    }

    fn recv(&self, from: usize, tag: usize) -> Vec<S> {
        assert!(
            from < self.size,
            "ThreadComm: receive from rank {} outside group of {}",
            from,
            self.size
        );
        let mut inbox = self.inbox.lock().expect("ThreadComm: inbox poisoned");

        if let Some(pos) = inbox
            .stash
            .iter()
            .position(|m| m.from == from && m.tag == tag)
        {
            return inbox.stash.remove(pos).data;
        }

        loop {
            let msg = inbox
                .rx
                .recv()
                .expect("ThreadComm: sending rank has exited");
            if msg.from == from && msg.tag == tag {
                return msg.data;
            }
            inbox.stash.push(msg);
        }
    }
}

/// Local (pre-reduction) sum of magnitudes, Σ|fᵢ|.
#[inline]
pub fn sum_mag<S: Scalar>(f: &Array1<S>) -> S {
    let mut s = S::zero();
    for v in f.iter() {
        s += v.abs();
    }
    s
}

/// Local (pre-reduction) inner product, Σ aᵢ·bᵢ.
#[inline]
pub fn sum_prod<S: Scalar>(a: &Array1<S>, b: &Array1<S>) -> S {
    assert_eq!(a.len(), b.len(), "sum_prod: vector lengths differ");
    let mut s = S::zero();
    for (x, y) in a.iter().zip(b.iter()) {
        s += *x * *y;
    }
    s
}

/// Global L1 norm Σ|fᵢ| across all ranks.
#[inline]
pub fn gsum_mag<S: Scalar>(f: &Array1<S>, comm: &dyn Communicator<S>) -> S {
    comm.sum(sum_mag(f))
}

/// Global inner product Σ aᵢ·bᵢ across all ranks.
#[inline]
pub fn gsum_prod<S: Scalar>(a: &Array1<S>, b: &Array1<S>, comm: &dyn Communicator<S>) -> S {
    comm.sum(sum_prod(a, b))
}

/// Global sum Σ fᵢ across all ranks.
#[inline]
pub fn gsum<S: Scalar>(f: &Array1<S>, comm: &dyn Communicator<S>) -> S {
    let mut s = S::zero();
    for v in f.iter() {
        s += *v;
    }
    comm.sum(s)
}

/// Global average of a field across all ranks.
pub fn gaverage<S: Scalar>(f: &Array1<S>, comm: &dyn Communicator<S>) -> S {
    let mut local = S::zero();
    for v in f.iter() {
        local += *v;
    }
    let mut batch = [local, S::from_config(f.len() as f64)];
    comm.sum_batch(&mut batch);
    if batch[1] < S::one() {
        S::zero()
    } else {
        batch[0] / batch[1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;
    use std::thread;

    #[test]
    fn serial_sums_are_identity() {
        let comm = SerialComm;
        assert_eq!(Communicator::<f64>::sum(&comm, 3.5), 3.5);
        let mut batch = [1.0_f64, 2.0];
        comm.sum_batch(&mut batch);
        assert_eq!(batch, [1.0, 2.0]);
    }

    #[test]
    fn gsum_helpers_serial() {
        let comm = SerialComm;
        let a = array![1.0_f64, -2.0, 3.0];
        let b = array![2.0_f64, 2.0, 2.0];
        assert_relative_eq!(gsum_mag(&a, &comm), 6.0);
        assert_relative_eq!(gsum_prod(&a, &b, &comm), 4.0);
        assert_relative_eq!(gsum(&a, &comm), 2.0);
        assert_relative_eq!(gaverage(&a, &comm), 2.0 / 3.0);
    }

    #[test]
    fn thread_comm_sums_across_ranks() {
        let comms = ThreadComm::<f64>::group(3);
        let handles: Vec<_> = comms
            .into_iter()
            .map(|comm| {
                thread::spawn(move || {
                    let local = (comm.rank() + 1) as f64;
                    let total = comm.sum(local);
                    let mut batch = [local, 10.0 * local];
                    comm.sum_batch(&mut batch);
                    (total, batch)
                })
            })
            .collect();

        for handle in handles {
            let (total, batch) = handle.join().unwrap();
            assert_relative_eq!(total, 6.0);
            assert_relative_eq!(batch[0], 6.0);
            assert_relative_eq!(batch[1], 60.0);
        }
    }

    #[test]
    fn thread_comm_repeated_collectives_stay_in_step() {
        let comms = ThreadComm::<f64>::group(2);
        let handles: Vec<_> = comms
            .into_iter()
            .map(|comm| {
                thread::spawn(move || {
                    let mut totals = Vec::new();
                    for round in 0..50 {
                        let local = (comm.rank() as f64 + 1.0) * round as f64;
                        totals.push(comm.sum(local));
                    }
                    totals
                })
            })
            .collect();

        let expected: Vec<f64> = (0..50).map(|r| 3.0 * r as f64).collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), expected);
        }
    }

    #[test]
    fn thread_comm_point_to_point_out_of_order_tags() {
        let comms = ThreadComm::<f64>::group(2);
        let mut iter = comms.into_iter();
        let c0 = iter.next().unwrap();
        let c1 = iter.next().unwrap();

        let t0 = thread::spawn(move || {
            c0.send(1, 7, vec![1.0, 2.0]);
            c0.send(1, 8, vec![3.0]);
        });
        let t1 = thread::spawn(move || {
            // Ask for the later tag first; the earlier message is stashed.
            let b = c1.recv(0, 8);
            let a = c1.recv(0, 7);
            (a, b)
        });

        t0.join().unwrap();
        let (a, b) = t1.join().unwrap();
        assert_eq!(a, vec![1.0, 2.0]);
        assert_eq!(b, vec![3.0]);
    }

    #[test]
    fn thread_comm_same_tag_fifo() {
        let comms = ThreadComm::<f64>::group(2);
        let mut iter = comms.into_iter();
        let c0 = iter.next().unwrap();
        let c1 = iter.next().unwrap();

        let t0 = thread::spawn(move || {
            c0.send(1, 3, vec![1.0]);
            c0.send(1, 3, vec![2.0]);
            c0.send(1, 3, vec![3.0]);
        });
        let t1 = thread::spawn(move || {
            let first = c1.recv(0, 3);
            let second = c1.recv(0, 3);
            let third = c1.recv(0, 3);
            (first, second, third)
        });

        t0.join().unwrap();
        let (first, second, third) = t1.join().unwrap();
        assert_eq!(first, vec![1.0]);
        assert_eq!(second, vec![2.0]);
        assert_eq!(third, vec![3.0]);
    }

    #[test]
    #[should_panic(expected = "single-process run")]
    fn serial_send_is_a_programming_error() {
        let comm = SerialComm;
        Communicator::<f64>::send(&comm, 1, 0, vec![1.0]);
    }
}
