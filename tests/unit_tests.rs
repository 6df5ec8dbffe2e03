//! Unit tests for the core modules
//!
//! These tests run on the host (not embedded target) to verify
//! the core algorithms work correctly.

#[cfg(test)]
mod heap_tests {
    use irqtask::heap::{BlockInfo, Heap, WORD};
    use proptest::prelude::*;

    fn arena(words: usize) -> Heap {
        let slice: &'static mut [u32] = Box::leak(vec![0u32; words].into_boxed_slice());
        Heap::from_slice(slice).expect("arena")
    }

    fn tiles(heap: &Heap) -> bool {
        let blocks: Vec<BlockInfo> = heap.blocks().collect();
        let covered: usize = blocks.iter().map(|b| b.size).sum();
        let contiguous = blocks
            .windows(2)
            .all(|w| w[0].offset + w[0].size == w[1].offset);
        covered == heap.capacity_words() && contiguous
    }

    fn no_adjacent_free(heap: &Heap) -> bool {
        let blocks: Vec<BlockInfo> = heap.blocks().collect();
        blocks.windows(2).all(|w| w[0].allocated || w[1].allocated)
    }

    #[test]
    fn test_first_fit_order() {
        let mut heap = arena(64);
        let a = heap.alloc(8).expect("a");
        let b = heap.alloc(8).expect("b");
        assert!((a.as_ptr() as usize) < (b.as_ptr() as usize));
        assert_eq!(b.as_ptr() as usize - a.as_ptr() as usize, 3 * WORD);

        // the freed hole is reused before the tail
        assert!(heap.free(a.as_ptr()));
        let c = heap.alloc(4).expect("c");
        assert_eq!(c, a);
    }

    #[test]
    fn test_whole_arena_single_block() {
        let mut heap = arena(16);
        let p = heap.alloc(15 * WORD).expect("everything");
        assert_eq!(heap.free_words(), 0);
        assert!(heap.alloc(1).is_none());
        assert!(heap.free(p.as_ptr()));
        assert_eq!(heap.blocks().count(), 1);
    }

    #[derive(Debug, Clone)]
    enum Step {
        Alloc(usize),
        Free(usize),
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            (1usize..48).prop_map(Step::Alloc),
            (0usize..16).prop_map(Step::Free),
        ]
    }

    proptest! {
        #[test]
        fn prop_blocks_always_tile(steps in prop::collection::vec(step(), 1..80)) {
            let mut heap = arena(128);
            let mut live: Vec<(*mut u8, usize, u8)> = Vec::new();
            let mut stamp = 0u8;

            for s in steps {
                match s {
                    Step::Alloc(size) => {
                        if let Some(p) = heap.alloc(size) {
                            let slice = unsafe { core::slice::from_raw_parts_mut(p.as_ptr(), size) };
                            prop_assert!(slice.iter().all(|&b| b == 0));
                            stamp = stamp.wrapping_add(1);
                            slice.fill(stamp);
                            live.push((p.as_ptr(), size, stamp));
                        }
                    }
                    Step::Free(pick) => {
                        if !live.is_empty() {
                            let (p, _, _) = live.swap_remove(pick % live.len());
                            prop_assert!(heap.free(p));
                            prop_assert!(!heap.free(p));
                        }
                    }
                }

                prop_assert!(tiles(&heap));
                prop_assert!(no_adjacent_free(&heap));
                for &(p, size, mark) in &live {
                    let slice = unsafe { core::slice::from_raw_parts(p, size) };
                    prop_assert!(slice.iter().all(|&b| b == mark));
                }
            }

            for (p, _, _) in live.drain(..) {
                prop_assert!(heap.free(p));
            }
            prop_assert_eq!(heap.blocks().count(), 1);
            prop_assert_eq!(heap.used_words(), 0);
        }
    }
}

#[cfg(test)]
mod task_tests {
    use irqtask::{complete_task, create_task, wait, when, Task, TaskStatus};
    use std::cell::RefCell;

    fn record(ctx: *mut (), task: &Task, ok: bool) {
        let log = unsafe { &*(ctx as *const RefCell<Vec<(TaskStatus, bool)>>) };
        log.borrow_mut().push((task.status(), ok));
    }

    #[test]
    fn test_free_function_api() {
        let log = RefCell::new(Vec::<(TaskStatus, bool)>::new());
        let ctx = &log as *const _ as *mut ();

        let task = create_task();
        assert!(when(&task, record, ctx));
        assert!(complete_task(&task, false));
        assert!(!wait(&task));
        assert_eq!(*log.borrow(), vec![(TaskStatus::Rejected, false)]);
    }

    #[test]
    fn test_callback_sees_final_status() {
        let log = RefCell::new(Vec::<(TaskStatus, bool)>::new());
        let ctx = &log as *const _ as *mut ();

        let task = Task::new();
        task.when(record, ctx);
        task.complete(true);
        // late registration runs at once
        task.when(record, ctx);
        assert_eq!(
            *log.borrow(),
            vec![(TaskStatus::Fulfilled, true), (TaskStatus::Fulfilled, true)]
        );
    }

    #[test]
    fn test_join_chain() {
        let a = Task::new();
        let b = Task::new();
        let c = Task::new();
        let all = &(&a + &b) + &c;

        c.complete(true);
        a.complete(true);
        assert!(all.is_pending());
        b.complete(true);
        assert_eq!(all.status(), TaskStatus::Fulfilled);
    }

    #[test]
    fn test_join_with_null_is_rejected() {
        let a = Task::new();
        let joined = a.join(&Task::null());
        assert_eq!(joined.status(), TaskStatus::Rejected);
    }
}

#[cfg(test)]
mod queue_tests {
    use irqtask::queue::{QueueItem, TaskQueue};
    use irqtask::TaskStatus;

    #[test]
    fn test_sorted_insert_is_stable() {
        let mut queue = TaskQueue::new();
        let mut tasks = Vec::new();
        for (tag, key) in [(0u8, 30u32), (1, 10), (2, 30), (3, 20), (4, 10)] {
            let (node, task) = QueueItem::new((key, tag));
            queue.insert_by(node, |new, old| new.0 < old.0);
            tasks.push(task);
        }

        let order: Vec<u8> = queue.iter().map(|item| item.op.1).collect();
        assert_eq!(order, vec![1, 4, 3, 0, 2]);

        assert_eq!(queue.resolve_all(true), 5);
        assert!(tasks.iter().all(|t| t.status() == TaskStatus::Fulfilled));
    }

    #[test]
    fn test_dropping_queue_fails_tasks() {
        let mut queue = TaskQueue::new();
        let (node, task) = QueueItem::new(());
        queue.push_back(node);
        drop(queue);
        assert_eq!(task.status(), TaskStatus::Rejected);
    }
}

#[cfg(test)]
mod ring_tests {
    use irqtask::CircularBuffer;

    #[test]
    fn test_wraparound() {
        let mut ring = CircularBuffer::new(5);
        let mut out = [0u8; 3];
        for round in 0..10u8 {
            assert_eq!(ring.write_slice(&[round, round + 1, round + 2]), 3);
            assert_eq!(ring.read_slice(&mut out), 3);
            assert_eq!(out, [round, round + 1, round + 2]);
        }
        assert!(ring.is_empty());
    }

    #[test]
    fn test_holds_capacity_minus_one() {
        let mut ring = CircularBuffer::new(4);
        assert_eq!(ring.write_slice(&[1, 2, 3, 4, 5]), 3);
        assert!(ring.is_full());
        assert!(!ring.write(9));
        assert_eq!(ring.read(), Some(1));
        assert!(ring.write(9));
    }
}

#[cfg(test)]
mod error_tests {
    use irqtask::error::OsError;

    #[test]
    fn test_error_variants() {
        assert!(OsError::HeapExhausted.is_fatal());
        assert!(!OsError::InvalidBaudRate.is_fatal());
        assert_ne!(OsError::InvalidBitRate, OsError::InvalidBaudRate);
        assert_eq!(OsError::OsRunning.code(), 24202);
    }

    #[test]
    fn test_error_debug() {
        // Ensure errors can be formatted for debugging
        let err = OsError::InvalidChannel;
        let _ = format!("{:?}", err);
    }
}

#[cfg(test)]
mod config_tests {
    use irqtask::config::*;

    #[test]
    fn test_config_values() {
        assert!(CFG_HEAP_SIZE % 4 == 0, "Heap must be whole words");
        assert!(CFG_UART_RX_BUFFER_SIZE >= 2, "Ring needs a spare slot");
        assert!(CFG_SPI_FIFO_DEPTH >= 1);
        assert!(CFG_ADC_CHANNELS <= 8, "LPC1343 has eight AD inputs");

        assert!(CFG_TICK_RATE_HZ >= 10, "Tick rate too slow");
        assert!(CFG_TICK_RATE_HZ <= 10000, "Tick rate too fast");
    }
}
