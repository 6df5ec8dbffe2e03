//! Peripheral task queue
//!
//! A singly linked FIFO of heap-allocated nodes, each pairing one operation
//! with the Task that reports it. Only the head is in service. Drivers keep
//! their queue in a [`CsCell`](crate::core::cs_cell::CsCell): nodes are built
//! outside the critical section and only linked or unlinked inside it.

use alloc::boxed::Box;
use core::ptr::NonNull;

use crate::task::Task;

/// One queued operation
pub struct QueueItem<T> {
    next: Option<Box<QueueItem<T>>>,
    pub task: Task,
    pub op: T,
}

impl<T> QueueItem<T> {
    /// Allocate a node for `op` along with a fresh Task.
    ///
    /// The returned Task is a second handle to the one stored in the node.
    pub fn new(op: T) -> (Box<QueueItem<T>>, Task) {
        let task = Task::new();
        let node = Box::new(QueueItem {
            next: None,
            task: task.clone(),
            op,
        });
        (node, task)
    }

    /// Resolve this node's Task and release the node
    pub fn finish(self: Box<Self>, success: bool) {
        let QueueItem { task, .. } = *self;
        task.complete(success);
    }
}

/// FIFO of operations with O(1) append
pub struct TaskQueue<T> {
    head: Option<Box<QueueItem<T>>>,
    tail: Option<NonNull<QueueItem<T>>>,
    len: usize,
}

// SAFETY: `tail` always points into the chain owned by `head`
unsafe impl<T: Send> Send for TaskQueue<T> {}

impl<T> Default for TaskQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TaskQueue<T> {
    pub const fn new() -> Self {
        TaskQueue {
            head: None,
            tail: None,
            len: 0,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Link `node` at the tail
    pub fn push_back(&mut self, mut node: Box<QueueItem<T>>) {
        node.next = None;
        let raw = NonNull::from(&mut *node);
        match self.tail {
            Some(mut tail) => unsafe { tail.as_mut().next = Some(node) },
            None => self.head = Some(node),
        }
        self.tail = Some(raw);
        self.len += 1;
    }

    /// Link `node` in front of the first item for which
    /// `goes_before(&node.op, &item.op)` holds, or at the tail.
    ///
    /// Nodes that compare equal keep their arrival order.
    pub fn insert_by<F>(&mut self, node: Box<QueueItem<T>>, goes_before: F)
    where
        F: Fn(&T, &T) -> bool,
    {
        let position = self.iter().position(|item| goes_before(&node.op, &item.op));
        let Some(position) = position else {
            self.push_back(node);
            return;
        };

        let mut node = node;
        let mut cursor = &mut self.head;
        for _ in 0..position {
            match cursor {
                Some(item) => cursor = &mut item.next,
                None => break,
            }
        }
        node.next = cursor.take();
        *cursor = Some(node);
        self.len += 1;
    }

    pub fn front(&self) -> Option<&QueueItem<T>> {
        self.head.as_deref()
    }

    pub fn front_mut(&mut self) -> Option<&mut QueueItem<T>> {
        self.head.as_deref_mut()
    }

    /// Item following the head
    pub fn second(&self) -> Option<&QueueItem<T>> {
        self.head.as_ref().and_then(|head| head.next.as_deref())
    }

    /// Unlink the head
    pub fn pop_front(&mut self) -> Option<Box<QueueItem<T>>> {
        let mut node = self.head.take()?;
        self.head = node.next.take();
        if self.head.is_none() {
            self.tail = None;
        }
        self.len -= 1;
        Some(node)
    }

    /// Unlink every node, leaving the queue empty
    pub fn take_all(&mut self) -> TaskQueue<T> {
        core::mem::take(self)
    }

    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            next: self.head.as_deref(),
        }
    }

    pub fn iter_mut(&mut self) -> IterMut<'_, T> {
        IterMut {
            next: self.head.as_deref_mut(),
        }
    }

    /// Resolve every queued Task with `success` and free the nodes, front
    /// to back. Returns the number of Tasks resolved.
    pub fn resolve_all(&mut self, success: bool) -> usize {
        let mut resolved = 0;
        while let Some(node) = self.pop_front() {
            node.finish(success);
            resolved += 1;
        }
        resolved
    }

    /// Resolve every queued Task with failure
    #[inline]
    pub fn fail_all(&mut self) -> usize {
        self.resolve_all(false)
    }
}

impl<T> Drop for TaskQueue<T> {
    fn drop(&mut self) {
        self.fail_all();
    }
}

pub struct Iter<'a, T> {
    next: Option<&'a QueueItem<T>>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a QueueItem<T>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next.map(|item| {
            self.next = item.next.as_deref();
            item
        })
    }
}

pub struct IterMut<'a, T> {
    next: Option<&'a mut QueueItem<T>>,
}

impl<'a, T> Iterator for IterMut<'a, T> {
    type Item = &'a mut T;

    fn next(&mut self) -> Option<Self::Item> {
        self.next.take().map(|item| {
            self.next = item.next.as_deref_mut();
            &mut item.op
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TaskStatus;

    fn ops(queue: &TaskQueue<u32>) -> Vec<u32> {
        queue.iter().map(|item| item.op).collect()
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = TaskQueue::new();
        for n in 1..=3 {
            let (node, _task) = QueueItem::new(n);
            queue.push_back(node);
        }
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.pop_front().map(|n| n.op), Some(1));
        let (node, _task) = QueueItem::new(4);
        queue.push_back(node);
        assert_eq!(ops(&queue), vec![2, 3, 4]);
    }

    #[test]
    fn test_tail_survives_draining() {
        let mut queue = TaskQueue::new();
        let (node, _) = QueueItem::new(1u32);
        queue.push_back(node);
        queue.pop_front();
        assert!(queue.is_empty());
        let (node, _) = QueueItem::new(2u32);
        queue.push_back(node);
        let (node, _) = QueueItem::new(3u32);
        queue.push_back(node);
        assert_eq!(ops(&queue), vec![2, 3]);
    }

    #[test]
    fn test_insert_sorted_stable() {
        let mut queue = TaskQueue::new();
        for n in [50u32, 10, 30, 30, 60, 5] {
            let (node, _) = QueueItem::new(n);
            queue.insert_by(node, |new, old| new < old);
        }
        assert_eq!(ops(&queue), vec![5, 10, 30, 30, 50, 60]);

        // tail still valid after inserts at both ends
        let (node, _) = QueueItem::new(70);
        queue.push_back(node);
        assert_eq!(queue.iter().last().map(|i| i.op), Some(70));
    }

    #[test]
    fn test_fail_all_resolves_every_task() {
        let mut queue = TaskQueue::new();
        let tasks: Vec<Task> = (0..4u32)
            .map(|n| {
                let (node, task) = QueueItem::new(n);
                queue.push_back(node);
                task
            })
            .collect();

        assert_eq!(queue.fail_all(), 4);
        assert!(queue.is_empty());
        assert!(tasks.iter().all(|t| t.status() == TaskStatus::Rejected));
        assert!(tasks.iter().all(|t| t.ref_count() == 1));
    }

    #[test]
    fn test_iter_mut_updates_ops() {
        let mut queue = TaskQueue::new();
        for n in [3u32, 4] {
            let (node, _) = QueueItem::new(n);
            queue.push_back(node);
        }
        queue.iter_mut().for_each(|op| *op -= 1);
        assert_eq!(ops(&queue), vec![2, 3]);
    }
}
