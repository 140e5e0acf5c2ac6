//! The registry of socket tasks of a resolver.

use crate::engine::Interest;
use std::collections::HashMap;
use std::os::unix::io::RawFd;
use tokio::sync::watch;
use tracing::trace;

//------------ TaskRegistry --------------------------------------------------

/// All live socket tasks of a resolver keyed by their descriptor.
///
/// An entry is added when the engine first shows interest in a descriptor
/// and removed only by the task itself once it has stopped polling. This
/// way, a descriptor that is closed and reused by the engine while the old
/// task is still winding down is handed to the same entry rather than
/// ending up with two tasks polling it.
#[derive(Debug, Default)]
pub(super) struct TaskRegistry {
    tasks: HashMap<RawFd, SocketTask>,
    next_id: u64,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_mut(&mut self, fd: RawFd) -> Option<&mut SocketTask> {
        self.tasks.get_mut(&fd)
    }

    /// Creates a new entry for `fd`.
    ///
    /// Returns the entry’s task id and the control channel the task needs
    /// to watch.
    pub fn insert(
        &mut self,
        fd: RawFd,
        interest: Interest,
    ) -> (u64, watch::Receiver<Control>) {
        debug_assert!(!self.tasks.contains_key(&fd));
        let id = self.next_id;
        self.next_id += 1;
        let (control, rx) = watch::channel(Control::new(interest, 0));
        self.tasks.insert(
            fd,
            SocketTask {
                id,
                interest,
                generation: 0,
                control,
                closing: false,
            },
        );
        (id, rx)
    }

    /// Removes the entry for `fd` if it belongs to the task `id`.
    pub fn remove(&mut self, fd: RawFd, id: u64) -> bool {
        match self.tasks.get(&fd) {
            Some(task) if task.id == id => {
                self.tasks.remove(&fd);
                true
            }
            _ => false,
        }
    }

    /// Asks all tasks to close.
    pub fn close_all(&mut self) {
        for task in self.tasks.values_mut() {
            task.close();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }
}

//------------ Control -------------------------------------------------------

/// The state requested of a socket task.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(super) struct Control {
    /// The interest to poll for.
    ///
    /// An interest of none asks the task to close.
    pub interest: Interest,

    /// The number of close requests made so far.
    ///
    /// If this changes while the interest stays the same, the descriptor
    /// has been closed and reused and the task has to register it anew.
    pub generation: u64,
}

impl Control {
    fn new(interest: Interest, generation: u64) -> Self {
        Control {
            interest,
            generation,
        }
    }
}

//------------ SocketTask ----------------------------------------------------

/// The registry’s view of a socket task.
#[derive(Debug)]
pub(super) struct SocketTask {
    /// The identifier of the task.
    id: u64,

    /// The interest most recently requested.
    interest: Interest,

    /// The number of close requests made so far.
    generation: u64,

    /// The channel for passing new interest to the task.
    control: watch::Sender<Control>,

    /// Has the task been asked to close?
    closing: bool,
}

impl SocketTask {
    /// Changes the interest of the task.
    ///
    /// This supersedes a close request the task hasn’t acted upon yet. In
    /// that case the descriptor now refers to a new socket, which the task
    /// notices through the changed generation.
    pub fn configure(&mut self, interest: Interest) {
        debug_assert!(!interest.is_none());
        if !self.closing && self.interest == interest {
            return;
        }
        trace!(
            id = self.id, %interest, generation = self.generation,
            "reconfiguring socket task"
        );
        self.closing = false;
        self.interest = interest;
        self.control
            .send_replace(Control::new(interest, self.generation));
    }

    /// Asks the task to close.
    ///
    /// Returns whether this is the first request.
    pub fn close(&mut self) -> bool {
        if self.closing {
            return false;
        }
        trace!(id = self.id, "closing socket task");
        self.closing = true;
        self.generation += 1;
        self.control
            .send_replace(Control::new(Interest::NONE, self.generation));
        true
    }

    #[cfg(test)]
    pub fn is_closing(&self) -> bool {
        self.closing
    }

    #[cfg(test)]
    pub fn interest(&self) -> Interest {
        self.interest
    }
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn reconfigure_keeps_entry() {
        let mut registry = TaskRegistry::new();
        let (id, mut rx) = registry.insert(7, Interest::READ);
        assert_eq!(rx.borrow_and_update().interest, Interest::READ);
        registry.get_mut(7).unwrap().configure(Interest::READ_WRITE);
        assert_eq!(registry.len(), 1);
        assert!(rx.has_changed().unwrap());
        assert_eq!(
            *rx.borrow_and_update(),
            Control::new(Interest::READ_WRITE, 0)
        );
        assert_eq!(
            registry.get_mut(7).unwrap().interest(),
            Interest::READ_WRITE
        );

        // Same interest again is not a change.
        registry.get_mut(7).unwrap().configure(Interest::READ_WRITE);
        assert!(!rx.has_changed().unwrap());
        assert!(registry.remove(7, id));
        assert!(registry.is_empty());
    }

    #[test]
    fn close_is_idempotent() {
        let mut registry = TaskRegistry::new();
        let (_, mut rx) = registry.insert(7, Interest::READ);
        rx.borrow_and_update();
        assert!(registry.get_mut(7).unwrap().close());
        assert!(registry.get_mut(7).unwrap().is_closing());
        assert_eq!(rx.borrow_and_update().interest, Interest::NONE);
        assert!(!registry.get_mut(7).unwrap().close());
        assert!(!rx.has_changed().unwrap());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn configure_supersedes_close() {
        let mut registry = TaskRegistry::new();
        let (_, rx) = registry.insert(7, Interest::READ);
        registry.get_mut(7).unwrap().close();
        registry.get_mut(7).unwrap().configure(Interest::READ);
        assert!(!registry.get_mut(7).unwrap().is_closing());

        // Same interest as before but for a new socket.
        assert_eq!(*rx.borrow(), Control::new(Interest::READ, 1));
    }

    #[test]
    fn remove_checks_task_id() {
        let mut registry = TaskRegistry::new();
        let (first, _rx) = registry.insert(7, Interest::READ);
        assert!(registry.remove(7, first));
        let (second, _rx) = registry.insert(7, Interest::READ);
        assert_ne!(first, second);
        assert!(!registry.remove(7, first));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn close_all() {
        let mut registry = TaskRegistry::new();
        let (_, rx1) = registry.insert(7, Interest::READ);
        let (_, rx2) = registry.insert(8, Interest::READ_WRITE);
        registry.close_all();
        assert_eq!(rx1.borrow().interest, Interest::NONE);
        assert_eq!(rx2.borrow().interest, Interest::NONE);
        assert_eq!(registry.len(), 2);
    }
}
