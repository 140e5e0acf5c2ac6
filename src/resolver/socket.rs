//! The tasks polling the engine’s sockets.

use super::registry::Control;
use super::Resolver;
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use tokio::io::unix::AsyncFd;
use tokio::sync::watch;
use tracing::{error, trace};

//------------ spawn ---------------------------------------------------------

/// Spawns the task polling the socket `fd`.
///
/// The task keeps the resolver alive until it has closed. It must be
/// spawned onto a `LocalSet`.
pub(super) fn spawn(
    resolver: Resolver,
    fd: RawFd,
    id: u64,
    control: watch::Receiver<Control>,
) {
    tokio::task::spawn_local(run(resolver, fd, id, control));
}

/// The event that woke up the task.
enum Event {
    /// The requested state has changed.
    Control(Option<Control>),

    /// The socket has become ready.
    Ready(Result<(bool, bool), io::Error>),
}

async fn run(
    resolver: Resolver,
    fd: RawFd,
    id: u64,
    mut control: watch::Receiver<Control>,
) {
    trace!(fd, id, "socket task started");
    let res = poll_socket(&resolver, fd, &mut control).await;
    trace!(fd, id, "socket task closed");

    // The entry has to go before the engine hears about a failure so that
    // the engine can reuse the descriptor right away.
    resolver.socket_closed(fd, id);
    if let Err(err) = res {
        error!(fd, id, "polling socket failed: {}", err);
        resolver.socket_failed(fd, err);
    }
}

/// Polls the socket until the task is asked to close.
async fn poll_socket(
    resolver: &Resolver,
    fd: RawFd,
    control: &mut watch::Receiver<Control>,
) -> Result<(), io::Error> {
    let mut current = *control.borrow_and_update();
    loop {
        let Some(interest) = current.interest.to_tokio() else {
            return Ok(());
        };
        trace!(
            fd, interest = %current.interest,
            generation = current.generation, "registering socket"
        );
        let poll = register(fd, interest)?;
        loop {
            let event = tokio::select! {
                biased;
                changed = control.changed() => {
                    Event::Control(
                        changed.ok().map(|_| *control.borrow_and_update())
                    )
                }
                ready = readiness(&poll, interest) => Event::Ready(ready),
            };
            match event {
                Event::Control(None) => return Ok(()),
                Event::Control(Some(new)) => {
                    if new != current {
                        current = new;
                        break;
                    }
                }
                Event::Ready(ready) => {
                    let (readable, writable) = ready?;
                    trace!(fd, readable, writable, "socket ready");
                    resolver.process_readiness(fd, readable, writable);
                }
            }
        }
        // The old registration is dropped here, before the next one is
        // made.
    }
}

/// Waits for the socket to become ready.
///
/// Returns whether it is readable and writable. The readiness is cleared
/// before returning, so the socket must be processed until it would block.
async fn readiness(
    poll: &AsyncFd<Descriptor>,
    interest: tokio::io::Interest,
) -> Result<(bool, bool), io::Error> {
    let mut guard = poll.ready(interest).await?;
    let ready = guard.ready();
    guard.clear_ready();
    Ok((
        ready.is_readable() || ready.is_read_closed(),
        ready.is_writable() || ready.is_write_closed(),
    ))
}

fn register(
    fd: RawFd,
    interest: tokio::io::Interest,
) -> Result<AsyncFd<Descriptor>, io::Error> {
    // SAFETY: The engine reports an interest of none before it closes a
    // socket and only hands out open descriptors. If it reuses the
    // descriptor before the task has seen the close, the generation in the
    // control value changes and the registration is dropped before the
    // new socket is registered.
    let res =
        unsafe { AsyncFd::register_with_interest(Descriptor(fd), interest) };
    res.map_err(io::Error::from)
}

//------------ Descriptor ----------------------------------------------------

/// A socket descriptor owned by the engine.
///
/// Dropping this value does not close the descriptor.
#[derive(Clone, Copy, Debug)]
struct Descriptor(RawFd);

impl AsRawFd for Descriptor {
    fn as_raw_fd(&self) -> RawFd {
        self.0
    }
}
