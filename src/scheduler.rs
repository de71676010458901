// Single-threaded event scheduler
//
// One blocking wait resolves both timer and stream readiness, then dispatch
// is synchronous and ordered: every expired periodic task in registration
// order, then every readable stream in registration order. Handlers run to
// completion; the wait is the only place the loop ever blocks.

use std::os::fd::{BorrowedFd, RawFd};
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use tracing::{debug, info};

use crate::error::{Result, RobotError};

/// What the loop should do after a handler returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Leave the loop with a completion message
    Exit(&'static str),
}

/// Handler invoked with the scheduler's context
pub type Handler<C> = Box<dyn FnMut(&mut C) -> Result<Flow>>;

/// Time source and multiplexed wait
pub trait Waiter {
    fn now(&self) -> Instant;

    /// Block until `timeout` elapses (forever if `None`) or any of `fds` is
    /// readable; returns one readiness flag per descriptor.
    ///
    /// Every descriptor in `fds` must be open for the duration of the call.
    fn wait(&mut self, fds: &[RawFd], timeout: Option<Duration>) -> Result<Vec<bool>>;
}

/// `poll(2)` over the watched descriptors
#[derive(Debug, Default)]
pub struct PollWaiter;

impl Waiter for PollWaiter {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wait(&mut self, fds: &[RawFd], timeout: Option<Duration>) -> Result<Vec<bool>> {
        // SAFETY: callers keep every descriptor open across the call. The
        // scheduler only passes descriptors given to `register_stream`, whose
        // callers guarantee they stay open while the scheduler runs.
        let mut pollfds: Vec<PollFd<'_>> = fds
            .iter()
            .map(|&fd| PollFd::new(unsafe { BorrowedFd::borrow_raw(fd) }, PollFlags::POLLIN))
            .collect();

        let timeout = match timeout {
            None => PollTimeout::NONE,
            // Round up so a sub-millisecond remainder doesn't spin
            Some(t) => {
                let ms = t.as_micros().div_ceil(1000).min(u16::MAX as u128) as u16;
                PollTimeout::from(ms)
            }
        };

        match poll(&mut pollfds, timeout) {
            Ok(_) => Ok(pollfds
                .iter()
                .map(|p| {
                    p.revents().is_some_and(|r| {
                        r.intersects(PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR)
                    })
                })
                .collect()),
            // Interrupted by a signal: nothing is ready, go round again
            Err(Errno::EINTR) => Ok(vec![false; fds.len()]),
            Err(source) => Err(RobotError::Wait {
                op: "Framework",
                source,
            }),
        }
    }
}

struct PeriodicTask<C> {
    name: &'static str,
    period: Duration,
    next_deadline: Instant,
    handler: Handler<C>,
}

impl<C> PeriodicTask<C> {
    /// Advance by one period, never queueing missed periods for catch-up
    fn advance(&mut self, now: Instant) {
        self.next_deadline += self.period;
        if self.next_deadline < now {
            self.next_deadline = now;
        }
    }
}

struct StreamWatch<C> {
    name: &'static str,
    fd: RawFd,
    handler: Handler<C>,
}

pub struct Scheduler<C, W = PollWaiter> {
    waiter: W,
    tasks: Vec<PeriodicTask<C>>,
    watches: Vec<StreamWatch<C>>,
}

impl<C> Scheduler<C, PollWaiter> {
    pub fn new() -> Self {
        Self::with_waiter(PollWaiter)
    }
}

impl<C> Default for Scheduler<C, PollWaiter> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C, W: Waiter> Scheduler<C, W> {
    pub fn with_waiter(waiter: W) -> Self {
        Self {
            waiter,
            tasks: Vec::new(),
            watches: Vec::new(),
        }
    }

    /// Run `handler` every `period`, first at now + `period`
    pub fn register_periodic(
        &mut self,
        name: &'static str,
        period: Duration,
        handler: impl FnMut(&mut C) -> Result<Flow> + 'static,
    ) -> Result<()> {
        if period.is_zero() {
            return Err(RobotError::Registration {
                op: name,
                detail: "period must be non-zero".to_string(),
            });
        }
        info!("Registered periodic task {} every {:?}", name, period);
        self.tasks.push(PeriodicTask {
            name,
            period,
            next_deadline: self.waiter.now() + period,
            handler: Box::new(handler),
        });
        Ok(())
    }

    /// Run `handler` whenever `fd` is readable
    ///
    /// `fd` must stay open for as long as this scheduler runs. Inside the
    /// crate that holds because every watched descriptor belongs to a data
    /// stream owned by the context passed to `run_forever`.
    pub(crate) fn register_stream(
        &mut self,
        name: &'static str,
        fd: RawFd,
        handler: impl FnMut(&mut C) -> Result<Flow> + 'static,
    ) -> Result<()> {
        if self.watches.iter().any(|w| w.fd == fd) {
            return Err(RobotError::Registration {
                op: name,
                detail: format!("descriptor {} already watched", fd),
            });
        }
        info!("Registered stream {} on fd {}", name, fd);
        self.watches.push(StreamWatch {
            name,
            fd,
            handler: Box::new(handler),
        });
        Ok(())
    }

    /// Dispatch until a handler asks to exit or fails
    pub fn run_forever(&mut self, ctx: &mut C) -> Result<&'static str> {
        info!(
            "Scheduler running: {} periodic tasks, {} streams",
            self.tasks.len(),
            self.watches.len()
        );
        loop {
            if let Some(message) = self.run_once(ctx)? {
                return Ok(message);
            }
        }
    }

    /// One wait and one dispatch cycle
    pub fn run_once(&mut self, ctx: &mut C) -> Result<Option<&'static str>> {
        let now = self.waiter.now();
        let timeout = self
            .tasks
            .iter()
            .map(|t| t.next_deadline.saturating_duration_since(now))
            .min();
        let fds: Vec<RawFd> = self.watches.iter().map(|w| w.fd).collect();

        let ready = self.waiter.wait(&fds, timeout)?;

        let woke = self.waiter.now();
        for task in self.tasks.iter_mut() {
            if task.next_deadline > woke {
                continue;
            }
            let flow = (task.handler)(ctx)?;
            // Clamp against the time the handler finished, so an overrun
            // yields one immediate dispatch and not a burst
            task.advance(self.waiter.now());
            if let Flow::Exit(message) = flow {
                debug!("Task {} requested exit", task.name);
                return Ok(Some(message));
            }
        }

        for (watch, ready) in self.watches.iter_mut().zip(ready) {
            if !ready {
                continue;
            }
            if let Flow::Exit(message) = (watch.handler)(ctx)? {
                debug!("Stream {} requested exit", watch.name);
                return Ok(Some(message));
            }
        }
        Ok(None)
    }
}


#[cfg(test)]
mod tests {
    use super::fake::FakeWaiter;
    use super::*;
    use proptest::prelude::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Log {
        events: Vec<(String, Instant)>,
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_zero_period_rejected() {
        let mut scheduler: Scheduler<Log, _> = Scheduler::with_waiter(FakeWaiter::new());
        let err = scheduler
            .register_periodic("bad", Duration::ZERO, |_| Ok(Flow::Continue))
            .unwrap_err();
        assert_eq!(err.code(), -1008);
    }

    #[test]
    fn test_duplicate_stream_rejected() {
        let mut scheduler: Scheduler<Log, _> = Scheduler::with_waiter(FakeWaiter::new());
        scheduler.register_stream("a", 7, |_| Ok(Flow::Continue)).unwrap();
        assert!(scheduler.register_stream("b", 7, |_| Ok(Flow::Continue)).is_err());
    }

    #[test]
    fn test_periodic_spacing_is_period() {
        let waiter = FakeWaiter::new();
        let clock = waiter.clone();
        let start = clock.now();
        let mut scheduler = Scheduler::with_waiter(waiter);
        let now = clock.clone();
        scheduler
            .register_periodic("tick", ms(50), move |log: &mut Log| {
                log.events.push(("tick".into(), now.now()));
                Ok(Flow::Continue)
            })
            .unwrap();

        let mut log = Log::default();
        for _ in 0..5 {
            scheduler.run_once(&mut log).unwrap();
        }
        let times: Vec<Duration> = log.events.iter().map(|(_, t)| *t - start).collect();
        assert_eq!(times, vec![ms(50), ms(100), ms(150), ms(200), ms(250)]);
    }

    #[test]
    fn test_overrun_runs_once_without_catch_up() {
        let waiter = FakeWaiter::new();
        let clock = waiter.clone();
        let start = clock.now();
        let mut scheduler = Scheduler::with_waiter(waiter);
        let handler_clock = clock.clone();
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        scheduler
            .register_periodic("slow", ms(10), move |log: &mut Log| {
                log.events.push(("slow".into(), handler_clock.now()));
                counter.set(counter.get() + 1);
                // First invocation overruns by three and a half periods
                if counter.get() == 1 {
                    handler_clock.advance(ms(35));
                }
                Ok(Flow::Continue)
            })
            .unwrap();

        let mut log = Log::default();
        for _ in 0..3 {
            scheduler.run_once(&mut log).unwrap();
        }
        let times: Vec<Duration> = log.events.iter().map(|(_, t)| *t - start).collect();
        // 10: first run, ends at 45; next due immediately; then back on period
        assert_eq!(times, vec![ms(10), ms(45), ms(55)]);
        for pair in times.windows(2) {
            assert!(pair[1] - pair[0] >= ms(10));
        }
        assert_eq!(scheduler.waiter.waits.borrow()[1], Some(Duration::ZERO));
    }

    #[test]
    fn test_wait_uses_earliest_deadline() {
        let waiter = FakeWaiter::new();
        let mut scheduler = Scheduler::with_waiter(waiter);
        scheduler.register_periodic("slow", ms(100), |_: &mut Log| Ok(Flow::Continue)).unwrap();
        scheduler.register_periodic("fast", ms(30), |_: &mut Log| Ok(Flow::Continue)).unwrap();
        let mut log = Log::default();
        scheduler.run_once(&mut log).unwrap();
        assert_eq!(scheduler.waiter.waits.borrow()[0], Some(ms(30)));
    }

    #[test]
    fn test_no_tasks_blocks_on_streams_only() {
        let waiter = FakeWaiter::new();
        waiter.readiness.borrow_mut().push_back(vec![true]);
        let mut scheduler = Scheduler::with_waiter(waiter);
        scheduler
            .register_stream("data", 3, |log: &mut Log| {
                log.events.push(("data".into(), Instant::now()));
                Ok(Flow::Continue)
            })
            .unwrap();
        let mut log = Log::default();
        scheduler.run_once(&mut log).unwrap();
        assert_eq!(scheduler.waiter.waits.borrow()[0], None);
        assert_eq!(log.events.len(), 1);
    }

    #[test]
    fn test_exit_flow_ends_run_forever() {
        let waiter = FakeWaiter::new();
        let mut scheduler = Scheduler::with_waiter(waiter);
        scheduler
            .register_periodic("count", ms(10), |log: &mut Log| {
                log.events.push(("count".into(), Instant::now()));
                if log.events.len() == 3 {
                    return Ok(Flow::Exit("done"));
                }
                Ok(Flow::Continue)
            })
            .unwrap();
        let mut log = Log::default();
        assert_eq!(scheduler.run_forever(&mut log).unwrap(), "done");
        assert_eq!(log.events.len(), 3);
    }

    #[test]
    fn test_handler_error_propagates() {
        let waiter = FakeWaiter::new();
        let mut scheduler = Scheduler::with_waiter(waiter);
        scheduler
            .register_periodic("fail", ms(10), |_: &mut Log| {
                Err(RobotError::response("fail", "boom"))
            })
            .unwrap();
        let err = scheduler.run_forever(&mut Log::default()).unwrap_err();
        assert_eq!(err.code(), -1007);
    }

    #[test]
    fn test_poll_waiter_sees_readable_socket() {
        use std::io::Write;
        use std::os::fd::AsRawFd;
        use std::os::unix::net::UnixStream;

        let (mut tx, rx) = UnixStream::pair().unwrap();
        let mut waiter = PollWaiter;
        let ready = waiter.wait(&[rx.as_raw_fd()], Some(ms(1))).unwrap();
        assert_eq!(ready, vec![false]);

        tx.write_all(b"1\n").unwrap();
        let ready = waiter.wait(&[rx.as_raw_fd()], Some(ms(1000))).unwrap();
        assert_eq!(ready, vec![true]);
    }

    #[test]
    fn test_stream_owned_by_context_dispatches() {
        use std::io::{BufRead, BufReader, Write};
        use std::os::fd::AsRawFd;
        use std::os::unix::net::UnixStream;

        struct Conn {
            reader: BufReader<UnixStream>,
            lines: Vec<String>,
        }

        let (mut tx, rx) = UnixStream::pair().unwrap();
        let fd = rx.as_raw_fd();
        let mut conn = Conn {
            reader: BufReader::new(rx),
            lines: Vec::new(),
        };
        let mut scheduler = Scheduler::new();
        scheduler
            .register_stream("conn", fd, |conn: &mut Conn| {
                let mut line = String::new();
                conn.reader.read_line(&mut line).map_err(|e| RobotError::Read {
                    op: "conn",
                    detail: e.to_string(),
                })?;
                conn.lines.push(line.trim_end().to_string());
                Ok(Flow::Continue)
            })
            .unwrap();

        tx.write_all(b"hello\n").unwrap();
        assert_eq!(scheduler.run_once(&mut conn).unwrap(), None);
        assert_eq!(conn.lines, vec!["hello"]);
    }

    proptest! {
        /// Within one wake, periodic tasks precede streams and each group keeps registration order
        #[test]
        fn dispatch_order_follows_registration(
            periodic in proptest::collection::vec(1u64..5, 1..6),
            streams in 1usize..6,
            ready_mask in proptest::collection::vec(any::<bool>(), 6),
        ) {
            let waiter = FakeWaiter::new();
            let clock = waiter.clone();
            let mut scheduler = Scheduler::with_waiter(waiter);
            for (i, &period) in periodic.iter().enumerate() {
                let name = format!("p{}", i);
                scheduler
                    .register_periodic("p", ms(period), move |log: &mut Log| {
                        log.events.push((name.clone(), Instant::now()));
                        Ok(Flow::Continue)
                    })
                    .unwrap();
            }
            for i in 0..streams {
                let name = format!("s{}", i);
                scheduler
                    .register_stream("s", i as RawFd + 100, move |log: &mut Log| {
                        log.events.push((name.clone(), Instant::now()));
                        Ok(Flow::Continue)
                    })
                    .unwrap();
            }

            // Every task is due and the masked streams are readable in the same wake
            clock.advance(ms(5));
            let mut ready: Vec<bool> = ready_mask[..streams].to_vec();
            ready[0] = true;
            scheduler.waiter.readiness.borrow_mut().push_back(ready.clone());

            let mut log = Log::default();
            scheduler.run_once(&mut log).unwrap();

            let mut expected: Vec<String> = (0..periodic.len()).map(|i| format!("p{}", i)).collect();
            expected.extend((0..streams).filter(|&i| ready[i]).map(|i| format!("s{}", i)));
            let got: Vec<String> = log.events.into_iter().map(|(n, _)| n).collect();
            prop_assert_eq!(got, expected);
        }
    }
}
