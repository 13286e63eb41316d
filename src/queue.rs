//! Single-flight command pipeline.
//!
//! One worker task owns the connection and the receiving end of a bounded
//! queue. Commands go out strictly in submission order, one at a time, with
//! a fixed pause after every exchange (success or not) so the stove's serial
//! bus can turn around. `disconnect` travels on a separate control channel
//! that the worker checks first, so it cuts through an in-flight exchange
//! and the pause.

use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace};

use crate::connection::Connection;
use crate::error::ClientError;
use crate::frame::{Response, build_frame};
use crate::proto::command::CommandCode;

type ReplyTx = oneshot::Sender<Result<Response, ClientError>>;

struct Pending {
    code: CommandCode,
    reply: ReplyTx,
}

enum Control {
    Disconnect(oneshot::Sender<()>),
}

/// Completion handle for one queued command.
#[must_use = "the reply is lost unless awaited"]
pub struct PendingReply(oneshot::Receiver<Result<Response, ClientError>>);

impl PendingReply {
    pub async fn wait(self) -> Result<Response, ClientError> {
        self.0.await.map_err(|_| ClientError::Disconnected)?
    }
}

/// Submission side of the pipeline. Cloning shares the same worker.
#[derive(Clone)]
pub struct CommandQueue {
    commands: mpsc::Sender<Pending>,
    control: mpsc::UnboundedSender<Control>,
    capacity: usize,
}

impl CommandQueue {
    /// Spawns the worker on the current tokio runtime. It stops once every
    /// handle has been dropped.
    pub fn spawn(conn: Connection, command_delay: Duration, capacity: usize) -> Self {
        let (commands, command_rx) = mpsc::channel(capacity);
        let (control, control_rx) = mpsc::unbounded_channel();
        let worker = Worker {
            conn,
            commands: command_rx,
            control: control_rx,
            control_open: true,
            command_delay,
            state: WorkerState::Idle,
        };
        tokio::spawn(worker.run());
        Self {
            commands,
            control,
            capacity,
        }
    }

    /// Queues `code` without waiting. Fails at once when the queue is full.
    pub fn enqueue(&self, code: CommandCode) -> Result<PendingReply, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .try_send(Pending { code, reply })
            .map_err(|e| match e {
                TrySendError::Full(_) => ClientError::QueueFull {
                    capacity: self.capacity,
                },
                TrySendError::Closed(_) => ClientError::Disconnected,
            })?;
        Ok(PendingReply(rx))
    }

    pub async fn submit(&self, code: CommandCode) -> Result<Response, ClientError> {
        self.enqueue(code)?.wait().await
    }

    /// Closes the connection and fails every command still waiting with
    /// [`ClientError::Disconnected`]. Returns once the worker has done so.
    pub async fn disconnect(&self) {
        let (ack, done) = oneshot::channel();
        if self.control.send(Control::Disconnect(ack)).is_ok() {
            let _ = done.await;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerState {
    Idle,
    Draining,
}

enum Outcome {
    Reply(Result<Response, ClientError>),
    Disconnect(oneshot::Sender<()>),
}

struct Worker {
    conn: Connection,
    commands: mpsc::Receiver<Pending>,
    control: mpsc::UnboundedReceiver<Control>,
    control_open: bool,
    command_delay: Duration,
    state: WorkerState,
}

impl Worker {
    async fn run(mut self) {
        debug!("command worker started");
        loop {
            let pending = tokio::select! {
                biased;
                ctl = self.control.recv(), if self.control_open => {
                    self.on_control(ctl);
                    continue;
                }
                pending = self.commands.recv() => match pending {
                    Some(p) => p,
                    None => break,
                },
            };
            self.set_state(WorkerState::Draining);
            self.process(pending).await;
            if self.commands.is_empty() {
                self.set_state(WorkerState::Idle);
            }
        }
        self.conn.disconnect();
        debug!("command worker stopped");
    }

    fn set_state(&mut self, next: WorkerState) {
        if self.state != next {
            trace!(from = ?self.state, to = ?next, "worker state");
            self.state = next;
        }
    }

    async fn process(&mut self, pending: Pending) {
        let Pending { code, reply } = pending;
        let frame = build_frame(&code);
        debug!(%code, "sending command");

        let outcome = {
            let exchange = self.conn.transact(&frame);
            tokio::pin!(exchange);
            loop {
                tokio::select! {
                    biased;
                    ctl = self.control.recv(), if self.control_open => match ctl {
                        Some(Control::Disconnect(ack)) => break Outcome::Disconnect(ack),
                        None => self.control_open = false,
                    },
                    res = &mut exchange => break Outcome::Reply(res),
                }
            }
        };

        match outcome {
            Outcome::Reply(res) => {
                match &res {
                    Ok(response) => debug!(%code, %response, "reply"),
                    Err(e) => debug!(%code, error = %e, "command failed"),
                }
                // The caller may have stopped waiting; that is fine.
                let _ = reply.send(res);
            }
            Outcome::Disconnect(ack) => {
                let _ = reply.send(Err(ClientError::Disconnected));
                self.disconnect(ack);
            }
        }

        self.pause().await;
    }

    /// Inter-command delay. Still answers control messages meanwhile.
    async fn pause(&mut self) {
        let delay = tokio::time::sleep(self.command_delay);
        tokio::pin!(delay);
        loop {
            tokio::select! {
                biased;
                ctl = self.control.recv(), if self.control_open => self.on_control(ctl),
                _ = &mut delay => break,
            }
        }
    }

    fn on_control(&mut self, ctl: Option<Control>) {
        match ctl {
            Some(Control::Disconnect(ack)) => self.disconnect(ack),
            None => self.control_open = false,
        }
    }

    fn disconnect(&mut self, ack: oneshot::Sender<()>) {
        let mut dropped = 0usize;
        while let Ok(pending) = self.commands.try_recv() {
            let _ = pending.reply.send(Err(ClientError::Disconnected));
            dropped += 1;
        }
        self.conn.disconnect();
        self.set_state(WorkerState::Idle);
        info!(dropped, "disconnected, queue cleared");
        let _ = ack.send(());
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use tokio::sync::watch;

    use super::*;
    use crate::connection::ConnectionState;
    use crate::proto::command::Register;
    use crate::testing::{MockRelay, Reply, register_reply};

    fn queue(relay: &MockRelay) -> CommandQueue {
        let config = relay.config();
        let (tx, _rx) = watch::channel(ConnectionState::Disconnected);
        let delay = config.timing.command_delay();
        let depth = config.timing.queue_depth;
        CommandQueue::spawn(Connection::new(config, tx), delay, depth)
    }

    fn code(s: &str) -> CommandCode {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn wire_order_matches_submission_order() {
        let relay = MockRelay::start(|_| Reply::Bytes(register_reply(1))).await;
        let q = queue(&relay);

        let callers = [q.clone(), q.clone(), q];
        let codes: Vec<CommandCode> = Register::ALL.iter().map(|r| r.code()).collect();
        let handles: Vec<_> = codes
            .iter()
            .enumerate()
            .map(|(i, c)| callers[i % callers.len()].enqueue(*c).unwrap())
            .collect();
        for h in handles {
            h.wait().await.unwrap();
        }

        let expected: Vec<String> = codes.iter().map(|c| c.to_string()).collect();
        assert_eq!(relay.frames(), expected);
        assert_eq!(relay.overlaps(), 0);
        assert_eq!(relay.bad_frames(), 0);
    }

    #[tokio::test]
    async fn concurrent_callers_never_overlap() {
        let relay = MockRelay::start(|c| {
            let v = if c == "D1000" { 210 } else { 3 };
            Reply::Bytes(register_reply(v))
        })
        .await;
        let q = queue(&relay);

        let tasks: Vec<_> = (0..12)
            .map(|i| {
                let q = q.clone();
                let c = if i % 3 == 0 { code("D1000") } else { code("D3000") };
                tokio::spawn(async move { (c, q.submit(c).await) })
            })
            .collect();
        for t in tasks {
            let (c, res) = t.await.unwrap();
            let expected = if c.as_str() == "D1000" { 210 } else { 3 };
            assert_eq!(res.unwrap().register_value(), expected);
        }
        assert_eq!(relay.frames().len(), 12);
        assert_eq!(relay.overlaps(), 0);
        assert_eq!(relay.handshakes().len(), 1);
    }

    #[tokio::test]
    async fn failure_only_fails_the_inflight_entry() {
        let relay = MockRelay::start(|c| match c {
            "D3000" => Reply::Silent,
            _ => Reply::Bytes(register_reply(9)),
        })
        .await;
        let q = queue(&relay);

        let a = q.enqueue(code("D1000")).unwrap();
        let b = q.enqueue(code("D3000")).unwrap();
        let c = q.enqueue(code("D4000")).unwrap();
        assert_eq!(a.wait().await.unwrap().register_value(), 9);
        assert!(b.wait().await.unwrap_err().is_timeout());
        assert_eq!(c.wait().await.unwrap().register_value(), 9);
        // The timed-out session was replaced before the third command.
        assert_eq!(relay.handshakes().len(), 2);
    }

    #[tokio::test]
    async fn delay_is_kept_between_commands() {
        let relay = MockRelay::start(|_| Reply::Bytes(register_reply(0))).await;
        let config = relay.config();
        let (tx, _rx) = watch::channel(ConnectionState::Disconnected);
        let q = CommandQueue::spawn(Connection::new(config, tx), Duration::from_millis(100), 8);

        q.submit(code("D1000")).await.unwrap();
        let started = Instant::now();
        q.submit(code("D1000")).await.unwrap();
        // The second exchange could only start once the first pause ended.
        assert!(started.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn disconnect_fails_queued_commands_immediately() {
        let relay = MockRelay::start(|_| Reply::Silent).await;
        let mut config = relay.config();
        config.timing.command_timeout_ms = 5000;
        let (tx, state) = watch::channel(ConnectionState::Disconnected);
        let q = CommandQueue::spawn(Connection::new(config, tx), Duration::from_millis(5), 8);

        let pending: Vec<_> = (0..3).map(|_| q.enqueue(code("D9000")).unwrap()).collect();
        // Let the first one reach the wire.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(relay.frames().len(), 1);

        let started = Instant::now();
        q.disconnect().await;
        for p in pending {
            assert!(matches!(p.wait().await, Err(ClientError::Disconnected)));
        }
        assert!(started.elapsed() < Duration::from_millis(1000));
        assert_eq!(*state.borrow(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn usable_again_after_disconnect() {
        let relay = MockRelay::start(|_| Reply::Bytes(register_reply(4))).await;
        let q = queue(&relay);
        q.submit(code("D3000")).await.unwrap();
        q.disconnect().await;
        assert_eq!(q.submit(code("D3000")).await.unwrap().register_value(), 4);
        assert_eq!(relay.handshakes().len(), 2);
    }

    #[tokio::test]
    async fn full_queue_is_rejected() {
        let relay = MockRelay::start(|_| Reply::Silent).await;
        let config = relay.config();
        let (tx, _rx) = watch::channel(ConnectionState::Disconnected);
        let q = CommandQueue::spawn(Connection::new(config, tx), Duration::from_millis(5), 2);

        let mut held = Vec::new();
        let mut rejected = None;
        for _ in 0..8 {
            match q.enqueue(code("D9000")) {
                Ok(p) => held.push(p),
                Err(e) => {
                    rejected = Some(e);
                    break;
                }
            }
        }
        assert!(matches!(
            rejected,
            Some(ClientError::QueueFull { capacity: 2 })
        ));
        q.disconnect().await;
    }
}
