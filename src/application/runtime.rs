//! Dispatch loop
//!
//! One task owns the [`Softphone`] and applies inputs strictly one at a time:
//! user commands, transport callbacks, health changes, the keep-alive timer
//! and the reconnection timer. Callers talk to it through a cloneable
//! [`SoftphoneHandle`].

use crate::application::softphone::{Softphone, SoftphoneSnapshot};
use crate::domain::connection::HealthSignal;
use crate::domain::events::EventEnvelope;
use crate::domain::shared::error::DomainError;
use crate::domain::shared::result::Result;
use crate::domain::shared::value_objects::{LineNumber, SessionId, SubscriptionId};
use crate::domain::transfer::TransferRecord;
use crate::domain::transport::TransportEvent;
use crate::interface::events::EventBus;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info};

const INPUT_CAPACITY: usize = 256;

type Reply<T> = oneshot::Sender<Result<T>>;

/// User actions, each answered on its own reply channel
#[derive(Debug)]
pub enum Command {
    Dial {
        target: String,
        reply: Reply<SessionId>,
    },
    Answer {
        session: Option<SessionId>,
        reply: Reply<()>,
    },
    Reject {
        session: Option<SessionId>,
        reply: Reply<()>,
    },
    HangUp {
        session: Option<SessionId>,
        reply: Reply<()>,
    },
    SetHold {
        session: Option<SessionId>,
        hold: bool,
        reply: Reply<()>,
    },
    ToggleHold {
        session: Option<SessionId>,
        reply: Reply<bool>,
    },
    ToggleMute {
        session: Option<SessionId>,
        reply: Reply<bool>,
    },
    SendDtmf {
        session: Option<SessionId>,
        tone: char,
        reply: Reply<()>,
    },
    SelectLine {
        line: LineNumber,
        reply: Reply<()>,
    },
    ReassignLine {
        session: SessionId,
        line: LineNumber,
        reply: Reply<()>,
    },
    BlindTransfer {
        session: Option<SessionId>,
        destination: String,
        reply: Reply<TransferRecord>,
    },
    StartAttendedTransfer {
        session: Option<SessionId>,
        destination: String,
        reply: Reply<SessionId>,
    },
    CompleteAttendedTransfer {
        session: Option<SessionId>,
        reply: Reply<TransferRecord>,
    },
    CancelAttendedTransfer {
        session: Option<SessionId>,
        reply: Reply<TransferRecord>,
    },
    Subscribe {
        extension: String,
        display_name: Option<String>,
        reply: Reply<SubscriptionId>,
    },
    Unsubscribe {
        id: SubscriptionId,
        reply: Reply<()>,
    },
    Snapshot {
        reply: Reply<SoftphoneSnapshot>,
    },
}

#[derive(Debug)]
pub enum Input {
    Command(Command),
    Health(HealthSignal),
    Shutdown,
}

pub struct SoftphoneRuntime {
    softphone: Softphone,
    inputs: mpsc::Receiver<Input>,
    transport_events: mpsc::UnboundedReceiver<TransportEvent>,
}

impl SoftphoneRuntime {
    pub fn new(
        softphone: Softphone,
        transport_events: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> (Self, SoftphoneHandle) {
        let (tx, inputs) = mpsc::channel(INPUT_CAPACITY);
        let handle = SoftphoneHandle {
            tx,
            events: Arc::clone(softphone.events()),
        };
        let runtime = Self {
            softphone,
            inputs,
            transport_events,
        };
        (runtime, handle)
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        let period = self.softphone.config().timers.keepalive_interval();
        let mut keepalive = interval_at(Instant::now() + period, period);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut reconnect_at: Option<Instant> = None;

        self.softphone.start().await;

        loop {
            if let Some(delay) = self.softphone.take_reconnect_request() {
                reconnect_at = Some(Instant::now() + delay);
            }
            let deadline = reconnect_at;
            let reconnect = async move {
                match deadline {
                    Some(deadline) => sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                input = self.inputs.recv() => match input {
                    Some(Input::Command(command)) => execute(&mut self.softphone, command).await,
                    Some(Input::Health(signal)) => self.softphone.on_health_changed(signal).await,
                    Some(Input::Shutdown) | None => break,
                },
                Some(event) = self.transport_events.recv() => {
                    if event == TransportEvent::Activity {
                        // Out-of-band traffic proves the link, push the probe back
                        keepalive.reset();
                    }
                    self.softphone.handle_transport_event(event).await;
                }
                _ = keepalive.tick() => self.softphone.keep_alive().await,
                _ = reconnect => {
                    reconnect_at = None;
                    self.softphone.reconnect_due().await;
                }
            }
        }

        self.softphone.shutdown().await;
        info!("Dispatch loop stopped");
    }
}

async fn execute(softphone: &mut Softphone, command: Command) {
    match command {
        Command::Dial { target, reply } => {
            respond(reply, softphone.dial(&target).await);
        }
        Command::Answer { session, reply } => {
            respond(reply, softphone.answer(session).await);
        }
        Command::Reject { session, reply } => {
            respond(reply, softphone.reject(session).await);
        }
        Command::HangUp { session, reply } => {
            respond(reply, softphone.hang_up(session).await);
        }
        Command::SetHold {
            session,
            hold,
            reply,
        } => {
            respond(reply, softphone.set_hold(session, hold).await);
        }
        Command::ToggleHold { session, reply } => {
            respond(reply, softphone.toggle_hold(session).await);
        }
        Command::ToggleMute { session, reply } => {
            respond(reply, softphone.toggle_mute(session).await);
        }
        Command::SendDtmf {
            session,
            tone,
            reply,
        } => {
            respond(reply, softphone.send_dtmf(session, tone).await);
        }
        Command::SelectLine { line, reply } => {
            softphone.select_line(line);
            respond(reply, Ok(()));
        }
        Command::ReassignLine {
            session,
            line,
            reply,
        } => {
            respond(reply, softphone.reassign_line(session, line));
        }
        Command::BlindTransfer {
            session,
            destination,
            reply,
        } => {
            respond(reply, softphone.blind_transfer(session, &destination).await);
        }
        Command::StartAttendedTransfer {
            session,
            destination,
            reply,
        } => {
            respond(
                reply,
                softphone.start_attended_transfer(session, &destination).await,
            );
        }
        Command::CompleteAttendedTransfer { session, reply } => {
            respond(reply, softphone.complete_attended_transfer(session).await);
        }
        Command::CancelAttendedTransfer { session, reply } => {
            respond(reply, softphone.cancel_attended_transfer(session).await);
        }
        Command::Subscribe {
            extension,
            display_name,
            reply,
        } => {
            respond(reply, softphone.subscribe(&extension, display_name).await);
        }
        Command::Unsubscribe { id, reply } => {
            respond(reply, softphone.unsubscribe(id).await);
        }
        Command::Snapshot { reply } => {
            respond(reply, Ok(softphone.snapshot()));
        }
    }
}

fn respond<T>(reply: Reply<T>, result: Result<T>) {
    if reply.send(result).is_err() {
        debug!("Caller went away before the reply");
    }
}

/// Cloneable front door to the dispatch loop
#[derive(Clone)]
pub struct SoftphoneHandle {
    tx: mpsc::Sender<Input>,
    events: Arc<EventBus>,
}

impl SoftphoneHandle {
    /// Core events published from now on
    pub fn subscribe_events(&self) -> broadcast::Receiver<EventEnvelope> {
        self.events.subscribe()
    }

    /// Raw input sender, used by the connectivity monitor
    pub fn inputs(&self) -> mpsc::Sender<Input> {
        self.tx.clone()
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.tx
            .send(Input::Shutdown)
            .await
            .map_err(|_| DomainError::RuntimeStopped)
    }

    pub async fn dial(&self, target: &str) -> Result<SessionId> {
        let target = target.to_string();
        self.request(|reply| Command::Dial { target, reply }).await
    }

    pub async fn answer(&self, session: Option<SessionId>) -> Result<()> {
        self.request(|reply| Command::Answer { session, reply }).await
    }

    pub async fn reject(&self, session: Option<SessionId>) -> Result<()> {
        self.request(|reply| Command::Reject { session, reply }).await
    }

    pub async fn hang_up(&self, session: Option<SessionId>) -> Result<()> {
        self.request(|reply| Command::HangUp { session, reply }).await
    }

    pub async fn set_hold(&self, session: Option<SessionId>, hold: bool) -> Result<()> {
        self.request(|reply| Command::SetHold {
            session,
            hold,
            reply,
        })
        .await
    }

    pub async fn toggle_hold(&self, session: Option<SessionId>) -> Result<bool> {
        self.request(|reply| Command::ToggleHold { session, reply })
            .await
    }

    pub async fn toggle_mute(&self, session: Option<SessionId>) -> Result<bool> {
        self.request(|reply| Command::ToggleMute { session, reply })
            .await
    }

    pub async fn send_dtmf(&self, session: Option<SessionId>, tone: char) -> Result<()> {
        self.request(|reply| Command::SendDtmf {
            session,
            tone,
            reply,
        })
        .await
    }

    pub async fn select_line(&self, line: LineNumber) -> Result<()> {
        self.request(|reply| Command::SelectLine { line, reply }).await
    }

    pub async fn reassign_line(&self, session: SessionId, line: LineNumber) -> Result<()> {
        self.request(|reply| Command::ReassignLine {
            session,
            line,
            reply,
        })
        .await
    }

    pub async fn blind_transfer(
        &self,
        session: Option<SessionId>,
        destination: &str,
    ) -> Result<TransferRecord> {
        let destination = destination.to_string();
        self.request(|reply| Command::BlindTransfer {
            session,
            destination,
            reply,
        })
        .await
    }

    pub async fn start_attended_transfer(
        &self,
        session: Option<SessionId>,
        destination: &str,
    ) -> Result<SessionId> {
        let destination = destination.to_string();
        self.request(|reply| Command::StartAttendedTransfer {
            session,
            destination,
            reply,
        })
        .await
    }

    pub async fn complete_attended_transfer(
        &self,
        session: Option<SessionId>,
    ) -> Result<TransferRecord> {
        self.request(|reply| Command::CompleteAttendedTransfer { session, reply })
            .await
    }

    pub async fn cancel_attended_transfer(
        &self,
        session: Option<SessionId>,
    ) -> Result<TransferRecord> {
        self.request(|reply| Command::CancelAttendedTransfer { session, reply })
            .await
    }

    pub async fn subscribe(
        &self,
        extension: &str,
        display_name: Option<String>,
    ) -> Result<SubscriptionId> {
        let extension = extension.to_string();
        self.request(|reply| Command::Subscribe {
            extension,
            display_name,
            reply,
        })
        .await
    }

    pub async fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        self.request(|reply| Command::Unsubscribe { id, reply }).await
    }

    pub async fn snapshot(&self) -> Result<SoftphoneSnapshot> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Input::Command(build(reply)))
            .await
            .map_err(|_| DomainError::RuntimeStopped)?;
        rx.await.map_err(|_| DomainError::RuntimeStopped)?
    }
}
