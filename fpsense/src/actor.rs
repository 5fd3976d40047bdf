//! Sensor task
//!
//! One task owns the engine and the transport. It reacts to four stimuli:
//! requests from handles, bytes from the port, the response timer and the
//! settle delay. Engine outputs are flushed to the transport after each one.

use std::sync::Arc;
use std::time::Duration;

use fpsense_core::{Engine, Output, Request};
use fpsense_transport::Transport;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, trace, warn};

use crate::{
    error::Result,
    events::{EventHub, PortState, SensorEvent},
};

pub(crate) enum Message {
    Submit(Request),
    Close(oneshot::Sender<Result<()>>),
}

pub(crate) struct Actor {
    engine: Engine,
    transport: Box<dyn Transport>,
    messages: mpsc::UnboundedReceiver<Message>,
    events: Arc<EventHub>,
    state: watch::Sender<PortState>,
    settle_delay: Duration,
    port_open: bool,
}

impl Actor {
    pub(crate) fn new(
        engine: Engine,
        transport: Box<dyn Transport>,
        messages: mpsc::UnboundedReceiver<Message>,
        events: Arc<EventHub>,
        state: watch::Sender<PortState>,
        settle_delay: Duration,
    ) -> Self {
        let port_open = transport.is_open();

        Self {
            engine,
            transport,
            messages,
            events,
            state,
            settle_delay,
            port_open,
        }
    }

    pub(crate) async fn run(mut self) {
        let timer = sleep(Duration::ZERO);
        tokio::pin!(timer);
        let mut timer_armed = false;

        let settle = sleep(self.settle_delay);
        tokio::pin!(settle);
        let mut settling = self.port_open;

        debug!(port = %self.transport.port_name(), "Sensor task started");

        loop {
            let mut close_reply = None;

            tokio::select! {
                message = self.messages.recv() => match message {
                    Some(Message::Submit(request)) => self.engine.submit(request),
                    Some(Message::Close(reply)) => close_reply = Some(reply),
                    None => {
                        debug!("Every sensor handle dropped");
                        if let Err(e) = self.close_port().await {
                            warn!("Failed to close {}: {}", self.transport.port_name(), e);
                        }
                        break;
                    }
                },

                received = self.transport.receive(), if self.port_open => match received {
                    Ok(bytes) => {
                        trace!("Received {} bytes", bytes.len());
                        self.engine.handle_bytes(&bytes);
                    }
                    Err(e) if e.is_disconnect() => {
                        info!("{} closed: {}", self.transport.port_name(), e);
                        self.port_closed();
                    }
                    Err(e) => {
                        warn!("Port error on {}: {}", self.transport.port_name(), e);
                        self.events.emit(&SensorEvent::PortError(e.to_string()));
                    }
                },

                () = &mut timer, if timer_armed => {
                    timer_armed = false;
                    self.engine.handle_timeout(self.port_open);
                }

                () = &mut settle, if settling => {
                    settling = false;
                    if self.port_open {
                        info!("{} ready", self.transport.port_name());
                        self.state.send_replace(PortState::Ready);
                        self.events.emit(&SensorEvent::Ready);
                    }
                }
            }

            if let Some(reply) = close_reply {
                settling = false;
                let _ = reply.send(self.close_port().await);
            }

            while let Some(output) = self.engine.poll_output() {
                match output {
                    Output::Transmit(frame) => self.transmit(&frame).await,
                    Output::ArmTimer => {
                        timer.as_mut().reset(Instant::now() + self.engine.timeout());
                        timer_armed = true;
                    }
                    Output::CancelTimer => timer_armed = false,
                }
            }
        }

        debug!("Sensor task stopped");
    }

    async fn transmit(&mut self, frame: &[u8]) {
        if !self.port_open {
            // The response timer reports PortNotOpen
            trace!("Port closed, frame not written");
            return;
        }

        if let Err(e) = self.transport.send(frame).await {
            warn!("Write to {} failed: {}", self.transport.port_name(), e);
            self.events.emit(&SensorEvent::PortError(e.to_string()));
        }
    }

    async fn close_port(&mut self) -> Result<()> {
        if !self.port_open {
            return Ok(());
        }

        info!("Closing {}", self.transport.port_name());
        let result = self.transport.close().await;
        self.port_closed();

        Ok(result?)
    }

    fn port_closed(&mut self) {
        self.port_open = false;
        self.engine.handle_port_closed();
        self.state.send_replace(PortState::Closed);
        self.events.emit(&SensorEvent::PortClose);
    }
}
