//! Asynchronous controller service
//!
//! A single task owns the [`Controller`] and its forwarding plane. Packet-ins,
//! configuration changes and expiration sweeps all arrive as events on one
//! channel, so they are applied strictly one at a time.

use super::{Controller, ForwardingPlane, PacketIn, PortId, SwitchId, SwitchSnapshot};
use crate::{Error, Result};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Default depth of the event channel
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Work item for the controller task
#[derive(Debug)]
pub enum ControllerEvent {
    PacketIn {
        switch: SwitchId,
        in_port: PortId,
        frame: Vec<u8>,
        timestamp: Instant,
    },
    SetVlanId {
        switch: SwitchId,
        port: PortId,
        vlan_id: u16,
        reply: oneshot::Sender<Result<()>>,
    },
    SwitchConnected {
        switch: SwitchId,
        ports: Vec<PortId>,
    },
    SwitchDisconnected {
        switch: SwitchId,
    },
    /// Run an expiration sweep as of `now`
    Sweep {
        now: Instant,
    },
    Snapshot {
        switch: SwitchId,
        reply: oneshot::Sender<Option<SwitchSnapshot>>,
    },
    Shutdown,
}

/// Cloneable sender side of a running [`ControllerService`]
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    tx: mpsc::Sender<ControllerEvent>,
}

impl ControllerHandle {
    async fn send(&self, event: ControllerEvent) -> Result<()> {
        self.tx.send(event).await.map_err(|_| Error::ServiceStopped)
    }

    pub async fn packet_in(
        &self,
        switch: SwitchId,
        in_port: PortId,
        frame: Vec<u8>,
        timestamp: Instant,
    ) -> Result<()> {
        self.send(ControllerEvent::PacketIn {
            switch,
            in_port,
            frame,
            timestamp,
        })
        .await
    }

    /// Bind a port to a VLAN and wait for the controller to apply it.
    pub async fn set_vlan_id(&self, switch: SwitchId, port: PortId, vlan_id: u16) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(ControllerEvent::SetVlanId {
            switch,
            port,
            vlan_id,
            reply,
        })
        .await?;
        rx.await.map_err(|_| Error::ServiceStopped)?
    }

    pub async fn connect_switch(&self, switch: SwitchId, ports: Vec<PortId>) -> Result<()> {
        self.send(ControllerEvent::SwitchConnected { switch, ports }).await
    }

    pub async fn disconnect_switch(&self, switch: SwitchId) -> Result<()> {
        self.send(ControllerEvent::SwitchDisconnected { switch }).await
    }

    pub async fn sweep(&self, now: Instant) -> Result<()> {
        self.send(ControllerEvent::Sweep { now }).await
    }

    pub async fn snapshot(&self, switch: SwitchId) -> Result<Option<SwitchSnapshot>> {
        let (reply, rx) = oneshot::channel();
        self.send(ControllerEvent::Snapshot { switch, reply }).await?;
        rx.await.map_err(|_| Error::ServiceStopped)
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(ControllerEvent::Shutdown).await
    }
}

/// Event loop driving a [`Controller`] against a forwarding plane
pub struct ControllerService<P> {
    controller: Controller,
    plane: P,
    rx: mpsc::Receiver<ControllerEvent>,
    /// `None` leaves sweeping to explicit `Sweep` events
    sweep_interval: Option<Duration>,
}

impl<P: ForwardingPlane> ControllerService<P> {
    pub fn new(
        controller: Controller,
        plane: P,
        sweep_interval: Option<Duration>,
        capacity: usize,
    ) -> (Self, ControllerHandle) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        // tokio intervals panic on a zero period
        let sweep_interval = sweep_interval.map(|d| {
            if d.is_zero() {
                super::DEFAULT_SWEEP_INTERVAL
            } else {
                d
            }
        });
        let service = Self {
            controller,
            plane,
            rx,
            sweep_interval,
        };
        (service, ControllerHandle { tx })
    }

    /// Process events until `Shutdown` or until every handle is dropped.
    ///
    /// Returns the controller and plane so callers can inspect final state.
    pub async fn run(mut self) -> (Controller, P) {
        let auto_sweep = self.sweep_interval.is_some();
        let mut sweep_timer =
            tokio::time::interval(self.sweep_interval.unwrap_or(super::DEFAULT_SWEEP_INTERVAL));
        sweep_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Controller service started (sweep interval {:?})",
            self.sweep_interval
        );

        loop {
            tokio::select! {
                event = self.rx.recv() => {
                    match event {
                        Some(ControllerEvent::Shutdown) | None => break,
                        Some(event) => self.handle_event(event),
                    }
                }
                _ = sweep_timer.tick(), if auto_sweep => {
                    let now = tokio::time::Instant::now().into_std();
                    self.controller.expire(&mut self.plane, now);
                }
            }
        }

        info!("Controller service stopped");
        (self.controller, self.plane)
    }

    fn handle_event(&mut self, event: ControllerEvent) {
        match event {
            ControllerEvent::PacketIn {
                switch,
                in_port,
                frame,
                timestamp,
            } => {
                let packet = PacketIn {
                    switch,
                    in_port,
                    frame: &frame,
                    timestamp,
                };
                let decision = self.controller.handle_packet_in(&mut self.plane, &packet);
                debug!("Switch {} port {}: {:?}", switch, in_port, decision);
            }
            ControllerEvent::SetVlanId {
                switch,
                port,
                vlan_id,
                reply,
            } => {
                let result = self
                    .controller
                    .set_vlan_id(&mut self.plane, switch, port, vlan_id);
                // Caller may have stopped waiting
                let _ = reply.send(result);
            }
            ControllerEvent::SwitchConnected { switch, ports } => {
                self.controller.connect_switch(switch, ports);
            }
            ControllerEvent::SwitchDisconnected { switch } => {
                self.controller.disconnect_switch(switch);
            }
            ControllerEvent::Sweep { now } => {
                self.controller.expire(&mut self.plane, now);
            }
            ControllerEvent::Snapshot { switch, reply } => {
                let _ = reply.send(self.controller.snapshot(switch));
            }
            ControllerEvent::Shutdown => {}
        }
    }
}
