use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use vcucan_frame::{FrameId, InverterCommand, ParameterRequest};
use vcucan_state::{PointId, StateStore, Subsystem};
use vcucan_transport::{Peripheral, Transport};

use crate::error::{Result, VcuError};

/// Sends commands and parameter requests to the inverter.
///
/// Torque and speed requests are only sent while the inverter is broadcasting
/// within `broadcast_timeout` and no module error is set. Otherwise a disable
/// goes out and the request fails with [`VcuError::InverterNotReady`].
///
/// Requests also respect the inverter's enable lockout: while it is set, a
/// request that would enable the inverter is replaced by the command that
/// clears the lockout instead.
pub struct InverterLink<P: Peripheral + 'static> {
    transport: Arc<Transport<P>>,
    store: Arc<StateStore>,
    command_id: FrameId,
    parameter_id: FrameId,
    broadcast_timeout: Duration,
}

impl<P: Peripheral + 'static> InverterLink<P> {
    pub fn new(
        transport: Arc<Transport<P>>,
        store: Arc<StateStore>,
        command_id: FrameId,
        parameter_id: FrameId,
        broadcast_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            store,
            command_id,
            parameter_id,
            broadcast_timeout,
        }
    }

    /// Why the inverter cannot take a request right now, if anything.
    ///
    /// An inverter that has never broadcast counts as silent.
    pub fn unavailable_reason(&self) -> Option<&'static str> {
        match self.store.last_update(Subsystem::Inverter) {
            None => Some("no inverter broadcast received"),
            Some(age) if age > self.broadcast_timeout => Some("inverter broadcasts timed out"),
            Some(_) if !self.store.module_errors().is_clear() => Some("module errors are set"),
            Some(_) => None,
        }
    }

    /// Whether the last internal-states broadcast reported the enable lockout.
    pub fn is_locked_out(&self) -> bool {
        self.store.read(PointId::InverterEnableLockout) != 0
    }

    /// Request `torque` (Nm x 10). Returns the command actually sent.
    pub fn torque_request(&self, torque: i16) -> Result<InverterCommand> {
        self.ensure_available()?;
        let command = if self.is_locked_out() {
            warn!(torque, "inverter locked out, sending disable");
            InverterCommand::disable()
        } else {
            InverterCommand::torque_request(torque)
        };
        self.send_command(command)
    }

    /// Request `speed` (rpm). Returns the command actually sent.
    pub fn speed_request(&self, speed: i16) -> Result<InverterCommand> {
        self.ensure_available()?;
        let command = if self.is_locked_out() {
            warn!(speed, "inverter locked out, sending speed mode only");
            InverterCommand {
                speed_mode: true,
                ..InverterCommand::disable()
            }
        } else {
            InverterCommand::speed_request(speed)
        };
        self.send_command(command)
    }

    pub fn disable(&self) -> Result<InverterCommand> {
        self.send_command(InverterCommand::disable())
    }

    /// Ask for the value at `address`; the reply lands in the parameter response points.
    pub fn read_parameter(&self, address: u16) -> Result<ParameterRequest> {
        self.send_parameter(ParameterRequest::read(address))
    }

    pub fn write_parameter(&self, address: u16, data: u16) -> Result<ParameterRequest> {
        self.send_parameter(ParameterRequest::write(address, data))
    }

    pub fn command_id(&self) -> FrameId {
        self.command_id
    }

    pub fn parameter_id(&self) -> FrameId {
        self.parameter_id
    }

    /// Sends a disable and fails when the inverter cannot take a request.
    fn ensure_available(&self) -> Result<()> {
        let Some(reason) = self.unavailable_reason() else {
            return Ok(());
        };
        warn!(reason, "inverter not ready, sending disable");
        self.send_command(InverterCommand::disable())?;
        Err(VcuError::InverterNotReady(reason))
    }

    fn send_command(&self, command: InverterCommand) -> Result<InverterCommand> {
        let frame = command.to_frame(self.command_id)?;
        self.transport.transmit(&frame)?;
        debug!(%frame, "inverter command sent");
        Ok(command)
    }

    fn send_parameter(&self, request: ParameterRequest) -> Result<ParameterRequest> {
        let frame = request.to_frame(self.parameter_id)?;
        self.transport.transmit(&frame)?;
        debug!(
            address = request.address,
            write = request.write,
            "parameter request sent"
        );
        Ok(request)
    }
}

impl<P: Peripheral + 'static> std::fmt::Debug for InverterLink<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InverterLink")
            .field("command_id", &self.command_id)
            .field("parameter_id", &self.parameter_id)
            .field("broadcast_timeout", &self.broadcast_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use vcucan_frame::Direction;
    use vcucan_state::{ModuleError, StateSetter};
    use vcucan_transport::{TransportConfig, VirtualBus};

    use super::*;

    fn link_with_timeout(timeout: Duration) -> InverterLink<VirtualBus> {
        let transport = Transport::init(VirtualBus::new(), TransportConfig::default()).unwrap();
        InverterLink::new(
            Arc::new(transport),
            Arc::new(StateStore::new()),
            FrameId::standard(0xC0).unwrap(),
            FrameId::standard(0xC1).unwrap(),
            timeout,
        )
    }

    /// A link whose inverter has just broadcast.
    fn link() -> InverterLink<VirtualBus> {
        let link = link_with_timeout(Duration::from_secs(60));
        link.store
            .setter(Subsystem::Inverter)
            .set(PointId::MotorSpeed, 1000)
            .unwrap();
        link
    }

    fn assert_disable_sent(link: &InverterLink<VirtualBus>) {
        let frames = link.transport.peripheral().take_sent();
        assert_eq!(frames.len(), 1);
        assert_eq!(
            InverterCommand::from_frame(&frames[0]).unwrap(),
            InverterCommand::disable()
        );
    }

    fn lock_out(link: &InverterLink<VirtualBus>) {
        link.store
            .setter(Subsystem::Inverter)
            .set(PointId::InverterEnableLockout, 1)
            .unwrap();
    }

    #[test]
    fn torque_request_enables_forward() {
        let link = link();
        link.torque_request(1500).unwrap();

        let sent = link.transport.peripheral().take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].raw_id(), 0xC0);
        let command = InverterCommand::from_frame(&sent[0]).unwrap();
        assert_eq!(command.torque, 1500);
        assert_eq!(command.direction, Direction::Forward);
        assert!(command.enable);
        assert!(!command.speed_mode);
    }

    #[test]
    fn lockout_turns_torque_request_into_disable() {
        let link = link();
        lock_out(&link);

        let sent = link.torque_request(1500).unwrap();
        assert_eq!(sent, InverterCommand::disable());
        let frames = link.transport.peripheral().take_sent();
        assert_eq!(frames[0].data(), &[0u8; 8][..]);
    }

    #[test]
    fn lockout_keeps_speed_mode_only() {
        let link = link();
        lock_out(&link);

        let sent = link.speed_request(3000).unwrap();
        assert_eq!(sent.speed, 0);
        assert!(!sent.enable);
        assert!(sent.speed_mode);
        assert_eq!(sent.direction, Direction::Reverse);

        let frames = link.transport.peripheral().take_sent();
        assert_eq!(frames[0].data(), &[0, 0, 0, 0, 0, 0b100, 0, 0][..]);
    }

    #[test]
    fn speed_request_without_lockout() {
        let link = link();
        let sent = link.speed_request(-200).unwrap();
        assert_eq!(sent, InverterCommand::speed_request(-200));
    }

    #[test]
    fn silent_inverter_gets_disable_instead_of_torque() {
        let link = link_with_timeout(Duration::from_secs(60));
        assert_eq!(
            link.unavailable_reason(),
            Some("no inverter broadcast received")
        );

        let err = link.torque_request(1500).unwrap_err();
        assert!(matches!(err, VcuError::InverterNotReady(_)));
        assert_disable_sent(&link);
    }

    #[test]
    fn stale_broadcasts_refuse_speed_request() {
        let link = link_with_timeout(Duration::from_millis(20));
        link.store
            .setter(Subsystem::Inverter)
            .set(PointId::MotorSpeed, 1000)
            .unwrap();
        thread::sleep(Duration::from_millis(60));

        let err = link.speed_request(3000).unwrap_err();
        assert!(matches!(
            err,
            VcuError::InverterNotReady("inverter broadcasts timed out")
        ));
        assert_disable_sent(&link);
    }

    #[test]
    fn module_fault_refuses_torque_until_cleared() {
        let link = link();
        let errors = link.store.module_errors();
        errors.raise(ModuleError::InverterFault);

        let err = link.torque_request(1500).unwrap_err();
        assert!(matches!(err, VcuError::InverterNotReady(_)));
        assert_disable_sent(&link);

        errors.clear(ModuleError::InverterFault);
        let sent = link.torque_request(1500).unwrap();
        assert!(sent.enable);
    }

    #[test]
    fn parameter_requests_use_parameter_id() {
        let link = link();
        link.read_parameter(172).unwrap();
        link.write_parameter(172, 33).unwrap();

        let frames = link.transport.peripheral().take_sent();
        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|f| f.raw_id() == 0xC1));
        assert_eq!(
            ParameterRequest::from_frame(&frames[1]).unwrap(),
            ParameterRequest::write(172, 33)
        );
    }
}
