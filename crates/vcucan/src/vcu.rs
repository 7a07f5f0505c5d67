use std::sync::Arc;

use tracing::{debug, error, info, warn};
use vcucan_broadcast::{
    BroadcastHandle, Composer, ComposerStats, SegmentHandle, StatePointSource,
};
use vcucan_frame::ids::{COMMAND, PARAMETER_REQUEST};
use vcucan_frame::{Codec, CodecStats, Dictionary, Frame};
use vcucan_state::{ModuleError, PointId, StateStore, Subsystem};
use vcucan_transport::{Peripheral, ReceiverHandle, Transport, TransportStats};

use crate::config::VcuConfig;
use crate::error::{Result, VcuError};
use crate::inverter::InverterLink;

/// Points carried by the inverter telemetry segment, 2 bytes each, in order.
pub const TELEMETRY_POINTS: [PointId; 4] = [
    PointId::MotorSpeed,
    PointId::DcBusVoltage,
    PointId::MotorTemp,
    PointId::CommandedTorque,
];

const TELEMETRY_WIDTH: usize = 2;

const FAULT_POINTS: [PointId; 4] = [
    PointId::PostFaultLo,
    PointId::PostFaultHi,
    PointId::RunFaultLo,
    PointId::RunFaultHi,
];

/// Counters from every layer of the stack.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VcuStats {
    pub codec: CodecStats,
    pub transport: TransportStats,
    pub broadcast: ComposerStats,
    pub module_errors: u32,
}

/// The communications stack wired together over one peripheral.
///
/// Owns the state store, the receive dispatch thread decoding into it, and
/// the broadcast thread transmitting the status and telemetry segments.
pub struct Vcu<P: Peripheral + 'static> {
    config: VcuConfig,
    store: Arc<StateStore>,
    codec: Arc<Codec>,
    transport: Arc<Transport<P>>,
    inverter: InverterLink<P>,
    receiver: Option<ReceiverHandle>,
    broadcast: Option<BroadcastHandle>,
}

impl<P: Peripheral + 'static> Vcu<P> {
    /// Bring up the stack with the built-in status and telemetry segments.
    pub fn init(peripheral: P, config: VcuConfig) -> Result<Self> {
        Self::init_with(peripheral, config, |_, _| Ok(()))
    }

    /// Like [`Vcu::init`], letting `register` add segments and channels before
    /// broadcasting starts.
    ///
    /// Stops at the first failing step. Threads already started are stopped
    /// and joined before the error is returned.
    pub fn init_with<F>(peripheral: P, config: VcuConfig, register: F) -> Result<Self>
    where
        F: FnOnce(&mut Composer, &Arc<StateStore>) -> Result<()>,
    {
        config.validate()?;

        let command_id = config.inverter_id(COMMAND)?;
        let parameter_id = config.inverter_id(PARAMETER_REQUEST)?;
        let store = Arc::new(StateStore::new());
        let errors = Arc::clone(store.module_errors());
        let dictionary = Dictionary::standard(&config.dictionary_config())?;
        debug!(entries = dictionary.len(), "dictionary built");
        let codec = Arc::new(Codec::new(dictionary));

        let transport = Arc::new(
            Transport::init(peripheral, config.transport_config())?
                .with_module_errors(Arc::clone(&errors)),
        );

        let receiver = match spawn_decoder(&transport, &codec, &store) {
            Ok(receiver) => receiver,
            Err(err) => {
                transport.shutdown();
                return Err(err);
            }
        };

        let broadcast = build_composer(&config, &store, register).and_then(|composer| {
            composer
                .start(Arc::clone(&transport))
                .map_err(VcuError::from)
        });
        let broadcast = match broadcast {
            Ok(broadcast) => broadcast,
            Err(err) => {
                error!(%err, "broadcast setup failed, stopping receive dispatch");
                transport.shutdown();
                receiver.join();
                return Err(err);
            }
        };

        let inverter = InverterLink::new(
            Arc::clone(&transport),
            Arc::clone(&store),
            command_id,
            parameter_id,
            config.inverter_timeout(),
        );

        info!(
            inverter_base = config.inverter_base_id,
            mailboxes = transport.mailbox_count(),
            period_ms = config.broadcast.period_ms,
            "vcu communications started"
        );

        Ok(Self {
            config,
            store,
            codec,
            transport,
            inverter,
            receiver: Some(receiver),
            broadcast: Some(broadcast),
        })
    }

    /// No module error is set and the stack is still running.
    pub fn is_ready(&self) -> bool {
        self.store.module_errors().is_clear() && !self.transport.is_shut_down()
    }

    /// Update the inverter timeout and fault flags from the latest state.
    ///
    /// `INVERTER_TIMEOUT` follows whether the inverter has broadcast within
    /// the configured timeout; `INVERTER_FAULT` follows the POST and run fault
    /// words. Both clear once the condition goes away. Returns [`Vcu::is_ready`].
    pub fn check_health(&self) -> bool {
        let errors = self.store.module_errors();

        let timeout = self.config.inverter_timeout();
        if self.store.is_stale(Subsystem::Inverter, timeout) {
            if errors.raise(ModuleError::InverterTimeout) {
                warn!(?timeout, "inverter broadcasts timed out");
            }
        } else if errors.clear(ModuleError::InverterTimeout) {
            info!("inverter broadcasts resumed");
        }

        let faults: Vec<(PointId, u32)> = FAULT_POINTS
            .iter()
            .map(|&point| (point, self.store.read(point)))
            .filter(|&(_, value)| value != 0)
            .collect();
        if faults.is_empty() {
            if errors.clear(ModuleError::InverterFault) {
                info!("inverter faults cleared");
            }
        } else if errors.raise(ModuleError::InverterFault) {
            error!(?faults, "inverter reported faults");
        }

        self.is_ready()
    }

    /// Stop everything at once after a fault. See [`Transport::emergency_stop`].
    pub fn emergency_stop(&self) {
        self.transport.emergency_stop();
    }

    /// Orderly stop: both threads are stopped and joined.
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        self.transport.shutdown();
        if let Some(broadcast) = self.broadcast.take() {
            broadcast.stop();
        }
        if let Some(receiver) = self.receiver.take() {
            receiver.join();
        }
    }

    pub fn stats(&self) -> VcuStats {
        VcuStats {
            codec: self.codec.stats(),
            transport: self.transport.stats(),
            broadcast: self
                .broadcast
                .as_ref()
                .map(BroadcastHandle::stats)
                .unwrap_or_default(),
            module_errors: self.store.module_errors().bits(),
        }
    }

    pub fn config(&self) -> &VcuConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    pub fn transport(&self) -> &Arc<Transport<P>> {
        &self.transport
    }

    pub fn inverter(&self) -> &InverterLink<P> {
        &self.inverter
    }

    /// The running composer, until [`Vcu::shutdown`].
    pub fn composer(&self) -> Option<&Composer> {
        self.broadcast.as_ref().map(BroadcastHandle::composer)
    }
}

impl<P: Peripheral + 'static> Drop for Vcu<P> {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

impl<P: Peripheral + 'static> std::fmt::Debug for Vcu<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vcu")
            .field("config", &self.config)
            .field("transport", &self.transport)
            .field("module_errors", &self.store.module_errors().bits())
            .finish_non_exhaustive()
    }
}

fn spawn_decoder<P: Peripheral + 'static>(
    transport: &Transport<P>,
    codec: &Arc<Codec>,
    store: &Arc<StateStore>,
) -> Result<ReceiverHandle> {
    let codec = Arc::clone(codec);
    let store = Arc::clone(store);
    let receiver = transport.spawn_receiver(move |frame: &Frame| {
        if let Err(err) = codec.decode(frame, &store) {
            warn!(id = %frame.id(), %err, "decode failed");
        }
    })?;
    Ok(receiver)
}

fn build_composer<F>(config: &VcuConfig, store: &Arc<StateStore>, register: F) -> Result<Composer>
where
    F: FnOnce(&mut Composer, &Arc<StateStore>) -> Result<()>,
{
    let mut composer =
        Composer::new(config.composer_config())?.with_module_errors(Arc::clone(store.module_errors()));
    composer.create_status_segment(config.status_id()?)?;
    let telemetry: SegmentHandle = composer.create_segment(config.telemetry_id()?, None)?;
    for point in TELEMETRY_POINTS {
        composer.create_channel(
            telemetry,
            StatePointSource::new(Arc::clone(store), point, TELEMETRY_WIDTH),
        )?;
    }
    register(&mut composer, store)?;
    Ok(composer)
}
