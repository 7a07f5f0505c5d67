use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{info, warn};
use vcucan::frame::ids::{self, COMMAND, PARAMETER_REQUEST};
use vcucan::frame::{Frame, FrameError};
use vcucan::transport::VirtualBus;
use vcucan::{Vcu, VcuConfig};

use crate::cmd::SimulateArgs;
use crate::exit::{frame_error, vcu_error, CliError, CliResult, HEALTH_CHECK_FAILED, INTERNAL, SUCCESS};
use crate::output::{print_frame, print_stats, OutputFormat};

pub fn run(args: SimulateArgs, config: VcuConfig, format: OutputFormat) -> CliResult<i32> {
    let running = Arc::new(AtomicBool::new(true));
    if args.ticks.is_none() {
        install_ctrlc_handler(Arc::clone(&running))?;
    }

    let period = Duration::from_millis(config.broadcast.period_ms);
    let names = frame_names(&config).map_err(|err| vcu_error("config", err))?;
    let inverter = SimulatedInverter {
        base: config.inverter_base_id,
    };
    let vcu = Vcu::init(VirtualBus::new(), config).map_err(|err| vcu_error("init", err))?;
    let bus = vcu.transport().peripheral();
    let frame_format = match format {
        OutputFormat::Table => OutputFormat::Pretty,
        other => other,
    };

    let mut tick = 0u64;
    while running.load(Ordering::SeqCst) && args.ticks.is_none_or(|ticks| tick < ticks) {
        let broadcasts = inverter
            .broadcasts(tick, args.torque)
            .map_err(|err| frame_error("simulated inverter", err))?;
        for frame in broadcasts {
            bus.inject(frame);
        }
        thread::sleep(period);

        vcu.check_health();
        if let Err(err) = vcu.inverter().torque_request(args.torque) {
            warn!(%err, "torque request failed");
        }

        for frame in bus.take_sent() {
            if !args.quiet {
                let name = names.get(&frame.raw_id()).copied().unwrap_or("UNKNOWN");
                print_frame(&frame, name, frame_format);
            }
        }
        tick += 1;
    }

    let ready = vcu.is_ready();
    let stats = vcu.stats();
    let errors = vcu
        .store()
        .module_errors()
        .active()
        .into_iter()
        .map(|flag| flag.name())
        .collect();
    vcu.shutdown();
    info!(ticks = tick, ready, "simulation finished");

    print_stats(&stats, errors, format);
    Ok(if ready { SUCCESS } else { HEALTH_CHECK_FAILED })
}

fn frame_names(config: &VcuConfig) -> vcucan::Result<HashMap<u32, &'static str>> {
    Ok(HashMap::from([
        (config.broadcast.status_id, "Status"),
        (config.broadcast.telemetry_id, "Telemetry"),
        (
            config.inverter_id(COMMAND)?.raw(),
            ids::message_name(COMMAND),
        ),
        (
            config.inverter_id(PARAMETER_REQUEST)?.raw(),
            ids::message_name(PARAMETER_REQUEST),
        ),
    ]))
}

/// Broadcast traffic of a healthy inverter tracking the requested torque.
struct SimulatedInverter {
    base: u32,
}

impl SimulatedInverter {
    fn broadcasts(&self, tick: u64, torque: i16) -> Result<Vec<Frame>, FrameError> {
        let step = (tick % 100) as i16;
        let frames = [
            (ids::TEMP_1, words([250 + step % 10, 252, 249, 310])),
            (ids::TEMP_3_TORQUE_SHUDDER, words([280, 0, 450 + step, 0])),
            (ids::MOTOR_POSITION_INFO, words([step * 36, 1000 + step * 10, 0, 0])),
            (ids::VOLTAGE_INFO, words([3000 - step, 1200, 0, 0])),
            (ids::INTERNAL_STATES, [6, 0, 5, 1, 0x01, 0, 0x01, 0x01]),
            (ids::FAULT_CODES, [0; 8]),
            (ids::TORQUE_TIMER_INFO, torque_timer(torque, tick)),
        ];
        frames
            .into_iter()
            .map(|(offset, data)| {
                let raw = self.base.checked_add(offset).ok_or(FrameError::InvalidId {
                    id: self.base,
                    extended: false,
                })?;
                Frame::standard(raw, &data)
            })
            .collect()
    }
}

fn words(values: [i16; 4]) -> [u8; 8] {
    let mut data = [0u8; 8];
    for (chunk, value) in data.chunks_exact_mut(2).zip(values) {
        chunk.copy_from_slice(&value.to_le_bytes());
    }
    data
}

fn torque_timer(torque: i16, tick: u64) -> [u8; 8] {
    let mut data = [0u8; 8];
    data[0..2].copy_from_slice(&torque.to_le_bytes());
    data[2..4].copy_from_slice(&torque.to_le_bytes());
    data[4..8].copy_from_slice(&(tick as u32).to_le_bytes());
    data
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
