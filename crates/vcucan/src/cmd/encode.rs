use vcucan::frame::ids::{COMMAND, PARAMETER_REQUEST};
use vcucan::frame::{InverterCommand, ParameterRequest};
use vcucan::VcuConfig;

use crate::cmd::{EncodeArgs, EncodeCommand};
use crate::exit::{frame_error, vcu_error, CliResult, SUCCESS};
use crate::output::{print_frame, OutputFormat};

pub fn run(args: EncodeArgs, config: &VcuConfig, format: OutputFormat) -> CliResult<i32> {
    let command_id = config
        .inverter_id(COMMAND)
        .map_err(|err| vcu_error("command id", err))?;
    let parameter_id = config
        .inverter_id(PARAMETER_REQUEST)
        .map_err(|err| vcu_error("parameter id", err))?;

    let (frame, name) = match args.command {
        EncodeCommand::Torque { torque } => (
            InverterCommand::torque_request(torque).to_frame(command_id),
            "Command",
        ),
        EncodeCommand::Speed { speed } => (
            InverterCommand::speed_request(speed).to_frame(command_id),
            "Command",
        ),
        EncodeCommand::Disable => (InverterCommand::disable().to_frame(command_id), "Command"),
        EncodeCommand::ParamRead { address } => (
            ParameterRequest::read(address).to_frame(parameter_id),
            "Parameter_Request",
        ),
        EncodeCommand::ParamWrite { address, data } => (
            ParameterRequest::write(address, data).to_frame(parameter_id),
            "Parameter_Request",
        ),
    };
    let frame = frame.map_err(|err| frame_error("encode", err))?;
    print_frame(&frame, name, format);
    Ok(SUCCESS)
}
