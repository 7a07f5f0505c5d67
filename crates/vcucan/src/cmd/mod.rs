use std::path::Path;

use clap::{Args, Subcommand};
use vcucan::VcuConfig;

use crate::exit::{vcu_error, CliError, CliResult};
use crate::output::OutputFormat;

pub mod config;
pub mod decode;
pub mod dictionary;
pub mod encode;
pub mod simulate;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the incoming message dictionary.
    Dictionary(DictionaryArgs),
    /// Decode one frame and print the points it writes.
    Decode(DecodeArgs),
    /// Print an inverter command frame.
    Encode(EncodeArgs),
    /// Run the full stack against a simulated inverter.
    Simulate(SimulateArgs),
    /// Print the effective configuration.
    Config(ConfigArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat, config: Option<&Path>) -> CliResult<i32> {
    match command {
        Command::Dictionary(_) => dictionary::run(&load_config(config)?, format),
        Command::Decode(args) => decode::run(args, &load_config(config)?, format),
        Command::Encode(args) => encode::run(args, &load_config(config)?, format),
        Command::Simulate(args) => simulate::run(args, load_config(config)?, format),
        Command::Config(args) => config::run(args, &load_config(config)?, format),
        Command::Version(args) => version::run(args),
    }
}

fn load_config(path: Option<&Path>) -> CliResult<VcuConfig> {
    match path {
        Some(path) => VcuConfig::from_file(path).map_err(|err| vcu_error("config", err)),
        None => Ok(VcuConfig::default()),
    }
}

/// Accepts `0x`-prefixed hex or decimal.
pub fn parse_u32(input: &str) -> Result<u32, String> {
    let parsed = match input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        Some(digits) => u32::from_str_radix(digits, 16),
        None => input.parse(),
    };
    parsed.map_err(|err| format!("invalid number {input:?}: {err}"))
}

pub fn parse_u16(input: &str) -> Result<u16, String> {
    let value = parse_u32(input)?;
    u16::try_from(value).map_err(|_| format!("{input} does not fit in 16 bits"))
}

/// Accepts `"10 00 2A"`, `"10:00:2A"`, or `"10002A"`.
pub fn parse_hex_bytes(input: &str) -> CliResult<Vec<u8>> {
    let digits: String = input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':' && *c != ',')
        .collect();
    hex::decode(&digits)
        .map_err(|err| CliError::usage(format!("invalid hex data {input:?}: {err}")))
}

#[derive(Args, Debug, Default)]
pub struct DictionaryArgs {}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Frame identifier (hex with 0x prefix, or decimal).
    #[arg(value_parser = parse_u32)]
    pub id: u32,
    /// Data bytes in hex, up to 8.
    pub data: String,
    /// Treat the identifier as 29-bit extended.
    #[arg(long)]
    pub extended: bool,
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    #[command(subcommand)]
    pub command: EncodeCommand,
}

#[derive(Subcommand, Debug)]
pub enum EncodeCommand {
    /// Torque-mode command (Nm x 10).
    Torque {
        #[arg(allow_negative_numbers = true)]
        torque: i16,
    },
    /// Speed-mode command (rpm).
    Speed {
        #[arg(allow_negative_numbers = true)]
        speed: i16,
    },
    /// All-zero command that disables the inverter.
    Disable,
    /// Parameter read request.
    ParamRead {
        #[arg(value_parser = parse_u16)]
        address: u16,
    },
    /// Parameter write request.
    ParamWrite {
        #[arg(value_parser = parse_u16)]
        address: u16,
        #[arg(value_parser = parse_u16)]
        data: u16,
    },
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Stop after this many broadcast periods. Runs until Ctrl-C otherwise.
    #[arg(long)]
    pub ticks: Option<u64>,
    /// Torque requested from the simulated inverter each period (Nm x 10).
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub torque: i16,
    /// Only print the final counters, not every transmitted frame.
    #[arg(long)]
    pub quiet: bool,
}

#[derive(Args, Debug, Default)]
pub struct ConfigArgs {}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_accept_hex_and_decimal() {
        assert_eq!(parse_u32("0xA0"), Ok(0xA0));
        assert_eq!(parse_u32("160"), Ok(160));
        assert!(parse_u32("0xZZ").is_err());
        assert_eq!(parse_u16("0xFFFF"), Ok(0xFFFF));
        assert!(parse_u16("0x10000").is_err());
    }

    #[test]
    fn hex_bytes_accept_separators() {
        assert_eq!(parse_hex_bytes("10 00 2a").unwrap(), vec![0x10, 0x00, 0x2A]);
        assert_eq!(parse_hex_bytes("10:00:2A").unwrap(), vec![0x10, 0x00, 0x2A]);
        assert_eq!(parse_hex_bytes("10002A").unwrap(), vec![0x10, 0x00, 0x2A]);
        assert!(parse_hex_bytes("100").is_err());
        assert!(parse_hex_bytes("zz").is_err());
        assert!(parse_hex_bytes("é0").is_err());
        assert_eq!(parse_hex_bytes("1 0 0").unwrap_err().code, crate::exit::USAGE);
    }
}
