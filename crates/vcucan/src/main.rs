mod cmd;
mod exit;
mod logging;
mod output;

use std::path::PathBuf;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "vcucan", version, about = "VCU CAN communications tool")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    /// JSON configuration file. Defaults apply when omitted.
    #[arg(long, value_name = "FILE", env = "VCUCAN_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format, cli.config.as_deref());

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::EncodeCommand;

    #[test]
    fn parses_decode_subcommand() {
        let cli = Cli::try_parse_from(["vcucan", "decode", "0xA0", "10 00 20 00"])
            .expect("decode args should parse");
        assert!(matches!(cli.command, Command::Decode(_)));
    }

    #[test]
    fn parses_nested_encode_subcommand() {
        let cli = Cli::try_parse_from(["vcucan", "encode", "param-write", "172", "33"])
            .expect("encode args should parse");
        match cli.command {
            Command::Encode(args) => assert!(matches!(
                args.command,
                EncodeCommand::ParamWrite { address: 172, data: 33 }
            )),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn negative_torque_is_a_value() {
        let cli = Cli::try_parse_from(["vcucan", "encode", "torque", "-150"])
            .expect("negative torque should parse");
        match cli.command {
            Command::Encode(args) => {
                assert!(matches!(args.command, EncodeCommand::Torque { torque: -150 }))
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::try_parse_from(["vcucan", "dictionary", "--config", "/tmp/vcu.json"])
            .expect("global --config should parse after the subcommand");
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/vcu.json")));
    }
}
