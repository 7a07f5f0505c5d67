use vcucan::VcuConfig;

use crate::cmd::ConfigArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_config, OutputFormat};

pub fn run(_args: ConfigArgs, config: &VcuConfig, format: OutputFormat) -> CliResult<i32> {
    print_config(config, format);
    Ok(SUCCESS)
}
