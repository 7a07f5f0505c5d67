use vcucan::frame::Dictionary;
use vcucan::VcuConfig;

use crate::exit::{frame_error, CliResult, SUCCESS};
use crate::output::{print_dictionary, OutputFormat};

pub fn run(config: &VcuConfig, format: OutputFormat) -> CliResult<i32> {
    let dictionary = Dictionary::standard(&config.dictionary_config())
        .map_err(|err| frame_error("dictionary", err))?;
    print_dictionary(&dictionary, format);
    Ok(SUCCESS)
}
