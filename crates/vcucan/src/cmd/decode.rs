use vcucan::frame::{Codec, DecodeOutcome, Dictionary, Frame, FrameId};
use vcucan::state::StateStore;
use vcucan::VcuConfig;

use crate::cmd::{parse_hex_bytes, DecodeArgs};
use crate::exit::{frame_error, CliResult, DATA_INVALID, FAILURE, SUCCESS};
use crate::output::{print_decode, OutputFormat};

pub fn run(args: DecodeArgs, config: &VcuConfig, format: OutputFormat) -> CliResult<i32> {
    let id = FrameId::new(args.id, args.extended).map_err(|err| frame_error("identifier", err))?;
    let data = parse_hex_bytes(&args.data)?;
    let frame = Frame::new(id, &data).map_err(|err| frame_error("frame", err))?;

    let dictionary = Dictionary::standard(&config.dictionary_config())
        .map_err(|err| frame_error("dictionary", err))?;
    let codec = Codec::new(dictionary);
    let store = StateStore::new();
    let outcome = codec
        .decode(&frame, &store)
        .map_err(|err| frame_error("decode", err))?;

    let values: Vec<_> = match codec.dictionary().lookup(id) {
        Some(entry) if matches!(outcome, DecodeOutcome::Decoded { .. }) => entry
            .points()
            .into_iter()
            .map(|point| (point, store.read(point)))
            .collect(),
        _ => Vec::new(),
    };
    print_decode(&frame, outcome, &values, format);

    Ok(match outcome {
        DecodeOutcome::Decoded { .. } => SUCCESS,
        DecodeOutcome::Unmatched => FAILURE,
        DecodeOutcome::Truncated { .. } => DATA_INVALID,
    })
}
