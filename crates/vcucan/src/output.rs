use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use vcucan::frame::{DecodeOutcome, Dictionary, Frame};
use vcucan::state::PointId;
use vcucan::{VcuConfig, VcuStats};

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

#[derive(Serialize)]
struct EntryOutput<'a> {
    id: String,
    name: &'a str,
    owner: &'a str,
    strategy: &'a str,
    min_len: usize,
    points: Vec<&'static str>,
}

pub fn print_dictionary(dictionary: &Dictionary, format: OutputFormat) {
    let rows: Vec<EntryOutput<'_>> = dictionary
        .entries()
        .iter()
        .map(|entry| EntryOutput {
            id: entry.id.to_string(),
            name: entry.name,
            owner: entry.owner.name(),
            strategy: entry.strategy.name(),
            min_len: entry.required_len(),
            points: entry.points().into_iter().map(PointId::name).collect(),
        })
        .collect();

    match format {
        OutputFormat::Json => print_json(&rows),
        OutputFormat::Table => {
            let mut table = new_table(vec!["ID", "NAME", "OWNER", "DECODE", "MIN LEN", "POINTS"]);
            for row in &rows {
                table.add_row(vec![
                    row.id.clone(),
                    row.name.to_string(),
                    row.owner.to_string(),
                    row.strategy.to_string(),
                    row.min_len.to_string(),
                    row.points.join(", "),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            for row in &rows {
                println!(
                    "{} {} owner={} decode={} points={}",
                    row.id,
                    row.name,
                    row.owner,
                    row.strategy,
                    row.points.join(",")
                );
            }
        }
    }
}

#[derive(Serialize)]
struct PointOutput {
    point: &'static str,
    value: u32,
    hex: String,
}

#[derive(Serialize)]
struct DecodeOutput<'a> {
    id: String,
    data: String,
    outcome: &'a str,
    entry: Option<&'a str>,
    points: Vec<PointOutput>,
}

pub fn print_decode(
    frame: &Frame,
    outcome: DecodeOutcome,
    values: &[(PointId, u32)],
    format: OutputFormat,
) {
    let (label, entry) = match outcome {
        DecodeOutcome::Decoded { entry } => ("decoded", Some(entry)),
        DecodeOutcome::Unmatched => ("unmatched", None),
        DecodeOutcome::Truncated { entry, .. } => ("truncated", Some(entry)),
    };
    let out = DecodeOutput {
        id: frame.id().to_string(),
        data: hex(frame.data()),
        outcome: label,
        entry,
        points: values
            .iter()
            .map(|&(point, value)| PointOutput {
                point: point.name(),
                value,
                hex: format!("0x{value:X}"),
            })
            .collect(),
    };

    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => {
            let mut table = new_table(vec!["POINT", "VALUE", "HEX"]);
            for point in &out.points {
                table.add_row(vec![
                    point.point.to_string(),
                    point.value.to_string(),
                    point.hex.clone(),
                ]);
            }
            println!("{} {} ({label})", out.id, entry.unwrap_or("-"));
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("{} {} ({label})", out.id, entry.unwrap_or("-"));
            for point in &out.points {
                println!("  {} = {} ({})", point.point, point.value, point.hex);
            }
        }
        OutputFormat::Raw => {
            for point in &out.points {
                println!("{}={}", point.point, point.value);
            }
        }
    }
}

#[derive(Serialize)]
struct FrameOutput<'a> {
    id: String,
    extended: bool,
    name: &'a str,
    len: usize,
    data: String,
}

/// One frame, labelled with what it carries.
pub fn print_frame(frame: &Frame, name: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&FrameOutput {
            id: frame.id().to_string(),
            extended: frame.is_extended(),
            name,
            len: frame.len(),
            data: hex(frame.data()),
        }),
        OutputFormat::Table => {
            let mut table = new_table(vec!["ID", "NAME", "LEN", "DATA"]);
            table.add_row(vec![
                frame.id().to_string(),
                name.to_string(),
                frame.len().to_string(),
                hex(frame.data()),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{frame}  {name}"),
        OutputFormat::Raw => print_raw(frame.data()),
    }
}

#[derive(Serialize)]
struct StatsOutput {
    decoded: u64,
    unmatched: u64,
    truncated: u64,
    transmitted: u64,
    transmit_failed: u64,
    received: u64,
    rx_dropped: u64,
    peak_in_flight: usize,
    cycles: u64,
    segments_sent: u64,
    overruns: u64,
    module_errors: Vec<&'static str>,
}

pub fn print_stats(stats: &VcuStats, module_errors: Vec<&'static str>, format: OutputFormat) {
    let out = StatsOutput {
        decoded: stats.codec.decoded,
        unmatched: stats.codec.unmatched,
        truncated: stats.codec.truncated,
        transmitted: stats.transport.transmitted,
        transmit_failed: stats.transport.transmit_failed,
        received: stats.transport.received,
        rx_dropped: stats.transport.rx_dropped,
        peak_in_flight: stats.transport.peak_in_flight,
        cycles: stats.broadcast.cycles,
        segments_sent: stats.broadcast.segments_sent,
        overruns: stats.broadcast.overruns,
        module_errors,
    };

    let rows = [
        ("decoded", out.decoded.to_string()),
        ("unmatched", out.unmatched.to_string()),
        ("truncated", out.truncated.to_string()),
        ("transmitted", out.transmitted.to_string()),
        ("transmit_failed", out.transmit_failed.to_string()),
        ("received", out.received.to_string()),
        ("rx_dropped", out.rx_dropped.to_string()),
        ("peak_in_flight", out.peak_in_flight.to_string()),
        ("cycles", out.cycles.to_string()),
        ("segments_sent", out.segments_sent.to_string()),
        ("overruns", out.overruns.to_string()),
        ("module_errors", out.module_errors.join("|")),
    ];

    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => {
            let mut table = new_table(vec!["COUNTER", "VALUE"]);
            for (name, value) in rows {
                table.add_row(vec![name.to_string(), value]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            for (name, value) in rows {
                println!("{name}: {value}");
            }
        }
    }
}

pub fn print_config(config: &VcuConfig, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(config),
        OutputFormat::Table => {
            let mut table = new_table(vec!["SETTING", "VALUE"]);
            let value = serde_json::to_value(config).unwrap_or_default();
            for (key, value) in flatten("", &value) {
                table.add_row(vec![key, value]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => println!(
            "{}",
            serde_json::to_string_pretty(config).unwrap_or_else(|_| "{}".to_string())
        ),
    }
}

fn flatten(prefix: &str, value: &serde_json::Value) -> Vec<(String, String)> {
    match value {
        serde_json::Value::Object(map) => map
            .iter()
            .flat_map(|(key, value)| {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten(&path, value)
            })
            .collect(),
        other => vec![(prefix.to_string(), other.to_string())],
    }
}
