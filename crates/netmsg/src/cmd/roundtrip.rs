use std::rc::Rc;

use netmsg::demo;
use netmsg::message::{FactoryConfig, HeapAllocator, LeakTracking, MessageFactory, MessageType};
use serde::Serialize;

use crate::cmd::RoundtripArgs;
use crate::exit::{
    message_error, round_trip_error, CliError, CliResult, DATA_INVALID, FAILURE, SUCCESS,
};
use crate::output::{print_json, print_table, schema_id, OutputFormat};

#[derive(Debug, Serialize)]
struct RoundtripOutput {
    schema_id: String,
    message_type: i64,
    name: &'static str,
    seed: u16,
    measured_bits: usize,
    written_bits: usize,
    read_bits: usize,
    wire_bytes: usize,
    fields_match: bool,
    exact: bool,
}

pub fn run(args: RoundtripArgs, format: OutputFormat) -> CliResult<i32> {
    let registry = demo::registry().map_err(|err| message_error("build registry", err))?;
    let mut factory = MessageFactory::with_config(
        Rc::new(HeapAllocator),
        registry,
        FactoryConfig::with_leak_tracking(LeakTracking::Report),
    );

    let trip = demo::round_trip(&mut factory, args.message_type, args.seed)
        .map_err(|err| round_trip_error("roundtrip", err))?
        .ok_or_else(|| {
            CliError::new(
                FAILURE,
                format!("roundtrip: factory error level {}", factory.error_level()),
            )
        })?;

    let name = MessageType::try_from(args.message_type)
        .ok()
        .and_then(|ty| factory.registry().name(ty))
        .unwrap_or("unknown");

    let output = RoundtripOutput {
        schema_id: schema_id("roundtrip-report"),
        message_type: args.message_type,
        name,
        seed: args.seed,
        measured_bits: trip.measured_bits,
        written_bits: trip.written_bits,
        read_bits: trip.read_bits,
        wire_bytes: trip.wire_bytes,
        fields_match: trip.fields_match,
        exact: trip.is_exact(),
    };
    print_roundtrip(&output, format);

    if output.exact {
        Ok(SUCCESS)
    } else {
        Ok(DATA_INVALID)
    }
}

fn print_roundtrip(output: &RoundtripOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(output),
        OutputFormat::Table => print_table(
            vec!["TYPE", "NAME", "MEASURED", "WRITTEN", "READ", "BYTES", "MATCH"],
            vec![vec![
                output.message_type.to_string(),
                output.name.to_string(),
                output.measured_bits.to_string(),
                output.written_bits.to_string(),
                output.read_bits.to_string(),
                output.wire_bytes.to_string(),
                output.fields_match.to_string(),
            ]],
        ),
        OutputFormat::Pretty => {
            println!(
                "type={} ({}) measured={} written={} read={} bytes={} match={}",
                output.message_type,
                output.name,
                output.measured_bits,
                output.written_bits,
                output.read_bits,
                output.wire_bytes,
                output.fields_match
            );
        }
    }
}
