use std::rc::Rc;

use netmsg::demo;
use netmsg::message::{HeapAllocator, MessageFactory};
use netmsg::stream::{MeasureStream, Stream};
use serde::Serialize;

use crate::cmd::TypesArgs;
use crate::exit::{message_error, stream_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_json, print_table, schema_id, OutputFormat};

#[derive(Debug, Serialize)]
struct TypeEntry {
    id: u16,
    name: &'static str,
    kind: &'static str,
    default_bits: usize,
}

#[derive(Debug, Serialize)]
struct TypesOutput {
    schema_id: String,
    num_types: u16,
    types: Vec<TypeEntry>,
}

pub fn run(_args: TypesArgs, format: OutputFormat) -> CliResult<i32> {
    let registry = demo::registry().map_err(|err| message_error("build registry", err))?;
    let mut factory = MessageFactory::new(Rc::new(HeapAllocator), registry);

    let mut types = Vec::new();
    for (message_type, name) in factory.registry().types() {
        let message = factory
            .create_message(message_type.get())
            .map_err(|err| message_error("create message", err))?
            .ok_or_else(|| CliError::new(INTERNAL, format!("could not create {name} message")))?;

        let mut measure = MeasureStream::new();
        let measured = message.serialize(&mut measure);
        let kind = if message.is_block_message() { "block" } else { "plain" };
        factory
            .release_message(message)
            .map_err(|err| message_error("release message", err.error))?;
        measured.map_err(|err| stream_error("measure message", err))?;

        types.push(TypeEntry {
            id: message_type.get(),
            name,
            kind,
            default_bits: measure.bits_processed(),
        });
    }

    let output = TypesOutput {
        schema_id: schema_id("message-types"),
        num_types: factory.num_types(),
        types,
    };
    print_types(&output, format);
    Ok(SUCCESS)
}

fn print_types(output: &TypesOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(output),
        OutputFormat::Table => print_table(
            vec!["ID", "NAME", "KIND", "DEFAULT BITS"],
            output
                .types
                .iter()
                .map(|entry| {
                    vec![
                        entry.id.to_string(),
                        entry.name.to_string(),
                        entry.kind.to_string(),
                        entry.default_bits.to_string(),
                    ]
                })
                .collect(),
        ),
        OutputFormat::Pretty => {
            for entry in &output.types {
                println!(
                    "type={} name={} kind={} default_bits={}",
                    entry.id, entry.name, entry.kind, entry.default_bits
                );
            }
        }
    }
}
