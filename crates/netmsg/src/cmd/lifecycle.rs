use std::rc::Rc;

use netmsg::demo;
use netmsg::message::{
    Allocator, BudgetAllocator, FactoryConfig, LeakTracking, MessageFactory, ReleaseOutcome,
};
use serde::Serialize;
use tracing::info;

use crate::cmd::LifecycleArgs;
use crate::exit::{message_error, CliResult, FAILURE, SUCCESS};
use crate::output::{print_json, print_table, schema_id, OutputFormat};

#[derive(Debug, Serialize)]
struct LeakEntry {
    key: u64,
    message_type: u16,
    ref_count: u32,
    block: bool,
}

#[derive(Debug, Serialize)]
struct LifecycleOutput {
    schema_id: String,
    requested: usize,
    created: usize,
    failed: usize,
    released: usize,
    destroyed: usize,
    error_level: &'static str,
    budget_bytes: usize,
    peak_bytes: usize,
    leaked: Vec<LeakEntry>,
    outstanding_after_shutdown: usize,
    clean: bool,
}

pub fn run(args: LifecycleArgs, format: OutputFormat) -> CliResult<i32> {
    let registry = demo::registry().map_err(|err| message_error("build registry", err))?;
    let budget = Rc::new(BudgetAllocator::new(args.budget));
    let allocator: Rc<dyn Allocator> = budget.clone();
    let mut factory = MessageFactory::with_config(
        Rc::clone(&allocator),
        registry,
        FactoryConfig::with_leak_tracking(LeakTracking::Report),
    );

    let mut live = Vec::with_capacity(args.create as usize);
    let mut failed = 0;
    let mut peak_bytes = 0;
    for index in 0..args.create as usize {
        let message_type = (index % demo::NUM_TYPES) as u16;
        // --create is capped at 65536, so every index fits a u16 id.
        let id = index as u16;
        let created = factory
            .create_message(message_type)
            .map_err(|err| message_error("create message", err))?;
        let Some(message) = created else {
            failed += 1;
            continue;
        };
        message.set_id(id);
        demo::populate(&message, id, &allocator, args.block_size)
            .map_err(|err| message_error("populate message", err))?;
        peak_bytes = peak_bytes.max(budget.used());
        live.push(message);
    }
    let created = live.len();

    let to_release = args.release.unwrap_or(created).min(created);
    let mut destroyed = 0;
    for message in live.drain(..to_release) {
        let outcome = factory
            .release_message(message)
            .map_err(|err| message_error("release message", err.error))?;
        if outcome == ReleaseOutcome::Destroyed {
            destroyed += 1;
        }
    }

    let error_level = factory.error_level();
    info!(
        created,
        failed,
        released = to_release,
        still_held = live.len(),
        "lifecycle scenario finished"
    );

    // Teardown reports the handles still in `live`; dropping them afterwards
    // returns their memory to the budget.
    let report = factory.shutdown();
    drop(live);

    let output = LifecycleOutput {
        schema_id: schema_id("lifecycle-report"),
        requested: args.create as usize,
        created,
        failed,
        released: to_release,
        destroyed,
        error_level: error_level.as_str(),
        budget_bytes: budget.capacity(),
        peak_bytes,
        leaked: report
            .leaks
            .iter()
            .map(|leak| LeakEntry {
                key: leak.key.get(),
                message_type: leak.message_type.get(),
                ref_count: leak.ref_count,
                block: leak.is_block,
            })
            .collect(),
        outstanding_after_shutdown: budget.outstanding(),
        clean: report.is_clean(),
    };
    print_lifecycle(&output, format);

    if output.clean {
        Ok(SUCCESS)
    } else {
        Ok(FAILURE)
    }
}

fn print_lifecycle(output: &LifecycleOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(output),
        OutputFormat::Table => {
            print_table(
                vec!["CREATED", "FAILED", "RELEASED", "DESTROYED", "ERROR LEVEL", "PEAK BYTES"],
                vec![vec![
                    output.created.to_string(),
                    output.failed.to_string(),
                    output.released.to_string(),
                    output.destroyed.to_string(),
                    output.error_level.to_string(),
                    output.peak_bytes.to_string(),
                ]],
            );
            if !output.leaked.is_empty() {
                print_table(
                    vec!["LEAKED", "TYPE", "REFCOUNT", "BLOCK"],
                    output
                        .leaked
                        .iter()
                        .map(|leak| {
                            vec![
                                format!("#{}", leak.key),
                                leak.message_type.to_string(),
                                leak.ref_count.to_string(),
                                leak.block.to_string(),
                            ]
                        })
                        .collect(),
                );
            }
        }
        OutputFormat::Pretty => {
            println!(
                "created={} failed={} released={} destroyed={} error_level={} peak_bytes={}",
                output.created,
                output.failed,
                output.released,
                output.destroyed,
                output.error_level,
                output.peak_bytes
            );
            for leak in &output.leaked {
                println!(
                    "leaked message #{} (type {}, refcount {})",
                    leak.key, leak.message_type, leak.ref_count
                );
            }
        }
    }
}
