use clap::{Args, Subcommand};

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod lifecycle;
pub mod roundtrip;
pub mod types;
pub mod version;

/// Largest `lifecycle --create`: one message per `u16` id.
pub const MAX_CREATE: i64 = 1 << 16;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the demo message types.
    Types(TypesArgs),
    /// Write, measure and read back one demo message.
    Roundtrip(RoundtripArgs),
    /// Run a create/release scenario and report leaks.
    Lifecycle(LifecycleArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Types(args) => types::run(args, format),
        Command::Roundtrip(args) => roundtrip::run(args, format),
        Command::Lifecycle(args) => lifecycle::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug, Default)]
pub struct TypesArgs {}

#[derive(Args, Debug)]
pub struct RoundtripArgs {
    /// Demo message type id (see `netmsg types`).
    #[arg(long = "type", value_name = "TYPE", allow_negative_numbers = true)]
    pub message_type: i64,
    /// Seed for the populated field values.
    #[arg(long, default_value_t = 1)]
    pub seed: u16,
}

#[derive(Args, Debug)]
pub struct LifecycleArgs {
    /// Messages to create, cycling through the demo types. Each gets its
    /// index as its `u16` message id, so at most 65536.
    #[arg(
        long,
        default_value_t = 8,
        value_parser = clap::value_parser!(u32).range(0..=MAX_CREATE)
    )]
    pub create: u32,
    /// Messages to release, oldest first. Default: all created.
    #[arg(long)]
    pub release: Option<usize>,
    /// Attach a block of this many bytes to each block message.
    #[arg(long, value_name = "BYTES", default_value_t = 0)]
    pub block_size: usize,
    /// Allocator budget in bytes shared by messages and blocks.
    #[arg(long, value_name = "BYTES", default_value_t = 1usize << 20)]
    pub budget: usize,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
