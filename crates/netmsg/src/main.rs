mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "netmsg", version, about = "Message lifecycle diagnostics")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", env = "NETMSG_FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(
        long,
        value_name = "LEVEL",
        env = "NETMSG_LOG_LEVEL",
        default_value = "info",
        global = true
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

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

    #[test]
    fn parses_lifecycle_subcommand() {
        let cli = Cli::try_parse_from([
            "netmsg",
            "lifecycle",
            "--create",
            "8",
            "--release",
            "6",
            "--block-size",
            "128",
        ])
        .expect("lifecycle args should parse");

        let Command::Lifecycle(args) = cli.command else {
            panic!("expected lifecycle");
        };
        assert_eq!(args.create, 8);
        assert_eq!(args.release, Some(6));
        assert_eq!(args.block_size, 128);
    }

    #[test]
    fn parses_roundtrip_type_flag() {
        let cli = Cli::try_parse_from(["netmsg", "roundtrip", "--type", "2", "--seed", "9"])
            .expect("roundtrip args should parse");
        let Command::Roundtrip(args) = cli.command else {
            panic!("expected roundtrip");
        };
        assert_eq!(args.message_type, 2);
        assert_eq!(args.seed, 9);
    }

    #[test]
    fn rejects_unknown_output_format() {
        let err = Cli::try_parse_from(["netmsg", "--format", "xml", "types"])
            .expect_err("unknown format should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidValue);
    }

    #[test]
    fn create_count_is_capped_at_u16_ids() {
        let cli = Cli::try_parse_from(["netmsg", "lifecycle", "--create", "65536"])
            .expect("65536 messages should parse");
        let Command::Lifecycle(args) = cli.command else {
            panic!("expected lifecycle");
        };
        assert_eq!(args.create, 65536);

        let err = Cli::try_parse_from(["netmsg", "lifecycle", "--create", "65537"])
            .expect_err("more messages than u16 ids should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn format_is_global() {
        let cli = Cli::try_parse_from(["netmsg", "types", "--format", "json"])
            .expect("global format should parse after subcommand");
        assert!(matches!(cli.format, Some(OutputFormat::Json)));
    }
}
