pub mod commands;

use clap::{Arg, ArgAction, Command};

pub use commands::handle_subcommands;

pub fn build_cli() -> Command {
    Command::new("rtu-link")
        .version(crate::VERSION)
        .about("Modbus RTU master/slave over a serial line")
        .subcommand_required(true)
        .arg(Arg::new("config").short('c').long("config").global(true).help("TOML configuration file"))
        .arg(Arg::new("port").short('p').long("port").global(true).help("Serial port, e.g. /dev/ttyUSB0"))
        .arg(Arg::new("baud").short('b').long("baud").global(true).help("Baud rate"))
        .arg(Arg::new("slave").short('s').long("slave").global(true).help("Slave address (1-247)"))
        .arg(Arg::new("timeout").short('t').long("timeout").global(true).help("Response timeout in ms"))
        .arg(
            Arg::new("format")
                .short('f')
                .long("format")
                .global(true)
                .value_parser(["console", "json", "csv"])
                .default_value("console")
                .help("Output format for register reads"),
        )
        .arg(
            Arg::new("output-file")
                .short('o')
                .long("output-file")
                .global(true)
                .help("Append formatted reads to this file"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Debug logging for this crate"),
        )
        .subcommand(
            Command::new("read")
                .about("Read holding registers")
                .arg(Arg::new("start").required(true))
                .arg(Arg::new("quantity").required(true)),
        )
        .subcommand(
            Command::new("write")
                .about("Write a single holding register")
                .arg(Arg::new("address").required(true))
                .arg(Arg::new("value").required(true)),
        )
        .subcommand(
            Command::new("write-multiple")
                .about("Write consecutive holding registers")
                .arg(Arg::new("start").required(true))
                .arg(Arg::new("values").required(true).help("Comma separated values")),
        )
        .subcommand(
            Command::new("send-string")
                .about("Write up to 30 characters as 15 registers")
                .arg(Arg::new("start").required(true))
                .arg(Arg::new("text").required(true)),
        )
        .subcommand(
            Command::new("transfer-string")
                .about("Send up to 30 characters with function 0x16")
                .arg(Arg::new("start").required(true))
                .arg(Arg::new("text").required(true)),
        )
        .subcommand(
            Command::new("poll")
                .about("Read holding registers repeatedly until Ctrl+C")
                .arg(Arg::new("start").required(true))
                .arg(Arg::new("quantity").required(true))
                .arg(Arg::new("interval").short('i').long("interval").default_value("5").help("Seconds between reads")),
        )
        .subcommand(Command::new("serve").about("Answer requests as a slave until Ctrl+C"))
        .subcommand(
            Command::new("crc")
                .about("Compute the Modbus CRC of hex bytes")
                .arg(Arg::new("bytes").required(true).num_args(1..).help("Hex bytes, e.g. 01 03 00 0A 00 01")),
        )
        .subcommand(
            Command::new("init-config")
                .about("Write the default configuration")
                .arg(Arg::new("path").required(true)),
        )
        .subcommand(Command::new("ports").about("List serial ports"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        build_cli().debug_assert();
    }

    #[test]
    fn global_options_follow_subcommand() {
        let matches = build_cli()
            .try_get_matches_from(["rtu-link", "read", "10", "1", "--slave", "3", "-f", "json"])
            .unwrap();
        assert_eq!(matches.get_one::<String>("slave").map(String::as_str), Some("3"));
        assert_eq!(matches.get_one::<String>("format").map(String::as_str), Some("json"));
        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(name, "read");
        assert_eq!(sub.get_one::<String>("start").map(String::as_str), Some("10"));
    }

    #[test]
    fn crc_takes_multiple_bytes() {
        let matches = build_cli()
            .try_get_matches_from(["rtu-link", "crc", "01", "03", "000A0001"])
            .unwrap();
        let sub = matches.subcommand_matches("crc").unwrap();
        assert_eq!(sub.get_many::<String>("bytes").unwrap().count(), 3);
    }
}
