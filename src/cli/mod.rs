pub mod commands;

use clap::{Arg, ArgAction, Command};

use crate::devices::mock::MAX_HISTORY_DAYS;

pub use commands::{apply_overrides, handle_subcommands};

pub fn build_cli() -> Command {
    Command::new("condensate")
        .version(crate::VERSION)
        .about("Conductivity meter logger: live readings, CSV history and analysis")
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("PATH")
                .help("Settings file to use instead of the per-user default")
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Debug logging")
                .global(true),
        )
        .arg(
            Arg::new("mock")
                .long("mock")
                .action(ArgAction::SetTrue)
                .help("Simulate a meter instead of opening the serial port")
                .global(true),
        )
        .arg(Arg::new("port").long("port").value_name("PORT").help("Serial port").global(true))
        .arg(
            Arg::new("baud")
                .long("baud")
                .value_name("RATE")
                .value_parser(clap::value_parser!(u32).range(1..))
                .help("Baud rate")
                .global(true),
        )
        .arg(Arg::new("model").long("model").value_name("MODEL").help("Meter model").global(true))
        .arg(
            Arg::new("log-dir")
                .long("log-dir")
                .value_name("DIR")
                .help("Directory for CSV logs")
                .global(true),
        )
        .arg(
            Arg::new("format")
                .long("format")
                .value_name("FORMAT")
                .value_parser(["console", "json", "csv"])
                .help("Output format for readings and statistics")
                .global(true),
        )
        .arg(
            Arg::new("output-file")
                .long("output-file")
                .value_name("FILE")
                .help("Also append formatted readings to this file")
                .global(true),
        )
        .subcommand(
            Command::new("run")
                .about("Poll the meter and log readings until Ctrl-C (default)")
                .arg(
                    Arg::new("chart")
                        .long("chart")
                        .action(ArgAction::SetTrue)
                        .help("Redraw a sparkline of the live buffer every update interval"),
                )
                .arg(
                    Arg::new("api")
                        .long("api")
                        .action(ArgAction::SetTrue)
                        .help("Serve the HTTP API even if disabled in settings"),
                )
                .arg(
                    Arg::new("websocket")
                        .long("websocket")
                        .action(ArgAction::SetTrue)
                        .help("Serve the WebSocket live feed even if disabled in settings"),
                ),
        )
        .subcommand(Command::new("read").about("Take a single reading, log it and print it"))
        .subcommand(
            Command::new("ports").about("List serial ports").arg(
                Arg::new("probe")
                    .long("probe")
                    .action(ArgAction::SetTrue)
                    .help("Try opening each port at the configured baud rate"),
            ),
        )
        .subcommand(Command::new("models").about("List supported meter models"))
        .subcommand(config_command())
        .subcommand(
            Command::new("history")
                .about("Browse logged readings")
                .subcommand_required(true)
                .subcommand(Command::new("dates").about("Dates that have logged readings"))
                .subcommand(
                    Command::new("show")
                        .about("Readings for one day")
                        .arg(date_arg("date", "Day to show (default: today)"))
                        .arg(
                            Arg::new("chart")
                                .long("chart")
                                .action(ArgAction::SetTrue)
                                .help("Draw the day as a sparkline"),
                        )
                        .arg(
                            Arg::new("min")
                                .long("min")
                                .value_parser(clap::value_parser!(f64))
                                .help("Only readings at or above this µS/cm value"),
                        )
                        .arg(
                            Arg::new("max")
                                .long("max")
                                .value_parser(clap::value_parser!(f64))
                                .help("Only readings at or below this µS/cm value"),
                        ),
                ),
        )
        .subcommand(
            Command::new("stats")
                .about("Statistics, trend and anomalies for one day")
                .arg(date_arg("date", "Day to analyse (default: today)"))
                .arg(metric_arg())
                .arg(
                    Arg::new("anomaly-method")
                        .long("anomaly-method")
                        .value_parser(["zscore", "iqr"])
                        .default_value("zscore"),
                ),
        )
        .subcommand(
            Command::new("compare")
                .about("Compare days side by side, or rank days similar to one")
                .arg(Arg::new("dates").num_args(0..).value_name("DATE"))
                .arg(metric_arg())
                .arg(date_arg("similar", "Rank other days by similarity to this one"))
                .arg(
                    Arg::new("method")
                        .long("method")
                        .value_parser(["correlation", "euclidean"])
                        .default_value("correlation"),
                )
                .arg(
                    Arg::new("top")
                        .long("top")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("5"),
                ),
        )
        .subcommand(
            Command::new("export")
                .about("Export logged readings to CSV or JSON (by file extension)")
                .arg(date_arg("from", "First day (default: earliest)"))
                .arg(date_arg("to", "Last day (default: latest)"))
                .arg(
                    Arg::new("output")
                        .long("output")
                        .short('o')
                        .value_name("FILE")
                        .required(true),
                ),
        )
        .subcommand(Command::new("check-permissions").about("Report which log locations are writable"))
        .subcommand(
            Command::new("test-write")
                .about("Write, read back and delete a probe file")
                .arg(Arg::new("dir").long("dir").value_name("DIR").help("Directory to test (default: log directory)")),
        )
        .subcommand(
            Command::new("generate-mock")
                .about("Write simulated history to the mock log")
                .arg(
                    Arg::new("days")
                        .long("days")
                        .value_parser(clap::value_parser!(u32).range(1..=i64::from(MAX_HISTORY_DAYS)))
                        .default_value("7"),
                )
                .arg(Arg::new("seed").long("seed").value_parser(clap::value_parser!(u64))),
        )
        .subcommand(
            Command::new("migrate")
                .about("Import CSV history into the SQLite database")
                .arg(Arg::new("database").long("database").value_name("PATH")),
        )
}

fn config_command() -> Command {
    let section = Arg::new("section").required(true);
    let key = Arg::new("key").required(true);

    Command::new("config")
        .about("Inspect and edit settings")
        .subcommand_required(true)
        .subcommand(Command::new("show").about("Print every setting"))
        .subcommand(Command::new("path").about("Print the settings file location"))
        .subcommand(Command::new("get").arg(section.clone()).arg(key.clone()))
        .subcommand(
            Command::new("set")
                .arg(section)
                .arg(key)
                .arg(Arg::new("value").required(true)),
        )
        .subcommand(
            Command::new("reset")
                .about("Replace the settings file with defaults")
                .arg(Arg::new("yes").long("yes").short('y').action(ArgAction::SetTrue)),
        )
        .subcommand(Command::new("export").arg(Arg::new("file").required(true)))
        .subcommand(Command::new("import").arg(Arg::new("file").required(true)))
}

fn date_arg(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name).long(name).value_name("YYYY-MM-DD").help(help)
}

fn metric_arg() -> Arg {
    Arg::new("metric")
        .long("metric")
        .value_parser(["conductivity", "temperature"])
        .default_value("conductivity")
}
