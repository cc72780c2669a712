use chrono::{Local, NaiveDate};
use clap::ArgMatches;
use log::info;
use std::path::{Path, PathBuf};

use crate::analysis::{
    compare_days, detect_anomalies, similar_days, summarize, threshold_exceedances, AnomalyMethod, Metric,
    SimilarityMethod,
};
use crate::config::config_commands::handle_config_commands;
use crate::config::Settings;
use crate::devices::mock::MockMeter;
use crate::devices::reading::{parse_date, DATE_FORMAT, TIMESTAMP_FORMAT};
use crate::devices::registry::{adapter_for, available_models, is_known_model};
use crate::output::{formatter_for, render_reading_chart, ReadingFormatter};
use crate::serial::{available_ports, probe};
use crate::services::{check_permissions, test_file_write, DataService, LiveBuffer};
use crate::storage::{export, CsvLogger, ExportFormat, History};
use crate::utils::error::CondensateError;

const CHART_WIDTH: usize = 72;

/// Applies command-line overrides on top of the loaded settings. Nothing is saved.
/// Values go through the same validation as `config set`.
pub fn apply_overrides(matches: &ArgMatches, settings: &mut Settings) -> Result<(), CondensateError> {
    if matches.get_flag("mock") {
        settings.device.mock_data = true;
    }
    if let Some(port) = matches.get_one::<String>("port") {
        settings.set("serial", "port", port)?;
    }
    if let Some(baud) = matches.get_one::<u32>("baud") {
        settings.set("serial", "baud_rate", &baud.to_string())?;
    }
    if let Some(model) = matches.get_one::<String>("model") {
        settings.set("device", "model", model)?;
    }
    if let Some(dir) = matches.get_one::<String>("log-dir") {
        settings.set("logging", "log_dir", dir)?;
    }
    Ok(())
}

/// Runs every subcommand except `run`. Returns `Ok(false)` when the caller
/// should start continuous acquisition instead.
pub async fn handle_subcommands(
    matches: &ArgMatches,
    settings: &Settings,
    settings_path: &Path,
) -> Result<bool, CondensateError> {
    let formatter = output_formatter(matches, settings)?;

    match matches.subcommand() {
        None | Some(("run", _)) => Ok(false),
        Some(("config", sub)) => handle_config_commands(sub, settings_path),
        Some(("read", _)) => handle_read_command(matches, settings).await,
        Some(("ports", sub)) => handle_ports_command(sub, settings),
        Some(("models", _)) => handle_models_command(settings),
        Some(("history", sub)) => handle_history_command(sub, settings, formatter.as_ref()),
        Some(("stats", sub)) => handle_stats_command(sub, settings, formatter.as_ref()),
        Some(("compare", sub)) => handle_compare_command(sub, settings, formatter.as_ref()),
        Some(("export", sub)) => handle_export_command(sub, settings),
        Some(("check-permissions", _)) => {
            println!("{}", check_permissions(settings)?.render());
            Ok(true)
        }
        Some(("test-write", sub)) => {
            let dir = sub
                .get_one::<String>("dir")
                .map(PathBuf::from)
                .unwrap_or_else(|| settings.logging.log_dir.clone());
            test_file_write(&dir)?;
            println!("✅ Test write succeeded in {}", dir.display());
            Ok(true)
        }
        Some(("generate-mock", sub)) => handle_generate_mock_command(sub, settings),
        #[cfg(feature = "sqlite")]
        Some(("migrate", sub)) => handle_migrate_command(sub, settings).await,
        #[cfg(not(feature = "sqlite"))]
        Some(("migrate", _)) => Err(CondensateError::ServiceNotAvailable(
            "built without the sqlite feature".to_string(),
        )),
        Some((other, _)) => Err(CondensateError::ServiceNotAvailable(format!("Unknown command: {}", other))),
    }
}

fn output_formatter(matches: &ArgMatches, settings: &Settings) -> Result<Box<dyn ReadingFormatter>, CondensateError> {
    let name = matches.get_one::<String>("format").map(String::as_str).unwrap_or("console");
    formatter_for(name, settings.display.threshold)
}

async fn handle_read_command(matches: &ArgMatches, settings: &Settings) -> Result<bool, CondensateError> {
    info!("📖 Taking a single reading...");
    let mut service = DataService::new(settings.clone()).await?;
    service.set_formatter(output_formatter(matches, settings)?);

    match service.read_once().await? {
        Some(_) => Ok(true),
        None => Err(CondensateError::SerialError(format!(
            "No reading received from {} on {}",
            settings.device.model, settings.serial.port
        ))),
    }
}

fn handle_ports_command(matches: &ArgMatches, settings: &Settings) -> Result<bool, CondensateError> {
    let ports = available_ports()?;
    if ports.is_empty() {
        println!("❌ No serial ports found");
        return Ok(true);
    }

    println!("🔌 Serial ports ({}):", ports.len());
    for port in ports {
        let mut line = format!("   {} [{}]", port.name, port.kind);
        if let Some(product) = &port.product {
            line.push_str(&format!(" {}", product));
        }
        if let Some(manufacturer) = &port.manufacturer {
            line.push_str(&format!(" ({})", manufacturer));
        }
        if matches.get_flag("probe") {
            let ok = probe(&port.name, settings.serial.baud_rate);
            line.push_str(if ok { " ✅ opens" } else { " ❌ busy or inaccessible" });
        }
        if port.name == settings.serial.port {
            line.push_str(" ← configured");
        }
        println!("{}", line);
    }
    Ok(true)
}

fn handle_models_command(settings: &Settings) -> Result<bool, CondensateError> {
    println!("📟 Supported meter models:");
    for model in available_models() {
        let marker = if model == settings.device.model { "▶" } else { " " };
        println!(" {} {:<18} {}", marker, model, adapter_for(model).description());
    }
    if !is_known_model(&settings.device.model) {
        println!("⚠️  Configured model '{}' is unknown", settings.device.model);
    }
    Ok(true)
}

fn handle_history_command(
    matches: &ArgMatches,
    settings: &Settings,
    formatter: &dyn ReadingFormatter,
) -> Result<bool, CondensateError> {
    let history = History::from_settings(&settings.logging, settings.device.mock_data)?;

    match matches.subcommand() {
        Some(("dates", _)) => {
            let dates = history.available_dates()?;
            if dates.is_empty() {
                println!("📭 No logged readings yet");
            }
            for date in dates {
                println!("{}", date.format(DATE_FORMAT));
            }
            Ok(true)
        }
        Some(("show", sub)) => {
            let date = date_or_today(sub, "date")?;
            let day = history.for_date(date)?;
            let mut buffer = LiveBuffer::new(day.len());
            buffer.extend(day);
            let readings = buffer.filtered(
                sub.get_one::<f64>("min").copied(),
                sub.get_one::<f64>("max").copied(),
            );

            if readings.is_empty() {
                println!("📭 No readings for {}", date.format(DATE_FORMAT));
                return Ok(true);
            }
            if sub.get_flag("chart") {
                println!(
                    "{}",
                    render_reading_chart(
                        &readings,
                        CHART_WIDTH,
                        settings.display.threshold,
                        settings.display.show_grid
                    )
                );
            } else {
                let header = formatter.format_header();
                if !header.is_empty() {
                    println!("{}", header);
                }
                println!("{}", formatter.format_readings(&readings));
            }
            Ok(true)
        }
        _ => Ok(false),
    }
}

fn handle_stats_command(
    matches: &ArgMatches,
    settings: &Settings,
    formatter: &dyn ReadingFormatter,
) -> Result<bool, CondensateError> {
    let date = date_or_today(matches, "date")?;
    let metric = parse_choice::<Metric>(matches, "metric")?;
    let method = parse_choice::<AnomalyMethod>(matches, "anomaly-method")?;

    let history = History::from_settings(&settings.logging, settings.device.mock_data)?;
    let readings = history.for_date(date)?;
    let Some(summary) = summarize(date, &readings, metric) else {
        println!("📭 No {:?} data for {}", metric, date.format(DATE_FORMAT));
        return Ok(true);
    };

    let label = format!("{} {:?} ({})", date.format(DATE_FORMAT), metric, metric.unit_label());
    println!("{}", formatter.format_statistics(&label, &summary.statistics));

    let trend = &summary.trend;
    println!(
        "📈 Trend: {} (slope {:.4}/h, r² {:.3}, p {:.4})",
        trend.direction,
        trend.slope * 3600.0,
        trend.r_squared,
        trend.p_value
    );

    let (timestamps, values) = metric.series(&readings);
    let anomalies = detect_anomalies(&values, method);
    println!("🔎 Anomalies ({:?}): {}", method, anomalies.len());
    for index in anomalies {
        println!("   {} {:.2}", timestamps[index].format(TIMESTAMP_FORMAT), values[index]);
    }

    let over = threshold_exceedances(&readings, settings.display.threshold);
    println!("⚠️  Above {:.1} uS/cm: {}", settings.display.threshold, over.len());
    Ok(true)
}

fn handle_compare_command(
    matches: &ArgMatches,
    settings: &Settings,
    formatter: &dyn ReadingFormatter,
) -> Result<bool, CondensateError> {
    let metric = parse_choice::<Metric>(matches, "metric")?;
    let history = History::from_settings(&settings.logging, settings.device.mock_data)?;

    if let Some(target) = matches.get_one::<String>("similar") {
        let target = parse_date(target)?;
        let method = parse_choice::<SimilarityMethod>(matches, "method")?;
        let top = matches.get_one::<usize>("top").copied().unwrap_or(5);

        let ranked = similar_days(&history, target, metric, method, top)?;
        if ranked.is_empty() {
            println!("📭 Nothing to compare {} with", target.format(DATE_FORMAT));
            return Ok(true);
        }
        println!("🔗 Days most similar to {} ({:?}):", target.format(DATE_FORMAT), method);
        for (date, score) in ranked {
            println!("   {}  {:.3}", date.format(DATE_FORMAT), score);
        }
        return Ok(true);
    }

    let dates = matches
        .get_many::<String>("dates")
        .map(|values| values.map(|d| parse_date(d)).collect::<Result<Vec<_>, _>>())
        .transpose()?
        .unwrap_or_default();
    if dates.is_empty() {
        return Err(CondensateError::ParseError(
            "Give at least one date to compare, or --similar <date>".to_string(),
        ));
    }

    let summaries = compare_days(&history, &dates, metric)?;
    for summary in &summaries {
        let label = format!("{} {:?} ({})", summary.date.format(DATE_FORMAT), metric, metric.unit_label());
        println!("{}", formatter.format_statistics(&label, &summary.statistics));
        println!("📈 Trend: {}\n", summary.trend.direction);
    }
    for date in dates.iter().filter(|d| !summaries.iter().any(|s| s.date == **d)) {
        println!("📭 No data for {}", date.format(DATE_FORMAT));
    }
    Ok(true)
}

fn handle_export_command(matches: &ArgMatches, settings: &Settings) -> Result<bool, CondensateError> {
    let output = matches
        .get_one::<String>("output")
        .map(PathBuf::from)
        .ok_or_else(|| CondensateError::ParseError("--output is required".to_string()))?;

    let history = History::from_settings(&settings.logging, settings.device.mock_data)?;
    let dates = history.available_dates()?;
    let (Some(first), Some(last)) = (dates.first().copied(), dates.last().copied()) else {
        println!("📭 No logged readings to export");
        return Ok(true);
    };

    let from = optional_date(matches, "from")?.unwrap_or(first);
    let to = optional_date(matches, "to")?.unwrap_or(last);
    let readings = history.for_range(from, to)?;
    let count = export(&readings, &output, ExportFormat::from_path(&output))?;

    println!("✅ Exported {} readings to {}", count, output.display());
    Ok(true)
}

fn handle_generate_mock_command(matches: &ArgMatches, settings: &Settings) -> Result<bool, CondensateError> {
    let days = matches.get_one::<u32>("days").copied().unwrap_or(7);
    let mock = match matches.get_one::<u64>("seed") {
        Some(seed) => MockMeter::with_seed(*seed),
        None => MockMeter::new(),
    };

    let readings = mock.generate_history(days)?;
    let written = CsvLogger::from_settings(&settings.logging).write_all(&readings)?;
    println!("🧪 Wrote {} mock readings covering {} days", written, days);
    Ok(true)
}

#[cfg(feature = "sqlite")]
async fn handle_migrate_command(matches: &ArgMatches, settings: &Settings) -> Result<bool, CondensateError> {
    let path = matches
        .get_one::<String>("database")
        .map(PathBuf::from)
        .unwrap_or_else(|| settings.storage.database_path.clone());

    let manager = crate::storage::SqliteManager::new(&path).await?;
    let history = History::from_settings(&settings.logging, settings.device.mock_data)?;
    let imported = manager.import_history(&history).await?;
    let stats = manager.stats().await?;
    manager.close().await;

    println!("🗄️  Imported {} new readings into {}", imported, path.display());
    println!("   Total readings: {}", stats.total_readings);
    Ok(true)
}

fn parse_choice<T>(matches: &ArgMatches, name: &str) -> Result<T, CondensateError>
where
    T: std::str::FromStr<Err = CondensateError>,
{
    matches
        .get_one::<String>(name)
        .ok_or_else(|| CondensateError::ParseError(format!("Missing --{}", name)))?
        .parse()
}

fn optional_date(matches: &ArgMatches, name: &str) -> Result<Option<NaiveDate>, CondensateError> {
    matches.get_one::<String>(name).map(|d| parse_date(d)).transpose()
}

fn date_or_today(matches: &ArgMatches, name: &str) -> Result<NaiveDate, CondensateError> {
    Ok(optional_date(matches, name)?.unwrap_or_else(|| Local::now().date_naive()))
}
