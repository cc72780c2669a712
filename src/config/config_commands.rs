use clap::ArgMatches;
use std::path::{Path, PathBuf};

use crate::config::settings::{Settings, SETTING_KEYS};
use crate::devices::registry::is_known_model;
use crate::utils::error::CondensateError;

/// Dispatches `config <subcommand>`. Returns `Ok(false)` when no subcommand matched.
pub fn handle_config_commands(matches: &ArgMatches, settings_path: &Path) -> Result<bool, CondensateError> {
    match matches.subcommand() {
        Some(("show", _)) => handle_show_command(settings_path),
        Some(("path", _)) => {
            println!("{}", settings_path.display());
            Ok(true)
        }
        Some(("get", sub)) => handle_get_command(sub, settings_path),
        Some(("set", sub)) => handle_set_command(sub, settings_path),
        Some(("reset", sub)) => handle_reset_command(sub, settings_path),
        Some(("export", sub)) => handle_export_command(sub, settings_path),
        Some(("import", sub)) => handle_import_command(sub, settings_path),
        _ => Ok(false),
    }
}

fn handle_show_command(settings_path: &Path) -> Result<bool, CondensateError> {
    let settings = Settings::load_or_create(settings_path)?;

    println!("📋 Condensate Settings");
    println!("═══════════════════════════════════════");
    println!("📁 File: {}", settings_path.display());

    let mut current_section = "";
    for (section, key) in SETTING_KEYS {
        if *section != current_section {
            println!("\n[{}]", section);
            current_section = section;
        }
        let value = settings.get(section, key).unwrap_or_default();
        println!("   {} = {}", key, value);
    }

    if !is_known_model(&settings.device.model) {
        println!("\n⚠️  Unknown model '{}': the HACH Sension7 adapter will be used", settings.device.model);
    }
    Ok(true)
}

fn handle_get_command(matches: &ArgMatches, settings_path: &Path) -> Result<bool, CondensateError> {
    let (section, key) = section_and_key(matches)?;
    let settings = Settings::load_or_create(settings_path)?;

    match settings.get(section, key) {
        Some(value) => println!("{}", value),
        None => {
            return Err(CondensateError::UnknownSetting {
                section: section.to_string(),
                key: key.to_string(),
            })
        }
    }
    Ok(true)
}

fn handle_set_command(matches: &ArgMatches, settings_path: &Path) -> Result<bool, CondensateError> {
    let (section, key) = section_and_key(matches)?;
    let value = required(matches, "value")?;

    let mut settings = Settings::load_or_create(settings_path)?;
    settings.set(section, key, value)?;
    settings.save(settings_path)?;

    println!("✅ Configuration updated: [{}] {} = {}", section, key, value);
    if section == "device" && key == "model" && !is_known_model(value) {
        println!("⚠️  Unknown model: the HACH Sension7 adapter will be used");
    }
    Ok(true)
}

fn handle_reset_command(matches: &ArgMatches, settings_path: &Path) -> Result<bool, CondensateError> {
    if !matches.get_flag("yes") {
        println!("⚠️  This will replace {} with defaults. Continue? (yes/no)", settings_path.display());
        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;
        if input.trim().to_lowercase() != "yes" {
            println!("❌ Operation cancelled");
            return Ok(true);
        }
    }

    let dir = settings_path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
    Settings::defaults_in(&dir).save(settings_path)?;
    println!("✅ Settings reset to defaults");
    Ok(true)
}

fn handle_export_command(matches: &ArgMatches, settings_path: &Path) -> Result<bool, CondensateError> {
    let target = PathBuf::from(required(matches, "file")?);
    Settings::load_or_create(settings_path)?.export_json(&target)?;
    println!("✅ Settings exported to {}", target.display());
    Ok(true)
}

fn handle_import_command(matches: &ArgMatches, settings_path: &Path) -> Result<bool, CondensateError> {
    let source = PathBuf::from(required(matches, "file")?);
    let mut settings = Settings::load_or_create(settings_path)?;
    settings.import_json(&source)?;
    settings.save(settings_path)?;
    println!("✅ Settings imported from {}", source.display());
    Ok(true)
}

fn section_and_key(matches: &ArgMatches) -> Result<(&str, &str), CondensateError> {
    Ok((required(matches, "section")?, required(matches, "key")?))
}

fn required<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a str, CondensateError> {
    matches
        .get_one::<String>(name)
        .map(String::as_str)
        .ok_or_else(|| CondensateError::SettingsError(format!("Missing argument: {}", name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::build_cli;
    use tempfile::tempdir;

    fn config(args: &[&str]) -> ArgMatches {
        let matches = build_cli()
            .try_get_matches_from(["condensate", "config"].iter().chain(args))
            .unwrap();
        matches.subcommand_matches("config").unwrap().clone()
    }

    #[test]
    fn show_and_path_create_defaults_on_first_use() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.ini");

        assert!(handle_config_commands(&config(&["path"]), &path).unwrap());
        assert!(!path.exists());
        assert!(handle_config_commands(&config(&["show"]), &path).unwrap());
        assert_eq!(Settings::load(&path).unwrap(), Settings::defaults_in(dir.path()));
    }

    #[test]
    fn set_persists_and_get_reads_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.ini");

        assert!(handle_config_commands(&config(&["set", "serial", "baud_rate", "19200"]), &path).unwrap());
        assert!(handle_config_commands(&config(&["get", "serial", "baud_rate"]), &path).unwrap());
        assert_eq!(Settings::load(&path).unwrap().serial.baud_rate, 19200);
    }

    #[test]
    fn set_rejects_unknown_keys_and_bad_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.ini");

        assert!(matches!(
            handle_config_commands(&config(&["set", "serial", "parity", "none"]), &path),
            Err(CondensateError::UnknownSetting { .. })
        ));
        assert!(matches!(
            handle_config_commands(&config(&["set", "device", "mock_interval", "1e-12"]), &path),
            Err(CondensateError::InvalidSettingValue { .. })
        ));
        assert!(matches!(
            handle_config_commands(&config(&["get", "serial", "parity"]), &path),
            Err(CondensateError::UnknownSetting { .. })
        ));
        assert_eq!(Settings::load(&path).unwrap(), Settings::defaults_in(dir.path()));
    }

    #[test]
    fn reset_with_yes_restores_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.ini");
        handle_config_commands(&config(&["set", "display", "threshold", "750"]), &path).unwrap();

        assert!(handle_config_commands(&config(&["reset", "--yes"]), &path).unwrap());
        assert_eq!(Settings::load(&path).unwrap().display.threshold, 500.0);
    }

    #[test]
    fn export_writes_every_section() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.ini");
        let target = dir.path().join("out").join("settings.json");

        assert!(handle_config_commands(&config(&["export", target.to_str().unwrap()]), &path).unwrap());
        let doc: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&target).unwrap()).unwrap();
        for section in ["serial", "logging", "display", "device", "api", "websocket", "storage"] {
            assert!(doc.get(section).is_some(), "missing [{}]", section);
        }
    }

    #[test]
    fn import_is_all_or_nothing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.ini");
        let source = dir.path().join("import.json");

        std::fs::write(&source, r#"{"serial": {"baud_rate": 4800}, "device": {"mock_interval": 0}}"#).unwrap();
        assert!(handle_config_commands(&config(&["import", source.to_str().unwrap()]), &path).is_err());
        assert_eq!(Settings::load_or_create(&path).unwrap().serial.baud_rate, 9600);

        std::fs::write(&source, r#"{"serial": {"baud_rate": 4800}, "device": {"mock_interval": 30}}"#).unwrap();
        assert!(handle_config_commands(&config(&["import", source.to_str().unwrap()]), &path).unwrap());
        let saved = Settings::load(&path).unwrap();
        assert_eq!(saved.serial.baud_rate, 4800);
        assert_eq!(saved.device.mock_interval, 30.0);
    }
}
