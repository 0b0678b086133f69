use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::commands::{load_config, runtime, CommandResult};
use echelon_core::config::LoadOptions;
use echelon_core::domain::conversation::SenderId;
use echelon_core::domain::employee::{EmployeeId, EmployeeRecord};
use echelon_db::repositories::{EmployeeRepository, SqlEmployeeRepository};
use echelon_db::{connect_from_config, migrations};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DirectoryFile {
    #[serde(default, rename = "employee")]
    employees: Vec<DirectoryEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DirectoryEntry {
    id: String,
    first_name: String,
    surname: String,
    /// Full number in any notation; only the digits are kept.
    whatsapp: String,
    #[serde(default)]
    leave_approver: String,
    leave_days_balance: Option<Decimal>,
}

/// Parses a directory file into records keyed by the last `suffix_len` digits.
pub fn parse_directory(raw: &str, suffix_len: usize) -> Result<Vec<EmployeeRecord>> {
    let file: DirectoryFile = toml::from_str(raw).context("employee directory is not valid TOML")?;

    let mut records: Vec<EmployeeRecord> = Vec::with_capacity(file.employees.len());
    for entry in file.employees {
        let digits = entry.whatsapp.chars().filter(char::is_ascii_digit).collect::<String>();
        if digits.is_empty() {
            bail!("employee `{}` has no digits in whatsapp number `{}`", entry.id, entry.whatsapp);
        }
        if entry.id.trim().is_empty() {
            bail!("employee with whatsapp number `{}` has an empty id", entry.whatsapp);
        }

        let whatsapp_suffix = SenderId::new(digits).suffix(suffix_len).to_owned();
        let clash = records.iter().find(|record| record.whatsapp_suffix == whatsapp_suffix);
        if let Some(clash) = clash {
            bail!(
                "employees `{}` and `{}` share whatsapp key `{whatsapp_suffix}`",
                clash.id.0,
                entry.id
            );
        }

        records.push(EmployeeRecord {
            id: EmployeeId(entry.id.trim().to_owned()),
            first_name: entry.first_name,
            surname: entry.surname,
            whatsapp_suffix,
            leave_approver_name: entry.leave_approver,
            leave_days_balance: entry.leave_days_balance,
        });
    }

    Ok(records)
}

pub fn run(options: LoadOptions, path: &Path) -> CommandResult {
    let config = match load_config("seed", options) {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let records = match fs::read_to_string(path)
        .with_context(|| format!("could not read `{}`", path.display()))
        .and_then(|raw| parse_directory(&raw, config.lookup.sender_suffix_len))
    {
        Ok(records) => records,
        Err(error) => {
            return CommandResult::failure("seed", "directory_file", format!("{error:#}"), 6);
        }
    };

    let runtime = match runtime("seed") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = connect_from_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let repository = SqlEmployeeRepository::new(pool.clone());
        let total = match repository.save_all(&records).await {
            Ok(()) => repository
                .count()
                .await
                .map_err(|error| ("seed_verification", error.to_string(), 6u8)),
            Err(error) => Err((
                "seed_execution",
                format!("directory not loaded, no employees were changed: {error}"),
                6u8,
            )),
        };

        pool.close().await;
        total
    });

    match result {
        Ok(total) => CommandResult::success(
            "seed",
            format!("loaded {} employees ({total} on record)", records.len()),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}
