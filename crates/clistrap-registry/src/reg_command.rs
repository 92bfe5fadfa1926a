use std::process::Command;

use anyhow::{anyhow, Context, Result};
use tracing::debug;

use crate::model::{parse_numeric_data, ConfigValue, KeyPath, KeyState, ValueName, ValueType};
use crate::store::ConfigStore;

const REG_PROGRAM: &str = "reg";
const MISSING_KEY_MARKER: &str = "unable to find";
const VALUE_NOT_SET: &str = "(value not set)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

pub type RegExecutor = Box<dyn Fn(&mut Command) -> Result<CommandOutput>>;

/// Windows registry adapter driving `reg.exe`.
pub struct RegCommandStore {
    executor: RegExecutor,
}

impl RegCommandStore {
    pub fn new() -> Self {
        Self::with_executor(Box::new(run_reg_command))
    }

    pub fn with_executor(executor: RegExecutor) -> Self {
        Self { executor }
    }

    fn run(&self, command: &mut Command, context_message: &str) -> Result<String> {
        let output = (self.executor)(command)?;
        if output.success {
            return Ok(output.stdout);
        }
        Err(anyhow!(
            "{context_message}: stdout='{}' stderr='{}'",
            output.stdout.trim(),
            output.stderr.trim()
        ))
    }
}

impl Default for RegCommandStore {
    fn default() -> Self {
        Self::new()
    }
}

pub fn run_reg_command(command: &mut Command) -> Result<CommandOutput> {
    let output = command.output().context("failed to start reg.exe")?;
    Ok(CommandOutput {
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

pub fn build_query_command(path: &KeyPath) -> Command {
    let mut command = Command::new(REG_PROGRAM);
    command.arg("query").arg(path.as_str());
    command
}

pub fn build_create_key_command(path: &KeyPath) -> Command {
    let mut command = Command::new(REG_PROGRAM);
    command.arg("add").arg(path.as_str()).arg("/f");
    command
}

/// `reg add` for one value; the unnamed value is addressed with `/ve`.
pub fn build_put_value_command(path: &KeyPath, value: &ConfigValue) -> Command {
    let mut command = Command::new(REG_PROGRAM);
    command.arg("add").arg(path.as_str());
    match &value.name {
        ValueName::Default => {
            command.arg("/ve");
        }
        ValueName::Named(name) => {
            command.arg("/v").arg(name);
        }
    }
    command
        .arg("/t")
        .arg(value.value_type.native_tag())
        .arg("/d")
        .arg(&value.data)
        .arg("/f");
    command
}

pub fn build_delete_key_command(path: &KeyPath) -> Command {
    let mut command = Command::new(REG_PROGRAM);
    command.arg("delete").arg(path.as_str()).arg("/f");
    command
}

pub fn build_delete_value_command(path: &KeyPath, name: &ValueName) -> Command {
    let mut command = Command::new(REG_PROGRAM);
    command.arg("delete").arg(path.as_str());
    match name {
        ValueName::Default => {
            command.arg("/ve");
        }
        ValueName::Named(name) => {
            command.arg("/v").arg(name);
        }
    }
    command.arg("/f");
    command
}

/// Parses the values of the first key block printed by `reg query <key>`.
/// Value lines are indented and look like `    <name>    <REG_TYPE>    <data>`;
/// `(Default)` is the unnamed value. `reg` prints numeric data as hex; it is
/// reported in decimal, the form values are written with.
pub fn parse_query_output(output: &str) -> Result<Vec<ConfigValue>> {
    let mut values = Vec::new();
    let mut seen_header = false;
    for line in output.lines() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            if seen_header && !values.is_empty() {
                break;
            }
            continue;
        }
        if !line.starts_with(' ') {
            if seen_header {
                break;
            }
            seen_header = true;
            continue;
        }
        let Some(type_start) = line.find("    REG_") else {
            continue;
        };
        let name = line[..type_start].trim();
        let rest = &line[type_start + 4..];
        let (type_tag, data) = match rest.find("    ") {
            Some(split) => (&rest[..split], &rest[split + 4..]),
            None => (rest.trim_end(), ""),
        };
        let value_type = ValueType::parse_native(type_tag)?;
        if name == "(Default)" {
            if data == VALUE_NOT_SET {
                continue;
            }
            values.push(ConfigValue::default_value(data));
        } else if value_type.is_numeric() {
            let data = parse_numeric_data(data)
                .map(|number| number.to_string())
                .unwrap_or_else(|| data.to_string());
            values.push(ConfigValue::named(name, data, value_type));
        } else {
            values.push(ConfigValue::named(name, data, value_type));
        }
    }
    Ok(values)
}

impl ConfigStore for RegCommandStore {
    fn list_key(&self, path: &KeyPath) -> Result<KeyState> {
        let output = (self.executor)(&mut build_query_command(path))?;
        if !output.success {
            if output.stderr.to_ascii_lowercase().contains(MISSING_KEY_MARKER) {
                return Ok(KeyState::missing(path.clone()));
            }
            return Err(anyhow!(
                "failed to query registry key {path}: {}",
                output.stderr.trim()
            ));
        }
        let values = parse_query_output(&output.stdout)
            .with_context(|| format!("failed to parse registry listing of {path}"))?;
        Ok(KeyState {
            path: path.clone(),
            exists: true,
            values,
        })
    }

    fn create_key(&mut self, path: &KeyPath) -> Result<()> {
        debug!(key = %path, "creating registry key");
        self.run(
            &mut build_create_key_command(path),
            &format!("failed to create registry key {path}"),
        )
        .map(|_| ())
    }

    fn put_values(&mut self, path: &KeyPath, values: &[ConfigValue]) -> Result<()> {
        for value in values {
            debug!(key = %path, value = %value.name, "writing registry value");
            self.run(
                &mut build_put_value_command(path, value),
                &format!("failed to write registry value {} in {path}", value.name),
            )?;
        }
        Ok(())
    }

    fn delete_key(&mut self, path: &KeyPath) -> Result<()> {
        self.run(
            &mut build_delete_key_command(path),
            &format!("failed to delete registry key {path}"),
        )
        .map(|_| ())
    }

    fn delete_value(&mut self, path: &KeyPath, name: &ValueName) -> Result<()> {
        self.run(
            &mut build_delete_value_command(path, name),
            &format!("failed to delete registry value {name} in {path}"),
        )
        .map(|_| ())
    }
}
