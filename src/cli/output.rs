use anyhow::{anyhow, Result};
use clap::ValueEnum;
use quota_engine::QuotaError;
use serde::Serialize;

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
    Yaml,
}

/// Prints `value` in the requested format; `human` renders the plain text form.
pub fn emit<T: Serialize>(
    format: OutputFormat,
    value: &T,
    human: impl FnOnce(&T) -> String,
) -> Result<()> {
    match format {
        OutputFormat::Human => println!("{}", human(value)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(value)?),
    }
    Ok(())
}

/// Converts an engine error into a CLI error carrying its stable code.
pub fn quota_failure(err: QuotaError) -> anyhow::Error {
    let obj = err.into_inner();
    let view = obj.to_public();
    let detail = obj.message_dev.as_deref().unwrap_or(view.message.as_str());
    match view.result {
        Some(result) => anyhow!("{} [{}] {}", detail, view.code, result),
        None => anyhow!("{} [{}]", detail, view.code),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_message_names_the_code() {
        let err = quota_failure(QuotaError::insufficient("CPU", "acctA", 3));
        let text = err.to_string();
        assert!(text.contains("QUOTA.INSUFFICIENT"), "{text}");
        assert!(text.contains("\"requested\":3"), "{text}");
    }
}
