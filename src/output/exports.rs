use anyhow::Result;
use log::info;
use serde::Serialize;
use std::io::Write;
use std::path::Path;

/// Writes `value` as JSON to `output`, or to stdout when no path is given.
pub fn write_json<T: Serialize + ?Sized>(value: &T, pretty: bool, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            let mut file = std::fs::File::create(path)?;
            export_json(value, pretty, &mut file)?;
            info!("Output written to: {}", path.display());
        }
        None => export_json(value, pretty, &mut std::io::stdout().lock())?,
    }
    Ok(())
}

fn export_json<T: Serialize + ?Sized>(value: &T, pretty: bool, output: &mut dyn Write) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    writeln!(output, "{json}")?;
    Ok(())
}
