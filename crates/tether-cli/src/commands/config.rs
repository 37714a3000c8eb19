//! Config inspection command.

use anyhow::{Context, Result};
use tether_config::ResolvedConfig;

/// Print the resolved configuration, annotated with value sources.
pub(crate) fn show_config(resolved: &ResolvedConfig, section: Option<&str>) -> Result<()> {
    let rendered = resolved.show(section).with_context(|| match section {
        Some(name) => format!("no config section named '{name}'"),
        None => "failed to render configuration".to_owned(),
    })?;
    print!("{rendered}");
    Ok(())
}
