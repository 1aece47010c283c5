//! `nabd plugins`: the built-in plugin catalogue.

use tabled::Tabled;

use nabd_core::{PluginDescriptor, PluginRegistry};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct PluginRow {
    #[tabled(rename = "Name")]
    name: &'static str,
    #[tabled(rename = "Events")]
    events: String,
    #[tabled(rename = "Parameters")]
    parameters: String,
    #[tabled(rename = "Description")]
    summary: &'static str,
}

impl From<&PluginDescriptor> for PluginRow {
    fn from(d: &PluginDescriptor) -> Self {
        let events = d
            .capabilities
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        let parameters = if d.parameters.is_empty() {
            "-".into()
        } else {
            d.parameters.join(", ")
        };
        Self {
            name: d.name,
            events,
            parameters,
            summary: d.summary,
        }
    }
}

pub fn handle(global: &GlobalOpts) -> Result<(), CliError> {
    let registry = PluginRegistry::builtin();
    let rows: Vec<PluginRow> = registry.descriptors().map(PluginRow::from).collect();
    output::print_output(&output::render_table(&rows), global.quiet);
    Ok(())
}
