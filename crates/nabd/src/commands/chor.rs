//! `nabd chor`: choreography files.

use std::path::{Path, PathBuf};

use tabled::Tabled;

use nabd_core::CoreError;
use nabd_core::proto::choreography::Command as ChorCommandRecord;
use nabd_core::proto::{Choreography, Direction, Ear, Led};
use nabd_core::store::snapshot::CHOREOGRAPHY_EXTENSION;

use crate::cli::{ChorArgs, ChorCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

pub const RED_BLINKING: &str = "RedBlinking";

#[derive(Tabled)]
struct CommandRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Wait")]
    wait: u8,
    #[tabled(rename = "Command")]
    command: String,
}

pub async fn handle(args: ChorArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ChorCommand::Inspect { file } => inspect(&file, global).await,
        ChorCommand::RedBlinking { dir } => {
            let path = write(&dir, &red_blinking()).await?;
            output::print_output(&format!("Wrote {}", path.display()), global.quiet);
            Ok(())
        }
    }
}

async fn inspect(file: &Path, global: &GlobalOpts) -> Result<(), CliError> {
    let bytes = tokio::fs::read(file).await?;
    let name = file
        .file_stem()
        .map_or_else(|| "choreography".into(), |s| s.to_string_lossy().into_owned());
    let choreography = Choreography::from_wire(name, &bytes).map_err(CoreError::from)?;

    let commands = choreography.commands();
    let rows: Vec<CommandRow> = commands
        .iter()
        .enumerate()
        .map(|(index, command)| CommandRow {
            index,
            wait: command.wait(),
            command: command.to_string(),
        })
        .collect();

    let summary = format!(
        "{}: {} payload bytes, {} commands",
        choreography.name(),
        choreography.len(),
        rows.len()
    );
    output::print_output(&summary, global.quiet);
    output::print_output(&output::render_table(&rows), global.quiet);

    if let Some(ChorCommandRecord::Unknown { opcode, .. }) = commands.last() {
        tracing::warn!(opcode = %format!("{opcode:#04x}"), "decoding stopped at an unknown record");
    }
    Ok(())
}

async fn write(dir: &Path, choreography: &Choreography) -> Result<PathBuf, CliError> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(format!("{}.{CHOREOGRAPHY_EXTENSION}", choreography.name()));
    let wire = choreography.to_wire().map_err(CoreError::from)?;
    tokio::fs::write(&path, wire).await?;
    Ok(path)
}

/// Ears down, then the belly LEDs blink red at 1 Hz for about 20 seconds.
pub fn red_blinking() -> Choreography {
    let mut chor = Choreography::new(RED_BLINKING);
    chor.tempo(0, 100)
        .ear_move(0, Ear::Left, 10, Direction::Forward)
        .ear_move(0, Ear::Right, 10, Direction::Forward)
        .led_color(0, Led::Left, 255, 0, 0);
    for _ in 0..9 {
        chor.led_color(0, Led::Center, 255, 0, 0)
            .led_color(0, Led::Right, 255, 0, 0)
            .led_color(1, Led::Left, 0, 0, 0)
            .led_color(0, Led::Center, 0, 0, 0)
            .led_color(0, Led::Right, 0, 0, 0)
            .led_color(1, Led::Left, 255, 0, 0);
    }
    chor
}
