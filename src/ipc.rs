/// IPC bridge: relays tracker output to the infobox renderer.
///
/// The tracker never draws anything itself. It emits `RenderCommand`s, which
/// this task hands to an `InfoBoxSink`. The shipped sink writes one JSON
/// object per line to stdout for the overlay process to consume.
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::io::Write;
use tokio::sync::mpsc::Receiver;

// ---------------------------------------------------------------------------
// Payload types (serialised as JSON over the IPC boundary)
// ---------------------------------------------------------------------------

/// Colour band of the defence box, derived from the configured threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefenceBand {
    Normal,
    Low,
    Zero,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum RenderCommand {
    ShowDefence {
        value:   i64,
        tooltip: String,
        band:    DefenceBand,
    },
    RemoveDefence,
    ShowVulnerability {
        tooltip: String,
    },
    RemoveVulnerability,
    ShowTrackedWeapon {
        ticks_remaining: u32,
        tooltip:         String,
    },
    RemoveTrackedWeapon,
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Fire-and-forget consumer of render commands.
pub trait InfoBoxSink: Send {
    fn render(&mut self, cmd: &RenderCommand) -> Result<()>;
}

/// Writes each command as a JSON line.
pub struct JsonLineSink<W: Write + Send> {
    out: W,
}

impl<W: Write + Send> JsonLineSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write + Send> InfoBoxSink for JsonLineSink<W> {
    fn render(&mut self, cmd: &RenderCommand) -> Result<()> {
        serde_json::to_writer(&mut self.out, cmd)?;
        self.out.write_all(b"\n")?;
        self.out.flush()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// IPC task
// ---------------------------------------------------------------------------

pub async fn run<S: InfoBoxSink>(mut render_rx: Receiver<RenderCommand>, mut sink: S) -> Result<()> {
    while let Some(cmd) = render_rx.recv().await {
        tracing::trace!("render {:?}", cmd);
        // A broken renderer must not stall the tracker
        if let Err(e) = sink.render(&cmd) {
            tracing::warn!("Render sink error: {}", e);
        }
    }
    Ok(())
}
