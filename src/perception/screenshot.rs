use std::path::Path;

use crate::errors::{PilotError, PilotResult};

/// Screen capture seam. The loop only needs "write the current screen to this
/// path as a raster image"; where the pixels come from is a platform concern.
pub trait ScreenSource {
    fn capture(&mut self, path: &Path) -> PilotResult<()>;
}

/// Captures the primary monitor via xcap and writes it as PNG.
pub struct PrimaryMonitorSource;

impl ScreenSource for PrimaryMonitorSource {
    fn capture(&mut self, path: &Path) -> PilotResult<()> {
        let monitors = xcap::Monitor::all()
            .map_err(|e| PilotError::Perception(format!("monitor enumeration failed: {e}")))?;
        let monitor = monitors
            .iter()
            .find(|m| m.is_primary())
            .or_else(|| monitors.first())
            .ok_or_else(|| PilotError::Perception("no monitor available".into()))?;

        let image = monitor
            .capture_image()
            .map_err(|e| PilotError::Perception(format!("screen capture failed: {e}")))?;
        image.save(path)?;

        tracing::debug!(
            path = %path.display(),
            width = image.width(),
            height = image.height(),
            "screenshot captured"
        );
        Ok(())
    }
}
