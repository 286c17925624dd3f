// The display side of the monitor: the single context that drains every panel
// of the `PanelBus`, writes annotated frames to per-panel videos and, when
// asked, shows them in OpenCV windows.

use crate::capture::rgb_image_to_mat;
use crate::config::OutputConfig;
use anyhow::{Context, Result};
use lanewatch::{AnnotatedFrame, PanelBus, PanelReceiver};
use opencv::{
    core::Size,
    highgui,
    prelude::*,
    videoio::VideoWriter,
};
use std::fs;
use std::path::Path;
use tracing::info;

struct Panel {
    receiver: PanelReceiver,
    writer: Option<VideoWriter>,
    frames_shown: u64,
}

pub struct PanelDisplay {
    panels: Vec<Panel>,
    output: OutputConfig,
}

impl PanelDisplay {
    pub fn new(bus: &PanelBus, output: &OutputConfig) -> Result<Self> {
        if let Some(dir) = &output.dir {
            fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        let panels = (0..bus.panel_count())
            .filter_map(|i| bus.subscribe(i))
            .map(|receiver| Panel {
                receiver,
                writer: None,
                frames_shown: 0,
            })
            .collect();
        Ok(Self {
            panels,
            output: output.clone(),
        })
    }

    /// Presents the newest frame of every panel that changed since the last call.
    pub fn render(&mut self) -> Result<()> {
        let mut shown_any = false;
        for panel in &mut self.panels {
            let Some(frame) = panel.receiver.take_latest() else {
                continue;
            };
            present(panel, &frame, &self.output)?;
            shown_any = true;
        }
        if shown_any && self.output.show_windows {
            highgui::wait_key(1)?;
        }
        Ok(())
    }

    pub fn frames_shown(&self) -> Vec<u64> {
        self.panels.iter().map(|p| p.frames_shown).collect()
    }
}

fn present(panel: &mut Panel, frame: &AnnotatedFrame, output: &OutputConfig) -> Result<()> {
    let mat = rgb_image_to_mat(&frame.image)?;

    if let Some(dir) = &output.dir {
        if panel.writer.is_none() {
            let path = dir.join(format!("panel_{}.mp4", frame.panel + 1));
            panel.writer = Some(open_writer(&path, &frame.image, output.fps)?);
        }
        if let Some(writer) = panel.writer.as_mut() {
            writer.write(&mat)?;
        }
    }

    if output.show_windows {
        highgui::imshow(&format!("Lane {}", frame.panel + 1), &mat)?;
    }

    panel.frames_shown += 1;
    Ok(())
}

fn open_writer(path: &Path, image: &lanewatch::Frame, fps: f64) -> Result<VideoWriter> {
    info!("Output video: {}", path.display());
    let fourcc = VideoWriter::fourcc('m', 'p', '4', 'v')?;
    let writer = VideoWriter::new(
        path.to_str().context("Output path is not valid UTF-8")?,
        fourcc,
        fps,
        Size::new(image.width() as i32, image.height() as i32),
        true,
    )?;
    Ok(writer)
}
