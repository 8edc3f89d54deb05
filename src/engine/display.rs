//! The display actor and its driver seam.
//!
//! Physical e-ink panels and GUI windows are external collaborators; they
//! implement [`DisplayDriver`]. The engine ships the mock driver only,
//! which records and logs frames, so the whole pipeline runs headless.

use async_trait::async_trait;
use log::{error, info};

use crate::errors::CoreError;
use crate::runtime::mailbox::Actor;
use crate::runtime::messages::{
    ConfigureEvent, DisplayImage, DisplaySettings, Frame, Message,
};
use crate::runtime::router::MessageRouter;
use crate::storage::Document;
use crate::{metrics, storage::SettingsManager};

/// A physical or simulated display backend.
pub trait DisplayDriver: Send {
    /// Bring the panel up; returns its native resolution.
    fn initialize(&mut self, settings: &Document) -> anyhow::Result<(u32, u32)>;
    /// Push one frame.
    fn render(&mut self, frame: &Frame, title: &str) -> anyhow::Result<()>;
    /// Release the panel.
    fn shutdown(&mut self);
}

/// Headless driver: counts frames and logs titles.
pub struct MockDisplay {
    name: String,
    resolution: (u32, u32),
    frames: u64,
}

impl MockDisplay {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            resolution: (800, 480),
            frames: 0,
        }
    }
}

impl DisplayDriver for MockDisplay {
    fn initialize(&mut self, settings: &Document) -> anyhow::Result<(u32, u32)> {
        let width = settings.get("width").and_then(|v| v.as_u64()).unwrap_or(800) as u32;
        let height = settings.get("height").and_then(|v| v.as_u64()).unwrap_or(480) as u32;
        self.resolution = (width, height);
        Ok(self.resolution)
    }

    fn render(&mut self, frame: &Frame, title: &str) -> anyhow::Result<()> {
        self.frames += 1;
        info!(
            "'{}' frame {} '{}' {}x{}",
            self.name, self.frames, title, frame.width, frame.height
        );
        Ok(())
    }

    fn shutdown(&mut self) {
        info!("'{}' shut down after {} frames", self.name, self.frames);
    }
}

/// Actor that owns the driver, applies the display settings to incoming
/// frames and reports the active resolution on the `display-settings`
/// topic.
pub struct Display {
    name: String,
    router: MessageRouter,
    driver: Option<Box<dyn DisplayDriver>>,
    settings: Option<Document>,
    resolution: (u32, u32),
    frames_shown: u64,
}

impl Display {
    pub fn new(name: &str, router: MessageRouter) -> Self {
        Self {
            name: name.to_string(),
            router,
            driver: None,
            settings: None,
            resolution: (800, 480),
            frames_shown: 0,
        }
    }

    fn configure(&mut self, msg: &ConfigureEvent) -> anyhow::Result<String> {
        let settings_manager: SettingsManager = msg.manager.settings_manager();
        let object = settings_manager.open("display")?;
        let (_, content) = object.get()?;
        let settings = content.ok_or_else(|| {
            CoreError::NotFound("display settings document".to_string())
        })?;
        let display_type = settings
            .get("display_type")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        let mut driver: Box<dyn DisplayDriver> = match display_type.as_str() {
            "mock" => Box::new(MockDisplay::new(&self.name)),
            other => {
                return Err(CoreError::Unavailable(format!(
                    "display type '{other}'"
                ))
                .into());
            }
        };
        self.resolution = driver.initialize(&settings)?;
        info!(
            "loading display {display_type} {}x{}",
            self.resolution.0, self.resolution.1
        );
        self.driver = Some(driver);
        self.settings = Some(settings);
        Ok(display_type)
    }

    fn show(&mut self, msg: DisplayImage) {
        self.frames_shown += 1;
        info!("display {} '{}'", self.frames_shown, msg.title);
        let Some(driver) = self.driver.as_mut() else {
            error!("no driver is loaded");
            return;
        };
        let mut frame = msg.frame;
        if let Some(settings) = &self.settings {
            if settings
                .get("rotate180")
                .and_then(|v| v.as_bool())
                .unwrap_or(false)
            {
                frame.rotate_180();
            }
        }
        if (frame.width, frame.height) != self.resolution {
            log::warn!(
                "frame {}x{} does not match display {}x{}",
                frame.width,
                frame.height,
                self.resolution.0,
                self.resolution.1
            );
        }
        metrics::inc_frames_displayed();
        if let Err(err) = driver.render(&frame, &msg.title) {
            error!("driver render failed: {err:#}");
        }
    }
}

#[async_trait]
impl Actor for Display {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&mut self, msg: Message) -> anyhow::Result<()> {
        match msg {
            Message::Configure(configure) => {
                match self.configure(&configure) {
                    Ok(display_type) => {
                        configure.notify(false, None);
                        self.router.send(
                            "display-settings",
                            Message::DisplaySettings(DisplaySettings {
                                name: display_type,
                                width: self.resolution.0,
                                height: self.resolution.1,
                                timestamp: configure.timestamp,
                            }),
                        );
                    }
                    Err(err) => {
                        error!("configure.unhandled: {err:#}");
                        configure.notify(true, Some(format!("{err:#}")));
                    }
                }
                Ok(())
            }
            Message::DisplayImage(image) => {
                self.show(image);
                Ok(())
            }
            other => {
                log::warn!("'{}' no handler for {}", self.name, other.kind());
                Ok(())
            }
        }
    }

    async fn on_quit(&mut self) {
        if let Some(mut driver) = self.driver.take() {
            driver.shutdown();
        }
    }
}
