//! The window system the host peer runs in.
//!
//! Browsers hand popups out synchronously, so [`WindowSystem`] is a blocking trait. Everything
//! a popup reports afterwards (load, unload, posted messages) arrives on the event stream
//! returned with it.

use std::{fmt, sync::Arc};

use serde_json::Value;
use tokio::sync::mpsc::UnboundedReceiver;
use url::Url;

/// Size of the screen popups are centered on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScreenMetrics {
    pub width: u32,
    pub height: u32,
}

/// Geometry of a popup, rendered as a `window.open` feature string.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowFeatures {
    pub width: u32,
    pub height: u32,
    pub top: u32,
    pub left: u32,
}

impl WindowFeatures {
    /// A `width` x `height` window centered on `screen`, clamped to its top-left corner.
    pub fn centered(screen: ScreenMetrics, width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            top: screen.height.saturating_sub(height) / 2,
            left: screen.width.saturating_sub(width) / 2,
        }
    }
}

impl fmt::Display for WindowFeatures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "height={},width={},top={},left={}", self.height, self.width, self.top, self.left)
    }
}

/// Something a popup reports back to the page that opened it.
#[derive(Clone, Debug, PartialEq)]
pub enum WindowEvent {
    /// The popup finished loading its page.
    Loaded,
    /// The popup's page unloaded, usually because the user closed it.
    Unloaded,
    /// Data the popup posted to its opener.
    Message(Value),
}

/// A live popup window.
pub trait PopupWindow: Send + Sync + fmt::Debug {
    fn is_closed(&self) -> bool;
    fn focus(&self);
    fn close(&self);
}

/// A popup together with the events it reports.
#[derive(Debug)]
pub struct OpenedWindow {
    pub window: Arc<dyn PopupWindow>,
    pub events: UnboundedReceiver<WindowEvent>,
}

/// Window operations of the page the host peer runs in.
pub trait WindowSystem: Send + Sync {
    /// Origin of the page, echoed to the wallet so it knows who is asking.
    fn origin(&self) -> String;

    fn screen(&self) -> ScreenMetrics;

    /// Opens a popup. `None` means the browser blocked it.
    fn open(&self, url: &Url, features: &WindowFeatures) -> Option<OpenedWindow>;

    /// Registers a hook to run when the page itself unloads.
    fn on_page_unload(&self, hook: Box<dyn Fn() + Send + Sync>);
}
