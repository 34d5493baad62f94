//! State the host window procedure reaches through `GWLP_USERDATA`.

use std::rc::Rc;

use crate::host::HostController;
use crate::platform::{Size, WindowId};

/// Boxed and handed to the host window at creation; dropped on `WM_DESTROY`.
pub struct AppState {
    pub controller: Rc<HostController>,
}

impl AppState {
    pub fn new(controller: Rc<HostController>) -> Self {
        Self { controller }
    }

    pub fn on_size(&self, client: Size) {
        self.controller.on_resize(client);
    }

    pub fn on_wake(&self) {
        self.controller.drain_events();
    }

    pub fn on_close(&self) {
        self.controller.on_close_requested();
    }

    /// Window that should receive keyboard focus when the host is activated.
    pub fn focus_target(&self) -> Option<WindowId> {
        self.controller.embedded().map(|embedded| embedded.window)
    }
}
