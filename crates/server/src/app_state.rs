use crate::sessions::SessionHub;
use tpa_api::TeleportService;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) tpa: TeleportService,
    pub(crate) hub: SessionHub,
}
