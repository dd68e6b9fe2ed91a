use std::sync::Arc;

use crate::camera::CameraSupervisor;
use crate::pipeline::Pipeline;
use crate::settings;

pub(crate) struct ServerState {
    pub(crate) settings: settings::Settings,
    pub(crate) pipeline: Pipeline,
    pub(crate) camera: Arc<CameraSupervisor>,
    pub(crate) camera_page: String,
}
