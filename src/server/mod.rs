mod client;
mod handlers;
mod models;
mod state;
mod translate;
mod util;

pub use handlers::run_server;

use crate::ocr::OcrResult;

/// Pretty JSON in the `/ocr/` response shape.
pub fn render_ocr_json(result: OcrResult) -> anyhow::Result<String> {
    let response = models::OcrResponse::from(result);
    Ok(serde_json::to_string_pretty(&response)?)
}

#[cfg(test)]
pub(crate) use test_support::{test_state, test_state_with_camera};

#[cfg(test)]
mod test_support {
    use std::sync::Arc;
    use usvg::fontdb;

    use super::state::ServerState;
    use crate::camera::CameraSupervisor;
    use crate::ocr::{OverlayRenderer, OverlayStyle};
    use crate::pipeline::{Pipeline, PipelineDefaults};
    use crate::settings::Settings;
    use crate::test_util::{FakeCamera, StubProvider, StubRecognizer};

    pub(crate) fn test_state(recognizer: StubRecognizer, provider: StubProvider) -> ServerState {
        test_state_with_camera(recognizer, provider, FakeCamera::endless())
    }

    pub(crate) fn test_state_with_camera(
        recognizer: StubRecognizer,
        provider: StubProvider,
        camera: FakeCamera,
    ) -> ServerState {
        let settings = Settings::default();
        let pipeline = Pipeline::new(
            Arc::new(recognizer),
            Arc::new(provider),
            PipelineDefaults::from_settings(&settings),
        );
        let renderer = OverlayRenderer::with_fontdb(
            OverlayStyle::from_settings(&settings.overlay),
            fontdb::Database::new(),
        );
        let camera = Arc::new(CameraSupervisor::new(
            Arc::new(camera),
            pipeline.clone(),
            renderer,
            None,
        ));
        ServerState {
            settings,
            pipeline,
            camera,
            camera_page: String::new(),
        }
    }
}
