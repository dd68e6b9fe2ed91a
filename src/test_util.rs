use image::{DynamicImage, Rgb, RgbImage};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::camera::{CameraDevice, FrameSource};
use crate::error::{CameraError, OcrError, TranslationError};
use crate::ocr::{BBoxPx, RecognizedToken, Recognizer};
use crate::providers::{TranslateFuture, TranslationProvider};

pub(crate) fn token(id: usize, text: &str, conf: f32) -> RecognizedToken {
    RecognizedToken {
        id,
        text: text.to_string(),
        conf,
        bbox: BBoxPx {
            x: 2,
            y: 3,
            w: 10,
            h: 5,
        },
    }
}

pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([240, 240, 240])));
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .expect("encode png");
    bytes
}

#[derive(Clone, Default)]
pub(crate) struct CallCounter(Arc<AtomicUsize>);

impl CallCounter {
    pub(crate) fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Default)]
pub(crate) struct Recorder(Arc<Mutex<Vec<String>>>);

impl Recorder {
    fn push(&self, value: &str) {
        self.0
            .lock()
            .expect("recorder lock")
            .push(value.to_string());
    }

    pub(crate) fn snapshot(&self) -> Vec<String> {
        self.0.lock().expect("recorder lock").clone()
    }
}

pub(crate) struct StubRecognizer {
    tokens: Option<Vec<RecognizedToken>>,
    languages: Recorder,
}

impl StubRecognizer {
    pub(crate) fn with_tokens(tokens: Vec<RecognizedToken>) -> Self {
        Self {
            tokens: Some(tokens),
            languages: Recorder::default(),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            tokens: None,
            languages: Recorder::default(),
        }
    }

    pub(crate) fn languages_seen(&self) -> Recorder {
        self.languages.clone()
    }
}

impl Recognizer for StubRecognizer {
    fn recognize(
        &self,
        _image: &DynamicImage,
        language: &str,
    ) -> Result<Vec<RecognizedToken>, OcrError> {
        self.languages.push(language);
        self.tokens
            .clone()
            .ok_or_else(|| OcrError::EngineDegraded("stub engine failure".to_string()))
    }

    fn languages(&self) -> Result<Vec<String>, OcrError> {
        Ok(vec!["eng".to_string(), "tam".to_string()])
    }
}

enum Reply {
    Fixed(String),
    Echo,
    Fail,
}

pub(crate) struct StubProvider {
    reply: Reply,
    calls: CallCounter,
    targets: Recorder,
}

impl StubProvider {
    fn new(reply: Reply) -> Self {
        Self {
            reply,
            calls: CallCounter::default(),
            targets: Recorder::default(),
        }
    }

    pub(crate) fn fixed(value: &str) -> Self {
        Self::new(Reply::Fixed(value.to_string()))
    }

    /// Replies with `[<target>] <text>`.
    pub(crate) fn echo() -> Self {
        Self::new(Reply::Echo)
    }

    pub(crate) fn failing() -> Self {
        Self::new(Reply::Fail)
    }

    pub(crate) fn calls(&self) -> CallCounter {
        self.calls.clone()
    }

    pub(crate) fn targets(&self) -> Recorder {
        self.targets.clone()
    }
}

impl TranslationProvider for StubProvider {
    fn kind(&self) -> &'static str {
        "stub"
    }

    fn translate<'a>(
        &'a self,
        text: &'a str,
        target_lang: &'a str,
        _source_lang: &'a str,
    ) -> TranslateFuture<'a> {
        self.calls.hit();
        self.targets.push(target_lang);
        let result = match &self.reply {
            Reply::Fixed(value) => Ok(value.clone()),
            Reply::Echo => Ok(format!("[{}] {}", target_lang, text)),
            Reply::Fail => Err(TranslationError::Service {
                status: 503,
                body: "stub translation failure".to_string(),
            }),
        };
        Box::pin(async move { result })
    }
}

/// Camera that yields small frames until stopped or until its frame budget
/// runs out, which simulates a disconnect.
#[derive(Clone)]
pub(crate) struct FakeCamera {
    opens: CallCounter,
    fail_open: bool,
    frames_before_disconnect: Option<usize>,
}

impl FakeCamera {
    pub(crate) fn endless() -> Self {
        Self {
            opens: CallCounter::default(),
            fail_open: false,
            frames_before_disconnect: None,
        }
    }

    pub(crate) fn unavailable() -> Self {
        Self {
            fail_open: true,
            ..Self::endless()
        }
    }

    pub(crate) fn disconnecting_after(frames: usize) -> Self {
        Self {
            frames_before_disconnect: Some(frames),
            ..Self::endless()
        }
    }

    pub(crate) fn opens(&self) -> CallCounter {
        self.opens.clone()
    }
}

struct FakeStream {
    remaining: Option<usize>,
}

impl FrameSource for FakeStream {
    fn read_frame(&mut self) -> Result<RgbImage, CameraError> {
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                return Err(CameraError::Disconnected("fake stream ended".to_string()));
            }
            *remaining -= 1;
        }
        std::thread::sleep(Duration::from_millis(2));
        Ok(RgbImage::from_pixel(16, 12, Rgb([200, 200, 200])))
    }
}

impl CameraDevice for FakeCamera {
    fn describe(&self) -> String {
        "fake camera".to_string()
    }

    fn open(&self) -> Result<Box<dyn FrameSource>, CameraError> {
        self.opens.hit();
        if self.fail_open {
            return Err(CameraError::DeviceUnavailable(
                "fake camera is unplugged".to_string(),
            ));
        }
        Ok(Box::new(FakeStream {
            remaining: self.frames_before_disconnect,
        }))
    }
}
