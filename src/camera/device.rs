use image::RgbImage;
use std::io::{ErrorKind, Read};
use std::process::{Child, ChildStdout, Command, Stdio};
use tracing::{debug, warn};

use crate::error::CameraError;
use crate::settings::CameraSettings;

/// An open capture stream. Dropping it releases the device.
pub trait FrameSource: Send {
    fn read_frame(&mut self) -> Result<RgbImage, CameraError>;
}

pub trait CameraDevice: Send + Sync {
    fn describe(&self) -> String;

    fn open(&self) -> Result<Box<dyn FrameSource>, CameraError>;
}

/// Captures frames through an `ffmpeg` child process that writes raw `rgb24`
/// frames of a fixed size to stdout.
#[derive(Debug, Clone)]
pub struct FfmpegCamera {
    command: String,
    input_format: String,
    device: String,
    width: u32,
    height: u32,
}

impl FfmpegCamera {
    pub fn from_settings(settings: &CameraSettings) -> Self {
        Self {
            command: settings.ffmpeg_cmd.clone(),
            input_format: settings.input_format.clone(),
            device: settings.device.clone(),
            width: settings.width,
            height: settings.height,
        }
    }

    fn args(&self) -> Vec<String> {
        vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-f".to_string(),
            self.input_format.clone(),
            "-video_size".to_string(),
            format!("{}x{}", self.width, self.height),
            "-i".to_string(),
            self.device.clone(),
            "-f".to_string(),
            "rawvideo".to_string(),
            "-pix_fmt".to_string(),
            "rgb24".to_string(),
            "-".to_string(),
        ]
    }
}

impl CameraDevice for FfmpegCamera {
    fn describe(&self) -> String {
        format!("{} ({})", self.device, self.input_format)
    }

    fn open(&self) -> Result<Box<dyn FrameSource>, CameraError> {
        let args = self.args();
        debug!("camera: {} {}", self.command, args.join(" "));
        let mut child = Command::new(&self.command)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|err| {
                CameraError::DeviceUnavailable(format!("failed to run {}: {}", self.command, err))
            })?;
        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(CameraError::DeviceUnavailable(
                "capture process has no stdout".to_string(),
            ));
        };

        let mut stream = FfmpegStream {
            child,
            stdout,
            width: self.width,
            height: self.height,
            pending: None,
        };
        // ffmpeg only fails on a bad device after it starts, so the first
        // frame decides whether the device opened.
        match stream.read_raw() {
            Ok(frame) => {
                stream.pending = Some(frame);
                Ok(Box::new(stream))
            }
            Err(err) => Err(CameraError::DeviceUnavailable(format!(
                "{}: {}",
                self.describe(),
                err
            ))),
        }
    }
}

struct FfmpegStream {
    child: Child,
    stdout: ChildStdout,
    width: u32,
    height: u32,
    pending: Option<RgbImage>,
}

impl FfmpegStream {
    fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    fn read_raw(&mut self) -> Result<RgbImage, CameraError> {
        let mut buffer = vec![0u8; self.frame_len()];
        self.stdout.read_exact(&mut buffer).map_err(|err| {
            if err.kind() == ErrorKind::UnexpectedEof {
                CameraError::Disconnected("capture stream ended".to_string())
            } else {
                CameraError::Disconnected(err.to_string())
            }
        })?;
        RgbImage::from_raw(self.width, self.height, buffer).ok_or_else(|| {
            CameraError::Disconnected("frame buffer does not match frame size".to_string())
        })
    }
}

impl FrameSource for FfmpegStream {
    fn read_frame(&mut self) -> Result<RgbImage, CameraError> {
        match self.pending.take() {
            Some(frame) => Ok(frame),
            None => self.read_raw(),
        }
    }
}

impl Drop for FfmpegStream {
    fn drop(&mut self) {
        if let Err(err) = self.child.kill() {
            if err.kind() != ErrorKind::InvalidInput {
                warn!("camera: failed to stop capture process: {}", err);
            }
        }
        let _ = self.child.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> CameraSettings {
        CameraSettings {
            device: "/dev/video9".to_string(),
            input_format: "v4l2".to_string(),
            width: 320,
            height: 240,
            ffmpeg_cmd: "ffmpeg-not-installed-here".to_string(),
        }
    }

    #[test]
    fn builds_rawvideo_arguments() {
        let camera = FfmpegCamera::from_settings(&settings());
        let args = camera.args().join(" ");
        assert_eq!(
            args,
            "-hide_banner -loglevel error -f v4l2 -video_size 320x240 -i /dev/video9 \
             -f rawvideo -pix_fmt rgb24 -"
        );
    }

    #[test]
    fn missing_binary_is_device_unavailable() {
        let camera = FfmpegCamera::from_settings(&settings());
        let err = camera.open().err().expect("open should fail");
        assert!(matches!(err, CameraError::DeviceUnavailable(_)));
    }
}
