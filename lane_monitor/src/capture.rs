// OpenCV-backed video decoding for lanewatch workers.

use lanewatch::{DecodeError, Frame, FrameReader, OpenError, VideoOpener, VideoSource};
use opencv::{
    core::Mat,
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture},
};
use tracing::debug;

pub struct OpenCvOpener;

impl VideoOpener for OpenCvOpener {
    fn open(&self, source: &VideoSource) -> Result<Box<dyn FrameReader>, OpenError> {
        let location = source.to_string();
        let cap = VideoCapture::from_file(&location, videoio::CAP_ANY)
            .map_err(|e| OpenError::new(&location, e.to_string()))?;
        if !cap.is_opened().map_err(|e| OpenError::new(&location, e.to_string()))? {
            return Err(OpenError::new(&location, "Error opening video file"));
        }

        let width = cap.get(videoio::CAP_PROP_FRAME_WIDTH).unwrap_or(0.0);
        let height = cap.get(videoio::CAP_PROP_FRAME_HEIGHT).unwrap_or(0.0);
        let fps = cap.get(videoio::CAP_PROP_FPS).unwrap_or(0.0);
        debug!(source = %location, width, height, fps, "video opened");

        Ok(Box::new(OpenCvReader {
            cap,
            frame: Mat::default(),
            frames_read: 0,
        }))
    }
}

/// Open capture handle. Released when dropped.
pub struct OpenCvReader {
    cap: VideoCapture,
    frame: Mat,
    frames_read: u64,
}

impl OpenCvReader {
    fn decode_error(&self, reason: impl ToString) -> DecodeError {
        DecodeError {
            frame_index: self.frames_read,
            reason: reason.to_string(),
        }
    }
}

impl FrameReader for OpenCvReader {
    fn read_frame(&mut self) -> Result<Option<Frame>, DecodeError> {
        match self.cap.read(&mut self.frame) {
            Ok(true) if !self.frame.empty() => {}
            Ok(_) => return Ok(None),
            Err(e) => return Err(self.decode_error(e)),
        }

        let image = mat_to_rgb_image(&self.frame).map_err(|e| self.decode_error(e))?;
        self.frames_read += 1;
        Ok(Some(image))
    }
}

impl Drop for OpenCvReader {
    fn drop(&mut self) {
        let _ = self.cap.release();
    }
}

/// Converts a BGR capture frame into an RGB image buffer.
pub fn mat_to_rgb_image(mat: &Mat) -> opencv::Result<Frame> {
    let mut rgb = Mat::default();
    imgproc::cvt_color(mat, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?;
    let data = rgb.data_bytes()?.to_vec();
    Frame::from_raw(rgb.cols() as u32, rgb.rows() as u32, data).ok_or_else(|| {
        opencv::Error::new(opencv::core::StsBadSize, "frame buffer does not match its dimensions")
    })
}

/// Converts an RGB image buffer into a BGR `Mat`.
pub fn rgb_image_to_mat(image: &Frame) -> opencv::Result<Mat> {
    let (_, height) = image.dimensions();
    let flat = Mat::from_slice(image.as_raw().as_slice())?;
    let reshaped = flat.reshape(3, height as i32)?;
    let mut bgr = Mat::default();
    imgproc::cvt_color(&reshaped, &mut bgr, imgproc::COLOR_RGB2BGR, 0)?;
    Ok(bgr)
}
