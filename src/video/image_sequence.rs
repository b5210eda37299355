//! Directories of still images treated as a video stream.
//!
//! Frames are ordered by file name. Useful when ffmpeg is not installed or
//! when a clip has already been split into frames.

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{Frame, FrameRate, FrameSink, FrameSource, VideoError, VideoInfo};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

fn is_image_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
            .unwrap_or(false)
}

/// Reads frames from image files in a directory
pub struct ImageSequenceSource {
    files: Vec<PathBuf>,
    position: usize,
    info: VideoInfo,
}

impl ImageSequenceSource {
    pub fn open(dir: &Path, frame_rate: FrameRate) -> Result<Self, VideoError> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| is_image_file(p))
            .collect();
        files.sort();

        let first = files
            .first()
            .ok_or_else(|| VideoError::Decode(format!("No image frames found in {:?}", dir)))?;
        let (width, height) = image::image_dimensions(first)?;

        info!("Image sequence: {} frames of {}x{} in {:?}", files.len(), width, height, dir);

        Ok(Self {
            info: VideoInfo {
                width,
                height,
                frame_rate,
                frame_count: Some(files.len() as u64),
            },
            files,
            position: 0,
        })
    }
}

impl FrameSource for ImageSequenceSource {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, VideoError> {
        let Some(path) = self.files.get(self.position) else {
            return Ok(None);
        };
        self.position += 1;

        let image = image::open(path)
            .map_err(|e| VideoError::Decode(format!("Failed to read {:?}: {}", path, e)))?
            .to_rgb8();
        if image.width() != self.info.width || image.height() != self.info.height {
            return Err(VideoError::Decode(format!(
                "Frame {:?} is {}x{}, expected {}x{}",
                path,
                image.width(),
                image.height(),
                self.info.width,
                self.info.height
            )));
        }

        Ok(Some(Frame::new(self.position as u64, image)))
    }
}

/// Writes frames as numbered PNG files into a directory
pub struct ImageSequenceSink {
    dir: PathBuf,
    written: Vec<PathBuf>,
    created_dir: bool,
}

impl ImageSequenceSink {
    pub fn create(dir: &Path) -> Result<Self, VideoError> {
        let created_dir = !dir.exists();
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            written: Vec::new(),
            created_dir,
        })
    }

    pub fn frames_written(&self) -> usize {
        self.written.len()
    }
}

impl FrameSink for ImageSequenceSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), VideoError> {
        let path = self.dir.join(format!("frame_{:06}.png", frame.number));
        frame
            .image
            .save(&path)
            .map_err(|e| VideoError::Encode(format!("Failed to write {:?}: {}", path, e)))?;
        self.written.push(path);
        Ok(())
    }

    fn finish(&mut self) -> Result<(), VideoError> {
        info!("Wrote {} frames to {:?}", self.frames_written(), self.dir);
        Ok(())
    }

    fn abort(&mut self) {
        for path in self.written.drain(..) {
            let _ = std::fs::remove_file(path);
        }
        if self.created_dir {
            let _ = std::fs::remove_dir(&self.dir);
        }
        debug!("Removed partial image sequence {:?}", self.dir);
    }

    fn output_path(&self) -> &Path {
        &self.dir
    }
}
