use anyhow::{ensure, Context, Result};
use rand::Rng;
use std::fs;
use std::path::{Path, PathBuf};

/// Read-only snapshot of the sample files available to the audio and image
/// content builders. Loaded once at startup; changes on disk are invisible
/// until restart.
#[derive(Debug)]
pub struct SamplePool {
    audio: Vec<PathBuf>,
    image: Vec<PathBuf>,
}

fn read_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).with_context(|| {
        format!("Failed to read the content directory {}", dir.display())
    })?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| {
            format!("Failed to list the content directory {}", dir.display())
        })?;
        if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            files.push(entry.path());
        }
    }
    ensure!(
        !files.is_empty(),
        "The content directory {} contains no sample file",
        dir.display()
    );
    Ok(files)
}

impl SamplePool {
    pub fn load(audio_dir: &Path, image_dir: &Path) -> Result<Self> {
        Ok(Self {
            audio: read_files(audio_dir)?,
            image: read_files(image_dir)?,
        })
    }

    pub fn pick_audio(&self, rng: &mut impl Rng) -> &Path {
        self.audio[rng.gen_range(0..self.audio.len())].as_path()
    }

    pub fn pick_image(&self, rng: &mut impl Rng) -> &Path {
        self.image[rng.gen_range(0..self.image.len())].as_path()
    }

    #[cfg(test)]
    pub fn from_files(audio: Vec<PathBuf>, image: Vec<PathBuf>) -> Self {
        Self { audio, image }
    }
}
