use crate::config::ConfigSnapshot;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Lifecycle state of a `FileJob` (spec §3). `Pending -> Running` happens on
/// scheduler admission; `Running -> {Completed,Failed,Skipped}` is terminal.
/// No other transition exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

/// Cache artifact paths derived from an input file's basename (spec §4.2,
/// grounded on `get_cache_paths()` in `original_source/core/video_processor.py`).
#[derive(Debug, Clone)]
pub struct CachePaths {
    pub audio_wav: PathBuf,
    pub output_srt: PathBuf,
    pub bilingual_srt: PathBuf,
}

impl CachePaths {
    pub fn derive(cache_dir: &Path, input_path: &Path) -> Self {
        let base = input_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "output".to_string());

        Self {
            audio_wav: cache_dir.join(format!("{base}_audio.wav")),
            output_srt: cache_dir.join(format!("{base}_output.srt")),
            bilingual_srt: cache_dir.join(format!("{base}_bilingual.srt")),
        }
    }

    /// `dir/B_subtitled_YYYYMMDD_HHMMSS.ext`, placed next to the input.
    pub fn subtitled_output_path(input_path: &Path, timestamp: &str) -> PathBuf {
        let dir = input_path.parent().unwrap_or_else(|| Path::new("."));
        let base = input_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "output".to_string());
        let ext = input_path
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_else(|| "mp4".to_string());
        dir.join(format!("{base}_subtitled_{timestamp}.{ext}"))
    }
}

/// A unit of work submitted to the scheduler. Owned exclusively by one
/// Pipeline Worker from admission until terminal state (spec §3).
#[derive(Debug, Clone)]
pub struct FileJob {
    pub job_id: String,
    pub input_path: PathBuf,
    pub config_snapshot: ConfigSnapshot,
    pub cache_dir: PathBuf,
}

impl FileJob {
    pub fn new(input_path: PathBuf, cache_dir: PathBuf, config_snapshot: ConfigSnapshot) -> Self {
        Self {
            job_id: Uuid::new_v4().to_string(),
            input_path,
            config_snapshot,
            cache_dir,
        }
    }

    pub fn base_name(&self) -> String {
        self.input_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "output".to_string())
    }

    pub fn cache_paths(&self) -> CachePaths {
        CachePaths::derive(&self.cache_dir, &self.input_path)
    }
}
