//! # Session Recording
//!
//! The audio-capture stage hands every caller and bot chunk to a
//! [`RecordingSink`]. Recording is a tap on the side of the pipeline: a sink
//! that fails only produces a warning, the session carries on.
//!
//! [`WavRecorder`] keeps the two directions as separate tracks and writes a
//! stereo WAV file when the session ends (left = caller, right = bot).

use crate::audio::{pcm, AudioUnit, Direction};
use std::fs::{self, File};
use std::io;
use std::path::PathBuf;
use tracing::info;

/// Receives a copy of the full-duplex audio of one session.
pub trait RecordingSink: Send {
    fn record(&mut self, unit: &AudioUnit) -> io::Result<()>;

    /// Flush whatever was recorded. Returns where it went, if anywhere.
    fn finish(&mut self) -> io::Result<Option<PathBuf>>;
}

pub struct WavRecorder {
    path: PathBuf,
    sample_rate: u32,
    caller: Vec<i16>,
    bot: Vec<i16>,
    finished: bool,
}

impl WavRecorder {
    pub fn new(directory: impl Into<PathBuf>, session_id: &str, sample_rate: u32) -> Self {
        let mut path = directory.into();
        path.push(format!("{}.wav", session_id));

        Self {
            path,
            sample_rate,
            caller: Vec::new(),
            bot: Vec::new(),
            finished: false,
        }
    }

    /// Interleave the two tracks, padding the shorter one with silence.
    fn interleaved(&self) -> Vec<i16> {
        let frames = self.caller.len().max(self.bot.len());
        let mut out = Vec::with_capacity(frames * 2);

        for i in 0..frames {
            out.push(self.caller.get(i).copied().unwrap_or(0));
            out.push(self.bot.get(i).copied().unwrap_or(0));
        }

        out
    }
}

impl RecordingSink for WavRecorder {
    fn record(&mut self, unit: &AudioUnit) -> io::Result<()> {
        if self.finished {
            return Err(io::Error::new(io::ErrorKind::Other, "recording already finished"));
        }

        let mut samples = pcm::bytes_to_samples(&unit.samples);
        if unit.channels > 1 {
            // Keep the first channel of multi-channel bot audio.
            samples = samples.into_iter().step_by(unit.channels as usize).collect();
        }

        match unit.direction {
            Direction::In => self.caller.extend(samples),
            Direction::Out => self.bot.extend(samples),
        }

        Ok(())
    }

    fn finish(&mut self) -> io::Result<Option<PathBuf>> {
        if self.finished {
            return Ok(None);
        }
        self.finished = true;

        if self.caller.is_empty() && self.bot.is_empty() {
            return Ok(None);
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let header = wav::Header::new(wav::header::WAV_FORMAT_PCM, 2, self.sample_rate, 16);
        let data = wav::BitDepth::Sixteen(self.interleaved());
        let mut file = File::create(&self.path)?;
        wav::write(header, &data, &mut file)?;

        info!(
            path = %self.path.display(),
            caller_ms = self.caller.len() as u64 * 1000 / self.sample_rate as u64,
            bot_ms = self.bot.len() as u64 * 1000 / self.sample_rate as u64,
            "Session recording written"
        );

        Ok(Some(self.path.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!("bridge-capture-{}-{}", name, uuid::Uuid::new_v4()));
        dir
    }

    #[test]
    fn test_tracks_are_interleaved_and_padded() {
        let mut recorder = WavRecorder::new(temp_dir("interleave"), "s1", 16000);
        recorder
            .record(&AudioUnit::inbound(pcm::samples_to_bytes(&[1, 2, 3]), 16000))
            .unwrap();
        recorder
            .record(&AudioUnit::outbound(pcm::samples_to_bytes(&[9]), 16000, 1))
            .unwrap();

        assert_eq!(recorder.interleaved(), vec![1, 9, 2, 0, 3, 0]);
    }

    #[test]
    fn test_finish_writes_wav_file_once() {
        let dir = temp_dir("finish");
        let mut recorder = WavRecorder::new(&dir, "s2", 16000);
        recorder
            .record(&AudioUnit::inbound(vec![0u8; 640], 16000))
            .unwrap();

        let path = recorder.finish().unwrap().expect("a file should be written");
        assert!(path.exists());
        assert!(fs::metadata(&path).unwrap().len() > 44);

        assert!(recorder.finish().unwrap().is_none());
        assert!(recorder.record(&AudioUnit::inbound(vec![0u8; 2], 16000)).is_err());

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_empty_session_writes_nothing() {
        let dir = temp_dir("empty");
        let mut recorder = WavRecorder::new(&dir, "s3", 16000);
        assert!(recorder.finish().unwrap().is_none());
        assert!(!dir.exists());
    }
}
