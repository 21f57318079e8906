// TimeMap - Ordered program of sections with a measure-level playhead

use super::section::{Section, SectionDraft};
use super::timeline::Tempo;
use crate::error::{EngineError, ValidationError};

/// Measure-level playhead of the section sequencer
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TimeMapPlayhead {
    next_measure_time: f64,
    section_index: usize,
    measures_played: u32,
}

impl TimeMapPlayhead {
    pub fn new(start_time: f64) -> Self {
        Self {
            next_measure_time: start_time,
            section_index: 0,
            measures_played: 0,
        }
    }

    pub fn next_measure_time(&self) -> f64 {
        self.next_measure_time
    }

    pub fn section_index(&self) -> usize {
        self.section_index
    }

    pub fn measures_played(&self) -> u32 {
        self.measures_played
    }
}

/// Section list plus its playhead
#[derive(Debug, Clone, Default)]
pub struct TimeMap {
    sections: Vec<Section>,
    playhead: TimeMapPlayhead,
}

impl TimeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate a draft and append it. Nothing changes on error.
    pub fn add_section(&mut self, draft: &SectionDraft) -> Result<usize, ValidationError> {
        let section = draft.validate()?;
        Ok(self.push(section))
    }

    /// Append an already validated section, returning its index
    pub fn push(&mut self, section: Section) -> usize {
        self.sections.push(section);
        self.sections.len() - 1
    }

    /// Remove a section, keeping the playhead on the section it was playing
    ///
    /// A removed section before the playhead shifts the index down by one.
    /// Removing the section under the playhead leaves the index in place;
    /// the caller decides whether playback continues.
    pub fn remove(&mut self, index: usize) -> Result<Section, EngineError> {
        if index >= self.sections.len() {
            return Err(EngineError::SectionOutOfRange {
                index,
                len: self.sections.len(),
            });
        }
        let removed = self.sections.remove(index);
        if index < self.playhead.section_index {
            self.playhead.section_index -= 1;
        }
        Ok(removed)
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn playhead(&self) -> &TimeMapPlayhead {
        &self.playhead
    }

    /// Section under the playhead, `None` once the program has run out
    pub fn current_section(&self) -> Option<&Section> {
        self.sections.get(self.playhead.section_index)
    }

    /// Move the playhead back to the first section
    pub fn rewind(&mut self, start_time: f64) {
        self.playhead = TimeMapPlayhead::new(start_time);
    }

    /// Account for one finished measure of the current section
    ///
    /// Returns true when the playhead moved on to the next section.
    pub fn advance(&mut self, measure_duration: f64) -> bool {
        let measures = match self.current_section() {
            Some(section) => section.measures(),
            None => return false,
        };
        self.playhead.next_measure_time += measure_duration;
        self.playhead.measures_played += 1;
        if self.playhead.measures_played >= measures {
            self.playhead.section_index += 1;
            self.playhead.measures_played = 0;
            return true;
        }
        false
    }

    /// Length of the whole program in seconds
    ///
    /// Pauses take the tempo of the last tempo-carrying section before them,
    /// or `initial_tempo` when they open the program.
    pub fn total_duration(&self, initial_tempo: &Tempo) -> f64 {
        let mut active = *initial_tempo;
        self.sections
            .iter()
            .map(|section| {
                if let Some(tempo) = section.tempo() {
                    active = *tempo;
                }
                section.measure_duration(&active) * section.measures() as f64
            })
            .sum()
    }
}
