//! Dictionary loading for `CHUNK_DICT_SWAP` (spec §4.7, §6.4 `MUT_DICT`).
//! One word per line, no blank lines, no duplicates; membership is strict
//! substring match against a chunk's raw payload bytes.

use std::fs;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum DictError {
    #[error("failed to read dictionary {0}: {1}")]
    Read(String, std::io::Error),
    #[error("dictionary {0} contains a blank line")]
    BlankLine(String),
    #[error("dictionary {0} contains a duplicate word {1:?}")]
    Duplicate(String, String),
}

#[derive(Debug, Clone)]
pub struct Dictionary {
    pub words: Vec<String>,
}

impl Dictionary {
    pub fn load(path: &str) -> Result<Self, DictError> {
        let text = fs::read_to_string(Path::new(path))
            .map_err(|e| DictError::Read(path.to_string(), e))?;

        let mut words = Vec::new();
        for line in text.lines() {
            if line.is_empty() {
                return Err(DictError::BlankLine(path.to_string()));
            }
            if words.contains(&line.to_string()) {
                return Err(DictError::Duplicate(path.to_string(), line.to_string()));
            }
            words.push(line.to_string());
        }
        Ok(Self { words })
    }

    pub fn contains_in(&self, data: &[u8]) -> Option<&str> {
        self.words
            .iter()
            .find(|w| find_subslice(data, w.as_bytes()).is_some())
            .map(|w| w.as_str())
    }
}

pub fn load_all(paths: &[String]) -> Result<Vec<Dictionary>, DictError> {
    paths.iter().map(|p| Dictionary::load(p)).collect()
}

pub fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
