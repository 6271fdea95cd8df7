//! Mutator Coordinator (spec §4.6): parses/validates a candidate, picks a
//! strategy under constraints, re-encodes; implements judging, fuzz-budget
//! scaling, the trimming state machine, and describe-mutation. Pure Rust,
//! single-threaded by contract (spec §5: "the Mutator Coordinator is
//! single-threaded inside the fuzzer process and requires no
//! synchronization") — the `extern "C"` boundary in `lib.rs` is the only
//! place that has to think about an opaque handle at all.

use std::io::Cursor;

use rand::rngs::StdRng;
use rand::SeedableRng;

use gurthang_codec::manifest::{decode_manifest, encode_manifest_to_writer, scan_headers, Manifest};
use gurthang_codec::{ChunkFlags, ChunkHeader, ManifestHeader, ParsedChunk, VERSION};

use crate::config::MutatorConfig;
use crate::dict::Dictionary;
use crate::strategies::{self, Strategy};

pub struct Coordinator {
    config: MutatorConfig,
    dictionaries: Vec<Dictionary>,
    rng: StdRng,
    last_strategy: Strategy,
    trim: Option<TrimState>,
}

struct TrimState {
    manifest: Manifest,
    chunk_idx: usize,
    head_and_tail_chunk_count: usize,
    removal_size: usize,
    total_steps: usize,
    step_index: usize,
    success_count: usize,
    prev_step_succeeded: bool,
    snapshot: bytes::Bytes,
}

impl Coordinator {
    pub fn new(config: MutatorConfig, dictionaries: Vec<Dictionary>, seed: u64) -> Self {
        Self {
            config,
            dictionaries,
            rng: StdRng::seed_from_u64(seed),
            last_strategy: Strategy::DataHavoc,
            trim: None,
        }
    }

    /// `judge(test_case_file)` (spec §4.6): parse header + every chunk
    /// header, not payloads; reject on any `ParseError`.
    pub fn judge(&self, data: &[u8]) -> bool {
        scan_headers(Cursor::new(data)).is_ok()
    }

    /// `fuzz_budget(test_case)` (spec §4.6).
    pub fn fuzz_budget(&self, previous: u32, data: &[u8]) -> u32 {
        let Ok((header, _)) = scan_headers(Cursor::new(data)) else {
            return previous.clamp(self.config.fuzz_min, self.config.fuzz_max);
        };

        let mut budget = previous as u64;
        let mut grew = false;

        if header.num_conns > 1 {
            budget *= header.num_conns.max(3) as u64;
            grew = true;
        }
        if header.num_chunks > header.num_conns {
            budget *= (header.num_chunks - header.num_conns).max(3) as u64;
            grew = true;
        }

        if !grew {
            let range = (self.config.fuzz_max - self.config.fuzz_min) as u64;
            let upper_quartile_floor = self.config.fuzz_min as u64 + (range * 3) / 4;
            if budget >= upper_quartile_floor {
                budget /= 2;
            }
        }

        budget.clamp(self.config.fuzz_min as u64, self.config.fuzz_max as u64) as u32
    }

    /// `fuzz(input)` (spec §4.6).
    pub fn fuzz(&mut self, data: &[u8], max_size: Option<usize>) -> Vec<u8> {
        self.mutate(data, max_size, None)
    }

    /// `havoc(input)` (spec §4.6): same as `fuzz` but the strategy is
    /// forced to `CHUNK_DATA_HAVOC`.
    pub fn havoc(&mut self, data: &[u8], max_size: Option<usize>) -> Vec<u8> {
        self.mutate(data, max_size, Some(Strategy::DataHavoc))
    }

    pub fn havoc_probability(&self) -> u32 {
        100
    }

    pub fn describe(&self) -> &'static str {
        self.last_strategy.tag()
    }

    fn mutate(&mut self, data: &[u8], max_size: Option<usize>, forced: Option<Strategy>) -> Vec<u8> {
        let mut manifest = decode_manifest(Cursor::new(data)).unwrap_or_else(|_| synth_minimal());

        manifest.header.version = VERSION;
        for chunk in &mut manifest.chunks {
            chunk.header.flags &= !ChunkFlags::NO_SHUTDOWN;
        }

        self.apply_one(&mut manifest, forced);

        let mut buf = Vec::new();
        encode_manifest_to_writer(&manifest, &mut buf).expect("encoding to a Vec cannot fail");

        match max_size {
            Some(max) if buf.len() > max => {
                tracing::debug!(strategy = self.last_strategy.tag(), produced = buf.len(), max, "mutation exceeded max_size, returning original");
                data.to_vec()
            }
            _ => buf,
        }
    }

    /// Strategy selection (spec §4.7 Selection): uniform random among
    /// eligible strategies, retrying on runtime failure until exhausted.
    fn apply_one(&mut self, manifest: &mut Manifest, forced: Option<Strategy>) -> bool {
        let mut candidates: Vec<Strategy> = match forced {
            Some(s) => vec![s],
            None => Strategy::all()
                .into_iter()
                .filter(|s| s.eligible(manifest, &self.dictionaries))
                .collect(),
        };

        use rand::seq::SliceRandom;
        candidates.shuffle(&mut self.rng);

        for strategy in candidates {
            let applied = match strategy {
                Strategy::DataHavoc => strategies::data_havoc(manifest, &mut self.rng),
                Strategy::DataExtra => strategies::data_extra(manifest, &mut self.rng),
                Strategy::SchedBump => strategies::sched_bump(manifest, &mut self.rng),
                Strategy::Split => strategies::split(manifest, &mut self.rng),
                Strategy::Splice => strategies::splice(manifest, &mut self.rng),
                Strategy::DictSwap => strategies::dict_swap(manifest, &self.dictionaries, &mut self.rng),
            };
            if applied {
                tracing::trace!(strategy = strategy.tag(), "applied mutation strategy");
                self.last_strategy = strategy;
                return true;
            }
        }
        tracing::debug!("no eligible strategy applied to manifest");
        false
    }

    // ---- Trimming state machine (spec §4.6) ----

    pub fn trim_init(&mut self, data: &[u8]) -> usize {
        let Ok(manifest) = decode_manifest(Cursor::new(data)) else {
            self.trim = None;
            return 0;
        };
        if manifest.chunks.is_empty() {
            self.trim = None;
            return 0;
        }

        use rand::Rng;
        let chunk_idx = self.rng.gen_range(0..manifest.chunks.len());
        let chunk_len = manifest.chunks[chunk_idx].data.len();
        if chunk_len == 0 {
            self.trim = None;
            return 0;
        }

        let removal_size = std::cmp::max(1, (chunk_len as f64 * 0.025).ceil() as usize);
        let raw_steps = chunk_len / removal_size;
        let total_steps = match self.config.trim_max {
            Some(cap) => (raw_steps.saturating_sub(1)).min(cap as usize),
            None => raw_steps.saturating_sub(1),
        };

        let snapshot = manifest.chunks[chunk_idx].data.clone();
        self.trim = Some(TrimState {
            manifest,
            chunk_idx,
            head_and_tail_chunk_count: 0,
            removal_size,
            total_steps,
            step_index: 0,
            success_count: 0,
            prev_step_succeeded: true,
            snapshot,
        });
        total_steps
    }

    pub fn trim_step(&mut self) -> Vec<u8> {
        use rand::seq::index::sample;

        let Some(state) = &mut self.trim else {
            return Vec::new();
        };

        if state.prev_step_succeeded {
            state.snapshot = state.manifest.chunks[state.chunk_idx].data.clone();
        }

        let data = state.manifest.chunks[state.chunk_idx].data.to_vec();
        let n = state.removal_size.min(data.len());
        let mut positions: Vec<usize> = sample(&mut self.rng, data.len(), n).into_vec();
        positions.sort_unstable();
        positions.dedup();

        let mut new_data = Vec::with_capacity(data.len());
        let mut cursor = 0;
        for &pos in &positions {
            new_data.extend_from_slice(&data[cursor..pos]);
            cursor = pos + 1;
        }
        new_data.extend_from_slice(&data[cursor..]);

        state.manifest.chunks[state.chunk_idx].data = bytes::Bytes::from(new_data);
        state.manifest.chunks[state.chunk_idx].header.data_len =
            state.manifest.chunks[state.chunk_idx].data.len() as u64;
        state.step_index += 1;
        let _ = state.head_and_tail_chunk_count; // reserved for future head/tail bookkeeping

        let mut buf = Vec::new();
        encode_manifest_to_writer(&state.manifest, &mut buf).expect("encoding to a Vec cannot fail");
        buf
    }

    pub fn trim_post_step(&mut self, success: bool) -> usize {
        let Some(state) = &mut self.trim else {
            return 0;
        };

        state.prev_step_succeeded = success;
        if success {
            state.success_count += 1;
        } else {
            let restored = state.snapshot.clone();
            state.manifest.chunks[state.chunk_idx].header.data_len = restored.len() as u64;
            state.manifest.chunks[state.chunk_idx].data = restored;
        }

        let threshold = std::cmp::max(100, state.total_steps / 4);
        if state.step_index >= threshold {
            let ratio = state.success_count as f64 / state.step_index as f64;
            if ratio < 0.10 {
                return state.total_steps;
            }
        }
        state.step_index
    }
}

/// A minimal, always-valid manifest used when `fuzz`/`havoc` is handed bytes
/// that fail to parse (spec §7: the fuzz hook "synthesizes a replacement").
fn synth_minimal() -> Manifest {
    Manifest {
        header: ManifestHeader::new(1, 1).unwrap(),
        chunks: vec![ParsedChunk {
            header: ChunkHeader {
                conn_id: 0,
                data_len: 0,
                schedule: 0,
                flags: 0,
            },
            data: bytes::Bytes::new(),
            file_offset: 0,
        }],
    }
}
