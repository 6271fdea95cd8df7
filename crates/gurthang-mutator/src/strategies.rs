//! The six structure-aware mutation strategies (spec §4.7). Each operates on
//! a parsed [`Manifest`] and returns `true` on success, `false` if no
//! suitable chunk existed — the Coordinator's selection loop (§4.6) treats a
//! `false` as "strategy unavailable this round, try another."

use bytes::Bytes;
use rand::seq::SliceRandom;
use rand::Rng;

use gurthang_codec::chunk::ChunkFlags;
use gurthang_codec::manifest::Manifest;
use gurthang_codec::ParsedChunk;

use crate::dict::Dictionary;
use crate::havoc::havoc_once;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    DataHavoc,
    DataExtra,
    SchedBump,
    Split,
    Splice,
    DictSwap,
}

impl Strategy {
    pub fn tag(self) -> &'static str {
        match self {
            Strategy::DataHavoc => "CHUNK_DATA_HAVOC",
            Strategy::DataExtra => "CHUNK_DATA_EXTRA",
            Strategy::SchedBump => "CHUNK_SCHED_BUMP",
            Strategy::Split => "CHUNK_SPLIT",
            Strategy::Splice => "CHUNK_SPLICE",
            Strategy::DictSwap => "CHUNK_DICT_SWAP",
        }
    }

    pub fn all() -> [Strategy; 6] {
        [
            Strategy::DataHavoc,
            Strategy::DataExtra,
            Strategy::SchedBump,
            Strategy::Split,
            Strategy::Splice,
            Strategy::DictSwap,
        ]
    }

    /// Whether this strategy could possibly succeed against `manifest`
    /// (spec §4.7 Selection: "skipping strategies disqualified by the
    /// current manifest").
    pub fn eligible(self, manifest: &Manifest, dictionaries: &[Dictionary]) -> bool {
        match self {
            Strategy::DataHavoc => manifest.chunks.iter().any(|c| !c.data.is_empty()),
            Strategy::DataExtra => manifest.chunks.iter().any(|c| c.data.len() >= 2),
            Strategy::SchedBump => {
                manifest.header.num_conns >= 2
                    && (0..manifest.chunks.len()).any(|i| wiggle_room(manifest, i).is_some())
            }
            Strategy::Split => (0..manifest.chunks.len()).any(|i| {
                manifest.chunks[i].data.len() >= 2 && wiggle_room(manifest, i).is_some()
            }),
            Strategy::Splice => conn_ids_with_multiple_chunks(manifest).next().is_some(),
            Strategy::DictSwap => {
                !dictionaries.is_empty()
                    && manifest
                        .chunks
                        .iter()
                        .any(|c| dictionaries.iter().any(|d| d.contains_in(&c.data).is_some()))
            }
        }
    }
}

/// `[lo, hi)` the chunk at `idx` could move its `schedule` into while keeping
/// its relative order among same-`conn_id` chunks (spec §4.7 `SCHED_BUMP`):
/// `lo` is one past the nearest same-conn schedule strictly below the
/// chunk's own, `hi` is the nearest same-conn schedule strictly above it (or
/// `max_sched + 1` if none). Using strict inequality rather than positional
/// neighbors keeps `lo <= current < hi` even when duplicate schedules are
/// present (I3 permits them). `None` when there is no room (`hi - lo < 2`).
fn wiggle_room(manifest: &Manifest, idx: usize) -> Option<(u32, u32)> {
    let conn_id = manifest.chunks[idx].header.conn_id;
    let current = manifest.chunks[idx].header.schedule;

    let same_conn = || manifest.chunks.iter().filter(|c| c.header.conn_id == conn_id);

    let max_sched = manifest.chunks.iter().map(|c| c.header.schedule).max().unwrap_or(0);

    let lo = same_conn()
        .map(|c| c.header.schedule)
        .filter(|&s| s < current)
        .max()
        .map_or(0, |s| s + 1);
    let hi = same_conn()
        .map(|c| c.header.schedule)
        .filter(|&s| s > current)
        .min()
        .unwrap_or(max_sched + 1);

    if hi.saturating_sub(lo) < 2 {
        None
    } else {
        Some((lo, hi))
    }
}

fn conn_ids_with_multiple_chunks(manifest: &Manifest) -> impl Iterator<Item = u32> + '_ {
    (0..manifest.header.num_conns).filter(move |&conn_id| {
        manifest.chunks.iter().filter(|c| c.header.conn_id == conn_id).count() >= 2
    })
}

pub fn data_havoc(manifest: &mut Manifest, rng: &mut impl Rng) -> bool {
    let candidates: Vec<usize> = (0..manifest.chunks.len())
        .filter(|&i| !manifest.chunks[i].data.is_empty())
        .collect();
    let Some(&idx) = candidates.choose(rng) else {
        return false;
    };
    let mut buf = manifest.chunks[idx].data.to_vec();
    havoc_once(&mut buf, rng);
    manifest.chunks[idx].header.data_len = buf.len() as u64;
    manifest.chunks[idx].data = Bytes::from(buf);
    true
}

pub fn data_extra(manifest: &mut Manifest, rng: &mut impl Rng) -> bool {
    let candidates: Vec<usize> = (0..manifest.chunks.len())
        .filter(|&i| manifest.chunks[i].data.len() >= 2)
        .collect();
    let Some(&idx) = candidates.choose(rng) else {
        return false;
    };
    let mut buf = manifest.chunks[idx].data.to_vec();
    if rng.gen_bool(0.5) {
        let a = rng.gen_range(0..buf.len());
        let b = rng.gen_range(0..buf.len());
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        buf[lo..=hi].reverse();
    } else {
        let a = rng.gen_range(0..buf.len());
        let mut b = rng.gen_range(0..buf.len());
        while b == a {
            b = rng.gen_range(0..buf.len());
        }
        buf.swap(a, b);
    }
    manifest.chunks[idx].data = Bytes::from(buf);
    true
}

pub fn sched_bump(manifest: &mut Manifest, rng: &mut impl Rng) -> bool {
    let mut candidates: Vec<usize> = (0..manifest.chunks.len()).collect();
    candidates.shuffle(rng);

    for idx in candidates {
        let Some((lo, hi)) = wiggle_room(manifest, idx) else {
            continue;
        };
        let current = manifest.chunks[idx].header.schedule;
        let mut new_value = rng.gen_range(lo..hi);
        if hi - lo > 1 {
            while new_value == current {
                new_value = rng.gen_range(lo..hi);
            }
        }
        manifest.chunks[idx].header.schedule = new_value;
        return true;
    }
    false
}

pub fn split(manifest: &mut Manifest, rng: &mut impl Rng) -> bool {
    let mut candidates: Vec<usize> = (0..manifest.chunks.len())
        .filter(|&i| manifest.chunks[i].data.len() >= 2)
        .collect();
    candidates.shuffle(rng);

    for idx in candidates {
        let Some((lo, hi)) = wiggle_room(manifest, idx) else {
            continue;
        };

        let data = manifest.chunks[idx].data.clone();
        let split_at = rng.gen_range(1..data.len());
        let left = data.slice(0..split_at);
        let right = data.slice(split_at..);

        let mut orig_sched = manifest.chunks[idx].header.schedule;
        let mut new_sched = orig_sched + 1;
        while new_sched >= hi {
            orig_sched -= 1;
            new_sched -= 1;
        }
        debug_assert!(orig_sched >= lo);

        let await_response = manifest.chunks[idx].header.await_response();
        let conn_id = manifest.chunks[idx].header.conn_id;

        manifest.chunks[idx].header.schedule = orig_sched;
        manifest.chunks[idx].header.flags &= !ChunkFlags::AWAIT_RESPONSE;
        manifest.chunks[idx].header.data_len = left.len() as u64;
        manifest.chunks[idx].data = left;

        let mut new_flags = 0;
        if await_response {
            new_flags |= ChunkFlags::AWAIT_RESPONSE;
        }
        manifest.chunks.push(ParsedChunk {
            header: gurthang_codec::ChunkHeader {
                conn_id,
                data_len: right.len() as u64,
                schedule: new_sched,
                flags: new_flags,
            },
            data: right,
            file_offset: 0,
        });
        manifest.header.num_chunks += 1;
        return true;
    }
    false
}

pub fn splice(manifest: &mut Manifest, rng: &mut impl Rng) -> bool {
    let mut conn_ids: Vec<u32> = conn_ids_with_multiple_chunks(manifest).collect();
    conn_ids.shuffle(rng);

    let Some(conn_id) = conn_ids.into_iter().next() else {
        return false;
    };

    let mut indices: Vec<usize> = (0..manifest.chunks.len())
        .filter(|&i| manifest.chunks[i].header.conn_id == conn_id)
        .collect();
    indices.sort_by_key(|&i| manifest.chunks[i].header.schedule);

    let pair = rng.gen_range(0..indices.len() - 1);
    let (first_idx, second_idx) = (indices[pair], indices[pair + 1]);

    let second_data = manifest.chunks[second_idx].data.clone();
    let second_await = manifest.chunks[second_idx].header.await_response();

    let mut merged = manifest.chunks[first_idx].data.to_vec();
    merged.extend_from_slice(&second_data);
    manifest.chunks[first_idx].data = Bytes::from(merged);
    manifest.chunks[first_idx].header.data_len = manifest.chunks[first_idx].data.len() as u64;
    if second_await {
        manifest.chunks[first_idx].header.flags |= ChunkFlags::AWAIT_RESPONSE;
    }

    manifest.chunks.remove(second_idx);
    manifest.header.num_chunks -= 1;
    true
}

pub fn dict_swap(manifest: &mut Manifest, dictionaries: &[Dictionary], rng: &mut impl Rng) -> bool {
    let mut candidates: Vec<usize> = (0..manifest.chunks.len()).collect();
    candidates.shuffle(rng);

    for idx in candidates {
        for dict in dictionaries {
            let data = manifest.chunks[idx].data.clone();
            let Some(word) = dict.contains_in(&data) else {
                continue;
            };
            let pos = crate::dict::find_subslice(&data, word.as_bytes()).unwrap();

            let mut alternatives: Vec<&String> = dict.words.iter().filter(|w| w.as_str() != word).collect();
            alternatives.shuffle(rng);
            let Some(replacement) = alternatives.first() else {
                continue;
            };

            let mut new_data = Vec::with_capacity(data.len() - word.len() + replacement.len());
            new_data.extend_from_slice(&data[..pos]);
            new_data.extend_from_slice(replacement.as_bytes());
            new_data.extend_from_slice(&data[pos + word.len()..]);

            manifest.chunks[idx].data = Bytes::from(new_data);
            manifest.chunks[idx].header.data_len = manifest.chunks[idx].data.len() as u64;
            return true;
        }
    }
    false
}
