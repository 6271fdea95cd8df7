//! Black-box scenario tests (spec §8.2) exercising `gurthang-runtime`
//! against real loopback TCP listeners. These run the Controller and
//! Connection Table exactly as an interposed target would invoke them,
//! minus the `dlsym`/`ctor` plumbing in `gurthang-preload` — that plumbing
//! has no network-observable behavior of its own to black-box test.

mod infra;
mod scenarios;
