//! LLVM IR code generation.
//!
//! The final stage of the compilation pipeline: a linked,
//! reachability-pruned set of NIR defns goes in, one or more `.ll` text
//! files land in the working directory.
//!
//! # Architecture
//!
//! ```text
//! NIR defns -> Lowering (per top-level owner, parallel)
//!           -> Partitioner (hash top-level owner into shards)
//!           -> Emitter (one per shard, parallel)
//!           -> <shard>.ll files
//! ```
//!
//! # Why shard at all
//!
//! LLVM does not optimize across IR-module boundaries unless link-time
//! optimization is configured, so the shard layout is the compiler's
//! throughput lever:
//!
//! | Mode     | LTO   | Layout   |
//! |----------|-------|----------|
//! | Debug    | any   | N shards |
//! | Release  | none  | 1 shard  |
//! | Release  | other | N shards |
//!
//! A single Release shard keeps the whole program visible to one LLVM
//! invocation, an ad-hoc whole-program LTO. Sharding is a deterministic
//! function of the input (BLAKE3 of the top-level owner name), so
//! incremental builds stay cacheable.

mod block;
mod consts;
pub mod emitter;
mod inst;
mod printer;


use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::CodegenError;
use crate::nir::Defn;

pub use emitter::Emitter;

/// Build mode of the enclosing compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BuildMode {
    #[default]
    Debug,
    Release,
}

/// Link-time-optimization setting of the external toolchain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lto {
    #[default]
    None,
    Thin,
    Full,
}

/// Configuration consumed by the code-generation stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Target triple written into every module; empty omits the line.
    pub target_triple: String,
    /// Directory the `.ll` files are written into.
    pub workdir: PathBuf,
    pub mode: BuildMode,
    pub lto: Lto,
    /// Shard count override; defaults to the machine's parallelism. Pin
    /// it to reproduce shard layouts across machines.
    pub procs: Option<usize>,
}

impl Config {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Config {
            target_triple: String::new(),
            workdir: workdir.into(),
            mode: BuildMode::default(),
            lto: Lto::default(),
            procs: None,
        }
    }

    fn procs(&self) -> usize {
        self.procs.unwrap_or_else(|| {
            thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    /// Release without external LTO keeps everything in one module.
    fn single_shard(&self) -> bool {
        self.mode == BuildMode::Release && self.lto == Lto::None
    }
}

/// The high-to-low NIR transform supplied by the upstream pipeline. The
/// backend invokes it once per top-level name group, in parallel.
pub trait Lowering: Sync {
    fn lower(&self, group: Vec<Defn>) -> Result<Vec<Defn>, CodegenError>;
}

/// Identity lowering for defn sets that are already low-level.
pub struct Lowered;

impl Lowering for Lowered {
    fn lower(&self, group: Vec<Defn>) -> Result<Vec<Defn>, CodegenError> {
        Ok(group)
    }
}

/// Lower and emit a whole program, returning the written `.ll` paths.
///
/// Output file names and contents are deterministic functions of the
/// defn set and the configuration. Any shard failure aborts the stage;
/// partial files are invalid until the next successful run replaces them.
pub fn generate(
    config: &Config,
    defns: Vec<Defn>,
    lowering: &dyn Lowering,
) -> Result<Vec<PathBuf>, CodegenError> {
    let lowered = lower(config, defns, lowering)?;

    let mut env: HashMap<String, Defn> = HashMap::new();
    for defn in &lowered {
        env.entry(defn.name().show()).or_insert_with(|| defn.clone());
    }

    let shards = partition(config, lowered);
    info!(
        shards = shards.len(),
        defns = env.len(),
        workdir = %config.workdir.display(),
        "emitting LLVM IR"
    );
    emit(config, &env, shards)
}

/// Group defns by their top-level owner and run the lowering transform
/// per group, fanned out over the configured parallelism. Concatenation
/// order does not matter downstream: emission sorts within each shard.
fn lower(
    config: &Config,
    defns: Vec<Defn>,
    lowering: &dyn Lowering,
) -> Result<Vec<Defn>, CodegenError> {
    let mut groups: BTreeMap<String, Vec<Defn>> = BTreeMap::new();
    for defn in defns {
        groups
            .entry(defn.name().top_id().to_string())
            .or_default()
            .push(defn);
    }

    let procs = config.procs().max(1);
    let mut buckets: Vec<Vec<Vec<Defn>>> = (0..procs).map(|_| Vec::new()).collect();
    for (i, group) in groups.into_values().enumerate() {
        buckets[i % procs].push(group);
    }

    let results = thread::scope(|scope| {
        let handles: Vec<_> = buckets
            .into_iter()
            .map(|bucket| {
                scope.spawn(move || -> Result<Vec<Defn>, CodegenError> {
                    let mut out = Vec::new();
                    for group in bucket {
                        out.extend(lowering.lower(group)?);
                    }
                    Ok(out)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(join)
            .collect::<Result<Vec<_>, CodegenError>>()
    })?;
    Ok(results.into_iter().flatten().collect())
}

/// Split defns into shards. Multi-shard layouts bucket by a stable hash
/// of the top-level owner so a defn's shard never depends on machine or
/// run; empty buckets produce no file.
fn partition(config: &Config, defns: Vec<Defn>) -> Vec<(String, Vec<Defn>)> {
    if config.single_shard() {
        return vec![("out".to_string(), defns)];
    }
    let procs = config.procs().max(1);
    let mut buckets: Vec<Vec<Defn>> = (0..procs).map(|_| Vec::new()).collect();
    for defn in defns {
        let bucket = shard_bucket(defn.name().top_id(), procs);
        buckets[bucket].push(defn);
    }
    buckets
        .into_iter()
        .enumerate()
        .filter(|(_, defns)| !defns.is_empty())
        .map(|(id, defns)| (id.to_string(), defns))
        .collect()
}

fn shard_bucket(top: &str, procs: usize) -> usize {
    let hash = blake3::hash(top.as_bytes());
    let mut x = 0u64;
    for &b in &hash.as_bytes()[..8] {
        x = x << 8 | u64::from(b);
    }
    (x % procs as u64) as usize
}

/// Emit every shard on its own task and flush each buffer to
/// `<id>.ll`. Shards share nothing but the read-only env map and write
/// distinct files, so no locking is needed.
fn emit(
    config: &Config,
    env: &HashMap<String, Defn>,
    shards: Vec<(String, Vec<Defn>)>,
) -> Result<Vec<PathBuf>, CodegenError> {
    let triple = config.target_triple.as_str();
    let workdir: &Path = &config.workdir;
    thread::scope(|scope| {
        let handles: Vec<_> = shards
            .into_iter()
            .map(|(id, mut defns)| {
                scope.spawn(move || -> Result<PathBuf, CodegenError> {
                    defns.sort_by_cached_key(|defn| defn.name().show());
                    let mut emitter = Emitter::new(triple, env);
                    let module = emitter.gen(&defns)?;
                    let path = workdir.join(format!("{id}.ll"));
                    fs::write(&path, module)?;
                    debug!(shard = %id, defns = defns.len(), "wrote shard");
                    Ok(path)
                })
            })
            .collect();
        handles.into_iter().map(join).collect()
    })
}

fn join<T>(handle: thread::ScopedJoinHandle<'_, Result<T, CodegenError>>) -> Result<T, CodegenError> {
    match handle.join() {
        Ok(result) => result,
        Err(panic) => std::panic::resume_unwind(panic),
    }
}
